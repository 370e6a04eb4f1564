use super::AuditLog;
use crate::error::Result;

const MIGRATIONS: &[&str] = &[
    // 1: evaluation log
    r#"
    CREATE TABLE IF NOT EXISTS evaluations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation TEXT NOT NULL,
        category TEXT NOT NULL,
        ruleset_version TEXT NOT NULL,
        matched INTEGER NOT NULL,
        confidence REAL NOT NULL,
        rule_ids TEXT NOT NULL,
        trace_json TEXT NOT NULL,
        recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    "#,
    // 2: lookups by rule version
    r#"
    CREATE INDEX IF NOT EXISTS idx_evaluations_version
        ON evaluations(ruleset_version);
    CREATE INDEX IF NOT EXISTS idx_evaluations_recorded_at
        ON evaluations(recorded_at);
    "#,
];

pub fn run(log: &AuditLog) -> Result<()> {
    log.with_conn_mut(|conn| {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                tracing::info!("Applying audit migration {}", version);
                let tx = conn.transaction()?;
                tx.execute_batch(migration)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version) VALUES (?1)",
                    [version],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let log = AuditLog::open_in_memory().unwrap();
        run(&log).unwrap();
        let version: i32 = log
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);
    }
}
