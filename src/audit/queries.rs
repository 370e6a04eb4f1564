use super::AuditLog;
use crate::error::Result;
use crate::logic::TraceSink;
use crate::models::{Operation, Trace};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::Serialize;

/// One logged evaluation, newest first from [`AuditLog::recent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub operation: String,
    pub category: String,
    pub ruleset_version: String,
    pub matched: bool,
    pub confidence: f64,
    pub rule_ids: Vec<String>,
    pub trace_json: String,
    pub recorded_at: String,
}

impl AuditLog {
    pub fn record_trace(&self, operation: Operation, trace: &Trace) -> Result<i64> {
        let rule_ids = serde_json::to_string(&trace.rule_ids)?;
        let trace_json = trace.to_json()?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO evaluations
                    (operation, category, ruleset_version, matched, confidence, rule_ids, trace_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    operation.as_str(),
                    trace.category.as_str(),
                    trace.ruleset_version,
                    trace.matched,
                    trace.confidence,
                    rule_ids,
                    trace_json,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, operation, category, ruleset_version, matched, confidence,
                       rule_ids, trace_json, recorded_at
                FROM evaluations
                ORDER BY id DESC
                LIMIT ?1
                "#,
            )?;
            let entries = stmt
                .query_map([limit as i64], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    pub fn count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?)
        })
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
    let raw_ids: String = row.get("rule_ids")?;
    let column = row.as_ref().column_index("rule_ids")?;
    let rule_ids = serde_json::from_str(&raw_ids).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
    })?;
    Ok(AuditEntry {
        id: row.get("id")?,
        operation: row.get("operation")?,
        category: row.get("category")?,
        ruleset_version: row.get("ruleset_version")?,
        matched: row.get("matched")?,
        confidence: row.get("confidence")?,
        rule_ids,
        trace_json: row.get("trace_json")?,
        recorded_at: row.get("recorded_at")?,
    })
}

impl TraceSink for AuditLog {
    fn record(&self, operation: Operation, trace: &Trace) {
        if let Err(e) = self.record_trace(operation, trace) {
            tracing::warn!(%operation, error = %e, "Failed to write audit entry");
        }
    }
}
