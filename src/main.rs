mod cli;

use agronomy_engine::audit::AuditLog;
use agronomy_engine::logic::rules::loader;
use agronomy_engine::models::Category;
use agronomy_engine::tool;
use agronomy_engine::{Config, Context, DecisionEngine, Operation, RuleSource};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON only.
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init = cli.command {
        Config::setup_interactive().context("Interactive setup failed")?;
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context(
        "Failed to load configuration (copy config/config.yaml.example to config/config.yaml)",
    )?;
    let rules_path = cli.rules.clone().unwrap_or_else(|| config.rules.path.clone());

    match &cli.command {
        Commands::Init => Ok(()),
        Commands::Check => check(&rules_path),
        Commands::Evaluate {
            operation,
            context,
            set,
        } => {
            let engine = build_engine(&cli, &config, &rules_path)?;
            evaluate(&engine, operation, context.as_deref(), set)
        }
        Commands::Serve => {
            let engine = Arc::new(build_engine(&cli, &config, &rules_path)?);
            let period = Duration::from_secs(config.rules.watch_interval_secs);
            serve(engine, rules_path, period).await
        }
        Commands::History { limit } => history(&cli, &config, *limit),
    }
}

fn read_rules(path: &Path) -> Result<RuleSource> {
    RuleSource::from_path(path)
        .with_context(|| format!("Failed to read rules from {}", path.display()))
}

fn build_engine(cli: &Cli, config: &Config, rules_path: &Path) -> Result<DecisionEngine> {
    let source = read_rules(rules_path)?;
    let mut engine = DecisionEngine::from_source(&source, config.engine.clone())
        .with_context(|| format!("Rule source {} is invalid", rules_path.display()))?;

    if cli.audit || config.audit.enabled {
        let path = config.audit_db_path(cli.data_dir.as_deref())?;
        let log = AuditLog::open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Audit log attached");
        engine = engine.with_sink(Arc::new(log));
    }

    Ok(engine)
}

fn check(rules_path: &Path) -> Result<()> {
    let source = read_rules(rules_path)?;
    let set = agronomy_engine::logic::rules::load(&source)
        .with_context(|| format!("Rule source {} is invalid", rules_path.display()))?;

    println!(
        "Rule set {} OK: {} rules, {} crop profiles",
        set.version(),
        set.rule_count(),
        set.crop_profiles().len()
    );
    for category in Category::ALL {
        println!(
            "  {:<20} {:<14} {} rules",
            category.as_str(),
            format!("{:?}", set.policy(category)),
            set.rules(category).len()
        );
    }
    if !set.crop_profiles().is_empty() {
        let crops: Vec<_> = set.crop_profiles().crops().collect();
        println!("  crops: {}", crops.join(", "));
    }
    Ok(())
}

fn evaluate(
    engine: &DecisionEngine,
    operation: &str,
    context_file: Option<&Path>,
    pairs: &[String],
) -> Result<()> {
    let Some(operation) = Operation::from_str(operation) else {
        bail!(
            "Unknown operation '{}'; expected one of: {}",
            operation,
            Operation::ALL
                .iter()
                .map(|op| op.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let base = match context_file {
        Some(path) => {
            let text = if path == Path::new("-") {
                std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
            } else {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read context {}", path.display()))?
            };
            let json: serde_json::Value =
                serde_json::from_str(&text).context("Context is not valid JSON")?;
            Context::from_json(&json)?
        }
        None => Context::new(),
    };
    let overrides = Context::from_pairs(pairs.iter().map(String::as_str))?;
    let ctx = base.extended(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let trace = engine.run(operation, &ctx)?;
    println!("{}", serde_json::to_string_pretty(&trace)?);
    Ok(())
}

async fn serve(engine: Arc<DecisionEngine>, rules_path: PathBuf, period: Duration) -> Result<()> {
    tracing::info!(
        version = %engine.version(),
        rules = %rules_path.display(),
        "Serving tool requests on stdin"
    );
    let watcher = tokio::spawn(watch_rules(
        Arc::clone(&engine),
        rules_path.clone(),
        period,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = tool::handle_line(&engine, &line, &rules_path);
        stdout.write_all(response.to_json().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    watcher.abort();
    Ok(())
}

/// Poll the rule path and hot-reload when its set of files changes.
async fn watch_rules(engine: Arc<DecisionEngine>, path: PathBuf, period: Duration) {
    let mut last_seen = loader::fingerprint(&path);
    let mut ticker = tokio::time::interval(period);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let current = loader::fingerprint(&path);
        if current.is_none() || current == last_seen {
            continue;
        }
        last_seen = current;

        tracing::debug!(path = %path.display(), "Rule source changed");
        match RuleSource::from_path(&path) {
            // Rejections are logged by the engine; the old set keeps serving.
            Ok(source) => {
                if let Ok(report) = engine.reload_rules(&source) {
                    tracing::info!(
                        path = %path.display(),
                        from = %report.previous_version,
                        to = %report.version,
                        "Reloaded changed rule source"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read changed rule source"),
        }
    }
}

fn history(cli: &Cli, config: &Config, limit: usize) -> Result<()> {
    let path = config.audit_db_path(cli.data_dir.as_deref())?;
    if !path.exists() {
        println!("No audit log at {}", path.display());
        return Ok(());
    }
    let log = AuditLog::open(&path)?;
    let entries = log.recent(limit)?;
    if entries.is_empty() {
        println!("Audit log is empty");
        return Ok(());
    }

    for entry in entries {
        println!(
            "{:>6}  {}  {:<24} v{:<10} {:<5} {:.2}  {}",
            entry.id,
            entry.recorded_at,
            entry.operation,
            entry.ruleset_version,
            if entry.matched { "match" } else { "none" },
            entry.confidence,
            entry.rule_ids.join(",")
        );
    }
    Ok(())
}
