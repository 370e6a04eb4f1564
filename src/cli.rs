use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "agronomy",
    version,
    about = "Deterministic agronomy decision engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Rule file or directory (overrides rules.path)
    #[arg(short, long, global = true)]
    pub rules: Option<PathBuf>,

    /// Override the audit database directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Record every evaluation in the audit log
    #[arg(long, global = true)]
    pub audit: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run interactive setup and write config.yaml
    Init,
    /// Validate the rule source and print a summary
    Check,
    /// Run one operation and print its trace as JSON
    Evaluate {
        /// evaluate_irrigation, evaluate_fertilization, evaluate_pest_control,
        /// calculate_subsidy or predict_harvest (short names accepted)
        operation: String,

        /// JSON file holding the context object ("-" for stdin)
        #[arg(long)]
        context: Option<PathBuf>,

        /// Context value as key=value; repeatable, applied after --context
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Serve JSON-lines tool requests on stdin/stdout, reloading rules on change
    Serve,
    /// Show recent audit log entries
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}
