//! Arbitra CLI
//!
//! # Quick Start
//!
//! ```bash
//! # Scripted release + dispute lifecycle
//! arbitra demo --scores 62,66,70
//!
//! # What a 1-unit agreement refunds at quality 72
//! arbitra refund --amount 1000000000 --score 72
//!
//! # Inspect encoded data
//! arbitra decode-ix <hex>
//! arbitra decode-record --kind agreement <hex>
//! ```
//!
//! Settings come from `--settings <file.json>` or `ARBITRA_*` variables
//! (a `.env` file is read first).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod display;

use commands::{demo, inspect};
use config::{init_logging, load_settings, LoggingConfig};

/// Arbitra - escrow agreements with oracle dispute resolution
#[derive(Parser)]
#[command(name = "arbitra")]
#[command(version)]
#[command(about = "Escrow agreements with oracle dispute resolution", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON settings document (defaults to ARBITRA_* variables)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted release and dispute against an in-memory protocol
    Demo {
        /// Oracle scores for the disputed agreement
        #[arg(long, value_delimiter = ',', default_value = "62,66,70")]
        scores: Vec<u8>,

        /// Agreement amount in base units
        #[arg(long, default_value_t = 1_000_000_000)]
        amount: u64,
    },

    /// Evaluate the refund curve
    Refund {
        /// Agreement amount in base units
        #[arg(long)]
        amount: u64,

        /// Consensus quality score (0-100)
        #[arg(long)]
        score: u8,
    },

    /// Trust level for a reputation and stake
    Trust {
        #[arg(long)]
        reputation: u64,

        /// Stake in base units
        #[arg(long)]
        stake: u64,
    },

    /// Decode a hex-encoded instruction
    DecodeIx {
        data: String,
    },

    /// Decode a hex-encoded record
    DecodeRecord {
        /// agent, agreement, oracle-registry, reputation, blacklist or config
        #[arg(long)]
        kind: String,

        data: String,
    },

    /// Print the effective settings
    Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let logging = LoggingConfig::from_env(cli.log_level, cli.log_format);
    init_logging(&logging)?;

    let settings = load_settings(cli.settings.as_deref())?;
    tracing::debug!(?settings, "settings loaded");

    match cli.command {
        Commands::Demo { scores, amount } => demo::run(settings, scores, amount).await?,
        Commands::Refund { amount, score } => inspect::refund(&settings, amount, score)?,
        Commands::Trust { reputation, stake } => inspect::trust(reputation, stake),
        Commands::DecodeIx { data } => inspect::decode_instruction(&data)?,
        Commands::DecodeRecord { kind, data } => inspect::decode_record_hex(&kind, &data)?,
        Commands::Settings => println!("{}", serde_json::to_string_pretty(&settings)?),
    }

    Ok(())
}
