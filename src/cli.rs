//! Helix CLI.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 unrecoverable runtime
//! error.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Autonomous crypto futures decision engine
#[derive(Parser, Debug)]
#[command(name = "helix")]
#[command(author, version, about)]
pub struct Cli {
    /// Config directory or TOML file
    #[arg(long, global = true, default_value = "config")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the live decision loop
    Run {
        /// Symbols to trade (comma-separated), overriding the config
        #[arg(short, long)]
        symbols: Option<String>,

        /// Trade the configured selection instead of an explicit list
        #[arg(long, conflicts_with = "symbols")]
        auto: bool,

        /// Log decisions without placing real orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Replay recorded candles through the exact same pipeline
    Backtest {
        /// Directory with `<symbol>_<tf>.jsonl` candle files
        #[arg(long)]
        data: PathBuf,

        /// Symbols to replay (comma-separated)
        #[arg(short, long)]
        symbols: String,

        /// Seconds the replay cursor advances per cycle
        #[arg(long, default_value = "300")]
        step_secs: u64,

        /// Number of cycles to run (default: until data runs out)
        #[arg(long)]
        cycles: Option<u64>,
    },
}

/// Parse a comma-separated symbol list, uppercased and deduplicated
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
