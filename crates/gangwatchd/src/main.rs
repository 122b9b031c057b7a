//! Gangwatch Daemon - gang XP scoreboard tracker
//!
//! Polls the scoreboard, aggregates daily/weekly/monthly XP and freezes a
//! report whenever a window closes.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gangwatchd")]
#[command(about = "Gang XP scoreboard tracker", long_about = None)]
#[command(version = gangwatch_shared::VERSION)]
struct Cli {
    /// Config file (defaults to /etc/gangwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracker until interrupted (default)
    Run,

    /// Fetch once and run a single update cycle
    Once,

    /// Show a frozen window report
    Report {
        /// daily, weekly or monthly
        granularity: String,

        /// Period id (e.g. 2026-03-01, 2026-03); latest if omitted
        #[arg(long)]
        period: Option<String>,

        /// List stored report periods instead
        #[arg(long)]
        list: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the leaderboard with window totals
    Standings {
        #[arg(long)]
        json: bool,
    },

    /// Show tracker state
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    InitConfig {
        /// Target path (defaults to /etc/gangwatch/config.toml)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(config_path).await,
        Commands::Once => commands::once(config_path).await,
        Commands::Report {
            granularity,
            period,
            list,
            json,
        } => commands::report(config_path, &granularity, period, list, json),
        Commands::Standings { json } => commands::standings(config_path, json),
        Commands::Status { json } => commands::status(config_path, json),
        Commands::InitConfig { path } => commands::init_config(path),
    }
}
