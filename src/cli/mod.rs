use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{parse_symbol_list, Config};

pub mod commands;

#[derive(Parser)]
#[command(
    name = "market-interpreter",
    about = "Daily market snapshot and four-stage interpretation pipeline",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daily cycle and print the final investment memo
    Run {
        /// Comma-separated symbols (defaults to the configured basket)
        #[arg(short, long)]
        symbols: Option<String>,

        /// Print each stage's output as it completes
        #[arg(long)]
        show_stages: bool,
    },

    /// Compute and print the market snapshot only
    Snapshot {
        /// Comma-separated symbols (defaults to the configured basket)
        #[arg(short, long)]
        symbols: Option<String>,

        /// Print raw JSON instead of the listing
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and check the LLM backend
    Check,
}

/// Turn `--symbols` into the engine's optional identifier list
fn identifiers(symbols: Option<String>) -> Option<Vec<String>> {
    symbols
        .map(|raw| parse_symbol_list(&raw))
        .filter(|list| !list.is_empty())
}

/// Execute CLI command
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            symbols,
            show_stages,
        } => {
            info!("Running daily cycle");
            commands::run_cycle(config, identifiers(symbols), show_stages).await?;
        }
        Commands::Snapshot { symbols, json } => {
            info!("Computing market snapshot");
            commands::snapshot(config, identifiers(symbols), json).await?;
        }
        Commands::Check => {
            commands::check(config).await?;
        }
    }

    Ok(())
}
