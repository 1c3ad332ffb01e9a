//! Driftwatch - Main Entry Point
//!
//! Drift and performance evaluation engine with CLI and server modes.

use clap::Parser;
use driftwatch::cli::{cmd_analyze, cmd_serve, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driftwatch=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, history } => {
            cmd_serve(&host, port, history).await?;
        }
        Commands::Analyze { reference, current } => {
            cmd_analyze(&reference, &current)?;
        }
    }

    Ok(())
}
