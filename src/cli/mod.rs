//! Driftwatch CLI Module
//!
//! Command-line interface for serving the REST API and running one-off drift
//! analyses against local files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use polars::prelude::*;

use crate::cancel::CancelToken;
use crate::drift::DriftAnalyzer;
use crate::registry::UploadRegistry;
use crate::server::{run_server, ServerConfig};

#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drift and performance evaluation engine for ML models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server
    Serve {
        /// Host to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// JSON-lines history file (omit for in-memory history)
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Analyze drift between two local datasets and print the report
    Analyze {
        /// Reference dataset (CSV or JSON)
        #[arg(short, long)]
        reference: PathBuf,

        /// Current dataset (CSV or JSON)
        #[arg(short, long)]
        current: PathBuf,
    },
}

pub async fn cmd_serve(host: &str, port: u16, history: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ServerConfig {
        host: host.to_string(),
        port,
        history_path: history,
        ..ServerConfig::default()
    };
    run_server(config).await
}

pub fn cmd_analyze(reference: &Path, current: &Path) -> anyhow::Result<()> {
    let registry = Arc::new(UploadRegistry::new());
    let reference_id = register_file(&registry, reference)?;
    let current_id = register_file(&registry, current)?;

    let analyzer = DriftAnalyzer::new(registry);
    let report = analyzer.analyze(&reference_id, &current_id, &CancelToken::new())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_frame(path: &Path) -> anyhow::Result<DataFrame> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let frame = match extension {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => {
            let file = std::fs::File::open(path)?;
            JsonReader::new(file).finish()?
        }
        other => anyhow::bail!("unsupported file format '{other}', use CSV or JSON"),
    };
    Ok(frame)
}

fn register_file(registry: &Arc<UploadRegistry>, path: &Path) -> anyhow::Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset")
        .to_string();
    let frame = load_frame(path)?;
    let record = registry.register_dataset(name, "cli".to_string(), frame)?;
    Ok(record.id.clone())
}
