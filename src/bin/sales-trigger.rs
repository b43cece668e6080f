use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sales_reconcile::trigger::{FileEvent, TriggerConfig};

/// Turn a file-arrival event into a `sales-reconcile` job configuration.
///
/// Configuration comes from RAW_PREFIX, PROJECT_ID, BQ_DATASET, BQ_TABLE and TEMP_GCS_BUCKET.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON event file (`{"bucket": ..., "name": ...}`); reads stdin when omitted
    event: Option<PathBuf>,

    /// Print the `sales-reconcile` arguments instead of the JSON job configuration
    #[arg(long)]
    args: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TriggerConfig::from_env()?;

    let text = match &cli.event {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading event from stdin")?;
            buf
        }
    };
    let event: FileEvent = serde_json::from_str(&text).context("parsing file event")?;

    match config.job_for(&event) {
        Some(job) if cli.args => println!("{}", job.args().join(" ")),
        Some(job) => {
            tracing::info!(input = %job.input_path, table = %job.destination(), "job configured");
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        None => {}
    }
    Ok(())
}
