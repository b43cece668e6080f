use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sales_reconcile::error::RejectCounts;
use sales_reconcile::execution::{BatchRunner, ExecutionOptions, TracingExecutionObserver};
use sales_reconcile::ingestion::{IngestionOptions, SourceFilter, TracingObserver, discover_sources};
use sales_reconcile::load::{BatchLoader, CsvTableSink, RetryPolicy, TableId};
use sales_reconcile::pipeline::Pipeline;

/// Repair, normalize and append sales CSV batches.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Batch file, directory of batch files, or glob pattern
    input_path: String,

    /// Staging directory; batches are written here in full before they are committed
    #[arg(long = "temp_gcs_bucket", env = "TEMP_GCS_BUCKET")]
    temp_gcs_bucket: String,

    /// Destination project
    #[arg(long = "project_id", env = "PROJECT_ID")]
    project_id: String,

    /// Destination dataset
    #[arg(long = "bq_dataset", env = "BQ_DATASET")]
    bq_dataset: String,

    /// Destination table
    #[arg(long = "bq_table", env = "BQ_TABLE")]
    bq_table: String,

    /// Root directory of the local table store
    #[arg(long = "warehouse_dir", env = "SALES_WAREHOUSE_DIR", default_value = "warehouse")]
    warehouse_dir: String,

    /// Only batch files whose relative name starts with this prefix are read
    #[arg(long = "raw_prefix", env = "SALES_RAW_PREFIX", default_value = "")]
    raw_prefix: String,

    /// Append attempts per batch, including the first
    #[arg(long = "max_attempts", env = "SALES_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    #[arg(long = "initial_backoff_ms", env = "SALES_INITIAL_BACKOFF_MS", default_value_t = 500)]
    initial_backoff_ms: u64,

    /// Upper bound for any retry delay
    #[arg(long = "max_backoff_ms", env = "SALES_MAX_BACKOFF_MS", default_value_t = 10_000)]
    max_backoff_ms: u64,

    /// Per-attempt append timeout
    #[arg(long = "timeout_secs", env = "SALES_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Worker threads (defaults to available parallelism)
    #[arg(long = "threads", env = "SALES_THREADS")]
    threads: Option<usize>,

    /// Batches processed at once (defaults to the worker count)
    #[arg(long = "max_in_flight", env = "SALES_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Emit logs as JSON
    #[arg(long = "log_json", env = "SALES_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    fn execution_options(&self) -> ExecutionOptions {
        let defaults = ExecutionOptions::default();
        let num_threads = self.threads.or(defaults.num_threads);
        ExecutionOptions {
            num_threads,
            max_in_flight_batches: self
                .max_in_flight
                .or(num_threads)
                .unwrap_or(defaults.max_in_flight_batches),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let sources = discover_sources(&cli.input_path, &SourceFilter::with_prefix(&cli.raw_prefix))
        .with_context(|| format!("resolving input '{}'", cli.input_path))?;
    if sources.is_empty() {
        bail!("no batch files found for input '{}'", cli.input_path);
    }

    let sink = CsvTableSink::open(&cli.warehouse_dir, &cli.temp_gcs_bucket).with_context(|| {
        format!(
            "opening table store at '{}' (staging '{}')",
            cli.warehouse_dir, cli.temp_gcs_bucket
        )
    })?;
    let table = TableId::new(&cli.project_id, &cli.bq_dataset, &cli.bq_table);
    let pipeline = Pipeline::new(table, BatchLoader::new(sink, cli.retry_policy())).with_ingestion_options(
        IngestionOptions {
            observer: Some(Arc::new(TracingObserver)),
            ..IngestionOptions::default()
        },
    );

    let runner = BatchRunner::new(cli.execution_options())
        .context("building worker pool")?
        .with_observer(Arc::new(TracingExecutionObserver));
    info!(batches = sources.len(), table = %pipeline.destination, "starting run");

    let mut failed = 0usize;
    let mut rejected = RejectCounts::default();
    for outcome in runner.run(&pipeline, &sources) {
        match outcome.result {
            Ok(report) => {
                rejected += report.rejected;
                println!("{}", serde_json::to_string(&report)?);
            }
            Err(e) => {
                failed += 1;
                error!(source = %outcome.source, error = %e, "batch failed");
            }
        }
    }

    let snapshot = runner.metrics().snapshot();
    let code = exit_code(failed, &rejected);
    match code {
        EXIT_FAILED => error!(failed, batches = sources.len(), "run finished with failed batches"),
        EXIT_INVALID_ROWS => warn!(
            malformed = rejected.malformed,
            cast = rejected.cast,
            rows_loaded = snapshot.rows_loaded,
            "run finished with invalid rows"
        ),
        _ => info!(rows_loaded = snapshot.rows_loaded, "run finished"),
    }
    Ok(ExitCode::from(code))
}

const EXIT_FAILED: u8 = 1;
const EXIT_INVALID_ROWS: u8 = 2;

/// Process exit status for a finished run.
///
/// Any failed batch wins. Otherwise malformed or uncastable rows give a distinct status; rows
/// dropped as unrecoverable or underivable do not.
fn exit_code(failed: usize, rejected: &RejectCounts) -> u8 {
    if failed > 0 {
        EXIT_FAILED
    } else if rejected.invalid() > 0 {
        EXIT_INVALID_ROWS
    } else {
        0
    }
}
