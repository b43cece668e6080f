//! One batch, end to end: source → reconcile → normalize → append.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{PipelineError, RecordError, RejectCounts};
use crate::ingestion::{BatchSource, IngestionOptions, ingest_batch};
use crate::load::{BatchLoader, LoadResult, Sink, TableId};
use crate::processing::{normalize, reconcile};

/// Summary of a completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub source: PathBuf,
    /// Data rows read from the source, accepted or not.
    pub rows_read: usize,
    pub rejected: RejectCounts,
    pub load: LoadResult,
}

impl BatchReport {
    pub fn rows_loaded(&self) -> usize {
        self.load.rows_written
    }
}

/// Everything a batch run needs besides its source.
pub struct Pipeline<S> {
    pub destination: TableId,
    pub loader: BatchLoader<S>,
    pub ingestion: IngestionOptions,
}

impl<S: Sink> Pipeline<S> {
    pub fn new(destination: TableId, loader: BatchLoader<S>) -> Self {
        Self {
            destination,
            loader,
            ingestion: IngestionOptions::default(),
        }
    }

    pub fn with_ingestion_options(mut self, options: IngestionOptions) -> Self {
        self.ingestion = options;
        self
    }

    /// Run one batch. Row-level rejects are counted in the report; ingestion and load failures
    /// fail the batch.
    pub fn run_batch(&self, source: &BatchSource) -> Result<BatchReport, PipelineError> {
        let span = tracing::info_span!("batch", source = %source, table = %self.destination);
        let _enter = span.enter();

        let ingested = ingest_batch(source, &self.ingestion)?;
        let rows_read = ingested.rows_read();
        let raw = ingested.into_raw_records();
        let mut rejected = raw.rejected;

        let reconciled = reconcile(&raw.records);
        let surviving = rekey_rejects(&raw.row_numbers, reconciled.rejected, &mut rejected);
        let normalized = normalize(&reconciled.records);
        rekey_rejects(&surviving, normalized.rejected, &mut rejected);
        rejected.sort_by_key(RecordError::row);
        let counts = RejectCounts::from_errors(&rejected);
        log_rejects(&rejected, &counts);

        let load = self.loader.append(&self.destination, &normalized.records)?;
        Ok(BatchReport {
            source: source.path.clone(),
            rows_read,
            rejected: counts,
            load,
        })
    }
}

/// Move stage rejects into `out`, pointing them at source rows, and return the source rows of the
/// records the stage kept. `stage_rows[i]` is the source row of the stage's input `i + 1`.
fn rekey_rejects(stage_rows: &[usize], rejects: Vec<RecordError>, out: &mut Vec<RecordError>) -> Vec<usize> {
    let mut kept = vec![true; stage_rows.len()];
    for e in rejects {
        let pos = e.row().saturating_sub(1);
        match stage_rows.get(pos) {
            Some(&source_row) => {
                kept[pos] = false;
                out.push(e.at_row(source_row));
            }
            None => out.push(e),
        }
    }
    stage_rows
        .iter()
        .zip(kept)
        .filter_map(|(&row, keep)| keep.then_some(row))
        .collect()
}

fn log_rejects(rejected: &[RecordError], counts: &RejectCounts) {
    for e in rejected {
        match e {
            RecordError::Malformed { .. } | RecordError::Cast { .. } => tracing::warn!(error = %e, "row rejected"),
            _ => tracing::debug!(error = %e, "row discarded"),
        }
    }
    if counts.total() > 0 {
        tracing::info!(
            malformed = counts.malformed,
            unrecoverable = counts.unrecoverable,
            derivation_failure = counts.derivation_failure,
            cast = counts.cast,
            "rows dropped from batch"
        );
    }
}
