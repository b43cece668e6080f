//! Append-only batch loading with bounded retry.
//!
//! [`BatchLoader::append`] hands a whole normalized batch to a [`Sink`]. Transient sink failures
//! (unavailable, timed out) are retried with capped exponential backoff up to
//! [`RetryPolicy::max_attempts`]; everything else fails the batch at once.
//!
//! Appends are not idempotent. A retry after a timeout whose outcome on the sink side is unknown
//! can duplicate rows.

mod csv_table;
mod sink;

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, SinkError};
use crate::schema::StorageRecord;

pub use csv_table::CsvTableSink;
pub use sink::{MemorySink, Sink};

/// Destination table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Retry and timeout settings for [`BatchLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Per-attempt timeout handed to the sink.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based): doubling from `initial_backoff`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub table: TableId,
    pub rows_written: usize,
    pub attempts: u32,
}

/// Appends batches to a sink.
///
/// The sink is an explicit handle: create it once at process start and pass it in.
pub struct BatchLoader<S> {
    sink: S,
    policy: RetryPolicy,
}

impl<S: fmt::Debug> fmt::Debug for BatchLoader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoader")
            .field("sink", &self.sink)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S: Sink> BatchLoader<S> {
    pub fn new(sink: S, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Append `batch` to `table` as one unit.
    pub fn append(&self, table: &TableId, batch: &[StorageRecord]) -> Result<LoadResult, LoadError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(table = %table, rows = batch.len(), attempt, "appending batch");

            match self.sink.append(table, batch, self.policy.attempt_timeout) {
                Ok(written) if written == batch.len() => {
                    tracing::info!(
                        table = %table,
                        rows = written,
                        attempts = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "batch appended"
                    );
                    return Ok(LoadResult {
                        table: table.clone(),
                        rows_written: written,
                        attempts: attempt,
                    });
                }
                Ok(written) => {
                    return Err(LoadError::RowCountMismatch {
                        table: table.clone(),
                        expected: batch.len(),
                        written,
                    });
                }
                Err(SinkError::SchemaMismatch { columns }) => {
                    return Err(LoadError::SchemaMismatch {
                        table: table.clone(),
                        columns,
                    });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        table = %table,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient sink failure, retrying batch"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) if e.is_transient() => {
                    return Err(LoadError::Exhausted {
                        table: table.clone(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    return Err(LoadError::Rejected {
                        table: table.clone(),
                        source: e,
                    });
                }
            }
        }
    }
}
