use std::time::Duration;

use thiserror::Error;

use crate::load::TableId;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Batch-level error returned by ingestion functions.
///
/// Any of these aborts the batch. Row-level problems are reported as [`RecordError`] instead.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV ingestion error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The input does not conform to the provided schema (missing columns, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// An input path or pattern could not be resolved into batch sources.
    #[error("invalid source '{input}': {message}")]
    InvalidSource { input: String, message: String },
}

/// Row-level error. The offending row is dropped and the batch continues.
///
/// `row` is the 1-based position of the row within the input of the stage that rejected it
/// (for ingestion, the data row number excluding the header). [`crate::pipeline::Pipeline`]
/// re-keys every reject to its source data row number before reporting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// A non-nullable field is absent, a value failed to parse, or a range invariant is violated.
    #[error("malformed record at row {row} column '{column}': {message}")]
    Malformed {
        row: usize,
        column: String,
        message: String,
    },

    /// `quantity`, `price` and `total` are all null.
    #[error("unrecoverable record at row {row}: quantity, price and total are all null")]
    Unrecoverable { row: usize },

    /// A missing numeric field cannot be derived from the others.
    #[error("cannot derive missing value at row {row}: {message}")]
    DerivationFailure { row: usize, message: String },

    /// A value does not fit its storage type.
    #[error("cannot cast row {row} column '{column}': {message}")]
    Cast {
        row: usize,
        column: String,
        message: String,
    },
}

impl RecordError {
    /// Row position this error refers to.
    pub fn row(&self) -> usize {
        match self {
            RecordError::Malformed { row, .. }
            | RecordError::Unrecoverable { row }
            | RecordError::DerivationFailure { row, .. }
            | RecordError::Cast { row, .. } => *row,
        }
    }

    /// The same error, pointing at `row` instead.
    pub fn at_row(mut self, new_row: usize) -> Self {
        match &mut self {
            RecordError::Malformed { row, .. }
            | RecordError::Unrecoverable { row }
            | RecordError::DerivationFailure { row, .. }
            | RecordError::Cast { row, .. } => *row = new_row,
        }
        self
    }
}

/// Per-kind totals of rejected rows for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RejectCounts {
    pub malformed: usize,
    pub unrecoverable: usize,
    pub derivation_failure: usize,
    pub cast: usize,
}

impl RejectCounts {
    /// Tally a list of row-level errors.
    pub fn from_errors<'a>(errors: impl IntoIterator<Item = &'a RecordError>) -> Self {
        let mut out = Self::default();
        for e in errors {
            out.record(e);
        }
        out
    }

    /// Count one row-level error.
    pub fn record(&mut self, error: &RecordError) {
        match error {
            RecordError::Malformed { .. } => self.malformed += 1,
            RecordError::Unrecoverable { .. } => self.unrecoverable += 1,
            RecordError::DerivationFailure { .. } => self.derivation_failure += 1,
            RecordError::Cast { .. } => self.cast += 1,
        }
    }

    /// Total rejected rows.
    pub fn total(&self) -> usize {
        self.malformed + self.unrecoverable + self.derivation_failure + self.cast
    }

    /// Rejects that indicate bad input, as opposed to rows that were expected to be dropped.
    pub fn invalid(&self) -> usize {
        self.malformed + self.cast
    }
}

impl std::ops::AddAssign for RejectCounts {
    fn add_assign(&mut self, other: Self) {
        self.malformed += other.malformed;
        self.unrecoverable += other.unrecoverable;
        self.derivation_failure += other.derivation_failure;
        self.cast += other.cast;
    }
}

/// Error reported by a [`crate::load::Sink`] for a single append attempt.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination is temporarily unreachable.
    #[error("sink unavailable: {message}")]
    Unavailable { message: String },

    /// The attempt exceeded its timeout before the batch was committed.
    #[error("append timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    /// The destination table's columns do not match the storage schema.
    #[error("schema mismatch on columns {columns:?}")]
    SchemaMismatch { columns: Vec<String> },

    /// The destination refused the batch for a non-transient reason.
    #[error("sink rejected batch: {message}")]
    Rejected { message: String },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl SinkError {
    /// Whether retrying the whole batch may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Unavailable { .. } | SinkError::Timeout { .. } => true,
            SinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            SinkError::SchemaMismatch { .. } | SinkError::Rejected { .. } | SinkError::Csv(_) => {
                false
            }
        }
    }
}

/// Batch-level load failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The destination schema does not match; never retried.
    #[error("schema mismatch loading into {table}: columns {columns:?}")]
    SchemaMismatch { table: TableId, columns: Vec<String> },

    /// Transient failures persisted past the retry budget.
    #[error("load into {table} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        table: TableId,
        attempts: u32,
        #[source]
        source: SinkError,
    },

    /// A non-transient sink failure.
    #[error("load into {table} rejected: {source}")]
    Rejected {
        table: TableId,
        #[source]
        source: SinkError,
    },

    /// The sink acknowledged a different number of rows than it was handed.
    #[error("load into {table} wrote {written} of {expected} rows")]
    RowCountMismatch {
        table: TableId,
        expected: usize,
        written: usize,
    },
}

impl LoadError {
    /// Destination the failed load was aimed at.
    pub fn table(&self) -> &TableId {
        match self {
            LoadError::SchemaMismatch { table, .. }
            | LoadError::Exhausted { table, .. }
            | LoadError::Rejected { table, .. }
            | LoadError::RowCountMismatch { table, .. } => table,
        }
    }
}

/// Failure of one batch run through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_counts_tally_by_kind() {
        let errors = vec![
            RecordError::Unrecoverable { row: 1 },
            RecordError::Unrecoverable { row: 4 },
            RecordError::Malformed {
                row: 2,
                column: "price".into(),
                message: "negative".into(),
            },
            RecordError::DerivationFailure {
                row: 3,
                message: "price is zero".into(),
            },
        ];
        let counts = RejectCounts::from_errors(&errors);
        assert_eq!(counts.unrecoverable, 2);
        assert_eq!(counts.malformed, 1);
        assert_eq!(counts.derivation_failure, 1);
        assert_eq!(counts.cast, 0);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.invalid(), 1);
    }

    #[test]
    fn only_unavailable_and_timeout_are_transient() {
        assert!(SinkError::Unavailable { message: "down".into() }.is_transient());
        assert!(
            SinkError::Timeout {
                elapsed: Duration::from_secs(2),
                limit: Duration::from_secs(1),
            }
            .is_transient()
        );
        assert!(!SinkError::SchemaMismatch { columns: vec![] }.is_transient());
        assert!(!SinkError::Rejected { message: "no".into() }.is_transient());
    }

    #[test]
    fn load_error_message_names_table_and_columns() {
        let err = LoadError::SchemaMismatch {
            table: TableId::new("proj", "sales", "orders"),
            columns: vec!["total".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("proj.sales.orders"));
        assert!(msg.contains("total"));
        assert_eq!(err.table().table, "orders");
    }
}
