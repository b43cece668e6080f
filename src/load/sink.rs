use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::SinkError;
use crate::schema::StorageRecord;

use super::TableId;

/// An append-only destination for storage records.
///
/// Implementations must make each call all-or-nothing: either every row of `batch` becomes
/// visible in `table`, or none does and an error is returned.
pub trait Sink: Send + Sync {
    /// Append `batch` to `table`, giving up before commit once `timeout` has elapsed.
    ///
    /// Returns the number of rows written.
    fn append(&self, table: &TableId, batch: &[StorageRecord], timeout: Duration) -> Result<usize, SinkError>;
}

impl<S: Sink + ?Sized> Sink for &S {
    fn append(&self, table: &TableId, batch: &[StorageRecord], timeout: Duration) -> Result<usize, SinkError> {
        (**self).append(table, batch, timeout)
    }
}

impl<S: Sink + ?Sized> Sink for std::sync::Arc<S> {
    fn append(&self, table: &TableId, batch: &[StorageRecord], timeout: Duration) -> Result<usize, SinkError> {
        (**self).append(table, batch, timeout)
    }
}

/// In-process sink holding appended rows per table.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<TableId, Vec<StorageRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the rows appended to `table` so far.
    pub fn rows(&self, table: &TableId) -> Vec<StorageRecord> {
        self.tables
            .lock()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl Sink for MemorySink {
    fn append(&self, table: &TableId, batch: &[StorageRecord], _timeout: Duration) -> Result<usize, SinkError> {
        let mut tables = self.tables.lock().map_err(|_| SinkError::Rejected {
            message: "memory sink lock poisoned".to_string(),
        })?;
        tables.entry(table.clone()).or_default().extend_from_slice(batch);
        Ok(batch.len())
    }
}
