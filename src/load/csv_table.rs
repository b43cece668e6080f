//! Local append-only table store: one CSV file per table under a warehouse directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fd_lock::RwLock;

use crate::error::{IngestionResult, SinkError};
use crate::ingestion::csv::{IngestedBatch, ingest_csv_from_path};
use crate::schema::{StorageRecord, storage_schema};

use super::TableId;
use super::sink::Sink;

/// Sink writing `<root>/<project>/<dataset>/<table>.csv`.
///
/// Each append is written in full to a file under the staging directory first, then copied onto
/// the end of the table file in one step. If the copy fails the table file is truncated back to
/// its previous length, so a batch is either fully present or absent.
///
/// Appends to one table are serialized across processes by an exclusive advisory lock on
/// `<table>.csv.lock` next to the table file. A writer that cannot take the lock within the
/// attempt timeout gets [`SinkError::Unavailable`], which the loader retries.
#[derive(Debug)]
pub struct CsvTableSink {
    root: PathBuf,
    staging: PathBuf,
    lock: Mutex<()>,
}

impl CsvTableSink {
    /// Open (creating if needed) a warehouse root and a staging directory.
    pub fn open(root: impl AsRef<Path>, staging: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        fs::create_dir_all(staging.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            staging: staging.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// File backing `table`.
    pub fn table_path(&self, table: &TableId) -> PathBuf {
        self.root
            .join(&table.project)
            .join(&table.dataset)
            .join(format!("{}.csv", table.table))
    }

    fn lock_path(&self, table: &TableId) -> PathBuf {
        self.table_path(table).with_extension("csv.lock")
    }

    /// Read a table back with the storage column types.
    pub fn read_table(&self, table: &TableId) -> IngestionResult<IngestedBatch> {
        ingest_csv_from_path(self.table_path(table), &storage_schema())
    }

    fn check_header(&self, path: &Path) -> Result<(), SinkError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let header = rdr.headers()?.clone();
        let columns = storage_schema().mismatched_columns(header.iter());
        if columns.is_empty() {
            Ok(())
        } else {
            Err(SinkError::SchemaMismatch { columns })
        }
    }

    fn stage(&self, table: &TableId, batch: &[StorageRecord]) -> Result<StagedFile, SinkError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let staged = self.staging.join(format!(
            "{}.{}.{}-{}-{nanos}.part",
            table.project,
            table.dataset,
            table.table,
            std::process::id()
        ));

        let file = File::create(&staged)?;
        let staged = StagedFile { path: staged };
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        for record in batch {
            wtr.write_record(record.to_csv_row())?;
        }
        let file = wtr.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(staged)
    }

    fn commit(&self, staged: &Path, dest: &Path) -> Result<(), SinkError> {
        let mut out = OpenOptions::new().create(true).append(true).open(dest)?;
        let original_len = out.metadata()?.len();

        let result = (|| -> Result<(), SinkError> {
            if original_len == 0 {
                let mut wtr = csv::Writer::from_writer(Vec::new());
                wtr.write_record(storage_schema().field_names())?;
                let header = wtr.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;
                out.write_all(&header)?;
            }
            let mut staged_file = File::open(staged)?;
            io::copy(&mut staged_file, &mut out)?;
            out.sync_all()?;
            Ok(())
        })();

        if result.is_err() {
            if let Err(e) = out.set_len(original_len) {
                tracing::error!(path = %dest.display(), error = %e, "failed to roll back partial append");
            }
        }
        result
    }
}

impl Sink for CsvTableSink {
    fn append(&self, table: &TableId, batch: &[StorageRecord], timeout: Duration) -> Result<usize, SinkError> {
        let start = Instant::now();
        let dest = self.table_path(table);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let _guard = self.lock.lock().map_err(|_| SinkError::Rejected {
            message: "table lock poisoned".to_string(),
        })?;
        let lock_path = self.lock_path(table);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        let mut table_lock = RwLock::new(lock_file);
        let _table_guard = loop {
            match table_lock.try_write() {
                Ok(guard) => break guard,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(SinkError::Unavailable {
                            message: format!("{} is held by another writer", lock_path.display()),
                        });
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if dest.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            self.check_header(&dest)?;
        }

        let staged = self.stage(table, batch)?;
        let elapsed = start.elapsed();
        let result = if elapsed > timeout {
            Err(SinkError::Timeout {
                elapsed,
                limit: timeout,
            })
        } else {
            self.commit(&staged.path, &dest)
        };
        result.map(|()| batch.len())
    }
}

const LOCK_POLL: Duration = Duration::from_millis(10);

/// Staged batch file, removed when dropped whether or not it was committed.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove staged batch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("sales-reconcile-{tag}-{nanos}"))
    }

    fn record(product: &str) -> StorageRecord {
        let ts = NaiveDate::from_ymd_opt(2023, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        StorageRecord {
            product: product.to_string(),
            price: Some(2000.0),
            quantity: 4,
            total: 8000.0,
            ordered_at: ts,
            delivery_at: ts,
            processed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn appends_accumulate_under_one_header() {
        let dir = tmp_dir("csv-sink");
        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let table = TableId::new("proj", "sales", "orders");

        assert_eq!(sink.append(&table, &[record("a"), record("b")], Duration::from_secs(30)).unwrap(), 2);
        assert_eq!(sink.append(&table, &[record("c")], Duration::from_secs(30)).unwrap(), 1);

        let text = fs::read_to_string(sink.table_path(&table)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "product,price,quantity,total,ordered_at,delivery_at,processed_at");
        assert!(lines[3].starts_with("c,2000,4,8000,2023-03-01 00:00:00"));
        assert_eq!(fs::read_dir(dir.join("staging")).unwrap().count(), 0);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn foreign_header_is_a_schema_mismatch() {
        let dir = tmp_dir("csv-sink-mismatch");
        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let table = TableId::new("proj", "sales", "orders");
        let path = sink.table_path(&table);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "product,price,qty,total,ordered_at,delivery_at,processed_at\n").unwrap();

        let err = sink.append(&table, &[record("a")], Duration::from_secs(30)).unwrap_err();
        match err {
            SinkError::SchemaMismatch { columns } => {
                assert_eq!(columns, vec!["quantity".to_string(), "qty".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn expired_timeout_leaves_table_untouched() {
        let dir = tmp_dir("csv-sink-timeout");
        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let table = TableId::new("proj", "sales", "orders");

        let err = sink.append(&table, &[record("a")], Duration::ZERO).unwrap_err();
        assert!(matches!(err, SinkError::Timeout { .. }));
        assert!(err.is_transient());
        assert!(!sink.table_path(&table).exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn staged_file_is_removed_on_drop() {
        let dir = tmp_dir("csv-sink-staged");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("batch.part");
        fs::write(&path, "a,1\n").unwrap();

        drop(StagedFile { path: path.clone() });
        assert!(!path.exists());
        // Already gone: dropping again is silent.
        drop(StagedFile { path: path.clone() });

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_stage_leaves_no_part_file() {
        let dir = tmp_dir("csv-sink-stage-fail");
        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let table = TableId::new("proj", "sales", "orders");

        let _ = sink.append(&table, &[record("a")], Duration::ZERO).unwrap_err();
        assert_eq!(fs::read_dir(dir.join("staging")).unwrap().count(), 0);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn table_held_by_another_writer_is_unavailable() {
        let dir = tmp_dir("csv-sink-locked");
        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let table = TableId::new("proj", "sales", "orders");
        let lock_path = sink.lock_path(&table);
        fs::create_dir_all(lock_path.parent().unwrap()).unwrap();

        let mut other = RwLock::new(File::create(&lock_path).unwrap());
        let held = other.try_write().unwrap();

        let err = sink
            .append(&table, &[record("a")], Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, SinkError::Unavailable { .. }));
        assert!(err.is_transient());
        assert!(!sink.table_path(&table).exists());

        drop(held);
        assert_eq!(sink.append(&table, &[record("a")], Duration::from_secs(30)).unwrap(), 1);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn separate_sinks_on_one_warehouse_do_not_interleave() {
        let dir = tmp_dir("csv-sink-shared");
        let table = TableId::new("proj", "sales", "orders");
        let batch: Vec<StorageRecord> = (0..200).map(|i| record(&format!("p{i}"))).collect();

        thread::scope(|s| {
            for _ in 0..4 {
                let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
                let (table, batch) = (&table, &batch);
                s.spawn(move || {
                    assert_eq!(sink.append(table, batch, Duration::from_secs(30)).unwrap(), 200);
                });
            }
        });

        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let text = fs::read_to_string(sink.table_path(&table)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 4 * 200);
        assert_eq!(lines.iter().filter(|l| l.starts_with("product,")).count(), 1);
        for chunk in lines[1..].chunks(200) {
            assert!(chunk[0].starts_with("p0,"));
            assert!(chunk[199].starts_with("p199,"));
        }

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn read_table_returns_storage_types() {
        let dir = tmp_dir("csv-sink-read");
        let sink = CsvTableSink::open(dir.join("wh"), dir.join("staging")).unwrap();
        let table = TableId::new("proj", "sales", "orders");
        sink.append(&table, &[record("a"), record("b")], Duration::from_secs(30)).unwrap();

        let read = sink.read_table(&table).unwrap();
        assert!(read.rejected.is_empty());
        assert_eq!(read.dataset.row_count(), 2);
        let row = &read.dataset.rows[1];
        assert_eq!(row[0], Value::Utf8("b".to_string()));
        assert_eq!(row[1], Value::Float32(2000.0));
        assert_eq!(row[2], Value::Int32(4));
        assert_eq!(row[3], Value::Float32(8000.0));
        let processed = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().naive_utc();
        assert_eq!(row[6], Value::Timestamp(processed));

        let _ = fs::remove_dir_all(dir);
    }
}
