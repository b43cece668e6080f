//! `sales-reconcile` repairs missing numeric fields in sales-transaction CSV batches and appends
//! the cleaned records to an append-only table.
//!
//! A batch moves through four stages:
//!
//! 1. [`ingestion::ingest_batch`] reads a CSV file into a typed [`types::DataSet`] using the
//!    fixed sales schema ([`schema::raw_sales_schema`]), rejecting malformed rows one by one.
//! 2. [`processing::reconcile()`] drops rows whose `price`, `quantity` and `total` are all null and
//!    derives the missing one of `quantity`/`total` from `total = price * quantity`.
//! 3. [`processing::normalize()`] casts to storage types and stamps one `processed_at` per batch.
//! 4. [`load::BatchLoader::append`] hands the batch to a [`load::Sink`] as one unit, retrying
//!    transient failures with capped exponential backoff.
//!
//! [`pipeline::Pipeline`] wires these together for one batch; [`execution::BatchRunner`] runs
//! many batches concurrently.
//!
//! ## Derivation rules
//!
//! | price | quantity | total | result |
//! |-------|----------|-------|--------|
//! | null  | null     | null  | discarded (unrecoverable) |
//! | `p`   | null     | `t`   | `quantity = floor(t / p)` |
//! | `p`   | `q`      | null  | `total = round(p * q, 2)`, midpoint away from zero |
//! | `p`   | `q`      | `t`   | unchanged |
//!
//! Any other combination, or a zero price when dividing, is a derivation failure and the row is
//! discarded. Price and total stay fixed-point ([`rust_decimal::Decimal`]) until normalization.
//!
//! ## Quick example: one batch into memory
//!
//! ```no_run
//! use sales_reconcile::ingestion::BatchSource;
//! use sales_reconcile::load::{BatchLoader, MemorySink, RetryPolicy, TableId};
//! use sales_reconcile::pipeline::Pipeline;
//!
//! # fn main() -> Result<(), sales_reconcile::PipelineError> {
//! let table = TableId::new("my-project", "sales", "orders");
//! let pipeline = Pipeline::new(table, BatchLoader::new(MemorySink::new(), RetryPolicy::default()));
//! let report = pipeline.run_batch(&BatchSource::new("raw/sales_2023_03_01.csv"))?;
//! println!("loaded={} rejected={}", report.rows_loaded(), report.rejected.total());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: schema + in-memory dataset types
//! - [`schema`]: the sales column set and the raw/reconciled/storage record types
//! - [`ingestion`]: CSV batch reading, source discovery and ingestion observers
//! - [`processing`]: reconciliation and normalization
//! - [`load`]: append-only sinks and the retrying batch loader
//! - [`pipeline`]: one batch end to end
//! - [`execution`]: concurrent batch runner with metrics
//! - [`trigger`]: file-arrival notifications to job configurations
//! - [`error`]: error types used across the crate

pub mod error;
pub mod execution;
pub mod ingestion;
pub mod load;
pub mod pipeline;
pub mod processing;
pub mod schema;
pub mod trigger;
pub mod types;

pub use error::{IngestionError, IngestionResult, LoadError, PipelineError, RecordError};
