//! Batch source ingestion.
//!
//! Most callers should use [`ingest_batch`] (from [`source`]) which:
//!
//! - reads one CSV batch into a typed [`crate::types::DataSet`] using the sales schema
//! - rejects unparseable rows individually instead of failing the batch
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]
//!
//! [`discover_sources`] resolves an input path, directory or glob into batch files, and the
//! reader-level functions live under [`csv`].

pub mod csv;
pub mod observability;
pub mod source;

pub use csv::{IngestedBatch, RawBatch};
pub use observability::{
    CompositeObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
pub use source::{BatchSource, IngestionOptions, SourceFilter, discover_sources, ingest_batch};
