//! In-memory record transformations between ingestion and load.
//!
//! - [`reconcile()`]: null repair, deriving `quantity` or `total` from `total = price * quantity`
//! - [`normalize()`]: storage casts plus a per-batch `processed_at` stamp
//!
//! Both stages are pure over their input batch and report dropped rows as
//! [`crate::error::RecordError`]s instead of failing the batch.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//! use sales_reconcile::processing::{normalize, reconcile};
//! use sales_reconcile::schema::RawRecord;
//!
//! let at = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let batch = vec![
//!     RawRecord {
//!         product: "Laptops".to_string(),
//!         price: Some(Decimal::from(50_000)),
//!         quantity: None,
//!         total: Some(Decimal::from(150_000)),
//!         ordered_at: at,
//!         delivery_at: at,
//!     },
//!     RawRecord {
//!         product: "Tablets".to_string(),
//!         price: None,
//!         quantity: None,
//!         total: None,
//!         ordered_at: at,
//!         delivery_at: at,
//!     },
//! ];
//!
//! let reconciled = reconcile(&batch);
//! assert_eq!(reconciled.records.len(), 1);
//! assert_eq!(reconciled.records[0].quantity, 3);
//! assert_eq!(reconciled.reject_counts().unrecoverable, 1);
//!
//! let stored = normalize(&reconciled.records);
//! assert_eq!(stored.records[0].quantity, 3);
//! ```

pub mod normalize;
pub mod reconcile;

pub use normalize::{normalize, normalize_at, Normalized};
pub use reconcile::{reconcile, Reconciliation};
