//! Cast reconciled records to storage types and stamp the processing time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{RecordError, RejectCounts};
use crate::schema::{PRICE, QUANTITY, ReconciledRecord, StorageRecord, TOTAL};

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Processing timestamp shared by every row of this batch.
    pub processed_at: DateTime<Utc>,
    /// Rows in storage types, in input order.
    pub records: Vec<StorageRecord>,
    /// Rows that did not fit their storage type; `row` is the 1-based input position.
    pub rejected: Vec<RecordError>,
}

impl Normalized {
    pub fn reject_counts(&self) -> RejectCounts {
        RejectCounts::from_errors(&self.rejected)
    }
}

/// Normalize a batch, stamping it with the current wall-clock time.
pub fn normalize(batch: &[ReconciledRecord]) -> Normalized {
    normalize_at(batch, Utc::now())
}

/// Normalize a batch with a caller-supplied processing timestamp.
///
/// `price`/`total` become `f32` and `quantity` becomes `i32`. Rows that overflow the target width
/// or carry a negative value are rejected rather than clamped.
pub fn normalize_at(batch: &[ReconciledRecord], processed_at: DateTime<Utc>) -> Normalized {
    let mut records = Vec::with_capacity(batch.len());
    let mut rejected = Vec::new();

    for (idx0, record) in batch.iter().enumerate() {
        match cast_record(idx0 + 1, record, processed_at) {
            Ok(r) => records.push(r),
            Err(e) => rejected.push(e),
        }
    }

    Normalized {
        processed_at,
        records,
        rejected,
    }
}

fn cast_record(
    row: usize,
    record: &ReconciledRecord,
    processed_at: DateTime<Utc>,
) -> Result<StorageRecord, RecordError> {
    let price = record
        .price
        .map(|p| decimal_to_f32(row, PRICE, p))
        .transpose()?;
    let total = decimal_to_f32(row, TOTAL, record.total)?;

    if record.quantity < 0 {
        return Err(cast_error(row, QUANTITY, format!("negative quantity {}", record.quantity)));
    }
    let quantity = i32::try_from(record.quantity).map_err(|_| {
        cast_error(row, QUANTITY, format!("{} does not fit in a 32-bit integer", record.quantity))
    })?;

    Ok(StorageRecord {
        product: record.product.clone(),
        price,
        quantity,
        total,
        ordered_at: record.ordered_at,
        delivery_at: record.delivery_at,
        processed_at,
    })
}

fn decimal_to_f32(row: usize, column: &str, value: Decimal) -> Result<f32, RecordError> {
    if value < Decimal::ZERO {
        return Err(cast_error(row, column, format!("negative value {value}")));
    }
    match value.to_f32() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(cast_error(row, column, format!("{value} does not fit in a 32-bit float"))),
    }
}

fn cast_error(row: usize, column: &str, message: String) -> RecordError {
    RecordError::Cast {
        row,
        column: column.to_string(),
        message,
    }
}
