//! Sales record contract: column names, source/storage schemas and typed records.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::RecordError;
use crate::types::{DataType, Field, Schema, Value};

pub const PRODUCT: &str = "product";
pub const PRICE: &str = "price";
pub const QUANTITY: &str = "quantity";
pub const TOTAL: &str = "total";
pub const ORDERED_AT: &str = "ordered_at";
pub const DELIVERY_AT: &str = "delivery_at";
pub const PROCESSED_AT: &str = "processed_at";

/// Schema of an incoming sales batch (the fixed six-column header).
pub fn raw_sales_schema() -> Schema {
    Schema::new(vec![
        Field::required(PRODUCT, DataType::Utf8),
        Field::new(PRICE, DataType::Decimal),
        Field::new(QUANTITY, DataType::Int64),
        Field::new(TOTAL, DataType::Decimal),
        Field::required(ORDERED_AT, DataType::Timestamp),
        Field::required(DELIVERY_AT, DataType::Timestamp),
    ])
}

/// Schema of the destination table.
pub fn storage_schema() -> Schema {
    Schema::new(vec![
        Field::required(PRODUCT, DataType::Utf8),
        Field::new(PRICE, DataType::Float32),
        Field::required(QUANTITY, DataType::Int32),
        Field::required(TOTAL, DataType::Float32),
        Field::required(ORDERED_AT, DataType::Timestamp),
        Field::required(DELIVERY_AT, DataType::Timestamp),
        Field::required(PROCESSED_AT, DataType::Timestamp),
    ])
}

/// A sales record as read from the source batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub product: String,
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
    pub total: Option<Decimal>,
    pub ordered_at: NaiveDateTime,
    pub delivery_at: NaiveDateTime,
}

impl RawRecord {
    /// Build a record from a row typed by [`raw_sales_schema`], enforcing the range invariants.
    ///
    /// `row` is the 1-based row number used in the returned error.
    pub fn try_from_row(row: usize, values: &[Value]) -> Result<Self, RecordError> {
        let malformed = |column: &str, message: String| RecordError::Malformed {
            row,
            column: column.to_string(),
            message,
        };

        let product = match values.first() {
            Some(Value::Utf8(s)) if !s.trim().is_empty() => s.clone(),
            _ => return Err(malformed(PRODUCT, "product is required".to_string())),
        };
        let price = optional_decimal(values.get(1)).map_err(|m| malformed(PRICE, m))?;
        let quantity = match values.get(2) {
            Some(Value::Int64(v)) => Some(*v),
            Some(Value::Null) | None => None,
            Some(other) => return Err(malformed(QUANTITY, format!("expected integer, got {other:?}"))),
        };
        let total = optional_decimal(values.get(3)).map_err(|m| malformed(TOTAL, m))?;
        let ordered_at = required_timestamp(values.get(4)).map_err(|m| malformed(ORDERED_AT, m))?;
        let delivery_at = required_timestamp(values.get(5)).map_err(|m| malformed(DELIVERY_AT, m))?;

        let record = Self {
            product,
            price,
            quantity,
            total,
            ordered_at,
            delivery_at,
        };
        record.validate(row)?;
        Ok(record)
    }

    /// Check the range invariants of a raw record.
    pub fn validate(&self, row: usize) -> Result<(), RecordError> {
        let malformed = |column: &str, message: &str| RecordError::Malformed {
            row,
            column: column.to_string(),
            message: message.to_string(),
        };
        if self.price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(malformed(PRICE, "price must be >= 0"));
        }
        if self.quantity.is_some_and(|q| q < 0) {
            return Err(malformed(QUANTITY, "quantity must be >= 0"));
        }
        if self.total.is_some_and(|t| t < Decimal::ZERO) {
            return Err(malformed(TOTAL, "total must be >= 0"));
        }
        if self.delivery_at < self.ordered_at {
            return Err(malformed(DELIVERY_AT, "delivery_at precedes ordered_at"));
        }
        Ok(())
    }

    /// `true` when none of `quantity`, `price`, `total` is present.
    pub fn is_unrecoverable(&self) -> bool {
        self.quantity.is_none() && self.price.is_none() && self.total.is_none()
    }
}

fn optional_decimal(value: Option<&Value>) -> Result<Option<Decimal>, String> {
    match value {
        Some(Value::Decimal(d)) => Ok(Some(*d)),
        Some(Value::Int64(v)) => Ok(Some(Decimal::from(*v))),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(format!("expected decimal, got {other:?}")),
    }
}

fn required_timestamp(value: Option<&Value>) -> Result<NaiveDateTime, String> {
    match value {
        Some(Value::Timestamp(ts)) => Ok(*ts),
        Some(Value::Null) | None => Err("timestamp is required".to_string()),
        Some(other) => Err(format!("expected timestamp, got {other:?}")),
    }
}

/// A record after null repair: `quantity` and `total` are always present.
///
/// `price` may still be absent when both `quantity` and `total` arrived populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledRecord {
    pub product: String,
    pub price: Option<Decimal>,
    pub quantity: i64,
    pub total: Decimal,
    pub ordered_at: NaiveDateTime,
    pub delivery_at: NaiveDateTime,
}

impl From<ReconciledRecord> for RawRecord {
    fn from(r: ReconciledRecord) -> Self {
        Self {
            product: r.product,
            price: r.price,
            quantity: Some(r.quantity),
            total: Some(r.total),
            ordered_at: r.ordered_at,
            delivery_at: r.delivery_at,
        }
    }
}

/// A record in destination storage types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageRecord {
    pub product: String,
    pub price: Option<f32>,
    pub quantity: i32,
    pub total: f32,
    pub ordered_at: NaiveDateTime,
    pub delivery_at: NaiveDateTime,
    pub processed_at: DateTime<Utc>,
}

impl StorageRecord {
    /// Render the record as CSV cells in [`storage_schema`] order.
    pub fn to_csv_row(&self) -> [String; 7] {
        [
            self.product.clone(),
            self.price.map(|p| p.to_string()).unwrap_or_default(),
            self.quantity.to_string(),
            self.total.to_string(),
            self.ordered_at.format(crate::types::TIMESTAMP_FORMAT).to_string(),
            self.delivery_at.format(crate::types::TIMESTAMP_FORMAT).to_string(),
            self.processed_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ]
    }
}
