//! Core data model types for batch ingestion.
//!
//! A source file is read into an in-memory [`DataSet`] using a [`Schema`] (a list of typed,
//! optionally nullable [`Field`]s). Domain records are built from those typed rows in
//! [`crate::schema`].

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// Canonical timestamp layout used by sales batches (`YYYY-MM-DD HH:MM:SS`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 32-bit signed integer (storage width).
    Int32,
    /// Fixed-point decimal.
    Decimal,
    /// 32-bit floating point number (storage width).
    Float32,
    /// UTF-8 string.
    Utf8,
    /// Naive timestamp in [`TIMESTAMP_FORMAT`].
    Timestamp,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
    /// Whether empty cells are allowed.
    pub nullable: bool,
}

impl Field {
    /// Create a new nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Create a new field that rejects empty cells.
    pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, data_type)
        }
    }
}

/// A list of fields describing the expected shape of incoming data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Compare a header row against this schema's field names, in order.
    ///
    /// Returns the names that differ: schema fields absent or misplaced in `header`, followed by
    /// header columns the schema does not know. An empty result means the header matches.
    pub fn mismatched_columns<'a>(&self, header: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let header: Vec<&str> = header.into_iter().collect();
        let mut out: Vec<String> = Vec::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if header.get(idx) != Some(&field.name.as_str()) {
                out.push(field.name.clone());
            }
        }
        for extra in header.iter().filter(|h| self.index_of(h).is_none()) {
            out.push((*extra).to_string());
        }
        out
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit signed integer.
    Int32(i32),
    /// Fixed-point decimal.
    Decimal(Decimal),
    /// 32-bit float.
    Float32(f32),
    /// UTF-8 string.
    Utf8(String),
    /// Naive timestamp.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
