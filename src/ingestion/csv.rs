//! CSV batch ingestion.

use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::error::{IngestionError, IngestionResult, RecordError};
use crate::schema::RawRecord;
use crate::types::{DataSet, DataType, Schema, TIMESTAMP_FORMAT, Value};

/// A typed dataset plus the rows that could not be parsed into it.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedBatch {
    /// Rows that parsed cleanly against the schema.
    pub dataset: DataSet,
    /// Data row number (1-based, header excluded) of every row in `dataset`.
    pub row_numbers: Vec<usize>,
    /// Rows rejected during parsing.
    pub rejected: Vec<RecordError>,
}

impl IngestedBatch {
    /// Rows read from the source, accepted or not.
    pub fn rows_read(&self) -> usize {
        self.dataset.row_count() + self.rejected.len()
    }

    /// Convert the typed rows into [`RawRecord`]s.
    ///
    /// Rows violating a record invariant are appended to the rejects (alongside the parse rejects
    /// already collected), keyed by their source row number.
    pub fn into_raw_records(self) -> RawBatch {
        let mut out = RawBatch {
            records: Vec::with_capacity(self.dataset.row_count()),
            row_numbers: Vec::with_capacity(self.dataset.row_count()),
            rejected: self.rejected,
        };
        for (row, values) in self.row_numbers.iter().zip(self.dataset.rows.iter()) {
            match RawRecord::try_from_row(*row, values) {
                Ok(r) => {
                    out.records.push(r);
                    out.row_numbers.push(*row);
                }
                Err(e) => out.rejected.push(e),
            }
        }
        out
    }
}

/// Records of one batch ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    pub records: Vec<RawRecord>,
    /// Source data row number of every entry in `records`.
    pub row_numbers: Vec<usize>,
    /// Rows rejected while parsing or validating, keyed by source row number.
    pub rejected: Vec<RecordError>,
}

/// Ingest a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - CSV must have headers.
/// - Headers must contain all schema fields (order can differ); otherwise the whole batch fails.
/// - Each value is parsed according to the schema field type. A row with an unparseable value, or
///   an empty cell in a non-nullable field, is rejected on its own.
pub fn ingest_csv_from_path(path: impl AsRef<Path>, schema: &Schema) -> IngestionResult<IngestedBatch> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema)
}

/// Ingest CSV data from an existing CSV reader.
pub fn ingest_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
) -> IngestionResult<IngestedBatch> {
    let headers = rdr.headers()?.clone();

    // Map schema fields -> CSV column indexes (allows re-ordered CSV columns).
    let mut col_idxs = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        match headers.iter().position(|h| h.trim() == field.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(IngestionError::SchemaMismatch {
                    message: format!(
                        "missing required column '{field}'. headers={:?}",
                        headers.iter().collect::<Vec<_>>(),
                        field = field.name
                    ),
                });
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut row_numbers = Vec::new();
    let mut rejected = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        let data_row = row_idx0 + 1;
        let record = match result {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                rejected.push(RecordError::Malformed {
                    row: data_row,
                    column: String::new(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let parsed: Result<Vec<Value>, RecordError> = schema
            .fields
            .iter()
            .zip(col_idxs.iter())
            .map(|(field, &csv_idx)| {
                let raw = record.get(csv_idx).unwrap_or("");
                let value = parse_typed_value(data_row, &field.name, field.data_type, raw)?;
                if value.is_null() && !field.nullable {
                    return Err(RecordError::Malformed {
                        row: data_row,
                        column: field.name.clone(),
                        message: "value is required".to_string(),
                    });
                }
                Ok(value)
            })
            .collect();

        match parsed {
            Ok(row) => {
                rows.push(row);
                row_numbers.push(data_row);
            }
            Err(e) => rejected.push(e),
        }
    }

    Ok(IngestedBatch {
        dataset: DataSet::new(schema.clone(), rows),
        row_numbers,
        rejected,
    })
}

fn parse_typed_value(
    row: usize,
    column: &str,
    data_type: DataType,
    raw: &str,
) -> Result<Value, RecordError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let malformed = |message: String| RecordError::Malformed {
        row,
        column: column.to_owned(),
        message: format!("{message} (raw='{raw}')"),
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int64 => parse_integer(trimmed).map(Value::Int64).map_err(malformed),
        DataType::Int32 => trimmed
            .parse::<i32>()
            .map(Value::Int32)
            .map_err(|e| malformed(e.to_string())),
        DataType::Decimal => parse_decimal(trimmed).map(Value::Decimal).map_err(malformed),
        DataType::Float32 => trimmed
            .parse::<f32>()
            .map(Value::Float32)
            .map_err(|e| malformed(e.to_string())),
        DataType::Timestamp => parse_timestamp(trimmed)
            .map(Value::Timestamp)
            .map_err(|e| malformed(e.to_string())),
    }
}

/// Integers may arrive rendered as whole decimals (`4.0`) by upstream writers.
fn parse_integer(s: &str) -> Result<i64, String> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    let d = parse_decimal(s)?;
    if d.fract().is_zero() {
        i64::try_from(d).map_err(|e| e.to_string())
    } else {
        Err("expected integer".to_string())
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, String> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| e.to_string())
}

fn parse_timestamp(s: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
}
