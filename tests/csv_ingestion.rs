use chrono::NaiveDate;
use rust_decimal::Decimal;
use sales_reconcile::RecordError;
use sales_reconcile::ingestion::csv::{RawBatch, ingest_csv_from_path, ingest_csv_from_reader};
use sales_reconcile::schema::raw_sales_schema;
use sales_reconcile::types::Value;

fn reader(input: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes())
}

#[test]
fn ingest_csv_from_path_keeps_good_rows_and_rejects_bad_ones() {
    let batch = ingest_csv_from_path("tests/fixtures/sales.csv", &raw_sales_schema()).unwrap();

    assert_eq!(batch.rows_read(), 8);
    assert_eq!(batch.dataset.row_count(), 7);
    assert_eq!(batch.row_numbers, vec![1, 2, 3, 4, 6, 7, 8]);
    assert_eq!(batch.rejected.len(), 1);
    match &batch.rejected[0] {
        RecordError::Malformed { row, column, .. } => {
            assert_eq!(*row, 5);
            assert_eq!(column, "price");
        }
        other => panic!("unexpected reject: {other:?}"),
    }

    let ordered_at = NaiveDate::from_ymd_opt(2023, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    assert_eq!(
        batch.dataset.rows[0],
        vec![
            Value::Utf8("Laptops".to_string()),
            Value::Decimal(Decimal::from(50_000)),
            Value::Null,
            Value::Decimal(Decimal::from(150_000)),
            Value::Timestamp(ordered_at),
            Value::Timestamp(ordered_at + chrono::Duration::hours(98)),
        ]
    );
}

#[test]
fn range_violations_are_rejected_when_building_records() {
    let batch = ingest_csv_from_path("tests/fixtures/sales.csv", &raw_sales_schema()).unwrap();
    let RawBatch { records, rejected, .. } = batch.into_raw_records();

    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.product != "Speakers"));
    assert_eq!(rejected.len(), 2);
    assert!(matches!(
        &rejected[1],
        RecordError::Malformed { row: 8, column, .. } if column == "delivery_at"
    ));
}

#[test]
fn ingest_csv_allows_reordered_columns() {
    let batch = ingest_csv_from_path("tests/fixtures/sales_reordered.csv", &raw_sales_schema()).unwrap();
    let RawBatch { records, rejected, .. } = batch.into_raw_records();

    assert!(rejected.is_empty());
    assert_eq!(records[0].product, "Laptops");
    assert_eq!(records[0].price, Some(Decimal::from(50_000)));
    assert_eq!(records[0].quantity, None);
    assert_eq!(records[1].quantity, Some(4));
    assert_eq!(records[1].total, None);
}

#[test]
fn ingest_csv_errors_on_missing_column() {
    let err = ingest_csv_from_path("tests/fixtures/sales_missing_total.csv", &raw_sales_schema()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("schema mismatch"));
    assert!(msg.contains("missing required column 'total'"));
}

#[test]
fn empty_required_cell_rejects_only_that_row() {
    let input = "product,price,quantity,total,ordered_at,delivery_at\n\
                 ,10,1,10,2023-01-01 00:00:00,2023-01-02 00:00:00\n\
                 Mice,10,1,10,2023-01-01 00:00:00,2023-01-02 00:00:00\n";
    let batch = ingest_csv_from_reader(&mut reader(input), &raw_sales_schema()).unwrap();

    assert_eq!(batch.dataset.row_count(), 1);
    let msg = batch.rejected[0].to_string();
    assert!(msg.contains("row 1"));
    assert!(msg.contains("column 'product'"));
    assert!(msg.contains("value is required"));
}

#[test]
fn whole_decimal_quantities_and_scientific_prices_parse() {
    let input = "product,price,quantity,total,ordered_at,delivery_at\n\
                 Mice,2.5E1,4.0,,2023-01-01 00:00:00.250,2023-01-02 00:00:00\n";
    let batch = ingest_csv_from_reader(&mut reader(input), &raw_sales_schema()).unwrap();
    let RawBatch { records, rejected, .. } = batch.into_raw_records();

    assert!(rejected.is_empty());
    assert_eq!(records[0].price, Some(Decimal::from(25)));
    assert_eq!(records[0].quantity, Some(4));
}
