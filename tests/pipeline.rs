use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use sales_reconcile::PipelineError;
use sales_reconcile::error::LoadError;
use sales_reconcile::ingestion::{BatchSource, SourceFilter, discover_sources};
use sales_reconcile::load::{BatchLoader, CsvTableSink, MemorySink, RetryPolicy, TableId};
use sales_reconcile::pipeline::Pipeline;

fn tmp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("sales-reconcile-it-{tag}-{nanos}"));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn table() -> TableId {
    TableId::new("acme", "sales", "orders")
}

fn memory_pipeline() -> Pipeline<MemorySink> {
    Pipeline::new(table(), BatchLoader::new(MemorySink::new(), RetryPolicy::default()))
}

#[test]
fn fixture_batch_is_repaired_and_loaded() {
    let pipeline = memory_pipeline();
    let report = pipeline
        .run_batch(&BatchSource::new("tests/fixtures/sales.csv"))
        .unwrap();

    assert_eq!(report.rows_read, 8);
    assert_eq!(report.rows_loaded(), 4);
    assert_eq!(report.rejected.malformed, 2);
    assert_eq!(report.rejected.unrecoverable, 1);
    assert_eq!(report.rejected.derivation_failure, 1);
    assert_eq!(report.rejected.cast, 0);
    assert_eq!(report.load.table, table());
    assert_eq!(report.load.attempts, 1);

    let rows = pipeline.loader.sink().rows(&table());
    let products: Vec<&str> = rows.iter().map(|r| r.product.as_str()).collect();
    assert_eq!(products, vec!["Laptops", "Headphones", "Monitors", "Mice"]);

    // Laptops: quantity derived from 150000 / 50000.
    assert_eq!(rows[0].quantity, 3);
    assert_eq!(rows[0].total, 150_000.0);
    // Headphones: total derived from 2000 * 4.
    assert_eq!(rows[1].quantity, 4);
    assert_eq!(rows[1].total, 8000.0);
    // Monitors: all present, untouched.
    assert_eq!(rows[2].price, Some(12_500.5));
    assert_eq!(rows[2].total, 25_001.0);
    // Mice: price stays null.
    assert_eq!(rows[3].price, None);
    assert_eq!(rows[3].quantity, 3);

    assert!(rows.iter().all(|r| r.processed_at == rows[0].processed_at));
}

#[test]
fn every_fifth_all_null_row_is_dropped() {
    let dir = tmp_dir("fifths");
    let n = 103usize;
    let mut text = String::from("product,price,quantity,total,ordered_at,delivery_at\n");
    for i in 0..n {
        if i % 5 == 4 {
            text.push_str("Tablets,,,,2023-03-01 12:00:00,2023-03-03 12:00:00\n");
        } else {
            text.push_str(&format!(
                "Headphones,2000,{},,2023-03-01 11:00:00,2023-03-02 09:00:00\n",
                i % 7 + 1
            ));
        }
    }
    let path = dir.join("batch.csv");
    fs::write(&path, text).unwrap();

    let pipeline = memory_pipeline();
    let report = pipeline.run_batch(&BatchSource::new(&path)).unwrap();

    assert_eq!(report.rows_read, n);
    assert_eq!(report.rejected.unrecoverable, n / 5);
    assert_eq!(report.rows_loaded(), n - n / 5);
    assert!(
        pipeline
            .loader
            .sink()
            .rows(&table())
            .iter()
            .all(|r| r.product == "Headphones")
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn batches_accumulate_in_the_table_file() {
    let dir = tmp_dir("csv-table");
    let sink = CsvTableSink::open(dir.join("warehouse"), dir.join("staging")).unwrap();
    let table_path = sink.table_path(&table());
    let pipeline = Pipeline::new(table(), BatchLoader::new(sink, RetryPolicy::default()));

    pipeline
        .run_batch(&BatchSource::new("tests/fixtures/sales.csv"))
        .unwrap();
    pipeline
        .run_batch(&BatchSource::new("tests/fixtures/sales_reordered.csv"))
        .unwrap();

    let text = fs::read_to_string(&table_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "product,price,quantity,total,ordered_at,delivery_at,processed_at"
    );
    assert_eq!(lines.len(), 1 + 4 + 2);
    assert!(lines[1].starts_with("Laptops,50000,3,150000,2023-03-01 10:00:00,2023-03-05 12:00:00,"));
    assert!(lines[2].starts_with("Headphones,2000,4,8000,"));
    assert!(lines[4].starts_with("Mice,,3,75,"));
    assert_eq!(fs::read_dir(dir.join("staging")).unwrap().count(), 0);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn table_with_foreign_header_fails_the_batch_without_writing() {
    let dir = tmp_dir("csv-mismatch");
    let sink = CsvTableSink::open(dir.join("warehouse"), dir.join("staging")).unwrap();
    let table_path = sink.table_path(&table());
    fs::create_dir_all(table_path.parent().unwrap()).unwrap();
    let existing = "product,price,qty,total,ordered_at,delivery_at,processed_at\n";
    fs::write(&table_path, existing).unwrap();

    let pipeline = Pipeline::new(table(), BatchLoader::new(sink, RetryPolicy::default()));
    let err = pipeline
        .run_batch(&BatchSource::new("tests/fixtures/sales.csv"))
        .unwrap_err();

    match err {
        PipelineError::Load(LoadError::SchemaMismatch { table: t, columns }) => {
            assert_eq!(t, table());
            assert!(columns.contains(&"quantity".to_string()));
            assert!(columns.contains(&"qty".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fs::read_to_string(&table_path).unwrap(), existing);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn ingestion_failure_fails_the_batch() {
    let pipeline = memory_pipeline();
    let err = pipeline
        .run_batch(&BatchSource::new("tests/fixtures/sales_missing_total.csv"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingestion(_)));
    assert!(pipeline.loader.sink().rows(&table()).is_empty());
}

#[test]
fn directory_discovery_honours_prefix_and_suffix() {
    let sources = discover_sources("tests/fixtures/landing", &SourceFilter::with_prefix("raw/")).unwrap();
    let names: Vec<String> = sources
        .iter()
        .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["sales_2023_03_02.csv", "sales_2023_03_01.csv"]);

    let all = discover_sources("tests/fixtures/landing", &SourceFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn glob_and_single_file_discovery() {
    let sources = discover_sources("tests/fixtures/landing/raw/*.csv", &SourceFilter::default()).unwrap();
    assert_eq!(sources.len(), 1);

    let single = discover_sources("tests/fixtures/sales.csv", &SourceFilter::default()).unwrap();
    assert_eq!(single, vec![BatchSource::new("tests/fixtures/sales.csv")]);

    assert!(discover_sources("tests/fixtures/landing/raw/notes.txt", &SourceFilter::default()).is_err());
    assert!(discover_sources("tests/fixtures/nowhere/*.csv", &SourceFilter::default()).is_err());
}
