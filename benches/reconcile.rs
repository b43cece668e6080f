use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use sales_reconcile::processing::{normalize, reconcile};
use sales_reconcile::schema::RawRecord;

/// Mixed batch: every fifth row all-null, then alternating missing quantity / missing total.
fn batch(n: usize) -> Vec<RawRecord> {
    let at = NaiveDate::from_ymd_opt(2023, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let price = Decimal::new(1999 + (i % 50) as i64 * 100, 2);
            let (price, quantity, total) = match i % 5 {
                4 => (None, None, None),
                0 | 2 => (Some(price), None, Some(price * Decimal::from(3))),
                _ => (Some(price), Some((i % 9 + 1) as i64), None),
            };
            RawRecord {
                product: format!("product-{}", i % 17),
                price,
                quantity,
                total,
                ordered_at: at,
                delivery_at: at,
            }
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for n in [1_000usize, 100_000] {
        let input = batch(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("reconcile", n), &input, |b, input| {
            b.iter(|| reconcile(black_box(input)))
        });
        let reconciled = reconcile(&input).records;
        group.bench_with_input(BenchmarkId::new("normalize", n), &reconciled, |b, input| {
            b.iter(|| normalize(black_box(input)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
