//! Throughput benchmarks for candidate-pair generation.
//!
//! Run with: cargo bench -p mdm-blocking

use std::collections::BTreeMap;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mdm_blocking::{BlockingStrategy, SortedNeighborhoodBlocker, StandardBlocker};
use mdm_core::types::{AttributeValue, Attributes, NormalizedRecord, Record};

fn make_records(count: usize, cities: usize) -> Vec<NormalizedRecord> {
    (0..count)
        .map(|i| {
            let city = format!("city-{}", i % cities);
            let mut attrs: Attributes = BTreeMap::new();
            attrs.insert("city".to_string(), AttributeValue::String(city.clone()));
            attrs.insert(
                "name".to_string(),
                AttributeValue::String(format!("record-{i:05}")),
            );
            let record = Record {
                record_id: format!("rec-{i:06}"),
                source_id: "bench".to_string(),
                attributes: attrs.clone(),
                ingest_time: Utc::now(),
                source_timestamp: Utc::now(),
            };
            NormalizedRecord::new(record, attrs, BTreeMap::new())
        })
        .collect()
}

fn bench_standard_blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("standard_blocking");
    for size in [1_000, 5_000, 20_000] {
        let records = make_records(size, 50);
        let blocker = StandardBlocker::new(vec!["city".to_string()], size);
        group.bench_with_input(BenchmarkId::new("generate_pairs", size), &size, |b, _| {
            b.iter(|| blocker.generate_pairs(black_box(&records)).unwrap());
        });
    }
    group.finish();
}

fn bench_sorted_neighborhood(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_neighborhood");
    for size in [1_000, 5_000, 20_000] {
        let records = make_records(size, 50);
        let blocker = SortedNeighborhoodBlocker::new(vec!["name".to_string()], 10);
        group.bench_with_input(BenchmarkId::new("generate_pairs", size), &size, |b, _| {
            b.iter(|| blocker.generate_pairs(black_box(&records)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_standard_blocking, bench_sorted_neighborhood);
criterion_main!(benches);
