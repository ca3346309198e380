//! Throughput benchmarks for the hot-path comparators.
//!
//! Run with: cargo bench -p mdm-comparators

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mdm_core::types::AttributeValue;
use mdm_comparators::{Comparator, FuzzyComparator, FuzzyMethod, PhoneticComparator, PhoneticMethod};

fn pair(a: &str, b: &str) -> (AttributeValue, AttributeValue) {
    (
        AttributeValue::String(a.to_string()),
        AttributeValue::String(b.to_string()),
    )
}

fn bench_fuzzy(c: &mut Criterion) {
    let mut group = c.benchmark_group("fuzzy");
    let inputs = [
        ("Acme Corp", "ACME Corporation"),
        ("Jonathan Smith", "Jon Smith"),
        ("123 Main Street", "123 Main St"),
    ];
    for method in [FuzzyMethod::Levenshtein, FuzzyMethod::Jaro, FuzzyMethod::JaroWinkler] {
        let comparator = FuzzyComparator::new(method, true);
        for (a, b) in inputs {
            let (left, right) = pair(a, b);
            group.bench_with_input(BenchmarkId::new(format!("{method:?}"), a), &(), |bencher, _| {
                bencher.iter(|| comparator.compare(black_box(&left), black_box(&right)).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_phonetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("phonetic");
    for method in [PhoneticMethod::Soundex, PhoneticMethod::Metaphone, PhoneticMethod::Nysiis] {
        let comparator = PhoneticComparator::new(method);
        let (left, right) = pair("Robert", "Rupert");
        group.bench_with_input(BenchmarkId::new(format!("{method:?}"), "robert_rupert"), &(), |bencher, _| {
            bencher.iter(|| comparator.compare(black_box(&left), black_box(&right)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fuzzy, bench_phonetic);
criterion_main!(benches);
