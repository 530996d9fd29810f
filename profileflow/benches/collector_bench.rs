//! Benchmarks for merge throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use profileflow::core::{SourceId, SourceResult};
use profileflow::merge::{MergePolicy, Merger};
use std::collections::BTreeMap;
use std::time::Duration;

fn merge_benchmark(c: &mut Criterion) {
    let merger = Merger::new(MergePolicy::default());

    let base: BTreeMap<String, serde_json::Value> = (0..10)
        .map(|i| (format!("base_{i}"), serde_json::json!(i)))
        .collect();

    let results: Vec<SourceResult> = SourceId::ALL
        .iter()
        .map(|id| {
            let data = (0..20)
                .map(|i| (format!("field_{i}"), serde_json::json!(format!("{id}-{i}"))))
                .collect();
            SourceResult::success(*id, data, Duration::from_millis(1))
        })
        .collect();

    c.bench_function("merge_nine_sources", |b| {
        b.iter(|| black_box(merger.merge(base.clone(), &results)))
    });
}

criterion_group!(benches, merge_benchmark);
criterion_main!(benches);
