//! Aggregation throughput benchmarks.
//!
//! Measures a full collection cycle over varying source counts, and the
//! exposition formatter on the resulting snapshot.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Map};
use tokio::runtime::Runtime;

use vitals_core::aggregator::{render, Aggregator, AggregatorConfig};
use vitals_core::sources::{from_fn, CollectedMetrics, MetricSource, SourceRegistry};

fn registry_with(source_count: usize) -> Arc<SourceRegistry> {
    let registry = Arc::new(SourceRegistry::new());
    for i in 0..source_count {
        registry.register(MetricSource::new(
            format!("source-{}", i),
            "bench source",
            from_fn(|| async {
                let mut map = Map::new();
                map.insert("requests".to_string(), json!(1024));
                map.insert("latency".to_string(), json!({ "p50": 0.01, "p99": 0.2 }));
                Ok(CollectedMetrics::Structured(map))
            }),
        ));
    }
    registry
}

fn bench_collect_all(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("collect_all");

    for source_count in [1, 8, 64] {
        let aggregator = Aggregator::new(registry_with(source_count), AggregatorConfig::default());
        group.throughput(Throughput::Elements(source_count as u64));
        group.bench_function(BenchmarkId::new("sources", source_count), |b| {
            b.to_async(&rt).iter(|| async { black_box(aggregator.collect_all().await) })
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("render");

    for source_count in [8, 64] {
        let aggregator = Aggregator::new(registry_with(source_count), AggregatorConfig::default());
        let snapshot = rt.block_on(aggregator.collect_all());
        group.bench_function(BenchmarkId::new("sources", source_count), |b| {
            b.iter(|| black_box(render(black_box(&snapshot))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collect_all, bench_render);
criterion_main!(benches);
