//! Tests for the aggregation engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;

use vitals_core::aggregator::{Aggregator, AggregatorConfig};
use vitals_core::error::CollectorError;
use vitals_core::sources::{
    from_fn, CollectedMetrics, Collector, MetricSource, SourceRegistry, HEALTH_SOURCE,
    SYSTEM_SOURCE,
};

fn config(deadline: Duration, history_size: usize) -> AggregatorConfig {
    AggregatorConfig {
        enabled: true,
        collection_deadline: deadline,
        history_size,
    }
}

fn empty_map_source(name: &str, delay: Duration) -> MetricSource {
    MetricSource::new(
        name,
        "returns an empty map",
        from_fn(move || async move {
            tokio::time::sleep(delay).await;
            Ok(CollectedMetrics::Structured(Map::new()))
        }),
    )
}

fn failing_source(name: &str) -> MetricSource {
    MetricSource::new(
        name,
        "always fails",
        from_fn(|| async { Err(CollectorError::failed("backend unreachable")) }),
    )
}

struct PanickingCollector;

#[async_trait]
impl Collector for PanickingCollector {
    async fn collect(&self) -> Result<CollectedMetrics, CollectorError> {
        panic!("collector exploded");
    }
}

#[tokio::test]
async fn test_all_sources_succeed() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(empty_map_source("a", Duration::ZERO));
    registry.register(empty_map_source("b", Duration::ZERO));
    let aggregator = Aggregator::new(Arc::clone(&registry), AggregatorConfig::default());

    let snapshot = aggregator.collect_all().await;

    assert_eq!(snapshot.metadata.success_rate, 1.0);
    assert_eq!(snapshot.metadata.total_sources, 2);
    assert!(snapshot.metadata.failures.is_empty());
    assert_eq!(snapshot.custom.len(), 2);
    assert!(Arc::ptr_eq(&snapshot, &aggregator.last_snapshot().unwrap()));
}

#[tokio::test]
async fn test_one_failure_and_one_success() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(empty_map_source("a", Duration::from_millis(10)));
    registry.register(failing_source("b"));
    let aggregator = Aggregator::new(Arc::clone(&registry), AggregatorConfig::default());

    let snapshot = aggregator.collect_all().await;

    assert_eq!(snapshot.custom.get("a"), Some(&json!({})));
    assert!(!snapshot.custom.contains_key("b"));
    assert_eq!(snapshot.metadata.sources["b"].error_count, 1);
    assert_eq!(snapshot.metadata.sources["a"].success_count, 1);
    assert!((snapshot.metadata.success_rate - 0.5).abs() < 1e-9);
    assert!(snapshot.metadata.failures["b"].contains("backend unreachable"));
}

#[tokio::test]
async fn test_panicking_source_is_isolated() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(MetricSource::new("explodes", "panics", Arc::new(PanickingCollector)));
    registry.register(empty_map_source("steady", Duration::ZERO));
    let aggregator = Aggregator::new(Arc::clone(&registry), AggregatorConfig::default());

    let snapshot = aggregator.collect_all().await;

    assert!(snapshot.custom.contains_key("steady"));
    assert!(snapshot.metadata.failures["explodes"].contains("panicked"));
    assert_eq!(registry.get("explodes").unwrap().error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_cycle() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(empty_map_source("fast", Duration::from_millis(5)));
    registry.register(empty_map_source("stuck", Duration::from_secs(60)));
    let deadline = Duration::from_millis(100);
    let aggregator = Aggregator::new(Arc::clone(&registry), config(deadline, 10));

    let started = tokio::time::Instant::now();
    let snapshot = aggregator.collect_all().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= deadline);
    assert!(elapsed < deadline + Duration::from_millis(10));
    assert!(snapshot.custom.contains_key("fast"));
    assert!(!snapshot.custom.contains_key("stuck"));
    assert!(snapshot.metadata.failures["stuck"].contains("deadline"));
    assert_eq!(registry.get("stuck").unwrap().error_count, 1);
    assert_eq!(registry.get("fast").unwrap().success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_pending_sources() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(empty_map_source("stuck", Duration::from_secs(60)));
    let token = CancellationToken::new();
    let aggregator = Arc::new(Aggregator::with_shutdown(
        Arc::clone(&registry),
        AggregatorConfig::default(),
        token.clone(),
    ));

    let running = Arc::clone(&aggregator);
    let handle = tokio::spawn(async move { running.collect_all().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let snapshot = handle.await.unwrap();
    assert!(snapshot.metadata.failures["stuck"].contains("cancelled"));
}

#[tokio::test]
async fn test_history_keeps_most_recent_snapshots() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(empty_map_source("a", Duration::ZERO));
    let aggregator = Aggregator::new(Arc::clone(&registry), config(Duration::from_secs(5), 3));

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(aggregator.collect_all().await.id);
    }

    assert_eq!(aggregator.history_len(), 3);
    let kept: Vec<_> = aggregator.history().iter().map(|s| s.id).collect();
    assert_eq!(kept, ids[2..].to_vec());
}

#[tokio::test]
async fn test_disabled_aggregator_does_not_collect() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = Arc::new(SourceRegistry::new());
    registry.register(MetricSource::new(
        "counted",
        "counts calls",
        from_fn(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(CollectedMetrics::from("up 1"))
            }
        }),
    ));
    let aggregator = Aggregator::new(Arc::clone(&registry), AggregatorConfig::default());
    aggregator.set_enabled(false);

    let snapshot = aggregator.collect_all().await;

    assert!(!snapshot.metadata.enabled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(aggregator.last_snapshot().is_none());
    assert_eq!(aggregator.history_len(), 0);
}

#[tokio::test]
async fn test_reserved_names_are_filed_by_shape() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(MetricSource::new(
        SYSTEM_SOURCE,
        "text",
        from_fn(|| async { Ok(CollectedMetrics::from("process_up 1\n")) }),
    ));
    registry.register(MetricSource::new(
        HEALTH_SOURCE,
        "wrong shape",
        from_fn(|| async { Ok(CollectedMetrics::from("not a map")) }),
    ));
    let aggregator = Aggregator::new(Arc::clone(&registry), AggregatorConfig::default());

    let snapshot = aggregator.collect_all().await;

    assert_eq!(snapshot.system.as_deref(), Some("process_up 1\n"));
    assert!(snapshot.health.is_none());
    assert_eq!(snapshot.custom.get(HEALTH_SOURCE), Some(&json!("not a map")));
}

#[tokio::test]
async fn test_empty_registry_yields_empty_snapshot() {
    let aggregator = Aggregator::new(Arc::new(SourceRegistry::new()), AggregatorConfig::default());

    let snapshot = aggregator.collect_all().await;

    assert_eq!(snapshot.metadata.total_sources, 0);
    assert_eq!(snapshot.metadata.success_rate, 0.0);
    assert_eq!(aggregator.history_len(), 1);
}

#[tokio::test]
async fn test_clear_drops_history_and_last_snapshot() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(empty_map_source("a", Duration::ZERO));
    let aggregator = Aggregator::new(registry, AggregatorConfig::default());
    aggregator.collect_all().await;

    aggregator.clear();

    assert!(aggregator.last_snapshot().is_none());
    assert!(aggregator.exposition().is_none());
    assert_eq!(aggregator.history_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_cycles_both_complete() {
    // Each collection waits for the other cycle's collection to start.
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let registry = Arc::new(SourceRegistry::new());
    registry.register(MetricSource::new(
        "rendezvous",
        "waits for a second caller",
        from_fn(move || {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok(CollectedMetrics::Structured(Map::new()))
            }
        }),
    ));
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&registry),
        config(Duration::from_secs(5), 10),
    ));

    let first = tokio::spawn({
        let aggregator = Arc::clone(&aggregator);
        async move { aggregator.collect_all().await }
    });
    let second = tokio::spawn({
        let aggregator = Arc::clone(&aggregator);
        async move { aggregator.collect_all().await }
    });
    let (first, second) = (first.await.unwrap(), second.await.unwrap());

    assert_ne!(first.id, second.id);
    assert!(first.metadata.failures.is_empty());
    assert!(second.metadata.failures.is_empty());
    let source = registry.get("rendezvous").unwrap();
    assert_eq!(source.success_count, 2);
    assert_eq!(source.error_count, 0);
    assert_eq!(aggregator.history_len(), 2);
}
