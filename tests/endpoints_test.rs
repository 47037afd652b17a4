//! End-to-end tests for the runtime wiring and the scrape/health handlers.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{FixedStats, MemoryClient, MemoryDelegate};
use vitals_core::aggregator::{Aggregator, AggregatorConfig, EXPOSITION_CONTENT_TYPE};
use vitals_core::config::EnvConfig;
use vitals_core::endpoints::{HealthHandler, ScrapeHandler};
use vitals_core::health::HealthStatus;
use vitals_core::instrumentation::{DataAccessClient, EntityDelegate};
use vitals_core::shutdown::Lifecycle;
use vitals_core::sources::{from_fn, CollectedMetrics, MetricSource, SourceRegistry};
use vitals_core::VitalsRuntime;

fn runtime() -> VitalsRuntime {
    VitalsRuntime::with_stats_provider(EnvConfig::default(), Arc::new(FixedStats))
}

#[tokio::test]
async fn test_runtime_registers_builtin_sources() {
    let runtime = runtime();
    assert_eq!(
        runtime.registry.source_names(),
        vec!["system", "health", "data-access", "data-access-stats"]
    );
}

#[tokio::test]
async fn test_scrape_renders_fresh_cycle() {
    let runtime = runtime();
    let response = runtime.scrape_handler().scrape().await;

    assert_eq!(response.content_type, EXPOSITION_CONTENT_TYPE);
    assert!(response.body.contains("# Data-access metrics\n"));
    assert!(response.body.contains("system_cpu_cores 4\n"));
    assert!(response.body.contains("system_cpu_usage_ratio 0.25\n"));
    assert!(response.body.contains("system_disk_usage_ratio 0.75\n"));
    assert!(response.body.contains("process_cpu_usage_ratio 0.5\n"));
    assert!(response.body.contains("process_start_time_seconds 1700000000"));
    assert!(response.body.contains("metrics_sources_total 4\n"));
    assert!(response.body.contains("metrics_success_rate 1\n"));
    assert_eq!(runtime.aggregator.history_len(), 1);
}

#[tokio::test]
async fn test_health_is_healthy_after_clean_cycle() {
    let runtime = runtime();
    let summary = runtime.health_handler().health().await;

    assert_eq!(summary.status, HealthStatus::Healthy);
    assert!(summary.healthy);
    assert_eq!(summary.total_sources, Some(4));
    assert!(summary.uptime_seconds.is_some());
    assert!(summary.database_connected.is_none());
}

#[tokio::test]
async fn test_attached_client_shows_up_in_scrape_and_health() {
    let runtime = runtime();
    let delegate: Arc<dyn EntityDelegate> = Arc::new(MemoryDelegate::new("user"));
    let client: Arc<dyn DataAccessClient> = Arc::new(MemoryClient::new(vec![delegate]));

    let proxy = runtime.attach_data_access(client);
    proxy.delegate("user").unwrap().create(json!({ "data": {} })).await.unwrap();

    let body = runtime.scrape_handler().scrape().await.body;
    assert!(body.contains("data_access_operations_total{entity=\"user\",operation=\"create\"} 1"));
    assert!(body.contains("database_connected 1\n"));

    let summary = runtime.health_handler().health().await;
    assert_eq!(summary.database_connected, Some(true));
    // The health ping goes to the original client.
    assert!(runtime.instrumentation.stats_for("client.query_raw").is_none());
}

#[tokio::test]
async fn test_structured_stats_land_in_custom() {
    let runtime = runtime();
    runtime.aggregator.collect_all().await;

    let snapshot = runtime.aggregator.last_snapshot().unwrap();
    let stats = &snapshot.custom["data-access-stats"];
    assert_eq!(stats["total_operations"], json!(0));
}

#[tokio::test]
async fn test_runtime_shutdown_stops_handlers() {
    let runtime = runtime();
    runtime.scrape_handler().scrape().await;
    let health = runtime.health_handler();
    assert!(health.is_alive());

    runtime.shutdown().await;

    assert!(!health.is_alive());
    assert!(runtime.scrape_handler().scrape().await.body.is_empty());
    assert_eq!(health.health().await.status, HealthStatus::NoData);
    assert!(runtime.telemetry.meter_cache().is_empty());
}

#[tokio::test]
async fn test_stopped_lifecycle_serves_last_snapshot() {
    let registry = Arc::new(SourceRegistry::new());
    registry.register(MetricSource::new(
        "system",
        "static text",
        from_fn(|| async { Ok(CollectedMetrics::from("process_up 1")) }),
    ));
    let aggregator = Arc::new(Aggregator::new(registry, AggregatorConfig::default()));
    let lifecycle = Arc::new(Lifecycle::new());
    let scrape = ScrapeHandler::new(Arc::clone(&aggregator), Arc::clone(&lifecycle));
    let health = HealthHandler::new(Arc::clone(&aggregator), Arc::clone(&lifecycle));

    let before = scrape.scrape().await.body;
    lifecycle.shutdown(std::time::Duration::from_secs(1)).await;
    let after = scrape.scrape().await.body;

    assert_eq!(before, after);
    assert_eq!(aggregator.history_len(), 1);
    assert!(health.health().await.healthy);
}
