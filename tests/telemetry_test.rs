//! Tests for the handle caches, telemetry hub, metric store and logging.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vitals_core::telemetry::{
    init_logging, HandleCache, LogConfig, LogError, LogFormat, MetricsStore, Telemetry,
};

#[test]
fn test_cache_key_defaults_version() {
    assert_eq!(HandleCache::<u32>::cache_key("db", None), "db:default");
    assert_eq!(HandleCache::<u32>::cache_key("db", Some("1.2")), "db:1.2");
}

#[test]
fn test_cache_hit_does_not_create() {
    let cache: HandleCache<Arc<String>> = HandleCache::new(4);
    let created = AtomicUsize::new(0);
    let create = |n: &str, _: Option<&str>| {
        created.fetch_add(1, Ordering::SeqCst);
        Arc::new(n.to_string())
    };

    let first = cache.get_or_create("svc", None, create);
    let second = cache.get_or_create("svc", None, create);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cache_evicts_least_recently_used() {
    let cache: HandleCache<u32> = HandleCache::new(3);
    cache.get_or_create("a", None, |_, _| 1);
    cache.get_or_create("b", None, |_, _| 2);
    cache.get_or_create("c", None, |_, _| 3);

    // Touch `a` so `b` becomes the oldest.
    assert_eq!(cache.get("a", None), Some(1));
    cache.get_or_create("d", None, |_, _| 4);

    assert_eq!(cache.len(), 3);
    assert!(cache.contains("a", None));
    assert!(!cache.contains("b", None));
    assert!(cache.contains("c", None));
    assert!(cache.contains("d", None));
}

#[test]
fn test_cache_never_exceeds_capacity() {
    let cache: HandleCache<usize> = HandleCache::new(5);
    for i in 0..50 {
        cache.get_or_create(&format!("scope-{}", i), Some("1"), |_, _| i);
        assert!(cache.len() <= cache.capacity());
    }
    assert!(cache.contains("scope-49", Some("1")));
}

#[test]
fn test_cache_versions_are_distinct_entries() {
    let cache: HandleCache<u32> = HandleCache::new(4);
    cache.get_or_create("db", Some("1"), |_, _| 1);
    cache.get_or_create("db", Some("2"), |_, _| 2);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("db", Some("2")), Some(2));
}

#[test]
fn test_zero_capacity_is_raised_to_one() {
    let cache: HandleCache<u32> = HandleCache::new(0);
    cache.get_or_create("a", None, |_, _| 1);
    cache.get_or_create("b", None, |_, _| 2);

    assert_eq!(cache.capacity(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_hub_returns_cached_handles() {
    let telemetry = Telemetry::with_store(Arc::new(MetricsStore::new()));

    let a = telemetry.meter("vitals.test", Some("1"));
    let b = telemetry.meter("vitals.test", Some("1"));
    assert!(Arc::ptr_eq(&a, &b));

    telemetry.tracer("vitals.test", None);
    assert_eq!(telemetry.tracer_cache().len(), 1);

    telemetry.shutdown();
    assert!(telemetry.meter_cache().is_empty());
    assert!(telemetry.tracer_cache().is_empty());
}

#[test]
fn test_store_meter_writes_series() {
    let store = Arc::new(MetricsStore::new());
    let telemetry = Telemetry::with_store(Arc::clone(&store));
    let meter = telemetry.meter("vitals.test", None);

    let counter = meter.counter("requests_total", "Handled requests", "");
    counter.add(2, &[("route", "/metrics")]);
    counter.add(1, &[("route", "/metrics")]);
    let histogram = meter.histogram("latency_seconds", "Request latency", "s");
    histogram.record(0.5, &[]);
    histogram.record(1.5, &[]);
    let gauge = meter.up_down_counter("open", "Open things", "");
    gauge.add(3, &[]);
    gauge.add(-1, &[]);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.counters.get("requests_total{route=\"/metrics\"}"), Some(&3));
    assert_eq!(snapshot.gauges.get("open"), Some(&2.0));
    let latency = &snapshot.histograms["latency_seconds"];
    assert_eq!(latency.count, 2);
    assert_eq!(latency.mean(), 1.0);
    assert_eq!(latency.min, 0.5);
    assert_eq!(latency.max, 1.5);
}

#[test]
fn test_store_exposition_has_headers() {
    let store = MetricsStore::new();
    store.describe("requests_total", "Handled requests");
    store.increment_counter("requests_total", &[("code", "200")], 4);
    store.set_gauge("temperature", &[], 21.5);

    let text = store.render_exposition();
    assert!(text.contains("# HELP requests_total Handled requests\n"));
    assert!(text.contains("# TYPE requests_total counter\n"));
    assert!(text.contains("requests_total{code=\"200\"} 4\n"));
    assert!(text.contains("# TYPE temperature gauge\n"));
    assert!(text.contains("temperature 21.5\n"));
}

#[test]
fn test_histogram_extremes_are_separate_gauge_families() {
    let store = MetricsStore::new();
    store.describe("latency_seconds", "Request latency");
    store.record_histogram("latency_seconds", &[("route", "/a")], 0.5);
    store.record_histogram("latency_seconds", &[("route", "/a")], 1.5);
    store.record_histogram("latency_seconds", &[("route", "/b")], 0.25);

    let text = store.render_exposition();
    assert!(text.contains("# TYPE latency_seconds summary\n"));
    assert!(text.contains("latency_seconds_count{route=\"/a\"} 2\n"));
    assert!(text.contains("latency_seconds_sum{route=\"/a\"} 2\n"));
    assert!(text.contains("# TYPE latency_seconds_min gauge\n"));
    assert!(text.contains("# TYPE latency_seconds_max gauge\n"));
    assert!(text.contains("latency_seconds_min{route=\"/b\"} 0.25\n"));
    assert!(text.contains("latency_seconds_max{route=\"/a\"} 1.5\n"));

    // Every sample line belongs to the family declared just above it.
    let mut family = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            family = rest.split_whitespace().next().unwrap().to_string();
        } else if !line.starts_with('#') {
            let name = line.split(['{', ' ']).next().unwrap();
            let allowed = [family.clone(), format!("{}_count", family), format!("{}_sum", family)];
            assert!(allowed.contains(&name.to_string()), "{} outside {}", name, family);
        }
    }
}

#[test]
fn test_log_format_parse() {
    assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
    assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
    assert_eq!(LogFormat::parse("xml"), None);
}

#[test]
fn test_invalid_log_filter_is_rejected() {
    let config = LogConfig {
        format: LogFormat::Json,
        level: "vitals_core=notalevel".to_string(),
        output_path: None,
    };
    assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
}
