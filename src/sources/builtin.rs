//! Built-in metric sources.
//!
//! - `system`: raw exposition text from an [`ExpositionRenderer`]
//! - `health`: system and process stats, database connectivity, uptime
//! - `data-access`: exposition text rendered from operation statistics
//! - `data-access-stats`: aggregate operation health as a structured map

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use super::collector::{from_fn, CollectedMetrics};
use super::registry::MetricSource;
use super::system_stats::SystemStatsProvider;
use crate::error::CollectorError;
use crate::instrumentation::{DataAccessClient, Instrumentation};
use crate::telemetry::{host_name, MetricsStore};

pub const SYSTEM_SOURCE: &str = "system";
pub const HEALTH_SOURCE: &str = "health";
pub const PERFORMANCE_SOURCE: &str = "performance";
pub const BUSINESS_SOURCE: &str = "business";
pub const DATA_ACCESS_SOURCE: &str = "data-access";
pub const DATA_ACCESS_STATS_SOURCE: &str = "data-access-stats";

/// Statement used to check database connectivity.
pub const PING_STATEMENT: &str = "SELECT 1";

/// Renders system-level metrics in exposition format.
pub trait ExpositionRenderer: Send + Sync {
    fn render(&self) -> String;
}

/// Renders the contents of a [`MetricsStore`].
pub struct StoreRenderer {
    store: Arc<MetricsStore>,
}

impl StoreRenderer {
    pub fn new(store: Arc<MetricsStore>) -> Self {
        Self { store }
    }
}

impl ExpositionRenderer for StoreRenderer {
    fn render(&self) -> String {
        self.store.render_exposition()
    }
}

pub fn system_source(renderer: Arc<dyn ExpositionRenderer>) -> MetricSource {
    let collector = from_fn(move || {
        let renderer = Arc::clone(&renderer);
        async move { Ok(CollectedMetrics::Text(renderer.render())) }
    });
    MetricSource::new(SYSTEM_SOURCE, "System-level metrics in exposition format", collector)
        .with_tags([("kind", "system")])
}

/// Inputs of the `health` source.
#[derive(Clone)]
pub struct HealthProbe {
    pub stats: Arc<dyn SystemStatsProvider>,
    pub database: Option<Arc<dyn DataAccessClient>>,
    pub started: Instant,
}

impl HealthProbe {
    pub async fn collect(&self) -> Result<CollectedMetrics, CollectorError> {
        let stats = self.stats.sample().await?;

        let mut map = Map::new();
        map.insert(
            "system".to_string(),
            json!({
                "cpu": stats.cpu,
                "memory": stats.memory,
                "disk": stats.disk,
                "network": stats.network,
            }),
        );
        map.insert("process".to_string(), json!(stats.process));
        if let Some(database) = &self.database {
            map.insert("database".to_string(), ping(database.as_ref()).await);
        }
        map.insert(
            "uptime_seconds".to_string(),
            json!(self.started.elapsed().as_secs_f64()),
        );
        map.insert("host".to_string(), json!(host_name()));

        Ok(CollectedMetrics::Structured(map))
    }
}

async fn ping(client: &dyn DataAccessClient) -> Value {
    let started = tokio::time::Instant::now();
    match client.query_raw(PING_STATEMENT, &[]).await {
        Ok(_) => json!({
            "connected": true,
            "response_time_seconds": started.elapsed().as_secs_f64(),
        }),
        Err(err) => {
            tracing::debug!(error = %err, "database ping failed");
            json!({ "connected": false, "error": err.to_string() })
        }
    }
}

pub fn health_source(probe: HealthProbe) -> MetricSource {
    let probe = Arc::new(probe);
    let collector = from_fn(move || {
        let probe = Arc::clone(&probe);
        async move { probe.collect().await }
    });
    MetricSource::new(HEALTH_SOURCE, "Host, process and database health", collector)
        .with_tags([("kind", "health")])
}

pub fn data_access_source(instrumentation: Arc<Instrumentation>) -> MetricSource {
    let collector = from_fn(move || {
        let instrumentation = Arc::clone(&instrumentation);
        async move { Ok(CollectedMetrics::Text(instrumentation.render_exposition())) }
    });
    MetricSource::new(DATA_ACCESS_SOURCE, "Data-access operation metrics", collector)
        .with_tags([("kind", "data-access")])
}

pub fn data_access_stats_source(instrumentation: Arc<Instrumentation>) -> MetricSource {
    let collector = from_fn(move || {
        let instrumentation = Arc::clone(&instrumentation);
        async move { CollectedMetrics::structured(&instrumentation.health_metrics()) }
    });
    MetricSource::new(
        DATA_ACCESS_STATS_SOURCE,
        "Aggregate data-access operation statistics",
        collector,
    )
    .with_tags([("kind", "data-access")])
}
