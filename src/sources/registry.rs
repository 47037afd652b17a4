//! Metric source registry.
//!
//! Sources are kept in registration order and keyed by unique name.
//! Registering an existing name replaces the entry in place with fresh
//! counters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::collector::Collector;
use crate::error::SourceCollectionError;

/// One named metrics source.
#[derive(Clone)]
pub struct MetricSource {
    pub name: String,
    pub description: String,
    pub endpoint: Option<String>,
    pub collector: Option<Arc<dyn Collector>>,
    pub enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub success_count: u64,
    /// Running mean over successful collections.
    pub average_collection_time: Duration,
    pub tags: BTreeMap<String, String>,
    pub last_error: Option<String>,
}

impl MetricSource {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        Self::with_collector(name.into(), description.into(), Some(collector))
    }

    /// A source with no collector. Listed in metadata, never collected.
    pub fn passive(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_collector(name.into(), description.into(), None)
    }

    fn with_collector(
        name: String,
        description: String,
        collector: Option<Arc<dyn Collector>>,
    ) -> Self {
        Self {
            name,
            description,
            endpoint: None,
            collector,
            enabled: true,
            last_updated: None,
            error_count: 0,
            success_count: 0,
            average_collection_time: Duration::ZERO,
            tags: BTreeMap::new(),
            last_error: None,
        }
    }

    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Record one successful collection taking `elapsed`.
    pub fn record_success(&mut self, elapsed: Duration, at: DateTime<Utc>) {
        self.success_count += 1;
        self.last_updated = Some(at);
        let n = self.success_count as f64;
        let average = (self.average_collection_time.as_secs_f64() * (n - 1.0)
            + elapsed.as_secs_f64())
            / n;
        self.average_collection_time = Duration::from_secs_f64(average.max(0.0));
    }

    pub fn record_failure(&mut self, error: &SourceCollectionError) {
        self.error_count += 1;
        self.last_error = Some(error.to_string());
    }

    /// Serialisable view for snapshot metadata.
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            description: self.description.clone(),
            endpoint: self.endpoint.clone(),
            enabled: self.enabled,
            last_updated: self.last_updated,
            error_count: self.error_count,
            success_count: self.success_count,
            average_collection_time_seconds: self.average_collection_time.as_secs_f64(),
            tags: self.tags.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

impl fmt::Debug for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSource")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("endpoint", &self.endpoint)
            .field("has_collector", &self.collector.is_some())
            .field("enabled", &self.enabled)
            .field("last_updated", &self.last_updated)
            .field("error_count", &self.error_count)
            .field("success_count", &self.success_count)
            .field("average_collection_time", &self.average_collection_time)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Per-source view carried in snapshot metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub success_count: u64,
    pub average_collection_time_seconds: f64,
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Thread-safe, ordered registry of metric sources.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<Vec<MetricSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `source`, replacing any entry with the same name in place.
    pub fn register(&self, source: MetricSource) {
        let mut sources = self.sources.write();
        let name = source.name.clone();
        match sources.iter().position(|s| s.name == name) {
            Some(index) => {
                sources[index] = source;
                tracing::info!(source = %name, "metrics source replaced");
            }
            None => {
                sources.push(source);
                tracing::info!(source = %name, "metrics source registered");
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Option<MetricSource> {
        let mut sources = self.sources.write();
        let index = sources.iter().position(|s| s.name == name)?;
        tracing::info!(source = %name, "metrics source unregistered");
        Some(sources.remove(index))
    }

    pub fn enable_source(&self, name: &str) -> bool {
        self.set_source_enabled(name, true)
    }

    pub fn disable_source(&self, name: &str) -> bool {
        self.set_source_enabled(name, false)
    }

    fn set_source_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut sources = self.sources.write();
        match sources.iter_mut().find(|s| s.name == name) {
            Some(source) => {
                source.enabled = enabled;
                tracing::info!(source = %name, enabled, "metrics source toggled");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<MetricSource> {
        self.sources.read().iter().find(|s| s.name == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.read().iter().any(|s| s.name == name)
    }

    /// Names in registration order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.read().iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.sources.read().iter().filter(|s| s.enabled).count()
    }

    /// Enabled sources that have a collector, in registration order.
    pub fn collectable(&self) -> Vec<(String, Arc<dyn Collector>)> {
        self.sources
            .read()
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| s.collector.as_ref().map(|c| (s.name.clone(), Arc::clone(c))))
            .collect()
    }

    pub fn record_success(&self, name: &str, elapsed: Duration, at: DateTime<Utc>) {
        if let Some(source) = self.sources.write().iter_mut().find(|s| s.name == name) {
            source.record_success(elapsed, at);
        }
    }

    pub fn record_failure(&self, error: &SourceCollectionError) {
        let name = error.source_name();
        if let Some(source) = self.sources.write().iter_mut().find(|s| s.name == name) {
            source.record_failure(error);
        }
    }

    /// Per-source stats keyed by name.
    pub fn stats(&self) -> BTreeMap<String, SourceStats> {
        self.sources
            .read()
            .iter()
            .map(|s| (s.name.clone(), s.stats()))
            .collect()
    }

    /// Σsuccess / Σ(success + error) across all sources; 0 with no attempts.
    pub fn success_rate(&self) -> f64 {
        let sources = self.sources.read();
        let successes: u64 = sources.iter().map(|s| s.success_count).sum();
        let errors: u64 = sources.iter().map(|s| s.error_count).sum();
        success_rate(successes, errors)
    }
}

pub(crate) fn success_rate(successes: u64, errors: u64) -> f64 {
    let attempts = successes + errors;
    if attempts == 0 {
        0.0
    } else {
        successes as f64 / attempts as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut source = MetricSource::passive("a", "test");
        let now = Utc::now();
        source.record_success(Duration::from_millis(10), now);
        source.record_success(Duration::from_millis(30), now);
        source.record_success(Duration::from_millis(20), now);
        let avg = source.average_collection_time.as_secs_f64();
        assert!((avg - 0.020).abs() < 1e-9);
        assert_eq!(source.success_count, 3);
    }

    #[test]
    fn test_success_rate_no_attempts() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(3, 1), 0.75);
    }
}
