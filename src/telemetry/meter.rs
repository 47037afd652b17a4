//! Metrics-registry seam.
//!
//! Instrumentation code creates instruments by name, description and unit
//! and observes values with label slices. The default [`StoreMeter`] writes
//! into a [`MetricsStore`] and mirrors every observation into the `metrics`
//! facade so an installed recorder sees the same series.

use std::sync::Arc;

use super::store::MetricsStore;

/// Label slice passed with every observation.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Distribution instrument.
pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, labels: Labels<'_>);
}

/// Monotonic instrument.
pub trait Counter: Send + Sync {
    fn add(&self, value: u64, labels: Labels<'_>);
}

/// Instrument that can move in both directions.
pub trait UpDownCounter: Send + Sync {
    fn add(&self, delta: i64, labels: Labels<'_>);
}

/// Factory for named instruments.
pub trait Meter: Send + Sync {
    fn histogram(&self, name: &str, description: &str, unit: &str) -> Arc<dyn Histogram>;
    fn counter(&self, name: &str, description: &str, unit: &str) -> Arc<dyn Counter>;
    fn up_down_counter(&self, name: &str, description: &str, unit: &str) -> Arc<dyn UpDownCounter>;
}

/// Meter backed by a [`MetricsStore`].
pub struct StoreMeter {
    scope: String,
    store: Arc<MetricsStore>,
}

impl StoreMeter {
    pub fn new(scope: impl Into<String>, store: Arc<MetricsStore>) -> Self {
        Self { scope: scope.into(), store }
    }

    fn register(&self, kind: &str, name: &str, description: &str, unit: &str) {
        tracing::debug!(scope = %self.scope, instrument = name, kind, "instrument created");
        describe(&self.store, name, description, unit);
    }
}

fn facade_labels(labels: Labels<'_>) -> Vec<metrics::Label> {
    labels
        .iter()
        .map(|(k, v)| metrics::Label::new((*k).to_string(), (*v).to_string()))
        .collect()
}

fn describe(store: &MetricsStore, name: &str, description: &str, unit: &str) {
    let help = if unit.is_empty() {
        description.to_string()
    } else {
        format!("{} ({})", description, unit)
    };
    store.describe(name, &help);
}

struct StoreHistogram {
    name: String,
    store: Arc<MetricsStore>,
}

impl Histogram for StoreHistogram {
    fn record(&self, value: f64, labels: Labels<'_>) {
        self.store.record_histogram(&self.name, labels, value);
        metrics::histogram!(self.name.clone(), facade_labels(labels)).record(value);
    }
}

struct StoreCounter {
    name: String,
    store: Arc<MetricsStore>,
}

impl Counter for StoreCounter {
    fn add(&self, value: u64, labels: Labels<'_>) {
        self.store.increment_counter(&self.name, labels, value);
        metrics::counter!(self.name.clone(), facade_labels(labels)).increment(value);
    }
}

struct StoreUpDownCounter {
    name: String,
    store: Arc<MetricsStore>,
}

impl UpDownCounter for StoreUpDownCounter {
    fn add(&self, delta: i64, labels: Labels<'_>) {
        self.store.add_gauge(&self.name, labels, delta as f64);
        metrics::gauge!(self.name.clone(), facade_labels(labels)).increment(delta as f64);
    }
}

impl Meter for StoreMeter {
    fn histogram(&self, name: &str, description: &str, unit: &str) -> Arc<dyn Histogram> {
        self.register("histogram", name, description, unit);
        metrics::describe_histogram!(name.to_string(), description.to_string());
        Arc::new(StoreHistogram { name: name.to_string(), store: Arc::clone(&self.store) })
    }

    fn counter(&self, name: &str, description: &str, unit: &str) -> Arc<dyn Counter> {
        self.register("counter", name, description, unit);
        metrics::describe_counter!(name.to_string(), description.to_string());
        Arc::new(StoreCounter { name: name.to_string(), store: Arc::clone(&self.store) })
    }

    fn up_down_counter(&self, name: &str, description: &str, unit: &str) -> Arc<dyn UpDownCounter> {
        self.register("up_down_counter", name, description, unit);
        metrics::describe_gauge!(name.to_string(), description.to_string());
        Arc::new(StoreUpDownCounter { name: name.to_string(), store: Arc::clone(&self.store) })
    }
}
