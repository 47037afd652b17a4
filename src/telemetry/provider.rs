//! Tracer and meter providers and the [`Telemetry`] hub.
//!
//! The hub is constructed once at startup and passed by reference to every
//! consumer. It fronts each provider with a [`HandleCache`] so repeated
//! lookups for the same scope return the same handle.

use std::sync::Arc;

use super::cache::{HandleCache, DEFAULT_HANDLE_CACHE_SIZE};
use super::meter::{Meter, StoreMeter};
use super::spans::{Tracer, TracingTracer};
use super::store::MetricsStore;

/// Creates tracers for an instrumentation scope.
pub trait TracerProvider: Send + Sync {
    fn tracer(&self, name: &str, version: Option<&str>) -> Arc<dyn Tracer>;
}

/// Creates meters for an instrumentation scope.
pub trait MeterProvider: Send + Sync {
    fn meter(&self, name: &str, version: Option<&str>) -> Arc<dyn Meter>;
}

/// Provider for [`TracingTracer`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracerProvider;

impl TracerProvider for TracingTracerProvider {
    fn tracer(&self, name: &str, version: Option<&str>) -> Arc<dyn Tracer> {
        Arc::new(TracingTracer::new(name, version.map(str::to_string)))
    }
}

/// Provider for [`StoreMeter`]s sharing one store.
pub struct StoreMeterProvider {
    store: Arc<MetricsStore>,
}

impl StoreMeterProvider {
    pub fn new(store: Arc<MetricsStore>) -> Self {
        Self { store }
    }
}

impl MeterProvider for StoreMeterProvider {
    fn meter(&self, name: &str, _version: Option<&str>) -> Arc<dyn Meter> {
        Arc::new(StoreMeter::new(name, Arc::clone(&self.store)))
    }
}

/// Owner of the tracer and meter providers and their handle caches.
pub struct Telemetry {
    tracer_provider: Arc<dyn TracerProvider>,
    meter_provider: Arc<dyn MeterProvider>,
    tracers: HandleCache<Arc<dyn Tracer>>,
    meters: HandleCache<Arc<dyn Meter>>,
}

impl Telemetry {
    pub fn new(
        tracer_provider: Arc<dyn TracerProvider>,
        meter_provider: Arc<dyn MeterProvider>,
        cache_size: usize,
    ) -> Self {
        Self {
            tracer_provider,
            meter_provider,
            tracers: HandleCache::new(cache_size),
            meters: HandleCache::new(cache_size),
        }
    }

    /// Default wiring: `tracing` spans and a store-backed meter.
    pub fn with_store(store: Arc<MetricsStore>) -> Self {
        Self::new(
            Arc::new(TracingTracerProvider),
            Arc::new(StoreMeterProvider::new(store)),
            DEFAULT_HANDLE_CACHE_SIZE,
        )
    }

    /// Cached tracer for `name`/`version`.
    pub fn tracer(&self, name: &str, version: Option<&str>) -> Arc<dyn Tracer> {
        let provider = &self.tracer_provider;
        self.tracers
            .get_or_create(name, version, |n, v| provider.tracer(n, v))
    }

    /// Cached meter for `name`/`version`.
    pub fn meter(&self, name: &str, version: Option<&str>) -> Arc<dyn Meter> {
        let provider = &self.meter_provider;
        self.meters
            .get_or_create(name, version, |n, v| provider.meter(n, v))
    }

    pub fn tracer_cache(&self) -> &HandleCache<Arc<dyn Tracer>> {
        &self.tracers
    }

    pub fn meter_cache(&self) -> &HandleCache<Arc<dyn Meter>> {
        &self.meters
    }

    /// Release cached handles. Called during shutdown.
    pub fn shutdown(&self) {
        self.tracers.clear();
        self.meters.clear();
        tracing::debug!("telemetry handle caches cleared");
    }
}
