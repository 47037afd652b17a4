//! Vitals Runtime
//!
//! Concurrent telemetry aggregation for a service and its data-access layer.
//! A scrape or health request runs one collection cycle over every enabled
//! metric source, assembles a snapshot, and hands it to the exposition
//! formatter or the health scorer.
//!
//! # Components
//!
//! - **Source registry**: named, taggable collectors
//! - **Aggregator**: concurrent collection under a shared deadline, history
//! - **Instrumentation**: per-client proxies recording spans, metrics and
//!   per-operation statistics
//! - **Telemetry**: tracer/meter providers behind bounded handle caches
//!
//! Every stateful component is owned by [`VitalsRuntime`] and passed by
//! reference; nothing lives in ambient globals.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod health;
pub mod instrumentation;
pub mod shutdown;
pub mod sources;
pub mod telemetry;

use std::sync::Arc;
use std::time::Instant;

use aggregator::Aggregator;
use config::EnvConfig;
use endpoints::{HealthHandler, ScrapeHandler};
use instrumentation::{DataAccessClient, Instrumentation};
use shutdown::{Lifecycle, ShutdownResult};
use sources::{
    data_access_source, data_access_stats_source, health_source, system_source, HealthProbe,
    ProcStatsProvider, SourceRegistry, StoreRenderer, SystemStatsProvider,
};
use telemetry::{MetricsStore, StoreMeterProvider, Telemetry, TracingTracerProvider};

/// The Vitals runtime instance.
pub struct VitalsRuntime {
    pub config: EnvConfig,
    pub store: Arc<MetricsStore>,
    pub telemetry: Arc<Telemetry>,
    pub registry: Arc<SourceRegistry>,
    pub aggregator: Arc<Aggregator>,
    pub instrumentation: Arc<Instrumentation>,
    pub lifecycle: Arc<Lifecycle>,
    stats_provider: Arc<dyn SystemStatsProvider>,
    started: Instant,
}

impl VitalsRuntime {
    /// Create a runtime reading system stats from `/proc`.
    pub fn new(config: EnvConfig) -> Self {
        Self::with_stats_provider(config, Arc::new(ProcStatsProvider::default()))
    }

    /// Create a runtime with a custom system-stats provider.
    pub fn with_stats_provider(
        config: EnvConfig,
        stats_provider: Arc<dyn SystemStatsProvider>,
    ) -> Self {
        telemetry::init_metrics();

        let store = Arc::new(MetricsStore::new());
        let telemetry = Arc::new(Telemetry::new(
            Arc::new(TracingTracerProvider),
            Arc::new(StoreMeterProvider::new(Arc::clone(&store))),
            config.handle_cache_size,
        ));
        let lifecycle = Arc::new(Lifecycle::new());
        let registry = Arc::new(SourceRegistry::new());
        let aggregator = Arc::new(Aggregator::with_shutdown(
            Arc::clone(&registry),
            config.aggregator.clone(),
            lifecycle.cancellation_token(),
        ));
        let instrumentation = Arc::new(Instrumentation::new(
            &telemetry,
            config.instrumentation.clone(),
        ));

        let runtime = Self {
            config,
            store,
            telemetry,
            registry,
            aggregator,
            instrumentation,
            lifecycle,
            stats_provider,
            started: Instant::now(),
        };
        runtime.register_builtin_sources();
        runtime
    }

    fn register_builtin_sources(&self) {
        self.registry
            .register(system_source(Arc::new(StoreRenderer::new(Arc::clone(&self.store)))));
        self.registry.register(health_source(self.health_probe(None)));
        self.registry
            .register(data_access_source(Arc::clone(&self.instrumentation)));
        self.registry
            .register(data_access_stats_source(Arc::clone(&self.instrumentation)));
    }

    fn health_probe(&self, database: Option<Arc<dyn DataAccessClient>>) -> HealthProbe {
        HealthProbe {
            stats: Arc::clone(&self.stats_provider),
            database,
            started: self.started,
        }
    }

    /// Instrument `client` and add its connectivity to the health source.
    ///
    /// Returns the proxy to use in place of `client`. The health ping goes
    /// to the original client so it does not show up in operation stats.
    pub fn attach_data_access(&self, client: Arc<dyn DataAccessClient>) -> Arc<dyn DataAccessClient> {
        let proxy = self.instrumentation.instrument(Arc::clone(&client));
        self.registry
            .register(health_source(self.health_probe(Some(client))));
        proxy
    }

    pub fn scrape_handler(&self) -> ScrapeHandler {
        ScrapeHandler::new(Arc::clone(&self.aggregator), Arc::clone(&self.lifecycle))
    }

    pub fn health_handler(&self) -> HealthHandler {
        HealthHandler::new(Arc::clone(&self.aggregator), Arc::clone(&self.lifecycle))
    }

    /// Drain in-flight cycles, then release caches and history.
    pub async fn shutdown(&self) -> ShutdownResult {
        let result = self.lifecycle.shutdown(self.config.shutdown_timeout).await;
        self.telemetry.shutdown();
        self.aggregator.clear();
        tracing::info!(?result, "vitals runtime stopped");
        result
    }
}
