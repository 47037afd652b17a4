//! Operation instrumentation for data-access clients.
//!
//! [`Instrumentation`] is constructed once at startup and owns everything the
//! proxies share: the tracer, meter instruments, the per-operation statistics
//! table and the record of which client instances are already wrapped.
//! `instrument` is idempotent per client instance.

pub mod client;
pub mod complexity;
pub mod proxy;
pub mod stats;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::InstrumentationSetupError;
use crate::telemetry::{Resource, Telemetry};

pub use client::{
    ClientOperation, DataAccessClient, DataAccessError, EntityDelegate, Operation,
    TransactionStep,
};
pub use complexity::{complexity_score, MAX_COMPLEXITY, MIN_COMPLEXITY};
pub use proxy::{result_count, result_size_bucket, InstrumentedClient, InstrumentedDelegate};
pub use stats::{DataAccessHealth, Latency, OperationReport, OperationStats, StatsTable};

use proxy::{InstrumentationCore, Instruments};

/// Scope name used for the tracer and meter handles.
pub const INSTRUMENTATION_SCOPE: &str = "vitals.data-access";

/// Settings applied to every wrapped call.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentationSettings {
    pub service_name: String,
    pub db_system: String,
    pub span_domain: String,
    pub slow_query_threshold: Duration,
    pub very_slow_query_threshold: Duration,
}

impl Default for InstrumentationSettings {
    fn default() -> Self {
        Self {
            service_name: "vitals".to_string(),
            db_system: "postgresql".to_string(),
            span_domain: "db".to_string(),
            slow_query_threshold: Duration::from_secs(1),
            very_slow_query_threshold: Duration::from_secs(5),
        }
    }
}

/// Identity of an `Arc` allocation.
fn instance_id<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

/// Delegates exposing any of these are treated as entity delegates.
const RECOGNISED_CAPABILITIES: [Operation; 3] =
    [Operation::Create, Operation::FindMany, Operation::FindFirst];

fn is_recognised(delegate: &dyn EntityDelegate) -> bool {
    RECOGNISED_CAPABILITIES.iter().any(|op| delegate.supports(*op))
}

/// Proxies are held weakly so dropping one releases it and its client.
/// A live proxy keeps its client alive, so a live entry's id is never reused.
#[derive(Default)]
struct Wrapped {
    /// Original instance id to its proxy.
    by_client: HashMap<usize, Weak<InstrumentedClient>>,
    /// Proxy instance id to the proxy.
    proxies: HashMap<usize, Weak<InstrumentedClient>>,
}

impl Wrapped {
    fn is_proxy(&self, id: usize) -> bool {
        self.proxies.get(&id).is_some_and(|proxy| proxy.strong_count() > 0)
    }

    fn proxy_for(&self, id: usize) -> Option<Arc<InstrumentedClient>> {
        self.by_client.get(&id)?.upgrade()
    }

    fn live(&self) -> impl Iterator<Item = Arc<InstrumentedClient>> + '_ {
        self.by_client.values().filter_map(Weak::upgrade)
    }

    fn prune(&mut self) {
        self.by_client.retain(|_, proxy| proxy.strong_count() > 0);
        self.proxies.retain(|_, proxy| proxy.strong_count() > 0);
    }
}

/// Owner of the instrumentation state.
pub struct Instrumentation {
    core: Arc<InstrumentationCore>,
    wrapped: Mutex<Wrapped>,
}

impl Instrumentation {
    pub fn new(telemetry: &Telemetry, settings: InstrumentationSettings) -> Self {
        let version = Some(env!("CARGO_PKG_VERSION"));
        let tracer = telemetry.tracer(INSTRUMENTATION_SCOPE, version);
        let meter = telemetry.meter(INSTRUMENTATION_SCOPE, version);
        let core = InstrumentationCore {
            settings,
            resource: Resource::detect(),
            tracer,
            instruments: Instruments::new(meter.as_ref()),
            stats: StatsTable::new(),
            active_connections: AtomicI64::new(0),
        };
        Self {
            core: Arc::new(core),
            wrapped: Mutex::new(Wrapped::default()),
        }
    }

    pub fn settings(&self) -> &InstrumentationSettings {
        &self.core.settings
    }

    /// Wrap `client`, returning the proxy to use in its place.
    ///
    /// Wrapping the same instance again returns the existing proxy, and
    /// passing a proxy back in returns it unchanged. Setup failures are
    /// logged; the proxy then forwards the affected calls unobserved.
    pub fn instrument(&self, client: Arc<dyn DataAccessClient>) -> Arc<dyn DataAccessClient> {
        let id = instance_id(&client);
        if let Some(existing) = self.existing(&client, id) {
            return existing;
        }

        // Discovery calls into the client, so it runs without the lock held.
        let (delegates, wrapped_entity_operations) = self.wrap_delegates(client.as_ref());
        let proxy = Arc::new(InstrumentedClient::new(
            Arc::clone(&client),
            Arc::clone(&self.core),
            delegates,
            wrapped_entity_operations,
        ));

        {
            let mut wrapped = self.wrapped.lock();
            if let Some(raced) = wrapped.proxy_for(id) {
                return raced as Arc<dyn DataAccessClient>;
            }
            wrapped.prune();
            wrapped.proxies.insert(instance_id(&proxy), Arc::downgrade(&proxy));
            wrapped.by_client.insert(id, Arc::downgrade(&proxy));
        }
        tracing::info!(
            wrapped_operations = proxy.wrapped_operations(),
            "data-access client instrumented"
        );
        proxy
    }

    fn existing(
        &self,
        client: &Arc<dyn DataAccessClient>,
        id: usize,
    ) -> Option<Arc<dyn DataAccessClient>> {
        let wrapped = self.wrapped.lock();
        if wrapped.is_proxy(id) {
            return Some(Arc::clone(client));
        }
        let proxy = wrapped.proxy_for(id)?;
        tracing::debug!("client already instrumented");
        Some(proxy as Arc<dyn DataAccessClient>)
    }

    fn wrap_delegates(
        &self,
        client: &dyn DataAccessClient,
    ) -> (Option<Vec<Arc<dyn EntityDelegate>>>, usize) {
        let discovered = match client.delegates() {
            Ok(delegates) => delegates,
            Err(err) => {
                let err = InstrumentationSetupError::DelegateDiscovery(err.to_string());
                tracing::warn!(error = %err, "instrumentation setup failed");
                return (None, 0);
            }
        };

        let mut seen = HashSet::new();
        let mut wrapped_operations = 0;
        let mut delegates: Vec<Arc<dyn EntityDelegate>> = Vec::with_capacity(discovered.len());

        for delegate in discovered {
            if !is_recognised(delegate.as_ref()) {
                delegates.push(delegate);
                continue;
            }
            if !seen.insert(delegate.entity().to_string()) {
                let err = InstrumentationSetupError::DuplicateEntity(delegate.entity().to_string());
                tracing::warn!(error = %err, "instrumentation setup failed");
                delegates.push(delegate);
                continue;
            }
            let proxy = InstrumentedDelegate::new(delegate, Arc::clone(&self.core));
            wrapped_operations += proxy.wrapped_operations();
            delegates.push(Arc::new(proxy));
        }

        (Some(delegates), wrapped_operations)
    }

    /// True if `client` is a wrapped original or one of our proxies.
    pub fn is_instrumented(&self, client: &Arc<dyn DataAccessClient>) -> bool {
        let id = instance_id(client);
        let wrapped = self.wrapped.lock();
        wrapped.is_proxy(id) || wrapped.proxy_for(id).is_some()
    }

    /// Clients whose proxy is still alive.
    pub fn instrumented_client_count(&self) -> usize {
        self.wrapped.lock().live().count()
    }

    /// Total operations wrapped across all live proxies.
    pub fn instrumented_operation_count(&self) -> usize {
        self.wrapped
            .lock()
            .live()
            .map(|proxy| proxy.wrapped_operations())
            .sum()
    }

    /// Raw statistics for one `"<entity>.<operation>"` key.
    pub fn stats_for(&self, key: &str) -> Option<OperationStats> {
        self.core.stats.get(key)
    }

    /// Derived rates per operation key.
    pub fn operation_stats(&self) -> BTreeMap<String, OperationReport> {
        self.core.stats.reports()
    }

    /// Aggregate totals and rates across all operation keys.
    pub fn health_metrics(&self) -> DataAccessHealth {
        self.core.stats.health(self.core.active_connections())
    }

    pub fn active_connections(&self) -> i64 {
        self.core.active_connections()
    }

    pub fn reset_stats(&self) {
        self.core.stats.clear();
        tracing::info!("operation statistics reset");
    }

    /// Exposition text for the accumulated statistics.
    pub fn render_exposition(&self) -> String {
        render_stats(&self.core.stats.entries(), self.core.active_connections())
    }
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once('.').unwrap_or((key, ""))
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

type StatColumn = fn(&OperationStats) -> f64;

fn render_stats(entries: &BTreeMap<String, OperationStats>, active_connections: i64) -> String {
    let columns: [(&str, &str, &str, StatColumn); 8] = [
        ("data_access_operations_total", "counter", "Completed operations", |s| s.total_calls as f64),
        ("data_access_operation_failures_total", "counter", "Failed operations", |s| s.failed_calls as f64),
        ("data_access_operation_duration_seconds_avg", "gauge", "Mean operation duration", |s| {
            s.average_duration().as_secs_f64()
        }),
        ("data_access_operation_duration_seconds_max", "gauge", "Longest operation duration", |s| {
            s.max_duration.as_secs_f64()
        }),
        ("data_access_query_complexity_avg", "gauge", "Mean complexity score", |s| s.average_complexity()),
        ("data_access_result_count_avg", "gauge", "Mean result count", |s| s.average_result_count()),
        ("data_access_slow_queries_total", "counter", "Slow operations", |s| s.slow_queries as f64),
        ("data_access_very_slow_queries_total", "counter", "Very slow operations", |s| {
            s.very_slow_queries as f64
        }),
    ];

    let mut out = String::new();
    if !entries.is_empty() {
        for (name, kind, help, value) in columns {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} {}", name, kind);
            for (key, stats) in entries {
                let (entity, operation) = split_key(key);
                let _ = writeln!(
                    out,
                    "{}{{entity=\"{}\",operation=\"{}\"}} {}",
                    name,
                    escape_label(entity),
                    escape_label(operation),
                    value(stats)
                );
            }
        }
    }
    let _ = writeln!(out, "# HELP data_access_connections_active Open client connections");
    let _ = writeln!(out, "# TYPE data_access_connections_active gauge");
    let _ = writeln!(out, "data_access_connections_active {}", active_connections);
    out
}
