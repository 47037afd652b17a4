//! Shared fixtures: an in-memory data-access client, a recording tracer and
//! a fixed system-stats provider.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use vitals_core::error::CollectorError;
use vitals_core::instrumentation::{
    DataAccessClient, DataAccessError, EntityDelegate, Instrumentation, InstrumentationSettings,
    Operation, TransactionStep,
};
use vitals_core::sources::{
    CpuStats, DiskStats, MemoryStats, NetworkStats, ProcessStats, SystemStats, SystemStatsProvider,
};
use vitals_core::telemetry::{
    AttributeValue, MetricsStore, OperationSpan, SpanStatus, StoreMeterProvider, Telemetry, Tracer,
    TracerProvider,
};

/// Behaviour of the next calls made against a [`MemoryDelegate`].
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub delay: Duration,
    pub error: Option<DataAccessError>,
    pub result: Option<Value>,
}

/// Entity delegate with configurable delay, error and result.
pub struct MemoryDelegate {
    entity: String,
    capabilities: Vec<Operation>,
    behaviour: Mutex<Behaviour>,
    calls: Mutex<Vec<(Operation, Value)>>,
}

impl MemoryDelegate {
    pub fn new(entity: &str) -> Self {
        Self::with_capabilities(entity, Operation::ALL.to_vec())
    }

    pub fn with_capabilities(entity: &str, capabilities: Vec<Operation>) -> Self {
        Self {
            entity: entity.to_string(),
            capabilities,
            behaviour: Mutex::new(Behaviour::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.behaviour.lock().delay = delay;
    }

    pub fn fail_with(&self, error: DataAccessError) {
        self.behaviour.lock().error = Some(error);
    }

    pub fn respond_with(&self, value: Value) {
        self.behaviour.lock().result = Some(value);
    }

    pub fn calls(&self) -> Vec<(Operation, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EntityDelegate for MemoryDelegate {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn capabilities(&self) -> &[Operation] {
        &self.capabilities
    }

    async fn execute(&self, operation: Operation, args: Value) -> Result<Value, DataAccessError> {
        self.calls.lock().push((operation, args.clone()));
        let behaviour = self.behaviour.lock().clone();
        if !behaviour.delay.is_zero() {
            tokio::time::sleep(behaviour.delay).await;
        }
        if let Some(err) = behaviour.error {
            return Err(err);
        }
        if let Some(value) = behaviour.result {
            return Ok(value);
        }
        Ok(match operation {
            Operation::FindMany | Operation::GroupBy => json!([{ "id": 1 }, { "id": 2 }]),
            Operation::CreateMany | Operation::UpdateMany | Operation::DeleteMany => {
                json!({ "count": 2 })
            }
            Operation::Count => json!(2),
            _ => json!({ "id": 1 }),
        })
    }
}

type DiscoveryHook = Box<dyn Fn() + Send + Sync>;

/// In-memory client exposing a fixed set of delegates.
pub struct MemoryClient {
    delegates: Vec<Arc<dyn EntityDelegate>>,
    discovery_error: Option<DataAccessError>,
    discovery_hook: Mutex<Option<DiscoveryHook>>,
    connected: AtomicBool,
    raw_error: Mutex<Option<DataAccessError>>,
}

impl MemoryClient {
    pub fn new(delegates: Vec<Arc<dyn EntityDelegate>>) -> Self {
        Self {
            delegates,
            discovery_error: None,
            discovery_hook: Mutex::new(None),
            connected: AtomicBool::new(false),
            raw_error: Mutex::new(None),
        }
    }

    /// Client whose delegate discovery always fails.
    pub fn broken() -> Self {
        Self {
            delegates: Vec::new(),
            discovery_error: Some(DataAccessError::Connection("introspection refused".into())),
            discovery_hook: Mutex::new(None),
            connected: AtomicBool::new(false),
            raw_error: Mutex::new(None),
        }
    }

    /// Run `hook` every time delegates are discovered.
    pub fn on_discovery(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.discovery_hook.lock() = Some(Box::new(hook));
    }

    pub fn fail_raw(&self, error: DataAccessError) {
        *self.raw_error.lock() = Some(error);
    }
}

#[async_trait]
impl DataAccessClient for MemoryClient {
    fn delegates(&self) -> Result<Vec<Arc<dyn EntityDelegate>>, DataAccessError> {
        if let Some(hook) = self.discovery_hook.lock().as_ref() {
            hook();
        }
        match &self.discovery_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.delegates.clone()),
        }
    }

    async fn connect(&self) -> Result<(), DataAccessError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DataAccessError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn execute_raw(&self, _query: &str, params: &[Value]) -> Result<u64, DataAccessError> {
        if let Some(err) = self.raw_error.lock().clone() {
            return Err(err);
        }
        Ok(params.len() as u64)
    }

    async fn query_raw(&self, _query: &str, _params: &[Value]) -> Result<Vec<Value>, DataAccessError> {
        if let Some(err) = self.raw_error.lock().clone() {
            return Err(err);
        }
        Ok(vec![json!({ "?column?": 1 })])
    }

    async fn transaction(&self, steps: Vec<TransactionStep>) -> Result<Vec<Value>, DataAccessError> {
        Ok(steps.iter().map(|_| json!({ "ok": true })).collect())
    }
}

/// A span captured by [`RecordingTracer`].
#[derive(Debug, Clone, Default)]
pub struct RecordedSpan {
    pub name: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub errors: Vec<(String, String)>,
    pub status: Option<SpanStatus>,
    pub ended: bool,
}

impl RecordedSpan {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Tracer that keeps every ended span in memory.
#[derive(Clone, Default)]
pub struct RecordingTracer {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
}

impl RecordingTracer {
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().clone()
    }

    pub fn span_named(&self, name: &str) -> Option<RecordedSpan> {
        self.spans().into_iter().find(|s| s.name == name)
    }
}

struct RecordingSpan {
    span: RecordedSpan,
    sink: Arc<Mutex<Vec<RecordedSpan>>>,
}

impl OperationSpan for RecordingSpan {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        self.span.attributes.insert(key.to_string(), value);
    }

    fn record_error(&mut self, kind: &str, message: &str) {
        self.span.errors.push((kind.to_string(), message.to_string()));
    }

    fn set_status(&mut self, status: SpanStatus) {
        self.span.status = Some(status);
    }

    fn end(self: Box<Self>) {
        let RecordingSpan { mut span, sink } = *self;
        span.ended = true;
        sink.lock().push(span);
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, name: &str) -> Box<dyn OperationSpan> {
        Box::new(RecordingSpan {
            span: RecordedSpan { name: name.to_string(), ..Default::default() },
            sink: Arc::clone(&self.spans),
        })
    }
}

impl TracerProvider for RecordingTracer {
    fn tracer(&self, _name: &str, _version: Option<&str>) -> Arc<dyn Tracer> {
        Arc::new(self.clone())
    }
}

/// Instrumentation wired to a recording tracer and a fresh store.
pub struct Harness {
    pub tracer: RecordingTracer,
    pub store: Arc<MetricsStore>,
    pub instrumentation: Arc<Instrumentation>,
}

pub fn harness() -> Harness {
    harness_with(InstrumentationSettings::default())
}

pub fn harness_with(settings: InstrumentationSettings) -> Harness {
    let tracer = RecordingTracer::default();
    let store = Arc::new(MetricsStore::new());
    let telemetry = Telemetry::new(
        Arc::new(tracer.clone()),
        Arc::new(StoreMeterProvider::new(Arc::clone(&store))),
        8,
    );
    let instrumentation = Arc::new(Instrumentation::new(&telemetry, settings));
    Harness { tracer, store, instrumentation }
}

/// System-stats provider returning constant values.
pub struct FixedStats;

#[async_trait]
impl SystemStatsProvider for FixedStats {
    async fn sample(&self) -> Result<SystemStats, CollectorError> {
        Ok(SystemStats {
            cpu: CpuStats {
                cores: 4,
                load_average_1m: 0.5,
                load_average_5m: 0.25,
                load_average_15m: 0.1,
                load_ratio: 0.125,
                usage_ratio: 0.25,
            },
            memory: MemoryStats::default(),
            disk: DiskStats {
                mount_point: "/".to_string(),
                total_bytes: 1000,
                available_bytes: 250,
                used_bytes: 750,
                usage_ratio: 0.75,
                ..DiskStats::default()
            },
            network: NetworkStats::default(),
            process: ProcessStats {
                cpu_seconds_total: 1.5,
                cpu_usage_ratio: 0.5,
                start_time_seconds: 1_700_000_000.0,
                ..ProcessStats::default()
            },
        })
    }
}
