//! Per-instance decorator proxies.
//!
//! [`InstrumentedClient`] and [`InstrumentedDelegate`] implement the same
//! traits as the values they wrap and forward every call. Wrapping one client
//! instance never affects another. Every wrapped call opens a span, updates
//! the meter instruments and the [`StatsTable`], then returns the inner
//! result untouched.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::client::{
    ClientOperation, DataAccessClient, DataAccessError, EntityDelegate, Operation,
    TransactionStep,
};
use super::complexity::{complexity_score, MIN_COMPLEXITY};
use super::stats::{Latency, StatsTable};
use super::InstrumentationSettings;
use crate::telemetry::{
    AttributeValue, Counter, Histogram, Meter, OperationSpan, Resource, SpanStatus, Tracer,
    UpDownCounter,
};

/// Meter instruments shared by every proxy built from one core.
pub(crate) struct Instruments {
    operation_duration: Arc<dyn Histogram>,
    client_duration: Arc<dyn Histogram>,
    transaction_duration: Arc<dyn Histogram>,
    complexity: Arc<dyn Histogram>,
    result_count: Arc<dyn Histogram>,
    operations: Arc<dyn Counter>,
    slow_queries: Arc<dyn Counter>,
    very_slow_queries: Arc<dyn Counter>,
    errors: Arc<dyn Counter>,
    connections: Arc<dyn UpDownCounter>,
}

impl Instruments {
    pub(crate) fn new(meter: &dyn Meter) -> Self {
        Self {
            operation_duration: meter.histogram(
                "db_operation_duration_seconds",
                "Duration of entity operations",
                "s",
            ),
            client_duration: meter.histogram(
                "db_client_operation_duration_seconds",
                "Duration of client-level operations",
                "s",
            ),
            transaction_duration: meter.histogram(
                "db_transaction_duration_seconds",
                "Duration of transactions",
                "s",
            ),
            complexity: meter.histogram(
                "db_query_complexity",
                "Complexity score of successful operations",
                "",
            ),
            result_count: meter.histogram(
                "db_result_count",
                "Number of records returned or affected",
                "",
            ),
            operations: meter.counter("db_operations_total", "Completed operations", ""),
            slow_queries: meter.counter(
                "db_slow_queries_total",
                "Operations at or above the slow threshold",
                "",
            ),
            very_slow_queries: meter.counter(
                "db_very_slow_queries_total",
                "Operations at or above the very-slow threshold",
                "",
            ),
            errors: meter.counter("db_errors_total", "Failed operations by error kind", ""),
            connections: meter.up_down_counter(
                "db_connections_active",
                "Open client connections",
                "",
            ),
        }
    }
}

/// Result-size bucket attached to successful spans.
pub fn result_size_bucket(count: u64) -> &'static str {
    match count {
        0..=1 => "single",
        2..=10 => "small",
        11..=100 => "medium",
        101..=1000 => "large",
        _ => "very_large",
    }
}

/// Number of records an entity operation returned or affected.
pub fn result_count(operation: Operation, value: &Value) -> u64 {
    if operation.returns_single_entity() {
        return u64::from(!value.is_null());
    }
    match value {
        Value::Array(items) => items.len() as u64,
        Value::Object(map) => map.get("count").and_then(Value::as_u64).unwrap_or(1),
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::Null => 0,
        _ => 1,
    }
}

/// State shared by every proxy created by one `Instrumentation`.
pub(crate) struct InstrumentationCore {
    pub(crate) settings: InstrumentationSettings,
    pub(crate) resource: Resource,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) instruments: Instruments,
    pub(crate) stats: StatsTable,
    pub(crate) active_connections: AtomicI64,
}

/// What one wrapped call is, for span naming and labelling.
struct Call<'a> {
    entity: &'a str,
    operation: &'a str,
    complexity: u32,
    attributes: Vec<(&'static str, AttributeValue)>,
}

impl InstrumentationCore {
    fn start_span(&self, call: &Call<'_>) -> Box<dyn OperationSpan> {
        let name = format!("{}.{}.{}", self.settings.span_domain, call.entity, call.operation);
        let mut span = self.tracer.start_span(&name);
        span.set_attribute("db.system", self.settings.db_system.as_str().into());
        span.set_attribute("db.entity", call.entity.into());
        span.set_attribute("db.operation", call.operation.into());
        span.set_attribute("service.name", self.settings.service_name.as_str().into());
        span.set_attribute("db.complexity_score", call.complexity.into());
        for (key, value) in self.resource.attributes() {
            span.set_attribute(key, value);
        }
        for (key, value) in &call.attributes {
            span.set_attribute(key, value.clone());
        }
        span
    }

    fn classify(&self, duration: Duration) -> Latency {
        Latency::classify(
            duration,
            self.settings.slow_query_threshold,
            self.settings.very_slow_query_threshold,
        )
    }

    /// Run `future` under a span and record its outcome.
    async fn observe<T, F>(
        &self,
        call: Call<'_>,
        duration_histogram: &dyn Histogram,
        future: F,
        count: impl FnOnce(&T) -> u64,
    ) -> Result<T, DataAccessError>
    where
        F: Future<Output = Result<T, DataAccessError>>,
    {
        let mut span = self.start_span(&call);
        let started = Instant::now();
        let result = future.await;
        let elapsed = started.elapsed();

        let key = StatsTable::key(call.entity, call.operation);
        let labels = [("entity", call.entity), ("operation", call.operation)];
        duration_histogram.record(elapsed.as_secs_f64(), &labels);

        match &result {
            Ok(value) => {
                let records = count(value);
                let latency = self.classify(elapsed);

                self.instruments.complexity.record(f64::from(call.complexity), &labels);
                self.instruments.result_count.record(records as f64, &labels);
                self.instruments.operations.add(
                    1,
                    &[("entity", call.entity), ("operation", call.operation), ("status", "success")],
                );
                span.set_attribute("db.result_count", AttributeValue::Int(records as i64));
                span.set_attribute("db.result_size", result_size_bucket(records).into());

                match latency {
                    Latency::VerySlow => {
                        self.instruments.very_slow_queries.add(1, &labels);
                        span.set_attribute("db.very_slow_query", true.into());
                        tracing::warn!(
                            entity = call.entity,
                            operation = call.operation,
                            duration_ms = elapsed.as_millis() as u64,
                            "very slow data-access operation"
                        );
                    }
                    Latency::Slow => {
                        self.instruments.slow_queries.add(1, &labels);
                        span.set_attribute("db.slow_query", true.into());
                        tracing::info!(
                            entity = call.entity,
                            operation = call.operation,
                            duration_ms = elapsed.as_millis() as u64,
                            "slow data-access operation"
                        );
                    }
                    Latency::Normal => {}
                }

                span.set_status(SpanStatus::Ok);
                self.stats.update(key, |stats| {
                    stats.record_success(elapsed, call.complexity, records, latency)
                });
            }
            Err(err) => {
                self.instruments.operations.add(
                    1,
                    &[("entity", call.entity), ("operation", call.operation), ("status", "error")],
                );
                self.instruments.errors.add(
                    1,
                    &[
                        ("entity", call.entity),
                        ("operation", call.operation),
                        ("error_kind", err.kind()),
                    ],
                );
                span.record_error(err.kind(), &err.to_string());
                span.set_status(SpanStatus::Error(err.to_string()));
                self.stats
                    .update(key, |stats| stats.record_failure(elapsed, call.complexity));
                tracing::debug!(
                    entity = call.entity,
                    operation = call.operation,
                    error = %err,
                    "data-access operation failed"
                );
            }
        }

        span.end();
        result
    }

    fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        self.instruments.connections.add(1, &[]);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
        self.instruments.connections.add(-1, &[]);
    }

    pub(crate) fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Decorator for one entity delegate.
pub struct InstrumentedDelegate {
    inner: Arc<dyn EntityDelegate>,
    core: Arc<InstrumentationCore>,
}

impl InstrumentedDelegate {
    pub(crate) fn new(inner: Arc<dyn EntityDelegate>, core: Arc<InstrumentationCore>) -> Self {
        Self { inner, core }
    }

    /// Number of operations this proxy wraps.
    pub fn wrapped_operations(&self) -> usize {
        Operation::ALL
            .iter()
            .filter(|op| self.inner.supports(**op))
            .count()
    }
}

#[async_trait]
impl EntityDelegate for InstrumentedDelegate {
    fn entity(&self) -> &str {
        self.inner.entity()
    }

    fn capabilities(&self) -> &[Operation] {
        self.inner.capabilities()
    }

    async fn execute(&self, operation: Operation, args: Value) -> Result<Value, DataAccessError> {
        if !self.inner.supports(operation) {
            return self.inner.execute(operation, args).await;
        }

        let call = Call {
            entity: self.inner.entity(),
            operation: operation.as_str(),
            complexity: complexity_score(&args),
            attributes: Vec::new(),
        };
        let future = self.inner.execute(operation, args);
        self.core
            .observe(
                call,
                self.core.instruments.operation_duration.as_ref(),
                future,
                |value| result_count(operation, value),
            )
            .await
    }
}

/// Decorator for one data-access client instance.
pub struct InstrumentedClient {
    inner: Arc<dyn DataAccessClient>,
    core: Arc<InstrumentationCore>,
    /// `None` when discovery failed; calls then reach the inner delegates.
    delegates: Option<Vec<Arc<dyn EntityDelegate>>>,
    wrapped_operations: usize,
}

const CLIENT_ENTITY: &str = "client";
const CLIENT_OPERATIONS: usize = 5;

impl InstrumentedClient {
    pub(crate) fn new(
        inner: Arc<dyn DataAccessClient>,
        core: Arc<InstrumentationCore>,
        delegates: Option<Vec<Arc<dyn EntityDelegate>>>,
        wrapped_entity_operations: usize,
    ) -> Self {
        Self {
            inner,
            core,
            delegates,
            wrapped_operations: wrapped_entity_operations + CLIENT_OPERATIONS,
        }
    }

    /// Entity and client operations this proxy wraps.
    pub fn wrapped_operations(&self) -> usize {
        self.wrapped_operations
    }

    pub fn inner(&self) -> &Arc<dyn DataAccessClient> {
        &self.inner
    }

    fn client_call(&self, operation: ClientOperation) -> Call<'static> {
        Call {
            entity: CLIENT_ENTITY,
            operation: operation.as_str(),
            complexity: MIN_COMPLEXITY,
            attributes: Vec::new(),
        }
    }
}

#[async_trait]
impl DataAccessClient for InstrumentedClient {
    fn delegates(&self) -> Result<Vec<Arc<dyn EntityDelegate>>, DataAccessError> {
        match &self.delegates {
            Some(delegates) => Ok(delegates.clone()),
            None => self.inner.delegates(),
        }
    }

    async fn connect(&self) -> Result<(), DataAccessError> {
        let call = self.client_call(ClientOperation::Connect);
        let result = self
            .core
            .observe(call, self.core.instruments.client_duration.as_ref(), self.inner.connect(), |_| 0)
            .await;
        if result.is_ok() {
            self.core.connection_opened();
        }
        result
    }

    async fn disconnect(&self) -> Result<(), DataAccessError> {
        let call = self.client_call(ClientOperation::Disconnect);
        let result = self
            .core
            .observe(
                call,
                self.core.instruments.client_duration.as_ref(),
                self.inner.disconnect(),
                |_| 0,
            )
            .await;
        if result.is_ok() {
            self.core.connection_closed();
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn execute_raw(&self, query: &str, params: &[Value]) -> Result<u64, DataAccessError> {
        let mut call = self.client_call(ClientOperation::ExecuteRaw);
        call.attributes
            .push(("db.statement.parameter_count", params.len().into()));
        self.core
            .observe(
                call,
                self.core.instruments.client_duration.as_ref(),
                self.inner.execute_raw(query, params),
                |affected| *affected,
            )
            .await
    }

    async fn query_raw(&self, query: &str, params: &[Value]) -> Result<Vec<Value>, DataAccessError> {
        let mut call = self.client_call(ClientOperation::QueryRaw);
        call.attributes
            .push(("db.statement.parameter_count", params.len().into()));
        self.core
            .observe(
                call,
                self.core.instruments.client_duration.as_ref(),
                self.inner.query_raw(query, params),
                |rows| rows.len() as u64,
            )
            .await
    }

    async fn transaction(&self, steps: Vec<TransactionStep>) -> Result<Vec<Value>, DataAccessError> {
        let mut call = self.client_call(ClientOperation::Transaction);
        call.attributes
            .push(("db.transaction.step_count", steps.len().into()));
        self.core
            .observe(
                call,
                self.core.instruments.transaction_duration.as_ref(),
                self.inner.transaction(steps),
                |results| results.len() as u64,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_size_buckets() {
        assert_eq!(result_size_bucket(0), "single");
        assert_eq!(result_size_bucket(1), "single");
        assert_eq!(result_size_bucket(10), "small");
        assert_eq!(result_size_bucket(100), "medium");
        assert_eq!(result_size_bucket(1000), "large");
        assert_eq!(result_size_bucket(1001), "very_large");
    }

    #[test]
    fn test_result_count_shapes() {
        assert_eq!(result_count(Operation::FindMany, &json!([1, 2, 3])), 3);
        assert_eq!(result_count(Operation::UpdateMany, &json!({ "count": 7 })), 7);
        assert_eq!(result_count(Operation::Count, &json!(42)), 42);
        assert_eq!(result_count(Operation::Create, &json!({ "id": 1 })), 1);
        assert_eq!(result_count(Operation::FindUnique, &Value::Null), 0);
    }
}
