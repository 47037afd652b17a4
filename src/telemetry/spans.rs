//! Span utilities and the tracing seam.
//!
//! [`Tracer`] / [`OperationSpan`] is the contract instrumentation code talks
//! to. The default [`TracingTracer`] emits spans through `tracing`; exporters
//! are attached at the subscriber level, never here.

use std::fmt;
use std::time::Instant;

use tracing::{field, info_span, Span};

/// Attribute value attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Terminal status of a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error(String),
}

/// One traced operation. Consumed by [`OperationSpan::end`].
pub trait OperationSpan: Send {
    fn set_attribute(&mut self, key: &str, value: AttributeValue);
    fn record_error(&mut self, kind: &str, message: &str);
    fn set_status(&mut self, status: SpanStatus);
    fn end(self: Box<Self>);
}

/// Starts spans by name.
pub trait Tracer: Send + Sync {
    fn start_span(&self, name: &str) -> Box<dyn OperationSpan>;
}

/// Tracer that emits spans through the `tracing` crate.
pub struct TracingTracer {
    scope: String,
    version: Option<String>,
}

impl TracingTracer {
    pub fn new(scope: impl Into<String>, version: Option<String>) -> Self {
        Self { scope: scope.into(), version }
    }
}

impl Tracer for TracingTracer {
    fn start_span(&self, name: &str) -> Box<dyn OperationSpan> {
        let span = info_span!(
            "operation",
            otel.name = %name,
            otel.scope = %self.scope,
            otel.scope.version = self.version.as_deref().unwrap_or("default"),
            otel.status_code = field::Empty,
            error.kind = field::Empty,
            error.message = field::Empty,
            attributes = field::Empty,
            latency_ms = field::Empty,
        );
        Box::new(TracingSpan {
            span,
            attributes: Vec::new(),
            started: Instant::now(),
        })
    }
}

struct TracingSpan {
    span: Span,
    attributes: Vec<(String, AttributeValue)>,
    started: Instant,
}

impl OperationSpan for TracingSpan {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    fn record_error(&mut self, kind: &str, message: &str) {
        self.span.record("error.kind", kind);
        self.span.record("error.message", message);
    }

    fn set_status(&mut self, status: SpanStatus) {
        match status {
            SpanStatus::Unset => {}
            SpanStatus::Ok => {
                self.span.record("otel.status_code", "OK");
            }
            SpanStatus::Error(_) => {
                self.span.record("otel.status_code", "ERROR");
            }
        }
    }

    fn end(self: Box<Self>) {
        let rendered: Vec<String> = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        self.span.record("attributes", rendered.join(" ").as_str());
        self.span.record("latency_ms", self.started.elapsed().as_millis() as u64);
        tracing::trace!(parent: &self.span, "span ended");
    }
}

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for per-source collection spans.
pub struct CollectionSpan;

impl CollectionSpan {
    /// Fields `status`, `error.message` and `latency_ms` are filled in after
    /// the collector returns.
    pub fn new(source: &str) -> Span {
        info_span!(
            "metrics_source",
            source = %source,
            status = field::Empty,
            error.message = field::Empty,
            latency_ms = field::Empty,
        )
    }
}
