//! Telemetry plumbing for Vitals.
//!
//! Structured logging, the tracing and metrics-registry seams used by
//! instrumentation, the in-process metric store, and the handle caches.

mod cache;
mod engine_metrics;
mod logging;
mod meter;
mod provider;
mod resource;
mod spans;
mod store;

pub use cache::{HandleCache, DEFAULT_HANDLE_CACHE_SIZE};
pub use engine_metrics::{init_metrics, record_collection_cycle, record_source_failure};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use meter::{Counter, Histogram, Labels, Meter, StoreMeter, UpDownCounter};
pub use provider::{
    MeterProvider, StoreMeterProvider, Telemetry, TracerProvider, TracingTracerProvider,
};
pub use resource::{host_name, Resource};
pub use spans::{
    AttributeValue, CollectionSpan, OperationSpan, SpanExt, SpanStatus, Tracer, TracingTracer,
};
pub use store::{HistogramSummary, MetricsStore, SeriesKey, StoreSnapshot};
