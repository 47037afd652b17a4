//! Metric sources: the collector seam, the registry and built-in sources.

pub mod builtin;
pub mod collector;
pub mod registry;
pub mod system_stats;

pub use builtin::{
    data_access_source, data_access_stats_source, health_source, system_source,
    ExpositionRenderer, HealthProbe, StoreRenderer, BUSINESS_SOURCE, DATA_ACCESS_SOURCE,
    DATA_ACCESS_STATS_SOURCE, HEALTH_SOURCE, PERFORMANCE_SOURCE, PING_STATEMENT, SYSTEM_SOURCE,
};
pub use collector::{from_fn, CollectedMetrics, Collector, FnCollector};
pub use registry::{MetricSource, SourceRegistry, SourceStats};
pub use system_stats::{
    CpuStats, DiskStats, MemoryStats, NetworkStats, ProcStatsProvider, ProcessStats, SystemStats,
    SystemStatsProvider,
};
