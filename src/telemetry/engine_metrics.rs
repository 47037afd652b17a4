//! Engine self-metrics via the `metrics` facade.
//!
//! These describe the aggregation engine itself. They reach whatever
//! recorder the host process installs and are no-ops otherwise.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const COLLECTION_CYCLES_TOTAL: &str = "vitals_collection_cycles_total";
pub const COLLECTION_DURATION_SECONDS: &str = "vitals_collection_duration_seconds";
pub const SOURCE_FAILURES_TOTAL: &str = "vitals_source_failures_total";
pub const SOURCE_TIMEOUTS_TOTAL: &str = "vitals_source_timeouts_total";
pub const HISTORY_SIZE: &str = "vitals_history_size";

/// Register descriptions for the engine self-metrics.
pub fn init_metrics() {
    describe_counter!(COLLECTION_CYCLES_TOTAL, "Completed metric collection cycles");
    describe_histogram!(
        COLLECTION_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of a full collection cycle"
    );
    describe_counter!(SOURCE_FAILURES_TOTAL, "Failed source collections by source");
    describe_counter!(SOURCE_TIMEOUTS_TOTAL, "Source collections that exceeded the deadline");
    describe_gauge!(HISTORY_SIZE, "Snapshots currently retained in history");
}

/// Record a finished collection cycle.
pub fn record_collection_cycle(duration: Duration, history_len: usize) {
    counter!(COLLECTION_CYCLES_TOTAL).increment(1);
    histogram!(COLLECTION_DURATION_SECONDS).record(duration.as_secs_f64());
    gauge!(HISTORY_SIZE).set(history_len as f64);
}

/// Record a failed source collection.
pub fn record_source_failure(source: &str, timed_out: bool) {
    counter!(SOURCE_FAILURES_TOTAL, "source" => source.to_string()).increment(1);
    if timed_out {
        counter!(SOURCE_TIMEOUTS_TOTAL, "source" => source.to_string()).increment(1);
    }
}
