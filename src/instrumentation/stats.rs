//! Running per-operation statistics.
//!
//! Totals, extremes and counters only. Averages and rates are derived from
//! the totals on read; raw samples are never kept.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Duration classification against the slow/very-slow thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    Normal,
    Slow,
    VerySlow,
}

impl Latency {
    pub fn classify(duration: Duration, slow: Duration, very_slow: Duration) -> Self {
        if duration >= very_slow {
            Self::VerySlow
        } else if duration >= slow {
            Self::Slow
        } else {
            Self::Normal
        }
    }
}

/// Accumulated statistics for one `"<entity>.<operation>"` key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Duration,
    pub total_complexity: u64,
    pub max_complexity: u32,
    pub total_result_count: u64,
    pub max_result_count: u64,
    pub slow_queries: u64,
    pub very_slow_queries: u64,
}

impl OperationStats {
    fn record_common(&mut self, duration: Duration, complexity: u32) {
        self.total_calls += 1;
        self.total_duration += duration;
        self.min_duration = Some(self.min_duration.map_or(duration, |min| min.min(duration)));
        self.max_duration = self.max_duration.max(duration);
        self.total_complexity += u64::from(complexity);
        self.max_complexity = self.max_complexity.max(complexity);
    }

    pub fn record_success(
        &mut self,
        duration: Duration,
        complexity: u32,
        result_count: u64,
        latency: Latency,
    ) {
        self.record_common(duration, complexity);
        self.successful_calls += 1;
        self.total_result_count += result_count;
        self.max_result_count = self.max_result_count.max(result_count);
        match latency {
            Latency::VerySlow => self.very_slow_queries += 1,
            Latency::Slow => self.slow_queries += 1,
            Latency::Normal => {}
        }
    }

    pub fn record_failure(&mut self, duration: Duration, complexity: u32) {
        self.record_common(duration, complexity);
        self.failed_calls += 1;
    }

    pub fn average_duration(&self) -> Duration {
        if self.total_calls == 0 {
            return Duration::ZERO;
        }
        self.total_duration.div_f64(self.total_calls as f64)
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_calls, self.total_calls)
    }

    pub fn average_complexity(&self) -> f64 {
        ratio(self.total_complexity, self.total_calls)
    }

    pub fn average_result_count(&self) -> f64 {
        ratio(self.total_result_count, self.successful_calls)
    }

    pub fn slow_query_rate(&self) -> f64 {
        ratio(self.slow_queries, self.total_calls)
    }

    pub fn very_slow_query_rate(&self) -> f64 {
        ratio(self.very_slow_queries, self.total_calls)
    }

    /// Derived, serialisable view.
    pub fn report(&self) -> OperationReport {
        OperationReport {
            total_calls: self.total_calls,
            successful_calls: self.successful_calls,
            failed_calls: self.failed_calls,
            success_rate: self.success_rate(),
            average_duration_seconds: self.average_duration().as_secs_f64(),
            min_duration_seconds: self.min_duration.unwrap_or_default().as_secs_f64(),
            max_duration_seconds: self.max_duration.as_secs_f64(),
            average_complexity: self.average_complexity(),
            max_complexity: self.max_complexity,
            average_result_count: self.average_result_count(),
            max_result_count: self.max_result_count,
            slow_queries: self.slow_queries,
            very_slow_queries: self.very_slow_queries,
            slow_query_rate: self.slow_query_rate(),
            very_slow_query_rate: self.very_slow_query_rate(),
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Derived rates for one operation key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub success_rate: f64,
    pub average_duration_seconds: f64,
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub average_complexity: f64,
    pub max_complexity: u32,
    pub average_result_count: f64,
    pub max_result_count: u64,
    pub slow_queries: u64,
    pub very_slow_queries: u64,
    pub slow_query_rate: f64,
    pub very_slow_query_rate: f64,
}

/// Aggregate across every operation key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataAccessHealth {
    pub tracked_operations: usize,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub average_duration_seconds: f64,
    pub slow_queries: u64,
    pub very_slow_queries: u64,
    pub slow_query_rate: f64,
    pub very_slow_query_rate: f64,
    pub active_connections: i64,
}

/// Concurrent map of operation key to statistics.
#[derive(Default)]
pub struct StatsTable {
    entries: DashMap<String, OperationStats>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(entity: &str, operation: &str) -> String {
        format!("{}.{}", entity, operation)
    }

    /// Apply `update` to the entry for `key`, creating it if needed.
    pub fn update(&self, key: String, update: impl FnOnce(&mut OperationStats)) {
        update(&mut self.entries.entry(key).or_default());
    }

    pub fn get(&self, key: &str) -> Option<OperationStats> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Ordered copy of every entry.
    pub fn entries(&self) -> BTreeMap<String, OperationStats> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn reports(&self) -> BTreeMap<String, OperationReport> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().report()))
            .collect()
    }

    pub fn health(&self, active_connections: i64) -> DataAccessHealth {
        let mut total = OperationStats::default();
        let mut tracked = 0;
        for entry in self.entries.iter() {
            let stats = entry.value();
            tracked += 1;
            total.total_calls += stats.total_calls;
            total.successful_calls += stats.successful_calls;
            total.failed_calls += stats.failed_calls;
            total.total_duration += stats.total_duration;
            total.slow_queries += stats.slow_queries;
            total.very_slow_queries += stats.very_slow_queries;
        }

        DataAccessHealth {
            tracked_operations: tracked,
            total_operations: total.total_calls,
            successful_operations: total.successful_calls,
            failed_operations: total.failed_calls,
            success_rate: total.success_rate(),
            error_rate: ratio(total.failed_calls, total.total_calls),
            average_duration_seconds: total.average_duration().as_secs_f64(),
            slow_queries: total.slow_queries,
            very_slow_queries: total.very_slow_queries,
            slow_query_rate: total.slow_query_rate(),
            very_slow_query_rate: total.very_slow_query_rate(),
            active_connections,
        }
    }
}
