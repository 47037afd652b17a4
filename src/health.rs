//! Health scoring for Vitals.
//!
//! Classifies the last snapshot into a coarse status and a boolean
//! `healthy` flag for orchestrator probes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::Snapshot;

/// Success rate at or above which the status is `healthy`.
pub const HEALTHY_SUCCESS_RATE: f64 = 0.95;
/// Success rate at or above which the status is `degraded`.
pub const DEGRADED_SUCCESS_RATE: f64 = 0.80;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NoData,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= HEALTHY_SUCCESS_RATE {
            Self::Healthy
        } else if rate >= DEGRADED_SUCCESS_RATE {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Structured health summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sources: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_sources: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_sources: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_aggregation: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_connected: Option<bool>,
}

impl HealthSummary {
    pub fn no_data() -> Self {
        Self {
            status: HealthStatus::NoData,
            healthy: false,
            enabled: None,
            total_sources: None,
            enabled_sources: None,
            error_sources: None,
            success_rate: None,
            last_aggregation: None,
            collection_duration_seconds: None,
            uptime_seconds: None,
            database_connected: None,
        }
    }
}

/// Scores snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer;

impl HealthScorer {
    pub fn new() -> Self {
        Self
    }

    /// Summarise `snapshot`; `enabled` is the aggregator's current switch.
    pub fn summarize(&self, snapshot: Option<&Snapshot>, enabled: bool) -> HealthSummary {
        let Some(snapshot) = snapshot else {
            return HealthSummary::no_data();
        };

        let metadata = &snapshot.metadata;
        let rate = metadata.success_rate;
        let total = metadata.total_sources;
        let error_sources = metadata.error_sources();

        let healthy = enabled
            && metadata.enabled_sources > 0
            && rate >= DEGRADED_SUCCESS_RATE
            && (error_sources as f64) < total as f64 / 2.0;

        HealthSummary {
            status: HealthStatus::from_success_rate(rate),
            healthy,
            enabled: Some(enabled),
            total_sources: Some(total),
            enabled_sources: Some(metadata.enabled_sources),
            error_sources: Some(error_sources),
            success_rate: Some(rate),
            last_aggregation: Some(metadata.aggregation_time),
            collection_duration_seconds: Some(metadata.collection_duration_seconds),
            uptime_seconds: snapshot.uptime_seconds(),
            database_connected: snapshot.database_connected(),
        }
    }
}
