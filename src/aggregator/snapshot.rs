//! Snapshot of one collection cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::sources::{
    CollectedMetrics, SourceStats, BUSINESS_SOURCE, DATA_ACCESS_SOURCE, HEALTH_SOURCE,
    PERFORMANCE_SOURCE, SYSTEM_SOURCE,
};

/// Aggregation-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMetadata {
    pub aggregation_time: DateTime<Utc>,
    pub collection_duration_seconds: f64,
    pub enabled: bool,
    pub total_sources: usize,
    pub enabled_sources: usize,
    /// Σsuccess / Σ(success + error) over every source; 0 with no attempts.
    pub success_rate: f64,
    pub sources: BTreeMap<String, SourceStats>,
    /// Sources that failed in this cycle, with the reason.
    pub failures: BTreeMap<String, String>,
}

impl SnapshotMetadata {
    /// Sources with at least one recorded error.
    pub fn error_sources(&self) -> usize {
        self.sources.values().filter(|s| s.error_count > 0).count()
    }
}

/// Immutable result of one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<Map<String, Value>>,
    pub custom: BTreeMap<String, Value>,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    pub fn new(metadata: SnapshotMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: metadata.aggregation_time,
            system: None,
            data_access: None,
            health: None,
            performance: None,
            business: None,
            custom: BTreeMap::new(),
            metadata,
        }
    }

    /// File one source's result by name. Reserved names only capture the
    /// matching shape; anything else lands in `custom`.
    pub fn file(&mut self, source: &str, metrics: CollectedMetrics) {
        match (source, metrics) {
            (SYSTEM_SOURCE, CollectedMetrics::Text(text)) => self.system = Some(text),
            (DATA_ACCESS_SOURCE, CollectedMetrics::Text(text)) => self.data_access = Some(text),
            (HEALTH_SOURCE, CollectedMetrics::Structured(map)) => self.health = Some(map),
            (PERFORMANCE_SOURCE, CollectedMetrics::Structured(map)) => {
                self.performance = Some(map)
            }
            (BUSINESS_SOURCE, CollectedMetrics::Structured(map)) => self.business = Some(map),
            (_, CollectedMetrics::Text(text)) => {
                self.custom.insert(source.to_string(), Value::String(text));
            }
            (_, CollectedMetrics::Structured(map)) => {
                self.custom.insert(source.to_string(), Value::Object(map));
            }
        }
    }

    /// `database.connected` from the health map, when present.
    pub fn database_connected(&self) -> Option<bool> {
        self.health
            .as_ref()?
            .get("database")?
            .get("connected")?
            .as_bool()
    }

    /// `uptime_seconds` from the health map, when present.
    pub fn uptime_seconds(&self) -> Option<f64> {
        self.health.as_ref()?.get("uptime_seconds")?.as_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> SnapshotMetadata {
        SnapshotMetadata {
            aggregation_time: Utc::now(),
            collection_duration_seconds: 0.0,
            enabled: true,
            total_sources: 0,
            enabled_sources: 0,
            success_rate: 0.0,
            sources: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    #[test]
    fn test_reserved_names_file_by_shape() {
        let mut snapshot = Snapshot::new(metadata());
        snapshot.file("system", CollectedMetrics::Text("up 1\n".into()));
        snapshot.file("health", CollectedMetrics::Structured(Map::new()));
        snapshot.file("system-extra", CollectedMetrics::Text("x 1\n".into()));
        snapshot.file("performance", CollectedMetrics::Text("wrong shape".into()));

        assert_eq!(snapshot.system.as_deref(), Some("up 1\n"));
        assert!(snapshot.health.is_some());
        assert!(snapshot.performance.is_none());
        assert_eq!(snapshot.custom["system-extra"], json!("x 1\n"));
        assert_eq!(snapshot.custom["performance"], json!("wrong shape"));
    }

    #[test]
    fn test_health_accessors() {
        let mut snapshot = Snapshot::new(metadata());
        let health = json!({ "database": { "connected": true }, "uptime_seconds": 12.5 });
        if let Value::Object(map) = health {
            snapshot.file("health", CollectedMetrics::Structured(map));
        }
        assert_eq!(snapshot.database_connected(), Some(true));
        assert_eq!(snapshot.uptime_seconds(), Some(12.5));
    }
}
