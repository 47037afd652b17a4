//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `VITALS_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `VITALS_AGGREGATION_ENABLED` | true | Aggregation on/off |
//! | `VITALS_COLLECTION_DEADLINE_MS` | 30000 | Shared collection deadline (ms, floor 10) |
//! | `VITALS_HISTORY_SIZE` | 100 | Snapshots kept in history |
//! | `VITALS_HANDLE_CACHE_SIZE` | 100 | Tracer/meter handle cache capacity |
//! | `VITALS_SLOW_QUERY_MS` | 1000 | Slow operation threshold (ms) |
//! | `VITALS_VERY_SLOW_QUERY_MS` | 5000 | Very slow operation threshold (ms, >= slow) |
//! | `VITALS_SERVICE_NAME` | vitals | `service.name` span attribute |
//! | `VITALS_DB_SYSTEM` | postgresql | `db.system` span attribute |
//! | `VITALS_SPAN_DOMAIN` | db | Span-name prefix |
//! | `VITALS_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `VITALS_LOG_FORMAT` | json | `json` or `pretty` |
//! | `VITALS_LOG_LEVEL` | info | Log filter directive |

use std::time::Duration;

use serde::Serialize;

use crate::aggregator::{AggregatorConfig, DEFAULT_HISTORY_SIZE};
use crate::instrumentation::InstrumentationSettings;
use crate::telemetry::{LogConfig, LogFormat, DEFAULT_HANDLE_CACHE_SIZE};

const MIN_DEADLINE_MS: u64 = 10;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub aggregation_enabled: bool,
    pub collection_deadline_ms: u64,
    pub history_size: usize,
    pub handle_cache_size: usize,
    pub slow_query_ms: u64,
    pub very_slow_query_ms: u64,
    pub service_name: String,
    pub db_system: String,
    pub span_domain: String,
    pub shutdown_timeout_secs: u64,
    pub log_format: String,
    pub log_level: String,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub aggregator: AggregatorConfig,
    pub instrumentation: InstrumentationSettings,
    pub handle_cache_size: usize,
    pub shutdown_timeout: Duration,
    pub logging: LogConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            aggregator: AggregatorConfig::default(),
            instrumentation: InstrumentationSettings::default(),
            handle_cache_size: DEFAULT_HANDLE_CACHE_SIZE,
            shutdown_timeout: Duration::from_secs(30),
            logging: LogConfig::default(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`true/false`, `1/0`, `yes/no`, `on/off`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Read a non-empty string env var.
fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Load aggregation configuration from environment.
fn load_aggregator_config() -> AggregatorConfig {
    let enabled = parse_bool("VITALS_AGGREGATION_ENABLED", true);
    let deadline_ms = parse_u64("VITALS_COLLECTION_DEADLINE_MS", 30_000);
    let history_size = parse_usize("VITALS_HISTORY_SIZE", DEFAULT_HISTORY_SIZE);
    let deadline_ms = deadline_ms.max(MIN_DEADLINE_MS);
    let history_size = history_size.max(1);
    AggregatorConfig {
        enabled,
        collection_deadline: Duration::from_millis(deadline_ms),
        history_size,
    }
}

/// Load instrumentation settings from environment.
fn load_instrumentation_settings() -> InstrumentationSettings {
    let defaults = InstrumentationSettings::default();
    let slow_ms = parse_u64("VITALS_SLOW_QUERY_MS", 1000);
    let very_slow_ms = parse_u64("VITALS_VERY_SLOW_QUERY_MS", 5000);
    let very_slow_ms = very_slow_ms.max(slow_ms); // very slow >= slow
    InstrumentationSettings {
        service_name: parse_string("VITALS_SERVICE_NAME", &defaults.service_name),
        db_system: parse_string("VITALS_DB_SYSTEM", &defaults.db_system),
        span_domain: parse_string("VITALS_SPAN_DOMAIN", &defaults.span_domain),
        slow_query_threshold: Duration::from_millis(slow_ms),
        very_slow_query_threshold: Duration::from_millis(very_slow_ms),
    }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let format = std::env::var("VITALS_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    LogConfig {
        format,
        level: parse_string("VITALS_LOG_LEVEL", "info"),
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let handle_cache_size = parse_usize("VITALS_HANDLE_CACHE_SIZE", DEFAULT_HANDLE_CACHE_SIZE);
    let shutdown_secs = parse_u64("VITALS_SHUTDOWN_TIMEOUT", 30);
    let handle_cache_size = handle_cache_size.max(1);
    let shutdown_secs = shutdown_secs.max(1);

    EnvConfig {
        aggregator: load_aggregator_config(),
        instrumentation: load_instrumentation_settings(),
        handle_cache_size,
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        logging: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            aggregation_enabled: self.aggregator.enabled,
            collection_deadline_ms: self.aggregator.collection_deadline.as_millis() as u64,
            history_size: self.aggregator.history_size,
            handle_cache_size: self.handle_cache_size,
            slow_query_ms: self.instrumentation.slow_query_threshold.as_millis() as u64,
            very_slow_query_ms: self.instrumentation.very_slow_query_threshold.as_millis() as u64,
            service_name: self.instrumentation.service_name.clone(),
            db_system: self.instrumentation.db_system.clone(),
            span_domain: self.instrumentation.span_domain.clone(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_format: self.logging.format.as_str().to_string(),
            log_level: self.logging.level.clone(),
        }
    }

    /// Human-readable warnings about values that are legal but suspicious.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.aggregator.enabled {
            warnings.push("aggregation is disabled; scrapes return empty snapshots".to_string());
        }
        if self.shutdown_timeout < self.aggregator.collection_deadline {
            warnings.push(format!(
                "shutdown timeout ({}s) is shorter than the collection deadline ({}ms)",
                self.shutdown_timeout.as_secs(),
                self.aggregator.collection_deadline.as_millis()
            ));
        }
        if self.instrumentation.slow_query_threshold == self.instrumentation.very_slow_query_threshold {
            warnings.push(
                "slow and very slow thresholds are equal; every slow operation counts as very slow"
                    .to_string(),
            );
        }
        warnings
    }
}
