//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables
//! without starting a runtime.

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EnvConfig::default().effective_config());
}

/// Validate configuration for suspicious combinations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = config::load().warnings();
    if warnings.is_empty() {
        println!("Configuration is valid.");
        return 0;
    }
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    1
}

/// Render the effective config as `VAR=value` lines.
pub fn format_config(cfg: &EffectiveConfig) -> String {
    [
        format!("VITALS_AGGREGATION_ENABLED={}", cfg.aggregation_enabled),
        format!("VITALS_COLLECTION_DEADLINE_MS={}", cfg.collection_deadline_ms),
        format!("VITALS_HISTORY_SIZE={}", cfg.history_size),
        format!("VITALS_HANDLE_CACHE_SIZE={}", cfg.handle_cache_size),
        format!("VITALS_SLOW_QUERY_MS={}", cfg.slow_query_ms),
        format!("VITALS_VERY_SLOW_QUERY_MS={}", cfg.very_slow_query_ms),
        format!("VITALS_SERVICE_NAME={}", cfg.service_name),
        format!("VITALS_DB_SYSTEM={}", cfg.db_system),
        format!("VITALS_SPAN_DOMAIN={}", cfg.span_domain),
        format!("VITALS_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs),
        format!("VITALS_LOG_FORMAT={}", cfg.log_format),
        format!("VITALS_LOG_LEVEL={}", cfg.log_level),
    ]
    .join("\n")
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{}", format_config(cfg));
}
