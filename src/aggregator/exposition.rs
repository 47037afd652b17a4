//! Exposition formatter.
//!
//! Section order: system text, data-access text, health, performance,
//! aggregation metadata. Output depends only on the snapshot, so rendering
//! the same snapshot twice yields identical bytes.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::snapshot::Snapshot;

/// Content type for the rendered text.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn invalid_name_chars() -> Option<&'static Regex> {
    static INVALID: OnceLock<Option<Regex>> = OnceLock::new();
    INVALID
        .get_or_init(|| Regex::new(r"[^a-zA-Z0-9_:]").ok())
        .as_ref()
}

/// Replace characters not allowed in a metric name with `_`.
pub fn sanitize_metric_name(name: &str) -> String {
    let cleaned = match invalid_name_chars() {
        Some(pattern) => pattern.replace_all(name, "_").into_owned(),
        None => name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
            .collect(),
    };
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{}", cleaned),
        _ => cleaned,
    }
}

fn push_text(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

fn push_line(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{} {}", sanitize_metric_name(name), value);
}

/// Emit `prefix_key value` for every numeric leaf, recursing into maps.
fn flatten_numeric(out: &mut String, prefix: &str, value: &Value) {
    match value {
        Value::Number(n) => push_line(out, prefix, n),
        Value::Object(map) => {
            for (key, child) in map {
                flatten_numeric(out, &format!("{}_{}", prefix, key), child);
            }
        }
        _ => {}
    }
}

fn render_health(out: &mut String, health: &Map<String, Value>) {
    out.push_str("# Health metrics\n");
    for section in ["system", "process"] {
        if let Some(value) = health.get(section) {
            flatten_numeric(out, section, value);
        }
    }
    if let Some(database) = health.get("database") {
        let connected = database
            .get("connected")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        push_line(out, "database_connected", u8::from(connected));
        if let Some(response) = database.get("response_time_seconds").and_then(Value::as_f64) {
            push_line(out, "database_response_time_seconds", response);
        }
    }
    if let Some(uptime) = health.get("uptime_seconds").and_then(Value::as_f64) {
        push_line(out, "application_uptime_seconds", uptime);
    }
}

/// Render a snapshot as one exposition-format text blob.
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    if let Some(system) = &snapshot.system {
        push_text(&mut out, system);
    }

    if let Some(data_access) = &snapshot.data_access {
        out.push_str("# Data-access metrics\n");
        push_text(&mut out, data_access);
    }

    if let Some(health) = &snapshot.health {
        render_health(&mut out, health);
    }

    if let Some(performance) = &snapshot.performance {
        out.push_str("# Performance metrics\n");
        for (key, value) in performance {
            flatten_numeric(&mut out, &format!("performance_{}", key), value);
        }
    }

    let metadata = &snapshot.metadata;
    out.push_str("# Aggregation metadata\n");
    push_line(
        &mut out,
        "metrics_collection_duration_seconds",
        metadata.collection_duration_seconds,
    );
    push_line(&mut out, "metrics_sources_total", metadata.total_sources);
    push_line(&mut out, "metrics_sources_enabled", metadata.enabled_sources);
    push_line(&mut out, "metrics_success_rate", metadata.success_rate);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_metric_name() {
        assert_eq!(sanitize_metric_name("system_cpu.load-1m"), "system_cpu_load_1m");
        assert_eq!(sanitize_metric_name("1st"), "_1st");
        assert_eq!(sanitize_metric_name("ok:name"), "ok:name");
    }

    #[test]
    fn test_flatten_numeric_skips_non_numbers() {
        let mut out = String::new();
        let value = serde_json::json!({ "a": 1, "b": { "c": 2.5, "d": "text" }, "e": [1, 2] });
        flatten_numeric(&mut out, "system", &value);
        assert_eq!(out, "system_a 1\nsystem_b_c 2.5\n");
    }
}
