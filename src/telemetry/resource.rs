//! Attributes identifying the emitting process.

use super::spans::AttributeValue;

/// Host and process identity attached to operation spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub host_name: String,
    pub pid: u32,
}

impl Resource {
    /// Identity of the current process.
    pub fn detect() -> Self {
        Self {
            host_name: host_name(),
            pid: std::process::id(),
        }
    }

    pub fn attributes(&self) -> [(&'static str, AttributeValue); 2] {
        [
            ("host.name", self.host_name.as_str().into()),
            ("process.pid", AttributeValue::Int(i64::from(self.pid))),
        ]
    }
}

/// Local host name, or `"unknown"` when it cannot be read.
pub fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
