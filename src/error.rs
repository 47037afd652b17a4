//! Error types for Vitals.
//!
//! Failures are isolated where they occur: a broken source never aborts a
//! collection cycle and a broken instrumentation setup never blocks the
//! wrapped client. Only the wrapped client's own errors reach callers.

use std::time::Duration;

use thiserror::Error;

use crate::instrumentation::DataAccessError;

/// Error returned by a collector function.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collection failed: {0}")]
    Failed(String),

    #[error("Data access failed: {0}")]
    DataAccess(#[from] DataAccessError),
}

impl CollectorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Outcome of a single source that did not produce data in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceCollectionError {
    #[error("Source '{source_name}' failed: {message}")]
    Failed { source_name: String, message: String },

    #[error("Source '{source_name}' panicked during collection")]
    Panicked { source_name: String },

    #[error("Source '{source_name}' exceeded the {}ms collection deadline", .deadline.as_millis())]
    DeadlineExceeded { source_name: String, deadline: Duration },

    #[error("Source '{source_name}' was cancelled by shutdown")]
    Cancelled { source_name: String },
}

impl SourceCollectionError {
    pub fn source_name(&self) -> &str {
        match self {
            Self::Failed { source_name, .. }
            | Self::Panicked { source_name }
            | Self::DeadlineExceeded { source_name, .. }
            | Self::Cancelled { source_name } => source_name,
        }
    }

    /// Returns true if the source simply ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// Failure while wrapping a data-access client. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentationSetupError {
    #[error("Delegate discovery failed: {0}")]
    DelegateDiscovery(String),

    #[error("Duplicate entity delegate: {0}")]
    DuplicateEntity(String),
}
