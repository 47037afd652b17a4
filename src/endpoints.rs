//! Transport-agnostic scrape and health handlers.
//!
//! Each request triggers one collection cycle, tracked by the lifecycle so
//! shutdown can drain it. While draining, handlers serve the last stored
//! snapshot instead of starting a new cycle.

use std::sync::Arc;

use crate::aggregator::{render, Aggregator, Snapshot, EXPOSITION_CONTENT_TYPE};
use crate::health::{HealthScorer, HealthSummary};
use crate::shutdown::{Lifecycle, LifecycleState};

/// Rendered scrape body with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResponse {
    pub content_type: &'static str,
    pub body: String,
}

async fn fresh_snapshot(aggregator: &Aggregator, lifecycle: &Lifecycle) -> Option<Arc<Snapshot>> {
    match lifecycle.track() {
        Some(_guard) => Some(aggregator.collect_all().await),
        None => {
            tracing::debug!("shutting down, serving last snapshot");
            aggregator.last_snapshot()
        }
    }
}

/// Handles scrape requests.
pub struct ScrapeHandler {
    aggregator: Arc<Aggregator>,
    lifecycle: Arc<Lifecycle>,
}

impl ScrapeHandler {
    pub fn new(aggregator: Arc<Aggregator>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { aggregator, lifecycle }
    }

    /// Collect, then render the exposition text.
    pub async fn scrape(&self) -> ScrapeResponse {
        let body = match fresh_snapshot(&self.aggregator, &self.lifecycle).await {
            Some(snapshot) => render(&snapshot),
            None => String::new(),
        };
        ScrapeResponse { content_type: EXPOSITION_CONTENT_TYPE, body }
    }
}

/// Handles health requests.
pub struct HealthHandler {
    aggregator: Arc<Aggregator>,
    lifecycle: Arc<Lifecycle>,
    scorer: HealthScorer,
}

impl HealthHandler {
    pub fn new(aggregator: Arc<Aggregator>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { aggregator, lifecycle, scorer: HealthScorer::new() }
    }

    /// Liveness: the process is up and not yet stopped.
    pub fn is_alive(&self) -> bool {
        self.lifecycle.state() != LifecycleState::Stopped
    }

    /// Collect, then summarise the last stored snapshot.
    pub async fn health(&self) -> HealthSummary {
        let _ = fresh_snapshot(&self.aggregator, &self.lifecycle).await;
        let last = self.aggregator.last_snapshot();
        self.scorer
            .summarize(last.as_deref(), self.aggregator.is_enabled())
    }
}
