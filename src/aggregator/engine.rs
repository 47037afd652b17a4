//! Aggregation engine.
//!
//! One task per enabled source, all joined under a single shared deadline.
//! Sources that finish before the deadline keep their results; sources still
//! pending when it fires are recorded as `DeadlineExceeded` and their tasks
//! are aborted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::exposition;
use super::history::{History, DEFAULT_HISTORY_SIZE};
use super::snapshot::{Snapshot, SnapshotMetadata};
use crate::error::{CollectorError, SourceCollectionError};
use crate::sources::{CollectedMetrics, SourceRegistry};
use crate::telemetry::{record_collection_cycle, record_source_failure, CollectionSpan, SpanExt};

pub const DEFAULT_COLLECTION_DEADLINE: Duration = Duration::from_secs(30);

/// Aggregator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub enabled: bool,
    /// Shared deadline for one collection cycle.
    pub collection_deadline: Duration,
    pub history_size: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_deadline: DEFAULT_COLLECTION_DEADLINE,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

type TaskOutput = (Result<CollectedMetrics, CollectorError>, Duration);

/// Pulls every enabled source and assembles snapshots.
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    deadline: Duration,
    enabled: AtomicBool,
    history: History,
    last: RwLock<Option<Arc<Snapshot>>>,
    shutdown: CancellationToken,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, config: AggregatorConfig) -> Self {
        Self::with_shutdown(registry, config, CancellationToken::new())
    }

    /// Aggregator whose in-flight cycles stop when `shutdown` is cancelled.
    pub fn with_shutdown(
        registry: Arc<SourceRegistry>,
        config: AggregatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            deadline: config.collection_deadline,
            enabled: AtomicBool::new(config.enabled),
            history: History::new(config.history_size),
            last: RwLock::new(None),
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn collection_deadline(&self) -> Duration {
        self.deadline
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "metrics aggregation toggled");
    }

    /// Most recent stored snapshot.
    pub fn last_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.last.read().clone()
    }

    /// Stored snapshots, oldest first.
    pub fn history(&self) -> Vec<Arc<Snapshot>> {
        self.history.snapshots()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Drop the stored snapshot and history.
    pub fn clear(&self) {
        self.history.clear();
        *self.last.write() = None;
    }

    /// Render the last snapshot, if any.
    pub fn exposition(&self) -> Option<String> {
        self.last_snapshot().map(|snapshot| exposition::render(&snapshot))
    }

    fn metadata(&self, enabled: bool) -> SnapshotMetadata {
        SnapshotMetadata {
            aggregation_time: Utc::now(),
            collection_duration_seconds: 0.0,
            enabled,
            total_sources: self.registry.len(),
            enabled_sources: self.registry.enabled_count(),
            success_rate: self.registry.success_rate(),
            sources: self.registry.stats(),
            failures: BTreeMap::new(),
        }
    }

    fn record_failure(&self, error: SourceCollectionError, failures: &mut BTreeMap<String, String>) {
        tracing::warn!(source = %error.source_name(), error = %error, "metrics source failed");
        record_source_failure(error.source_name(), error.is_timeout());
        self.registry.record_failure(&error);
        failures.insert(error.source_name().to_string(), error.to_string());
    }

    /// Run one collection cycle.
    ///
    /// Never fails: per-source problems are isolated and reported through
    /// the snapshot metadata. A disabled aggregator returns an empty
    /// snapshot that is not stored.
    pub async fn collect_all(&self) -> Arc<Snapshot> {
        if !self.is_enabled() {
            return Arc::new(Snapshot::new(self.metadata(false)));
        }

        let started = Instant::now();
        let deadline = started + self.deadline;
        let sources = self.registry.collectable();

        let mut snapshot = Snapshot::new(self.metadata(true));
        let mut failures = BTreeMap::new();
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut aborts = Vec::with_capacity(sources.len());
        let mut tasks = FuturesUnordered::new();

        for (name, collector) in sources {
            let span = CollectionSpan::new(&name);
            let task_span = span.clone();
            let handle = tokio::spawn(
                async move {
                    let started = Instant::now();
                    let result = collector.collect().await;
                    let elapsed = started.elapsed();
                    task_span.record_result(&result);
                    task_span.record("latency_ms", elapsed.as_millis() as u64);
                    (result, elapsed)
                }
                .instrument(span),
            );
            aborts.push(handle.abort_handle());
            pending.insert(name.clone());
            tasks.push(async move { (name, handle.await) });
        }

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;

                next = tasks.next() => match next {
                    Some((name, joined)) => {
                        pending.remove(&name);
                        match self.settle(&name, joined) {
                            Ok(metrics) => snapshot.file(&name, metrics),
                            Err(error) => self.record_failure(error, &mut failures),
                        }
                    }
                    None => break,
                },
                _ = &mut expiry => {
                    for source_name in std::mem::take(&mut pending) {
                        let error = SourceCollectionError::DeadlineExceeded {
                            source_name,
                            deadline: self.deadline,
                        };
                        self.record_failure(error, &mut failures);
                    }
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    for source_name in std::mem::take(&mut pending) {
                        let error = SourceCollectionError::Cancelled { source_name };
                        self.record_failure(error, &mut failures);
                    }
                    break;
                }
            }
        }

        for abort in aborts {
            abort.abort();
        }

        let elapsed = started.elapsed();
        let mut metadata = self.metadata(true);
        metadata.aggregation_time = snapshot.metadata.aggregation_time;
        metadata.collection_duration_seconds = elapsed.as_secs_f64();
        metadata.failures = failures;
        snapshot.metadata = metadata;

        let snapshot = Arc::new(snapshot);
        *self.last.write() = Some(Arc::clone(&snapshot));
        let history_len = self.history.push(Arc::clone(&snapshot));
        record_collection_cycle(elapsed, history_len);

        tracing::debug!(
            snapshot_id = %snapshot.id,
            duration_ms = elapsed.as_millis() as u64,
            failures = snapshot.metadata.failures.len(),
            "collection cycle complete"
        );
        snapshot
    }

    /// Update the registry for one finished task.
    fn settle(
        &self,
        name: &str,
        joined: Result<TaskOutput, JoinError>,
    ) -> Result<CollectedMetrics, SourceCollectionError> {
        match joined {
            Ok((Ok(metrics), elapsed)) => {
                self.registry.record_success(name, elapsed, Utc::now());
                Ok(metrics)
            }
            Ok((Err(err), _)) => Err(SourceCollectionError::Failed {
                source_name: name.to_string(),
                message: err.to_string(),
            }),
            Err(err) if err.is_panic() => Err(SourceCollectionError::Panicked {
                source_name: name.to_string(),
            }),
            Err(_) => Err(SourceCollectionError::Cancelled {
                source_name: name.to_string(),
            }),
        }
    }
}
