//! Aggregation engine, snapshots, history and the exposition formatter.

pub mod engine;
pub mod exposition;
pub mod history;
pub mod snapshot;

pub use engine::{Aggregator, AggregatorConfig, DEFAULT_COLLECTION_DEADLINE};
pub use exposition::{render, sanitize_metric_name, EXPOSITION_CONTENT_TYPE};
pub use history::{History, DEFAULT_HISTORY_SIZE};
pub use snapshot::{Snapshot, SnapshotMetadata};
