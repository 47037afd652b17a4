//! Collector seam.
//!
//! A collector is a nullary async function producing either exposition text
//! or a structured map. The variant decides where the aggregator files the
//! result.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CollectorError;

/// What one collector produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectedMetrics {
    /// Exposition-format text, embedded verbatim.
    Text(String),
    /// Structured map of named values.
    Structured(Map<String, Value>),
}

impl CollectedMetrics {
    /// Serialise any value into the structured variant.
    ///
    /// Values that do not serialise to a JSON object are wrapped under a
    /// single `value` key.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self, CollectorError> {
        let value = serde_json::to_value(value)
            .map_err(|e| CollectorError::failed(format!("serialise metrics: {}", e)))?;
        Ok(match value {
            Value::Object(map) => Self::Structured(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self::Structured(map)
            }
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured(map) => Some(map),
            Self::Text(_) => None,
        }
    }
}

impl From<String> for CollectedMetrics {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for CollectedMetrics {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for CollectedMetrics {
    fn from(map: Map<String, Value>) -> Self {
        Self::Structured(map)
    }
}

/// Produces metrics for one source.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<CollectedMetrics, CollectorError>;
}

/// Adapter turning an async closure into a [`Collector`].
pub struct FnCollector<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Collector for FnCollector<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<CollectedMetrics, CollectorError>> + Send,
{
    async fn collect(&self) -> Result<CollectedMetrics, CollectorError> {
        (self.f)().await
    }
}

/// Wrap an async closure as a shared collector.
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Collector>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CollectedMetrics, CollectorError>> + Send + 'static,
{
    Arc::new(FnCollector { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_wraps_scalars() {
        let metrics = CollectedMetrics::structured(&json!(3)).unwrap();
        assert_eq!(metrics.as_structured().unwrap().get("value"), Some(&json!(3)));
    }

    #[test]
    fn test_from_fn_collects() {
        let collector = from_fn(|| async { Ok(CollectedMetrics::from("up 1\n")) });
        let metrics = tokio_test::block_on(collector.collect()).unwrap();
        assert_eq!(metrics.as_text(), Some("up 1\n"));
    }
}
