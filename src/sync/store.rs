//! In-memory cache of the latest predictions per stop.
//!
//! A single background task writes; any number of HTTP handlers read.
//! Reads are copy-out so a caller never holds the lock while serializing
//! a response, and never observes a partially written list.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::Prediction;

/// Cache of the most recent predictions per stop key, plus the one global
/// timestamp of the last refresh batch (batch-level, not per-stop).
pub struct PredictionStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    predictions: HashMap<String, Vec<Prediction>>,
    last_refreshed: DateTime<Utc>,
}

impl PredictionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                predictions: HashMap::new(),
                // Epoch start so the very first schedule check is already due
                last_refreshed: DateTime::UNIX_EPOCH,
            }),
        }
    }

    /// Replace the cached prediction list for a single stop key. Other
    /// keys are untouched.
    pub async fn write(&self, stop_key: &str, predictions: Vec<Prediction>) {
        let mut inner = self.inner.write().await;
        inner.predictions.insert(stop_key.to_string(), predictions);
    }

    /// Record the start of a refresh batch.
    pub async fn set_last_refreshed(&self, at: DateTime<Utc>) {
        self.inner.write().await.last_refreshed = at;
    }

    /// The latest predictions for a stop key. `None` means the key has
    /// never been written, which is distinct from an empty list.
    pub async fn current(&self, stop_key: &str) -> Option<Vec<Prediction>> {
        self.inner.read().await.predictions.get(stop_key).cloned()
    }

    pub async fn last_refreshed(&self) -> DateTime<Utc> {
        self.inner.read().await.last_refreshed
    }

    /// Snapshot of every cached stop's predictions.
    pub async fn all(&self) -> HashMap<String, Vec<Prediction>> {
        self.inner.read().await.predictions.clone()
    }

    /// Number of stop keys with a cached entry.
    pub async fn cached_stop_count(&self) -> usize {
        self.inner.read().await.predictions.len()
    }
}

impl Default for PredictionStore {
    fn default() -> Self {
        Self::new()
    }
}
