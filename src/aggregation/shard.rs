//! One lock-guarded partition of a bucket's key space.

use crate::aggregation::types::{MetricKind, MetricValue};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Maps pre-hashed keys to their metric value under a single mutex.
///
/// Values are reference counted so the accumulation itself happens after
/// the lock is released; the lock only covers the map lookup/insert.
#[derive(Debug, Default)]
pub struct Shard {
    metrics: Mutex<FxHashMap<u64, Arc<MetricValue>>>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the value for `key`.
    ///
    /// Returns `None` if the key already holds a metric of another kind;
    /// the caller must ignore the update in that case.
    pub fn store(&self, kind: MetricKind, key: u64) -> Option<Arc<MetricValue>> {
        let mut metrics = self.metrics.lock();
        let value = metrics
            .entry(key)
            .or_insert_with(|| Arc::new(MetricValue::new(kind)));

        if value.kind() != kind {
            return None;
        }
        Some(Arc::clone(value))
    }

    /// Value stored for `key`, if any
    pub fn get(&self, key: u64) -> Option<Arc<MetricValue>> {
        self.metrics.lock().get(&key).map(Arc::clone)
    }

    pub fn clear(&self) {
        self.metrics.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
