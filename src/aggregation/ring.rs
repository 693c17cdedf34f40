//! Circular array of buckets, one per time window.
//!
//! Writes always land in the current window. `rotate` advances the cursor
//! and recycles the oldest window, so at most `ring_size - 1` windows of
//! history survive next to the current one. Reads scan backward from the
//! current window and return the most recent window holding the key; they
//! do not merge across windows.

use crate::aggregation::bucket::Bucket;
use crate::aggregation::hash::fnv1a;
use crate::aggregation::types::{MetricHandle, MetricKind};
use crate::core::{CollectorError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct BucketRing {
    buckets: Box<[Bucket]>,
    current: AtomicUsize,
}

impl BucketRing {
    /// Create a ring of `ring_size` windows with `shards_per_bucket` shards each
    pub fn new(ring_size: usize, shards_per_bucket: usize) -> Result<Self> {
        if ring_size == 0 {
            return Err(CollectorError::config("ring size must be greater than 0"));
        }

        let buckets = (0..ring_size)
            .map(|_| Bucket::new(shards_per_bucket))
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        Ok(Self {
            buckets,
            current: AtomicUsize::new(0),
        })
    }

    /// Record `delta` for `name` in the current window.
    ///
    /// Returns `false` if the name already holds a different kind in this
    /// window; nothing is changed then.
    #[inline]
    pub fn store(&self, kind: MetricKind, name: &[u8], delta: u64) -> bool {
        let key = fnv1a(name);
        self.current_bucket().add_metric(kind, key, delta)
    }

    pub fn increment(&self, name: &[u8], delta: u64) -> bool {
        self.store(MetricKind::Counter, name, delta)
    }

    pub fn set_gauge(&self, name: &[u8], value: u64) -> bool {
        self.store(MetricKind::Gauge, name, value)
    }

    pub fn record_timer(&self, name: &[u8], value: u64) -> bool {
        self.store(MetricKind::Timer, name, value)
    }

    /// Most recent window holding `name` with the requested kind
    pub fn get_metric(&self, kind: MetricKind, name: &[u8]) -> Option<MetricHandle> {
        let key = fnv1a(name);
        let size = self.buckets.len();
        let current = self.current_index();

        (0..size)
            .map(|offset| (current + size - offset) % size)
            .find_map(|idx| self.buckets[idx].get_metric(kind, key))
    }

    /// Clear the next window, then make it current.
    ///
    /// Must be called from a single context at a time. A write that sees
    /// the new cursor always survives; only a writer still holding an index
    /// from a full lap earlier can land in the window being cleared.
    pub fn rotate(&self) {
        let next = (self.current_index() + 1) % self.buckets.len();
        self.buckets[next].clear();
        self.current.store(next, Ordering::Release);
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Number of windows
    pub fn ring_size(&self) -> usize {
        self.buckets.len()
    }

    /// Number of metrics in the current window
    pub fn current_len(&self) -> usize {
        self.current_bucket().len()
    }

    #[inline]
    fn current_bucket(&self) -> &Bucket {
        &self.buckets[self.current_index()]
    }
}
