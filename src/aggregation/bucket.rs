//! The sharded store for one time window.

use crate::aggregation::shard::Shard;
use crate::aggregation::types::{MetricHandle, MetricKind};
use crate::core::{CollectorError, Result};

/// Fixed array of shards; a key lives in shard `key & (shards - 1)`.
#[derive(Debug)]
pub struct Bucket {
    shards: Box<[Shard]>,
    mask: u64,
}

impl Bucket {
    /// Create a bucket with `num_shards` shards.
    ///
    /// `num_shards` must be a non-zero power of two so routing can use a mask.
    pub fn new(num_shards: usize) -> Result<Self> {
        if !num_shards.is_power_of_two() {
            return Err(CollectorError::config(format!(
                "number of shards must be a power of two, got {}",
                num_shards
            )));
        }

        let shards = (0..num_shards).map(|_| Shard::new()).collect();
        Ok(Self {
            shards,
            mask: num_shards as u64 - 1,
        })
    }

    /// Index of the shard owning `key`
    #[inline]
    pub fn shard_index(&self, key: u64) -> usize {
        // mask < shards.len(), so the cast cannot truncate a valid index
        (key & self.mask) as usize
    }

    #[inline]
    fn shard(&self, key: u64) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Apply `delta` to the metric at `key`.
    ///
    /// Returns `false` without touching anything if the key already holds a
    /// metric of a different kind.
    pub fn add_metric(&self, kind: MetricKind, key: u64, delta: u64) -> bool {
        match self.shard(key).store(kind, key) {
            Some(value) => {
                value.apply(delta);
                true
            },
            None => false,
        }
    }

    /// Metric at `key`, if present with the requested kind
    pub fn get_metric(&self, kind: MetricKind, key: u64) -> Option<MetricHandle> {
        self.shard(key)
            .get(key)
            .filter(|value| value.kind() == kind)
            .map(MetricHandle::new)
    }

    /// Empty every shard
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Total number of metrics across shards
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }
}
