//! Concurrent, time-windowed metric aggregation.
//!
//! Layout, leaves first:
//! - `hash`: FNV-1a fingerprint of metric names (the storage key)
//! - `types`: Counter / Gauge / Timer accumulators
//! - `shard`: mutex-guarded key -> value map
//! - `bucket`: power-of-two array of shards for one window
//! - `ring`: circular array of buckets with rotation and lookback
//!
//! Metric names are never retained; two names with the same fingerprint
//! share one slot.

pub mod bucket;
pub mod hash;
pub mod ring;
pub mod shard;
pub mod types;

pub use bucket::Bucket;
pub use hash::fnv1a;
pub use ring::BucketRing;
pub use shard::Shard;
pub use types::{MetricHandle, MetricKind, MetricSnapshot, MetricValue, TimerSnapshot};
