//! Metric accumulators.
//!
//! Every accumulator is a set of atomics so a value can be updated through
//! a shared handle after the owning shard's lock has been released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metric kinds accepted on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonically increasing count (`c`)
    Counter,
    /// Last-write-wins scalar (`g`)
    Gauge,
    /// count/sum/min/max aggregate (`t`)
    Timer,
}

impl MetricKind {
    /// Parse the wire tag; anything other than `c`, `g` or `t` is invalid.
    #[inline]
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"c" => Some(MetricKind::Counter),
            b"g" => Some(MetricKind::Gauge),
            b"t" => Some(MetricKind::Timer),
            _ => None,
        }
    }

    /// Wire tag for this kind
    pub fn tag(&self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::Timer => "t",
        }
    }
}

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    #[inline]
    pub fn increment(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-write-wins gauge
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    #[inline]
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Timer aggregate. `min` and `max` start at the numeric extremes so the
/// first observation always replaces both.
#[derive(Debug)]
pub struct Timer {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(u64::MIN),
        }
    }
}

impl Timer {
    #[inline]
    pub fn record(&self, value: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.update_min(value);
        self.update_max(value);
    }

    fn update_min(&self, value: u64) {
        let mut current = self.min.load(Ordering::Relaxed);
        while value < current {
            match self.min.compare_exchange_weak(
                current,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn update_max(&self, value: u64) {
        let mut current = self.max.load(Ordering::Relaxed);
        while value > current {
            match self.max.compare_exchange_weak(
                current,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum: self.sum.load(Ordering::Relaxed),
            min: self.min.load(Ordering::Relaxed),
            max: self.max.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

/// A stored metric. The variant is fixed when the value is created.
#[derive(Debug)]
pub enum MetricValue {
    Counter(Counter),
    Gauge(Gauge),
    Timer(Timer),
}

impl MetricValue {
    /// Create an empty accumulator of the given kind
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricValue::Counter(Counter::default()),
            MetricKind::Gauge => MetricValue::Gauge(Gauge::default()),
            MetricKind::Timer => MetricValue::Timer(Timer::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Timer(_) => MetricKind::Timer,
        }
    }

    /// Apply one observation: counters add, gauges replace, timers record.
    #[inline]
    pub fn apply(&self, delta: u64) {
        match self {
            MetricValue::Counter(counter) => counter.increment(delta),
            MetricValue::Gauge(gauge) => gauge.set(delta),
            MetricValue::Timer(timer) => timer.record(delta),
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            MetricValue::Counter(counter) => MetricSnapshot::Counter(counter.get()),
            MetricValue::Gauge(gauge) => MetricSnapshot::Gauge(gauge.get()),
            MetricValue::Timer(timer) => MetricSnapshot::Timer(timer.snapshot()),
        }
    }
}

/// Point-in-time copy of any metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSnapshot {
    Counter(u64),
    Gauge(u64),
    Timer(TimerSnapshot),
}

/// Read-only handle to a stored metric.
///
/// The handle keeps the value alive even if its bucket is cleared by a
/// rotation; it then simply stops receiving updates.
#[derive(Debug, Clone)]
pub struct MetricHandle(Arc<MetricValue>);

impl MetricHandle {
    pub(crate) fn new(value: Arc<MetricValue>) -> Self {
        Self(value)
    }

    pub fn kind(&self) -> MetricKind {
        self.0.kind()
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.0.snapshot()
    }

    /// Counter value, or `None` if this is not a counter
    pub fn counter(&self) -> Option<u64> {
        match &*self.0 {
            MetricValue::Counter(counter) => Some(counter.get()),
            _ => None,
        }
    }

    /// Gauge value, or `None` if this is not a gauge
    pub fn gauge(&self) -> Option<u64> {
        match &*self.0 {
            MetricValue::Gauge(gauge) => Some(gauge.get()),
            _ => None,
        }
    }

    /// Timer aggregate, or `None` if this is not a timer
    pub fn timer(&self) -> Option<TimerSnapshot> {
        match &*self.0 {
            MetricValue::Timer(timer) => Some(timer.snapshot()),
            _ => None,
        }
    }
}
