//! Worker threads: drain one queue, parse packets, update the bucket ring.

use crate::aggregation::{BucketRing, MetricKind};
use crate::core::{CollectorError, Result};
use crate::ingestion::parser;
use crate::ingestion::spsc::Consumer;
use crate::ingestion::stats::IngestStats;
use crate::ingestion::Packet;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Idle iterations spent spinning before yielding
pub const SPIN_ITERATIONS: usize = 256;
/// Idle iterations spent yielding before sleeping
pub const YIELD_ITERATIONS: usize = 256;
/// Sleep once spinning and yielding did not find work
pub const IDLE_SLEEP: Duration = Duration::from_micros(10);

/// Graduated idle strategy: spin, then yield, then sleep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backoff {
    idle: usize,
}

/// What one [`Backoff::snooze`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStep {
    Spin,
    Yield,
    Sleep,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work was found; start over with spinning.
    #[inline]
    pub fn reset(&mut self) {
        self.idle = 0;
    }

    /// Next step for the current idle count, without waiting
    pub fn next_step(&self) -> BackoffStep {
        let idle = self.idle + 1;
        if idle <= SPIN_ITERATIONS {
            BackoffStep::Spin
        } else if idle <= SPIN_ITERATIONS + YIELD_ITERATIONS {
            BackoffStep::Yield
        } else {
            BackoffStep::Sleep
        }
    }

    /// Wait one idle iteration
    pub fn snooze(&mut self) -> BackoffStep {
        let step = self.next_step();
        self.idle = self.idle.saturating_add(1);

        match step {
            BackoffStep::Spin => spin_loop(),
            BackoffStep::Yield => thread::yield_now(),
            BackoffStep::Sleep => thread::sleep(IDLE_SLEEP),
        }
        step
    }
}

/// Parse one packet and apply every valid line to the ring.
///
/// Unknown kind tags and negative values reject the line; a kind conflict
/// with an existing key is ignored.
pub fn process_packet(ring: &BucketRing, stats: &IngestStats, packet: &[u8]) {
    let rejected = parser::parse_packet(packet, |name, kind_text, value| {
        let Some(kind) = MetricKind::from_tag(kind_text) else {
            stats.record_rejected(1);
            return;
        };
        let Ok(delta) = u64::try_from(value) else {
            stats.record_rejected(1);
            return;
        };

        if ring.store(kind, name, delta) {
            stats.record_applied();
        } else {
            stats.record_conflict();
        }
    });

    stats.record_rejected(rejected as u64);
    stats.record_processed();
}

/// One consumer thread bound to one queue
pub struct Worker {
    id: usize,
    ring: Arc<BucketRing>,
    stats: Arc<IngestStats>,
    running: Arc<AtomicBool>,
    consumer: Option<Consumer<Packet>>,
    thread: Option<JoinHandle<Consumer<Packet>>>,
}

impl Worker {
    pub fn new(
        id: usize,
        consumer: Consumer<Packet>,
        ring: Arc<BucketRing>,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            id,
            ring,
            stats,
            running: Arc::new(AtomicBool::new(false)),
            consumer: Some(consumer),
            thread: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Launch the run loop on a dedicated thread. No-op if already started.
    ///
    /// Fails once the queue is gone, which happens when a previous thread
    /// panicked or could not be spawned.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        let Some(mut consumer) = self.consumer.take() else {
            return Err(CollectorError::Thread(format!("worker {} lost its queue", self.id)));
        };

        self.running.store(true, Ordering::Release);

        let id = self.id;
        let ring = Arc::clone(&self.ring);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || {
                tracing::debug!(worker = id, "Worker started");
                run(&mut consumer, &ring, &stats, &running);

                let drained = drain(&mut consumer, &ring, &stats);
                tracing::debug!(worker = id, drained, "Worker stopped");
                consumer
            });

        match handle {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            },
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(CollectorError::Thread(format!("failed to spawn worker {}: {}", id, e)))
            },
        }
    }

    /// Stop the run loop and join the thread. Items still queued are
    /// processed once before the thread exits. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(consumer) => self.consumer = Some(consumer),
                Err(_) => tracing::error!(worker = self.id, "Worker thread panicked"),
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    consumer: &mut Consumer<Packet>,
    ring: &BucketRing,
    stats: &IngestStats,
    running: &AtomicBool,
) {
    let mut backoff = Backoff::new();

    while running.load(Ordering::Acquire) {
        match consumer.pop() {
            Some(packet) => {
                process_packet(ring, stats, &packet);
                backoff.reset();
            },
            None => {
                backoff.snooze();
            },
        }
    }
}

fn drain(consumer: &mut Consumer<Packet>, ring: &BucketRing, stats: &IngestStats) -> usize {
    let mut drained = 0;
    while let Some(packet) = consumer.pop() {
        process_packet(ring, stats, &packet);
        drained += 1;
    }
    drained
}
