//! Ingestion counters shared by the network thread and the workers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free ingestion counters. All updates are relaxed; the numbers are
/// for operators and tests, not for synchronization.
#[derive(Debug, Default)]
pub struct IngestStats {
    datagrams_received: AtomicU64,
    packets_evicted: AtomicU64,
    packets_processed: AtomicU64,
    lines_applied: AtomicU64,
    lines_rejected: AtomicU64,
    type_conflicts: AtomicU64,
    receive_errors: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    /// Datagrams read from the source
    pub datagrams_received: u64,
    /// Packets dropped because a worker queue was full
    pub packets_evicted: u64,
    /// Packets parsed by workers
    pub packets_processed: u64,
    /// Lines that updated a metric
    pub lines_applied: u64,
    /// Malformed lines, unknown kinds and negative values
    pub lines_rejected: u64,
    /// Lines ignored because the key holds another kind
    pub type_conflicts: u64,
    /// Unexpected receive or wait failures
    pub receive_errors: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_received(&self, count: u64) {
        self.datagrams_received.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evicted(&self) {
        self.packets_evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_processed(&self) {
        self.packets_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_applied(&self) {
        self.lines_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self, count: u64) {
        if count > 0 {
            self.lines_rejected.fetch_add(count, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_conflict(&self) {
        self.type_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            packets_evicted: self.packets_evicted.load(Ordering::Relaxed),
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            lines_applied: self.lines_applied.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
            type_conflicts: self.type_conflicts.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

impl IngestSnapshot {
    /// Packets accepted from the source but not yet processed or evicted
    pub fn in_flight(&self) -> u64 {
        self.datagrams_received
            .saturating_sub(self.packets_processed)
            .saturating_sub(self.packets_evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let stats = IngestStats::new();
        stats.record_received(5);
        stats.record_processed();
        stats.record_processed();
        stats.record_evicted();
        stats.record_applied();
        stats.record_rejected(0);
        stats.record_rejected(2);
        stats.record_conflict();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.datagrams_received, 5);
        assert_eq!(snapshot.packets_processed, 2);
        assert_eq!(snapshot.packets_evicted, 1);
        assert_eq!(snapshot.lines_applied, 1);
        assert_eq!(snapshot.lines_rejected, 2);
        assert_eq!(snapshot.type_conflicts, 1);
        assert_eq!(snapshot.in_flight(), 2);
    }
}
