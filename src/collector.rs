//! Wires the bucket ring, worker pool and network thread together.

use crate::aggregation::BucketRing;
use crate::core::{CollectorError, Config, Result};
use crate::ingestion::{
    spsc, DatagramSource, DefaultSource, IngestStats, ServerHandle, UdpServer, Worker,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

/// A running (or runnable) collector.
///
/// Owns one network thread and `ingestion.workers` worker threads, all
/// sharing one [`BucketRing`]. Readers and the rotation driver reach the
/// ring through [`Collector::ring`].
pub struct Collector<S> {
    config: Config,
    ring: Arc<BucketRing>,
    stats: Arc<IngestStats>,
    workers: Vec<Worker>,
    server: Option<UdpServer<S>>,
    server_handle: ServerHandle,
    network: Option<JoinHandle<UdpServer<S>>>,
    shut_down: bool,
}

impl Collector<DefaultSource> {
    /// Build a collector listening on `config.listen_addr()`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = DefaultSource::bind(config.listen_addr())?;
        Self::with_source(config, source)
    }
}

impl<S: DatagramSource + 'static> Collector<S> {
    /// Build a collector reading from any datagram source
    pub fn with_source(config: Config, source: S) -> Result<Self> {
        config.validate()?;

        let ring = Arc::new(BucketRing::new(
            config.aggregation.ring_size,
            config.aggregation.shards_per_bucket,
        )?);
        let stats = Arc::new(IngestStats::new());

        let mut producers = Vec::with_capacity(config.ingestion.workers);
        let mut workers = Vec::with_capacity(config.ingestion.workers);
        for id in 0..config.ingestion.workers {
            let (producer, consumer) = spsc::channel(config.ingestion.queue_capacity);
            producers.push(producer);
            workers.push(Worker::new(id, consumer, Arc::clone(&ring), Arc::clone(&stats)));
        }

        let server = UdpServer::new(
            source,
            producers,
            Arc::clone(&stats),
            config.server.wait_timeout,
        )?;
        let server_handle = server.handle();

        Ok(Self {
            config,
            ring,
            stats,
            workers,
            server: Some(server),
            server_handle,
            network: None,
            shut_down: false,
        })
    }

    /// Start the workers, then the network thread. No-op while running.
    pub fn start(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(CollectorError::config("collector has been shut down"));
        }
        if self.network.is_some() {
            return Ok(());
        }
        // a failed spawn drops the server along with the thread closure
        let Some(mut server) = self.server.take() else {
            return Err(CollectorError::Thread("network thread lost its server".to_string()));
        };

        for worker in &mut self.workers {
            if let Err(e) = worker.start() {
                self.server = Some(server);
                return Err(e);
            }
        }

        let network = thread::Builder::new()
            .name("udp-server".to_string())
            .spawn(move || {
                server.run();
                server
            })
            .map_err(|e| CollectorError::Thread(format!("failed to spawn network thread: {}", e)))?;
        self.network = Some(network);

        tracing::info!(
            workers = self.workers.len(),
            ring_size = self.ring.ring_size(),
            "Collector started"
        );
        Ok(())
    }

    /// Stop the server, join the network thread, then stop the workers so
    /// every queued packet is applied. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.server_handle.stop();
        if let Some(network) = self.network.take() {
            match network.join() {
                Ok(server) => self.server = Some(server),
                Err(_) => tracing::error!("Network thread panicked"),
            }
        }

        for worker in &mut self.workers {
            worker.stop();
        }

        tracing::info!(stats = ?self.stats.snapshot(), "Collector stopped");
    }

    pub fn ring(&self) -> &Arc<BucketRing> {
        &self.ring
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.network.is_some()
    }

    /// Rotate the ring every `aggregation.rotation_interval` until the task
    /// is aborted. The first rotation happens one interval after the call.
    pub fn spawn_rotation(&self) -> tokio::task::JoinHandle<()> {
        let ring = Arc::clone(&self.ring);
        let period = self.config.aggregation.rotation_interval;

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                ring.rotate();
                tracing::debug!(current = ring.current_index(), "Rotated bucket ring");
            }
        })
    }

    /// Log an ingestion snapshot every `logging.stats_interval`
    pub fn spawn_stats_reporter(&self) -> tokio::task::JoinHandle<()> {
        let stats = Arc::clone(&self.stats);
        let ring = Arc::clone(&self.ring);
        let period = self.config.logging.stats_interval;

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let snapshot = stats.snapshot();
                tracing::info!(
                    received = snapshot.datagrams_received,
                    evicted = snapshot.packets_evicted,
                    applied = snapshot.lines_applied,
                    rejected = snapshot.lines_rejected,
                    conflicts = snapshot.type_conflicts,
                    receive_errors = snapshot.receive_errors,
                    window_keys = ring.current_len(),
                    "Ingestion stats"
                );
            }
        })
    }
}

impl<S> Drop for Collector<S> {
    fn drop(&mut self) {
        // Workers stop themselves on drop; the network thread does not.
        self.server_handle.stop();
        if let Some(network) = self.network.take() {
            let _ = network.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::MetricKind;
    use crate::core::ConfigBuilder;
    use crate::ingestion::memory_source;
    use std::time::Duration;

    fn config() -> Config {
        ConfigBuilder::new()
            .workers(2)
            .queue_capacity(1024)
            .ring_size(3)
            .shards_per_bucket(4)
            .wait_timeout(Duration::from_millis(5))
            .rotation_interval(Duration::from_millis(20))
            .build()
            .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (_sender, source) = memory_source();
        let mut config = config();
        config.ingestion.workers = 0;
        assert!(Collector::with_source(config, source).is_err());
    }

    #[test]
    fn test_shutdown_applies_queued_packets() {
        let (sender, source) = memory_source();
        let mut collector = Collector::with_source(config(), source).unwrap();
        collector.start().unwrap();
        assert!(collector.is_running());

        for _ in 0..50 {
            sender.send(&b"hits:1|c\nlat:7|t"[..]);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while collector.stats().snapshot().datagrams_received < 50
            && std::time::Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(1));
        }
        collector.shutdown();
        assert!(!collector.is_running());

        let ring = collector.ring();
        assert_eq!(ring.get_metric(MetricKind::Counter, b"hits").unwrap().counter(), Some(50));
        assert_eq!(ring.get_metric(MetricKind::Timer, b"lat").unwrap().timer().unwrap().sum, 350);
    }

    #[test]
    fn test_start_after_shutdown_fails() {
        let (_sender, source) = memory_source();
        let mut collector = Collector::with_source(config(), source).unwrap();
        collector.start().unwrap();
        collector.start().unwrap();
        collector.shutdown();
        collector.shutdown();
        assert!(collector.start().is_err());
    }

    #[test]
    fn test_start_without_server_fails() {
        let (_sender, source) = memory_source();
        let mut collector = Collector::with_source(config(), source).unwrap();
        collector.server = None;

        let err = collector.start().unwrap_err();
        assert_eq!(err.category(), "thread");
        assert!(!collector.is_running());
    }

    #[tokio::test]
    async fn test_rotation_driver_advances_ring() {
        let (_sender, source) = memory_source();
        let collector = Collector::with_source(config(), source).unwrap();
        collector.ring().increment(b"old", 1);

        let rotation = collector.spawn_rotation();
        tokio::time::sleep(Duration::from_millis(150)).await;
        rotation.abort();

        // three rotations clear every window of a three-slot ring
        assert!(collector.ring().get_metric(MetricKind::Counter, b"old").is_none());
    }
}
