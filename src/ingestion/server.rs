//! Network thread: wait for readiness, drain the source, spread packets
//! across worker queues.

use crate::core::{CollectorError, Result};
use crate::ingestion::source::DatagramSource;
use crate::ingestion::spsc::Producer;
use crate::ingestion::stats::IngestStats;
use crate::ingestion::Packet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stops a running [`UdpServer`] from another thread
#[derive(Clone, Debug)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Ask the loop to exit. It notices within one wait timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub struct UdpServer<S> {
    source: S,
    producers: Vec<Producer<Packet>>,
    next: usize,
    wait_timeout: Duration,
    stats: Arc<IngestStats>,
    running: Arc<AtomicBool>,
}

impl<S: DatagramSource> UdpServer<S> {
    /// Build a server feeding one queue per worker. The server is armed on
    /// construction; [`ServerHandle::stop`] before [`UdpServer::run`] makes
    /// `run` return immediately.
    pub fn new(
        source: S,
        producers: Vec<Producer<Packet>>,
        stats: Arc<IngestStats>,
        wait_timeout: Duration,
    ) -> Result<Self> {
        if producers.is_empty() {
            return Err(CollectorError::config("server needs at least one worker queue"));
        }

        Ok(Self {
            source,
            producers,
            next: 0,
            wait_timeout,
            stats,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Receive and dispatch until stopped. Receive failures are logged and
    /// counted; they never end the loop.
    pub fn run(&mut self) {
        tracing::info!(queues = self.producers.len(), "UDP server running");

        while self.running.load(Ordering::Acquire) {
            match self.source.wait_ready(self.wait_timeout) {
                Ok(true) => {},
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Waiting for datagrams failed");
                    self.stats.record_receive_error();
                    continue;
                },
            }

            if let Err(e) = self.drain() {
                tracing::warn!(error = %e, "Receiving datagrams failed");
                self.stats.record_receive_error();
            }
        }

        tracing::info!("UDP server stopped");
    }

    /// Read everything pending and dispatch it. Returns the datagram count.
    ///
    /// Datagrams are counted as they are dispatched, so a receive error
    /// part way through still accounts for what already reached a queue.
    pub fn drain(&mut self) -> std::io::Result<usize> {
        let Self {
            source,
            producers,
            next,
            stats,
            ..
        } = self;

        source.drain(|packet| {
            stats.record_received(1);
            if producers[*next].push(packet) {
                stats.record_evicted();
            }
            *next = (*next + 1) % producers.len();
        })
    }
}
