//! Ingestion path: socket to queues to workers.
//!
//! One network thread drains a [`DatagramSource`] and hands each datagram
//! round-robin to a per-worker drop-oldest queue. Each worker parses its
//! packets and applies the lines to the shared bucket ring.

#[cfg(target_os = "linux")]
pub mod epoll;
pub mod parser;
pub mod server;
pub mod source;
pub mod spsc;
pub mod stats;
pub mod worker;

/// One received datagram
pub type Packet = bytes::Bytes;

/// Socket-backed source used by [`crate::Collector::new`]
#[cfg(target_os = "linux")]
pub type DefaultSource = EpollSource;
#[cfg(not(target_os = "linux"))]
pub type DefaultSource = UdpSource;

#[cfg(target_os = "linux")]
pub use epoll::EpollSource;
pub use parser::{parse_line, parse_metric, parse_packet, ParsedLine};
pub use server::{ServerHandle, UdpServer};
pub use source::{
    memory_source, DatagramSource, MemorySender, MemorySource, UdpSource, BATCH_SIZE, MAX_PACKET,
};
pub use spsc::{Consumer, Producer, SpscQueue};
pub use stats::{IngestSnapshot, IngestStats};
pub use worker::{process_packet, Backoff, BackoffStep, Worker};
