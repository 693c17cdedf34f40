//! metric-collector - StatsD-style UDP metric aggregation.
//!
//! Clients send newline-delimited `name:value|kind` lines over UDP. One
//! network thread drains the socket in batches and spreads datagrams over
//! per-worker drop-oldest queues; worker threads parse the lines and fold
//! them into a ring of time windows that readers query by name.
//!
//! # Architecture
//!
//! - `aggregation`: metric values, sharded buckets and the window ring
//! - `ingestion`: wire parser, SPSC queues, workers and the UDP server
//! - `collector`: wiring and lifecycle of the threads above
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use metric_collector::aggregation::MetricKind;
//! use metric_collector::{Collector, Config};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut collector = Collector::new(Config::new()?)?;
//!     collector.start()?;
//!
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     if let Some(requests) = collector.ring().get_metric(MetricKind::Counter, b"requests") {
//!         println!("requests: {:?}", requests.counter());
//!     }
//!
//!     collector.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregation;
pub mod cli;
pub mod collector;
pub mod core;
pub mod ingestion;

// Re-export core types for convenience
pub use crate::collector::Collector;
pub use crate::core::{CollectorError, Config, Result};
