//! Configuration management for the collector.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by `cli`)
//! - Validation and defaults

use crate::core::{CollectorError, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for the collector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP listener configuration
    pub server: ServerConfig,
    /// Bucket ring shape and rotation
    pub aggregation: AggregationConfig,
    /// Worker pool configuration
    pub ingestion: IngestionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// UDP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IPv4 address to bind
    pub bind_address: Ipv4Addr,
    /// UDP port to bind
    pub port: u16,
    /// Upper bound on one readiness wait, and so on shutdown latency
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
}

/// Bucket ring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Number of time windows in the ring
    pub ring_size: usize,
    /// Shards per bucket, must be a power of two
    pub shards_per_bucket: usize,
    /// How often the current window is rotated
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Capacity of each worker queue, must be a power of two
    pub queue_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
    /// Interval between ingestion summaries
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: Ipv4Addr::UNSPECIFIED,
            port: 8125,
            wait_timeout: Duration::from_millis(100),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            ring_size: 10,
            shards_per_bucket: 16,
            rotation_interval: Duration::from_secs(10),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        IngestionConfig {
            workers: 2,
            queue_capacity: 8192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
            stats_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(CollectorError::config("port must be greater than 0"));
        }

        if self.server.wait_timeout.is_zero() {
            return Err(CollectorError::config("wait_timeout must be greater than 0"));
        }

        if self.aggregation.ring_size == 0 {
            return Err(CollectorError::config("ring_size must be greater than 0"));
        }

        if !self.aggregation.shards_per_bucket.is_power_of_two() {
            return Err(CollectorError::config(format!(
                "shards_per_bucket must be a power of two, got {}",
                self.aggregation.shards_per_bucket
            )));
        }

        if self.aggregation.rotation_interval.is_zero() {
            return Err(CollectorError::config("rotation_interval must be greater than 0"));
        }

        if self.ingestion.workers == 0 {
            return Err(CollectorError::config("workers must be greater than 0"));
        }

        if !self.ingestion.queue_capacity.is_power_of_two() {
            return Err(CollectorError::config(format!(
                "queue_capacity must be a power of two, got {}",
                self.ingestion.queue_capacity
            )));
        }

        if self.logging.stats_interval.is_zero() {
            return Err(CollectorError::config("stats_interval must be greater than 0"));
        }

        Ok(())
    }

    /// Socket address the UDP listener binds
    pub fn listen_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.server.bind_address, self.server.port)
    }

    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("metric-collector").join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/metric-collector/config.yaml"))
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| CollectorError::parse(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set bind address
    pub fn bind_address(mut self, addr: Ipv4Addr) -> Self {
        self.config.server.bind_address = addr;
        self
    }

    /// Set UDP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set readiness wait timeout
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.wait_timeout = timeout;
        self
    }

    /// Set number of windows
    pub fn ring_size(mut self, size: usize) -> Self {
        self.config.aggregation.ring_size = size;
        self
    }

    /// Set shards per bucket
    pub fn shards_per_bucket(mut self, shards: usize) -> Self {
        self.config.aggregation.shards_per_bucket = shards;
        self
    }

    /// Set rotation interval
    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.config.aggregation.rotation_interval = interval;
        self
    }

    /// Set worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.ingestion.workers = workers;
        self
    }

    /// Set per-worker queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.ingestion.queue_capacity = capacity;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set structured (thread ids, targets, line numbers) log output
    pub fn structured(mut self, structured: bool) -> Self {
        self.config.logging.structured = structured;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
