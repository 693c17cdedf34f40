//! Command-line interface for the metric collector.
//!
//! Run `metric-collector` to listen on UDP port 8125 with sensible defaults.

use crate::collector::Collector;
use crate::core::{CollectorError, Config, ConfigBuilder, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// StatsD-style UDP metric collector
#[derive(Parser, Debug)]
#[command(name = "metric-collector")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/metric-collector/config.yaml)
    #[arg(short, long, env = "METRIC_COLLECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// IPv4 address to bind
    #[arg(long, env = "METRIC_COLLECTOR_BIND")]
    pub bind: Option<Ipv4Addr>,

    /// UDP port to listen on
    #[arg(short, long, env = "METRIC_COLLECTOR_PORT")]
    pub port: Option<u16>,

    /// Number of worker threads
    #[arg(short, long, env = "METRIC_COLLECTOR_WORKERS")]
    pub workers: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, env = "METRIC_COLLECTOR_DEBUG")]
    pub debug: bool,

    /// Log with thread ids, targets and line numbers
    #[arg(long, env = "METRIC_COLLECTOR_STRUCTURED")]
    pub structured: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with precedence CLI/env > config file > defaults.
    ///
    /// A missing file at the default location is fine; a missing file that
    /// was asked for explicitly is an error.
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let path = self.config.clone().unwrap_or_else(Config::default_path);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => builder = builder.from_yaml(&content)?,
            Err(e) if self.config.is_some() => {
                return Err(CollectorError::config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                )));
            },
            // Default config file doesn't exist, that's OK
            Err(_) => {},
        }

        self.apply_overrides(builder).build()
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(bind) = self.bind {
            builder = builder.bind_address(bind);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        if self.structured {
            builder = builder.structured(true);
        }
        builder.debug(self.debug)
    }

    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` wins, then `--debug`, then `METRIC_COLLECTOR_LOG_LEVEL`,
    /// then `logging.level` from the configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_level = std::env::var("METRIC_COLLECTOR_LOG_LEVEL").ok();
        let level = if config.debug {
            "debug"
        } else {
            env_level.as_deref().unwrap_or(config.logging.level.as_str())
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(false)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CollectorError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Run the collector until ctrl-c.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config)?;
    tracing::debug!(path = ?cli.config, config = ?config, "Configuration loaded");

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Listen address: {}", config.listen_addr());
        println!("  Workers: {}", config.ingestion.workers);
        println!("  Queue capacity: {}", config.ingestion.queue_capacity);
        println!(
            "  Ring: {} windows x {} shards, rotating every {:?}",
            config.aggregation.ring_size,
            config.aggregation.shards_per_bucket,
            config.aggregation.rotation_interval
        );
        return Ok(());
    }

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let mut collector = Collector::new(config)?;
    collector.start()?;

    let rotation = collector.spawn_rotation();
    let reporter = collector.spawn_stats_reporter();

    tracing::info!(addr = %collector.config().listen_addr(), "Metric collector listening");

    let signal = tokio::signal::ctrl_c().await;
    rotation.abort();
    reporter.abort();

    // Joining threads blocks; keep it off the async workers.
    tokio::task::spawn_blocking(move || collector.shutdown())
        .await
        .map_err(|e| CollectorError::Thread(format!("shutdown task failed: {}", e)))?;

    match signal {
        Ok(()) => {
            tracing::info!("Received shutdown signal, stopped");
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}
