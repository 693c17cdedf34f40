//! Configuration system tests.

use clap::Parser;
use metric_collector::cli::Cli;
use metric_collector::core::{CollectorError, Config, ConfigBuilder, LogLevel};
use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

fn cli_with_config(path: &std::path::Path, extra: &[&str]) -> Cli {
    let mut args = vec!["metric-collector", "--config", path.to_str().unwrap()];
    args.extend_from_slice(extra);
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.bind_address, Ipv4Addr::UNSPECIFIED);
    assert_eq!(config.server.port, 8125);
    assert_eq!(config.server.wait_timeout, Duration::from_millis(100));
    assert_eq!(config.aggregation.ring_size, 10);
    assert_eq!(config.aggregation.shards_per_bucket, 16);
    assert_eq!(config.ingestion.workers, 2);
    assert_eq!(config.ingestion.queue_capacity, 8192);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_config_validation() {
    assert!(ConfigBuilder::new().port(0).build().is_err());
    assert!(ConfigBuilder::new().ring_size(0).build().is_err());
    assert!(ConfigBuilder::new().shards_per_bucket(12).build().is_err());
    assert!(ConfigBuilder::new().queue_capacity(0).build().is_err());
    assert!(ConfigBuilder::new().wait_timeout(Duration::ZERO).build().is_err());
    assert!(ConfigBuilder::new().rotation_interval(Duration::ZERO).build().is_err());

    // one window is a legal, if short-lived, ring
    assert!(ConfigBuilder::new().ring_size(1).build().is_ok());
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
server:
  port: 18125
  wait_timeout: 250ms
aggregation:
  ring_size: 4
  shards_per_bucket: 8
  rotation_interval: 30s
ingestion:
  workers: 6
  queue_capacity: 256
logging:
  level: warn
  structured: true
  stats_interval: 1m
"#
    )
    .unwrap();

    let config = cli_with_config(file.path(), &[]).load_config().await.unwrap();

    assert_eq!(config.server.port, 18125);
    assert_eq!(config.server.wait_timeout, Duration::from_millis(250));
    assert_eq!(config.aggregation.ring_size, 4);
    assert_eq!(config.aggregation.shards_per_bucket, 8);
    assert_eq!(config.aggregation.rotation_interval, Duration::from_secs(30));
    assert_eq!(config.ingestion.workers, 6);
    assert_eq!(config.ingestion.queue_capacity, 256);
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(config.logging.structured);
    assert_eq!(config.logging.stats_interval, Duration::from_secs(60));
}

#[tokio::test]
async fn test_cli_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  port: 18125\ningestion:\n  workers: 6").unwrap();

    let config = cli_with_config(file.path(), &["--port", "28125", "--debug"])
        .load_config()
        .await
        .unwrap();

    assert_eq!(config.server.port, 28125);
    assert_eq!(config.ingestion.workers, 6);
    assert!(config.debug);
}

#[tokio::test]
async fn test_invalid_file_values_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "aggregation:\n  shards_per_bucket: 10").unwrap();

    let err = cli_with_config(file.path(), &[]).load_config().await.unwrap_err();
    assert!(matches!(err, CollectorError::Config(_)));
}

#[tokio::test]
async fn test_malformed_file_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  port: not-a-port").unwrap();

    let err = cli_with_config(file.path(), &[]).load_config().await.unwrap_err();
    assert_eq!(err.category(), "parse");
}
