//! Configuration and error types shared by every collector component.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, LogLevel};
pub use error::{CollectorError, Result};
