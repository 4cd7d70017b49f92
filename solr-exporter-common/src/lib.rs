//! Solr Exporter Common Library
//!
//! This crate provides shared types and utilities for the Solr Prometheus exporter:
//!
//! - [`connection`] - Connection string resolution (`ConnectionTarget`)
//! - [`config`] - Configuration loading (YAML or JSON5) and logging settings
//! - [`error`] - Error types

pub mod config;
pub mod connection;
pub mod error;

// Re-export commonly used types at the crate root
pub use config::{
    ConfigFormat, LogFormat, LoggingConfig, load_config, parse_config, parse_config_as,
};
pub use connection::{ConnectionTarget, DEFAULT_CONNECTION, resolve, select_connection_string};
pub use error::{Error, Result};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use solr_exporter_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
