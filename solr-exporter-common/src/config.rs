use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Syntax of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json5,
}

impl ConfigFormat {
    /// Pick the syntax from a file extension. `.yml`/`.yaml` are YAML,
    /// everything else is read as JSON5.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json5,
        }
    }
}

/// Load a configuration file, choosing the syntax from its extension.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config_as(&content, ConfigFormat::from_path(path)).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    parse_config_as(content, ConfigFormat::Json5)
}

/// Load a configuration from a string in the given syntax.
pub fn parse_config_as<T: for<'de> Deserialize<'de>>(
    content: &str,
    format: ConfigFormat,
) -> Result<T> {
    match format {
        ConfigFormat::Json5 => json5::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e))),
        ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}
