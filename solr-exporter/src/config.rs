//! Configuration for the Solr exporter.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

use solr_exporter_common::config::{ConfigFormat, LoggingConfig, load_config, parse_config_as};

use crate::mapping::MetricType;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<solr_exporter_common::Error> for ConfigError {
    fn from(e: solr_exporter_common::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Scrape cycle settings.
    #[serde(default)]
    pub scrape: ScrapeSettings,

    /// Metric extraction jobs, in output order.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind on (default: "0.0.0.0"). The port comes from the CLI.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
        }
    }
}

/// Timeouts applied during a scrape cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSettings {
    /// Time budget for one job, all of its requests included (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Time budget for SolrCloud live node discovery (seconds).
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_discovery_timeout() -> u64 {
    10
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
        }
    }
}

/// Which Solr nodes a job is sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobScope {
    /// Every live node (the single node in standalone mode).
    #[default]
    Node,
    /// One node answering for the whole cluster.
    Cluster,
}

/// Deployment modes a job runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Any,
    /// SolrCloud only, such as Collections API jobs.
    Cloud,
    Standalone,
}

impl JobMode {
    pub fn runs_in(self, cloud: bool) -> bool {
        match self {
            JobMode::Any => true,
            JobMode::Cloud => cloud,
            JobMode::Standalone => !cloud,
        }
    }
}

/// A metric extraction job as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Job name, also the default metric family name.
    pub name: String,

    /// HELP text for the produced families.
    #[serde(default)]
    pub help: String,

    /// Metric type of every produced family.
    #[serde(rename = "type")]
    pub metric_type: MetricType,

    /// Request path relative to a node base URL; may contain `{core}` or
    /// `{collection}`.
    pub endpoint: String,

    /// Nodes the job is sent to.
    #[serde(default)]
    pub scope: JobScope,

    /// Deployment modes the job runs in; skipped elsewhere.
    #[serde(default)]
    pub mode: JobMode,

    /// Label names shared by all samples of the job.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Extraction rules applied to every response.
    pub rules: Vec<RuleConfig>,
}

/// One extraction rule as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Keys from the response root to the value; `*` walks every entry.
    pub path: Vec<String>,

    /// Metric family name (defaults to the job name).
    #[serde(default)]
    pub metric: Option<String>,

    /// Series suffix for histogram families (`_bucket`, `_sum`, `_count`).
    #[serde(default)]
    pub suffix: Option<String>,

    /// One entry per job label: `$N` capture, `{core}`, `{collection}`,
    /// `{base_url}` or a literal.
    #[serde(default)]
    pub label_values: Vec<String>,

    /// When set, the sample is 1 if the value equals this text, 0 otherwise.
    #[serde(default)]
    pub equals: Option<String>,
}

impl ExporterConfig {
    /// Load configuration from a YAML or JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::parse_as(content, ConfigFormat::Json5)
    }

    /// Parse configuration from a string in the given syntax.
    pub fn parse_as(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: ExporterConfig = parse_config_as(content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Job definitions are checked when the registry is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scrape.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        if self.scrape.discovery_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "discovery_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.server.bind.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid bind address: {}",
                self.server.bind
            )));
        }

        // Validate path starts with /
        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.server.path == "/health" {
            return Err(ConfigError::Validation(
                "Metrics path must not be /health".to_string(),
            ));
        }

        Ok(())
    }
}
