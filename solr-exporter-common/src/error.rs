use thiserror::Error;

/// Common error type for Solr exporter components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid connection string: '{0}'")]
    InvalidConnectionString(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias using the exporter's Error.
pub type Result<T> = std::result::Result<T, Error>;
