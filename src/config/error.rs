//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating the scanner configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A value is present but unusable (e.g., `queue.concurrency: 0`).
    #[error("validation failed: {0}")]
    Validation(String),
}
