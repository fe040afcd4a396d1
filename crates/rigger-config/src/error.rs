//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid TOML syntax.
    #[error("invalid TOML in {path}: {source}")]
    InvalidToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Unknown configuration mode.
    #[error("unknown configuration mode {0:?} (expected dev, prod or test)")]
    InvalidMode(String),

    /// A value does not have the expected shape.
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
