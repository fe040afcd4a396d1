//! Generator error types.

use rigger_config::ConfigError;
use rigger_pluggable::PluggableError;
use thiserror::Error;

/// Errors raised by the project generator.
#[derive(Debug, Error)]
pub enum CreateError {
    /// Plugin resolution, registration or a hook failed.
    #[error(transparent)]
    Pluggable(#[from] PluggableError),

    /// The user configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generator data could not be encoded or decoded.
    #[error("invalid generator data: {0}")]
    Json(#[from] serde_json::Error),

    /// A question has no answer and cannot be asked.
    #[error("no answer for {0}")]
    MissingAnswer(String),

    /// An answer does not fit its question.
    #[error("invalid answer for {name}: {reason}")]
    InvalidAnswer { name: String, reason: String },

    /// Reading from or writing to the terminal failed.
    #[error("prompt failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for generator operations.
pub type CreateResult<T> = Result<T, CreateError>;
