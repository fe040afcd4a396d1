//! Release error types.

use rigger_config::ConfigError;
use rigger_pluggable::PluggableError;
use thiserror::Error;

/// Errors raised by the release pipeline.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Plugin resolution, registration or a hook failed.
    #[error(transparent)]
    Pluggable(#[from] PluggableError),

    /// The user configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A version string is not valid semver.
    #[error("invalid version {version}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    /// An increment name is not recognized.
    #[error("unknown increment: {0}")]
    UnknownIncrement(String),

    /// Release data could not be encoded or decoded.
    #[error("invalid release data: {0}")]
    Json(#[from] serde_json::Error),

    /// The computed version is not newer than the current one.
    #[error("next version {next} is not greater than {current}")]
    NotIncreasing { current: String, next: String },
}

/// Result type for release operations.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReleaseError::UnknownIncrement("huge".to_string());
        assert_eq!(err.to_string(), "unknown increment: huge");

        let err = ReleaseError::NotIncreasing {
            current: "1.2.0".to_string(),
            next: "1.1.0".to_string(),
        };
        assert_eq!(err.to_string(), "next version 1.1.0 is not greater than 1.2.0");
    }

    #[test]
    fn test_invalid_version_display() {
        let source = semver::Version::parse("one.two").unwrap_err();
        let err = ReleaseError::InvalidVersion {
            version: "one.two".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid version one.two: "));
    }

    #[test]
    fn test_pluggable_is_transparent() {
        let err: ReleaseError = PluggableError::NotFound("rigger-plugin-x".to_string()).into();
        assert_eq!(err.to_string(), "plugin not found: rigger-plugin-x");
    }
}
