//! Cache error types.

use std::path::PathBuf;

use thiserror::Error;

/// Cache-related errors.
///
/// These never escape lookups: the cache logs them and treats the operation
/// as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No cache directory could be determined.
    #[error("no cache directory available")]
    NoDirectory,

    /// The cache directory could not be prepared.
    #[error("cannot use cache directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry could not be encoded or decoded.
    #[error("invalid cache entry: {0}")]
    Entry(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_display() {
        let err = CacheError::Directory {
            path: PathBuf::from("/readonly/cache"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot use cache directory /readonly/cache: denied");
    }

    #[test]
    fn test_no_directory_display() {
        assert_eq!(CacheError::NoDirectory.to_string(), "no cache directory available");
    }
}
