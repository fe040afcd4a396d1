//! Error types for the files plugin.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while copying, writing or rendering files.
#[derive(Debug, Error)]
pub enum FilesError {
    /// A source file or directory does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Reading or writing a path failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The generated project would overwrite existing files.
    #[error("target directory is not empty: {}", .0.display())]
    TargetNotEmpty(PathBuf),

    /// A template placeholder is malformed.
    #[error("invalid template {name}: {reason}")]
    Template { name: String, reason: String },

    /// Walking a template tree failed, e.g. on a symlink loop.
    #[error("failed to walk template tree: {0}")]
    Walk(#[from] ignore::Error),

    /// Method arguments could not be decoded.
    #[error("invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),
}

impl FilesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for file operations.
pub type FilesResult<T> = Result<T, FilesError>;
