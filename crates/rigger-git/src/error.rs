//! Git error types.

use std::path::PathBuf;

use thiserror::Error;

/// Git-related errors.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a git repository.
    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    /// Tag not found.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// HEAD does not point to a branch.
    #[error("HEAD is detached")]
    DetachedHead,

    /// The repository has no working directory.
    #[error("repository is bare")]
    Bare,

    /// Any other libgit2 failure.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_repo_display() {
        let err = GitError::NotARepo(PathBuf::from("/tmp/not-git"));
        assert_eq!(err.to_string(), "not a git repository: /tmp/not-git");
    }

    #[test]
    fn test_tag_not_found_display() {
        let err = GitError::TagNotFound("v1.0.0".to_string());
        assert_eq!(err.to_string(), "tag not found: v1.0.0");
    }

    #[test]
    fn test_detached_head_display() {
        assert_eq!(GitError::DetachedHead.to_string(), "HEAD is detached");
    }

    #[test]
    fn test_git2_errors_convert() {
        let err: GitError = git2::Error::from_str("object not found").into();
        assert!(matches!(err, GitError::Git2(_)));
        assert_eq!(err.to_string(), "git error: object not found");
        assert_eq!(GitError::Bare.to_string(), "repository is bare");
    }
}
