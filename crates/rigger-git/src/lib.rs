//! Git abstraction layer for Rigger.
//!
//! This crate provides the Git operations the built-in plugins need:
//! - Repository discovery and status
//! - Commit listing and creation
//! - Tag management

mod error;
mod repository;

pub use error::{GitError, GitResult};
pub use repository::{Commit, Repository};
