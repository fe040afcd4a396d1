//! File-backed cache for Rigger.
//!
//! Entries are JSON files named after the SHA-256 of their key. The cache
//! initializes lazily on first use and disables itself if initialization
//! fails, degrading every lookup to a miss.

mod cache;
mod entry;
mod error;

pub use cache::{Cache, CacheOptions, CacheStats, KeyFn, Validator, default_cache_dir};
pub use entry::{Fingerprint, hash_key};
pub use error::{CacheError, CacheResult};
