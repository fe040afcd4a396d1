//! On-disk entry format.

use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifies one version of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime_ms: u64,
    pub size: u64,
}

impl Fingerprint {
    /// Reads the fingerprint of `path`. `None` if the file is unreadable.
    pub async fn of(path: &Path) -> Option<Self> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        let elapsed = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
        let mtime_ms = u64::try_from(elapsed.as_millis()).ok()?;
        Some(Self {
            mtime_ms,
            size: metadata.len(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredEntry<T> {
    pub key: String,
    pub fingerprint: Option<Fingerprint>,
    pub created_at: DateTime<Utc>,
    pub data: T,
}

/// Returns the file name stem used for `key`: its SHA-256, hex encoded.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}
