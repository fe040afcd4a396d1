//! The cache itself.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::entry::StoredEntry;
use crate::{CacheError, CacheResult, Fingerprint, hash_key};

/// Default cache directory name, under the home directory.
const DEFAULT_DIR_NAME: &str = ".rigger-cache";

/// Derives the cache key of a source file.
pub type KeyFn = Arc<dyn Fn(&Path) -> String + Send + Sync>;

/// Decides whether a cached value is still usable.
pub type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

type InitFuture = Shared<BoxFuture<'static, Result<(), String>>>;

/// Returns `~/.rigger-cache`, if there is a home directory.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_DIR_NAME))
}

/// Cache settings.
#[derive(Clone, Default)]
pub struct CacheOptions {
    dir: Option<PathBuf>,
    ttl: Option<Duration>,
    max_files: Option<usize>,
    disabled: bool,
    key_fn: Option<KeyFn>,
}

impl CacheOptions {
    /// Creates the default options: home cache directory, no TTL, no cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores entries under `dir`.
    #[must_use]
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Expires entries older than `ttl`.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keeps at most `max_files` entries after [`Cache::cleanup`].
    #[must_use]
    pub fn max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }

    /// Turns every operation into a miss or a no-op.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Derives keys from file paths with `key_fn` instead of the path
    /// itself.
    #[must_use]
    pub fn key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Path) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }
}

impl std::fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .field("max_files", &self.max_files)
            .field("disabled", &self.disabled)
            .field("key_fn", &self.key_fn.is_some())
            .finish()
    }
}

/// Lookup statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when there were no lookups.
    pub hit_rate: f64,
    pub entries: usize,
    pub enabled: bool,
}

impl CacheStats {
    #[allow(clippy::cast_precision_loss)]
    fn new(hits: u64, misses: u64, entries: usize, enabled: bool) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            hits,
            misses,
            hit_rate,
            entries,
            enabled,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    last_access: DateTime<Utc>,
}

struct InitState {
    enabled: bool,
    initialized: bool,
    pending: Option<InitFuture>,
}

struct Inner {
    dir: Option<PathBuf>,
    state: Mutex<InitState>,
    /// Mirrors the entry files on disk, keyed by hashed key.
    index: Mutex<HashMap<String, IndexEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    init_attempts: AtomicUsize,
}

/// File-backed cache of `T` values.
///
/// Values are stored either against a source file, in which case they are
/// invalidated when the file's modification time or size changes, or
/// against a plain key.
pub struct Cache<T> {
    inner: Arc<Inner>,
    ttl: Option<Duration>,
    max_files: Option<usize>,
    key_fn: Option<KeyFn>,
    validator: Option<Validator<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Cache<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    /// Creates a cache. Nothing touches the disk until the first operation.
    pub fn new(options: CacheOptions) -> Self {
        let dir = options.dir.or_else(default_cache_dir);
        Self {
            inner: Arc::new(Inner {
                dir,
                state: Mutex::new(InitState {
                    enabled: !options.disabled,
                    initialized: false,
                    pending: None,
                }),
                index: Mutex::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                init_attempts: AtomicUsize::new(0),
            }),
            ttl: options.ttl,
            max_files: options.max_files,
            key_fn: options.key_fn,
            validator: None,
            _marker: PhantomData,
        }
    }

    /// Rejects cached values for which `validator` returns false.
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Returns the entry directory.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.inner.dir.as_deref()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().initialized
    }

    /// Returns true while an initialization is in flight.
    #[must_use]
    pub fn has_pending_init(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Returns how many times initialization started.
    #[must_use]
    pub fn init_attempts(&self) -> usize {
        self.inner.init_attempts.load(Ordering::SeqCst)
    }

    /// Initializes the cache once. Concurrent callers share the same
    /// in-flight initialization. Returns whether the cache is usable.
    async fn ensure_initialized(&self) -> bool {
        let pending = {
            let mut state = self.inner.state.lock();
            if !state.enabled {
                return false;
            }
            if state.initialized {
                return true;
            }
            state
                .pending
                .get_or_insert_with(|| initialize(self.inner.clone()).boxed().shared())
                .clone()
        };

        let result = pending.await;

        let mut state = self.inner.state.lock();
        state.pending = None;
        match result {
            Ok(()) => state.initialized = true,
            Err(reason) => {
                if state.enabled {
                    warn!(%reason, "cache initialization failed, caching disabled");
                }
                state.enabled = false;
            }
        }
        state.enabled && state.initialized
    }

    fn key_for(&self, file: &Path) -> String {
        match &self.key_fn {
            Some(key_fn) => key_fn(file),
            None => file.to_string_lossy().into_owned(),
        }
    }

    fn entry_path(&self, hash: &str) -> Option<PathBuf> {
        self.inner
            .dir
            .as_ref()
            .map(|dir| dir.join(format!("{hash}.json")))
    }

    /// Returns the value cached for `file` if the file is unchanged.
    pub async fn get(&self, file: &Path) -> Option<T> {
        if !self.ensure_initialized().await {
            return None;
        }
        let key = self.key_for(file);
        let current = Fingerprint::of(file).await;
        self.lookup(&key, Some(current)).await
    }

    /// Returns the value cached under `key`.
    pub async fn get_by_key(&self, key: &str) -> Option<T> {
        if !self.ensure_initialized().await {
            return None;
        }
        self.lookup(key, None).await
    }

    /// `fingerprint` is `Some` for file lookups, holding the file's current
    /// fingerprint (itself `None` if the file is gone).
    async fn lookup(&self, key: &str, fingerprint: Option<Option<Fingerprint>>) -> Option<T> {
        let hash = hash_key(key);
        let path = self.entry_path(&hash)?;

        let stored = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoredEntry<T>>(&bytes) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(%key, %err, "unreadable cache entry");
                    None
                }
            },
            Err(_) => None,
        };
        let existed = stored.is_some();

        match stored.filter(|entry| self.is_fresh(key, entry, fingerprint)) {
            Some(entry) => {
                self.inner.hits.fetch_add(1, Ordering::SeqCst);
                self.inner.index.lock().insert(
                    hash,
                    IndexEntry {
                        last_access: Utc::now(),
                    },
                );
                debug!(%key, "cache hit");
                Some(entry.data)
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::SeqCst);
                if existed {
                    self.remove(&hash).await;
                }
                debug!(%key, "cache miss");
                None
            }
        }
    }

    fn is_fresh(
        &self,
        key: &str,
        entry: &StoredEntry<T>,
        fingerprint: Option<Option<Fingerprint>>,
    ) -> bool {
        if entry.key != key {
            return false;
        }
        if let Some(current) = fingerprint
            && (current.is_none() || entry.fingerprint != current)
        {
            return false;
        }
        if self.is_expired(entry.created_at) {
            return false;
        }
        self.validator
            .as_ref()
            .is_none_or(|validator| validator(&entry.data))
    }

    fn is_expired(&self, created_at: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| {
            (Utc::now() - created_at)
                .to_std()
                .is_ok_and(|age| age > ttl)
        })
    }

    /// Caches `data` against the current version of `file`.
    ///
    /// Does nothing when the cache is disabled or `file` cannot be read.
    pub async fn set(&self, file: &Path, data: T) {
        if !self.ensure_initialized().await {
            return;
        }
        let Some(fingerprint) = Fingerprint::of(file).await else {
            debug!(file = %file.display(), "not caching unreadable file");
            return;
        };
        self.store(self.key_for(file), Some(fingerprint), data).await;
    }

    /// Caches `data` under `key`.
    pub async fn set_by_key(&self, key: &str, data: T) {
        if !self.ensure_initialized().await {
            return;
        }
        self.store(key.to_string(), None, data).await;
    }

    async fn store(&self, key: String, fingerprint: Option<Fingerprint>, data: T) {
        let hash = hash_key(&key);
        let entry = StoredEntry {
            key,
            fingerprint,
            created_at: Utc::now(),
            data,
        };

        if let Err(err) = self.write_entry(&hash, &entry).await {
            warn!(key = %entry.key, %err, "failed to write cache entry");
            return;
        }
        self.inner.index.lock().insert(
            hash,
            IndexEntry {
                last_access: entry.created_at,
            },
        );
    }

    async fn write_entry(&self, hash: &str, entry: &StoredEntry<T>) -> CacheResult<()> {
        let path = self.entry_path(hash).ok_or(CacheError::NoDirectory)?;
        let bytes = serde_json::to_vec(entry)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn remove(&self, hash: &str) -> bool {
        self.inner.index.lock().remove(hash);
        match self.entry_path(hash) {
            Some(path) => tokio::fs::remove_file(path).await.is_ok(),
            None => false,
        }
    }

    /// Drops the entry cached for `file`.
    pub async fn delete(&self, file: &Path) -> bool {
        if !self.ensure_initialized().await {
            return false;
        }
        self.remove(&hash_key(&self.key_for(file))).await
    }

    /// Drops the entry cached under `key`.
    pub async fn delete_by_key(&self, key: &str) -> bool {
        if !self.ensure_initialized().await {
            return false;
        }
        self.remove(&hash_key(key)).await
    }

    /// Drops every entry. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        if !self.ensure_initialized().await {
            return 0;
        }
        let hashes: Vec<String> = self.inner.index.lock().keys().cloned().collect();
        let mut removed = 0;
        for hash in hashes {
            if self.remove(&hash).await {
                removed += 1;
            }
        }
        removed
    }

    /// Removes expired entries, then the least recently used ones beyond
    /// `max_files`. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        if !self.ensure_initialized().await {
            return 0;
        }

        let mut removed = 0;
        if self.ttl.is_some() {
            let hashes: Vec<String> = self.inner.index.lock().keys().cloned().collect();
            for hash in hashes {
                if self.is_stale_on_disk(&hash).await && self.remove(&hash).await {
                    removed += 1;
                }
            }
        }

        if let Some(max_files) = self.max_files {
            let overflow: Vec<String> = {
                let index = self.inner.index.lock();
                let mut entries: Vec<(&String, &IndexEntry)> = index.iter().collect();
                entries.sort_by_key(|(_, entry)| entry.last_access);
                let excess = entries.len().saturating_sub(max_files);
                entries
                    .into_iter()
                    .take(excess)
                    .map(|(hash, _)| hash.clone())
                    .collect()
            };
            for hash in overflow {
                if self.remove(&hash).await {
                    removed += 1;
                }
            }
        }

        debug!(removed, "cache cleanup");
        removed
    }

    async fn is_stale_on_disk(&self, hash: &str) -> bool {
        let Some(path) = self.entry_path(hash) else {
            return true;
        };
        let Ok(bytes) = tokio::fs::read(&path).await else {
            return true;
        };
        serde_json::from_slice::<StoredEntry<serde_json::Value>>(&bytes)
            .map_or(true, |entry| self.is_expired(entry.created_at))
    }

    /// Returns lookup statistics.
    pub async fn stats(&self) -> CacheStats {
        let enabled = self.ensure_initialized().await;
        CacheStats::new(
            self.inner.hits.load(Ordering::SeqCst),
            self.inner.misses.load(Ordering::SeqCst),
            self.inner.index.lock().len(),
            enabled,
        )
    }
}

async fn initialize(inner: Arc<Inner>) -> Result<(), String> {
    inner.init_attempts.fetch_add(1, Ordering::SeqCst);

    let dir = inner
        .dir
        .clone()
        .ok_or_else(|| CacheError::NoDirectory.to_string())?;
    let dir_error = |source| {
        CacheError::Directory {
            path: dir.clone(),
            source,
        }
        .to_string()
    };

    tokio::fs::create_dir_all(&dir).await.map_err(dir_error)?;

    let mut entries = HashMap::new();
    let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(dir_error)?;
    while let Some(item) = read_dir.next_entry().await.map_err(dir_error)? {
        let path = item.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let Some(hash) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let last_access = item
            .metadata()
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok())
            .map_or_else(Utc::now, DateTime::<Utc>::from);
        entries.insert(hash.to_string(), IndexEntry { last_access });
    }

    debug!(dir = %dir.display(), entries = entries.len(), "cache initialized");
    *inner.index.lock() = entries;
    Ok(())
}
