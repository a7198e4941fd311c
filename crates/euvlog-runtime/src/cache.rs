//! In-memory cache of loaded session tables.
//!
//! Entries are keyed by file path and the sorted set of requested columns and
//! remember the file's modification time when they were stored. A lookup only
//! hits while the file has not been modified since. Capacity is bounded and
//! eviction is first-in, first-out.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use euvlog_core::models::SeriesTable;
use tracing::debug;

/// Default number of tables kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum entries; `0` stores nothing.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    /// Sorted, deduplicated.
    pub columns: Vec<String>,
}

impl CacheKey {
    pub fn new(path: &Path, columns: &[String]) -> Self {
        let mut columns = columns.to_vec();
        columns.sort();
        columns.dedup();
        Self {
            path: path.to_path_buf(),
            columns,
        }
    }
}

struct Entry {
    table: Arc<SeriesTable>,
    mtime: SystemTime,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    /// Insertion order, oldest first.
    order: VecDeque<CacheKey>,
}

/// Shared table cache. Cheap to share behind an `Arc`; every operation takes
/// one short lock.
pub struct TableCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl TableCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Entries are never left half-written, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current modification time of `path`, if it can be read.
    pub fn file_mtime(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    /// Cached table for `key`, provided the file's current mtime is not newer
    /// than the stored one. Stale entries are dropped.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<SeriesTable>> {
        let current = Self::file_mtime(&key.path)?;
        let mut inner = self.lock();

        let fresh = match inner.entries.get(key) {
            None => return None,
            Some(entry) => current <= entry.mtime,
        };

        if fresh {
            debug!(file = %key.path.display(), "cache hit");
            inner.entries.get(key).map(|e| Arc::clone(&e.table))
        } else {
            debug!(file = %key.path.display(), "cache entry stale");
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            None
        }
    }

    /// Store `table` under `key` with the file's mtime as read at load time.
    /// Re-inserting a key moves it to the back of the eviction queue.
    pub fn insert(&self, key: CacheKey, table: Arc<SeriesTable>, mtime: SystemTime) {
        if self.config.capacity == 0 {
            return;
        }
        let mut inner = self.lock();

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        while inner.entries.len() >= self.config.capacity && !inner.entries.contains_key(&key) {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            debug!(file = %oldest.path.display(), "cache eviction");
            inner.entries.remove(&oldest);
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, Entry { table, mtime });
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
