//! Concurrent multi-file loading.
//!
//! [`MultiFileLoader::load_many`] runs one blocking load per file on tokio's
//! blocking pool, bounded by a semaphore. Results come back in input order
//! whatever order the loads finish in, and a failing file only ever affects
//! its own slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use euvlog_data::{load_one, LoadOutcome, LoaderConfig, SkipReason};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, TableCache};

/// Lower bound for the derived worker count.
pub const MIN_WORKERS: usize = 2;
/// Upper bound for the derived worker count.
pub const MAX_WORKERS: usize = 8;

/// Worker count derived from the hardware, clamped to
/// [`MIN_WORKERS`]..=[`MAX_WORKERS`].
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

// ── LoadReport ────────────────────────────────────────────────────────────────

/// Tally of one `load_many` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total: usize,
    pub loaded: usize,
    pub cache_hits: usize,
    pub monitoring: usize,
    pub failed: usize,
}

impl LoadReport {
    fn record(&mut self, outcome: &LoadOutcome, cache_hit: bool) {
        self.total += 1;
        match outcome.skip_reason() {
            None => self.loaded += 1,
            Some(SkipReason::Monitoring) => self.monitoring += 1,
            Some(_) => self.failed += 1,
        }
        if cache_hit {
            self.cache_hits += 1;
        }
    }

    pub fn skipped(&self) -> usize {
        self.monitoring + self.failed
    }
}

// ── MultiFileLoader ───────────────────────────────────────────────────────────

pub struct MultiFileLoader {
    config: Arc<LoaderConfig>,
    cache: Option<Arc<TableCache>>,
}

impl MultiFileLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config: Arc::new(config),
            cache: None,
        }
    }

    /// Share `cache` across loads (and across loaders).
    pub fn with_cache(mut self, cache: Arc<TableCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<TableCache>> {
        self.cache.as_ref()
    }

    /// Workers for a batch of `files`: the configured count or the derived
    /// default, never more than there are files and never less than one.
    pub fn worker_count(&self, files: usize) -> usize {
        self.config
            .max_workers
            .unwrap_or_else(default_worker_count)
            .min(files)
            .max(1)
    }

    /// Load one file through the cache. Blocking.
    pub fn load_cached(&self, path: &Path, requested: &[String]) -> LoadOutcome {
        load_unit(path, requested, &self.config, self.cache.as_deref()).0
    }

    /// Load every path concurrently. The output is aligned 1:1 with `paths`.
    pub async fn load_many(&self, paths: &[PathBuf], requested: &[String]) -> Vec<LoadOutcome> {
        self.load_many_with_report(paths, requested).await.0
    }

    /// [`load_many`](Self::load_many) plus a tally of the batch.
    pub async fn load_many_with_report(
        &self,
        paths: &[PathBuf],
        requested: &[String],
    ) -> (Vec<LoadOutcome>, LoadReport) {
        if paths.is_empty() {
            return (Vec::new(), LoadReport::default());
        }

        let workers = self.worker_count(paths.len());
        debug!(files = paths.len(), workers, "starting batch load");

        let semaphore = Arc::new(Semaphore::new(workers));
        let requested: Arc<[String]> = requested.into();
        let mut tasks = JoinSet::new();

        for (index, path) in paths.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let requested = Arc::clone(&requested);
            let config = Arc::clone(&self.config);
            let cache = self.cache.clone();

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let task_path = path.clone();
                let result = tokio::task::spawn_blocking(move || {
                    load_unit(&task_path, &requested, &config, cache.as_deref())
                })
                .await;

                let loaded = result.unwrap_or_else(|e| {
                    warn!("Load task for {} failed: {}", path.display(), e);
                    (
                        LoadOutcome::Skipped {
                            path,
                            reason: SkipReason::TaskFailed,
                        },
                        false,
                    )
                });
                (index, loaded)
            });
        }

        let mut slots: Vec<Option<(LoadOutcome, bool)>> = vec![None; paths.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, loaded)) => slots[index] = Some(loaded),
                Err(e) => warn!("Load task aborted: {}", e),
            }
        }

        let mut report = LoadReport::default();
        let outcomes: Vec<LoadOutcome> = slots
            .into_iter()
            .zip(paths)
            .map(|(slot, path)| {
                let (outcome, cache_hit) = slot.unwrap_or_else(|| {
                    (
                        LoadOutcome::Skipped {
                            path: path.clone(),
                            reason: SkipReason::TaskFailed,
                        },
                        false,
                    )
                });
                report.record(&outcome, cache_hit);
                outcome
            })
            .collect();

        info!(
            total = report.total,
            loaded = report.loaded,
            monitoring = report.monitoring,
            failed = report.failed,
            cache_hits = report.cache_hits,
            "batch load finished"
        );

        (outcomes, report)
    }
}

impl Default for MultiFileLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

/// One file: cache lookup, then a real load whose result is cached against
/// the mtime read before loading. Returns the outcome and whether it was a
/// cache hit.
fn load_unit(
    path: &Path,
    requested: &[String],
    config: &LoaderConfig,
    cache: Option<&TableCache>,
) -> (LoadOutcome, bool) {
    let Some(cache) = cache else {
        return (load_one(path, requested, config), false);
    };

    let key = CacheKey::new(path, requested);
    if let Some(table) = cache.get(&key) {
        return (LoadOutcome::Loaded(table), true);
    }

    let mtime = TableCache::file_mtime(path);
    let outcome = load_one(path, requested, config);
    if let (LoadOutcome::Loaded(table), Some(mtime)) = (&outcome, mtime) {
        cache.insert(key, Arc::clone(table), mtime);
    }
    (outcome, false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
