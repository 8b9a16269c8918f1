//! The facade front ends talk to.
//!
//! [`FileIndex`] owns the shared entry store, an LRU cache of query results
//! keyed by the store's write-epoch (so a reconciled batch invalidates stale
//! results without any explicit flush), and the lifecycle of the change
//! monitor. Searches never block on indexing beyond one batch-commit.

use crate::index::ops;
use crate::index::store::EntryStore;
use crate::index::types::{
    BuildReport, Entry, IndexConfig, Result, RootInfo, UpdateReport,
};
use crate::monitor::{self, MonitorConfig, MonitorHandle};
use crate::query::{QueryExecutor, QueryScope, SearchOptions, parse_query};
use crate::utils::app_data;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// LRU cache size for search results.
const QUERY_CACHE_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    epoch: u64,
    pattern: String,
    case_sensitive: bool,
    scope: QueryScope,
    scope_path: Option<PathBuf>,
    limit: usize,
}

pub struct FileIndex {
    store: Arc<EntryStore>,
    store_path: Option<PathBuf>,
    config: IndexConfig,
    query_cache: Mutex<LruCache<CacheKey, Arc<Vec<Entry>>>>,
    monitor: Option<MonitorHandle>,
}

impl FileIndex {
    /// Open the per-user index at its fixed location.
    pub fn open() -> Result<Self> {
        let path = app_data::store_path()?;
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let config = IndexConfig::default();
        let store = EntryStore::open(path, &config)?;
        Ok(Self::with_store(store, Some(path.to_path_buf()), config))
    }

    /// Drop a corrupt store file and start over. The recovery path front
    /// ends take when open reports [`crate::index::IndexError::StoreCorrupt`].
    pub fn recreate() -> Result<Self> {
        let path = app_data::store_path()?;
        let config = IndexConfig::default();
        let store = EntryStore::recreate(&path, &config)?;
        Ok(Self::with_store(store, Some(path), config))
    }

    /// In-memory index, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let config = IndexConfig::default();
        let store = EntryStore::open_in_memory(&config)?;
        Ok(Self::with_store(store, None, config))
    }

    fn with_store(store: EntryStore, store_path: Option<PathBuf>, config: IndexConfig) -> Self {
        Self {
            store: Arc::new(store),
            store_path,
            config,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap(),
            )),
            monitor: None,
        }
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn store_location(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Search the index. Results are ordered exact-name first, then
    /// name-prefix, then the rest, capped at the options' limit.
    pub fn search(&self, pattern: &str, options: &SearchOptions) -> Result<Vec<Entry>> {
        let mut options = options.clone();
        if let Some(scope) = options.scope_path.take() {
            // Stored paths are canonical; scope the query the same way.
            options.scope_path = Some(scope.canonicalize().unwrap_or(scope));
        }

        let key = CacheKey {
            epoch: self.store.write_epoch(),
            pattern: pattern.to_string(),
            case_sensitive: options.case_sensitive,
            scope: options.scope,
            scope_path: options.scope_path.clone(),
            limit: options.limit,
        };

        if let Some(hit) = self.query_cache.lock().unwrap().get(&key) {
            return Ok(hit.as_ref().clone());
        }

        let query = parse_query(pattern, &options)?;
        let results = QueryExecutor::new(&self.store).execute(&query)?;

        self.query_cache
            .lock()
            .unwrap()
            .put(key, Arc::new(results.clone()));
        Ok(results)
    }

    /// Full rebuild of the given roots.
    pub fn build_index(&self, roots: &[PathBuf], silent: bool) -> Result<BuildReport> {
        ops::build_index(&self.store, roots, &self.config, silent)
    }

    /// One reconciliation pass over the given roots, without the monitor.
    pub fn update_index(&self, roots: &[PathBuf]) -> Result<UpdateReport> {
        ops::update_index(&self.store, roots, &self.config)
    }

    /// Start monitoring the given roots. Idempotent: a running monitor is
    /// left alone.
    pub fn start_monitor(&mut self, roots: &[PathBuf], config: MonitorConfig) -> Result<()> {
        if self.monitor.as_ref().is_some_and(|m| m.is_running()) {
            return Ok(());
        }
        let mut canonical = Vec::with_capacity(roots.len());
        for root in roots {
            canonical.push(root.canonicalize()?);
        }
        self.monitor = Some(monitor::start_monitor(
            Arc::clone(&self.store),
            canonical,
            self.config.clone(),
            config,
        ));
        Ok(())
    }

    /// Stop the monitor, completing any in-flight pass. Idempotent.
    pub fn stop_monitor(&mut self) {
        if let Some(mut handle) = self.monitor.take() {
            handle.stop();
        }
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor.as_ref().is_some_and(|m| m.is_running())
    }

    /// Currently indexed roots, most recently reconciled first.
    pub fn list_roots(&self) -> Result<Vec<RootInfo>> {
        self.store.list_roots()
    }

    /// Forget a root and drop its entries. Returns entries removed.
    pub fn remove_root(&self, root: &Path) -> Result<usize> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        self.store.remove_root(&root)
    }
}

impl Drop for FileIndex {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}
