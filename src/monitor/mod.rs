//! Polling change monitor.
//!
//! One thread per watched root runs the state machine
//! `Idle → Scanning → Debouncing → Applying → Idle`: wait for the poll tick,
//! diff the root against the store, hold a non-empty delta for the debounce
//! window (rescans that differ reset it), then reconcile. Roots are fully
//! independent; the entry store serializes writes internally.
//!
//! Shutdown is cooperative: the stop flag is observed between states and
//! inside waits, never mid-walk or mid-commit, so stopping completes the
//! pass in flight and leaves no torn writes.

pub mod debouncer;

use crate::index::ops;
use crate::index::reconciler::Reconciler;
use crate::index::store::EntryStore;
use crate::index::types::IndexConfig;
use crate::monitor::debouncer::DeltaDebouncer;
use crate::utils::app_data::config_path;
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default debounce window in seconds.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 5;

/// Granularity at which waits observe the stop flag.
const STOP_CHECK: Duration = Duration::from_millis(100);

/// Configuration file format (TOML), located in the app data directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub monitor: MonitorSection,
}

/// Monitor section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorSection {
    pub poll_interval_secs: Option<u64>,
    pub debounce_secs: Option<u64>,
}

/// Configuration for the change monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Milliseconds between polls of each watched root.
    pub poll_interval_ms: u64,
    /// Milliseconds a detected delta is held to coalesce bursts.
    pub debounce_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_SECS * 1000,
            debounce_ms: DEFAULT_DEBOUNCE_SECS * 1000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn load_from_file() -> Option<ConfigFile> {
        let path = config_path().ok()?;
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(&path).ok()?;
        toml::from_str(&content).ok()
    }

    /// Load config with priority: environment variables > config file >
    /// defaults.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(file) = Self::load_from_file() {
            if let Some(secs) = file.monitor.poll_interval_secs {
                config.poll_interval_ms = secs * 1000;
            }
            if let Some(secs) = file.monitor.debounce_secs {
                config.debounce_ms = secs * 1000;
            }
        }

        if let Ok(val) = std::env::var("FSI_POLL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.poll_interval_ms = secs * 1000;
        }
        if let Ok(val) = std::env::var("FSI_DEBOUNCE_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.debounce_ms = secs * 1000;
        }

        config
    }
}

/// Handle to a set of running monitor threads, one per root.
pub struct MonitorHandle {
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    roots: Vec<PathBuf>,
}

impl MonitorHandle {
    /// Signal all monitor threads to stop and wait for them. Each thread
    /// finishes its in-flight pass first.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
            && self.threads.iter().any(|t| !t.is_finished())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn one monitoring thread per root.
pub fn start_monitor(
    store: Arc<EntryStore>,
    roots: Vec<PathBuf>,
    index_config: IndexConfig,
    config: MonitorConfig,
) -> MonitorHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut threads = Vec::with_capacity(roots.len());

    for root in &roots {
        let store = Arc::clone(&store);
        let root = root.clone();
        let index_config = index_config.clone();
        let config = config.clone();
        let shutdown = Arc::clone(&shutdown);
        threads.push(std::thread::spawn(move || {
            run_root_loop(store, root, index_config, config, shutdown);
        }));
    }

    MonitorHandle {
        shutdown,
        threads,
        roots,
    }
}

/// The per-root state machine.
fn run_root_loop(
    store: Arc<EntryStore>,
    root: PathBuf,
    index_config: IndexConfig,
    config: MonitorConfig,
    shutdown: Arc<AtomicBool>,
) {
    info!(
        "monitoring {} (poll {}s, debounce {}s)",
        root.display(),
        config.poll_interval().as_secs(),
        config.debounce_window().as_secs(),
    );

    loop {
        // Idle
        if !sleep_interruptible(config.poll_interval(), &shutdown) {
            break;
        }

        // Scanning
        let delta = match ops::scan_pass(&store, &root, &index_config) {
            Ok(delta) => delta,
            Err(e) => {
                warn!("scan failed for {}: {e}", root.display());
                continue;
            }
        };
        if delta.is_empty() {
            continue;
        }
        debug!(
            "detected {} changes under {}",
            delta.total_changes(),
            root.display()
        );

        // Debouncing: hold the delta for the window; rescans that differ
        // replace it and restart the window.
        let mut debouncer = DeltaDebouncer::new(config.debounce_window());
        debouncer.offer(delta);
        let mut stopping = false;
        while debouncer.has_pending() {
            let wait = debouncer.remaining().unwrap_or_default();
            if !sleep_interruptible(wait, &shutdown) {
                // Nothing applied yet; the store is untouched and the next
                // start will rediscover these changes.
                stopping = true;
                break;
            }
            match ops::scan_pass(&store, &root, &index_config) {
                Ok(fresh) => {
                    if !debouncer.coalesce(fresh) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("rescan failed for {}: {e}", root.display());
                    break;
                }
            }
        }
        if stopping {
            break;
        }

        // Applying
        if let Some(held) = debouncer.flush() {
            match Reconciler::new(&store).apply(&root, &held) {
                Ok(report) => info!(
                    "reconciled {}: +{} ~{} -{}",
                    root.display(),
                    report.added,
                    report.changed,
                    report.removed
                ),
                Err(e) => warn!(
                    "pass aborted for {}: {e}; will retry next tick",
                    root.display()
                ),
            }
        }
    }

    info!("monitor stopped for {}", root.display());
}

/// Sleep in stop-checkable slices. Returns false when the stop flag was
/// raised before the duration elapsed.
fn sleep_interruptible(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(STOP_CHECK));
    }
}
