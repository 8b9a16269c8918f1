use crate::index::differ;
use crate::index::reconciler::Reconciler;
use crate::index::store::EntryStore;
use crate::index::types::{BuildReport, Delta, IndexConfig, Result, RootFailure, UpdateReport};
use log::warn;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// One scan-and-diff pass for a root: pull the snapshot, walk, classify.
///
/// This is the trigger seam the change monitor calls on every poll tick; an
/// event-notification backend would invoke the same function when the kernel
/// reports activity under `root`.
pub fn scan_pass(store: &EntryStore, root: &Path, config: &IndexConfig) -> Result<Delta> {
    let known = store.snapshot(root)?;
    differ::diff(root, &known, config)
}

/// Full rebuild: clear and repopulate the store for each root. Failures are
/// contained per root.
pub fn build_index(
    store: &EntryStore,
    roots: &[PathBuf],
    config: &IndexConfig,
    silent: bool,
) -> Result<BuildReport> {
    let mut report = BuildReport::default();
    for root in roots {
        match build_root(store, root, config, silent) {
            Ok(added) => report.added += added,
            Err(error) => {
                warn!("rebuild failed for {}: {error}", root.display());
                report.failures.push(RootFailure {
                    root: root.clone(),
                    error,
                });
            }
        }
    }
    Ok(report)
}

fn build_root(
    store: &EntryStore,
    root: &Path,
    config: &IndexConfig,
    silent: bool,
) -> Result<usize> {
    let root = root.canonicalize()?;
    if !silent {
        println!("Indexing: {}", root.display());
    }

    let spinner = Spinner::start(silent, "Scanning files...".to_string());
    let walk = differ::scan_root(&root, config)?;
    spinner.finish(format!("Found {} entries", walk.entries.len()));

    for skipped in &walk.skipped {
        warn!("rebuild of {} skipped {}", root.display(), skipped.display());
    }

    store.clear_root(&root)?;
    let delta = Delta {
        added: walk.entries,
        skipped: walk.skipped,
        ..Delta::default()
    };

    let spinner = Spinner::start(silent, "Writing index...".to_string());
    let applied = Reconciler::new(store).apply(&root, &delta)?;
    spinner.finish(format!("Indexed {} entries", applied.added));

    Ok(applied.added)
}

/// One reconciliation pass over each root, usable without the monitor.
/// Roots are scanned in parallel; applies serialize through the store.
pub fn update_index(
    store: &EntryStore,
    roots: &[PathBuf],
    config: &IndexConfig,
) -> Result<UpdateReport> {
    let outcomes: Vec<(PathBuf, Result<Delta>)> = roots
        .par_iter()
        .map(|root| match root.canonicalize() {
            Ok(canonical) => {
                let delta = scan_pass(store, &canonical, config);
                (canonical, delta)
            }
            Err(e) => (root.clone(), Err(e.into())),
        })
        .collect();

    let mut report = UpdateReport::default();
    for (root, outcome) in outcomes {
        let applied = outcome.and_then(|delta| {
            for skipped in &delta.skipped {
                warn!("pass over {} skipped {}", root.display(), skipped.display());
            }
            Reconciler::new(store).apply(&root, &delta)
        });
        match applied {
            Ok(counts) => report.absorb(counts),
            Err(error) => {
                warn!("update pass failed for {}: {error}", root.display());
                report.failures.push(RootFailure { root, error });
            }
        }
    }
    Ok(report)
}

/// Spinner shown during interactive rebuilds; compiles to nothing without
/// the `progress` feature.
struct Spinner {
    #[cfg(feature = "progress")]
    bar: Option<indicatif::ProgressBar>,
}

impl Spinner {
    #[cfg(feature = "progress")]
    fn start(silent: bool, message: String) -> Self {
        if silent {
            return Self { bar: None };
        }
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        bar.set_message(message);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar: Some(bar) }
    }

    #[cfg(not(feature = "progress"))]
    fn start(_silent: bool, _message: String) -> Self {
        Self {}
    }

    #[cfg(feature = "progress")]
    fn finish(self, message: String) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(message);
        }
    }

    #[cfg(not(feature = "progress"))]
    fn finish(self, _message: String) {}
}
