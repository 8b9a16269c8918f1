//! Applies a differencer delta to the entry store.
//!
//! Mutations are chunked to the store's batch bound, additions and updates
//! land before removals (a remove-then-re-add race resolves to "present"),
//! and every failed batch is retried once before the pass aborts for that
//! root alone.

use crate::index::store::EntryStore;
use crate::index::types::{ApplyReport, Delta, Generation, IndexError, Result};
use log::{debug, warn};
use std::path::Path;

pub struct Reconciler<'a> {
    store: &'a EntryStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a EntryStore) -> Self {
        Self { store }
    }

    /// Apply one delta for `root`. Empty deltas are a no-op and do not
    /// advance the root's generation.
    pub fn apply(&self, root: &Path, delta: &Delta) -> Result<ApplyReport> {
        if delta.is_empty() {
            return Ok(ApplyReport::default());
        }

        let bound = self.store.batch_bound();
        let generation: Generation = self.store.root_generation(root)? + 1;

        let mut upserts = Vec::with_capacity(delta.added.len() + delta.changed.len());
        upserts.extend(delta.added.iter().cloned());
        upserts.extend(delta.changed.iter().cloned());
        for entry in &mut upserts {
            entry.last_seen = generation;
        }

        for chunk in upserts.chunks(bound) {
            commit_with_retry(|| self.store.put_batch(chunk, generation))?;
        }
        for chunk in delta.unchanged.chunks(bound) {
            commit_with_retry(|| self.store.mark_seen_batch(chunk, generation))?;
        }
        for chunk in delta.removed.chunks(bound) {
            commit_with_retry(|| self.store.remove_batch(chunk))?;
        }

        let confirmed =
            (delta.added.len() + delta.changed.len() + delta.unchanged.len()) as i64;
        self.store.finish_pass(root, generation, confirmed)?;

        debug!(
            "reconciled {}: gen {} (+{} ~{} -{})",
            root.display(),
            generation,
            delta.added.len(),
            delta.changed.len(),
            delta.removed.len(),
        );

        Ok(ApplyReport {
            added: delta.added.len(),
            changed: delta.changed.len(),
            removed: delta.removed.len(),
        })
    }
}

/// Run one batch commit, retrying once. A second failure surfaces as
/// [`IndexError::BatchCommitFailed`] and aborts the caller's pass.
fn commit_with_retry<T>(mut commit: impl FnMut() -> Result<T>) -> Result<T> {
    match commit() {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!("batch commit failed, retrying once: {first}");
            commit().map_err(|second| IndexError::BatchCommitFailed(second.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{Entry, EntryKind, IndexConfig};
    use std::path::PathBuf;

    fn entry(path: &str) -> Entry {
        let (parent, name) = path.rsplit_once('/').unwrap();
        Entry {
            path: path.to_string(),
            name: name.to_string(),
            parent_path: parent.to_string(),
            size: 1,
            modified: 1,
            accessed: 1,
            kind: EntryKind::File,
            last_seen: 0,
        }
    }

    fn store() -> EntryStore {
        EntryStore::open_in_memory(&IndexConfig::default()).unwrap()
    }

    #[test]
    fn test_apply_stamps_generation() {
        let store = store();
        let root = PathBuf::from("/r");
        let delta = Delta {
            added: vec![entry("/r/a"), entry("/r/b")],
            ..Delta::default()
        };

        let report = Reconciler::new(&store).apply(&root, &delta).unwrap();
        assert_eq!(report, ApplyReport { added: 2, changed: 0, removed: 0 });
        assert_eq!(store.root_generation(&root).unwrap(), 1);
        assert_eq!(store.get("/r/a").unwrap().unwrap().last_seen, 1);

        // Second pass with changes advances the generation again.
        let delta = Delta {
            changed: vec![entry("/r/a")],
            unchanged: vec!["/r/b".to_string()],
            ..Delta::default()
        };
        Reconciler::new(&store).apply(&root, &delta).unwrap();
        assert_eq!(store.root_generation(&root).unwrap(), 2);
        assert_eq!(store.get("/r/b").unwrap().unwrap().last_seen, 2);
    }

    #[test]
    fn test_empty_delta_is_noop() {
        let store = store();
        let root = PathBuf::from("/r");
        let report = Reconciler::new(&store).apply(&root, &Delta::default()).unwrap();
        assert_eq!(report, ApplyReport::default());
        assert_eq!(store.root_generation(&root).unwrap(), 0);
    }

    #[test]
    fn test_large_removal_fully_applies() {
        let store = store();
        let root = PathBuf::from("/r");
        let bound = store.batch_bound();

        // Three-plus chunks worth of entries.
        let added: Vec<Entry> = (0..bound * 2 + 200)
            .map(|i| entry(&format!("/r/f{i:05}")))
            .collect();
        let delta = Delta { added: added.clone(), ..Delta::default() };
        Reconciler::new(&store).apply(&root, &delta).unwrap();
        assert_eq!(store.entry_count(Some(&root)).unwrap() as usize, added.len());

        let removed: Vec<String> = added.iter().map(|e| e.path.clone()).collect();
        let delta = Delta { removed, ..Delta::default() };
        let report = Reconciler::new(&store).apply(&root, &delta).unwrap();
        assert_eq!(report.removed, added.len());
        assert_eq!(store.entry_count(Some(&root)).unwrap(), 0);
    }

    #[test]
    fn test_retry_recovers_from_transient_failure() {
        let mut attempts = 0;
        let result = commit_with_retry(|| {
            attempts += 1;
            if attempts == 1 {
                Err(IndexError::InvalidQuery("transient".into()))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_second_failure_aborts() {
        let result: Result<()> =
            commit_with_retry(|| Err(IndexError::InvalidQuery("persistent".into())));
        assert!(matches!(result, Err(IndexError::BatchCommitFailed(_))));
    }
}
