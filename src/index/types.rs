use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Per-root reconciliation generation. Strictly increases with every pass
/// that applies changes for a root.
pub type Generation = i64;

/// Errors surfaced by the index core.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The store file is missing a valid schema, unreadable, or not a
    /// database at all. Recoverable by a full rebuild.
    #[error("index store corrupt or unreadable: {0}")]
    StoreCorrupt(String),

    /// A watched root itself could not be opened for walking. Permission
    /// failures on subdirectories are not errors; they are recorded in
    /// [`Delta::skipped`].
    #[error("permission denied walking {}", path.display())]
    WalkPermissionDenied { path: PathBuf },

    /// A store batch failed to commit twice in a row. Aborts the pass for
    /// the affected root only.
    #[error("batch commit failed after retry: {0}")]
    BatchCommitFailed(String),

    /// Malformed search pattern or non-positive limit. Rejected before
    /// touching the store.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Kind of filesystem object an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    pub fn code(self) -> i64 {
        match self {
            EntryKind::File => 0,
            EntryKind::Directory => 1,
            EntryKind::Symlink => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            2 => Some(EntryKind::Symlink),
            _ => None,
        }
    }
}

/// One indexed filesystem object. `path` is absolute, normalized, and the
/// sole identity of the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub name: String,
    pub parent_path: String,
    pub size: u64,
    pub modified: i64,
    pub accessed: i64,
    pub kind: EntryKind,
    pub last_seen: Generation,
}

/// The slice of stored state the differencer compares against. Pulled once
/// per pass, before the walk starts, so the walk holds no store lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySummary {
    pub size: u64,
    pub modified: i64,
}

/// Result of comparing one live walk against the stored snapshot of a root.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    /// Observed on disk, absent from the snapshot.
    pub added: Vec<Entry>,
    /// Observed on disk with a different size or mtime than the snapshot.
    pub changed: Vec<Entry>,
    /// In the snapshot, not observed, and not shadowed by a skipped subtree.
    pub removed: Vec<String>,
    /// Observed and identical; their `last_seen` still gets stamped.
    pub unchanged: Vec<String>,
    /// Subtrees the walk could not read this pass. Entries under these paths
    /// are never counted as removed.
    pub skipped: Vec<PathBuf>,
}

impl Delta {
    /// A delta with nothing to apply. Unchanged and skipped entries alone do
    /// not make a pass worth running.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    /// Whether two deltas would apply the same mutations. Used by the
    /// monitor to decide if a burst has settled during the debounce window.
    pub fn same_changes(&self, other: &Delta) -> bool {
        fn key(entries: &[Entry]) -> Vec<(&str, u64, i64)> {
            let mut v: Vec<_> = entries
                .iter()
                .map(|e| (e.path.as_str(), e.size, e.modified))
                .collect();
            v.sort_unstable();
            v
        }
        fn paths(paths: &[String]) -> Vec<&str> {
            let mut v: Vec<_> = paths.iter().map(String::as_str).collect();
            v.sort_unstable();
            v
        }
        key(&self.added) == key(&other.added)
            && key(&self.changed) == key(&other.changed)
            && paths(&self.removed) == paths(&other.removed)
    }
}

/// Counts from one reconciliation pass over one root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

/// Aggregate result of a full rebuild.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub added: usize,
    #[serde(skip)]
    pub failures: Vec<RootFailure>,
}

/// Aggregate result of a one-shot update pass across roots.
#[derive(Debug, Default, Serialize)]
pub struct UpdateReport {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    #[serde(skip)]
    pub failures: Vec<RootFailure>,
}

impl UpdateReport {
    pub fn absorb(&mut self, report: ApplyReport) {
        self.added += report.added;
        self.changed += report.changed;
        self.removed += report.removed;
    }
}

/// A root whose pass failed; other roots are unaffected.
#[derive(Debug)]
pub struct RootFailure {
    pub root: PathBuf,
    pub error: IndexError,
}

/// One registered root and its bookkeeping row.
#[derive(Debug, Clone, Serialize)]
pub struct RootInfo {
    pub path: String,
    pub generation: Generation,
    pub last_indexed: i64,
    pub entry_count: i64,
}

/// Configuration for index passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum rows per store transaction and parameters per statement.
    pub batch_bound: usize,
    /// Result cap applied when the caller does not supply one.
    pub default_limit: usize,
    /// Directory-name globs excluded from walks. Empty by default: the index
    /// covers everything present under a root, hidden files included.
    pub excluded_dirs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            // SQLite's parameter limit is typically 999; stay well under it.
            batch_bound: 500,
            default_limit: 1000,
            excluded_dirs: Vec::new(),
        }
    }
}

/// True when `path` lies at or below `ancestor`.
pub fn is_under(path: &str, ancestor: &Path) -> bool {
    let ancestor = ancestor.to_string_lossy();
    let ancestor = ancestor.trim_end_matches('/');
    path == ancestor || path.strip_prefix(ancestor).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64, modified: i64) -> Entry {
        Entry {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            parent_path: path.rsplit_once('/').map(|(p, _)| p).unwrap_or("").to_string(),
            size,
            modified,
            accessed: 0,
            kind: EntryKind::File,
            last_seen: 0,
        }
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("/a/b/c", Path::new("/a/b")));
        assert!(is_under("/a/b", Path::new("/a/b")));
        assert!(!is_under("/a/bc", Path::new("/a/b")));
        assert!(!is_under("/a", Path::new("/a/b")));
    }

    #[test]
    fn test_delta_empty_ignores_unchanged() {
        let delta = Delta {
            unchanged: vec!["/a".to_string()],
            skipped: vec![PathBuf::from("/b")],
            ..Delta::default()
        };
        assert!(delta.is_empty());
        assert_eq!(delta.total_changes(), 0);
    }

    #[test]
    fn test_same_changes_order_insensitive() {
        let a = Delta {
            added: vec![entry("/x", 1, 10), entry("/y", 2, 20)],
            removed: vec!["/z".to_string()],
            ..Delta::default()
        };
        let b = Delta {
            added: vec![entry("/y", 2, 20), entry("/x", 1, 10)],
            removed: vec!["/z".to_string()],
            unchanged: vec!["/w".to_string()],
            ..Delta::default()
        };
        assert!(a.same_changes(&b));
    }

    #[test]
    fn test_same_changes_detects_mtime_drift() {
        let a = Delta {
            changed: vec![entry("/x", 1, 10)],
            ..Delta::default()
        };
        let b = Delta {
            changed: vec![entry("/x", 1, 11)],
            ..Delta::default()
        };
        assert!(!a.same_changes(&b));
    }

    #[test]
    fn test_entry_kind_round_trip() {
        for kind in [EntryKind::File, EntryKind::Directory, EntryKind::Symlink] {
            assert_eq!(EntryKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EntryKind::from_code(9), None);
    }
}
