//! Snapshot differencer: walks one root and classifies what it sees against
//! the store's last known state.
//!
//! The walk never follows symbolic links (they are recorded as entries of
//! their own kind), so it terminates on any tree. Unreadable subdirectories
//! are recorded and skipped, and entries below them are never reported as
//! removed: a transient permission failure must not look like a deletion.

use crate::index::types::{
    Delta, Entry, EntryKind, EntrySummary, IndexConfig, IndexError, Result, is_under,
};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Everything one exhaustive walk observed.
pub struct Walk {
    pub entries: Vec<Entry>,
    pub skipped: Vec<PathBuf>,
}

/// Walk `root` and produce the delta against `known`, the snapshot pulled
/// from the store before this call. Holds no store lock.
pub fn diff(
    root: &Path,
    known: &FxHashMap<String, EntrySummary>,
    config: &IndexConfig,
) -> Result<Delta> {
    let walk = scan_root(root, config)?;

    let mut delta = Delta {
        skipped: walk.skipped,
        ..Delta::default()
    };

    let mut seen: FxHashSet<String> = FxHashSet::default();
    seen.reserve(walk.entries.len());

    for entry in walk.entries {
        seen.insert(entry.path.clone());
        match known.get(&entry.path) {
            None => delta.added.push(entry),
            Some(summary)
                if summary.size != entry.size || summary.modified != entry.modified =>
            {
                delta.changed.push(entry)
            }
            Some(_) => delta.unchanged.push(entry.path),
        }
    }

    for path in known.keys() {
        if !seen.contains(path)
            && !delta.skipped.iter().any(|skipped| is_under(path, skipped))
        {
            delta.removed.push(path.clone());
        }
    }

    Ok(delta)
}

/// Exhaustively walk `root`. Sibling order is unspecified.
pub fn scan_root(root: &Path, config: &IndexConfig) -> Result<Walk> {
    let meta = fs::symlink_metadata(root).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => IndexError::WalkPermissionDenied {
            path: root.to_path_buf(),
        },
        _ => IndexError::Io(e),
    })?;
    if !meta.is_dir() {
        return Err(IndexError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("root is not a directory: {}", root.display()),
        )));
    }

    let excluded = excluded_set(&config.excluded_dirs);

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(false)
        .filter_entry(move |dirent| {
            excluded.is_empty() || !excluded.is_match(Path::new(dirent.file_name()))
        })
        .build();

    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for result in walker {
        match result {
            Ok(dirent) => {
                // Depth 0 is the root itself; its parent is the unindexed
                // boundary, so it gets no row.
                if dirent.depth() == 0 {
                    continue;
                }
                let path = dirent.path();
                let meta = match fs::symlink_metadata(path) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!("cannot stat {}: {e}", path.display());
                        skipped.push(path.to_path_buf());
                        continue;
                    }
                };
                entries.push(observe(path, &meta));
            }
            Err(err) => {
                let denied = err
                    .io_error()
                    .is_some_and(|e| e.kind() == io::ErrorKind::PermissionDenied);
                match error_path(&err) {
                    Some(path) => {
                        if denied {
                            warn!("permission denied, skipping subtree {}", path.display());
                        } else {
                            warn!("skipping unreadable subtree {}: {err}", path.display());
                        }
                        skipped.push(path.to_path_buf());
                    }
                    None => warn!("walk error under {}: {err}", root.display()),
                }
            }
        }
    }

    Ok(Walk { entries, skipped })
}

fn observe(path: &Path, meta: &fs::Metadata) -> Entry {
    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    Entry {
        path: path.to_string_lossy().into_owned(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        parent_path: path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: if kind == EntryKind::Directory { 0 } else { meta.len() },
        modified: unix_seconds(meta.modified()),
        accessed: unix_seconds(meta.accessed()),
        kind,
        // Stamped by the reconciler when the delta is applied.
        last_seen: 0,
    }
}

fn unix_seconds(time: io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn excluded_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("ignoring invalid exclude pattern {pattern:?}: {e}"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!("ignoring exclude patterns: {e}");
        GlobSet::empty()
    })
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } => error_path(err),
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        ignore::Error::WithLineNumber { err, .. } => error_path(err),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        _ => None,
    }
}
