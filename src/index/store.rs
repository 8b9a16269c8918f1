//! SQLite-backed entry store.
//!
//! Owns the database connection and the schema. All mutations go through
//! bounded, transactional batches: readers always observe the last committed
//! batch, never a partial one. Nothing outside this module touches the
//! connection.

use crate::index::types::{
    Entry, EntryKind, EntrySummary, Generation, IndexConfig, IndexError, Result, RootInfo,
};
use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_path TEXT NOT NULL,
    size INTEGER NOT NULL,
    modified INTEGER NOT NULL,
    accessed INTEGER NOT NULL,
    kind INTEGER NOT NULL,
    last_seen INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(name);
CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries(parent_path);
CREATE TABLE IF NOT EXISTS roots (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    generation INTEGER NOT NULL DEFAULT 0,
    last_indexed INTEGER NOT NULL DEFAULT 0,
    entry_count INTEGER NOT NULL DEFAULT 0
);
";

/// The persistent entry table and its query surface.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so the connection lives
/// behind a `Mutex`. Every batch or scan acquires the lock for exactly one
/// transaction or statement; readers wait at most one batch-commit.
#[derive(Debug)]
pub struct EntryStore {
    conn: Mutex<Connection>,
    /// Bumped after every committed write batch. Lets callers key caches on
    /// "has anything changed since I last looked".
    epoch: AtomicU64,
    batch_bound: usize,
}

impl EntryStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, config: &IndexConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| IndexError::StoreCorrupt(format!("{}: {e}", path.display())))?;
        Self::init(conn, config.batch_bound)
    }

    /// In-memory store, used by tests and benches.
    pub fn open_in_memory(config: &IndexConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, config.batch_bound)
    }

    fn init(conn: Connection, batch_bound: usize) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| IndexError::StoreCorrupt(e.to_string()))?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|e| IndexError::StoreCorrupt(e.to_string()))?;

        match version {
            0 => {
                conn.execute_batch(SCHEMA)?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            }
            SCHEMA_VERSION => {
                // Probe the expected shape; a foreign or truncated database
                // fails here rather than at first use.
                conn.prepare("SELECT count(*) FROM entries")
                    .and_then(|mut stmt| stmt.query_row([], |row| row.get::<_, i64>(0)))
                    .map_err(|e| IndexError::StoreCorrupt(e.to_string()))?;
            }
            other => {
                return Err(IndexError::StoreCorrupt(format!(
                    "unsupported schema version {other}"
                )));
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            epoch: AtomicU64::new(0),
            batch_bound,
        })
    }

    /// Delete the store file (and its WAL sidecars) and open a fresh one.
    /// The recovery path for [`IndexError::StoreCorrupt`].
    pub fn recreate(path: &Path, config: &IndexConfig) -> Result<Self> {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(Path::new(&file)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::open(path, config)
    }

    pub fn batch_bound(&self) -> usize {
        self.batch_bound
    }

    /// Monotonic write-epoch of the last committed batch.
    pub fn write_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// Insert or update up to `batch_bound` entries in one transaction,
    /// stamping them with `generation`. Returns rows written. Rolls back
    /// completely on failure.
    pub fn put_batch(&self, entries: &[Entry], generation: Generation) -> Result<usize> {
        debug_assert!(entries.len() <= self.batch_bound);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO entries (path, name, parent_path, size, modified, accessed, kind, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(path) DO UPDATE SET
                     name = excluded.name,
                     parent_path = excluded.parent_path,
                     size = excluded.size,
                     modified = excluded.modified,
                     accessed = excluded.accessed,
                     kind = excluded.kind,
                     last_seen = excluded.last_seen",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.path,
                    entry.name,
                    entry.parent_path,
                    entry.size as i64,
                    entry.modified,
                    entry.accessed,
                    entry.kind.code(),
                    generation,
                ])?;
            }
        }
        tx.commit()?;
        self.bump_epoch();
        Ok(entries.len())
    }

    /// Stamp `last_seen` on entries confirmed present but otherwise
    /// unchanged. Same bound and atomicity as [`EntryStore::put_batch`].
    pub fn mark_seen_batch(&self, paths: &[String], generation: Generation) -> Result<usize> {
        debug_assert!(paths.len() <= self.batch_bound);
        if paths.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE entries SET last_seen = ? WHERE path IN ({})",
            placeholders(paths.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(paths.len() + 1);
        values.push(&generation);
        for path in paths {
            values.push(path);
        }
        let updated = stmt.execute(values.as_slice())?;
        drop(stmt);
        drop(conn);
        self.bump_epoch();
        Ok(updated)
    }

    /// Delete entries by path. One statement, at most `batch_bound`
    /// parameters, so the backend's variable limit is never hit.
    pub fn remove_batch(&self, paths: &[String]) -> Result<usize> {
        debug_assert!(paths.len() <= self.batch_bound);
        if paths.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "DELETE FROM entries WHERE path IN ({})",
            placeholders(paths.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let values: Vec<&dyn rusqlite::ToSql> =
            paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let removed = stmt.execute(values.as_slice())?;
        drop(stmt);
        drop(conn);
        self.bump_epoch();
        Ok(removed)
    }

    /// Read-only view of everything stored under `root`, taken in a single
    /// statement. The walk that follows holds no store lock.
    pub fn snapshot(&self, root: &Path) -> Result<FxHashMap<String, EntrySummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT path, size, modified FROM entries WHERE path LIKE ?1 ESCAPE '\\'",
        )?;
        let prefix = like_subtree(root);
        let mut map = FxHashMap::default();
        let rows = stmt.query_map([prefix], |row| {
            Ok((
                row.get::<_, String>(0)?,
                EntrySummary {
                    size: row.get::<_, i64>(1)? as u64,
                    modified: row.get(2)?,
                },
            ))
        })?;
        for row in rows {
            let (path, summary) = row?;
            map.insert(path, summary);
        }
        Ok(map)
    }

    /// Candidate rows for the query engine. `scope` restricts to a subtree;
    /// `name_like` is an optional index-assisted prefilter (always a
    /// superset of the final match set; the executor refines it).
    pub fn query_candidates(
        &self,
        scope: Option<&Path>,
        name_like: Option<&str>,
    ) -> Result<Vec<Entry>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT path, name, parent_path, size, modified, accessed, kind, last_seen
             FROM entries",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(scope) = scope {
            clauses.push("path LIKE ? ESCAPE '\\'");
            values.push(like_subtree(scope));
        }
        if let Some(like) = name_like {
            clauses.push("name LIKE ? ESCAPE '\\'");
            values.push(like.to_string());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_entry)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fetch one entry by path. Mostly a test convenience.
    pub fn get(&self, path: &str) -> Result<Option<Entry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT path, name, parent_path, size, modified, accessed, kind, last_seen
             FROM entries WHERE path = ?1",
        )?;
        let mut rows = stmt.query_map([path], row_to_entry)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn entry_count(&self, root: Option<&Path>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        match root {
            Some(root) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT count(*) FROM entries WHERE path LIKE ?1 ESCAPE '\\'",
                )?;
                Ok(stmt.query_row([like_subtree(root)], |row| row.get(0))?)
            }
            None => {
                let mut stmt = conn.prepare_cached("SELECT count(*) FROM entries")?;
                Ok(stmt.query_row([], |row| row.get(0))?)
            }
        }
    }

    /// Drop every entry under `root`. Used by full rebuilds.
    pub fn clear_root(&self, root: &Path) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("DELETE FROM entries WHERE path LIKE ?1 ESCAPE '\\'")?;
        let removed = stmt.execute([like_subtree(root)])?;
        drop(stmt);
        drop(conn);
        self.bump_epoch();
        Ok(removed)
    }

    /// Current generation for a root; 0 when the root is unknown.
    pub fn root_generation(&self, root: &Path) -> Result<Generation> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT generation FROM roots WHERE path = ?1")?;
        let generation = stmt
            .query_map([root_key(root)], |row| row.get::<_, Generation>(0))?
            .next()
            .transpose()?;
        Ok(generation.unwrap_or(0))
    }

    /// Record a completed pass: the new generation and the number of entries
    /// confirmed under the root.
    pub fn finish_pass(
        &self,
        root: &Path,
        generation: Generation,
        entry_count: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO roots (path, generation, last_indexed, entry_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                 generation = excluded.generation,
                 last_indexed = excluded.last_indexed,
                 entry_count = excluded.entry_count",
            params![root_key(root), generation, unix_now(), entry_count],
        )?;
        Ok(())
    }

    pub fn list_roots(&self) -> Result<Vec<RootInfo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT path, generation, last_indexed, entry_count
             FROM roots ORDER BY last_indexed DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RootInfo {
                path: row.get(0)?,
                generation: row.get(1)?,
                last_indexed: row.get(2)?,
                entry_count: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Forget a root and everything indexed under it.
    pub fn remove_root(&self, root: &Path) -> Result<usize> {
        let removed = self.clear_root(root)?;
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM roots WHERE path = ?1", [root_key(root)])?;
        Ok(removed)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        path: row.get(0)?,
        name: row.get(1)?,
        parent_path: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        modified: row.get(4)?,
        accessed: row.get(5)?,
        kind: EntryKind::from_code(row.get(6)?).unwrap_or(EntryKind::File),
        last_seen: row.get(7)?,
    })
}

fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

/// Escape LIKE metacharacters so stored paths match literally.
pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// LIKE pattern matching every path strictly below `root`. The root
/// directory itself is not an entry; its parent is the unindexed boundary.
fn like_subtree(root: &Path) -> String {
    let root = root.to_string_lossy();
    let root = root.trim_end_matches('/');
    format!("{}/%", escape_like(root))
}

fn root_key(root: &Path) -> String {
    let root = root.to_string_lossy();
    if root == "/" {
        root.into_owned()
    } else {
        root.trim_end_matches('/').to_string()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::IndexConfig;
    use std::path::PathBuf;

    fn store() -> EntryStore {
        EntryStore::open_in_memory(&IndexConfig::default()).unwrap()
    }

    fn entry(path: &str) -> Entry {
        let (parent, name) = path.rsplit_once('/').unwrap();
        Entry {
            path: path.to_string(),
            name: name.to_string(),
            parent_path: parent.to_string(),
            size: 42,
            modified: 1000,
            accessed: 1000,
            kind: EntryKind::File,
            last_seen: 0,
        }
    }

    #[test]
    fn test_put_batch_upserts() {
        let store = store();
        let written = store.put_batch(&[entry("/r/a.txt"), entry("/r/b.txt")], 1).unwrap();
        assert_eq!(written, 2);

        let mut updated = entry("/r/a.txt");
        updated.size = 99;
        store.put_batch(&[updated], 2).unwrap();

        let fetched = store.get("/r/a.txt").unwrap().unwrap();
        assert_eq!(fetched.size, 99);
        assert_eq!(fetched.last_seen, 2);
        assert_eq!(store.entry_count(None).unwrap(), 2);
    }

    #[test]
    fn test_remove_batch() {
        let store = store();
        store.put_batch(&[entry("/r/a"), entry("/r/b"), entry("/r/c")], 1).unwrap();
        let removed = store
            .remove_batch(&["/r/a".to_string(), "/r/c".to_string(), "/r/ghost".to_string()])
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("/r/a").unwrap().is_none());
        assert!(store.get("/r/b").unwrap().is_some());
    }

    #[test]
    fn test_mark_seen_batch() {
        let store = store();
        store.put_batch(&[entry("/r/a")], 1).unwrap();
        store.mark_seen_batch(&["/r/a".to_string()], 7).unwrap();
        assert_eq!(store.get("/r/a").unwrap().unwrap().last_seen, 7);
    }

    #[test]
    fn test_snapshot_scopes_to_subtree() {
        let store = store();
        store
            .put_batch(&[entry("/r/a"), entry("/r/sub/b"), entry("/rext/c")], 1)
            .unwrap();
        let snap = store.snapshot(&PathBuf::from("/r")).unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.contains_key("/r/a"));
        assert!(snap.contains_key("/r/sub/b"));
        // "/rext" shares the string prefix but is a different directory.
        assert!(!snap.contains_key("/rext/c"));
    }

    #[test]
    fn test_like_escaping() {
        let store = store();
        store.put_batch(&[entry("/r/100%_done/report"), entry("/r/other")], 1).unwrap();
        let snap = store.snapshot(&PathBuf::from("/r/100%_done")).unwrap();
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key("/r/100%_done/report"));
    }

    #[test]
    fn test_root_bookkeeping() {
        let store = store();
        let root = PathBuf::from("/r");
        assert_eq!(store.root_generation(&root).unwrap(), 0);
        store.finish_pass(&root, 3, 17).unwrap();
        assert_eq!(store.root_generation(&root).unwrap(), 3);

        let roots = store.list_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].path, "/r");
        assert_eq!(roots[0].entry_count, 17);
    }

    #[test]
    fn test_remove_root_clears_entries() {
        let store = store();
        store.put_batch(&[entry("/r/a"), entry("/s/b")], 1).unwrap();
        store.finish_pass(&PathBuf::from("/r"), 1, 1).unwrap();
        store.remove_root(&PathBuf::from("/r")).unwrap();
        assert!(store.get("/r/a").unwrap().is_none());
        assert!(store.get("/s/b").unwrap().is_some());
        assert!(store.list_roots().unwrap().is_empty());
    }

    #[test]
    fn test_write_epoch_advances() {
        let store = store();
        let before = store.write_epoch();
        store.put_batch(&[entry("/r/a")], 1).unwrap();
        assert!(store.write_epoch() > before);
    }

    #[test]
    fn test_corrupt_file_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        std::fs::write(&path, b"definitely not a database, just bytes").unwrap();
        let err = EntryStore::open(&path, &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, IndexError::StoreCorrupt(_)));
    }
}
