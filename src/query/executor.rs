use crate::index::store::EntryStore;
use crate::index::types::{Entry, Result};
use crate::query::parser::{Query, QueryScope};

/// Executes compiled queries against the entry store: candidate scan,
/// anchored matching, rank ordering, result cap.
pub struct QueryExecutor<'a> {
    store: &'a EntryStore,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(store: &'a EntryStore) -> Self {
        Self { store }
    }

    /// Run the query. Results come back exact-name matches first, then
    /// name-prefix matches, then the rest, ties in path order, capped at the
    /// query's limit.
    pub fn execute(&self, query: &Query) -> Result<Vec<Entry>> {
        let prefilter = query.name_prefilter();
        let candidates = self
            .store
            .query_candidates(query.scope_path.as_deref(), prefilter.as_deref())?;

        let mut ranked: Vec<(u8, Entry)> = Vec::new();
        for entry in candidates {
            let target = match query.scope {
                QueryScope::Name => entry.name.as_str(),
                QueryScope::Path => entry.path.as_str(),
            };
            if query.matches(target) {
                ranked.push((query.rank(&entry.name), entry));
            }
        }

        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
        ranked.truncate(query.limit);
        Ok(ranked.into_iter().map(|(_, entry)| entry).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{EntryKind, IndexConfig};
    use crate::query::parser::{SearchOptions, parse_query};
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
            last_seen: 1,
        }
    }

    fn seeded_store(paths: &[&str]) -> EntryStore {
        let store = EntryStore::open_in_memory(&IndexConfig::default()).unwrap();
        let entries: Vec<Entry> = paths.iter().map(|p| entry(p)).collect();
        for chunk in entries.chunks(store.batch_bound()) {
            store.put_batch(chunk, 1).unwrap();
        }
        store
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_wildcard_matches_names_anchored() {
        let store = seeded_store(&["/r/a.py", "/r/b.py.bak", "/r/sub/c.py"]);
        let q = parse_query("*.py", &SearchOptions::default()).unwrap();
        let results = QueryExecutor::new(&store).execute(&q).unwrap();
        assert_eq!(names(&results), vec!["a.py", "c.py"]);
    }

    #[test]
    fn test_rank_order_exact_prefix_other() {
        let store = seeded_store(&["/r/domain.rs", "/r/main", "/r/main.rs"]);
        let q = parse_query("main", &SearchOptions::default()).unwrap();
        let results = QueryExecutor::new(&store).execute(&q).unwrap();
        assert_eq!(names(&results), vec!["main", "main.rs", "domain.rs"]);
    }

    #[test]
    fn test_ties_break_on_path_order() {
        let store = seeded_store(&["/r/z/note.txt", "/r/a/note.txt"]);
        let q = parse_query("*.txt", &SearchOptions::default()).unwrap();
        let results = QueryExecutor::new(&store).execute(&q).unwrap();
        let paths: Vec<_> = results.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/r/a/note.txt", "/r/z/note.txt"]);
    }

    #[test]
    fn test_limit_caps_results() {
        let paths: Vec<String> = (0..20).map(|i| format!("/r/file{i:02}.log")).collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let store = seeded_store(&refs);
        let options = SearchOptions { limit: 5, ..SearchOptions::default() };
        let q = parse_query("*.log", &options).unwrap();
        let results = QueryExecutor::new(&store).execute(&q).unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_scope_path_restricts_subtree() {
        let store = seeded_store(&["/r/one/x.c", "/r/two/x.c"]);
        let options = SearchOptions {
            scope_path: Some(PathBuf::from("/r/one")),
            ..SearchOptions::default()
        };
        let q = parse_query("*.c", &options).unwrap();
        let results = QueryExecutor::new(&store).execute(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/r/one/x.c");
    }

    #[test]
    fn test_path_scope_matches_full_path() {
        let store = seeded_store(&["/projects/alpha/readme.md", "/other/readme.md"]);
        let options = SearchOptions {
            scope: QueryScope::Path,
            ..SearchOptions::default()
        };
        let q = parse_query("*alpha*", &options).unwrap();
        let results = QueryExecutor::new(&store).execute(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/projects/alpha/readme.md");
    }
}
