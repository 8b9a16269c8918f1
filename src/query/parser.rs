use crate::index::types::{IndexError, Result};
use crate::query::pattern::CompiledTerm;
use std::path::PathBuf;

/// Result cap applied when the caller does not supply one.
pub const DEFAULT_RESULT_LIMIT: usize = 1000;

/// What a term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryScope {
    /// Base name only (the usual search-box behavior).
    #[default]
    Name,
    /// Full absolute path.
    Path,
}

/// Caller-supplied search options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub scope: QueryScope,
    /// Restrict results to entries under this directory.
    pub scope_path: Option<PathBuf>,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            scope: QueryScope::Name,
            scope_path: None,
            limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

/// A parsed, compiled query: an OR of AND-groups of terms.
#[derive(Debug, Clone)]
pub struct Query {
    groups: Vec<Vec<CompiledTerm>>,
    pub scope: QueryScope,
    pub case_sensitive: bool,
    pub scope_path: Option<PathBuf>,
    pub limit: usize,
}

impl Query {
    /// True when any AND-group matches the candidate in full.
    pub fn matches(&self, candidate: &str) -> bool {
        self.groups
            .iter()
            .any(|group| group.iter().all(|term| term.is_match(candidate)))
    }

    /// Rank tier for result ordering: 0 = a substring term equals the name,
    /// 1 = a substring term prefixes it, 2 = everything else. Wildcard and
    /// regex terms carry no literal and always rank 2; ties break on path.
    pub fn rank(&self, name: &str) -> u8 {
        let mut best = 2;
        for term in self.groups.iter().flatten() {
            let Some(literal) = term.literal() else { continue };
            let tier = if self.case_sensitive {
                rank_tier(name, literal)
            } else {
                rank_tier(&name.to_lowercase(), &literal.to_lowercase())
            };
            best = best.min(tier);
            if best == 0 {
                break;
            }
        }
        best
    }

    /// LIKE prefilter for the name column: any one term of an AND-group is a
    /// necessary condition, so this is always a superset of the matches.
    /// Only usable with a single group and name scope.
    pub(crate) fn name_prefilter(&self) -> Option<String> {
        if self.scope != QueryScope::Name || self.groups.len() != 1 {
            return None;
        }
        self.groups[0].iter().find_map(|term| term.like_pattern())
    }
}

fn rank_tier(name: &str, literal: &str) -> u8 {
    if name == literal {
        0
    } else if name.starts_with(literal) {
        1
    } else {
        2
    }
}

/// Parse and compile a search pattern. Terms separated by whitespace AND
/// together; `OR` (or `|`) between terms introduces alternation, binding
/// looser than AND. An empty pattern or a non-positive limit is rejected
/// before the store is touched.
pub fn parse_query(pattern: &str, options: &SearchOptions) -> Result<Query> {
    if options.limit == 0 {
        return Err(IndexError::InvalidQuery("limit must be positive".into()));
    }

    let mut groups: Vec<Vec<CompiledTerm>> = Vec::new();
    let mut current: Vec<CompiledTerm> = Vec::new();

    for token in pattern.split_whitespace() {
        if token == "OR" || token == "|" {
            if current.is_empty() {
                return Err(IndexError::InvalidQuery("dangling OR operator".into()));
            }
            groups.push(std::mem::take(&mut current));
        } else {
            current.push(CompiledTerm::compile(token, options.case_sensitive)?);
        }
    }

    if current.is_empty() {
        return Err(IndexError::InvalidQuery(if groups.is_empty() {
            "empty pattern".into()
        } else {
            "dangling OR operator".into()
        }));
    }
    groups.push(current);

    Ok(Query {
        groups,
        scope: options.scope,
        case_sensitive: options.case_sensitive,
        scope_path: options.scope_path.clone(),
        limit: options.limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_rejected() {
        let err = parse_query("", &SearchOptions::default()).unwrap_err();
        assert!(matches!(err, IndexError::InvalidQuery(_)));
        let err = parse_query("   ", &SearchOptions::default()).unwrap_err();
        assert!(matches!(err, IndexError::InvalidQuery(_)));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let options = SearchOptions { limit: 0, ..SearchOptions::default() };
        assert!(parse_query("x", &options).is_err());
    }

    #[test]
    fn test_terms_and_together() {
        let q = parse_query("report *.pdf", &SearchOptions::default()).unwrap();
        assert!(q.matches("report-2024.pdf"));
        assert!(!q.matches("report-2024.txt"));
        assert!(!q.matches("summary.pdf"));
    }

    #[test]
    fn test_or_operator() {
        for pattern in ["*.rs OR *.py", "*.rs | *.py"] {
            let q = parse_query(pattern, &SearchOptions::default()).unwrap();
            assert!(q.matches("lib.rs"), "{pattern}");
            assert!(q.matches("main.py"), "{pattern}");
            assert!(!q.matches("notes.md"), "{pattern}");
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let q = parse_query("draft *.doc OR *.md", &SearchOptions::default()).unwrap();
        assert!(q.matches("draft-v2.doc"));
        assert!(q.matches("anything.md"));
        assert!(!q.matches("final.doc"));
    }

    #[test]
    fn test_dangling_or_rejected() {
        assert!(parse_query("OR x", &SearchOptions::default()).is_err());
        assert!(parse_query("x OR", &SearchOptions::default()).is_err());
        assert!(parse_query("x OR OR y", &SearchOptions::default()).is_err());
    }

    #[test]
    fn test_rank_tiers() {
        let q = parse_query("main", &SearchOptions::default()).unwrap();
        assert_eq!(q.rank("main"), 0);
        assert_eq!(q.rank("MAIN"), 0); // insensitive by default
        assert_eq!(q.rank("main.py"), 1);
        assert_eq!(q.rank("domain.py"), 2);

        let q = parse_query("*.py", &SearchOptions::default()).unwrap();
        assert_eq!(q.rank("main.py"), 2);
    }

    #[test]
    fn test_prefilter_only_for_single_name_group() {
        let q = parse_query("main", &SearchOptions::default()).unwrap();
        assert_eq!(q.name_prefilter().unwrap(), "%main%");

        let q = parse_query("a OR b", &SearchOptions::default()).unwrap();
        assert!(q.name_prefilter().is_none());

        let options = SearchOptions { scope: QueryScope::Path, ..SearchOptions::default() };
        let q = parse_query("main", &options).unwrap();
        assert!(q.name_prefilter().is_none());
    }
}
