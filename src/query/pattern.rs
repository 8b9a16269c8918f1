//! Search-term compilation.
//!
//! The pattern language has exactly two metacharacters: `*` (zero or more
//! characters) and `?` (exactly one). A term containing either is matched
//! anchored over the whole candidate string, so `*.py` matches `main.py` but
//! not `main.py.bak`. A bare term matches as a substring, which is what a
//! filename search box is expected to do. `re:/…/` terms are raw regex.

use crate::index::store::escape_like;
use crate::index::types::{IndexError, Result};
use regex::RegexBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermKind {
    /// No metacharacters; substring semantics.
    Substring,
    /// Contains `*` or `?`; anchored as written.
    Wildcard,
    /// `re:/…/`; anchored as written.
    Regex,
}

/// One compiled search term.
#[derive(Debug, Clone)]
pub struct CompiledTerm {
    regex: regex::Regex,
    raw: String,
    kind: TermKind,
}

impl CompiledTerm {
    pub fn compile(term: &str, case_sensitive: bool) -> Result<Self> {
        if let Some(body) = term.strip_prefix("re:/").and_then(|r| r.strip_suffix('/')) {
            let regex = RegexBuilder::new(&format!("^(?:{body})$"))
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| IndexError::InvalidQuery(format!("bad regex {term:?}: {e}")))?;
            return Ok(Self {
                regex,
                raw: term.to_string(),
                kind: TermKind::Regex,
            });
        }

        let kind = if term.contains(['*', '?']) {
            TermKind::Wildcard
        } else {
            TermKind::Substring
        };
        let body = match kind {
            TermKind::Wildcard => wildcard_to_regex(term),
            _ => format!(".*{}.*", regex::escape(term)),
        };
        let regex = RegexBuilder::new(&format!("^(?:{body})$"))
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| IndexError::InvalidQuery(format!("bad pattern {term:?}: {e}")))?;
        Ok(Self {
            regex,
            raw: term.to_string(),
            kind,
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// The original text for substring terms; ranking compares it against
    /// entry names.
    pub fn literal(&self) -> Option<&str> {
        match self.kind {
            TermKind::Substring => Some(&self.raw),
            _ => None,
        }
    }

    /// An index-assisted SQL LIKE prefilter that is a strict superset of
    /// this term's matches, or None when LIKE can't express one safely.
    /// LIKE is ASCII-case-insensitive, so non-ASCII terms are excluded.
    pub(crate) fn like_pattern(&self) -> Option<String> {
        if !self.raw.is_ascii() {
            return None;
        }
        match self.kind {
            TermKind::Substring => Some(format!("%{}%", escape_like(&self.raw))),
            TermKind::Wildcard => {
                let mut out = String::with_capacity(self.raw.len() + 2);
                for ch in self.raw.chars() {
                    match ch {
                        '*' => out.push('%'),
                        '?' => out.push('_'),
                        '%' | '_' | '\\' => {
                            out.push('\\');
                            out.push(ch);
                        }
                        _ => out.push(ch),
                    }
                }
                Some(out)
            }
            TermKind::Regex => None,
        }
    }
}

/// Translate a wildcard into an unanchored regex body. Only `*` and `?` are
/// meta; everything else matches literally.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(ch.encode_utf8(&mut buf))),
        }
    }
    out
}
