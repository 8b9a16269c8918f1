//! # FSI - Instant Filename Search
//!
//! FSI is a local file-metadata indexer that powers instant filename and
//! path search over large filesystem trees, in the spirit of "Everything".
//! It keeps a persistent per-user index and reconciles it incrementally
//! against the live filesystem instead of re-walking on every change.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Entry store (SQLite), snapshot differencer, reconciler
//! - [`query`] - Wildcard pattern compilation, parsing, and execution
//! - [`monitor`] - Polling change monitor with per-root debouncing
//! - [`engine`] - The [`engine::FileIndex`] facade front ends talk to
//! - [`output`] - Result formatting for terminal front ends
//! - [`utils`] - Per-user data directory and config handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use fsi::engine::FileIndex;
//! use fsi::query::SearchOptions;
//! use std::path::PathBuf;
//!
//! let mut index = FileIndex::open()?;
//! index.build_index(&[PathBuf::from("/home/user")], false)?;
//!
//! let results = index.search("*.py", &SearchOptions::default())?;
//! for entry in results {
//!     println!("{}", entry.path);
//! }
//! ```
//!
//! ## Consistency model
//!
//! All writes go through the entry store in bounded, transactional batches;
//! readers always observe the last committed batch, never a partial one. A
//! per-root generation counter (`last_seen`) distinguishes "confirmed absent"
//! from "not yet re-scanned".

pub mod engine;
pub mod index;
pub mod monitor;
pub mod output;
pub mod query;
pub mod utils;

pub use engine::FileIndex;
pub use index::types::{Entry, EntryKind, IndexError};
pub use query::SearchOptions;
