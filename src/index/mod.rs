pub mod differ;
pub mod ops;
pub mod reconciler;
pub mod stats;
pub mod store;
pub mod types;

pub use reconciler::Reconciler;
pub use store::EntryStore;
pub use types::{Delta, Entry, EntryKind, IndexConfig, IndexError};
