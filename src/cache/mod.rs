//! Versioned response cache.
//!
//! This module owns the two live cache namespaces:
//! - a static namespace filled all-or-nothing at install
//! - a dynamic namespace filled lazily from successful network responses
//!
//! Entries are keyed by request identity and never expire; they disappear only
//! when their namespace is pruned after a version bump.

mod layer;
mod storage;
mod traits;

pub use layer::{CacheNames, CacheStore, PruneReport};
pub use storage::{CacheStorage, SqliteStorage};
