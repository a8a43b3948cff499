//! docsync-memory — an in-memory, query-ordered document collection.
//!
//! [`MemoryCollection`] implements both store traits from `docsync-core`:
//! it can be listened to like a realtime query and written to like a
//! collection. Useful for tests, demos, and replaying recorded write
//! scenarios. Nothing is persisted.

pub mod collection;
pub mod diff;
pub mod scenario;

pub use collection::{ListenerStats, MemoryCollection, OrderBy, WriteOp};
pub use diff::diff_ordered;
pub use scenario::Scenario;
