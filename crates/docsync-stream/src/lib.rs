//! docsync-stream — lazy, shareable change streams over a listenable store.
//!
//! # Pipeline
//!
//! ```text
//! from_ref (cold, scheduled registration)
//!    │ QuerySnapshot per native tick
//!    ▼
//! changes::{doc_changes, state_changes, audit_trail, sorted_changes, value_changes}
//!    │
//!    ▼
//! Multicast (one upstream run shared by every observer, torn down at zero)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docsync_core::ListenConfig;
//! use docsync_memory::{MemoryCollection, OrderBy};
//! use docsync_stream::Collection;
//! use futures::StreamExt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryCollection::new("animals", OrderBy::field("name")));
//! let animals = Collection::from_store(store);
//!
//! let mut sorted = animals.snapshot_changes(ListenConfig::new())?.subscribe();
//! while let Some(docs) = sorted.next().await {
//!     println!("{} animals", docs?.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod changes;
pub mod collection;
pub mod from_ref;
pub mod lazy;
pub mod multicast;

pub use collection::Collection;
pub use from_ref::{from_ref, RefStream};
pub use lazy::LazyCollection;
pub use multicast::{Multicast, SourceStream, Subscription};
