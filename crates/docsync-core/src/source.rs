//! Store-facing traits: the narrow interface the pipeline needs from a remote
//! document store.
//!
//! Implementations include `docsync_memory::MemoryCollection`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ListenMode;
use crate::error::{SourceError, UsageError, WriteError};
use crate::types::{DocumentData, DocumentRef, QuerySnapshot};

/// Which native event stream a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListenEvent {
    /// Incremental document changes.
    Changes,
    /// Whole-collection value snapshots.
    Value,
}

impl std::fmt::Display for ListenEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Changes => write!(f, "changes"),
            Self::Value => write!(f, "value"),
        }
    }
}

/// Opaque token returned by [`ListenableQuery::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

/// Called once per native tick with everything that tick delivered.
pub type ChangeCallback = Arc<dyn Fn(QuerySnapshot) + Send + Sync>;

/// Called when the native listener fails. No further ticks follow.
pub type ErrorCallback = Arc<dyn Fn(SourceError) + Send + Sync>;

/// What a store can do, resolved once and passed around by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCapabilities {
    /// Continuous listeners are supported.
    pub realtime: bool,
    /// One-shot reads are supported.
    pub one_shot: bool,
}

impl StoreCapabilities {
    /// Everything supported.
    pub fn full() -> Self {
        Self {
            realtime: true,
            one_shot: true,
        }
    }

    /// Only one-shot reads (e.g. a server-side render pass).
    pub fn one_shot_only() -> Self {
        Self {
            realtime: false,
            one_shot: true,
        }
    }

    /// Returns `true` if `mode` can be served.
    pub fn supports(&self, mode: ListenMode) -> bool {
        match mode {
            ListenMode::Continuous => self.realtime,
            ListenMode::OneShot => self.one_shot,
        }
    }

    /// Reject a listen mode this store cannot serve.
    pub fn check(&self, mode: ListenMode) -> Result<(), UsageError> {
        if self.supports(mode) {
            Ok(())
        } else {
            Err(UsageError::UnsupportedMode {
                mode: mode.to_string(),
            })
        }
    }
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// A query reference that can be listened to.
///
/// Callbacks may be invoked from inside `listen`/`once` (initial state) or
/// later from whatever context commits writes.
pub trait ListenableQuery: Send + Sync {
    /// Capabilities of the backing store.
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::full()
    }

    /// Register a continuous listener. The first tick carries the full
    /// current result set as `added` changes.
    fn listen(
        &self,
        event: ListenEvent,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    ) -> ListenerHandle;

    /// Deliver the current result set exactly once; nothing stays registered.
    fn once(&self, event: ListenEvent, on_change: ChangeCallback, on_error: ErrorCallback);

    /// Deregister a listener. Unknown or already-removed handles are ignored.
    fn stop_listening(&self, event: ListenEvent, handle: ListenerHandle);
}

/// Write side of a collection.
#[async_trait]
pub trait CollectionWriter: Send + Sync {
    /// Collection path (e.g. `"animals"`).
    fn path(&self) -> &str;

    /// Add a document under a store-generated id.
    async fn add(&self, data: DocumentData) -> Result<DocumentRef, WriteError>;

    /// Create or overwrite a document.
    async fn set(&self, id: &str, data: DocumentData) -> Result<(), WriteError>;

    /// Merge fields into an existing document.
    async fn update(&self, id: &str, data: DocumentData) -> Result<(), WriteError>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, id: &str) -> Result<(), WriteError>;

    /// Delete every document in the collection.
    async fn clear(&self) -> Result<(), WriteError>;
}
