//! Error types for the change-stream pipeline.

use thiserror::Error;

/// Errors reported by the remote store's native listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Disconnected: {0}")]
    Disconnected(String),

    #[error("Source error: {0}")]
    Other(String),
}

/// Errors delivered through a change stream's error channel.
///
/// Every variant is terminal: the stream yields the error once and then ends.
/// The type is `Clone` because a multicast stream hands the same error to
/// every attached observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The native listener reported an error.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A raw change could not be classified.
    #[error("Malformed change at position {index} in batch: {reason}")]
    MalformedChange { index: usize, reason: String },

    /// A batch was offered to a projection that was already disposed.
    #[error("Projection disposed")]
    Disposed,

    /// A lazily-constructed store client failed to initialise.
    #[error("Initialisation failed: {0}")]
    Initialization(String),

    /// A deferred stream was requested with a configuration the store
    /// rejected. Only lazily-opened streams report usage errors this way.
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),
}

impl StreamError {
    /// Returns `true` if the error originated in the remote store.
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns `true` if the error came from a malformed change record.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedChange { .. })
    }

    /// Returns `true` if the stream could not be opened at all.
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Initialization(_) | Self::Usage(_))
    }
}

/// Configuration errors, reported synchronously when a stream is requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Unknown change kind: '{0}' (expected added, modified or removed)")]
    UnknownChangeKind(String),

    #[error("Unknown listen mode: '{0}' (expected continuous or one-shot)")]
    UnknownListenMode(String),

    #[error("At least one change kind must be requested")]
    EmptyKindSet,

    #[error("Listen mode '{mode}' is not supported by this store")]
    UnsupportedMode { mode: String },
}

/// Errors from write operations on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("Document '{id}' not found")]
    NotFound { id: String },

    #[error("Reference '{path}/{id}' does not belong to collection '{collection}'")]
    ForeignReference {
        path: String,
        id: String,
        collection: String,
    },

    #[error("Snapshot has no document id")]
    MissingId,

    #[error("Store error: {0}")]
    Source(#[from] SourceError),
}
