//! docsync-core — foundation for the ordered change-stream reconciliation engine.
//!
//! # Architecture
//!
//! ```text
//! ListenableQuery (native store)
//!        │  QuerySnapshot { documents, changes: [RawChange] }
//!        ▼
//! classifier        (RawChange → ChangeAction, kind filter, empty-batch suppression)
//!        │
//!        ├──► SortedProjection  (hint-chasing insert/remove, atomic per batch)
//!        └──► AuditLog          (append-only history)
//! ```
//!
//! Streaming, multicasting and the collection facade live in `docsync-stream`.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod projection;
pub mod scheduler;
pub mod source;
pub mod types;

pub use audit::AuditLog;
pub use classifier::{classify, classify_all, classify_batch};
pub use config::{ChangeFilter, ListenConfig, ListenMode};
pub use error::{SourceError, StreamError, UsageError, WriteError};
pub use projection::{ProjectionState, SortedProjection};
pub use scheduler::{AsapScheduler, ImmediateScheduler, ManualScheduler, Scheduler, Task};
pub use source::{
    ChangeCallback, CollectionWriter, ErrorCallback, ListenEvent, ListenableQuery,
    ListenerHandle, StoreCapabilities,
};
pub use types::{
    ChangeAction, ChangeKind, DocumentData, DocumentRef, DocumentSnapshot, OperationTarget,
    OrderedDocument, QuerySnapshot, RawChange,
};
