//! [`Collection`], the consumer-facing handle for one queried collection.
//!
//! Streams are built against the query; writes go to the collection itself.
//! Every stream method returns a [`Multicast`]: subscribe to it as many times
//! as needed, and all observers share one native listener.

use std::sync::Arc;

use docsync_core::{
    AsapScheduler, ChangeAction, ChangeFilter, CollectionWriter, DocumentData, DocumentRef,
    ListenConfig, ListenEvent, ListenMode, ListenableQuery, OperationTarget, OrderedDocument,
    Scheduler, StoreCapabilities, StreamError, UsageError, WriteError,
};
use futures::StreamExt;

use crate::changes;
use crate::from_ref::{from_ref, RefStream};
use crate::multicast::{Multicast, SourceStream};

/// A collection reference plus the query that streams read from.
#[derive(Clone)]
pub struct Collection {
    writer: Arc<dyn CollectionWriter>,
    query: Arc<dyn ListenableQuery>,
    scheduler: Arc<dyn Scheduler>,
    capabilities: StoreCapabilities,
}

impl Collection {
    /// Build a collection over separate write and query handles.
    ///
    /// Store capabilities are read from the query once, here.
    pub fn new(writer: Arc<dyn CollectionWriter>, query: Arc<dyn ListenableQuery>) -> Self {
        let capabilities = query.capabilities();
        Self {
            writer,
            query,
            scheduler: Arc::new(AsapScheduler),
            capabilities,
        }
    }

    /// Build a collection over a store that is both the query and the writer.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ListenableQuery + CollectionWriter + 'static,
    {
        let writer: Arc<dyn CollectionWriter> = store.clone();
        let query: Arc<dyn ListenableQuery> = store;
        Self::new(writer, query)
    }

    /// Schedule listener registration on `scheduler` instead of the default.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Override the capabilities resolved at construction.
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    /// Collection path.
    pub fn path(&self) -> &str {
        self.writer.path()
    }

    /// Reference to the document `id` in this collection.
    pub fn doc(&self, id: &str) -> DocumentRef {
        DocumentRef::new(self.path(), id)
    }

    // ─── Streams ──────────────────────────────────────────────────────────────

    fn shared<T, F>(
        &self,
        config: &ListenConfig,
        event: ListenEvent,
        build: F,
    ) -> Result<Multicast<T>, UsageError>
    where
        T: Clone + Send + 'static,
        F: Fn(RefStream, ChangeFilter) -> SourceStream<T> + Send + Sync + 'static,
    {
        self.capabilities.check(config.mode)?;

        let query = Arc::clone(&self.query);
        let scheduler = Arc::clone(&self.scheduler);
        let mode = config.mode;
        let filter = config.kinds.clone();
        tracing::debug!(
            path = self.path(),
            %event,
            %mode,
            kinds = ?filter.effective_kinds(),
            "Stream opened"
        );
        Ok(Multicast::new(move || {
            let source = from_ref(Arc::clone(&query), event, mode, Arc::clone(&scheduler));
            build(source, filter.clone())
        }))
    }

    /// Every native tick as unfiltered, unsorted actions.
    pub fn doc_changes(
        &self,
        config: ListenConfig,
    ) -> Result<Multicast<Vec<ChangeAction>>, UsageError> {
        self.shared(&config, ListenEvent::Changes, |source, _| {
            changes::doc_changes(source)
        })
    }

    /// Action batches as they occur, restricted to the configured kinds.
    pub fn state_changes(
        &self,
        config: ListenConfig,
    ) -> Result<Multicast<Vec<ChangeAction>>, UsageError> {
        self.shared(&config, ListenEvent::Changes, changes::state_changes)
    }

    /// Accumulated history of [`Collection::state_changes`].
    pub fn audit_trail(
        &self,
        config: ListenConfig,
    ) -> Result<Multicast<Vec<ChangeAction>>, UsageError> {
        self.shared(&config, ListenEvent::Changes, changes::audit_trail)
    }

    /// The collection in query order, re-emitted after every change.
    pub fn snapshot_changes(
        &self,
        config: ListenConfig,
    ) -> Result<Multicast<Vec<OrderedDocument>>, UsageError> {
        self.shared(&config, ListenEvent::Changes, changes::sorted_changes)
    }

    /// Document data in query order.
    pub fn value_changes(
        &self,
        config: ListenConfig,
    ) -> Result<Multicast<Vec<DocumentData>>, UsageError> {
        self.shared(&config, ListenEvent::Changes, changes::value_changes)
    }

    /// Read the collection once, in query order.
    pub async fn get_once(&self) -> Result<Vec<OrderedDocument>, StreamError> {
        let config = ListenConfig::new().mode(ListenMode::OneShot);
        let stream = self.shared(&config, ListenEvent::Value, changes::sorted_changes)?;
        let mut sub = stream.subscribe();
        match sub.next().await {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    // ─── Writes ───────────────────────────────────────────────────────────────

    /// Add a document under a generated id.
    pub async fn push(&self, data: DocumentData) -> Result<DocumentRef, WriteError> {
        let doc = self.writer.add(data).await?;
        tracing::debug!(path = self.path(), id = %doc.id, "Document pushed");
        Ok(doc)
    }

    /// Create or overwrite the target document.
    pub async fn set(
        &self,
        target: impl Into<OperationTarget>,
        data: DocumentData,
    ) -> Result<(), WriteError> {
        let target = target.into();
        let id = target.resolve(self.path())?;
        self.writer.set(id, data).await
    }

    /// Merge `data` into the target document.
    pub async fn update(
        &self,
        target: impl Into<OperationTarget>,
        data: DocumentData,
    ) -> Result<(), WriteError> {
        let target = target.into();
        let id = target.resolve(self.path())?;
        self.writer.update(id, data).await
    }

    /// Delete the target document, or every document when `target` is `None`.
    pub async fn remove(&self, target: Option<OperationTarget>) -> Result<(), WriteError> {
        match target {
            Some(target) => {
                let id = target.resolve(self.path())?;
                self.writer.delete(id).await
            }
            None => {
                tracing::debug!(path = self.path(), "Clearing collection");
                self.writer.clear().await
            }
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
