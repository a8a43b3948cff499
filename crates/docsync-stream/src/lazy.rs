//! [`LazyCollection`]: a [`Collection`] whose store client is built on first
//! use.
//!
//! Streams taken from a lazy collection are available immediately; the client
//! is constructed when the first of them is polled. Initialization failures
//! and capability errors arrive through the stream's error channel because
//! there is no synchronous point to report them at.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use docsync_core::{ChangeAction, DocumentData, ListenConfig, OrderedDocument, StreamError, UsageError};
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use tokio::sync::OnceCell;

use crate::collection::Collection;
use crate::multicast::Multicast;

type Init = Arc<dyn Fn() -> BoxFuture<'static, Result<Collection, StreamError>> + Send + Sync>;

/// Deferred [`Collection`].
#[derive(Clone)]
pub struct LazyCollection {
    cell: Arc<OnceCell<Collection>>,
    init: Init,
}

impl LazyCollection {
    /// Wrap an async constructor. It runs at most once successfully; a failed
    /// attempt is retried by the next caller.
    pub fn new<F, Fut, E>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Collection, E>> + Send + 'static,
        E: Display,
    {
        let init: Init = Arc::new(move || {
            init()
                .map(|result| {
                    result.map_err(|e| {
                        tracing::warn!(error = %e, "Collection initialisation failed");
                        StreamError::Initialization(e.to_string())
                    })
                })
                .boxed()
        });
        Self {
            cell: Arc::new(OnceCell::new()),
            init,
        }
    }

    /// Wrap an already-built collection.
    pub fn ready(collection: Collection) -> Self {
        let init: Init = Arc::new(|| {
            futures::future::ready(Err(StreamError::Initialization(
                "collection was provided up front".into(),
            )))
            .boxed()
        });
        Self {
            cell: Arc::new(OnceCell::new_with(Some(collection))),
            init,
        }
    }

    /// Returns `true` once the collection has been built.
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// The collection, building it if needed.
    pub async fn get(&self) -> Result<&Collection, StreamError> {
        self.cell
            .get_or_try_init(|| {
                tracing::debug!("Initialising collection on first use");
                (self.init)()
            })
            .await
    }

    fn deferred<T, F>(&self, open: F) -> Multicast<T>
    where
        T: Clone + Send + 'static,
        F: Fn(&Collection) -> Result<Multicast<T>, UsageError> + Send + Sync + 'static,
    {
        let this = self.clone();
        let open = Arc::new(open);
        Multicast::new(move || {
            let this = this.clone();
            let open = Arc::clone(&open);
            stream::once(async move {
                let collection = this.get().await?;
                let shared = (*open)(collection)?;
                Ok::<_, StreamError>(shared.subscribe())
            })
            .flat_map(|opened| match opened {
                Ok(sub) => sub.boxed(),
                Err(err) => stream::iter([Err(err)]).boxed(),
            })
            .boxed()
        })
    }

    pub fn doc_changes(&self, config: ListenConfig) -> Multicast<Vec<ChangeAction>> {
        self.deferred(move |c| c.doc_changes(config.clone()))
    }

    pub fn state_changes(&self, config: ListenConfig) -> Multicast<Vec<ChangeAction>> {
        self.deferred(move |c| c.state_changes(config.clone()))
    }

    pub fn audit_trail(&self, config: ListenConfig) -> Multicast<Vec<ChangeAction>> {
        self.deferred(move |c| c.audit_trail(config.clone()))
    }

    pub fn snapshot_changes(&self, config: ListenConfig) -> Multicast<Vec<OrderedDocument>> {
        self.deferred(move |c| c.snapshot_changes(config.clone()))
    }

    pub fn value_changes(&self, config: ListenConfig) -> Multicast<Vec<DocumentData>> {
        self.deferred(move |c| c.value_changes(config.clone()))
    }
}

impl std::fmt::Debug for LazyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCollection")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
