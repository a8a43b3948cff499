//! Event source adapter: a cold stream of [`QuerySnapshot`]s over a
//! [`ListenableQuery`].
//!
//! Lifecycle of one [`RefStream`]:
//!
//! ```text
//! created ──first poll──► registration scheduled ──task runs──► listening
//!    │                          │                                  │
//!    └──drop: nothing           └──drop: task skips listen         └──drop / error / end:
//!                                                                      stop_listening (once)
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use docsync_core::{
    ChangeCallback, ErrorCallback, ListenEvent, ListenMode, ListenableQuery, ListenerHandle,
    QuerySnapshot, Scheduler, SourceError, StreamError,
};
use futures::channel::mpsc;
use futures::{Stream, StreamExt};

type Delivery = Result<QuerySnapshot, SourceError>;

/// Shared between the stream and its scheduled registration task.
#[derive(Default)]
struct Registration {
    cancelled: bool,
    handle: Option<ListenerHandle>,
}

struct Active {
    registration: Arc<Mutex<Registration>>,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

/// Cold stream of native snapshots for one query.
///
/// Nothing is registered until the stream is first polled, and even then the
/// registration runs on the configured [`Scheduler`].
pub struct RefStream {
    query: Arc<dyn ListenableQuery>,
    event: ListenEvent,
    mode: ListenMode,
    scheduler: Arc<dyn Scheduler>,
    active: Option<Active>,
    finished: bool,
}

impl RefStream {
    pub fn new(
        query: Arc<dyn ListenableQuery>,
        event: ListenEvent,
        mode: ListenMode,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            query,
            event,
            mode,
            scheduler,
            active: None,
            finished: false,
        }
    }

    /// Returns `true` once the stream has been polled at least once.
    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    fn subscribe(&mut self) {
        let (tx, rx) = mpsc::unbounded::<Delivery>();
        let registration = Arc::new(Mutex::new(Registration::default()));

        let task_registration = Arc::clone(&registration);
        let query = Arc::clone(&self.query);
        let event = self.event;
        let mode = self.mode;

        self.scheduler.schedule(Box::new(move || {
            let mut reg = task_registration.lock().unwrap();
            if reg.cancelled {
                tracing::debug!(%event, "Unsubscribed before registration, skipping listen");
                return;
            }

            let change_tx = tx.clone();
            let on_change: ChangeCallback = Arc::new(move |snapshot| {
                // A closed channel means the consumer is gone; deregistration
                // is already on its way.
                let _ = change_tx.unbounded_send(Ok(snapshot));
            });
            let on_error: ErrorCallback = Arc::new(move |err| {
                let _ = tx.unbounded_send(Err(err));
            });

            match mode {
                ListenMode::Continuous => {
                    let handle = query.listen(event, on_change, on_error);
                    tracing::debug!(%event, handle = handle.0, "Native listener registered");
                    reg.handle = Some(handle);
                }
                ListenMode::OneShot => {
                    tracing::debug!(%event, "One-shot read requested");
                    query.once(event, on_change, on_error);
                }
            }
        }));

        self.active = Some(Active { registration, rx });
    }

    /// Deregister the native listener if one is registered. Safe to call any
    /// number of times.
    fn release(&mut self) {
        if let Some(active) = &self.active {
            let mut reg = active.registration.lock().unwrap();
            reg.cancelled = true;
            if let Some(handle) = reg.handle.take() {
                tracing::debug!(event = %self.event, handle = handle.0, "Native listener deregistered");
                self.query.stop_listening(self.event, handle);
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.release();
    }
}

impl Stream for RefStream {
    type Item = Result<QuerySnapshot, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if self.active.is_none() {
            self.subscribe();
        }

        let Some(active) = self.active.as_mut() else {
            return Poll::Ready(None);
        };
        match active.rx.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(snapshot))) => {
                if self.mode == ListenMode::OneShot {
                    self.finish();
                }
                Poll::Ready(Some(Ok(snapshot)))
            }
            Poll::Ready(Some(Err(err))) => {
                tracing::debug!(error = %err, "Native listener failed");
                self.finish();
                Poll::Ready(Some(Err(StreamError::Source(err))))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RefStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build a cold snapshot stream for `query`.
pub fn from_ref(
    query: Arc<dyn ListenableQuery>,
    event: ListenEvent,
    mode: ListenMode,
    scheduler: Arc<dyn Scheduler>,
) -> RefStream {
    RefStream::new(query, event, mode, scheduler)
}
