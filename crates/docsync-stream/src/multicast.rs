//! Stream multiplexer: one upstream, many observers.
//!
//! A [`Multicast`] owns a factory for its upstream stream. The first observer
//! to poll starts the upstream; every later observer attaches to the same run
//! and sees values from that point on (no replay). When the last observer
//! drops, the upstream is dropped with it, which tears down the native
//! listener and discards any state the upstream held. The next observer
//! starts a fresh run.
//!
//! There is no background task: whichever observer polls drives the upstream
//! and fans each item out to every attached observer's queue. The upstream is
//! polled with a waker that wakes all observers, so progress never depends on
//! which observer happened to poll last.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use docsync_core::StreamError;
use futures::stream::BoxStream;
use futures::task::ArcWake;
use futures::{Stream, StreamExt};

/// The boxed upstream a [`Multicast`] drives.
pub type SourceStream<T> = BoxStream<'static, Result<T, StreamError>>;

type Factory<T> = Arc<dyn Fn() -> SourceStream<T> + Send + Sync>;

/// Wakes every observer that is waiting on the upstream.
#[derive(Default)]
struct WakerSet {
    wakers: Mutex<HashMap<u64, Waker>>,
}

impl WakerSet {
    fn register(&self, id: u64, waker: &Waker) {
        let mut wakers = self.wakers.lock().unwrap();
        match wakers.get_mut(&id) {
            Some(existing) if existing.will_wake(waker) => {}
            Some(existing) => *existing = waker.clone(),
            None => {
                wakers.insert(id, waker.clone());
            }
        }
    }

    fn remove(&self, id: u64) {
        self.wakers.lock().unwrap().remove(&id);
    }

    fn wake_others(&self, id: u64) {
        let others: Vec<Waker> = {
            let mut wakers = self.wakers.lock().unwrap();
            let ids: Vec<u64> = wakers.keys().copied().filter(|k| *k != id).collect();
            ids.into_iter().filter_map(|k| wakers.remove(&k)).collect()
        };
        for waker in others {
            waker.wake();
        }
    }
}

impl ArcWake for WakerSet {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let all: Vec<Waker> = arc_self.wakers.lock().unwrap().drain().map(|(_, w)| w).collect();
        for waker in all {
            waker.wake();
        }
    }
}

struct Observer<T> {
    queue: VecDeque<Result<T, StreamError>>,
    closed: bool,
}

struct Shared<T> {
    source: Option<SourceStream<T>>,
    observers: HashMap<u64, Observer<T>>,
    next_id: u64,
    connections: u64,
}

impl<T: Clone> Shared<T> {
    fn attach(&mut self, factory: &Factory<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.insert(
            id,
            Observer {
                queue: VecDeque::new(),
                closed: false,
            },
        );
        if self.source.is_none() {
            self.source = Some(factory());
            self.connections += 1;
            tracing::debug!(connection = self.connections, "Upstream connected");
        }
        tracing::trace!(observer = id, observers = self.observers.len(), "Observer attached");
        id
    }

    fn open_observers(&mut self) -> impl Iterator<Item = &mut Observer<T>> {
        self.observers.values_mut().filter(|o| !o.closed)
    }

    /// Drive the upstream until it is pending or terminated. Returns `true`
    /// if anything was fanned out. A terminated upstream is handed back so the
    /// caller can drop it outside the lock.
    fn pump(&mut self, cx: &mut Context<'_>) -> (bool, Option<SourceStream<T>>) {
        let mut delivered = false;
        loop {
            let Some(source) = self.source.as_mut() else {
                return (delivered, None);
            };
            match source.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    for observer in self.open_observers() {
                        observer.queue.push_back(Ok(value.clone()));
                    }
                    delivered = true;
                }
                Poll::Ready(Some(Err(err))) => {
                    tracing::debug!(error = %err, "Upstream failed, closing all observers");
                    for observer in self.open_observers() {
                        observer.queue.push_back(Err(err.clone()));
                        observer.closed = true;
                    }
                    return (true, self.source.take());
                }
                Poll::Ready(None) => {
                    tracing::debug!("Upstream completed, closing all observers");
                    for observer in self.open_observers() {
                        observer.closed = true;
                    }
                    return (true, self.source.take());
                }
                Poll::Pending => return (delivered, None),
            }
        }
    }

    /// Next item for `id`, or `Some(None)` if the observer is finished.
    fn take(&mut self, id: u64) -> Option<Option<Result<T, StreamError>>> {
        let observer = self.observers.get_mut(&id)?;
        if let Some(item) = observer.queue.pop_front() {
            return Some(Some(item));
        }
        observer.closed.then_some(None)
    }
}

/// A shareable, lazily-started, multicast stream.
pub struct Multicast<T> {
    shared: Arc<Mutex<Shared<T>>>,
    wakers: Arc<WakerSet>,
    factory: Factory<T>,
}

impl<T> Clone for Multicast<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            wakers: Arc::clone(&self.wakers),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T: Clone + Send + 'static> Multicast<T> {
    /// Wrap a factory that builds a fresh upstream for each run.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> SourceStream<T> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                source: None,
                observers: HashMap::new(),
                next_id: 0,
                connections: 0,
            })),
            wakers: Arc::new(WakerSet::default()),
            factory: Arc::new(factory),
        }
    }

    /// Create a new observer. Nothing happens until it is polled.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            multicast: self.clone(),
            id: None,
        }
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.shared.lock().unwrap().observers.len()
    }

    /// Returns `true` while an upstream run is live.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().source.is_some()
    }

    /// Number of upstream runs started so far.
    pub fn connections(&self) -> u64 {
        self.shared.lock().unwrap().connections
    }

    /// Transform every value, keeping the result shareable.
    ///
    /// The mapped stream has its own observer set; its upstream is one
    /// observer of `self`.
    pub fn map<U, F>(&self, f: F) -> Multicast<U>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let parent = self.clone();
        let f = Arc::new(f);
        Multicast::new(move || {
            let f = Arc::clone(&f);
            parent
                .subscribe()
                .map(move |item| item.map(|value| (*f)(value)))
                .boxed()
        })
    }
}

/// One observer of a [`Multicast`].
pub struct Subscription<T> {
    multicast: Multicast<T>,
    id: Option<u64>,
}

impl<T> Subscription<T> {
    /// Returns `true` once this observer has attached (been polled).
    pub fn is_attached(&self) -> bool {
        self.id.is_some()
    }
}

impl<T: Clone + Send + 'static> Stream for Subscription<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let mut shared = this.multicast.shared.lock().unwrap();
        let id = match this.id {
            Some(id) => id,
            None => {
                let id = shared.attach(&this.multicast.factory);
                this.id = Some(id);
                id
            }
        };

        if let Some(ready) = shared.take(id) {
            return Poll::Ready(ready);
        }

        this.multicast.wakers.register(id, cx.waker());
        let waker = futures::task::waker(Arc::clone(&this.multicast.wakers));
        let mut source_cx = Context::from_waker(&waker);
        let (delivered, terminated) = shared.pump(&mut source_cx);
        let next = shared.take(id);
        drop(shared);
        drop(terminated);

        if delivered {
            this.multicast.wakers.wake_others(id);
        }
        match next {
            Some(ready) => Poll::Ready(ready),
            None => Poll::Pending,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let Some(id) = self.id else {
            return;
        };
        self.multicast.wakers.remove(id);

        let released = {
            let mut shared = self.multicast.shared.lock().unwrap();
            shared.observers.remove(&id);
            if shared.observers.is_empty() {
                shared.source.take()
            } else {
                None
            }
        };
        if released.is_some() {
            tracing::debug!("Last observer detached, tearing down upstream");
        }
        // Dropped outside the lock: tearing down the upstream deregisters
        // the native listener.
        drop(released);
    }
}
