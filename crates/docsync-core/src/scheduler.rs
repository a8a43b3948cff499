//! Schedulers decide when a listener registration actually runs.
//!
//! The event source adapter never registers a native listener inside the poll
//! that subscribes; it hands the registration to a [`Scheduler`]. That gap is
//! what lets a subscribe-then-drop within one turn skip registration entirely.

use std::collections::VecDeque;
use std::sync::Mutex;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs deferred tasks.
pub trait Scheduler: Send + Sync {
    /// Submit a task. Implementations decide whether it runs now or later.
    fn schedule(&self, task: Task);
}

/// Default scheduler: spawns the task on the current Tokio runtime so it runs
/// on the next turn of the event loop. Falls back to running inline when no
/// runtime is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsapScheduler;

impl Scheduler for AsapScheduler {
    fn schedule(&self, task: Task) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { task() });
            }
            Err(_) => {
                tracing::debug!("No Tokio runtime, running scheduled task inline");
                task();
            }
        }
    }
}

/// Runs every task immediately on the caller's stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Queues tasks until [`ManualScheduler::run_pending`] is called.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run every queued task (including tasks queued while running) and
    /// return how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: tasks may schedule more work.
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().unwrap().push_back(task);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
