//! Worker pools that run domain tasks.
//!
//! A domain uses three execution contexts: a shared commit pool for sync
//! tasks, a shared session pool for visits and segment discovery, and its
//! own single-thread writer that serializes every segment append.

use crate::error::TransLogError;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{error, warn};

/// A unit of work for an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Returned when an executor no longer accepts tasks.
#[derive(Debug, Clone, Error)]
#[error("executor {executor} rejected task")]
pub struct RejectedTask {
    /// Name of the rejecting executor.
    pub executor: String,
}

impl From<RejectedTask> for TransLogError {
    fn from(rejected: RejectedTask) -> Self {
        TransLogError::Rejected {
            executor: rejected.executor,
        }
    }
}

/// Runs tasks on background threads.
pub trait Executor: Send + Sync {
    /// Queues a task.
    ///
    /// # Errors
    ///
    /// Returns `RejectedTask` after [`Executor::shutdown`].
    fn execute(&self, task: Task) -> Result<(), RejectedTask>;

    /// Blocks until every task queued before the call has finished.
    ///
    /// Must not be called from one of the executor's own tasks.
    fn sync(&self);

    /// Rejects further tasks, drains the queue and joins the workers.
    fn shutdown(&self);
}

struct PoolState {
    queue: VecDeque<(u64, Task)>,
    pending: BTreeSet<u64>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    name: String,
    state: Mutex<PoolState>,
    task_ready: Condvar,
    task_done: Condvar,
}

/// A fixed-size pool of named worker threads.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.shared.name)
            .field("threads", &self.workers.lock().len())
            .finish()
    }
}

impl ThreadPool {
    /// Starts `threads` workers named `{name}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            name: name.to_string(),
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                pending: BTreeSet::new(),
                next_seq: 0,
                shutdown: false,
            }),
            task_ready: Condvar::new(),
            task_done: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(threads.max(1))),
        };
        for index in 0..threads.max(1) {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.lock().push(handle);
        }
        Ok(pool)
    }

    /// Returns the pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let (seq, task) = {
            let mut state = shared.state.lock();
            loop {
                if let Some(next) = state.queue.pop_front() {
                    break next;
                }
                if state.shutdown {
                    return;
                }
                shared.task_ready.wait(&mut state);
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(executor = %shared.name, "task panicked");
        }

        let mut state = shared.state.lock();
        state.pending.remove(&seq);
        shared.task_done.notify_all();
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) -> Result<(), RejectedTask> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            warn!(executor = %self.shared.name, "rejecting task after shutdown");
            return Err(RejectedTask {
                executor: self.shared.name.clone(),
            });
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(seq);
        state.queue.push_back((seq, task));
        self.shared.task_ready.notify_one();
        Ok(())
    }

    fn sync(&self) {
        let mut state = self.shared.state.lock();
        let target = state.next_seq;
        while state.pending.first().is_some_and(|&seq| seq < target) {
            self.shared.task_done.wait(&mut state);
        }
    }

    fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.task_ready.notify_all();
        }
        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!(executor = %self.shared.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
