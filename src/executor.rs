//! Executors run the bodies of `*_async` stages.
//!
//! An [`Executor`] is supplied by the host. Two implementations ship with
//! the crate:
//!
//! - [`Inline`] runs every task on the submitting thread. Useful as a
//!   deterministic stand-in for a pool in tests.
//! - [`ThreadPool`] runs tasks on a fixed set of named worker threads.
//!
//! A process-wide default executor backs the `*_async` variants that take no
//! executor argument. It is created lazily, as a [`ThreadPool`] with
//! [`PoolConfig::default`], the first time one of those variants is used, and
//! can be swapped out with [`set_default_executor`].
//!
//! # Examples
//!
//! ```
//! use promise_stage::{Executor, PoolConfig, Promise, ThreadPool};
//! use std::sync::Arc;
//!
//! let pool: Arc<dyn Executor> =
//!     Arc::new(ThreadPool::new(PoolConfig::default().worker_threads(2)).unwrap());
//! let promise = Promise::completed(20);
//! assert_eq!(promise.map_async_on(&pool, |n| n + 1).join().unwrap(), 21);
//! ```
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;
use parking_lot::{const_rwlock, Condvar, Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::{panic_message, Error};

/// A unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks, inline or on another thread.
///
/// Every submitted task must eventually run exactly once: a stage whose task
/// is dropped would leave its downstream promise pending forever.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) {
        task()
    }
}

/// Thread pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub worker_threads: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl PoolConfig {
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Replaces zero or empty values with usable ones.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_NAME_PREFIX.to_string();
        }
    }

    fn default_worker_threads() -> usize {
        thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }
}

const DEFAULT_THREAD_NAME_PREFIX: &str = "promise-worker";

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: Self::default_worker_threads(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

/// A fixed-size pool of worker threads fed from a FIFO queue.
///
/// Dropping the pool, or calling [`ThreadPool::shutdown`], lets the workers
/// finish every queued task before they exit. Tasks submitted after shutdown
/// run on the submitting thread.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct PoolInner {
    queue: SegQueue<Task>,
    pending: AtomicUsize,
    shutdown: AtomicBool,
    /// Guards the sleep/wake handshake between `execute` and idle workers.
    lock: Mutex<()>,
    available: Condvar,
}

impl ThreadPool {
    pub fn new(mut config: PoolConfig) -> Result<Self, Error> {
        config.normalize();
        let pool = ThreadPool {
            inner: Arc::new(PoolInner {
                queue: SegQueue::new(),
                pending: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                lock: Mutex::new(()),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(config.worker_threads)),
        };
        for index in 0..config.worker_threads {
            let inner = Arc::clone(&pool.inner);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, index))
                .spawn(move || worker_loop(&inner))
                .map_err(|err| Error::Spawn(Arc::new(err)))?;
            pool.workers.lock().push(handle);
        }
        debug!(
            workers = config.worker_threads,
            prefix = %config.thread_name_prefix,
            "thread pool started"
        );
        Ok(pool)
    }

    /// Number of tasks queued but not yet picked up by a worker.
    pub fn pending_tasks(&self) -> usize {
        self.inner.pending.load(Ordering::Relaxed)
    }

    /// Stops accepting work, lets workers drain the queue and joins them.
    pub fn shutdown(&self) {
        {
            let _guard = self.inner.lock.lock();
            if self.inner.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
            self.inner.available.notify_all();
        }
        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            // A pool dropped from one of its own tasks cannot join itself.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("thread pool worker exited by panic");
            }
        }
        debug!("thread pool shut down");
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) {
        let guard = self.inner.lock.lock();
        if self.inner.shutdown.load(Ordering::Acquire) {
            drop(guard);
            warn!("thread pool is shut down; running task on the caller thread");
            task();
            return;
        }
        self.inner.queue.push(task);
        self.inner.pending.fetch_add(1, Ordering::Relaxed);
        self.inner.available.notify_one();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.lock().len())
            .field("pending_tasks", &self.pending_tasks())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(task) = inner.queue.pop() {
            inner.pending.fetch_sub(1, Ordering::Relaxed);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!(panic = %panic_message(payload.as_ref()), "executor task panicked");
            }
            continue;
        }
        let mut guard = inner.lock.lock();
        if !inner.queue.is_empty() {
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        inner.available.wait(&mut guard);
    }
}

static DEFAULT_EXECUTOR: RwLock<Option<Arc<dyn Executor>>> = const_rwlock(None);

/// The process-wide executor used by `*_async` stages without an explicit
/// executor, creating the default [`ThreadPool`] on first use.
///
/// Falls back to [`Inline`] if the pool cannot start its threads.
pub fn default_executor() -> Arc<dyn Executor> {
    if let Some(executor) = DEFAULT_EXECUTOR.read().as_ref() {
        return Arc::clone(executor);
    }
    let mut slot = DEFAULT_EXECUTOR.write();
    let executor = slot.get_or_insert_with(|| match ThreadPool::new(PoolConfig::default()) {
        Ok(pool) => Arc::new(pool) as Arc<dyn Executor>,
        Err(err) => {
            warn!(error = %err, "default thread pool unavailable; running async stages inline");
            Arc::new(Inline)
        }
    });
    Arc::clone(executor)
}

/// Replaces the process-wide default executor, returning the previous one.
///
/// Stages registered earlier keep the executor they captured.
pub fn set_default_executor(executor: Arc<dyn Executor>) -> Option<Arc<dyn Executor>> {
    DEFAULT_EXECUTOR.write().replace(executor)
}
