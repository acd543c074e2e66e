use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::executor::{self, Executor};
use crate::state::Core;
use crate::{catching, Error, Outcome};

/// A write-once promise that is both the producer's and the consumer's
/// handle. Clones share the same underlying cell.
///
/// The first call to [`complete`](Promise::complete),
/// [`complete_exceptionally`](Promise::complete_exceptionally) or
/// [`cancel`](Promise::cancel) fixes the outcome; later calls return `false`.
///
/// # Examples
///
/// ```
/// use promise_stage::Promise;
/// use futures::executor::block_on;
/// use std::thread;
/// let op = Promise::<String>::pending();
/// let op_a = op.clone();
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", op_a.await);
/// }));
/// let task2 = thread::spawn(move || op.complete(String::from("🍓")));
/// task1.join().expect("The task1 thread has panicked");
/// assert!(task2.join().expect("The task2 thread has panicked"));
/// ```
pub struct Promise<T> {
    pub(crate) core: Arc<Core<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> Promise<T> {
    /// A promise that has not completed yet.
    pub fn pending() -> Self {
        Self {
            core: Arc::new(Core::pending()),
        }
    }

    /// A promise already completed with `value`.
    pub fn completed(value: T) -> Self {
        Self {
            core: Arc::new(Core::settled_with(Ok(value))),
        }
    }

    /// A promise already failed with `error`.
    pub fn failed(error: Error) -> Self {
        Self {
            core: Arc::new(Core::settled_with(Err(error))),
        }
    }

    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    pub fn is_success(&self) -> bool {
        self.core.is_success()
    }

    /// `true` once failed, including by cancellation.
    pub fn is_failed(&self) -> bool {
        self.core.is_failed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// Number of stages still waiting for this promise to settle.
    pub fn dependents(&self) -> usize {
        self.core.dependents()
    }

    /// `true` if both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Runs `f` on the default executor and completes the returned promise
    /// with its result.
    pub fn supply_async<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::supply_with(executor::default_executor(), f)
    }

    /// Runs `f` on `executor` and completes the returned promise with its
    /// result.
    pub fn supply_async_on<F>(executor: &Arc<dyn Executor>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::supply_with(Arc::clone(executor), f)
    }

    fn supply_with<F>(executor: Arc<dyn Executor>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let promise = Self::pending();
        let target = promise.clone();
        executor.execute(Box::new(move || {
            target.settle(catching(f));
        }));
        promise
    }

    /// Completes with `value`. Returns `false` if the promise had already
    /// settled, in which case nothing changes.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Fails with `error`. Returns `false` if the promise had already
    /// settled, in which case nothing changes.
    pub fn complete_exceptionally(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    /// Fails with [`Error::Cancelled`] if still pending. Stages depending on
    /// this promise observe the cancellation as an ordinary failure; nothing
    /// upstream is affected.
    pub fn cancel(&self) -> bool {
        self.settle(Err(Error::Cancelled))
    }

    pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
        self.core.settle(outcome)
    }

    /// Blocks until settled and returns the value or the stored error.
    pub fn get(&self) -> Outcome<T> {
        self.core.wait()
    }

    /// Same as [`get`](Promise::get).
    pub fn join(&self) -> Outcome<T> {
        self.core.wait()
    }

    /// Blocks for at most `timeout`. Returns [`Error::Timeout`] if the promise
    /// is still pending afterwards; the promise itself is left untouched.
    pub fn get_timeout(&self, timeout: Duration) -> Outcome<T> {
        let outcome = match Instant::now().checked_add(timeout) {
            Some(deadline) => self.core.wait_until(deadline),
            None => Some(self.core.wait()),
        };
        outcome.unwrap_or(Err(Error::Timeout(timeout)))
    }

    /// The settled outcome, or `Ok(value_if_pending)` without blocking.
    pub fn get_now(&self, value_if_pending: T) -> Outcome<T> {
        self.core.try_outcome().unwrap_or(Ok(value_if_pending))
    }

    /// The settled outcome, or `None` without blocking.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.core.try_outcome()
    }
}

impl<T: Clone + Send + 'static> Future for Promise<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.core.poll(cx)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.core.describe())
            .field("dependents", &self.core.dependents())
            .finish()
    }
}
