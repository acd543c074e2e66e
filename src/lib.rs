//! A write-once promise with a chaining stage algebra.
//!
//! A [`Promise`] is resolved at most once, to a value or to an [`Error`].
//! Stages chained onto it (`map`, `consume`, `compose`, `exceptionally`, ...)
//! each return a new downstream promise immediately and run once the upstream
//! settles, either inline on the settling thread or on an [`Executor`].
//!
//! # Examples
//!
//! ```
//! use promise_stage::Promise;
//! use std::thread;
//!
//! let promise = Promise::<String>::pending();
//! let length = promise.map(|s| s.len());
//!
//! let producer = promise.clone();
//! let task = thread::spawn(move || producer.complete("🍓".into()));
//!
//! assert_eq!(length.join().unwrap(), 4);
//! task.join().expect("The producer thread has panicked");
//! ```
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod aggregate;
mod callback;
pub mod executor;
pub mod promise;
mod stage;
mod state;

pub use aggregate::{all_of, any_of};
pub use executor::{
    default_executor, set_default_executor, Executor, Inline, PoolConfig, Task, ThreadPool,
};
pub use promise::Promise;

/// The settled result of a promise: exactly one of a value or an error.
pub type Outcome<T> = Result<T, Error>;

/// Failure stored in a promise, or reported while waiting on one.
///
/// Cloning is cheap so that one stored failure can be handed to every waiter
/// and every dependent stage.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A stage function panicked.
    #[error("stage panicked: {0}")]
    Panicked(Arc<str>),
    /// The promise was cancelled before it completed.
    #[error("promise was cancelled")]
    Cancelled,
    /// A bounded wait elapsed. Never stored in a promise.
    #[error("promise still pending after {0:?}")]
    Timeout(Duration),
    /// A thread pool could not start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(Arc<std::io::Error>),
    /// Any error supplied by the host.
    #[error(transparent)]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wraps a host error.
    ///
    /// ```
    /// use promise_stage::Error;
    /// let err = Error::new("user not found");
    /// assert_eq!(err.to_string(), "user not found");
    /// ```
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = error.into();
        Error::Failed(Arc::from(boxed))
    }

    /// Returns the wrapped host error if it is of type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Error::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Converts a panic payload. A payload that is itself an `Error` (raised
    /// with [`std::panic::panic_any`]) is kept as is.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        if let Some(error) = payload.downcast_ref::<Error>() {
            return error.clone();
        }
        Error::Panicked(Arc::from(panic_message(payload)))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Runs a stage function, turning a panic into a failed outcome.
pub(crate) fn catching<R>(f: impl FnOnce() -> R) -> Outcome<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::from_panic(payload.as_ref()))
}
