//! Continuations queued on a pending promise.
//!
//! Every stage operator registers exactly one [`Callback`] on its upstream.
//! The callback owns the body that settles the downstream promise and the
//! [`Dispatch`] mode deciding which thread runs that body.
//!
//! A stage body usually settles its downstream promise, which drains that
//! promise's callbacks in turn. Draining and dropping are flattened through
//! per-thread worklists so the stack depth stays constant however long a
//! chain grows.
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::thread::LocalKey;

use tracing::trace;

use crate::executor::{self, Executor};
use crate::Outcome;

/// The operator that produced a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageKind {
    Map,
    Consume,
    Run,
    Compose,
    Combine,
    Handle,
    WhenComplete,
    Exceptionally,
    /// Mirrors the outcome of another promise into a downstream one.
    Relay,
}

/// Where a callback body runs once its upstream outcome is known.
#[derive(Clone)]
pub(crate) enum Dispatch {
    /// On the thread that settles the upstream, or on the registering thread
    /// if the upstream was already settled.
    Inline,
    /// Submitted to an executor.
    Executor(Arc<dyn Executor>),
}

impl Dispatch {
    /// The process-wide default executor, resolved at registration time.
    pub(crate) fn default_async() -> Self {
        Dispatch::Executor(executor::default_executor())
    }

    pub(crate) fn on(executor: &Arc<dyn Executor>) -> Self {
        Dispatch::Executor(Arc::clone(executor))
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Inline => f.write_str("Inline"),
            Dispatch::Executor(_) => f.write_str("Executor"),
        }
    }
}

trait Body<T>: Send {
    fn call(self: Box<Self>, outcome: Outcome<T>);

    /// Forgets the outcome type so the body can wait in a drop worklist.
    fn erase(self: Box<Self>) -> Box<dyn Send>;
}

impl<T, F> Body<T> for F
where
    F: FnOnce(Outcome<T>) + Send + 'static,
{
    fn call(self: Box<Self>, outcome: Outcome<T>) {
        (*self)(outcome)
    }

    fn erase(self: Box<Self>) -> Box<dyn Send> {
        self
    }
}

pub(crate) struct Callback<T> {
    kind: StageKind,
    dispatch: Dispatch,
    body: Box<dyn Body<T>>,
}

impl<T: Send + 'static> Callback<T> {
    pub(crate) fn new<F>(kind: StageKind, dispatch: Dispatch, body: F) -> Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        Callback {
            kind,
            dispatch,
            body: Box::new(body),
        }
    }

    /// Runs or submits the body with the upstream outcome. Bodies catch
    /// panics of the user functions they call, so firing never unwinds.
    pub(crate) fn fire(self, outcome: Outcome<T>) {
        let Callback {
            kind,
            dispatch,
            body,
        } = self;
        trace!(?kind, ?dispatch, succeeded = outcome.is_ok(), "firing stage callback");
        match dispatch {
            Dispatch::Inline => body.call(outcome),
            Dispatch::Executor(executor) => executor.execute(Box::new(move || body.call(outcome))),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("kind", &self.kind)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

type Deferred = Box<dyn FnOnce()>;

thread_local! {
    /// Callbacks of promises settled while this thread is already draining.
    static DRAINING: RefCell<Option<Vec<Deferred>>> = const { RefCell::new(None) };
    /// Bodies of queued callbacks whose promise is being dropped on this thread.
    static RELEASING: RefCell<Option<Vec<Box<dyn Send>>>> = const { RefCell::new(None) };
}

/// Fires every callback captured at settlement, in registration order.
///
/// Called from inside a callback that is already being drained on this
/// thread, the batch is pushed onto the running loop instead: it runs right
/// after the current callback returns and before that callback's later
/// siblings, which is the order plain recursion would give.
pub(crate) fn drain<T: Clone + Send + 'static>(callbacks: Vec<Callback<T>>, outcome: &Outcome<T>) {
    if callbacks.is_empty() {
        return;
    }
    trace!(callbacks = callbacks.len(), "draining stage callbacks");
    let batch: Vec<Deferred> = callbacks
        .into_iter()
        .map(|callback| {
            let outcome = outcome.clone();
            Box::new(move || callback.fire(outcome)) as Deferred
        })
        .collect();
    flatten(&DRAINING, batch, |deferred| deferred());
}

/// Drops the callbacks of a promise that is going away while still pending.
/// Each body may own the last handle to the next promise in a chain, so the
/// drops go through a worklist instead of nesting.
pub(crate) fn release<T>(callbacks: Vec<Callback<T>>) {
    if callbacks.is_empty() {
        return;
    }
    let bodies: Vec<Box<dyn Send>> = callbacks.into_iter().map(|callback| callback.body.erase()).collect();
    flatten(&RELEASING, bodies, drop);
}

/// Runs `batch` in order on the thread's `worklist`. If a loop over that
/// worklist is already running further up the stack, the batch joins the top
/// of it and this returns at once.
fn flatten<I: 'static>(
    worklist: &'static LocalKey<RefCell<Option<Vec<I>>>>,
    mut batch: Vec<I>,
    mut run: impl FnMut(I),
) {
    batch.reverse();
    let joined = worklist.try_with(|slot| match slot.borrow_mut().as_mut() {
        Some(stack) => {
            stack.append(&mut batch);
            true
        }
        None => false,
    });
    match joined {
        Ok(true) => return,
        Ok(false) => {}
        // Thread-local storage is being torn down.
        Err(_) => {
            while let Some(item) = batch.pop() {
                run(item);
            }
            return;
        }
    }
    worklist.with(|slot| *slot.borrow_mut() = Some(batch));
    let _reset = Reset(worklist);
    while let Some(item) = worklist.with(|slot| slot.borrow_mut().as_mut().and_then(Vec::pop)) {
        run(item);
    }
}

/// Closes the worklist loop, also when a step unwinds.
struct Reset<I: 'static>(&'static LocalKey<RefCell<Option<Vec<I>>>>);

impl<I: 'static> Drop for Reset<I> {
    fn drop(&mut self) {
        let leftover = self.0.try_with(|slot| slot.borrow_mut().take());
        drop(leftover);
    }
}
