//! The single-assignment cell behind every [`Promise`](crate::Promise).
//!
//! All mutation goes through one `parking_lot::Mutex`. The lock is only held
//! to read or swap the state; callbacks, wakers and condition-variable
//! broadcasts all run after it is released.
use std::mem;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::callback::{self, Callback};
use crate::{Error, Outcome};

pub(crate) struct Core<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

enum State<T> {
    Pending {
        callbacks: Vec<Callback<T>>,
        wakers: Vec<Waker>,
    },
    Succeeded(T),
    Failed(Error),
}

impl<T: Clone> State<T> {
    fn settled(outcome: &Outcome<T>) -> Self {
        match outcome {
            Ok(value) => State::Succeeded(value.clone()),
            Err(error) => State::Failed(error.clone()),
        }
    }

    fn outcome(&self) -> Option<Outcome<T>> {
        match self {
            State::Pending { .. } => None,
            State::Succeeded(value) => Some(Ok(value.clone())),
            State::Failed(error) => Some(Err(error.clone())),
        }
    }
}

impl<T> Core<T> {
    pub(crate) fn pending() -> Self {
        Core {
            state: Mutex::new(State::Pending {
                callbacks: Vec::new(),
                wakers: Vec::new(),
            }),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn settled_with(outcome: Outcome<T>) -> Self {
        let state = match outcome {
            Ok(value) => State::Succeeded(value),
            Err(error) => State::Failed(error),
        };
        Core {
            state: Mutex::new(state),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending { .. })
    }

    pub(crate) fn is_success(&self) -> bool {
        matches!(*self.state.lock(), State::Succeeded(_))
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(*self.state.lock(), State::Failed(_))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), State::Failed(Error::Cancelled))
    }

    /// Number of callbacks still queued.
    pub(crate) fn dependents(&self) -> usize {
        match &*self.state.lock() {
            State::Pending { callbacks, .. } => callbacks.len(),
            _ => 0,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match *self.state.lock() {
            State::Pending { .. } => "pending",
            State::Succeeded(_) => "succeeded",
            State::Failed(_) => "failed",
        }
    }
}

impl<T> Drop for Core<T> {
    fn drop(&mut self) {
        if let State::Pending { callbacks, .. } = self.state.get_mut() {
            callback::release(mem::take(callbacks));
        }
    }
}

impl<T: Clone + Send + 'static> Core<T> {
    /// Moves a pending core to its terminal state. Returns `false` when the
    /// core was already settled; the stored outcome is then left untouched.
    ///
    /// Waiters are released before this returns. Queued callbacks also run
    /// before this returns, unless the call comes from a callback this
    /// thread is draining; they then run as soon as that callback returns.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
        let (callbacks, wakers) = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending { callbacks, wakers } => {
                    let drained = (mem::take(callbacks), mem::take(wakers));
                    *state = State::settled(&outcome);
                    drained
                }
                _ => {
                    trace!(succeeded = outcome.is_ok(), "promise already settled; completion ignored");
                    return false;
                }
            }
        };
        trace!(
            succeeded = outcome.is_ok(),
            callbacks = callbacks.len(),
            wakers = wakers.len(),
            "promise settled"
        );
        self.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        callback::drain(callbacks, &outcome);
        true
    }

    /// Queues the callback while pending, otherwise fires it right away on
    /// the calling thread with the settled outcome.
    pub(crate) fn register(&self, callback: Callback<T>) {
        let outcome = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(callback);
                    return;
                }
                settled => settled.outcome(),
            }
        };
        if let Some(outcome) = outcome {
            callback.fire(outcome);
        }
    }

    pub(crate) fn try_outcome(&self) -> Option<Outcome<T>> {
        self.state.lock().outcome()
    }

    /// Blocks until settled.
    pub(crate) fn wait(&self) -> Outcome<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.outcome() {
                return outcome;
            }
            self.settled.wait(&mut state);
        }
    }

    /// Blocks until settled or until `deadline`, whichever comes first.
    pub(crate) fn wait_until(&self, deadline: Instant) -> Option<Outcome<T>> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.outcome() {
                return Some(outcome);
            }
            if self.settled.wait_until(&mut state, deadline).timed_out() {
                return state.outcome();
            }
        }
    }

    pub(crate) fn poll(&self, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            settled => match settled.outcome() {
                Some(outcome) => Poll::Ready(outcome),
                None => Poll::Pending,
            },
        }
    }
}
