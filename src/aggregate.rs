//! Waiting on several promises at once.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::callback::{Callback, Dispatch, StageKind};
use crate::{Outcome, Promise};

/// Succeeds with every value, in input order, once all promises succeed.
/// Fails with the first failure observed. An empty slice succeeds at once
/// with an empty vector.
///
/// ```
/// use promise_stage::{all_of, Promise};
/// let names = all_of(&[Promise::completed("a"), Promise::completed("b")]);
/// assert_eq!(names.join().unwrap(), vec!["a", "b"]);
/// ```
pub fn all_of<T: Clone + Send + 'static>(promises: &[Promise<T>]) -> Promise<Vec<T>> {
    if promises.is_empty() {
        return Promise::completed(Vec::new());
    }
    let all = Promise::pending();
    let slots = Arc::new(Mutex::new(Slots {
        values: vec![None; promises.len()],
        remaining: promises.len(),
    }));
    for (index, promise) in promises.iter().enumerate() {
        let (target, slots) = (all.clone(), Arc::clone(&slots));
        promise.core.register(Callback::new(StageKind::Combine, Dispatch::Inline, move |outcome: Outcome<T>| {
            match outcome {
                Ok(value) => {
                    let values = slots.lock().fill(index, value);
                    if let Some(values) = values {
                        target.complete(values);
                    }
                }
                Err(error) => {
                    target.complete_exceptionally(error);
                }
            }
        }));
    }
    all
}

/// Settles with the outcome of whichever promise settles first, success or
/// failure. With an empty slice the result never settles.
pub fn any_of<T: Clone + Send + 'static>(promises: &[Promise<T>]) -> Promise<T> {
    let any = Promise::pending();
    for promise in promises {
        promise.relay_to(&any);
    }
    any
}

struct Slots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Slots<T> {
    /// Stores one value; returns all of them once the last slot is filled.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.values[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        self.values.drain(..).collect()
    }
}
