//! Composition operators.
//!
//! Every operator registers one callback on `self` and returns the downstream
//! promise immediately. The plain form runs its function inline: on the
//! registering thread when `self` has already settled, otherwise on whichever
//! thread settles `self`. The `_async` form submits it to the default
//! executor and the `_async_on` form to the given one.
//!
//! A panic in a stage function fails that stage's downstream promise with the
//! panic (see [`Error::Panicked`]); the upstream and sibling stages are not
//! affected. The panic still passes through the process panic hook, which by
//! default prints a message to stderr. Hosts that raise on purpose can install
//! a quiet hook with [`std::panic::set_hook`], or fail the stage without
//! panicking through [`Promise::try_map`].
use std::sync::Arc;

use parking_lot::Mutex;

use crate::callback::{Callback, Dispatch, StageKind};
use crate::executor::Executor;
use crate::{catching, Error, Outcome, Promise};

impl<T: Clone + Send + 'static> Promise<T> {
    /// Registers `body` on this promise and settles the returned promise with
    /// whatever `body` makes of the upstream outcome.
    fn stage<U, F>(&self, kind: StageKind, dispatch: Dispatch, body: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> Outcome<U> + Send + 'static,
    {
        let downstream = Promise::pending();
        let target = downstream.clone();
        self.core.register(Callback::new(kind, dispatch, move |outcome: Outcome<T>| {
            target.settle(body(outcome));
        }));
        downstream
    }

    /// Settles `target` with this promise's outcome once known.
    pub(crate) fn relay_to(&self, target: &Promise<T>) {
        let target = target.clone();
        self.core.register(Callback::new(StageKind::Relay, Dispatch::Inline, move |outcome: Outcome<T>| {
            target.settle(outcome);
        }));
    }

    // map

    /// Transforms the value with `f`. Failures pass through without calling
    /// `f`.
    ///
    /// ```
    /// use promise_stage::Promise;
    /// let upper = Promise::completed("hello").map(|s| s.to_uppercase());
    /// assert_eq!(upper.join().unwrap(), "HELLO");
    /// ```
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_with(StageKind::Map, Dispatch::Inline, f)
    }

    pub fn map_async<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_with(StageKind::Map, Dispatch::default_async(), f)
    }

    pub fn map_async_on<U, F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_with(StageKind::Map, Dispatch::on(executor), f)
    }

    fn map_with<U, F>(&self, kind: StageKind, dispatch: Dispatch, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.stage(kind, dispatch, move |outcome| outcome.and_then(|value| catching(|| f(value))))
    }

    // try_map

    /// Like [`map`](Promise::map), but `f` may fail the downstream promise by
    /// returning `Err`.
    ///
    /// ```
    /// use promise_stage::{Error, Promise};
    /// let parsed = Promise::completed("x1").try_map(|s| s.parse::<u32>().map_err(Error::new));
    /// assert!(parsed.join().is_err());
    /// ```
    pub fn try_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.try_map_with(Dispatch::Inline, f)
    }

    pub fn try_map_async<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.try_map_with(Dispatch::default_async(), f)
    }

    pub fn try_map_async_on<U, F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.try_map_with(Dispatch::on(executor), f)
    }

    fn try_map_with<U, F>(&self, dispatch: Dispatch, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.stage(StageKind::Map, dispatch, move |outcome| {
            outcome.and_then(|value| catching(|| f(value)).and_then(|result| result))
        })
    }

    // consume

    /// Calls `f` with the value for its side effect. Failures pass through
    /// without calling `f`.
    pub fn consume<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_with(StageKind::Consume, Dispatch::Inline, f)
    }

    pub fn consume_async<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_with(StageKind::Consume, Dispatch::default_async(), f)
    }

    pub fn consume_async_on<F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_with(StageKind::Consume, Dispatch::on(executor), f)
    }

    // run

    /// Calls `f` once this promise succeeds, ignoring the value.
    pub fn run<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_with(Dispatch::Inline, f)
    }

    pub fn run_async<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_with(Dispatch::default_async(), f)
    }

    pub fn run_async_on<F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_with(Dispatch::on(executor), f)
    }

    fn run_with<F>(&self, dispatch: Dispatch, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.stage(StageKind::Run, dispatch, move |outcome| outcome.and_then(|_| catching(f)))
    }

    // compose

    /// Chains a promise-returning function. The downstream promise mirrors the
    /// promise `f` returns.
    ///
    /// ```
    /// use promise_stage::Promise;
    /// let user = Promise::completed(7u32);
    /// let name = user.compose(|id| Promise::completed(format!("user-{}", id)));
    /// assert_eq!(name.join().unwrap(), "user-7");
    /// ```
    pub fn compose<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.compose_with(Dispatch::Inline, f)
    }

    pub fn compose_async<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.compose_with(Dispatch::default_async(), f)
    }

    pub fn compose_async_on<U, F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.compose_with(Dispatch::on(executor), f)
    }

    fn compose_with<U, F>(&self, dispatch: Dispatch, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let downstream = Promise::pending();
        let target = downstream.clone();
        self.core.register(Callback::new(StageKind::Compose, dispatch, move |outcome: Outcome<T>| {
            match outcome.and_then(|value| catching(|| f(value))) {
                Ok(inner) => inner.relay_to(&target),
                Err(error) => {
                    target.settle(Err(error));
                }
            }
        }));
        downstream
    }

    // combine

    /// Combines this value with the value of `other` once both succeed.
    ///
    /// If either fails, the downstream promise fails with the first failure
    /// observed. When both fail concurrently, which failure wins is not
    /// specified.
    pub fn combine<U, V, F>(&self, other: &Promise<U>, f: F) -> Promise<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        self.combine_with(other, Dispatch::Inline, f)
    }

    pub fn combine_async<U, V, F>(&self, other: &Promise<U>, f: F) -> Promise<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        self.combine_with(other, Dispatch::default_async(), f)
    }

    pub fn combine_async_on<U, V, F>(
        &self,
        other: &Promise<U>,
        executor: &Arc<dyn Executor>,
        f: F,
    ) -> Promise<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        self.combine_with(other, Dispatch::on(executor), f)
    }

    fn combine_with<U, V, F>(&self, other: &Promise<U>, dispatch: Dispatch, f: F) -> Promise<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let downstream = Promise::pending();
        let pair = Arc::new(Mutex::new(Pair {
            left: None,
            right: None,
            f: Some(f),
        }));

        let (target, shared) = (downstream.clone(), Arc::clone(&pair));
        self.core.register(Callback::new(StageKind::Combine, dispatch.clone(), move |outcome: Outcome<T>| {
            match outcome {
                Ok(value) => {
                    let ready = {
                        let mut pair = shared.lock();
                        pair.left = Some(value);
                        pair.take_ready()
                    };
                    Pair::finish(ready, &target);
                }
                Err(error) => {
                    target.settle(Err(error));
                }
            }
        }));

        let (target, shared) = (downstream.clone(), pair);
        other.core.register(Callback::new(StageKind::Combine, dispatch, move |outcome: Outcome<U>| {
            match outcome {
                Ok(value) => {
                    let ready = {
                        let mut pair = shared.lock();
                        pair.right = Some(value);
                        pair.take_ready()
                    };
                    Pair::finish(ready, &target);
                }
                Err(error) => {
                    target.settle(Err(error));
                }
            }
        }));
        downstream
    }

    // handle

    /// Maps either outcome to a new value. `f` always runs.
    ///
    /// ```
    /// use promise_stage::{Error, Promise};
    /// let recovered = Promise::<u32>::failed(Error::new("offline"))
    ///     .handle(|outcome| outcome.unwrap_or(0));
    /// assert_eq!(recovered.join().unwrap(), 0);
    /// ```
    pub fn handle<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
    {
        self.handle_with(Dispatch::Inline, f)
    }

    pub fn handle_async<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
    {
        self.handle_with(Dispatch::default_async(), f)
    }

    pub fn handle_async_on<U, F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
    {
        self.handle_with(Dispatch::on(executor), f)
    }

    fn handle_with<U, F>(&self, dispatch: Dispatch, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
    {
        self.stage(StageKind::Handle, dispatch, move |outcome| catching(|| f(outcome)))
    }

    // when_complete

    /// Observes the outcome without changing it. `f` always runs; if it
    /// panics, the downstream promise fails with that panic instead of
    /// carrying the original outcome.
    pub fn when_complete<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        self.when_complete_with(Dispatch::Inline, f)
    }

    pub fn when_complete_async<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        self.when_complete_with(Dispatch::default_async(), f)
    }

    pub fn when_complete_async_on<F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<T>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        self.when_complete_with(Dispatch::on(executor), f)
    }

    fn when_complete_with<F>(&self, dispatch: Dispatch, f: F) -> Promise<T>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        self.stage(StageKind::WhenComplete, dispatch, move |outcome| {
            catching(|| f(&outcome)).and(outcome)
        })
    }

    // exceptionally

    /// Recovers from a failure with `f`. A success passes through without
    /// calling `f`.
    pub fn exceptionally<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.exceptionally_with(Dispatch::Inline, f)
    }

    pub fn exceptionally_async<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.exceptionally_with(Dispatch::default_async(), f)
    }

    pub fn exceptionally_async_on<F>(&self, executor: &Arc<dyn Executor>, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.exceptionally_with(Dispatch::on(executor), f)
    }

    fn exceptionally_with<F>(&self, dispatch: Dispatch, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.stage(StageKind::Exceptionally, dispatch, move |outcome| {
            outcome.or_else(|error| catching(|| f(error)))
        })
    }
}

/// Values collected by `combine` until both sides have succeeded.
struct Pair<T, U, F> {
    left: Option<T>,
    right: Option<U>,
    f: Option<F>,
}

impl<T, U, F> Pair<T, U, F> {
    fn take_ready(&mut self) -> Option<(F, T, U)> {
        if self.left.is_none() || self.right.is_none() {
            return None;
        }
        Some((self.f.take()?, self.left.take()?, self.right.take()?))
    }

    fn finish<V>(ready: Option<(F, T, U)>, target: &Promise<V>)
    where
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V,
    {
        if let Some((f, left, right)) = ready {
            target.settle(catching(|| f(left, right)));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::executor::{Executor, Inline};
    use crate::{Error, Promise};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (calls.clone(), calls)
    }

    #[test]
    fn test_map_skips_function_on_failure() {
        let (calls, seen) = counter();
        let upstream = Promise::<String>::pending();
        let mapped = upstream.map(move |s| {
            calls.fetch_add(1, Ordering::SeqCst);
            s.len()
        });
        upstream.complete_exceptionally(Error::new("lookup failed"));
        assert_eq!(mapped.join().unwrap_err().to_string(), "lookup failed");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_map_panic_fails_only_own_stage() {
        let upstream = Promise::<u32>::pending();
        let broken = upstream.map(|_| -> u32 { panic!("bad stage") });
        let sibling = upstream.map(|n| n * 2);
        upstream.complete(21);
        assert!(matches!(broken.join(), Err(Error::Panicked(_))));
        assert_eq!(sibling.join().unwrap(), 42);
        assert_eq!(upstream.join().unwrap(), 21);
    }

    #[test]
    fn test_try_map_err_fails_stage() {
        let parsed = Promise::completed("42").try_map(|s| s.parse::<u32>().map_err(Error::new));
        assert_eq!(parsed.join().unwrap(), 42);
        let failed = Promise::completed("x").try_map(|s| s.parse::<u32>().map_err(Error::new));
        assert!(failed.join().unwrap_err().downcast_ref::<std::num::ParseIntError>().is_some());
    }

    #[test]
    fn test_consume_and_run() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let upstream = Promise::completed("kewne".to_string());
        upstream.consume(move |s| a.lock().unwrap().push(s)).join().unwrap();
        upstream.run(move || b.lock().unwrap().push("ran".into())).join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["kewne".to_string(), "ran".to_string()]);
    }

    #[test]
    fn test_run_skips_on_failure() {
        let (calls, seen) = counter();
        let stage = Promise::<u8>::failed(Error::Cancelled).run(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        assert!(matches!(stage.join(), Err(Error::Cancelled)));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compose_mirrors_inner_promise() {
        let upstream = Promise::<u32>::pending();
        let inner = Promise::<String>::pending();
        let nested = inner.clone();
        let composed = upstream.compose(move |_| nested);
        upstream.complete(1);
        assert!(!composed.is_done());
        inner.complete("later".into());
        assert_eq!(composed.join().unwrap(), "later");

        let failed = Promise::completed(1).compose(|_| Promise::<u8>::failed(Error::new("inner")));
        assert_eq!(failed.join().unwrap_err().to_string(), "inner");
    }

    #[test]
    fn test_compose_skips_on_failure() {
        let (calls, seen) = counter();
        let composed = Promise::<u8>::failed(Error::new("outer")).compose(move |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            Promise::completed(n)
        });
        assert_eq!(composed.join().unwrap_err().to_string(), "outer");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compose_panic_fails_only_own_stage() {
        let upstream = Promise::<u32>::pending();
        let broken = upstream.compose(|_| -> Promise<u32> { panic!("no inner promise") });
        let sibling = upstream.map(|n| n + 1);
        upstream.complete(1);
        assert_eq!(broken.join().unwrap_err().to_string(), "stage panicked: no inner promise");
        assert_eq!(sibling.join().unwrap(), 2);
        assert_eq!(upstream.join().unwrap(), 1);
    }

    #[test]
    fn test_combine_panic_fails_only_own_stage() {
        let left = Promise::<u32>::pending();
        let right = Promise::<u32>::pending();
        let broken = left.combine(&right, |_, _| -> u32 { panic!("bad pair") });
        let left_sibling = left.map(|n| n * 10);
        let right_sibling = right.map(|n| n * 100);
        left.complete(1);
        right.complete(2);
        assert!(matches!(broken.join(), Err(Error::Panicked(_))));
        assert_eq!(left_sibling.join().unwrap(), 10);
        assert_eq!(right_sibling.join().unwrap(), 200);
        assert_eq!((left.join().unwrap(), right.join().unwrap()), (1, 2));
    }

    #[test]
    fn test_nested_stages_run_depth_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let record = |label: &'static str| {
            let order = order.clone();
            move |_: u8| order.lock().unwrap().push(label)
        };
        let upstream = Promise::<u8>::pending();
        let first = upstream.map(|n| n);
        let first_child = first.consume(record("first child"));
        let second = upstream.consume(record("second"));
        let first_sibling = first.consume(record("first sibling"));
        upstream.complete(0);
        for stage in [first_child, second, first_sibling] {
            stage.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["first child", "first sibling", "second"]);
    }

    #[test]
    fn test_combine_waits_for_both() {
        let left = Promise::<u32>::pending();
        let right = Promise::<String>::pending();
        let combined = left.combine(&right, |n, s| format!("{}{}", s, n));
        left.complete(7);
        assert!(!combined.is_done());
        right.complete("user-".into());
        assert_eq!(combined.join().unwrap(), "user-7");
    }

    #[test]
    fn test_combine_first_failure_wins() {
        let left = Promise::<u32>::pending();
        let right = Promise::<u32>::pending();
        let (calls, seen) = counter();
        let combined = left.combine(&right, move |a, b| {
            calls.fetch_add(1, Ordering::SeqCst);
            a + b
        });
        right.complete_exceptionally(Error::new("right failed"));
        left.complete_exceptionally(Error::new("left failed"));
        assert_eq!(combined.join().unwrap_err().to_string(), "right failed");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_sees_both_outcomes() {
        let ok = Promise::completed(2).handle(|outcome| match outcome {
            Ok(n) => n * 10,
            Err(_) => 0,
        });
        let err = Promise::<i32>::failed(Error::new("gone")).handle(|outcome| match outcome {
            Ok(n) => n,
            Err(e) => e.to_string().len() as i32,
        });
        assert_eq!(ok.join().unwrap(), 20);
        assert_eq!(err.join().unwrap(), 4);
    }

    #[test]
    fn test_when_complete_passes_outcome_through() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let stage = Promise::completed(5).when_complete(move |outcome| {
            *sink.lock().unwrap() = Some(outcome.as_ref().ok().copied());
        });
        assert_eq!(stage.join().unwrap(), 5);
        assert_eq!(*seen.lock().unwrap(), Some(Some(5)));

        let failed = Promise::<u8>::failed(Error::new("kept")).when_complete(|_| {});
        assert_eq!(failed.join().unwrap_err().to_string(), "kept");
    }

    #[test]
    fn test_when_complete_panic_overrides_outcome() {
        let stage = Promise::completed(5).when_complete(|_| panic!("null pointer"));
        assert_eq!(stage.join().unwrap_err().to_string(), "stage panicked: null pointer");

        let failed = Promise::<u8>::failed(Error::new("original")).when_complete(|_| panic!("override"));
        assert_eq!(failed.join().unwrap_err().to_string(), "stage panicked: override");
    }

    #[test]
    fn test_exceptionally_skips_on_success() {
        let (calls, seen) = counter();
        let stage = Promise::completed(3).exceptionally(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            0
        });
        assert_eq!(stage.join().unwrap(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exceptionally_recovers_or_fails() {
        let recovered = Promise::<u8>::failed(Error::Cancelled).exceptionally(|_| 1);
        assert_eq!(recovered.join().unwrap(), 1);
        let refailed = Promise::<u8>::failed(Error::Cancelled).exceptionally(|_| panic!("still broken"));
        assert!(matches!(refailed.join(), Err(Error::Panicked(_))));
    }

    #[test]
    fn test_sync_stage_runs_on_registering_thread_when_settled() {
        let caller = thread::current().id();
        let ran_on = Promise::completed(()).map(|_| thread::current().id());
        assert_eq!(ran_on.join().unwrap(), caller);
    }

    #[test]
    fn test_sync_stage_runs_on_completing_thread_when_pending() {
        let upstream = Promise::<()>::pending();
        let ran_on = upstream.map(|_| thread::current().id());
        let producer = upstream.clone();
        let completer = thread::spawn(move || {
            producer.complete(());
            thread::current().id()
        });
        let completer_id = completer.join().expect("The completer thread has panicked");
        assert_eq!(ran_on.join().unwrap(), completer_id);
    }

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let upstream = Promise::<u8>::pending();
        let stages: Vec<_> = (0..10)
            .map(|i| {
                let order = order.clone();
                upstream.consume(move |_| order.lock().unwrap().push(i))
            })
            .collect();
        assert_eq!(upstream.dependents(), 10);
        upstream.complete(0);
        for stage in stages {
            stage.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_async_on_inline_executor_is_deterministic() {
        let executor: Arc<dyn Executor> = Arc::new(Inline);
        let upstream = Promise::<String>::pending();
        let stage = upstream
            .map_async_on(&executor, |s| s.to_uppercase())
            .consume_async_on(&executor, |_| {});
        assert!(!stage.is_done());
        upstream.complete("hello".into());
        assert!(stage.is_done());
        assert!(stage.is_success());
    }
}
