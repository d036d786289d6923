//! ObservablePromise - an asynchronous result held in a store.
//!
//! Every DevTools request is a remote round trip; its outcome is modelled as
//! a [`Store`] of [`PromiseState`] so views can bind to it and render a
//! waiting, result or error branch.

use std::cell::RefCell;
use std::rc::Rc;

use super::observable::{Store, Subscription};
use crate::error::SutilError;

/// Settlement state of an [`ObservablePromise`].
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState<T> {
    /// Still in flight.
    Waiting,
    /// Completed with a value.
    Result(T),
    /// Failed.
    Error(SutilError),
}

impl<T> PromiseState<T> {
    pub fn is_waiting(&self) -> bool {
        matches!(self, PromiseState::Waiting)
    }
}

/// A promise whose state is observable.
///
/// Settling is one-shot: once resolved or rejected, further settle calls are
/// ignored.
pub struct ObservablePromise<T: Clone + PartialEq + 'static> {
    state: Store<PromiseState<T>>,
}

impl<T: Clone + PartialEq + 'static> Clone for ObservablePromise<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<T: Clone + PartialEq + 'static> Default for ObservablePromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + 'static> ObservablePromise<T> {
    /// A pending promise.
    pub fn new() -> Self {
        Self { state: Store::new(PromiseState::Waiting) }
    }

    pub fn resolved(value: T) -> Self {
        Self { state: Store::new(PromiseState::Result(value)) }
    }

    pub fn rejected(error: SutilError) -> Self {
        Self { state: Store::new(PromiseState::Error(error)) }
    }

    /// Settle with a value. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(PromiseState::Result(value))
    }

    /// Settle with an error. Returns false if already settled.
    pub fn reject(&self, error: SutilError) -> bool {
        self.settle(PromiseState::Error(error))
    }

    /// Settle from a `Result`.
    pub fn complete(&self, result: Result<T, SutilError>) -> bool {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }

    fn settle(&self, state: PromiseState<T>) -> bool {
        if self.is_settled() {
            return false;
        }
        self.state.set(state);
        true
    }

    pub fn state(&self) -> PromiseState<T> {
        self.state.get()
    }

    pub fn is_settled(&self) -> bool {
        !self.state.get().is_waiting()
    }

    /// The store holding the state, for bindings.
    pub fn store(&self) -> &Store<PromiseState<T>> {
        &self.state
    }

    pub fn subscribe(&self, observer: impl Fn(&PromiseState<T>) + 'static) -> Subscription {
        self.state.subscribe(observer)
    }

    /// Run `f` once with the outcome (immediately if already settled).
    pub fn on_settled(&self, f: impl FnOnce(Result<T, SutilError>) + 'static) {
        let callback: Rc<RefCell<Option<Box<dyn FnOnce(Result<T, SutilError>)>>>> =
            Rc::new(RefCell::new(Some(Box::new(f))));
        let holder: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let callback_clone = callback.clone();
        let holder_clone = holder.clone();
        let subscription = self.state.subscribe(move |state| {
            let outcome = match state {
                PromiseState::Waiting => return,
                PromiseState::Result(value) => Ok(value.clone()),
                PromiseState::Error(error) => Err(error.clone()),
            };
            let f = callback_clone.borrow_mut().take();
            if let Some(f) = f {
                f(outcome);
            }
            if let Some(sub) = holder_clone.borrow_mut().take() {
                sub.unsubscribe();
            }
        });

        if callback.borrow().is_none() {
            // Fired during replay.
            subscription.unsubscribe();
        } else {
            *holder.borrow_mut() = Some(subscription);
        }
    }

    /// Run `f` with the value once resolved.
    pub fn then(&self, f: impl FnOnce(T) + 'static) {
        self.on_settled(move |outcome| {
            if let Ok(value) = outcome {
                f(value);
            }
        });
    }

    /// Run `f` with the error once rejected.
    pub fn catch(&self, f: impl FnOnce(SutilError) + 'static) {
        self.on_settled(move |outcome| {
            if let Err(error) = outcome {
                f(error);
            }
        });
    }

    /// Chain a transformation of the eventual value.
    pub fn map<U>(&self, f: impl FnOnce(T) -> U + 'static) -> ObservablePromise<U>
    where
        U: Clone + PartialEq + 'static,
    {
        let next = ObservablePromise::new();
        let next_clone = next.clone();
        self.on_settled(move |outcome| {
            next_clone.complete(outcome.map(f));
        });
        next
    }
}
