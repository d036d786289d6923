//! Store - Minimal observable value container.
//!
//! A [`Store`] holds one value and a list of observers:
//! - `subscribe` replays the current value once, then one call per `set`
//! - `set` notifies synchronously, in registration order
//! - `map`/`filter` derive new stores without touching the source
//! - `dispose` completes the store and clears every subscriber
//!
//! The value lives in a spark-signals [`Signal`], so reading a store inside an
//! `effect` or `derived` tracks it like any other signal.
//!
//! # Example
//!
//! ```ignore
//! use sutil_devtools::store::Store;
//!
//! let count = Store::new(0);
//! let sub = count.subscribe(|v| println!("count = {v}")); // prints 0
//! count.set(5);                                            // prints 5
//! sub.unsubscribe();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use spark_signals::{signal, Signal};

use crate::types::Cleanup;

thread_local! {
    static NEXT_STORE_ID: Cell<usize> = const { Cell::new(1) };
}

fn next_store_id() -> usize {
    NEXT_STORE_ID.with(|next| next.replace(next.get() + 1))
}

/// Observer callback (Rc so notification can run from a snapshot).
pub type Observer<T> = Rc<dyn Fn(&T)>;

// =============================================================================
// Store
// =============================================================================

struct StoreInner<T: Clone + PartialEq + 'static> {
    id: usize,
    name: RefCell<Option<String>>,
    value: Signal<T>,
    subscribers: RefCell<Vec<(usize, Observer<T>)>>,
    next_subscriber: Cell<usize>,
    disposed: Cell<bool>,
    on_dispose: RefCell<Vec<Cleanup>>,
}

impl<T: Clone + PartialEq + 'static> StoreInner<T> {
    fn is_subscribed(&self, id: usize) -> bool {
        self.subscribers.borrow().iter().any(|(sid, _)| *sid == id)
    }

    fn remove_subscriber(&self, id: usize) {
        self.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
    }
}

/// Observable value container.
///
/// Cloning a `Store` clones the handle; all clones share the value and the
/// subscriber list.
pub struct Store<T: Clone + PartialEq + 'static> {
    inner: Rc<StoreInner<T>>,
}

impl<T: Clone + PartialEq + 'static> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("value", &self.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Store<T> {
    /// Create a store holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                id: next_store_id(),
                name: RefCell::new(None),
                value: signal(value),
                subscribers: RefCell::new(Vec::new()),
                next_subscriber: Cell::new(0),
                disposed: Cell::new(false),
                on_dispose: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a store with a display name (shown by the DevTools panel).
    pub fn named(name: impl Into<String>, value: T) -> Self {
        let store = Self::new(value);
        *store.inner.name.borrow_mut() = Some(name.into());
        store
    }

    /// Thread-unique store id.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Display name, `store-<id>` when none was given.
    pub fn name(&self) -> String {
        self.inner
            .name
            .borrow()
            .clone()
            .unwrap_or_else(|| format!("store-{}", self.inner.id))
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner.value.get()
    }

    /// The signal backing this store.
    pub fn signal(&self) -> Signal<T> {
        self.inner.value.clone()
    }

    /// Replace the value and notify every subscriber.
    pub fn set(&self, value: T) {
        if self.inner.disposed.get() {
            tracing::debug!(store = self.inner.id, "set on disposed store ignored");
            return;
        }
        self.inner.value.set(value.clone());
        self.notify(&value);
    }

    /// Compute the next value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get());
        self.set(next);
    }

    /// Mutate a copy of the current value in place, then store it.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    fn notify(&self, value: &T) {
        // Snapshot so observers may subscribe/unsubscribe while we iterate.
        let observers: Vec<(usize, Observer<T>)> = self.inner.subscribers.borrow().clone();
        for (id, observer) in observers {
            if self.inner.is_subscribed(id) {
                observer(value);
            }
        }
    }

    /// Register an observer. It is called immediately with the current value.
    pub fn subscribe(&self, observer: impl Fn(&T) + 'static) -> Subscription {
        let observer: Observer<T> = Rc::new(observer);

        if self.inner.disposed.get() {
            observer(&self.get());
            return Subscription::inert();
        }

        let id = self.inner.next_subscriber.get();
        self.inner.next_subscriber.set(id + 1);
        self.inner.subscribers.borrow_mut().push((id, observer.clone()));

        observer(&self.get());

        let weak: Weak<StoreInner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove_subscriber(id);
                }
            })),
        }
    }

    /// Number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Derive a store holding `f(value)`; it follows every emission.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + 'static) -> Store<U>
    where
        U: Clone + PartialEq + 'static,
    {
        // The source owns the derived store until it is disposed.
        let derived = Store::new(f(&self.get()));
        let target = derived.clone();
        let replayed = Cell::new(false);

        let subscription = self.subscribe(move |value| {
            if !replayed.replace(true) {
                return;
            }
            target.set(f(value));
        });
        derived.on_dispose(move || subscription.unsubscribe());
        derived
    }

    /// Derive a store that starts from the current value and afterwards
    /// only takes values accepted by `predicate`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Store<T> {
        let derived = Store::new(self.get());
        let target = derived.clone();
        let replayed = Cell::new(false);

        let subscription = self.subscribe(move |value| {
            if !replayed.replace(true) {
                return;
            }
            if predicate(value) {
                target.set(value.clone());
            }
        });
        derived.on_dispose(move || subscription.unsubscribe());
        derived
    }

    /// Run `f` when the store is disposed (immediately if it already is).
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            f();
        } else {
            self.inner.on_dispose.borrow_mut().push(Box::new(f));
        }
    }

    /// Complete the store: clear subscribers and run dispose hooks.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.subscribers.borrow_mut().clear();
        let hooks: Vec<Cleanup> = self.inner.on_dispose.borrow_mut().drain(..).collect();
        for hook in hooks {
            hook();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// True when both handles point at the same store.
    pub fn ptr_eq(&self, other: &Store<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle returned by [`Store::subscribe`].
///
/// Dropping it keeps the observer registered; call [`unsubscribe`](Self::unsubscribe)
/// or turn it into a [`Cleanup`] for a disposables list.
#[must_use = "dropping a Subscription leaves the observer registered"]
pub struct Subscription {
    remove: Option<Cleanup>,
}

impl Subscription {
    fn inert() -> Self {
        Self { remove: None }
    }

    /// Remove exactly this observer.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Convert into a cleanup closure.
    pub fn into_cleanup(mut self) -> Cleanup {
        match self.remove.take() {
            Some(remove) => remove,
            None => Box::new(|| {}),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
