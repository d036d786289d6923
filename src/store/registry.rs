//! Store Registry - stores visible to the DevTools panel.
//!
//! Registered stores get a numeric id, a JSON snapshot function and a
//! disposer. Listeners hear about registrations, updates and removals; the
//! runtime turns those into `sutil-new-store` / `sutil-update-store` events.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use super::observable::Store;
use crate::devtools::protocol::StoreInfo;

/// Change notification emitted by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    New(usize),
    Updated(usize),
    Removed(usize),
}

type RegistryListener = Rc<dyn Fn(RegistryEvent)>;

struct RegistryEntry {
    id: usize,
    name: String,
    snapshot: Rc<dyn Fn() -> Value>,
    dispose: Rc<dyn Fn()>,
}

#[derive(Default)]
struct RegistryInner {
    entries: RefCell<Vec<RegistryEntry>>,
    listeners: RefCell<Vec<RegistryListener>>,
    next_id: Cell<usize>,
}

/// Registry of DevTools-visible stores (one per runtime).
#[derive(Clone, Default)]
pub struct StoreRegistry {
    inner: Rc<RegistryInner>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to registry changes.
    pub fn listen(&self, listener: impl Fn(RegistryEvent) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    fn emit(&self, event: RegistryEvent) {
        let listeners: Vec<RegistryListener> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Register `store`; returns its registry id.
    ///
    /// The store is unregistered when it is disposed.
    pub fn register<T>(&self, store: &Store<T>) -> usize
    where
        T: Clone + PartialEq + Serialize + 'static,
    {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);

        let snapshot_store = store.clone();
        let dispose_store = store.clone();
        self.inner.entries.borrow_mut().push(RegistryEntry {
            id,
            name: store.name(),
            snapshot: Rc::new(move || {
                serde_json::to_value(snapshot_store.get()).unwrap_or(Value::Null)
            }),
            dispose: Rc::new(move || dispose_store.dispose()),
        });

        let weak: Weak<RegistryInner> = Rc::downgrade(&self.inner);
        let replayed = Cell::new(false);
        let subscription = store.subscribe(move |_| {
            if !replayed.replace(true) {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                StoreRegistry { inner }.emit(RegistryEvent::Updated(id));
            }
        });

        let weak: Weak<RegistryInner> = Rc::downgrade(&self.inner);
        store.on_dispose(move || {
            subscription.unsubscribe();
            if let Some(inner) = weak.upgrade() {
                StoreRegistry { inner }.unregister(id);
            }
        });

        self.emit(RegistryEvent::New(id));
        id
    }

    fn unregister(&self, id: usize) {
        let removed = {
            let mut entries = self.inner.entries.borrow_mut();
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        };
        if removed {
            self.emit(RegistryEvent::Removed(id));
        }
    }

    /// Snapshot of every registered store, in registration order.
    pub fn snapshot(&self) -> Vec<StoreInfo> {
        let entries: Vec<(usize, String, Rc<dyn Fn() -> Value>)> = self
            .inner
            .entries
            .borrow()
            .iter()
            .map(|e| (e.id, e.name.clone(), e.snapshot.clone()))
            .collect();
        entries
            .into_iter()
            .map(|(id, name, snapshot)| StoreInfo { id, name, value: snapshot() })
            .collect()
    }

    /// Current JSON value of one store.
    pub fn value_of(&self, id: usize) -> Option<Value> {
        let snapshot = self
            .inner
            .entries
            .borrow()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.snapshot.clone());
        snapshot.map(|f| f())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every registered store.
    pub fn dispose_all(&self) {
        let disposers: Vec<Rc<dyn Fn()>> =
            self.inner.entries.borrow().iter().map(|e| e.dispose.clone()).collect();
        for dispose in disposers {
            dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_events(registry: &StoreRegistry) -> Rc<RefCell<Vec<RegistryEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let events_clone = events.clone();
        registry.listen(move |e| events_clone.borrow_mut().push(e));
        events
    }

    #[test]
    fn test_register_emits_new_then_updates() {
        let registry = StoreRegistry::new();
        let events = collect_events(&registry);

        let store = Store::named("count", 1);
        let id = registry.register(&store);
        store.set(2);

        assert_eq!(
            *events.borrow(),
            vec![RegistryEvent::New(id), RegistryEvent::Updated(id)]
        );
    }

    #[test]
    fn test_snapshot_serializes_values() {
        let registry = StoreRegistry::new();
        let store = Store::named("names", vec!["a".to_string()]);
        let id = registry.register(&store);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].name, "names");
        assert_eq!(snapshot[0].value, serde_json::json!(["a"]));
        assert_eq!(registry.value_of(id), Some(serde_json::json!(["a"])));
    }

    #[test]
    fn test_dispose_unregisters() {
        let registry = StoreRegistry::new();
        let events = collect_events(&registry);
        let store = Store::new(0);
        let id = registry.register(&store);

        store.dispose();
        assert!(registry.is_empty());
        assert_eq!(events.borrow().last(), Some(&RegistryEvent::Removed(id)));
        assert_eq!(registry.value_of(id), None);
    }

    #[test]
    fn test_dispose_all() {
        let registry = StoreRegistry::new();
        let a = Store::new(1);
        let b = Store::new(2);
        registry.register(&a);
        registry.register(&b);

        registry.dispose_all();
        assert!(a.is_disposed());
        assert!(b.is_disposed());
        assert!(registry.is_empty());
    }
}
