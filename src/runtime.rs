//! Runtime - the context object every build pass, binding and transition
//! runs against.
//!
//! One [`Runtime`] owns what would otherwise be process-wide state:
//!
//! - the animation-frame queue ([`FrameScheduler`]) and [`LoopTasks`]
//! - the keyframe [`AnimationRegistry`] and its set of active documents
//! - the DevTools [`StoreRegistry`]
//! - registered mount points
//! - [`SutilOptions`] and [`LogCategories`]
//! - the synthetic-id and name counters
//!
//! Handles are cheap to clone and share one context. [`Runtime::teardown`]
//! releases everything (the panel unload path).
//!
//! # Example
//!
//! ```ignore
//! let rt = Runtime::new();
//! let doc = rt.create_document();
//! let count = rt.make_store("count", 0);
//! mount_element(&rt, &doc, "app", counter_view(count))?;
//! rt.run_frames(500.0, 16.0);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::build::MountPoint;
use crate::dom::Document;
use crate::store::{ObservablePromise, RegistryEvent, Store, StoreRegistry};
use crate::transition::{AnimationRegistry, FrameScheduler, LoopTasks};
use crate::types::{events, DocumentId, NodeId};

// =============================================================================
// Configuration
// =============================================================================

/// User-tunable runtime options (exposed to the DevTools panel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SutilOptions {
    /// Multiply every transition duration and delay by ten.
    pub slow_animations: bool,
    /// Emit category logs through `tracing`.
    pub logging_enabled: bool,
}

impl SutilOptions {
    /// Factor applied to transition timings.
    pub fn animation_scale(&self) -> f64 {
        if self.slow_animations { 10.0 } else { 1.0 }
    }
}

/// One log category and whether it is on. Serialized as `[name, enabled]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCategory(pub String, pub bool);

/// Names of the built-in log categories.
pub const LOG_CATEGORIES: [&str; 7] = ["store", "dom", "bind", "each", "trans", "tick", "style"];

/// Ordered set of log categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogCategories(Vec<LogCategory>);

impl Default for LogCategories {
    fn default() -> Self {
        Self(
            LOG_CATEGORIES
                .iter()
                .map(|name| LogCategory(name.to_string(), false))
                .collect(),
        )
    }
}

impl LogCategories {
    pub fn new(categories: Vec<LogCategory>) -> Self {
        Self(categories)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.0.iter().any(|LogCategory(n, on)| n == name && *on)
    }

    /// Turn `name` on or off, adding it if unknown.
    pub fn set(&mut self, name: &str, enabled: bool) {
        match self.0.iter_mut().find(|c| c.0 == name) {
            Some(category) => category.1 = enabled,
            None => self.0.push(LogCategory(name.to_string(), enabled)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogCategory> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<LogCategory> {
        self.0.clone()
    }
}

// =============================================================================
// Runtime
// =============================================================================

struct RuntimeInner {
    frames: FrameScheduler,
    loop_tasks: LoopTasks,
    animations: AnimationRegistry,
    stores: StoreRegistry,
    mounts: RefCell<Vec<MountPoint>>,
    options: Cell<SutilOptions>,
    log_categories: RefCell<LogCategories>,
    waits: RefCell<HashMap<(DocumentId, NodeId), ObservablePromise<()>>>,
    next_svid: Cell<u64>,
    next_name: Cell<u64>,
    next_uid: Cell<u64>,
    next_mount: Cell<u64>,
}

/// Shared runtime context.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("now", &self.now())
            .field("options", &self.options())
            .field("stores", &self.inner.stores.len())
            .field("mount_points", &self.inner.mounts.borrow().len())
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_options(SutilOptions::default())
    }

    pub fn with_options(options: SutilOptions) -> Self {
        let frames = FrameScheduler::new();
        let loop_tasks = LoopTasks::new(frames.clone());
        let animations = AnimationRegistry::new(frames.clone());
        let stores = StoreRegistry::new();

        // Registry changes become document-level custom events.
        let active = animations.clone();
        stores.listen(move |event| {
            let (name, id) = match event {
                RegistryEvent::New(id) => (events::NEW_STORE, id),
                RegistryEvent::Updated(id) => (events::UPDATE_STORE, id),
                RegistryEvent::Removed(_) => return,
            };
            for document in active.documents() {
                document.dispatch_document_event(name, Some(json!({ "id": id })));
            }
        });

        Self {
            inner: Rc::new(RuntimeInner {
                frames,
                loop_tasks,
                animations,
                stores,
                mounts: RefCell::new(Vec::new()),
                options: Cell::new(options),
                log_categories: RefCell::new(LogCategories::default()),
                waits: RefCell::new(HashMap::new()),
                next_svid: Cell::new(0),
                next_name: Cell::new(0),
                next_uid: Cell::new(0),
                next_mount: Cell::new(0),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Documents and frames
    // =========================================================================

    /// Create a document and register it as active.
    pub fn create_document(&self) -> Document {
        let document = Document::new();
        self.register_document(&document);
        document
    }

    /// Register a document created elsewhere.
    pub fn register_document(&self, document: &Document) {
        self.inner.animations.register_document(document);
    }

    pub fn documents(&self) -> Vec<Document> {
        self.inner.animations.documents()
    }

    /// Run one animation frame at `timestamp` ms.
    pub fn run_frame(&self, timestamp: f64) {
        self.inner.frames.run_frame(timestamp);
    }

    /// Run frames every `step` ms from the current time up to `until`.
    pub fn run_frames(&self, until: f64, step: f64) {
        if step <= 0.0 {
            return;
        }
        let mut timestamp = self.now() + step;
        while timestamp <= until {
            self.run_frame(timestamp);
            timestamp += step;
        }
    }

    /// Timestamp of the latest frame.
    pub fn now(&self) -> f64 {
        self.inner.frames.now()
    }

    pub fn frames(&self) -> &FrameScheduler {
        &self.inner.frames
    }

    pub fn loop_tasks(&self) -> &LoopTasks {
        &self.inner.loop_tasks
    }

    pub fn animations(&self) -> &AnimationRegistry {
        &self.inner.animations
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Next synthetic node id (starts at 1).
    pub fn next_svid(&self) -> u64 {
        let id = self.inner.next_svid.get() + 1;
        self.inner.next_svid.set(id);
        id
    }

    /// Unique name derived from `base`, e.g. `sutil-3`.
    pub fn make_name(&self, base: &str) -> String {
        let n = self.inner.next_name.get() + 1;
        self.inner.next_name.set(n);
        format!("{base}-{n}")
    }

    pub(crate) fn next_uid(&self) -> u64 {
        let uid = self.inner.next_uid.get() + 1;
        self.inner.next_uid.set(uid);
        uid
    }

    // =========================================================================
    // Stores
    // =========================================================================

    /// Create a store visible to the DevTools panel.
    pub fn make_store<T>(&self, name: &str, value: T) -> Store<T>
    where
        T: Clone + PartialEq + Serialize + 'static,
    {
        let store = Store::named(name, value);
        let id = self.inner.stores.register(&store);
        self.log("store", &format!("make_store {name} -> #{id}"));
        store
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.inner.stores
    }

    // =========================================================================
    // Options and logging
    // =========================================================================

    pub fn options(&self) -> SutilOptions {
        self.inner.options.get()
    }

    pub fn set_options(&self, options: SutilOptions) {
        self.inner.options.set(options);
    }

    pub fn log_categories(&self) -> LogCategories {
        self.inner.log_categories.borrow().clone()
    }

    pub fn set_log_categories(&self, categories: LogCategories) {
        *self.inner.log_categories.borrow_mut() = categories;
    }

    pub fn is_logging(&self, category: &str) -> bool {
        self.options().logging_enabled && self.inner.log_categories.borrow().is_enabled(category)
    }

    /// Category log; emitted only when logging and the category are on.
    pub fn log(&self, category: &str, message: &str) {
        if self.is_logging(category) {
            tracing::debug!(category, "{message}");
        }
    }

    // =========================================================================
    // Mount points and per-node waits
    // =========================================================================

    pub(crate) fn next_mount_id(&self) -> u64 {
        let id = self.inner.next_mount.get() + 1;
        self.inner.next_mount.set(id);
        id
    }

    pub(crate) fn add_mount(&self, mount: MountPoint) {
        let mut mounts = self.inner.mounts.borrow_mut();
        mounts.retain(|m| m.id() != mount.id());
        mounts.push(mount);
    }

    pub(crate) fn find_mount(&self, id: &str) -> Option<MountPoint> {
        self.inner.mounts.borrow().iter().find(|m| m.id() == id).cloned()
    }

    pub(crate) fn remove_mount(&self, id: &str) -> Option<MountPoint> {
        let mut mounts = self.inner.mounts.borrow_mut();
        let index = mounts.iter().position(|m| m.id() == id)?;
        Some(mounts.remove(index))
    }

    pub(crate) fn mounts(&self) -> Vec<MountPoint> {
        self.inner.mounts.borrow().clone()
    }

    pub(crate) fn pending_wait(&self, document: &Document, node: NodeId) -> Option<ObservablePromise<()>> {
        self.inner.waits.borrow().get(&(document.id(), node)).cloned()
    }

    pub(crate) fn set_wait(&self, document: &Document, node: NodeId, promise: ObservablePromise<()>) {
        self.inner.waits.borrow_mut().insert((document.id(), node), promise);
    }

    pub(crate) fn clear_wait(&self, document: &Document, node: NodeId, promise: &ObservablePromise<()>) {
        let mut waits = self.inner.waits.borrow_mut();
        if waits
            .get(&(document.id(), node))
            .is_some_and(|p| p.store().ptr_eq(promise.store()))
        {
            waits.remove(&(document.id(), node));
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release everything: stores, mount points, loop tasks, keyframe rules.
    pub fn teardown(&self) {
        self.inner.stores.dispose_all();
        let mounts = std::mem::take(&mut *self.inner.mounts.borrow_mut());
        for mount in mounts {
            mount.clear();
        }
        self.inner.loop_tasks.abort_all();
        self.inner.waits.borrow_mut().clear();
        self.inner.animations.clear_rules();
        tracing::debug!("runtime torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Event;

    #[test]
    fn test_options_wire_names() {
        let options = SutilOptions { slow_animations: true, logging_enabled: false };
        let json = serde_json::to_value(options).unwrap();
        assert_eq!(json, json!({ "SlowAnimations": true, "LoggingEnabled": false }));
        assert_eq!(options.animation_scale(), 10.0);
    }

    #[test]
    fn test_log_categories_serialize_as_pairs() {
        let mut categories = LogCategories::default();
        categories.set("each", true);
        assert!(categories.is_enabled("each"));
        assert!(!categories.is_enabled("store"));

        let json = serde_json::to_value(&categories).unwrap();
        assert_eq!(json[3], json!(["each", true]));

        let back: LogCategories = serde_json::from_value(json).unwrap();
        assert_eq!(back, categories);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let rt = Runtime::new();
        assert_eq!(rt.next_svid(), 1);
        assert_eq!(rt.next_svid(), 2);
        assert_eq!(rt.make_name("sutil"), "sutil-1");
        assert_eq!(rt.make_name("sutil"), "sutil-2");
    }

    #[test]
    fn test_make_store_dispatches_document_events() {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for name in [events::NEW_STORE, events::UPDATE_STORE] {
            let seen = seen.clone();
            doc.add_document_listener(name, move |e: &Event| {
                seen.borrow_mut().push((e.name.clone(), e.detail.clone()));
            });
        }

        let store = rt.make_store("count", 0);
        store.set(1);

        let seen = seen.borrow();
        assert_eq!(seen[0], (events::NEW_STORE.to_string(), Some(json!({ "id": 1 }))));
        assert_eq!(seen[1], (events::UPDATE_STORE.to_string(), Some(json!({ "id": 1 }))));
        assert_eq!(rt.stores().snapshot()[0].value, json!(1));
    }

    #[test]
    fn test_run_frames_advances_clock() {
        let rt = Runtime::new();
        let count = Rc::new(Cell::new(0));
        let rt_clone = rt.clone();
        let count_clone = count.clone();
        let _task = rt.loop_tasks().run_loop(move |_| {
            count_clone.set(count_clone.get() + 1);
            rt_clone.now() < 64.0
        });
        rt.run_frames(100.0, 16.0);
        assert_eq!(rt.now(), 96.0);
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn test_teardown_disposes_stores() {
        let rt = Runtime::new();
        let store = rt.make_store("x", 1);
        rt.teardown();
        assert!(store.is_disposed());
        assert!(rt.stores().is_empty());
    }
}
