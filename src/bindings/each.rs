//! Keyed lists - `each`, `eachi`, `eachk` and `eachiko`.
//!
//! A [`Reconciler`] turns the previous and the next key order into a
//! [`Patch`]; the list block applies that patch to the DOM:
//!
//! - retained items keep their node and get their position/value stores
//!   updated in place (no rebuild)
//! - inserted items are built after the previous item and play the intro
//! - removed items play the outro, then their stores are disposed and the
//!   node unmounted
//! - retained items whose box moved play a FLIP animation when the block
//!   has an `Animate` attribute
//!
//! An anchor comment marks the start of the block; items follow it.
//!
//! # Example
//!
//! ```ignore
//! let todos = Store::new(vec![todo("a"), todo("b")]);
//! el("ul", vec![eachk(
//!     todos.clone(),
//!     |item: Store<Todo>| el("li", vec![bind_text(item.map(|t| t.title.clone()))]),
//!     |t: &Todo| t.id,
//!     vec![TransitionAttribute::InOut(fade(vec![])), TransitionAttribute::Animate(vec![])],
//! )]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::bind::attach_anchor;
use crate::build::{build, BuildContext, BuildResult, DomAction, NodeFactory, NodeRef};
use crate::error::{Result, SutilError};
use crate::store::Store;
use crate::transition::{
    animate_of, flip, intro_of, outro_of, run_transition, TransitionAttribute, TransitionHandle,
    TransitionKind,
};
use crate::types::{NodeId, Rect};

// =============================================================================
// Reconciler
// =============================================================================

/// One step of a patch, in new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    /// Keep the item at old index `from`; it ends up at `to`.
    Retain { from: usize, to: usize },
    /// Create a new item at `to`.
    Insert { to: usize },
}

/// Difference between two key sequences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
    /// Old indices whose keys are gone.
    pub removed: Vec<usize>,
}

impl Patch {
    /// True when the patch neither inserts, removes nor moves anything.
    pub fn is_identity(&self) -> bool {
        self.removed.is_empty()
            && self
                .ops
                .iter()
                .all(|op| matches!(op, PatchOp::Retain { from, to } if from == to))
    }
}

/// Tracks the current key order of a list.
#[derive(Debug, Clone, Default)]
pub struct Reconciler<K> {
    keys: Vec<K>,
}

impl<K: PartialEq + Clone> Reconciler<K> {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Diff `new_keys` against the current order and adopt them.
    ///
    /// A sequence with a repeated key is rejected and the current order is
    /// kept.
    pub fn reconcile(&mut self, new_keys: Vec<K>) -> Result<Patch> {
        for (index, key) in new_keys.iter().enumerate() {
            if new_keys[..index].contains(key) {
                return Err(SutilError::DuplicateKey { index });
            }
        }

        let mut matched = vec![false; self.keys.len()];
        let mut ops = Vec::with_capacity(new_keys.len());
        for (to, key) in new_keys.iter().enumerate() {
            let from = self
                .keys
                .iter()
                .enumerate()
                .position(|(i, old)| !matched[i] && old == key);
            match from {
                Some(from) => {
                    matched[from] = true;
                    ops.push(PatchOp::Retain { from, to });
                }
                None => ops.push(PatchOp::Insert { to }),
            }
        }
        let removed = (0..self.keys.len()).filter(|i| !matched[*i]).collect();

        self.keys = new_keys;
        Ok(Patch { ops, removed })
    }

    /// Drop the key at `index` (its item could not be recovered).
    pub fn forget(&mut self, index: usize) {
        if index < self.keys.len() {
            self.keys.remove(index);
        }
    }
}

// =============================================================================
// Items
// =============================================================================

/// One rendered list item.
pub struct KeyedStoreItem<K, V: Clone + PartialEq + 'static> {
    pub key: K,
    pub node: NodeId,
    pub svid: Option<u64>,
    pub position: Store<usize>,
    pub value: Store<V>,
    /// Box recorded after the last render.
    pub rect: Rect,
    /// Intro or move animation currently playing.
    pub animation: Option<TransitionHandle>,
}

impl<K, V: Clone + PartialEq + 'static> KeyedStoreItem<K, V> {
    fn stop_animation(&mut self) {
        if let Some(handle) = self.animation.take() {
            handle.cancel();
        }
    }

    fn dispose_stores(&self) {
        self.position.dispose();
        self.value.dispose();
    }
}

/// Item view: position and value stores to a factory.
pub type ItemView<V> = Rc<dyn Fn(Store<usize>, Store<V>) -> NodeFactory>;
/// Key of the item at an index.
pub type KeyFn<V, K> = Rc<dyn Fn(usize, &V) -> K>;

// =============================================================================
// List block
// =============================================================================

struct EachState<K, V: Clone + PartialEq + 'static> {
    reconciler: Reconciler<K>,
    items: Vec<KeyedStoreItem<K, V>>,
}

struct EachBlock<K, V: Clone + PartialEq + 'static> {
    ctx: BuildContext,
    anchor: NodeId,
    view: ItemView<V>,
    key: KeyFn<V, K>,
    trans: Vec<TransitionAttribute>,
    node_ref: NodeRef,
    /// `None` while a render pass is running.
    state: RefCell<Option<EachState<K, V>>>,
    /// Latest values emitted during a render pass.
    pending: RefCell<Option<Vec<V>>>,
}

impl<K, V> EachBlock<K, V>
where
    K: PartialEq + Clone + 'static,
    V: Clone + PartialEq + 'static,
{
    fn update(&self, values: &[V]) {
        let taken = self.state.borrow_mut().take();
        let Some(mut state) = taken else {
            *self.pending.borrow_mut() = Some(values.to_vec());
            return;
        };

        let mut current = values.to_vec();
        loop {
            if let Err(err) = self.render(&mut state, &current) {
                tracing::error!(error = %err, "list render skipped");
            }
            let next = self.pending.borrow_mut().take();
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        self.node_ref.set(
            std::iter::once(self.anchor)
                .chain(state.items.iter().map(|item| item.node))
                .collect(),
        );
        *self.state.borrow_mut() = Some(state);
    }

    /// Re-find nodes that were replaced behind our back; drop the ones that
    /// are gone for good.
    fn relocate(&self, state: &mut EachState<K, V>) {
        let doc = self.ctx.document();
        for index in (0..state.items.len()).rev() {
            let item = &mut state.items[index];
            if doc.is_alive(item.node) && doc.parent(item.node).is_some() {
                continue;
            }
            match item.svid.and_then(|svid| doc.query_by_svid(svid)) {
                Some(node) => item.node = node,
                None => {
                    tracing::warn!(svid = ?item.svid, "list item node lost; recreating it");
                    let mut lost = state.items.remove(index);
                    lost.stop_animation();
                    lost.dispose_stores();
                    state.reconciler.forget(index);
                }
            }
        }
    }

    fn render(&self, state: &mut EachState<K, V>, values: &[V]) -> Result<()> {
        let rt = self.ctx.runtime();
        let doc = self.ctx.document();

        self.relocate(state);
        let keys = values.iter().enumerate().map(|(i, v)| (self.key)(i, v)).collect();
        let patch = state.reconciler.reconcile(keys)?;
        rt.log(
            "each",
            &format!("{} item(s), {} removed", patch.ops.len(), patch.removed.len()),
        );

        let mut old: Vec<Option<KeyedStoreItem<K, V>>> = state.items.drain(..).map(Some).collect();
        let mut next = Vec::with_capacity(patch.ops.len());
        let mut retained = Vec::new();
        let mut prev = self.anchor;

        for op in &patch.ops {
            match *op {
                PatchOp::Retain { from, to } => {
                    let Some(item) = old[from].take() else { continue };
                    if item.position.get() != to {
                        item.position.set(to);
                    }
                    if item.value.get() != values[to] {
                        item.value.set(values[to].clone());
                    }
                    let moved = item.node != self.anchor && doc.previous_sibling(item.node) != Some(prev);
                    if moved {
                        if let Err(err) = doc.insert_after(prev, item.node) {
                            tracing::warn!(error = %err, "cannot move list item");
                        }
                    }
                    prev = item.node;
                    retained.push(next.len());
                    next.push(item);
                }
                PatchOp::Insert { to } => {
                    let item = self.create_item(state.reconciler.keys()[to].clone(), to, &values[to], prev);
                    prev = item.node;
                    next.push(item);
                }
            }
        }

        for from in &patch.removed {
            if let Some(item) = old[*from].take() {
                self.remove_item(item);
            }
        }

        self.animate_moves(&mut next, &retained);
        state.items = next;
        Ok(())
    }

    fn create_item(&self, key: K, position: usize, value: &V, prev: NodeId) -> KeyedStoreItem<K, V> {
        let rt = self.ctx.runtime();
        let doc = self.ctx.document();
        let position = Store::new(position);
        let value = Store::new(value.clone());
        let at = self.ctx.with_action(DomAction::After(prev));

        let factory = (self.view)(position.clone(), value.clone());
        let mut nodes = match build(&factory, &at) {
            Ok(result) => result.nodes(),
            Err(err) => {
                tracing::error!(error = %err, "list item build failed");
                Vec::new()
            }
        };
        if nodes.is_empty() {
            match attach_anchor(&at, "each-item") {
                Ok(anchor) => nodes.push(anchor),
                Err(err) => tracing::error!(error = %err, "list item placeholder failed"),
            }
        }
        if nodes.len() > 1 {
            tracing::warn!(count = nodes.len(), "list item view built several nodes; keeping the first");
            for extra in nodes.drain(1..) {
                doc.unmount(extra);
            }
        }
        let node = nodes.first().copied().unwrap_or(self.anchor);

        let animation = intro_of(&self.trans).map(|factory| {
            let t = factory(doc, node).or_fallback(doc, node);
            run_transition(rt, doc, node, TransitionKind::Intro, t, || {})
        });

        KeyedStoreItem {
            key,
            node,
            svid: doc.svid(node),
            position,
            value,
            rect: Rect::ZERO,
            animation,
        }
    }

    fn remove_item(&self, mut item: KeyedStoreItem<K, V>) {
        let rt = self.ctx.runtime();
        let doc = self.ctx.document();
        item.stop_animation();
        if item.node == self.anchor {
            item.dispose_stores();
            return;
        }

        match outro_of(&self.trans) {
            Some(factory) => {
                let t = factory(doc, item.node).or_fallback(doc, item.node);
                let owner = doc.clone();
                let node = item.node;
                run_transition(rt, doc, node, TransitionKind::Outro, t, move || {
                    item.dispose_stores();
                    owner.unmount(node);
                });
            }
            None => {
                item.dispose_stores();
                doc.unmount(item.node);
            }
        }
    }

    fn animate_moves(&self, items: &mut [KeyedStoreItem<K, V>], retained: &[usize]) {
        let Some(props) = animate_of(&self.trans) else { return };
        let rt = self.ctx.runtime();
        let doc = self.ctx.document();

        let nodes: Vec<NodeId> = items.iter().map(|item| item.node).collect();
        let rects = doc.bounding_client_rects(&nodes);
        for (index, item) in items.iter_mut().enumerate() {
            let rect = rects[index];
            // A zero box was measured while the block was detached.
            let measured = item.rect != Rect::ZERO && rect != Rect::ZERO;
            if measured && retained.contains(&index) && rect != item.rect {
                item.stop_animation();
                let t = flip(item.rect, rect, &props);
                item.animation = Some(run_transition(rt, doc, item.node, TransitionKind::Animate, t, || {}));
            }
            item.rect = rect;
        }
    }

    fn dispose(&self) {
        let taken = self.state.borrow_mut().take();
        if let Some(mut state) = taken {
            for item in &mut state.items {
                item.stop_animation();
                item.dispose_stores();
            }
        }
    }
}

/// Keyed list with index and value stores.
///
/// `key(index, value)` identifies items across emissions; a retained item
/// keeps its node and sees position/value changes through its stores.
pub fn eachiko<V, K>(
    items: Store<Vec<V>>,
    view: impl Fn(Store<usize>, Store<V>) -> NodeFactory + 'static,
    key: impl Fn(usize, &V) -> K + 'static,
    trans: Vec<TransitionAttribute>,
) -> NodeFactory
where
    V: Clone + PartialEq + 'static,
    K: PartialEq + Clone + 'static,
{
    let view: ItemView<V> = Rc::new(view);
    let key: KeyFn<V, K> = Rc::new(key);
    Rc::new(move |ctx: &BuildContext| {
        let anchor = attach_anchor(ctx, "each")?;
        let block = Rc::new(EachBlock {
            ctx: ctx.with_action(DomAction::Append),
            anchor,
            view: view.clone(),
            key: key.clone(),
            trans: trans.clone(),
            node_ref: NodeRef::new(),
            state: RefCell::new(Some(EachState { reconciler: Reconciler::new(), items: Vec::new() })),
            pending: RefCell::new(None),
        });

        let listener = block.clone();
        let subscription = items.subscribe(move |values| listener.update(values));

        let owner = block.clone();
        let cleanup = subscription.into_cleanup();
        ctx.document().register_disposable(anchor, move || {
            cleanup();
            owner.dispose();
        })?;
        Ok(BuildResult::Binding(block.node_ref.clone()))
    })
}

/// Keyed by the item itself.
pub fn each<V>(
    items: Store<Vec<V>>,
    view: impl Fn(&V) -> NodeFactory + 'static,
    trans: Vec<TransitionAttribute>,
) -> NodeFactory
where
    V: Clone + PartialEq + 'static,
{
    eachiko(items, move |_, value: Store<V>| view(&value.get()), |_, v: &V| v.clone(), trans)
}

/// Keyed by `(index, item)`; the view gets both.
pub fn eachi<V>(
    items: Store<Vec<V>>,
    view: impl Fn(usize, &V) -> NodeFactory + 'static,
    trans: Vec<TransitionAttribute>,
) -> NodeFactory
where
    V: Clone + PartialEq + 'static,
{
    eachiko(
        items,
        move |position: Store<usize>, value: Store<V>| view(position.get(), &value.get()),
        |i, v: &V| (i, v.clone()),
        trans,
    )
}

/// Keyed by `key(item)`; the view follows the item's value store.
pub fn eachk<V, K>(
    items: Store<Vec<V>>,
    view: impl Fn(Store<V>) -> NodeFactory + 'static,
    key: impl Fn(&V) -> K + 'static,
    trans: Vec<TransitionAttribute>,
) -> NodeFactory
where
    V: Clone + PartialEq + 'static,
    K: PartialEq + Clone + 'static,
{
    eachiko(items, move |_, value: Store<V>| view(value), move |_, v: &V| key(v), trans)
}
