//! Store bindings - rebuild a view whenever a store emits.
//!
//! # Lifecycle
//!
//! - The first build happens during the subscription replay and uses the
//!   context action, so the binding lands exactly where the factory was built.
//! - Every later emission builds a fresh view with `Replace(first node)`;
//!   old extra nodes are unmounted and `sutil-updated` is dispatched on the
//!   new first node.
//! - A view that builds nothing is represented by an anchor comment so the
//!   next emission has a node to replace.
//! - The subscription is a disposable of the context parent.

use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::rc::Rc;

use crate::build::{build, BuildContext, BuildResult, DomAction, NodeFactory, NodeRef};
use crate::error::{Result, SutilError};
use crate::store::{ObservablePromise, PromiseState, Store};
use crate::types::{events, NodeFlags, NodeId};

/// Attach an anchor comment as a stand-in for an empty view.
pub(crate) fn attach_anchor(ctx: &BuildContext, label: &str) -> Result<NodeId> {
    let doc = ctx.document();
    let anchor = doc.create_comment(label);
    doc.set_flags(anchor, NodeFlags::ANCHOR, true)?;
    doc.set_svid(anchor, ctx.runtime().next_svid())?;
    if let Err(err) = ctx.attach(anchor) {
        doc.unmount(anchor);
        return Err(err);
    }
    Ok(anchor)
}

/// Action for a rebuild: replace the first old node still in the tree.
fn rebuild_action(ctx: &BuildContext, old: &[NodeId]) -> DomAction {
    let doc = ctx.document();
    let target = old
        .iter()
        .copied()
        .find(|n| doc.is_alive(*n) && doc.parent(*n).is_some());
    match (target, ctx.action()) {
        (Some(node), _) => DomAction::Replace(node),
        (None, DomAction::Replace(_)) => DomAction::Append,
        (None, action) => action,
    }
}

fn render(ctx: &BuildContext, view: &NodeFactory, node_ref: &NodeRef, first: bool) -> Result<()> {
    let doc = ctx.document();
    let old = node_ref.nodes();
    let action = if first { ctx.action() } else { rebuild_action(ctx, &old) };
    let bctx = ctx.with_action(action);

    let mut nodes = build(view, &bctx)?.nodes();
    if nodes.is_empty() {
        nodes.push(attach_anchor(&bctx, "bind")?);
    }

    for stale in old {
        if !nodes.contains(&stale) && doc.is_alive(stale) {
            doc.unmount(stale);
        }
    }
    node_ref.set(nodes.clone());

    if !first {
        ctx.runtime().log("bind", &format!("rebuilt {} node(s)", nodes.len()));
        doc.dispatch_custom(nodes[0], events::UPDATED, None);
    }
    Ok(())
}

/// Rebuild `view(value)` on every emission of `store`.
///
/// # Example
///
/// ```ignore
/// let count = Store::new(0);
/// el("div", vec![bind(count.clone(), |n| text(&n.to_string()))]);
/// count.set(5); // the text node is replaced by "5"
/// ```
pub fn bind<T>(store: Store<T>, view: impl Fn(&T) -> NodeFactory + 'static) -> NodeFactory
where
    T: Clone + PartialEq + 'static,
{
    let view = Rc::new(view);
    Rc::new(move |ctx: &BuildContext| {
        let node_ref = NodeRef::new();
        let first_error: Rc<RefCell<Option<SutilError>>> = Rc::new(RefCell::new(None));
        let built_once = Rc::new(Cell::new(false));

        let sub_ctx = ctx.clone();
        let sub_ref = node_ref.clone();
        let sub_error = first_error.clone();
        let view = view.clone();
        let subscription = store.subscribe(move |value| {
            let first = !built_once.replace(true);
            let factory = view(value);
            if let Err(err) = render(&sub_ctx, &factory, &sub_ref, first) {
                if first {
                    *sub_error.borrow_mut() = Some(err);
                } else {
                    tracing::error!(error = %err, "binding rebuild failed");
                }
            }
        });

        if let Some(err) = first_error.borrow_mut().take() {
            subscription.unsubscribe();
            return Err(err);
        }
        ctx.document().register_disposable(ctx.parent(), subscription.into_cleanup())?;
        Ok(BuildResult::Binding(node_ref))
    })
}

/// A text node whose content follows `store`. The node is never rebuilt.
pub fn bind_text<T>(store: Store<T>) -> NodeFactory
where
    T: Clone + PartialEq + Display + 'static,
{
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document();
        let node = doc.create_text_node(&store.get().to_string());
        doc.set_svid(node, ctx.runtime().next_svid())?;
        if let Err(err) = ctx.attach(node) {
            doc.unmount(node);
            return Err(err);
        }

        let owner = doc.clone();
        let subscription = store.subscribe(move |value| {
            if let Err(err) = owner.set_text_content(node, &value.to_string()) {
                tracing::warn!(error = %err, "bound text update failed");
            }
        });
        doc.register_disposable(node, subscription.into_cleanup())?;
        Ok(BuildResult::Solitary(node))
    })
}

/// Render the waiting, result or error branch of `promise`.
pub fn bind_promise<T>(
    promise: ObservablePromise<T>,
    waiting: NodeFactory,
    result: impl Fn(&T) -> NodeFactory + 'static,
    error: impl Fn(&SutilError) -> NodeFactory + 'static,
) -> NodeFactory
where
    T: Clone + PartialEq + 'static,
{
    bind(promise.store().clone(), move |state| match state {
        PromiseState::Waiting => waiting.clone(),
        PromiseState::Result(value) => result(value),
        PromiseState::Error(err) => error(err),
    })
}
