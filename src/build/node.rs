//! Node factories - deferred descriptions of DOM, realized by [`build`].
//!
//! A [`NodeFactory`] is a shared closure from a [`BuildContext`] to a
//! [`BuildResult`]. Factories hold no per-build state, so building the same
//! factory twice produces two independent subtrees.
//!
//! # Example
//!
//! ```ignore
//! let view = el("ul", vec![
//!     class("items"),
//!     el("li", vec![text("one")]),
//!     el("li", vec![text("two")]),
//!     on("click", |e| println!("clicked {:?}", e.target)),
//! ]);
//! build(&view, &BuildContext::new(&rt, &doc, doc.body()))?;
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::context::{BuildContext, NamedStyleSheet};
use crate::dom::{style as css, Event};
use crate::error::{Result, SutilError};
use crate::types::{events, NodeFlags, NodeId};

/// Deferred DOM construction.
pub type NodeFactory = Rc<dyn Fn(&BuildContext) -> Result<BuildResult>>;

// =============================================================================
// NodeRef / BuildResult
// =============================================================================

/// The node(s) a binding currently owns; updated on every rebuild.
#[derive(Clone, Default)]
pub struct NodeRef {
    nodes: Rc<RefCell<Vec<NodeId>>>,
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&*self.nodes.borrow()).finish()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.nodes, &other.nodes)
    }
}

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.nodes.borrow().clone()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes.borrow().first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.nodes.borrow().last().copied()
    }

    pub fn set(&self, nodes: Vec<NodeId>) {
        *self.nodes.borrow_mut() = nodes;
    }
}

/// What a factory produced.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildResult {
    /// Nothing placed (attributes, listeners, disposables).
    Unit,
    Solitary(NodeId),
    Fragment(Vec<NodeId>),
    /// A binding whose nodes change over time.
    Binding(NodeRef),
}

impl BuildResult {
    /// Nodes placed by the build, in document order.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            BuildResult::Unit => Vec::new(),
            BuildResult::Solitary(node) => vec![*node],
            BuildResult::Fragment(nodes) => nodes.clone(),
            BuildResult::Binding(node_ref) => node_ref.nodes(),
        }
    }
}

/// Realize `factory` in `ctx`. The factory runs exactly once.
pub fn build(factory: &NodeFactory, ctx: &BuildContext) -> Result<BuildResult> {
    factory(ctx)
}

/// Build `children` one after another, advancing the action past every
/// placed node.
pub(crate) fn build_children(children: &[NodeFactory], ctx: &BuildContext) -> Result<Vec<NodeId>> {
    let mut action = ctx.action();
    let mut placed = Vec::new();
    for child in children {
        let nodes = build(child, &ctx.with_action(action))?.nodes();
        if let Some(last) = nodes.last() {
            action = action.advance(*last);
        }
        placed.extend(nodes);
    }
    Ok(placed)
}

// =============================================================================
// Factories
// =============================================================================

/// An element with `children` (attributes, listeners and child nodes).
pub fn el(tag: &str, children: Vec<NodeFactory>) -> NodeFactory {
    let tag = tag.to_string();
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document();
        let node = doc.create_element(&tag);
        doc.set_svid(node, ctx.runtime().next_svid())?;

        let inner = ctx.with_parent(node).with_action(super::DomAction::Append);
        if let Err(err) = build_children(&children, &inner) {
            doc.unmount(node);
            return Err(err);
        }
        if let Some(sheet) = ctx.style_sheet() {
            sheet.install(doc)?;
            doc.add_class(node, sheet.class_name())?;
        }
        if let Err(err) = ctx.attach(node) {
            doc.unmount(node);
            return Err(err);
        }

        ctx.runtime().log("dom", &format!("built <{tag}> {node}"));
        doc.set_flags(node, NodeFlags::MOUNTED, true)?;
        doc.dispatch_custom(node, events::MOUNT, None);
        Ok(BuildResult::Solitary(node))
    })
}

/// A text node.
pub fn text(value: &str) -> NodeFactory {
    let value = value.to_string();
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document();
        let node = doc.create_text_node(&value);
        doc.set_svid(node, ctx.runtime().next_svid())?;
        if let Err(err) = ctx.attach(node) {
            doc.unmount(node);
            return Err(err);
        }
        Ok(BuildResult::Solitary(node))
    })
}

/// Set an attribute of the context parent. `class` and `style` merge with
/// the existing value; `value` and `checked` also set the form property.
pub fn attr(name: &str, value: &str) -> NodeFactory {
    let name = name.to_string();
    let value = value.to_string();
    Rc::new(move |ctx: &BuildContext| {
        set_attr(ctx, ctx.parent(), &name, &value)?;
        Ok(BuildResult::Unit)
    })
}

/// Apply one attribute through the context ops, wrapping failures with the
/// element context.
pub(crate) fn set_attr(ctx: &BuildContext, node: NodeId, name: &str, value: &str) -> Result<()> {
    let doc = ctx.document();
    let apply = || -> Result<()> {
        let set = &ctx.ops().set_attribute;
        match name {
            "class" => {
                let mut classes = doc.class_list(node);
                for class in value.split_whitespace() {
                    if !classes.iter().any(|c| c == class) {
                        classes.push(class.to_string());
                    }
                }
                set(doc, node, "class", &classes.join(" "))
            }
            "style" => {
                let current = doc.get_attribute(node, "style").unwrap_or_default();
                set(doc, node, "style", &css::merge_style(&current, value))
            }
            "value" => {
                doc.set_value(node, value)?;
                set(doc, node, name, value)
            }
            "checked" => {
                doc.set_checked(node, value != "false")?;
                set(doc, node, name, value)
            }
            _ => set(doc, node, name, value),
        }
    };
    apply().map_err(|source| {
        let kind = doc.kind(node);
        let tag = kind.as_ref().map(|k| k.tag().to_string()).unwrap_or_else(|_| "?".into());
        let node_type = kind.as_ref().map(|k| k.type_name()).unwrap_or("freed");
        SutilError::attr(name, &tag, node_type, source)
    })
}

/// Several siblings built in sequence.
pub fn fragment(children: Vec<NodeFactory>) -> NodeFactory {
    Rc::new(move |ctx: &BuildContext| Ok(BuildResult::Fragment(build_children(&children, ctx)?)))
}

/// Builds nothing.
pub fn unit() -> NodeFactory {
    Rc::new(|_: &BuildContext| Ok(BuildResult::Unit))
}

/// Listen for `event` on the context parent; removed on cleanup.
pub fn on(event: &str, handler: impl Fn(&Event) + 'static) -> NodeFactory {
    let event = event.to_string();
    let handler = Rc::new(handler);
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document();
        let node = ctx.parent();
        let handler = handler.clone();
        let id = doc.add_event_listener(node, &event, move |e: &Event| handler(e))?;
        let owner = doc.clone();
        doc.register_disposable(node, move || owner.remove_event_listener(node, id))?;
        Ok(BuildResult::Unit)
    })
}

/// Add classes to the context parent.
pub fn class(name: &str) -> NodeFactory {
    attr("class", name)
}

/// Merge inline style declarations into the context parent.
pub fn style(declarations: &[(&str, &str)]) -> NodeFactory {
    let decls: Vec<(String, String)> = declarations
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    attr("style", &css::emit_style_attr(&decls))
}

/// Build `view` with `sheet` scoping every element under it.
pub fn with_style(sheet: NamedStyleSheet, view: NodeFactory) -> NodeFactory {
    Rc::new(move |ctx: &BuildContext| build(&view, &ctx.with_style_sheet(sheet.clone())))
}

/// Run `f` when the context parent is cleaned up.
pub fn disposable(f: impl Fn() + 'static) -> NodeFactory {
    let f = Rc::new(f);
    Rc::new(move |ctx: &BuildContext| {
        let f = f.clone();
        ctx.document().register_disposable(ctx.parent(), move || f())?;
        Ok(BuildResult::Unit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{DomAction, DomOps};
    use crate::dom::Document;
    use crate::runtime::Runtime;
    use std::cell::Cell;

    fn setup() -> (Runtime, Document, BuildContext) {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let ctx = BuildContext::new(&rt, &doc, doc.body());
        (rt, doc, ctx)
    }

    #[test]
    fn test_build_twice_gives_independent_subtrees() {
        let (_rt, doc, ctx) = setup();
        let view = el("div", vec![text("x")]);

        let a = build(&view, &ctx).unwrap().nodes()[0];
        let b = build(&view, &ctx).unwrap().nodes()[0];

        assert_ne!(a, b);
        assert_eq!(doc.text_content(a), "x");
        assert_eq!(doc.text_content(b), "x");
        assert_ne!(doc.children(a)[0], doc.children(b)[0]);
        assert_ne!(doc.svid(a), doc.svid(b));
    }

    #[test]
    fn test_el_assigns_svid_and_dispatches_mount() {
        let (_rt, doc, ctx) = setup();
        let mounted = Rc::new(Cell::new(None));
        let mounted_clone = mounted.clone();
        doc.add_document_listener(events::MOUNT, move |e: &Event| mounted_clone.set(e.target));

        let node = build(&el("section", vec![]), &ctx).unwrap().nodes()[0];
        assert_eq!(mounted.get(), Some(node));
        assert!(doc.flags(node).contains(NodeFlags::MOUNTED));
        assert_eq!(
            doc.get_attribute(node, crate::types::SVID_ATTRIBUTE),
            doc.svid(node).map(|s| s.to_string())
        );
    }

    #[test]
    fn test_children_mount_before_parent() {
        let (_rt, doc, ctx) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));
        let order_clone = order.clone();
        let doc_clone = doc.clone();
        doc.add_document_listener(events::MOUNT, move |e: &Event| {
            let tag = e.target.and_then(|n| doc_clone.tag_name(n)).unwrap_or_default();
            order_clone.borrow_mut().push(tag);
        });

        build(&el("ul", vec![el("li", vec![])]), &ctx).unwrap();
        assert_eq!(*order.borrow(), vec!["li".to_string(), "ul".to_string()]);
    }

    #[test]
    fn test_attr_special_names() {
        let (_rt, doc, ctx) = setup();
        let view = el(
            "input",
            vec![
                class("a"),
                class("b a"),
                style(&[("color", "red")]),
                attr("style", "margin:0"),
                attr("value", "hello"),
                attr("checked", "true"),
            ],
        );
        let node = build(&view, &ctx).unwrap().nodes()[0];

        assert_eq!(doc.get_attribute(node, "class").as_deref(), Some("a b"));
        assert_eq!(doc.get_attribute(node, "style").as_deref(), Some("color:red;margin:0;"));
        assert_eq!(doc.value(node), "hello");
        assert!(doc.checked(node));
    }

    #[test]
    fn test_attr_error_carries_context() {
        let (_rt, doc, ctx) = setup();
        let text_node = doc.create_text_node("t");
        doc.append_child(doc.body(), text_node).unwrap();

        let err = build(&attr("id", "x"), &ctx.with_parent(text_node)).unwrap_err();
        match err {
            SutilError::Attr { name, tag, node_type, source } => {
                assert_eq!(name, "id");
                assert_eq!(tag, "#text");
                assert_eq!(node_type, "text");
                assert_eq!(*source, SutilError::NotAContainer(text_node));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_failed_child_leaves_nothing_attached() {
        let (_rt, doc, ctx) = setup();
        let failing: NodeFactory = Rc::new(|ctx: &BuildContext| {
            Err(SutilError::ElementNotFound(ctx.make_name("missing")))
        });
        assert!(build(&el("div", vec![failing]), &ctx).is_err());
        assert!(doc.children(doc.body()).is_empty());
    }

    #[test]
    fn test_fragment_after_replace_keeps_order() {
        let (_rt, doc, ctx) = setup();
        let before = build(&el("hr", vec![]), &ctx).unwrap().nodes()[0];
        let old = build(&el("p", vec![]), &ctx).unwrap().nodes()[0];
        let after = build(&el("hr", vec![]), &ctx).unwrap().nodes()[0];

        let nodes = build(
            &fragment(vec![el("a", vec![]), unit(), el("b", vec![]), el("c", vec![])]),
            &ctx.with_action(DomAction::Replace(old)),
        )
        .unwrap()
        .nodes();

        assert_eq!(nodes.len(), 3);
        let mut expected = vec![before];
        expected.extend(nodes.iter().copied());
        expected.push(after);
        assert_eq!(doc.children(doc.body()), expected);
    }

    #[test]
    fn test_fragment_before_reference() {
        let (_rt, doc, ctx) = setup();
        let tail = build(&el("footer", vec![]), &ctx).unwrap().nodes()[0];
        let nodes = build(
            &fragment(vec![text("1"), text("2")]),
            &ctx.with_action(DomAction::Before(tail)),
        )
        .unwrap()
        .nodes();

        let mut expected = nodes.clone();
        expected.push(tail);
        assert_eq!(doc.children(doc.body()), expected);
    }

    #[test]
    fn test_on_listener_removed_by_cleanup() {
        let (_rt, doc, ctx) = setup();
        let clicks = Rc::new(Cell::new(0));
        let clicks_clone = clicks.clone();
        let button = build(
            &el("button", vec![on("click", move |_| clicks_clone.set(clicks_clone.get() + 1))]),
            &ctx,
        )
        .unwrap()
        .nodes()[0];

        doc.dispatch_custom(button, "click", None);
        doc.cleanup(button);
        doc.dispatch_custom(button, "click", None);
        assert_eq!(clicks.get(), 1);
        assert_eq!(doc.listener_count(button), 0);
    }

    #[test]
    fn test_disposable_runs_on_cleanup() {
        let (_rt, doc, ctx) = setup();
        let disposed = Rc::new(Cell::new(false));
        let disposed_clone = disposed.clone();
        let div = build(&el("div", vec![disposable(move || disposed_clone.set(true))]), &ctx)
            .unwrap()
            .nodes()[0];
        doc.unmount(div);
        assert!(disposed.get());
    }

    #[test]
    fn test_scoped_style_sheet_class() {
        let (_rt, doc, ctx) = setup();
        let sheet = crate::build::NamedStyleSheet::new("devtools", vec![]);
        let div = build(&el("div", vec![]), &ctx.with_style_sheet(sheet)).unwrap().nodes()[0];
        assert!(doc.has_class(div, "devtools"));
    }

    #[test]
    fn test_with_style_scopes_nested_elements() {
        let (_rt, doc, ctx) = setup();
        let sheet = crate::build::NamedStyleSheet::new("panel", vec![("a".into(), "color: blue;".into())]);
        let view = with_style(sheet, el("div", vec![el("a", vec![])]));
        let div = build(&view, &ctx).unwrap().nodes()[0];
        let link = doc.children(div)[0];
        assert!(doc.has_class(div, "panel"));
        assert!(doc.has_class(link, "panel"));
        assert_eq!(doc.query_all_tag("style").len(), 1);
    }

    #[test]
    fn test_ops_route_attribute_writes() {
        let (_rt, doc, ctx) = setup();
        let writes = Rc::new(Cell::new(0));
        let writes_clone = writes.clone();
        let ops = DomOps {
            set_attribute: Rc::new(move |doc: &Document, node: NodeId, name: &str, value: &str| {
                writes_clone.set(writes_clone.get() + 1);
                doc.set_attribute(node, name, value)
            }),
            ..DomOps::default()
        };
        build(&el("div", vec![attr("title", "t"), class("c")]), &ctx.with_ops(ops)).unwrap();
        assert_eq!(writes.get(), 2);
        assert_eq!(doc.children(doc.body()).len(), 1);
    }
}
