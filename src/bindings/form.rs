//! Attribute, class and form bindings on the context parent.
//!
//! `bind_attr_in` pushes store values into the element, `bind_attr_out`
//! pulls `input`/`change` values back into the store and `bind_attr` does
//! both. `value` and `checked` are read and written as form properties.

use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;

use crate::build::{BuildContext, BuildResult, NodeFactory};
use crate::dom::{Document, Event};
use crate::error::Result;
use crate::store::Store;
use crate::types::{events, NodeId};

/// Write `value` to `name` on `node`, going through the context ops.
fn write_bound(ctx: &BuildContext, node: NodeId, name: &str, value: &str) -> Result<()> {
    let doc = ctx.document();
    match name {
        "value" => doc.set_value(node, value)?,
        "checked" => doc.set_checked(node, value == "true")?,
        _ => {}
    }
    (ctx.ops().set_attribute)(doc, node, name, value)
}

/// Read `name` back from `node`.
fn read_bound(doc: &Document, node: NodeId, name: &str) -> Option<String> {
    match name {
        "value" => Some(doc.value(node)),
        "checked" => Some(doc.checked(node).to_string()),
        _ => doc.get_attribute(node, name),
    }
}

/// Listen on `node`, removing the listener when `node` is cleaned up.
fn listen(doc: &Document, node: NodeId, event: &str, handler: impl Fn(&Event) + 'static) -> Result<()> {
    let id = doc.add_event_listener(node, event, handler)?;
    let owner = doc.clone();
    doc.register_disposable(node, move || owner.remove_event_listener(node, id))
}

fn subscribe_in<T>(ctx: &BuildContext, name: &str, store: &Store<T>) -> Result<()>
where
    T: Clone + PartialEq + Display + 'static,
{
    let node = ctx.parent();
    let sub_ctx = ctx.clone();
    let name = name.to_string();
    let subscription = store.subscribe(move |value| {
        if let Err(err) = write_bound(&sub_ctx, node, &name, &value.to_string()) {
            tracing::warn!(error = %err, attribute = %name, "bound attribute update failed");
        }
    });
    ctx.document().register_disposable(node, subscription.into_cleanup())
}

fn listen_out<T>(ctx: &BuildContext, name: &str, store: &Store<T>) -> Result<()>
where
    T: Clone + PartialEq + FromStr + 'static,
{
    let doc = ctx.document();
    let node = ctx.parent();
    for event in [events::INPUT, events::CHANGE] {
        let reader = doc.clone();
        let store = store.clone();
        let name = name.to_string();
        listen(doc, node, event, move |_| {
            let Some(raw) = read_bound(&reader, node, &name) else { return };
            match raw.parse::<T>() {
                Ok(value) => store.set(value),
                Err(_) => tracing::warn!(attribute = %name, value = %raw, "cannot parse bound value"),
            }
        })?;
    }
    Ok(())
}

/// One-way binding: store to attribute.
pub fn bind_attr_in<T>(name: &str, store: Store<T>) -> NodeFactory
where
    T: Clone + PartialEq + Display + 'static,
{
    let name = name.to_string();
    Rc::new(move |ctx: &BuildContext| {
        subscribe_in(ctx, &name, &store)?;
        Ok(BuildResult::Unit)
    })
}

/// One-way binding: `input`/`change` on the element to store.
pub fn bind_attr_out<T>(name: &str, store: Store<T>) -> NodeFactory
where
    T: Clone + PartialEq + FromStr + 'static,
{
    let name = name.to_string();
    Rc::new(move |ctx: &BuildContext| {
        listen_out(ctx, &name, &store)?;
        Ok(BuildResult::Unit)
    })
}

/// Two-way binding, typically `value` or `checked`.
pub fn bind_attr<T>(name: &str, store: Store<T>) -> NodeFactory
where
    T: Clone + PartialEq + Display + FromStr + 'static,
{
    let name = name.to_string();
    Rc::new(move |ctx: &BuildContext| {
        subscribe_in(ctx, &name, &store)?;
        listen_out(ctx, &name, &store)?;
        Ok(BuildResult::Unit)
    })
}

/// Toggle `class` on the context parent while `active` holds.
pub fn bind_class(active: Store<bool>, class: &str) -> NodeFactory {
    let class = class.to_string();
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document().clone();
        let node = ctx.parent();
        let class = class.clone();
        let subscription = active.subscribe(move |on| {
            if let Err(err) = doc.toggle_class(node, &class, *on) {
                tracing::warn!(error = %err, class = %class, "bound class update failed");
            }
        });
        ctx.document().register_disposable(node, subscription.into_cleanup())?;
        Ok(BuildResult::Unit)
    })
}

/// Checkbox group: the element is checked while its `value` is in `group`;
/// toggling it adds or removes that value.
pub fn bind_group(group: Store<Vec<String>>) -> NodeFactory {
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document();
        let node = ctx.parent();

        let writer = doc.clone();
        let subscription = group.subscribe(move |members| {
            let value = writer.value(node);
            if let Err(err) = writer.set_checked(node, members.contains(&value)) {
                tracing::warn!(error = %err, "bound group update failed");
            }
        });
        doc.register_disposable(node, subscription.into_cleanup())?;

        let reader = doc.clone();
        let group = group.clone();
        listen(doc, node, events::CHANGE, move |_| {
            let value = reader.value(node);
            let checked = reader.checked(node);
            group.modify(|members| {
                let present = members.contains(&value);
                if checked && !present {
                    members.push(value.clone());
                } else if !checked && present {
                    members.retain(|m| *m != value);
                }
            });
        })?;
        Ok(BuildResult::Unit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{attr, build, el};
    use crate::runtime::Runtime;

    fn setup() -> (Runtime, Document, BuildContext) {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let ctx = BuildContext::new(&rt, &doc, doc.body());
        (rt, doc, ctx)
    }

    #[test]
    fn test_attr_in_follows_store() {
        let (_rt, doc, ctx) = setup();
        let title = Store::new("one".to_string());
        let div = build(&el("div", vec![bind_attr_in("title", title.clone())]), &ctx)
            .unwrap()
            .nodes()[0];
        assert_eq!(doc.get_attribute(div, "title").as_deref(), Some("one"));
        title.set("two".into());
        assert_eq!(doc.get_attribute(div, "title").as_deref(), Some("two"));
    }

    #[test]
    fn test_attr_out_parses_input() {
        let (_rt, doc, ctx) = setup();
        let age = Store::new(0u32);
        let input = build(&el("input", vec![bind_attr_out("value", age.clone())]), &ctx)
            .unwrap()
            .nodes()[0];

        doc.set_value(input, "42").unwrap();
        doc.dispatch_custom(input, events::INPUT, None);
        assert_eq!(age.get(), 42);

        doc.set_value(input, "not a number").unwrap();
        doc.dispatch_custom(input, events::CHANGE, None);
        assert_eq!(age.get(), 42);
    }

    #[test]
    fn test_two_way_checked() {
        let (_rt, doc, ctx) = setup();
        let flag = Store::new(true);
        let input = build(&el("input", vec![bind_attr("checked", flag.clone())]), &ctx)
            .unwrap()
            .nodes()[0];
        assert!(doc.checked(input));

        doc.set_checked(input, false).unwrap();
        doc.dispatch_custom(input, events::CHANGE, None);
        assert!(!flag.get());

        flag.set(true);
        assert!(doc.checked(input));
        assert_eq!(doc.get_attribute(input, "checked").as_deref(), Some("true"));
    }

    #[test]
    fn test_bind_class_toggles() {
        let (_rt, doc, ctx) = setup();
        let active = Store::new(false);
        let li = build(&el("li", vec![attr("class", "item"), bind_class(active.clone(), "active")]), &ctx)
            .unwrap()
            .nodes()[0];
        assert_eq!(doc.class_list(li), vec!["item".to_string()]);
        active.set(true);
        assert!(doc.has_class(li, "active"));
        active.set(false);
        assert!(!doc.has_class(li, "active"));
    }

    #[test]
    fn test_group_membership() {
        let (_rt, doc, ctx) = setup();
        let group = Store::new(vec!["red".to_string()]);
        let red = build(&el("input", vec![attr("value", "red"), bind_group(group.clone())]), &ctx)
            .unwrap()
            .nodes()[0];
        let blue = build(&el("input", vec![attr("value", "blue"), bind_group(group.clone())]), &ctx)
            .unwrap()
            .nodes()[0];
        assert!(doc.checked(red));
        assert!(!doc.checked(blue));

        doc.set_checked(blue, true).unwrap();
        doc.dispatch_custom(blue, events::CHANGE, None);
        assert_eq!(group.get(), vec!["red".to_string(), "blue".to_string()]);

        doc.set_checked(red, false).unwrap();
        doc.dispatch_custom(red, events::CHANGE, None);
        assert_eq!(group.get(), vec!["blue".to_string()]);
        assert!(!doc.checked(red));
    }

    #[test]
    fn test_bindings_released_with_element() {
        let (_rt, doc, ctx) = setup();
        let text = Store::new("a".to_string());
        let input = build(&el("input", vec![bind_attr("value", text.clone())]), &ctx)
            .unwrap()
            .nodes()[0];
        assert_eq!(text.subscriber_count(), 1);
        assert_eq!(doc.listener_count(input), 2);
        doc.unmount(input);
        assert_eq!(text.subscriber_count(), 0);
    }
}
