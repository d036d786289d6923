//! End-to-end scenarios across stores, the builder, bindings, transitions
//! and the DevTools panel.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;

use sutil_devtools::devtools::Page;
use sutil_devtools::transition::{run_transition, TransitionKind};
use sutil_devtools::*;

fn page() -> (Runtime, Document, NodeId) {
    let rt = Runtime::new();
    let doc = rt.create_document();
    let host = doc.create_element("div");
    doc.set_attribute(host, "id", "app").unwrap();
    doc.append_child(doc.body(), host).unwrap();
    (rt, doc, host)
}

#[test]
fn build_twice_gives_independent_subtrees() {
    let (rt, doc, host) = page();
    let ctx = BuildContext::new(&rt, &doc, host);
    let view = el("div", vec![text("x")]);

    let a = build(&view, &ctx).unwrap().nodes()[0];
    let b = build(&view, &ctx).unwrap().nodes()[0];
    assert_ne!(a, b);
    assert_eq!(doc.children(host), vec![a, b]);
    assert_eq!(doc.text_content(a), "x");
    assert_eq!(doc.text_content(b), "x");

    doc.set_text_content(a, "changed").unwrap();
    assert_eq!(doc.text_content(b), "x");
}

#[test]
fn bound_span_updates_synchronously() {
    let (rt, doc, host) = page();
    let count = rt.make_store("count", 0);
    let app = el("span", vec![bind(count.clone(), |n: &i32| text(&n.to_string()))]);
    mount_element(&rt, &doc, "app", app).unwrap();

    let span = doc.children(host)[0];
    assert_eq!(doc.text_content(span), "0");
    count.set(5);
    assert_eq!(doc.text_content(span), "5");
}

#[test]
fn keyed_each_keeps_surviving_nodes() {
    let (rt, doc, host) = page();
    let items = Store::new(vec!["A".to_string(), "B".to_string(), "C".to_string()]);
    let created = Rc::new(Cell::new(0));
    let counter = created.clone();
    let app = el(
        "ul",
        vec![each(
            items.clone(),
            move |item: &String| {
                counter.set(counter.get() + 1);
                el("li", vec![text(item)])
            },
            Vec::new(),
        )],
    );
    mount_element(&rt, &doc, "app", app).unwrap();
    let ul = doc.children(host)[0];
    let before = doc.element_children(ul);
    assert_eq!(before.len(), 3);
    assert_eq!(created.get(), 3);

    items.set(vec!["B".to_string(), "C".to_string(), "D".to_string()]);
    let after = doc.element_children(ul);
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[1]);
    assert_eq!(after[1], before[2]);
    assert!(!doc.is_alive(before[0]));
    assert_eq!(created.get(), 4);
    assert_eq!(doc.text_content(ul), "BCD");
}

#[test]
fn cancelled_transition_leaks_no_rules() {
    let (rt, doc, host) = page();
    let transition = fade(vec![TransitionProp::Duration(100.0)])(&doc, host);
    let handle = run_transition(&rt, &doc, host, TransitionKind::Intro, transition, || {});

    rt.run_frame(0.0);
    assert_eq!(rt.animations().num_active_animations(), 1);
    let sheet = doc.keyframes_sheet().unwrap();
    assert_eq!(doc.css_rules(sheet).len(), 1);

    handle.cancel();
    rt.run_frame(16.0);
    assert_eq!(rt.animations().num_active_animations(), 0);
    assert!(doc.find_keyframes_sheet().is_none_or(|sheet| doc.css_rules(sheet).is_empty()));
}

#[test]
fn devtools_panel_inspects_a_live_page() {
    // Inspected page.
    let (page_rt, page_doc, _host) = page();
    let count = page_rt.make_store("count", 0);
    let app = bind(count.clone(), |n: &i32| el("p", vec![text(&n.to_string())]));
    mount_element(&page_rt, &page_doc, "app", app).unwrap();
    let (panel_port, page_port) = MemoryPort::pair();
    let _agent = PageAgent::attach(&page_doc, page_port);
    let window = LocalInspectedWindow::with_control(Rc::new(PageControlBlock::new(&page_rt)));

    // Panel.
    let panel_rt = Runtime::new();
    let panel_doc = panel_rt.create_document();
    let panel = Panel::start(&panel_rt, &panel_doc, Rc::new(panel_port), Rc::new(window.clone()), 1).unwrap();
    window.flush();

    let model = panel.model();
    assert!(model.connected);
    assert_eq!(model.stores.len(), 1);
    assert_eq!(model.mount_points.len(), 1);

    count.set(3);
    window.flush();
    assert_eq!(panel.model().stores[0].value, json!(3));
    let rows = panel_doc.query_all_tag("tr");
    assert_eq!(panel_doc.text_content(rows[1]), "1count3");

    // Flip an option from the panel UI.
    panel.dispatch(devtools::Message::SetPage(Page::Options));
    window.flush();
    let slow = panel_doc.query_all_tag("input")[0];
    panel_doc.set_checked(slow, true).unwrap();
    panel_doc.dispatch_custom(slow, types::events::CHANGE, None);
    window.flush();
    assert!(page_rt.options().slow_animations);

    // Remount the page's app from the panel; the old binding goes away.
    let host = page_doc.get_element_by_id("app").unwrap();
    let subscribers = count.subscriber_count();
    let before = page_doc.children(host)[0];
    panel.dispatch(devtools::Message::Remount("app".into()));
    window.flush();
    assert_eq!(count.subscriber_count(), subscribers);
    let after = page_doc.children(host);
    assert_eq!(after.len(), 1);
    assert_ne!(before, after[0]);
    assert_eq!(page_doc.text_content(after[0]), "3");

    count.set(4);
    window.flush();
    let after = page_doc.children(host);
    assert_eq!(after.len(), 1);
    assert_eq!(page_doc.text_content(after[0]), "4");
    panel.dispatch(devtools::Message::SetPage(Page::Stores));
    window.flush();
    let rows = panel_doc.query_all_tag("tr");
    assert_eq!(panel_doc.text_content(rows[1]), "1count4");

    panel.stop();
}

proptest! {
    #[test]
    fn subscribers_see_replay_then_one_per_set(sets in proptest::collection::vec(any::<i16>(), 0..20)) {
        let store = Store::new(0i16);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(move |v: &i16| sink.borrow_mut().push(*v));
        for v in &sets {
            store.set(*v);
        }
        let seen = seen.borrow();
        prop_assert_eq!(seen.len(), sets.len() + 1);
        prop_assert_eq!(seen[0], 0);
        prop_assert_eq!(&seen[1..], &sets[..]);
    }
}
