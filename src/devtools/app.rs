//! The DevTools panel as an Elmish program.
//!
//! [`init`] and [`update`] are pure; every page query goes out as a
//! [`Cmd`] over the [`DevToolsClient`] and comes back as a message.
//! [`view`] renders the tab bar and the active page.
//!
//! ```ignore
//! let program = make_program(client.clone(), init, move |msg, model| update(&client, msg, model));
//! mount_element(&rt, &doc, "panel", view(program.model().clone(), program.dispatcher()))?;
//! ```

use std::rc::Rc;

use serde_json::Value;

use super::protocol::{InboundMessage, LogCategory, MountPointInfo, StoreInfo, SutilOptions};
use super::window::DevToolsClient;
use crate::bindings::{bind, bind_attr_in, bind_class, bind_text, eachk};
use crate::build::{attr, build, class, el, on, text, unit, with_style, BuildContext, NamedStyleSheet, NodeFactory};
use crate::dom::Event;
use crate::error::SutilError;
use crate::store::{Cmd, Dispatch, Store};
use crate::types::events;

// =============================================================================
// Model
// =============================================================================

/// Panel tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Stores,
    Options,
    Logging,
    MountPoints,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Stores, Page::Options, Page::Logging, Page::MountPoints];

    pub fn label(self) -> &'static str {
        match self {
            Page::Stores => "Stores",
            Page::Options => "Options",
            Page::Logging => "Logging",
            Page::MountPoints => "Mount Points",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub page: Page,
    pub log_categories: Vec<LogCategory>,
    pub stores: Vec<StoreInfo>,
    pub options: SutilOptions,
    pub mount_points: Vec<MountPointInfo>,
    /// The inspected page answered `init`.
    pub connected: bool,
    /// Last failed request, cleared by `Refresh`.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SetPage(Page),
    Refresh,
    ContentPageConnected,
    NewStore(Option<usize>),
    StoreUpdated(usize),
    StoresLoaded(Vec<StoreInfo>),
    StoreValueLoaded(usize, Value),
    OptionsLoaded(SutilOptions),
    LogCategoriesLoaded(Vec<LogCategory>),
    MountPointsLoaded(Vec<MountPointInfo>),
    SetSlowAnimations(bool),
    SetLoggingEnabled(bool),
    SetLogCategory(String, bool),
    Remount(String),
    RequestFailed(String),
}

impl Message {
    /// Translate a port message from the inspected page.
    pub fn from_inbound(message: InboundMessage) -> Message {
        match message {
            InboundMessage::ContentPageConnected => Message::ContentPageConnected,
            InboundMessage::SutilNewStore { id } => Message::NewStore(id),
            InboundMessage::SutilUpdateStore { id: Some(id) } => Message::StoreUpdated(id),
            // No id: reload the whole table.
            InboundMessage::SutilUpdateStore { id: None } => Message::NewStore(None),
        }
    }
}

// =============================================================================
// Update
// =============================================================================

fn failed(err: SutilError) -> Message {
    Message::RequestFailed(err.to_string())
}

fn load_stores(client: &DevToolsClient) -> Cmd<Message> {
    Cmd::of_promise(client.get_stores(), Message::StoresLoaded, failed)
}

fn load_options(client: &DevToolsClient) -> Cmd<Message> {
    Cmd::of_promise(client.get_options(), Message::OptionsLoaded, failed)
}

fn load_log_categories(client: &DevToolsClient) -> Cmd<Message> {
    Cmd::of_promise(client.get_log_categories(), Message::LogCategoriesLoaded, failed)
}

fn load_mount_points(client: &DevToolsClient) -> Cmd<Message> {
    Cmd::of_promise(client.get_mount_points(), Message::MountPointsLoaded, failed)
}

fn load_page(client: &DevToolsClient, page: Page) -> Cmd<Message> {
    match page {
        Page::Stores => load_stores(client),
        Page::Options => load_options(client),
        Page::Logging => load_log_categories(client),
        Page::MountPoints => load_mount_points(client),
    }
}

fn refresh(client: &DevToolsClient) -> Cmd<Message> {
    Cmd::batch([
        load_stores(client),
        load_options(client),
        load_log_categories(client),
        load_mount_points(client),
    ])
}

fn save_options(client: &DevToolsClient, options: SutilOptions) -> Cmd<Message> {
    Cmd::of_promise(client.set_options(options), move |()| Message::OptionsLoaded(options), failed)
}

/// Nothing is queried until the page reports in.
pub fn init(_client: &DevToolsClient) -> (Model, Cmd<Message>) {
    (Model::default(), Cmd::none())
}

pub fn update(client: &DevToolsClient, msg: Message, model: &Model) -> (Model, Cmd<Message>) {
    let mut next = model.clone();
    let cmd = match msg {
        Message::SetPage(page) => {
            next.page = page;
            load_page(client, page)
        }
        Message::Refresh => {
            next.error = None;
            refresh(client)
        }
        Message::ContentPageConnected => {
            next.connected = true;
            next.error = None;
            refresh(client)
        }
        Message::NewStore(_) => load_stores(client),
        Message::StoreUpdated(id) => Cmd::of_promise(
            client.get_store_by_id(id),
            move |value| Message::StoreValueLoaded(id, value),
            failed,
        ),
        Message::StoresLoaded(stores) => {
            next.stores = stores;
            Cmd::none()
        }
        Message::StoreValueLoaded(id, value) => match next.stores.iter_mut().find(|s| s.id == id) {
            Some(store) => {
                store.value = value;
                Cmd::none()
            }
            // Updated before we saw it created.
            None => load_stores(client),
        },
        Message::OptionsLoaded(options) => {
            next.options = options;
            Cmd::none()
        }
        Message::LogCategoriesLoaded(categories) => {
            next.log_categories = categories;
            Cmd::none()
        }
        Message::MountPointsLoaded(mount_points) => {
            next.mount_points = mount_points;
            Cmd::none()
        }
        Message::SetSlowAnimations(on) => {
            next.options.slow_animations = on;
            save_options(client, next.options)
        }
        Message::SetLoggingEnabled(on) => {
            next.options.logging_enabled = on;
            save_options(client, next.options)
        }
        Message::SetLogCategory(name, on) => {
            for category in next.log_categories.iter_mut().filter(|c| c.0 == name) {
                category.1 = on;
            }
            let categories = next.log_categories.clone();
            Cmd::of_promise(
                client.set_log_categories(categories.clone()),
                move |()| Message::LogCategoriesLoaded(categories),
                failed,
            )
        }
        Message::Remount(id) => {
            Cmd::of_promise(client.remount(&id), |()| Message::Refresh, failed)
        }
        Message::RequestFailed(error) => {
            tracing::warn!(error = %error, "devtools request failed");
            next.error = Some(error);
            Cmd::none()
        }
    };
    (next, cmd)
}

// =============================================================================
// View
// =============================================================================

fn panel_style() -> NamedStyleSheet {
    let rule = |selector: &str, decls: &str| (selector.to_string(), decls.to_string());
    NamedStyleSheet::new(
        "sutil-devtools",
        vec![
            rule("nav", "display: flex; gap: 8px; border-bottom: 1px solid #ccc;"),
            rule("a.tab", "cursor: pointer; padding: 4px 8px;"),
            rule("a.tab.active", "font-weight: bold; border-bottom: 2px solid #36c;"),
            rule(".error", "color: #c00;"),
            rule("table", "border-collapse: collapse; width: 100%;"),
            rule("td", "padding: 2px 6px; font-family: monospace;"),
        ],
    )
}

/// Build `view` over a slice of the model that only emits when the slice
/// changes. The slice is released with the context parent.
fn with_model<U>(
    model: &Store<Model>,
    select: impl Fn(&Model) -> U + 'static,
    view: impl Fn(Store<U>) -> NodeFactory + 'static,
) -> NodeFactory
where
    U: Clone + PartialEq + 'static,
{
    let model = model.clone();
    let select = Rc::new(select);
    let view = Rc::new(view);
    Rc::new(move |ctx: &BuildContext| {
        let slice = Store::new(select(&model.get()));
        let target = slice.clone();
        let select = select.clone();
        let subscription = model.subscribe(move |m| {
            let next = select(m);
            if next != target.get() {
                target.set(next);
            }
        });
        let cleanup = subscription.into_cleanup();
        let owned = slice.clone();
        ctx.document().register_disposable(ctx.parent(), move || {
            cleanup();
            owned.dispose();
        })?;
        build(&view(slice), ctx)
    })
}

/// Checkbox `change` handler reporting the new checked state.
fn on_checked(f: impl Fn(bool) + 'static) -> NodeFactory {
    let f = Rc::new(f);
    Rc::new(move |ctx: &BuildContext| {
        let doc = ctx.document().clone();
        let f = f.clone();
        let handler = on(events::CHANGE, move |event: &Event| {
            if let Some(target) = event.target {
                f(doc.checked(target));
            }
        });
        build(&handler, ctx)
    })
}

fn checkbox(checked: NodeFactory, label: &str, changed: impl Fn(bool) + 'static) -> NodeFactory {
    el(
        "label",
        vec![
            el("input", vec![attr("type", "checkbox"), checked, on_checked(changed)]),
            text(label),
        ],
    )
}

fn nav(model: &Store<Model>, dispatch: &Dispatch<Message>) -> NodeFactory {
    let mut tabs: Vec<NodeFactory> = Page::ALL
        .iter()
        .map(|&page| {
            let dispatch = dispatch.clone();
            el(
                "a",
                vec![
                    class("tab"),
                    with_model(model, move |m| m.page == page, |active| bind_class(active, "active")),
                    on(events::CLICK, move |_| dispatch(Message::SetPage(page))),
                    text(page.label()),
                ],
            )
        })
        .collect();

    let refresh = dispatch.clone();
    tabs.push(el(
        "button",
        vec![class("refresh"), text("Refresh"), on(events::CLICK, move |_| refresh(Message::Refresh))],
    ));
    tabs.push(el(
        "span",
        vec![
            class("status"),
            with_model(model, |m| m.connected, |connected| {
                bind_text(connected.map(|&c| if c { "connected" } else { "waiting for page" }))
            }),
        ],
    ));
    el("nav", tabs)
}

fn store_row(store: Store<StoreInfo>) -> NodeFactory {
    el(
        "tr",
        vec![
            el("td", vec![bind_text(store.map(|s| s.id))]),
            el("td", vec![bind_text(store.map(|s| s.name.clone()))]),
            el("td", vec![bind_text(store.map(|s| s.value.to_string()))]),
        ],
    )
}

fn stores_page(model: &Store<Model>) -> NodeFactory {
    let header = |label: &str| el("th", vec![text(label)]);
    el(
        "section",
        vec![el(
            "table",
            vec![
                el("thead", vec![el("tr", vec![header("Id"), header("Name"), header("Value")])]),
                el(
                    "tbody",
                    vec![with_model(model, |m| m.stores.clone(), |stores| {
                        eachk(stores, store_row, |s: &StoreInfo| s.id, Vec::new())
                    })],
                ),
            ],
        )],
    )
}

fn options_page(model: &Store<Model>, dispatch: &Dispatch<Message>) -> NodeFactory {
    let slow = dispatch.clone();
    let logging = dispatch.clone();
    el(
        "section",
        vec![
            checkbox(
                with_model(model, |m| m.options.slow_animations, |on| bind_attr_in("checked", on)),
                "Slow animations",
                move |on| slow(Message::SetSlowAnimations(on)),
            ),
            checkbox(
                with_model(model, |m| m.options.logging_enabled, |on| bind_attr_in("checked", on)),
                "Logging enabled",
                move |on| logging(Message::SetLoggingEnabled(on)),
            ),
        ],
    )
}

fn logging_page(model: &Store<Model>, dispatch: &Dispatch<Message>) -> NodeFactory {
    let dispatch = dispatch.clone();
    let row = move |category: Store<LogCategory>| {
        let name = category.get().0;
        let dispatch = dispatch.clone();
        let toggled = name.clone();
        el(
            "li",
            vec![checkbox(
                bind_attr_in("checked", category.map(|c| c.1)),
                &name,
                move |on| dispatch(Message::SetLogCategory(toggled.clone(), on)),
            )],
        )
    };
    let row = Rc::new(row);
    el(
        "section",
        vec![el(
            "ul",
            vec![with_model(model, |m| m.log_categories.clone(), move |categories| {
                let row = row.clone();
                eachk(categories, move |c| row(c), |c: &LogCategory| c.0.clone(), Vec::new())
            })],
        )],
    )
}

fn mount_points_page(model: &Store<Model>, dispatch: &Dispatch<Message>) -> NodeFactory {
    let dispatch = dispatch.clone();
    let row = Rc::new(move |mount: Store<MountPointInfo>| {
        let id = mount.get().id;
        let dispatch = dispatch.clone();
        el(
            "li",
            vec![
                el("span", vec![bind_text(mount.map(|m| m.id.clone()))]),
                el(
                    "button",
                    vec![text("Remount"), on(events::CLICK, move |_| dispatch(Message::Remount(id.clone())))],
                ),
            ],
        )
    });
    el(
        "section",
        vec![el(
            "ul",
            vec![with_model(model, |m| m.mount_points.clone(), move |mounts| {
                let row = row.clone();
                eachk(mounts, move |m| row(m), |m: &MountPointInfo| m.id.clone(), Vec::new())
            })],
        )],
    )
}

fn page_view(page: Page, model: &Store<Model>, dispatch: &Dispatch<Message>) -> NodeFactory {
    match page {
        Page::Stores => stores_page(model),
        Page::Options => options_page(model, dispatch),
        Page::Logging => logging_page(model, dispatch),
        Page::MountPoints => mount_points_page(model, dispatch),
    }
}

/// The whole panel.
pub fn view(model: Store<Model>, dispatch: Dispatch<Message>) -> NodeFactory {
    let page_model = model.clone();
    let page_dispatch = dispatch.clone();
    with_style(
        panel_style(),
        el(
            "div",
            vec![
                class("panel"),
                nav(&model, &dispatch),
                with_model(&model, |m| m.error.clone(), |error| {
                    bind(error, |error| match error {
                        Some(message) => el("div", vec![class("error"), text(message)]),
                        None => unit(),
                    })
                }),
                with_model(&model, |m| m.page, move |page| {
                    let model = page_model.clone();
                    let dispatch = page_dispatch.clone();
                    bind(page, move |&page| page_view(page, &model, &dispatch))
                }),
            ],
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::mount_element;
    use crate::devtools::control::PageControlBlock;
    use crate::devtools::window::LocalInspectedWindow;
    use crate::dom::Document;
    use crate::runtime::Runtime;
    use crate::types::NodeId;
    use serde_json::json;
    use std::cell::RefCell;

    fn client_for(rt: &Runtime) -> (LocalInspectedWindow, DevToolsClient) {
        let window = LocalInspectedWindow::with_control(Rc::new(PageControlBlock::new(rt)));
        let client = DevToolsClient::new(Rc::new(window.clone()));
        (window, client)
    }

    fn recorder() -> (Dispatch<Message>, Rc<RefCell<Vec<Message>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (Rc::new(move |msg: Message| sink.borrow_mut().push(msg)), seen)
    }

    fn run(client: &DevToolsClient, window: &LocalInspectedWindow, msg: Message, model: &Model) -> (Model, Vec<Message>) {
        let (next, cmd) = update(client, msg, model);
        let (dispatch, seen) = recorder();
        cmd.exec(&dispatch);
        window.flush();
        let messages = seen.borrow().clone();
        (next, messages)
    }

    #[test]
    fn test_inbound_translation() {
        assert_eq!(Message::from_inbound(InboundMessage::ContentPageConnected), Message::ContentPageConnected);
        assert_eq!(
            Message::from_inbound(InboundMessage::SutilUpdateStore { id: Some(3) }),
            Message::StoreUpdated(3)
        );
        assert_eq!(Message::from_inbound(InboundMessage::SutilUpdateStore { id: None }), Message::NewStore(None));
    }

    #[test]
    fn test_connect_refreshes_everything() {
        let rt = Runtime::new();
        rt.make_store("count", 1);
        let (window, client) = client_for(&rt);

        let (model, messages) = run(&client, &window, Message::ContentPageConnected, &Model::default());
        assert!(model.connected);
        assert_eq!(messages.len(), 4);
        assert!(matches!(&messages[0], Message::StoresLoaded(list) if list.len() == 1));
        assert_eq!(messages[1], Message::OptionsLoaded(SutilOptions::default()));
        assert!(matches!(&messages[2], Message::LogCategoriesLoaded(list) if list.len() == 7));
        assert_eq!(messages[3], Message::MountPointsLoaded(Vec::new()));
    }

    #[test]
    fn test_store_update_patches_one_row() {
        let rt = Runtime::new();
        let count = rt.make_store("count", 1);
        let (window, client) = client_for(&rt);
        let model = Model {
            stores: vec![StoreInfo { id: 1, name: "count".into(), value: json!(1) }],
            ..Model::default()
        };

        count.set(2);
        let (_, messages) = run(&client, &window, Message::StoreUpdated(1), &model);
        assert_eq!(messages, vec![Message::StoreValueLoaded(1, json!(2))]);

        let (next, cmd) = update(&client, messages[0].clone(), &model);
        assert!(cmd.is_empty());
        assert_eq!(next.stores[0].value, json!(2));

        // Unknown id reloads the table.
        let (_, cmd) = update(&client, Message::StoreValueLoaded(9, json!(0)), &model);
        assert!(!cmd.is_empty());
    }

    #[test]
    fn test_settings_are_written_to_the_page() {
        let rt = Runtime::new();
        let (window, client) = client_for(&rt);

        let (model, messages) = run(&client, &window, Message::SetSlowAnimations(true), &Model::default());
        assert!(model.options.slow_animations);
        assert!(rt.options().slow_animations);
        assert_eq!(messages, vec![Message::OptionsLoaded(model.options)]);

        let model = Model { log_categories: rt.log_categories().to_vec(), ..model };
        let (model, _) = run(&client, &window, Message::SetLogCategory("each".into(), true), &model);
        assert!(model.log_categories.iter().any(|c| c.0 == "each" && c.1));
        assert!(rt.log_categories().is_enabled("each"));
    }

    #[test]
    fn test_failures_surface_in_the_model() {
        let rt = Runtime::new();
        let (window, client) = client_for(&rt);
        let (_, messages) = run(&client, &window, Message::Remount("ghost".into()), &Model::default());
        let expected = SutilError::MountPointNotFound("ghost".into()).to_string();
        assert_eq!(messages, vec![Message::RequestFailed(expected.clone())]);

        let (model, _) = update(&client, messages[0].clone(), &Model::default());
        assert_eq!(model.error, Some(expected));
        let (model, _) = update(&client, Message::Refresh, &model);
        assert_eq!(model.error, None);
    }

    fn mount_view(model: &Store<Model>, dispatch: Dispatch<Message>) -> (Runtime, Document, NodeId) {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let host = doc.create_element("div");
        doc.set_attribute(host, "id", "panel").unwrap();
        doc.append_child(doc.body(), host).unwrap();
        mount_element(&rt, &doc, "panel", view(model.clone(), dispatch)).unwrap();
        (rt, doc, host)
    }

    #[test]
    fn test_tabs_dispatch_and_highlight() {
        let model = Store::new(Model::default());
        let (dispatch, seen) = recorder();
        let (_rt, doc, _host) = mount_view(&model, dispatch);

        let tabs: Vec<NodeId> = doc.query_all_tag("a");
        assert_eq!(tabs.len(), 4);
        assert!(doc.has_class(tabs[0], "active"));
        assert!(doc.has_class(tabs[0], "sutil-devtools"));

        doc.dispatch_custom(tabs[2], events::CLICK, None);
        assert_eq!(*seen.borrow(), vec![Message::SetPage(Page::Logging)]);

        model.modify(|m| m.page = Page::Logging);
        assert!(!doc.has_class(tabs[0], "active"));
        assert!(doc.has_class(tabs[2], "active"));
    }

    #[test]
    fn test_store_table_follows_model() {
        let model = Store::new(Model::default());
        let (dispatch, _) = recorder();
        let (_rt, doc, _host) = mount_view(&model, dispatch);

        model.modify(|m| {
            m.stores = vec![
                StoreInfo { id: 1, name: "count".into(), value: json!(1) },
                StoreInfo { id: 2, name: "name".into(), value: json!("x") },
            ]
        });
        let rows = doc.query_all_tag("tr");
        assert_eq!(rows.len(), 3);
        let first = rows[1];
        assert_eq!(doc.text_content(first), "1count1");

        model.modify(|m| m.stores[0].value = json!(5));
        let rows = doc.query_all_tag("tr");
        assert_eq!(rows[1], first);
        assert_eq!(doc.text_content(first), "1count5");
        assert_eq!(doc.text_content(rows[2]), "2name\"x\"");
    }

    #[test]
    fn test_checkboxes_and_remount_buttons() {
        let model = Store::new(Model { page: Page::Options, ..Model::default() });
        let (dispatch, seen) = recorder();
        let (_rt, doc, _host) = mount_view(&model, dispatch);

        let inputs = doc.query_all_tag("input");
        assert_eq!(inputs.len(), 2);
        model.modify(|m| m.options.logging_enabled = true);
        assert!(doc.checked(inputs[1]));

        doc.set_checked(inputs[0], true).unwrap();
        doc.dispatch_custom(inputs[0], events::CHANGE, None);
        assert_eq!(seen.borrow().last(), Some(&Message::SetSlowAnimations(true)));

        model.modify(|m| {
            m.page = Page::MountPoints;
            m.mount_points = vec![MountPointInfo { id: "app".into(), mount_id: 1 }];
        });
        assert!(doc.query_all_tag("input").is_empty());
        let button = doc
            .query_all_tag("button")
            .into_iter()
            .find(|&b| doc.text_content(b) == "Remount")
            .unwrap();
        doc.dispatch_custom(button, events::CLICK, None);
        assert_eq!(seen.borrow().last(), Some(&Message::Remount("app".into())));
    }

    #[test]
    fn test_error_banner() {
        let model = Store::new(Model::default());
        let (dispatch, _) = recorder();
        let (_rt, doc, _host) = mount_view(&model, dispatch);
        model.modify(|m| m.error = Some("boom".into()));
        let banner = doc.query_all_tag("div").into_iter().find(|&d| doc.has_class(d, "error")).unwrap();
        assert_eq!(doc.text_content(banner), "boom");
        model.modify(|m| m.error = None);
        assert!(!doc.is_alive(banner));
    }
}
