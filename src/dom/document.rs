//! Document - headless DOM backed by a generational node arena.
//!
//! Nodes live in slots of a per-document arena and are addressed by
//! [`NodeId`] handles. Freeing a node bumps its slot generation, so an old
//! handle is reported as stale instead of silently aliasing a new node.
//!
//! # Borrowing discipline
//!
//! User callbacks (event listeners, disposables) never run while the arena
//! is borrowed: the document collects what it needs, releases the borrow,
//! then calls out. Callbacks are therefore free to mutate the document.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::event::{Event, EventHandler, ListenerEntry, ListenerId};
use super::layout::{self, LayoutNode};
use super::style;
use crate::error::{Result, SutilError};
use crate::types::{Cleanup, DocumentId, NodeFlags, NodeId, Rect, KEYFRAMES_SHEET_ID, SVID_ATTRIBUTE};

thread_local! {
    static NEXT_DOCUMENT_ID: Cell<u64> = const { Cell::new(1) };
}

// =============================================================================
// Node Data
// =============================================================================

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(String),
    Text(String),
    Comment(String),
}

impl NodeKind {
    /// Name used in error context (`element`, `text`, `comment`).
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Element(_) => "element",
            NodeKind::Text(_) => "text",
            NodeKind::Comment(_) => "comment",
        }
    }

    /// Tag name for elements, `#text`/`#comment` otherwise.
    pub fn tag(&self) -> &str {
        match self {
            NodeKind::Element(tag) => tag,
            NodeKind::Text(_) => "#text",
            NodeKind::Comment(_) => "#comment",
        }
    }
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<(String, String)>,
    svid: Option<u64>,
    flags: NodeFlags,
    value: String,
    checked: bool,
    disposables: Vec<Cleanup>,
    listeners: Vec<ListenerEntry>,
    sheet: Option<Vec<String>>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            svid: None,
            flags: NodeFlags::NONE,
            value: String::new(),
            checked: false,
            disposables: Vec::new(),
            listeners: Vec::new(),
            sheet: None,
        }
    }

    fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value.to_string();
        } else {
            self.attributes.push((name.to_string(), value.to_string()));
        }
    }
}

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

// =============================================================================
// Arena helpers (operate on an already-borrowed slot vector)
// =============================================================================

fn node_ref(slots: &[Slot], node: NodeId) -> Result<&NodeData> {
    slots
        .get(node.index())
        .filter(|slot| slot.generation == node.generation())
        .and_then(|slot| slot.data.as_ref())
        .ok_or(SutilError::StaleNode(node))
}

fn node_mut(slots: &mut [Slot], node: NodeId) -> Result<&mut NodeData> {
    slots
        .get_mut(node.index())
        .filter(|slot| slot.generation == node.generation())
        .and_then(|slot| slot.data.as_mut())
        .ok_or(SutilError::StaleNode(node))
}

fn detach(slots: &mut [Slot], node: NodeId) -> Result<()> {
    let parent = node_ref(slots, node)?.parent;
    if let Some(parent) = parent {
        if let Ok(parent_data) = node_mut(slots, parent) {
            parent_data.children.retain(|c| *c != node);
        }
        node_mut(slots, node)?.parent = None;
    }
    Ok(())
}

fn is_ancestor(slots: &[Slot], ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = node_ref(slots, n).ok().and_then(|d| d.parent);
    }
    false
}

/// Ensure `child` may be placed under `parent`.
fn check_insert(slots: &[Slot], parent: NodeId, child: NodeId) -> Result<()> {
    if !node_ref(slots, parent)?.is_element() {
        return Err(SutilError::NotAContainer(parent));
    }
    node_ref(slots, child)?;
    if is_ancestor(slots, child, parent) {
        return Err(SutilError::NotAContainer(parent));
    }
    Ok(())
}

fn subtree_post_order(slots: &[Slot], node: NodeId, out: &mut Vec<NodeId>) {
    if let Ok(data) = node_ref(slots, node) {
        for child in &data.children {
            subtree_post_order(slots, *child, out);
        }
        out.push(node);
    }
}

// =============================================================================
// Document
// =============================================================================

struct DocumentInner {
    id: DocumentId,
    slots: RefCell<Vec<Slot>>,
    free: RefCell<Vec<u32>>,
    html: Cell<Option<NodeId>>,
    head: Cell<Option<NodeId>>,
    body: Cell<Option<NodeId>>,
    listeners: RefCell<Vec<ListenerEntry>>,
    next_listener: Cell<u64>,
}

/// A headless HTML document.
///
/// Cloning yields another handle to the same document.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let doc = Self {
            inner: Rc::new(DocumentInner {
                id: DocumentId(NEXT_DOCUMENT_ID.with(|next| next.replace(next.get() + 1))),
                slots: RefCell::new(Vec::new()),
                free: RefCell::new(Vec::new()),
                html: Cell::new(None),
                head: Cell::new(None),
                body: Cell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        };
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        // Fresh nodes: these cannot fail.
        let _ = doc.append_child(html, head);
        let _ = doc.append_child(html, body);
        doc.inner.html.set(Some(html));
        doc.inner.head.set(Some(head));
        doc.inner.body.set(Some(body));
        doc
    }

    pub fn id(&self) -> DocumentId {
        self.inner.id
    }

    pub fn html(&self) -> NodeId {
        self.inner.html.get().unwrap_or(NodeId::new(0, 0))
    }

    pub fn head(&self) -> NodeId {
        self.inner.head.get().unwrap_or(NodeId::new(1, 0))
    }

    pub fn body(&self) -> NodeId {
        self.inner.body.get().unwrap_or(NodeId::new(2, 0))
    }

    /// Number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.inner.slots.borrow().iter().filter(|s| s.data.is_some()).count()
    }

    fn alloc(&self, data: NodeData) -> NodeId {
        let mut slots = self.inner.slots.borrow_mut();
        if let Some(index) = self.inner.free.borrow_mut().pop() {
            let slot = &mut slots[index as usize];
            slot.data = Some(data);
            NodeId::new(index, slot.generation)
        } else {
            slots.push(Slot { generation: 0, data: Some(data) });
            NodeId::new((slots.len() - 1) as u32, 0)
        }
    }

    fn read<R>(&self, node: NodeId, f: impl FnOnce(&NodeData) -> R) -> Result<R> {
        let slots = self.inner.slots.borrow();
        node_ref(&slots, node).map(f)
    }

    fn write<R>(&self, node: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> Result<R> {
        let mut slots = self.inner.slots.borrow_mut();
        node_mut(&mut slots, node).map(f)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Element(tag.to_lowercase())))
    }

    pub fn create_text_node(&self, text: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Text(text.to_string())))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Comment(text.to_string())))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True while the handle refers to a live node.
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.read(node, |_| ()).is_ok()
    }

    pub fn kind(&self, node: NodeId) -> Result<NodeKind> {
        self.read(node, |d| d.kind.clone())
    }

    /// Lower-case tag name for elements.
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        match self.kind(node) {
            Ok(NodeKind::Element(tag)) => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.read(node, |d| d.is_element()).unwrap_or(false)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.read(node, |d| d.parent).ok().flatten()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.read(node, |d| d.children.clone()).unwrap_or_default()
    }

    /// Children that are elements.
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    fn sibling(&self, node: NodeId, offset: isize) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == node)? as isize + offset;
        if pos < 0 {
            return None;
        }
        siblings.get(pos as usize).copied()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, 1)
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, -1)
    }

    /// True when the node is reachable from `<html>`.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let slots = self.inner.slots.borrow();
        is_ancestor(&slots, self.html(), node)
    }

    // =========================================================================
    // Tree mutation
    // =========================================================================

    /// Append `child` to `parent`, moving it from any previous parent.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let mut slots = self.inner.slots.borrow_mut();
        check_insert(&slots, parent, child)?;
        detach(&mut slots, child)?;
        node_mut(&mut slots, parent)?.children.push(child);
        node_mut(&mut slots, child)?.parent = Some(parent);
        Ok(())
    }

    /// Insert `child` before `reference` (append when `None`).
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        let Some(reference) = reference else {
            return self.append_child(parent, child);
        };
        let mut slots = self.inner.slots.borrow_mut();
        check_insert(&slots, parent, child)?;
        if child == reference {
            return Ok(());
        }
        detach(&mut slots, child)?;
        let parent_data = node_mut(&mut slots, parent)?;
        let index = parent_data
            .children
            .iter()
            .position(|c| *c == reference)
            .ok_or(SutilError::Detached(reference))?;
        parent_data.children.insert(index, child);
        node_mut(&mut slots, child)?.parent = Some(parent);
        Ok(())
    }

    /// Insert `child` directly after `reference` in `reference`'s parent.
    pub fn insert_after(&self, reference: NodeId, child: NodeId) -> Result<()> {
        let mut slots = self.inner.slots.borrow_mut();
        let parent = node_ref(&slots, reference)?
            .parent
            .ok_or(SutilError::Detached(reference))?;
        check_insert(&slots, parent, child)?;
        if child == reference {
            return Ok(());
        }
        detach(&mut slots, child)?;
        let parent_data = node_mut(&mut slots, parent)?;
        let index = parent_data
            .children
            .iter()
            .position(|c| *c == reference)
            .ok_or(SutilError::Detached(reference))?;
        parent_data.children.insert(index + 1, child);
        node_mut(&mut slots, child)?.parent = Some(parent);
        Ok(())
    }

    /// Put `new` where `old` is; `old` ends up detached (not freed).
    pub fn replace_child(&self, old: NodeId, new: NodeId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let mut slots = self.inner.slots.borrow_mut();
        let parent = node_ref(&slots, old)?
            .parent
            .ok_or(SutilError::Detached(old))?;
        check_insert(&slots, parent, new)?;
        detach(&mut slots, new)?;
        let parent_data = node_mut(&mut slots, parent)?;
        let index = parent_data
            .children
            .iter()
            .position(|c| *c == old)
            .ok_or(SutilError::Detached(old))?;
        parent_data.children[index] = new;
        node_mut(&mut slots, new)?.parent = Some(parent);
        node_mut(&mut slots, old)?.parent = None;
        Ok(())
    }

    /// Detach `node` from its parent.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        let mut slots = self.inner.slots.borrow_mut();
        detach(&mut slots, node)
    }

    /// Free `node` and its subtree. Disposables are dropped without running;
    /// call [`cleanup`](Self::cleanup) first.
    pub fn destroy(&self, node: NodeId) -> Result<()> {
        let freed: Vec<NodeData> = {
            let mut slots = self.inner.slots.borrow_mut();
            detach(&mut slots, node)?;
            let mut subtree = Vec::new();
            subtree_post_order(&slots, node, &mut subtree);
            let mut free = self.inner.free.borrow_mut();
            subtree
                .into_iter()
                .filter_map(|n| {
                    let slot = &mut slots[n.index()];
                    slot.generation = slot.generation.wrapping_add(1);
                    free.push(n.index() as u32);
                    slot.data.take()
                })
                .collect()
        };
        // Dropped outside the borrow: closures may hold document handles.
        drop(freed);
        Ok(())
    }

    /// Run the disposables of `node`'s subtree, children first.
    pub fn cleanup(&self, node: NodeId) {
        let subtree = {
            let slots = self.inner.slots.borrow();
            let mut out = Vec::new();
            subtree_post_order(&slots, node, &mut out);
            out
        };
        for n in subtree {
            let disposables = self
                .write(n, |d| {
                    d.flags.insert(NodeFlags::CLEANED);
                    std::mem::take(&mut d.disposables)
                })
                .unwrap_or_default();
            for dispose in disposables {
                dispose();
            }
        }
    }

    /// Run the cleanups registered on `node` itself, leaving its subtree
    /// and the node alive.
    pub fn drain_disposables(&self, node: NodeId) {
        let disposables = self.write(node, |d| std::mem::take(&mut d.disposables)).unwrap_or_default();
        for dispose in disposables {
            dispose();
        }
    }

    /// Cleanup, detach and free.
    pub fn unmount(&self, node: NodeId) {
        self.cleanup(node);
        if let Err(err) = self.destroy(node) {
            tracing::debug!(%node, error = %err, "unmount of freed node");
        }
    }

    /// Attach a cleanup to `node`, drained by [`cleanup`](Self::cleanup).
    pub fn register_disposable(&self, node: NodeId, dispose: impl FnOnce() + 'static) -> Result<()> {
        self.write(node, |d| d.disposables.push(Box::new(dispose)))
    }

    pub fn disposable_count(&self, node: NodeId) -> usize {
        self.read(node, |d| d.disposables.len()).unwrap_or(0)
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Concatenated text of the subtree (comments excluded).
    pub fn text_content(&self, node: NodeId) -> String {
        let slots = self.inner.slots.borrow();
        let mut out = String::new();
        collect_text(&slots, node, &mut out);
        out
    }

    /// Set the data of a text/comment node, or replace an element's
    /// children with one text node.
    pub fn set_text_content(&self, node: NodeId, text: &str) -> Result<()> {
        let kind = self.kind(node)?;
        match kind {
            NodeKind::Element(_) => {
                for child in self.children(node) {
                    self.unmount(child);
                }
                let text_node = self.create_text_node(text);
                self.append_child(node, text_node)
            }
            NodeKind::Text(_) => self.write(node, |d| d.kind = NodeKind::Text(text.to_string())),
            NodeKind::Comment(_) => self.write(node, |d| d.kind = NodeKind::Comment(text.to_string())),
        }
    }

    // =========================================================================
    // Attributes, classes, style, form properties
    // =========================================================================

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.read(node, |d| d.attribute(name).map(str::to_string))
            .ok()
            .flatten()
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.get_attribute(node, name).is_some()
    }

    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.read(node, |d| d.attributes.clone()).unwrap_or_default()
    }

    /// Set an attribute. Only elements carry attributes.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.write(node, |d| {
            if !d.is_element() {
                return Err(SutilError::NotAContainer(node));
            }
            d.set_attribute(name, value);
            Ok(())
        })?
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<()> {
        self.write(node, |d| d.attributes.retain(|(k, _)| k != name))
    }

    pub fn class_list(&self, node: NodeId) -> Vec<String> {
        self.get_attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_list(node).iter().any(|c| c == class)
    }

    /// Add or remove `class`.
    pub fn toggle_class(&self, node: NodeId, class: &str, on: bool) -> Result<()> {
        let mut classes = self.class_list(node);
        let present = classes.iter().any(|c| c == class);
        if on && !present {
            classes.push(class.to_string());
        } else if !on && present {
            classes.retain(|c| c != class);
        } else {
            return Ok(());
        }
        self.set_attribute(node, "class", &classes.join(" "))
    }

    pub fn add_class(&self, node: NodeId, class: &str) -> Result<()> {
        for c in class.split_whitespace() {
            self.toggle_class(node, c, true)?;
        }
        Ok(())
    }

    pub fn remove_class(&self, node: NodeId, class: &str) -> Result<()> {
        self.toggle_class(node, class, false)
    }

    /// Inline style property value.
    pub fn style_value(&self, node: NodeId, property: &str) -> Option<String> {
        self.get_attribute(node, "style")
            .and_then(|s| style::style_value(&s, property))
    }

    /// Set (or with `None` remove) an inline style property.
    pub fn set_style_value(&self, node: NodeId, property: &str, value: Option<&str>) -> Result<()> {
        let current = self.get_attribute(node, "style").unwrap_or_default();
        let next = style::with_style_value(&current, property, value);
        if next.is_empty() {
            self.remove_attribute(node, "style")
        } else {
            self.set_attribute(node, "style", &next)
        }
    }

    /// Form `value` property.
    pub fn value(&self, node: NodeId) -> String {
        self.read(node, |d| d.value.clone()).unwrap_or_default()
    }

    pub fn set_value(&self, node: NodeId, value: &str) -> Result<()> {
        self.write(node, |d| d.value = value.to_string())
    }

    /// Form `checked` property.
    pub fn checked(&self, node: NodeId) -> bool {
        self.read(node, |d| d.checked).unwrap_or(false)
    }

    pub fn set_checked(&self, node: NodeId, checked: bool) -> Result<()> {
        self.write(node, |d| d.checked = checked)
    }

    // =========================================================================
    // Synthetic ids and flags
    // =========================================================================

    pub fn svid(&self, node: NodeId) -> Option<u64> {
        self.read(node, |d| d.svid).ok().flatten()
    }

    /// Record the synthetic id as a property and, for elements, an attribute.
    pub fn set_svid(&self, node: NodeId, svid: u64) -> Result<()> {
        self.write(node, |d| {
            d.svid = Some(svid);
            if d.is_element() {
                d.set_attribute(SVID_ATTRIBUTE, &svid.to_string());
            }
        })
    }

    pub fn flags(&self, node: NodeId) -> NodeFlags {
        self.read(node, |d| d.flags).unwrap_or_default()
    }

    pub fn set_flags(&self, node: NodeId, flags: NodeFlags, on: bool) -> Result<()> {
        self.write(node, |d| d.flags.set(flags, on))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    fn find_connected(&self, predicate: impl Fn(&NodeData) -> bool) -> Option<NodeId> {
        let slots = self.inner.slots.borrow();
        let mut stack = vec![self.html()];
        while let Some(node) = stack.pop() {
            let Ok(data) = node_ref(&slots, node) else { continue };
            if predicate(data) {
                return Some(node);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    /// Equivalent of `querySelector('[_svid="<svid>"]')`.
    pub fn query_by_svid(&self, svid: u64) -> Option<NodeId> {
        let wanted = svid.to_string();
        self.find_connected(|d| d.attribute(SVID_ATTRIBUTE) == Some(wanted.as_str()))
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_connected(|d| d.is_element() && d.attribute("id") == Some(id))
    }

    /// First connected element with tag `tag`.
    pub fn query_tag(&self, tag: &str) -> Option<NodeId> {
        self.find_connected(|d| matches!(&d.kind, NodeKind::Element(t) if t == tag))
    }

    /// All connected elements with tag `tag`, in document order.
    pub fn query_all_tag(&self, tag: &str) -> Vec<NodeId> {
        let slots = self.inner.slots.borrow();
        let mut out = Vec::new();
        let mut stack = vec![self.html()];
        while let Some(node) = stack.pop() {
            let Ok(data) = node_ref(&slots, node) else { continue };
            if matches!(&data.kind, NodeKind::Element(t) if t == tag) {
                out.push(node);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn next_listener_id(&self) -> ListenerId {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        ListenerId(id)
    }

    pub fn add_event_listener(
        &self,
        node: NodeId,
        name: &str,
        handler: impl Fn(&Event) + 'static,
    ) -> Result<ListenerId> {
        let id = self.next_listener_id();
        let handler: EventHandler = Rc::new(handler);
        self.write(node, |d| {
            d.listeners.push(ListenerEntry { id, name: name.to_string(), handler });
        })?;
        Ok(id)
    }

    pub fn remove_event_listener(&self, node: NodeId, id: ListenerId) {
        let _ = self.write(node, |d| d.listeners.retain(|l| l.id != id));
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.read(node, |d| d.listeners.len()).unwrap_or(0)
    }

    /// Listen at document level (receives every bubbling event and
    /// document-level custom events).
    pub fn add_document_listener(&self, name: &str, handler: impl Fn(&Event) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.inner.listeners.borrow_mut().push(ListenerEntry {
            id,
            name: name.to_string(),
            handler: Rc::new(handler),
        });
        id
    }

    pub fn remove_document_listener(&self, id: ListenerId) {
        self.inner.listeners.borrow_mut().retain(|l| l.id != id);
    }

    /// Dispatch `event` on `target`, bubbling through ancestors to the
    /// document.
    pub fn dispatch_event(&self, target: NodeId, event: Event) {
        let path: Vec<(NodeId, Vec<EventHandler>)> = {
            let slots = self.inner.slots.borrow();
            let mut path = Vec::new();
            let mut current = Some(target);
            while let Some(node) = current {
                let Ok(data) = node_ref(&slots, node) else { break };
                let handlers = data
                    .listeners
                    .iter()
                    .filter_map(|l| l.handler_for(&event.name))
                    .collect();
                path.push((node, handlers));
                current = data.parent;
            }
            path
        };

        let mut event = Event { target: Some(target), ..event };
        for (node, handlers) in path {
            event.current_target = Some(node);
            for handler in handlers {
                handler(&event);
            }
        }
        event.current_target = None;
        self.run_document_listeners(&event);
    }

    /// Dispatch a custom event on `target`.
    pub fn dispatch_custom(&self, target: NodeId, name: &str, detail: Option<Value>) {
        let event = Event { detail, ..Event::new(name) };
        self.dispatch_event(target, event);
    }

    /// Dispatch an event at document level only.
    pub fn dispatch_document_event(&self, name: &str, detail: Option<Value>) {
        let event = Event { detail, ..Event::new(name) };
        self.run_document_listeners(&event);
    }

    fn run_document_listeners(&self, event: &Event) {
        let handlers: Vec<EventHandler> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter_map(|l| l.handler_for(&event.name))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    // =========================================================================
    // Keyframe style sheet
    // =========================================================================

    /// The `<style id="__sutil_keyframes">` element, created on demand.
    pub fn keyframes_sheet(&self) -> Result<NodeId> {
        if let Some(sheet) = self.get_element_by_id(KEYFRAMES_SHEET_ID) {
            return Ok(sheet);
        }
        let sheet = self.create_element("style");
        let attached = self
            .set_attribute(sheet, "id", KEYFRAMES_SHEET_ID)
            .and_then(|()| self.write(sheet, |d| d.sheet = Some(Vec::new())))
            .and_then(|()| self.append_child(self.head(), sheet));
        if let Err(err) = attached {
            tracing::warn!(error = %err, "cannot install keyframes sheet");
            self.unmount(sheet);
            return Err(err);
        }
        Ok(sheet)
    }

    /// Existing keyframes sheet, if any.
    pub fn find_keyframes_sheet(&self) -> Option<NodeId> {
        self.get_element_by_id(KEYFRAMES_SHEET_ID)
    }

    /// `CSSStyleSheet.insertRule`; returns the index used.
    pub fn insert_rule(&self, sheet: NodeId, rule: &str, index: usize) -> Result<usize> {
        self.write(sheet, |d| {
            let rules = d.sheet.get_or_insert_with(Vec::new);
            let index = index.min(rules.len());
            rules.insert(index, rule.to_string());
            index
        })
    }

    /// `CSSStyleSheet.deleteRule`.
    pub fn delete_rule(&self, sheet: NodeId, index: usize) -> Result<()> {
        self.write(sheet, |d| {
            if let Some(rules) = d.sheet.as_mut() {
                if index < rules.len() {
                    rules.remove(index);
                }
            }
        })
    }

    pub fn css_rules(&self, sheet: NodeId) -> Vec<String> {
        self.read(sheet, |d| d.sheet.clone().unwrap_or_default())
            .unwrap_or_default()
    }

    // =========================================================================
    // Layout and serialization
    // =========================================================================

    /// Layout box of `node` (zero for detached or hidden nodes).
    pub fn bounding_client_rect(&self, node: NodeId) -> Rect {
        if !self.is_connected(node) {
            return Rect::ZERO;
        }
        let tree = self.layout_tree(self.html());
        layout::compute_rects(&tree).get(&node).copied().unwrap_or(Rect::ZERO)
    }

    /// Layout boxes of several nodes from a single layout pass.
    pub fn bounding_client_rects(&self, nodes: &[NodeId]) -> Vec<Rect> {
        let rects = layout::compute_rects(&self.layout_tree(self.html()));
        nodes
            .iter()
            .map(|node| match self.is_connected(*node) {
                true => rects.get(node).copied().unwrap_or(Rect::ZERO),
                false => Rect::ZERO,
            })
            .collect()
    }

    pub(crate) fn layout_tree(&self, node: NodeId) -> LayoutNode {
        let slots = self.inner.slots.borrow();
        build_layout_tree(&slots, node)
    }

    /// Serialize `node` as HTML (debugging and tests).
    pub fn outer_html(&self, node: NodeId) -> String {
        let slots = self.inner.slots.borrow();
        let mut out = String::new();
        write_html(&slots, node, &mut out);
        out
    }
}

fn collect_text(slots: &[Slot], node: NodeId, out: &mut String) {
    let Ok(data) = node_ref(slots, node) else { return };
    match &data.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(_) => {}
        NodeKind::Element(_) => {
            for child in &data.children {
                collect_text(slots, *child, out);
            }
        }
    }
}

fn build_layout_tree(slots: &[Slot], node: NodeId) -> LayoutNode {
    let Ok(data) = node_ref(slots, node) else {
        return LayoutNode::hidden(node);
    };
    match &data.kind {
        NodeKind::Comment(_) => LayoutNode::hidden(node),
        NodeKind::Text(text) => LayoutNode::text(node, text.chars().count()),
        NodeKind::Element(tag) => {
            let inline = data.attribute("style").unwrap_or("");
            let display_none = style::style_value(inline, "display").as_deref() == Some("none")
                || matches!(tag.as_str(), "head" | "style" | "script");
            let width = style::style_value(inline, "width").and_then(|v| style::parse_px(&v));
            let height = style::style_value(inline, "height").and_then(|v| style::parse_px(&v));
            let row = style::style_value(inline, "flex-direction").as_deref() == Some("row");
            let children = data
                .children
                .iter()
                .map(|c| build_layout_tree(slots, *c))
                .collect();
            LayoutNode::element(node, display_none, width, height, row, children)
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn write_html(slots: &[Slot], node: NodeId, out: &mut String) {
    let Ok(data) = node_ref(slots, node) else { return };
    match &data.kind {
        NodeKind::Text(text) => out.push_str(&escape_html(text)),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            for (k, v) in &data.attributes {
                out.push_str(&format!(" {k}=\"{}\"", escape_html(v).replace('"', "&quot;")));
            }
            out.push('>');
            for child in &data.children {
                write_html(slots, *child, out);
            }
            out.push_str(&format!("</{tag}>"));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
