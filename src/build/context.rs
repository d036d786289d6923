//! BuildContext - the per-build-pass environment.
//!
//! A context names the document, the parent node, where the next node goes
//! ([`DomAction`]), an optional scoped style sheet and the three DOM
//! mutation primitives ([`DomOps`]). Contexts are never mutated: the
//! `with_*` methods return modified copies.

use std::fmt;
use std::rc::Rc;

use crate::dom::Document;
use crate::error::{Result, SutilError};
use crate::runtime::Runtime;
use crate::types::NodeId;

// =============================================================================
// DomAction
// =============================================================================

/// Where a freshly built node is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomAction {
    /// Append to the context parent.
    #[default]
    Append,
    /// Swap into the position of an existing node, keeping its `_svid`.
    Replace(NodeId),
    /// Insert right after a node.
    After(NodeId),
    /// Insert right before a node.
    Before(NodeId),
}

impl DomAction {
    /// Action for the node following `placed` in the same build.
    pub fn advance(self, placed: NodeId) -> DomAction {
        match self {
            DomAction::Append => DomAction::Append,
            DomAction::Before(reference) => DomAction::Before(reference),
            DomAction::Replace(_) | DomAction::After(_) => DomAction::After(placed),
        }
    }
}

// =============================================================================
// DomOps
// =============================================================================

/// `append(document, parent, child, before)` - insert `child` before
/// `before` (or at the end).
pub type AppendFn = Rc<dyn Fn(&Document, NodeId, NodeId, Option<NodeId>) -> Result<()>>;
/// `replace(document, old, new)`.
pub type ReplaceFn = Rc<dyn Fn(&Document, NodeId, NodeId) -> Result<()>>;
/// `set_attribute(document, node, name, value)`.
pub type SetAttributeFn = Rc<dyn Fn(&Document, NodeId, &str, &str) -> Result<()>>;

/// The mutation primitives a build pass goes through.
#[derive(Clone)]
pub struct DomOps {
    pub append: AppendFn,
    pub replace: ReplaceFn,
    pub set_attribute: SetAttributeFn,
}

impl Default for DomOps {
    fn default() -> Self {
        Self {
            append: Rc::new(|doc: &Document, parent: NodeId, child: NodeId, before: Option<NodeId>| {
                doc.insert_before(parent, child, before)
            }),
            replace: Rc::new(|doc: &Document, old: NodeId, new: NodeId| doc.replace_child(old, new)),
            set_attribute: Rc::new(|doc: &Document, node: NodeId, name: &str, value: &str| {
                doc.set_attribute(node, name, value)
            }),
        }
    }
}

impl fmt::Debug for DomOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DomOps { .. }")
    }
}

// =============================================================================
// Scoped style sheets
// =============================================================================

/// A named style sheet whose class is added to every element built under it.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedStyleSheet {
    name: String,
    rules: Vec<(String, String)>,
}

impl NamedStyleSheet {
    /// `rules` are `(selector, declarations)` pairs.
    pub fn new(name: impl Into<String>, rules: Vec<(String, String)>) -> Self {
        Self { name: name.into(), rules }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class applied to scoped elements.
    pub fn class_name(&self) -> &str {
        &self.name
    }

    /// Rule text with every selector scoped to the sheet class.
    pub fn css_text(&self) -> String {
        self.rules
            .iter()
            .map(|(selector, decls)| format!(".{} {selector} {{ {decls} }}\n", self.name))
            .collect()
    }

    /// Add the sheet's `<style>` element to the document head (once).
    pub fn install(&self, document: &Document) -> Result<()> {
        let already = document
            .children(document.head())
            .into_iter()
            .any(|n| document.get_attribute(n, "data-sutil-style").as_deref() == Some(self.name.as_str()));
        if already {
            return Ok(());
        }
        let style = document.create_element("style");
        document.set_attribute(style, "data-sutil-style", &self.name)?;
        let text = document.create_text_node(&self.css_text());
        document.append_child(style, text)?;
        document.append_child(document.head(), style)
    }
}

// =============================================================================
// BuildContext
// =============================================================================

/// Environment of one build pass.
#[derive(Clone)]
pub struct BuildContext {
    runtime: Runtime,
    document: Document,
    parent: NodeId,
    action: DomAction,
    style_sheet: Option<Rc<NamedStyleSheet>>,
    ops: DomOps,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("parent", &self.parent)
            .field("action", &self.action)
            .field("style_sheet", &self.style_sheet.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

impl BuildContext {
    /// Context appending into `parent`.
    pub fn new(runtime: &Runtime, document: &Document, parent: NodeId) -> Self {
        Self {
            runtime: runtime.clone(),
            document: document.clone(),
            parent,
            action: DomAction::Append,
            style_sheet: None,
            ops: DomOps::default(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn action(&self) -> DomAction {
        self.action
    }

    pub fn style_sheet(&self) -> Option<&NamedStyleSheet> {
        self.style_sheet.as_deref()
    }

    pub fn ops(&self) -> &DomOps {
        &self.ops
    }

    pub fn with_parent(&self, parent: NodeId) -> Self {
        Self { parent, ..self.clone() }
    }

    pub fn with_action(&self, action: DomAction) -> Self {
        Self { action, ..self.clone() }
    }

    pub fn with_style_sheet(&self, sheet: NamedStyleSheet) -> Self {
        Self { style_sheet: Some(Rc::new(sheet)), ..self.clone() }
    }

    pub fn with_ops(&self, ops: DomOps) -> Self {
        Self { ops, ..self.clone() }
    }

    /// Unique name from the runtime generator.
    pub fn make_name(&self, base: &str) -> String {
        self.runtime.make_name(base)
    }

    /// Place `node` according to the context action.
    pub fn attach(&self, node: NodeId) -> Result<()> {
        let doc = &self.document;
        match self.action {
            DomAction::Append => (self.ops.append)(doc, self.parent, node, None),
            DomAction::Before(reference) => {
                let parent = doc.parent(reference).ok_or(SutilError::Detached(reference))?;
                (self.ops.append)(doc, parent, node, Some(reference))
            }
            DomAction::After(reference) => {
                let parent = doc.parent(reference).ok_or(SutilError::Detached(reference))?;
                let next = doc.next_sibling(reference).filter(|n| *n != node);
                (self.ops.append)(doc, parent, node, next)
            }
            DomAction::Replace(old) if old == node => Ok(()),
            DomAction::Replace(old) => {
                if !doc.is_alive(old) {
                    return Err(SutilError::StaleNode(old));
                }
                if let Some(svid) = doc.svid(old) {
                    doc.set_svid(node, svid)?;
                }
                (self.ops.replace)(doc, old, node)?;
                doc.unmount(old);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn setup() -> (Runtime, Document, BuildContext) {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let ctx = BuildContext::new(&rt, &doc, doc.body());
        (rt, doc, ctx)
    }

    #[test]
    fn test_advance_rules() {
        let a = NodeId::new(10, 0);
        let b = NodeId::new(11, 0);
        assert_eq!(DomAction::Append.advance(b), DomAction::Append);
        assert_eq!(DomAction::Replace(a).advance(b), DomAction::After(b));
        assert_eq!(DomAction::After(a).advance(b), DomAction::After(b));
        assert_eq!(DomAction::Before(a).advance(b), DomAction::Before(a));
    }

    #[test]
    fn test_attach_positions() {
        let (_rt, doc, ctx) = setup();
        let first = doc.create_element("i");
        let last = doc.create_element("b");
        ctx.attach(first).unwrap();
        ctx.attach(last).unwrap();

        let middle = doc.create_element("u");
        ctx.with_action(DomAction::After(first)).attach(middle).unwrap();
        let head = doc.create_element("s");
        ctx.with_action(DomAction::Before(first)).attach(head).unwrap();

        assert_eq!(doc.children(doc.body()), vec![head, first, middle, last]);
    }

    #[test]
    fn test_replace_keeps_svid_and_frees_old() {
        let (_rt, doc, ctx) = setup();
        let old = doc.create_element("p");
        doc.set_svid(old, 7).unwrap();
        ctx.attach(old).unwrap();

        let new = doc.create_element("div");
        doc.set_svid(new, 8).unwrap();
        ctx.with_action(DomAction::Replace(old)).attach(new).unwrap();

        assert_eq!(doc.children(doc.body()), vec![new]);
        assert_eq!(doc.svid(new), Some(7));
        assert!(!doc.is_alive(old));
    }

    #[test]
    fn test_custom_ops_intercept_mutations() {
        let (_rt, doc, ctx) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let ops = DomOps {
            set_attribute: Rc::new(move |doc: &Document, node: NodeId, name: &str, value: &str| {
                log_clone.borrow_mut().push(format!("{name}={value}"));
                doc.set_attribute(node, name, value)
            }),
            ..DomOps::default()
        };
        let ctx = ctx.with_ops(ops);
        (ctx.ops().set_attribute)(&doc, doc.body(), "id", "main").unwrap();
        assert_eq!(*log.borrow(), vec!["id=main".to_string()]);
    }

    #[test]
    fn test_style_sheet_installed_once() {
        let (_rt, doc, _ctx) = setup();
        let sheet = NamedStyleSheet::new("panel", vec![("td".into(), "padding: 2px;".into())]);
        sheet.install(&doc).unwrap();
        sheet.install(&doc).unwrap();

        let styles = doc.query_all_tag("style");
        assert_eq!(styles.len(), 1);
        assert_eq!(doc.text_content(styles[0]), ".panel td { padding: 2px; }\n");
    }
}
