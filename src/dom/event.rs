//! DOM events - listeners and the event record passed to them.

use std::rc::Rc;

use serde_json::Value;

use crate::types::NodeId;

/// An event travelling from its target up to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event type, e.g. `click` or `sutil-mount`.
    pub name: String,
    /// Node the event was dispatched on (`None` for document-level events).
    pub target: Option<NodeId>,
    /// Node whose listener is currently running.
    pub current_target: Option<NodeId>,
    /// Custom event payload.
    pub detail: Option<Value>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), target: None, current_target: None, detail: None }
    }

    /// A custom event carrying `detail`.
    pub fn custom(name: impl Into<String>, detail: Value) -> Self {
        Self { detail: Some(detail), ..Self::new(name) }
    }
}

/// Event listener callback.
pub type EventHandler = Rc<dyn Fn(&Event)>;

/// Identifies a registered listener for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    pub(crate) name: String,
    pub(crate) handler: EventHandler,
}

impl ListenerEntry {
    pub(crate) fn handler_for(&self, name: &str) -> Option<EventHandler> {
        (self.name == name).then(|| self.handler.clone())
    }
}
