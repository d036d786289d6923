//! Message port between the panel and the inspected page, and the page-side
//! agent that relays store events over it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::protocol::{decode, encode, InboundMessage, OutboundMessage, PORT_NAME};
use crate::dom::{Document, Event, ListenerId};
use crate::error::{Result, SutilError};
use crate::types::events;

/// Panel end of a `chrome.runtime` port.
pub trait Port {
    fn name(&self) -> &str;
    fn post_message(&self, message: &OutboundMessage) -> Result<()>;
    fn on_message(&self, handler: Box<dyn Fn(InboundMessage)>);
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
}

// =============================================================================
// MemoryPort
// =============================================================================

type TextHandler = Rc<dyn Fn(&str)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Panel,
    Page,
}

#[derive(Default)]
struct Link {
    panel_handlers: RefCell<Vec<TextHandler>>,
    page_handlers: RefCell<Vec<TextHandler>>,
    connected: Cell<bool>,
}

impl Link {
    fn handlers(&self, side: Side) -> &RefCell<Vec<TextHandler>> {
        match side {
            Side::Panel => &self.panel_handlers,
            Side::Page => &self.page_handlers,
        }
    }
}

/// One end of an in-process port carrying JSON text. Delivery is
/// synchronous.
#[derive(Clone)]
pub struct MemoryPort {
    name: String,
    side: Side,
    link: Rc<Link>,
}

impl fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPort")
            .field("name", &self.name)
            .field("side", &self.side)
            .field("connected", &self.link.connected.get())
            .finish()
    }
}

impl MemoryPort {
    /// A connected `(panel, page)` pair named [`PORT_NAME`].
    pub fn pair() -> (MemoryPort, MemoryPort) {
        let link = Rc::new(Link::default());
        link.connected.set(true);
        let end = |side| MemoryPort { name: PORT_NAME.to_string(), side, link: link.clone() };
        (end(Side::Panel), end(Side::Page))
    }

    fn peer(&self) -> Side {
        match self.side {
            Side::Panel => Side::Page,
            Side::Page => Side::Panel,
        }
    }

    /// Deliver raw text to the other end.
    pub fn send_text(&self, text: &str) -> Result<()> {
        if !self.link.connected.get() {
            return Err(SutilError::PortDisconnected(self.name.clone()));
        }
        let handlers: Vec<TextHandler> = self.link.handlers(self.peer()).borrow().clone();
        for handler in handlers {
            handler(text);
        }
        Ok(())
    }

    /// Receive raw text sent by the other end.
    pub fn on_text(&self, handler: impl Fn(&str) + 'static) {
        self.link.handlers(self.side).borrow_mut().push(Rc::new(handler));
    }

    /// Page end: send a message to the panel.
    pub fn post_inbound(&self, message: &InboundMessage) -> Result<()> {
        self.send_text(&encode(message)?)
    }

    /// Page end: receive the panel's messages.
    pub fn on_outbound(&self, handler: impl Fn(OutboundMessage) + 'static) {
        self.on_text(move |text| match decode::<OutboundMessage>(text) {
            Ok(message) => handler(message),
            Err(err) => tracing::warn!(error = %err, "dropping malformed panel message"),
        });
    }
}

impl Port for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn post_message(&self, message: &OutboundMessage) -> Result<()> {
        self.send_text(&encode(message)?)
    }

    fn on_message(&self, handler: Box<dyn Fn(InboundMessage)>) {
        self.on_text(move |text| match decode::<InboundMessage>(text) {
            Ok(message) => handler(message),
            Err(err) => tracing::warn!(error = %err, "dropping malformed page message"),
        });
    }

    fn disconnect(&self) {
        self.link.connected.set(false);
        self.link.panel_handlers.borrow_mut().clear();
        self.link.page_handlers.borrow_mut().clear();
    }

    fn is_connected(&self) -> bool {
        self.link.connected.get()
    }
}

// =============================================================================
// PageAgent
// =============================================================================

fn store_id(event: &Event) -> Option<usize> {
    let id = event.detail.as_ref()?.get("id")?;
    id.as_u64().map(|id| id as usize)
}

/// Inspected-page side of the relay: forwards the document's store events
/// to the panel and answers `init`.
pub struct PageAgent {
    document: Document,
    port: MemoryPort,
    listeners: Vec<ListenerId>,
}

impl fmt::Debug for PageAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageAgent").field("port", &self.port).finish()
    }
}

impl PageAgent {
    /// Start relaying between `document` and the page end of `port`.
    pub fn attach(document: &Document, port: MemoryPort) -> Self {
        let forward = |kind: fn(Option<usize>) -> InboundMessage| {
            let port = port.clone();
            move |event: &Event| {
                if !port.is_connected() {
                    return;
                }
                if let Err(err) = port.post_inbound(&kind(store_id(event))) {
                    tracing::warn!(error = %err, "store event relay failed");
                }
            }
        };
        let listeners = vec![
            document.add_document_listener(
                events::NEW_STORE,
                forward(|id: Option<usize>| InboundMessage::SutilNewStore { id }),
            ),
            document.add_document_listener(
                events::UPDATE_STORE,
                forward(|id: Option<usize>| InboundMessage::SutilUpdateStore { id }),
            ),
        ];

        let reply = port.clone();
        port.on_outbound(move |message| match message {
            OutboundMessage::Hello => tracing::debug!("panel said hello"),
            OutboundMessage::Init { tab_id } => {
                tracing::debug!(tab_id, "panel initialised");
                if let Err(err) = reply.post_inbound(&InboundMessage::ContentPageConnected) {
                    tracing::warn!(error = %err, "cannot answer init");
                }
            }
        });

        Self { document: document.clone(), port, listeners }
    }

    /// Stop relaying document events.
    pub fn detach(self) {
        for id in self.listeners {
            self.document.remove_document_listener(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn recorder(port: &MemoryPort) -> Rc<RefCell<Vec<InboundMessage>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        port.on_message(Box::new(move |msg| sink.borrow_mut().push(msg)));
        seen
    }

    #[test]
    fn test_pair_carries_json() {
        let (panel, page) = MemoryPort::pair();
        let texts = Rc::new(RefCell::new(Vec::new()));
        let sink = texts.clone();
        page.on_text(move |t| sink.borrow_mut().push(t.to_string()));

        panel.post_message(&OutboundMessage::Init { tab_id: 7 }).unwrap();
        assert_eq!(*texts.borrow(), vec![r#"{"name":"init","tabId":7}"#.to_string()]);
        assert_eq!(panel.name(), PORT_NAME);
    }

    #[test]
    fn test_disconnect() {
        let (panel, page) = MemoryPort::pair();
        let seen = recorder(&panel);
        panel.disconnect();
        assert!(!page.is_connected());
        assert_eq!(
            page.post_inbound(&InboundMessage::ContentPageConnected),
            Err(SutilError::PortDisconnected(PORT_NAME.into()))
        );
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_malformed_text_is_dropped() {
        let (panel, page) = MemoryPort::pair();
        let seen = recorder(&panel);
        page.send_text("{not json").unwrap();
        page.send_text(r#"{"name":"sutil-new-store","id":2}"#).unwrap();
        assert_eq!(*seen.borrow(), vec![InboundMessage::SutilNewStore { id: Some(2) }]);
    }

    #[test]
    fn test_agent_relays_store_events_and_answers_init() {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let (panel, page) = MemoryPort::pair();
        let seen = recorder(&panel);
        let agent = PageAgent::attach(&doc, page);

        panel.post_message(&OutboundMessage::Hello).unwrap();
        panel.post_message(&OutboundMessage::Init { tab_id: 1 }).unwrap();
        let store = rt.make_store("n", 1);
        store.set(2);

        assert_eq!(
            *seen.borrow(),
            vec![
                InboundMessage::ContentPageConnected,
                InboundMessage::SutilNewStore { id: Some(1) },
                InboundMessage::SutilUpdateStore { id: Some(1) },
            ]
        );

        agent.detach();
        store.set(3);
        assert_eq!(seen.borrow().len(), 3);
    }
}
