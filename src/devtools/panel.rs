//! Panel lifecycle: wires the port, the inspected window and the Elmish
//! app together and mounts the view.

use std::fmt;
use std::rc::Rc;

use super::app::{init, update, view, Message, Model};
use super::port::Port;
use super::protocol::OutboundMessage;
use super::window::{DevToolsClient, InspectedWindow};
use crate::build::{mount_element, MountPoint};
use crate::dom::Document;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::store::{make_program, Elmish, Store};

/// Id of the element the panel mounts into.
pub const PANEL_HOST_ID: &str = "sutil-devtools-panel";

/// A running DevTools panel.
pub struct Panel {
    runtime: Runtime,
    program: Elmish<Model, Message>,
    mount: MountPoint,
    port: Rc<dyn Port>,
}

impl fmt::Debug for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panel")
            .field("mount", &self.mount)
            .field("port", &self.port.name())
            .field("connected", &self.port.is_connected())
            .finish()
    }
}

impl Panel {
    /// Mount the panel into `document` (creating the host element if
    /// needed), route `port` messages into the app and say hello.
    pub fn start(
        runtime: &Runtime,
        document: &Document,
        port: Rc<dyn Port>,
        window: Rc<dyn InspectedWindow>,
        tab_id: u64,
    ) -> Result<Panel> {
        let client = DevToolsClient::new(window);
        let updater = client.clone();
        let program = make_program(&client, init, move |msg: Message, model: &Model| update(&updater, msg, model));

        if document.get_element_by_id(PANEL_HOST_ID).is_none() {
            let host = document.create_element("div");
            document.set_attribute(host, "id", PANEL_HOST_ID)?;
            document.append_child(document.body(), host)?;
        }
        let mount = mount_element(
            runtime,
            document,
            PANEL_HOST_ID,
            view(program.model().clone(), program.dispatcher()),
        )?;

        let dispatch = program.dispatcher();
        port.on_message(Box::new(move |message| dispatch(Message::from_inbound(message))));
        port.post_message(&OutboundMessage::Hello)?;
        port.post_message(&OutboundMessage::Init { tab_id })?;
        tracing::info!(tab_id, port = port.name(), "devtools panel started");

        Ok(Panel { runtime: runtime.clone(), program, mount, port })
    }

    pub fn model(&self) -> Model {
        self.program.model().get()
    }

    pub fn model_store(&self) -> &Store<Model> {
        self.program.model()
    }

    pub fn dispatch(&self, msg: Message) {
        self.program.dispatch(msg);
    }

    pub fn mount_point(&self) -> &MountPoint {
        &self.mount
    }

    /// Panel unload: drop the port and tear the runtime down.
    pub fn stop(self) {
        self.port.disconnect();
        self.program.model().dispose();
        self.runtime.teardown();
        tracing::info!("devtools panel stopped");
    }
}
