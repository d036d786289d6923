//! DevTools panel - inspects a running page through its control block.
//!
//! - [`protocol`] - port messages and control block payloads
//! - [`control`] - the page-side [`ControlBlock`] and script injection
//! - [`window`] - [`InspectedWindow`] eval and the typed [`DevToolsClient`]
//! - [`port`] - the panel/page [`Port`] and the relaying [`PageAgent`]
//! - [`app`] - the Elmish panel (model, update, view)
//! - [`panel`] - [`Panel::start`] wiring everything together

pub mod app;
pub mod control;
pub mod panel;
pub mod port;
pub mod protocol;
pub mod window;

pub use app::{Message, Model, Page};
pub use control::{evaluate, inject, parse_script, ControlBlock, ControlMethod, PageControlBlock};
pub use panel::{Panel, PANEL_HOST_ID};
pub use port::{MemoryPort, PageAgent, Port};
pub use protocol::{InboundMessage, LogCategory, MountPointInfo, OutboundMessage, StoreInfo, SutilOptions};
pub use window::{DevToolsClient, EvalCallback, InspectedWindow, LocalInspectedWindow};
