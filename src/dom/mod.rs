//! Headless DOM - the document model bindings and transitions operate on.
//!
//! - [`Document`] - generational node arena with events and a keyframe sheet
//! - [`Event`] - event record passed to listeners
//! - [`style`] - inline style attribute helpers
//! - `layout` - Taffy-backed bounding rects

mod document;
mod event;
mod layout;
pub mod style;

pub use document::{Document, NodeKind};
pub use event::{Event, EventHandler, ListenerId};
pub use layout::{CHAR_WIDTH, LINE_HEIGHT, VIEWPORT_WIDTH};
