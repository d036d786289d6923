//! Core types shared across the crate.
//!
//! - [`NodeId`] - generational handle into a document's node arena
//! - [`Rect`] - bounding client rectangle
//! - [`NodeFlags`] - per-node state bits
//! - [`events`] - names of the custom DOM events the runtime dispatches

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Cleanup Function
// =============================================================================

/// Cleanup function returned by subscriptions and bindings.
///
/// Call this to release whatever the producer registered.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Node Handles
// =============================================================================

/// Handle to a node inside a [`Document`](crate::dom::Document) arena.
///
/// A handle stays valid while the node exists, whether attached or detached.
/// Once the node is freed its slot generation is bumped and every old handle
/// reports [`SutilError::StaleNode`](crate::SutilError::StaleNode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Slot generation this handle was issued for.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Identity of a document, used to key per-document keyframe sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub(crate) u64);

// =============================================================================
// Geometry
// =============================================================================

/// A bounding client rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect { left: 0.0, top: 0.0, width: 0.0, height: 0.0 };

    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

// =============================================================================
// Node Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Runtime state bits kept on every node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const NONE = 0;
        /// `sutil-mount` has been dispatched for this element.
        const MOUNTED = 1 << 0;
        /// Hidden by a show/hide transition (`display: none`).
        const HIDDEN = 1 << 1;
        /// An intro or outro transition is running.
        const TRANSITIONING = 1 << 2;
        /// Placeholder or anchor comment owned by a binding.
        const ANCHOR = 1 << 3;
        /// Disposables have been drained.
        const CLEANED = 1 << 4;
    }
}

// =============================================================================
// Event Names
// =============================================================================

/// Names of the custom events dispatched by the runtime.
pub mod events {
    pub const NEW_STORE: &str = "sutil-new-store";
    pub const UPDATE_STORE: &str = "sutil-update-store";
    pub const MOUNT: &str = "sutil-mount";
    pub const SHOW: &str = "sutil-show";
    pub const HIDE: &str = "sutil-hide";
    pub const UPDATED: &str = "sutil-updated";
    pub const ELEMENT_READY: &str = "sutil-element-ready";
    pub const INTRO_START: &str = "introstart";
    pub const INTRO_END: &str = "introend";
    pub const OUTRO_START: &str = "outrostart";
    pub const OUTRO_END: &str = "outroend";
    pub const ANIMATION_END: &str = "animationend";
    pub const INPUT: &str = "input";
    pub const CHANGE: &str = "change";
    pub const CLICK: &str = "click";
}

/// Attribute carrying the synthetic id of every built element.
pub const SVID_ATTRIBUTE: &str = "_svid";

/// Id of the per-document `<style>` element holding generated keyframes.
pub const KEYFRAMES_SHEET_ID: &str = "__sutil_keyframes";
