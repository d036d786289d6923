//! DOM builder - node factories, build contexts and mount points.
//!
//! - [`context`] - [`BuildContext`], [`DomAction`], [`DomOps`], scoped style sheets
//! - [`node`] - [`NodeFactory`] and the core factories (`el`, `text`, `attr`, ...)
//! - [`mount`] - [`MountPoint`] registry (`mount_element`, `remount`)

pub mod context;
pub mod mount;
pub mod node;

pub use context::{AppendFn, BuildContext, DomAction, DomOps, NamedStyleSheet, ReplaceFn, SetAttributeFn};
pub use mount::{mount_element, mount_points, remount, unmount_point, MountPoint};
pub use node::{
    attr, build, class, disposable, el, fragment, on, style, text, unit, with_style, BuildResult, NodeFactory,
    NodeRef,
};
