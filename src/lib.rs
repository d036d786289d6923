//! # sutil-devtools
//!
//! Reactive DOM runtime and DevTools inspector for Sutil-style applications.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for the
//! value cells behind every [`Store`].
//!
//! ## Architecture
//!
//! A [`Runtime`] owns everything that used to be global: the frame queue,
//! loop tasks, keyframe rules, the DevTools store registry, mount points and
//! options. Views are [`NodeFactory`] values built against a [`Document`]:
//!
//! ```text
//! Store emission → bind / each → NodeFactory → BuildContext → Document
//!                                     └→ transitions → keyframe sheet + frames
//! ```
//!
//! The DevTools panel is itself an Elmish app built with the same factories.
//! It talks to the inspected page over a [`devtools::Port`] and evaluates
//! control block calls through a [`devtools::InspectedWindow`].
//!
//! ```ignore
//! use sutil_devtools::*;
//!
//! let rt = Runtime::new();
//! let doc = rt.create_document();
//! let count = rt.make_store("count", 0);
//! let app = el("div", vec![bind_text(count.clone())]);
//! mount_element(&rt, &doc, "app", app)?;
//! count.set(5);
//! ```
//!
//! ## Modules
//!
//! - [`types`] - node ids, rects, flags, event names
//! - [`error`] - [`SutilError`] and [`Result`]
//! - [`runtime`] - the [`Runtime`] context, options and log categories
//! - [`store`] - stores, promises, the registry and Elmish programs
//! - [`dom`] - the headless [`Document`]
//! - [`build`] - node factories and mount points
//! - [`bindings`] - `bind`, `each` and form bindings
//! - [`transition`] - intro/outro/animate transitions
//! - [`devtools`] - the inspector panel, its protocol and control block

pub mod bindings;
pub mod build;
pub mod devtools;
pub mod dom;
pub mod error;
pub mod runtime;
pub mod store;
pub mod transition;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{Result, SutilError};

pub use runtime::{LogCategories, LogCategory, Runtime, SutilOptions, LOG_CATEGORIES};

pub use store::{
    make_elmish, make_program, Cmd, Dispatch, Elmish, ObservablePromise, PromiseState, Store,
    StoreRegistry, Subscription,
};

pub use dom::{Document, Event, ListenerId, NodeKind};

pub use build::{
    attr, build, class, disposable, el, fragment, mount_element, on, remount, style, text, unit,
    unmount_point, with_style, BuildContext, BuildResult, DomAction, DomOps, MountPoint,
    NamedStyleSheet, NodeFactory, NodeRef,
};

pub use bindings::{
    bind, bind_attr, bind_attr_in, bind_attr_out, bind_class, bind_group, bind_promise, bind_text,
    each, eachi, eachiko, eachk, KeyedStoreItem,
};

pub use transition::{
    fade, flip, fly, scale, show_if, slide, transition, wait, Transition, TransitionAttribute,
    TransitionProp,
};

pub use devtools::{Panel, PageAgent, MemoryPort, LocalInspectedWindow, PageControlBlock};
