//! Stores - observable values, promises, the DevTools registry and Elmish.
//!
//! - [`Store`] - replay-one observable value container
//! - [`ObservablePromise`] - async outcome held in a store
//! - [`StoreRegistry`] - stores exposed to the DevTools panel
//! - [`make_elmish`] - model/update/command programs

mod elmish;
mod observable;
mod promise;
mod registry;

pub use elmish::{make_elmish, make_program, Cmd, Dispatch, Elmish};
pub use observable::{Observer, Store, Subscription};
pub use promise::{ObservablePromise, PromiseState};
pub use registry::{RegistryEvent, StoreRegistry};
