//! Bindings - views and attributes that follow stores.
//!
//! - [`bind`] / [`bind_text`] / [`bind_promise`] - rebuild or patch on emission
//! - [`form`] - attribute, class and checkbox-group bindings
//! - [`each`] - keyed list reconciliation with transitions

mod bind;
pub mod each;
pub mod form;

pub use bind::{bind, bind_promise, bind_text};
pub use each::{
    each, eachi, eachiko, eachk, ItemView, KeyFn, KeyedStoreItem, Patch, PatchOp, Reconciler,
};
pub use form::{bind_attr, bind_attr_in, bind_attr_out, bind_class, bind_group};
