//! Inspected window - asynchronous script evaluation in the page, and the
//! typed client the panel uses on top of it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::control::{evaluate, inject, ControlBlock, ControlMethod};
use super::protocol::{LogCategory, MountPointInfo, StoreInfo, SutilOptions};
use crate::error::{Result, SutilError};
use crate::store::ObservablePromise;

/// Completion of one evaluation.
pub type EvalCallback = Box<dyn FnOnce(Result<Value>)>;

/// `chrome.devtools.inspectedWindow.eval`: the callback runs later with the
/// script's JSON result.
pub trait InspectedWindow {
    fn eval(&self, script: &str, callback: EvalCallback);
}

// =============================================================================
// LocalInspectedWindow
// =============================================================================

#[derive(Default)]
struct LocalWindowInner {
    control: RefCell<Option<Rc<dyn ControlBlock>>>,
    queue: RefCell<VecDeque<(String, EvalCallback)>>,
}

/// An inspected window living in the same process. Requests queue up and
/// are answered by [`flush`](Self::flush).
#[derive(Clone, Default)]
pub struct LocalInspectedWindow {
    inner: Rc<LocalWindowInner>,
}

impl fmt::Debug for LocalInspectedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalInspectedWindow")
            .field("installed", &self.inner.control.borrow().is_some())
            .field("pending", &self.pending())
            .finish()
    }
}

impl LocalInspectedWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A window whose page already exposes `control`.
    pub fn with_control(control: Rc<dyn ControlBlock>) -> Self {
        let window = Self::new();
        window.install(control);
        window
    }

    /// Expose `control` as the page's control block.
    pub fn install(&self, control: Rc<dyn ControlBlock>) {
        *self.inner.control.borrow_mut() = Some(control);
    }

    pub fn uninstall(&self) {
        self.inner.control.borrow_mut().take();
    }

    /// Evaluations waiting for [`flush`](Self::flush).
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Answer queued evaluations, including ones queued by callbacks while
    /// flushing. Returns how many were answered.
    pub fn flush(&self) -> usize {
        let mut answered = 0;
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some((script, callback)) = next else { break };
            let control = self.inner.control.borrow().clone();
            let outcome = match control {
                Some(control) => evaluate(control.as_ref(), &script),
                None => Err(SutilError::NoControlBlock),
            };
            if let Err(err) = &outcome {
                tracing::warn!(error = %err, script = %script, "inspected window eval failed");
            }
            callback(outcome);
            answered += 1;
        }
        answered
    }
}

impl InspectedWindow for LocalInspectedWindow {
    fn eval(&self, script: &str, callback: EvalCallback) {
        self.inner.queue.borrow_mut().push_back((script.to_string(), callback));
    }
}

// =============================================================================
// DevToolsClient
// =============================================================================

/// Typed control block calls over an [`InspectedWindow`]; every call is an
/// [`ObservablePromise`].
#[derive(Clone)]
pub struct DevToolsClient {
    window: Rc<dyn InspectedWindow>,
}

impl fmt::Debug for DevToolsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DevToolsClient { .. }")
    }
}

impl DevToolsClient {
    pub fn new(window: Rc<dyn InspectedWindow>) -> Self {
        Self { window }
    }

    fn call<T>(&self, method: ControlMethod) -> ObservablePromise<T>
    where
        T: DeserializeOwned + Clone + PartialEq + 'static,
    {
        let promise = ObservablePromise::new();
        let script = match inject(&method) {
            Ok(script) => script,
            Err(err) => {
                promise.reject(err);
                return promise;
            }
        };
        let settle = promise.clone();
        self.window.eval(
            &script,
            Box::new(move |outcome| {
                let decoded = outcome.and_then(|value| Ok(serde_json::from_value(value)?));
                settle.complete(decoded);
            }),
        );
        promise
    }

    pub fn get_stores(&self) -> ObservablePromise<Vec<StoreInfo>> {
        self.call(ControlMethod::GetStores)
    }

    pub fn get_store_by_id(&self, id: usize) -> ObservablePromise<Value> {
        self.call(ControlMethod::GetStoreById(id))
    }

    pub fn get_options(&self) -> ObservablePromise<SutilOptions> {
        self.call(ControlMethod::GetOptions)
    }

    pub fn set_options(&self, options: SutilOptions) -> ObservablePromise<()> {
        self.call(ControlMethod::SetOptions(options))
    }

    pub fn get_log_categories(&self) -> ObservablePromise<Vec<LogCategory>> {
        self.call(ControlMethod::GetLogCategories)
    }

    pub fn set_log_categories(&self, categories: Vec<LogCategory>) -> ObservablePromise<()> {
        self.call(ControlMethod::SetLogCategories(categories))
    }

    pub fn get_mount_points(&self) -> ObservablePromise<Vec<MountPointInfo>> {
        self.call(ControlMethod::GetMountPoints)
    }

    pub fn remount(&self, id: &str) -> ObservablePromise<()> {
        self.call(ControlMethod::Remount(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devtools::control::PageControlBlock;
    use crate::runtime::Runtime;
    use crate::store::PromiseState;
    use serde_json::json;

    fn client_for(rt: &Runtime) -> (LocalInspectedWindow, DevToolsClient) {
        let window = LocalInspectedWindow::with_control(Rc::new(PageControlBlock::new(rt)));
        let client = DevToolsClient::new(Rc::new(window.clone()));
        (window, client)
    }

    #[test]
    fn test_requests_wait_for_flush() {
        let rt = Runtime::new();
        rt.make_store("greeting", "hi".to_string());
        let (window, client) = client_for(&rt);

        let stores = client.get_stores();
        assert!(stores.state().is_waiting());
        assert_eq!(window.pending(), 1);

        assert_eq!(window.flush(), 1);
        match stores.state() {
            PromiseState::Result(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].name, "greeting");
                assert_eq!(list[0].value, json!("hi"));
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_missing_control_block_rejects() {
        let window = LocalInspectedWindow::new();
        let client = DevToolsClient::new(Rc::new(window.clone()));
        let options = client.get_options();
        window.flush();
        assert_eq!(options.state(), PromiseState::Error(SutilError::NoControlBlock));
    }

    #[test]
    fn test_setters_resolve_unit() {
        let rt = Runtime::new();
        let (window, client) = client_for(&rt);
        let done = client.set_options(SutilOptions { slow_animations: false, logging_enabled: true });
        window.flush();
        assert_eq!(done.state(), PromiseState::Result(()));
        assert!(rt.options().logging_enabled);
    }

    #[test]
    fn test_chained_requests_flush_together() {
        let rt = Runtime::new();
        let (window, client) = client_for(&rt);
        let chained: ObservablePromise<Vec<MountPointInfo>> = ObservablePromise::new();
        let next = client.clone();
        let settle = chained.clone();
        client.get_options().then(move |_| {
            next.get_mount_points().on_settled(move |outcome| {
                settle.complete(outcome);
            });
        });
        assert_eq!(window.flush(), 2);
        assert_eq!(chained.state(), PromiseState::Result(Vec::new()));
    }

    #[test]
    fn test_remount_error_surfaces() {
        let rt = Runtime::new();
        let (window, client) = client_for(&rt);
        let result = client.remount("ghost");
        window.flush();
        assert_eq!(result.state(), PromiseState::Error(SutilError::MountPointNotFound("ghost".into())));
    }
}
