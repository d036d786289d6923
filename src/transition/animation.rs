//! Keyframe rules - CSS animations generated from transition curves.
//!
//! [`AnimationRegistry::create_rule`] samples an eased curve at 60 fps,
//! inserts the resulting `@keyframes` block into the document's
//! `__sutil_keyframes` sheet and appends an `animation` entry to the node's
//! inline style. It returns an [`AnimationGuard`]; dropping the guard takes
//! the entry off the node and releases the active-animation count. When the
//! count reaches zero the sheets of every active document are cleared on the
//! next frame, provided nothing started in between.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::frame::FrameScheduler;
use super::props::{CssGen, Easing};
use crate::dom::Document;
use crate::error::Result;
use crate::types::NodeId;

/// Keyframe sampling rate.
const FPS: f64 = 60.0;

struct AnimationInner {
    frames: FrameScheduler,
    active: Cell<usize>,
    documents: RefCell<Vec<Document>>,
    clear_scheduled: Cell<bool>,
}

/// Shared keyframe bookkeeping for every document of a runtime.
#[derive(Clone)]
pub struct AnimationRegistry {
    inner: Rc<AnimationInner>,
}

impl fmt::Debug for AnimationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationRegistry")
            .field("active", &self.num_active_animations())
            .field("documents", &self.inner.documents.borrow().len())
            .finish()
    }
}

/// djb2 over the rule text, walked backwards.
fn hash(text: &str) -> u32 {
    text.bytes()
        .rev()
        .fold(5381u32, |h, b| (h << 5).wrapping_sub(h) ^ u32::from(b))
}

/// Keyframe blocks for `a -> b` over `duration` ms.
pub(crate) fn keyframes(a: f64, b: f64, duration: f64, ease: &Easing, css: &CssGen) -> String {
    let steps = (duration * FPS / 1000.0).ceil().max(1.0) as usize;
    let mut out = String::from("{\n");
    for i in 0..steps {
        let p = i as f64 / steps as f64;
        let t = a + (b - a) * ease(p);
        out.push_str(&format!("{}%{{{}}}\n", p * 100.0, css(t, 1.0 - t)));
    }
    out.push_str(&format!("100% {{{}}}\n}}", css(b, 1.0 - b)));
    out
}

impl AnimationRegistry {
    pub fn new(frames: FrameScheduler) -> Self {
        Self {
            inner: Rc::new(AnimationInner {
                frames,
                active: Cell::new(0),
                documents: RefCell::new(Vec::new()),
                clear_scheduled: Cell::new(false),
            }),
        }
    }

    /// Track `document` so its sheet is cleared with the others.
    pub fn register_document(&self, document: &Document) {
        let mut documents = self.inner.documents.borrow_mut();
        if !documents.contains(document) {
            documents.push(document.clone());
        }
    }

    pub fn unregister_document(&self, document: &Document) {
        self.inner.documents.borrow_mut().retain(|d| d != document);
    }

    /// Active documents, in registration order.
    pub fn documents(&self) -> Vec<Document> {
        self.inner.documents.borrow().clone()
    }

    /// Guards currently alive.
    pub fn num_active_animations(&self) -> usize {
        self.inner.active.get()
    }

    /// Insert a keyframe rule for `node` and start it.
    #[allow(clippy::too_many_arguments)]
    pub fn create_rule(
        &self,
        document: &Document,
        node: NodeId,
        a: f64,
        b: f64,
        duration: f64,
        delay: f64,
        ease: &Easing,
        css: &CssGen,
        uid: u64,
    ) -> Result<AnimationGuard> {
        let frames = keyframes(a, b, duration, ease, css);
        let name = format!("__sutil_{}_{}", hash(&frames), uid);
        let rule = format!("@keyframes {name} {frames}");

        let sheet = document.keyframes_sheet()?;
        let index = document.css_rules(sheet).len();
        document.insert_rule(sheet, &rule, index)?;

        let entry = format!("{name} {duration}ms linear {delay}ms 1 both");
        let animation = match document.style_value(node, "animation") {
            Some(existing) if !existing.is_empty() => format!("{existing}, {entry}"),
            _ => entry,
        };
        document.set_style_value(node, "animation", Some(&animation))?;

        self.register_document(document);
        self.inner.active.set(self.inner.active.get() + 1);
        tracing::trace!(%node, %name, "keyframe rule created");

        Ok(AnimationGuard {
            registry: self.clone(),
            document: document.clone(),
            node,
            name,
        })
    }

    fn release(&self) {
        let remaining = self.inner.active.get().saturating_sub(1);
        self.inner.active.set(remaining);
        if remaining == 0 {
            self.schedule_clear();
        }
    }

    fn schedule_clear(&self) {
        if self.inner.clear_scheduled.replace(true) {
            return;
        }
        let registry = self.clone();
        self.inner.frames.request_animation_frame(move |_| {
            registry.inner.clear_scheduled.set(false);
            if registry.num_active_animations() == 0 {
                registry.clear_rules();
            }
        });
    }

    /// Delete every generated rule of every active document.
    pub fn clear_rules(&self) {
        for document in self.documents() {
            if let Some(sheet) = document.find_keyframes_sheet() {
                let count = document.css_rules(sheet).len();
                for index in (0..count).rev() {
                    let _ = document.delete_rule(sheet, index);
                }
            }
        }
    }
}

/// Keeps one generated animation applied; dropping it releases it.
pub struct AnimationGuard {
    registry: AnimationRegistry,
    document: Document,
    node: NodeId,
    name: String,
}

impl fmt::Debug for AnimationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationGuard")
            .field("node", &self.node)
            .field("name", &self.name)
            .finish()
    }
}

impl AnimationGuard {
    /// Name of the `@keyframes` rule.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl Drop for AnimationGuard {
    fn drop(&mut self) {
        if let Some(current) = self.document.style_value(self.node, "animation") {
            let kept: Vec<&str> = current
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.starts_with(self.name.as_str()) && !entry.is_empty())
                .collect();
            let next = (!kept.is_empty()).then(|| kept.join(", "));
            let _ = self.document.set_style_value(self.node, "animation", next.as_deref());
        }
        self.registry.release();
    }
}
