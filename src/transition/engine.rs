//! Transition engine - runs intros, outros and FLIP moves on nodes.
//!
//! # State machine
//!
//! ```text
//! Idle ──start──▶ introstart/outrostart ──one frame──▶ Running ──end time──▶ Done
//!                                                     (CSS guard           animationend (CSS)
//!                                                      and/or ticks)       introend/outroend
//! ```
//!
//! [`TransitionHandle::cancel`] stops a run at any stage: the pending frame
//! is dropped, the loop task aborted and the keyframe guard released, so a
//! cancelled run never leaks a rule.
//!
//! [`transition`] and [`show_if`] build a view once and show/hide it as a
//! `Store<bool>` changes, using `display: none` for the hidden state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::animation::AnimationGuard;
use super::frame::{FrameId, LoopTask};
use super::props::{intro_of, outro_of, Transition, TransitionAttribute};
use crate::build::{build, BuildContext, NodeFactory};
use crate::dom::Document;
use crate::runtime::Runtime;
use crate::store::{ObservablePromise, Store};
use crate::types::{events, NodeFlags, NodeId};

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Intro,
    Outro,
    /// FLIP move; no start/end events.
    Animate,
}

impl TransitionKind {
    fn endpoints(self) -> (f64, f64) {
        match self {
            TransitionKind::Intro | TransitionKind::Animate => (0.0, 1.0),
            TransitionKind::Outro => (1.0, 0.0),
        }
    }

    fn start_event(self) -> Option<&'static str> {
        match self {
            TransitionKind::Intro => Some(events::INTRO_START),
            TransitionKind::Outro => Some(events::OUTRO_START),
            TransitionKind::Animate => None,
        }
    }

    fn end_event(self) -> Option<&'static str> {
        match self {
            TransitionKind::Intro => Some(events::INTRO_END),
            TransitionKind::Outro => Some(events::OUTRO_END),
            TransitionKind::Animate => None,
        }
    }
}

// =============================================================================
// Run state
// =============================================================================

struct RunState {
    runtime: Runtime,
    document: Document,
    node: NodeId,
    kind: TransitionKind,
    cancelled: Cell<bool>,
    finished: Cell<bool>,
    frame: Cell<Option<FrameId>>,
    guard: RefCell<Option<AnimationGuard>>,
    task: RefCell<Option<LoopTask>>,
    on_end: RefCell<Option<Box<dyn FnOnce()>>>,
    done: ObservablePromise<bool>,
}

impl RunState {
    fn is_stopped(&self) -> bool {
        self.cancelled.get() || self.finished.get()
    }

    fn start(self: &Rc<Self>, now: f64, transition: Transition) {
        self.frame.set(None);
        if self.is_stopped() {
            return;
        }

        let scale = self.runtime.options().animation_scale();
        let duration = transition.duration * scale;
        let delay = transition.delay * scale;
        let (a, b) = self.kind.endpoints();

        if let Some(css) = &transition.css {
            match self.runtime.animations().create_rule(
                &self.document,
                self.node,
                a,
                b,
                duration,
                delay,
                &transition.ease,
                css,
                self.runtime.next_uid(),
            ) {
                Ok(guard) => *self.guard.borrow_mut() = Some(guard),
                Err(err) => tracing::warn!(node = %self.node, error = %err, "keyframe rule not created"),
            }
        }
        if let Some(tick) = &transition.tick {
            tick(a, 1.0 - a);
        }
        self.runtime.log("trans", &format!("{:?} {} for {duration}ms", self.kind, self.node));

        let start_time = now + delay;
        let end_time = start_time + duration;
        let state = self.clone();
        let task = self.runtime.loop_tasks().run_loop(move |now| {
            if state.is_stopped() {
                return false;
            }
            if now >= end_time {
                if let Some(tick) = &transition.tick {
                    tick(b, 1.0 - b);
                }
                state.finish();
                return false;
            }
            if now >= start_time {
                if let Some(tick) = &transition.tick {
                    let p = if duration > 0.0 { (now - start_time) / duration } else { 1.0 };
                    let t = a + (b - a) * (transition.ease)(p);
                    tick(t, 1.0 - t);
                }
            }
            true
        });
        *self.task.borrow_mut() = Some(task);
    }

    fn finish(&self) {
        if self.finished.replace(true) {
            return;
        }
        let guard = self.guard.borrow_mut().take();
        if guard.is_some() {
            self.document.dispatch_custom(self.node, events::ANIMATION_END, None);
        }
        drop(guard);
        let _ = self.document.set_flags(self.node, NodeFlags::TRANSITIONING, false);
        if let Some(name) = self.kind.end_event() {
            self.document.dispatch_custom(self.node, name, None);
        }
        let on_end = self.on_end.borrow_mut().take();
        if let Some(on_end) = on_end {
            on_end();
        }
        self.done.resolve(true);
    }

    fn cancel(&self) {
        if self.is_stopped() {
            return;
        }
        self.cancelled.set(true);
        if let Some(frame) = self.frame.take() {
            self.runtime.frames().cancel_animation_frame(frame);
        }
        let task = self.task.borrow_mut().take();
        if let Some(task) = task {
            task.abort();
        }
        let guard = self.guard.borrow_mut().take();
        drop(guard);
        let _ = self.document.set_flags(self.node, NodeFlags::TRANSITIONING, false);
        self.on_end.borrow_mut().take();
        self.done.resolve(false);
    }
}

/// Handle to a running transition.
#[derive(Clone)]
pub struct TransitionHandle {
    state: Rc<RunState>,
}

impl fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionHandle")
            .field("node", &self.state.node)
            .field("kind", &self.state.kind)
            .field("running", &self.is_running())
            .finish()
    }
}

impl TransitionHandle {
    /// Stop the run and release its keyframe rule. `on_end` is not called.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.state.is_stopped()
    }

    pub fn node(&self) -> NodeId {
        self.state.node
    }

    /// Resolves with `true` when the run completes, `false` when cancelled.
    pub fn finished(&self) -> &ObservablePromise<bool> {
        &self.state.done
    }
}

/// Start `transition` on `node`. `on_end` runs after the end event.
pub fn run_transition(
    runtime: &Runtime,
    document: &Document,
    node: NodeId,
    kind: TransitionKind,
    transition: Transition,
    on_end: impl FnOnce() + 'static,
) -> TransitionHandle {
    let state = Rc::new(RunState {
        runtime: runtime.clone(),
        document: document.clone(),
        node,
        kind,
        cancelled: Cell::new(false),
        finished: Cell::new(false),
        frame: Cell::new(None),
        guard: RefCell::new(None),
        task: RefCell::new(None),
        on_end: RefCell::new(Some(Box::new(on_end))),
        done: ObservablePromise::new(),
    });

    let _ = document.set_flags(node, NodeFlags::TRANSITIONING, true);
    if let Some(name) = kind.start_event() {
        document.dispatch_custom(node, name, None);
    }

    // A listener may have cancelled during the start event.
    if !state.is_stopped() {
        let starting = state.clone();
        let frame = runtime
            .frames()
            .request_animation_frame(move |now| starting.start(now, transition));
        state.frame.set(Some(frame));
    }

    TransitionHandle { state }
}

// =============================================================================
// Show / hide
// =============================================================================

fn hide_now(document: &Document, node: NodeId) {
    let _ = document.set_style_value(node, "display", Some("none"));
    let _ = document.set_flags(node, NodeFlags::HIDDEN, true);
    document.dispatch_custom(node, events::HIDE, None);
}

/// Show or hide `node`, playing the block's intro or outro.
///
/// `complete` runs once the node has reached its new state (immediately
/// when there is nothing to play).
pub fn transition_node(
    runtime: &Runtime,
    document: &Document,
    node: NodeId,
    attrs: &[TransitionAttribute],
    visible: bool,
    complete: impl FnOnce() + 'static,
) -> Option<TransitionHandle> {
    if visible {
        let _ = document.set_style_value(node, "display", None);
        let _ = document.set_flags(node, NodeFlags::HIDDEN, false);
        document.dispatch_custom(node, events::SHOW, None);
        match intro_of(attrs) {
            Some(factory) => {
                let t = factory(document, node).or_fallback(document, node);
                Some(run_transition(runtime, document, node, TransitionKind::Intro, t, complete))
            }
            None => {
                complete();
                None
            }
        }
    } else {
        match outro_of(attrs) {
            Some(factory) => {
                let t = factory(document, node).or_fallback(document, node);
                let doc = document.clone();
                Some(run_transition(runtime, document, node, TransitionKind::Outro, t, move || {
                    hide_now(&doc, node);
                    complete();
                }))
            }
            None => {
                hide_now(document, node);
                complete();
                None
            }
        }
    }
}

/// Build `view` once and show/hide it as `visible` changes.
pub fn transition(attrs: Vec<TransitionAttribute>, visible: Store<bool>, view: NodeFactory) -> NodeFactory {
    Rc::new(move |ctx: &BuildContext| {
        let result = build(&view, ctx)?;
        let Some(node) = result.nodes().first().copied() else {
            return Ok(result);
        };

        let runtime = ctx.runtime().clone();
        let document = ctx.document().clone();
        let attrs = attrs.clone();
        let running: Rc<RefCell<Option<TransitionHandle>>> = Rc::new(RefCell::new(None));
        let shown: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));

        let running_sub = running.clone();
        let subscription = visible.subscribe(move |&show| {
            let previous = shown.replace(Some(show));
            if previous == Some(show) {
                return;
            }
            if let Some(handle) = running_sub.borrow_mut().take() {
                handle.cancel();
            }
            if previous.is_none() && !show {
                hide_now(&document, node);
                return;
            }
            let handle = transition_node(&runtime, &document, node, &attrs, show, || {});
            *running_sub.borrow_mut() = handle;
        });

        let cleanup = subscription.into_cleanup();
        ctx.document().register_disposable(ctx.parent(), move || {
            cleanup();
            if let Some(handle) = running.borrow_mut().take() {
                handle.cancel();
            }
        })?;
        Ok(result)
    })
}

/// Show/hide without transitions.
pub fn show_if(visible: Store<bool>, view: NodeFactory) -> NodeFactory {
    transition(Vec::new(), visible, view)
}

// =============================================================================
// Per-node serialization
// =============================================================================

/// Run `action` once any earlier `wait` on the same node has settled.
///
/// Successive calls on one node therefore play one after another.
pub fn wait(
    runtime: &Runtime,
    document: &Document,
    node: NodeId,
    action: impl FnOnce() -> ObservablePromise<()> + 'static,
) -> ObservablePromise<()> {
    let result: ObservablePromise<()> = ObservablePromise::new();

    let settle = result.clone();
    let run = move || {
        action().on_settled(move |_| {
            settle.resolve(());
        });
    };

    match runtime.pending_wait(document, node) {
        Some(previous) if !previous.is_settled() => previous.on_settled(move |_| run()),
        _ => run(),
    }

    if !result.is_settled() {
        runtime.set_wait(document, node, result.clone());
        let rt = runtime.clone();
        let doc = document.clone();
        let finished = result.clone();
        result.on_settled(move |_| rt.clear_wait(&doc, node, &finished));
    }
    result
}

/// Adapt a run to a unit promise (for [`wait`]).
pub fn as_promise(handle: &TransitionHandle) -> ObservablePromise<()> {
    handle.finished().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{el, text};
    use crate::dom::Event;
    use crate::transition::props::{fade, TransitionProp};

    fn setup() -> (Runtime, Document, NodeId) {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let div = doc.create_element("div");
        doc.append_child(doc.body(), div).unwrap();
        (rt, doc, div)
    }

    fn record(doc: &Document, node: NodeId, names: &[&'static str]) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in names {
            let log = log.clone();
            doc.add_event_listener(node, name, move |e: &Event| log.borrow_mut().push(e.name.clone()))
                .unwrap();
        }
        log
    }

    #[test]
    fn test_css_intro_lifecycle() {
        let (rt, doc, div) = setup();
        let log = record(&doc, div, &[events::INTRO_START, events::ANIMATION_END, events::INTRO_END]);

        let t = fade(vec![TransitionProp::Duration(100.0)])(&doc, div);
        let handle = run_transition(&rt, &doc, div, TransitionKind::Intro, t, || {});
        assert_eq!(*log.borrow(), vec![events::INTRO_START]);
        assert!(doc.flags(div).contains(NodeFlags::TRANSITIONING));

        rt.run_frame(0.0);
        assert_eq!(rt.animations().num_active_animations(), 1);
        assert!(doc.style_value(div, "animation").is_some());

        rt.run_frames(112.0, 16.0);
        assert_eq!(*log.borrow(), vec![events::INTRO_START, events::ANIMATION_END, events::INTRO_END]);
        assert!(!handle.is_running());
        assert_eq!(handle.finished().state(), crate::store::PromiseState::Result(true));
        assert_eq!(rt.animations().num_active_animations(), 0);
        assert!(!doc.flags(div).contains(NodeFlags::TRANSITIONING));
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let (rt, doc, div) = setup();
        let t = fade(vec![TransitionProp::Duration(100.0)])(&doc, div);
        let handle = run_transition(&rt, &doc, div, TransitionKind::Intro, t, || panic!("no on_end"));
        handle.cancel();
        rt.run_frames(200.0, 16.0);

        assert!(doc.find_keyframes_sheet().is_none());
        assert_eq!(rt.animations().num_active_animations(), 0);
        assert_eq!(handle.finished().state(), crate::store::PromiseState::Result(false));
    }

    #[test]
    fn test_tick_driven_run() {
        let (rt, doc, div) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let t = Transition::from_props(&[
            TransitionProp::Duration(32.0),
            TransitionProp::Tick(Rc::new(move |t: f64, _: f64| seen_clone.borrow_mut().push(t))),
        ]);
        run_transition(&rt, &doc, div, TransitionKind::Outro, t, || {});

        rt.run_frame(0.0); // start: tick(a)
        rt.run_frame(16.0); // 0.5 through
        rt.run_frame(32.0); // end: tick(b)
        assert_eq!(*seen.borrow(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_slow_animations_scale_duration() {
        let (rt, doc, div) = setup();
        rt.set_options(crate::runtime::SutilOptions { slow_animations: true, logging_enabled: false });
        let t = fade(vec![TransitionProp::Duration(10.0)])(&doc, div);
        let handle = run_transition(&rt, &doc, div, TransitionKind::Intro, t, || {});
        rt.run_frame(0.0);
        rt.run_frame(50.0);
        assert!(handle.is_running(), "10ms scaled to 100ms");
        rt.run_frame(100.0);
        rt.run_frame(116.0);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_transition_node_hides_after_outro() {
        let (rt, doc, div) = setup();
        let attrs = vec![TransitionAttribute::InOut(fade(vec![TransitionProp::Duration(32.0)]))];
        let done = Rc::new(Cell::new(false));
        let done_clone = done.clone();
        transition_node(&rt, &doc, div, &attrs, false, move || done_clone.set(true));

        assert_eq!(doc.style_value(div, "display"), None, "still visible during the outro");
        rt.run_frames(64.0, 16.0);
        assert_eq!(doc.style_value(div, "display").as_deref(), Some("none"));
        assert!(doc.flags(div).contains(NodeFlags::HIDDEN));
        assert!(done.get());
    }

    #[test]
    fn test_show_if_toggles_display() {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let visible = Store::new(false);
        let ctx = BuildContext::new(&rt, &doc, doc.body());

        let result = build(&show_if(visible.clone(), el("p", vec![text("hi")])), &ctx).unwrap();
        let p = result.nodes()[0];
        assert_eq!(doc.style_value(p, "display").as_deref(), Some("none"));

        visible.set(true);
        assert_eq!(doc.style_value(p, "display"), None);
        visible.set(false);
        assert_eq!(doc.style_value(p, "display").as_deref(), Some("none"));
    }

    #[test]
    fn test_wait_serializes_runs_on_one_node() {
        let (rt, doc, div) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first: ObservablePromise<()> = ObservablePromise::new();
        let first_clone = first.clone();
        let o1 = order.clone();
        wait(&rt, &doc, div, move || {
            o1.borrow_mut().push("first");
            first_clone
        });
        let o2 = order.clone();
        let second = wait(&rt, &doc, div, move || {
            o2.borrow_mut().push("second");
            ObservablePromise::resolved(())
        });

        assert_eq!(*order.borrow(), vec!["first"]);
        first.resolve(());
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert!(second.is_settled());
        assert!(rt.pending_wait(&doc, div).is_none());
    }
}
