//! Animation frames - the runtime's only scheduling primitive.
//!
//! [`FrameScheduler`] stands in for `requestAnimationFrame`: callbacks queue
//! up and the host drives them with [`FrameScheduler::run_frame`]. The batch
//! is taken out of the queue before it runs, so a callback scheduled while a
//! frame is running waits for the next frame.
//!
//! [`LoopTasks`] is the cooperative task set built on top of it: one pump per
//! frame evaluates every registered predicate and drops the ones that return
//! `false`, resolving their promise.
//!
//! # Example
//!
//! ```ignore
//! let frames = FrameScheduler::new();
//! let tasks = LoopTasks::new(frames.clone());
//!
//! let task = tasks.run_loop(|now| now < 100.0);
//! frames.run_frame(16.0);  // predicate true, stays registered
//! frames.run_frame(116.0); // predicate false, removed, promise resolved
//! assert!(task.promise().is_settled());
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::store::ObservablePromise;

// =============================================================================
// FrameScheduler
// =============================================================================

type FrameCallback = Box<dyn FnOnce(f64)>;

/// Identifies a queued frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

#[derive(Default)]
struct FrameInner {
    queue: RefCell<Vec<(FrameId, FrameCallback)>>,
    next_id: Cell<u64>,
    now: Cell<f64>,
    frames_run: Cell<u64>,
}

/// Queue of animation-frame callbacks.
#[derive(Clone, Default)]
pub struct FrameScheduler {
    inner: Rc<FrameInner>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("pending", &self.pending())
            .field("now", &self.now())
            .finish()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `callback` for the next frame.
    pub fn request_animation_frame(&self, callback: impl FnOnce(f64) + 'static) -> FrameId {
        let id = FrameId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.queue.borrow_mut().push((id, Box::new(callback)));
        id
    }

    /// Drop a queued callback.
    pub fn cancel_animation_frame(&self, id: FrameId) {
        self.inner.queue.borrow_mut().retain(|(queued, _)| *queued != id);
    }

    /// Run every callback queued before this call, passing `timestamp`.
    pub fn run_frame(&self, timestamp: f64) {
        self.inner.now.set(timestamp);
        self.inner.frames_run.set(self.inner.frames_run.get() + 1);
        let batch = std::mem::take(&mut *self.inner.queue.borrow_mut());
        for (_, callback) in batch {
            callback(timestamp);
        }
    }

    /// Timestamp of the latest frame.
    pub fn now(&self) -> f64 {
        self.inner.now.get()
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn frames_run(&self) -> u64 {
        self.inner.frames_run.get()
    }
}

// =============================================================================
// LoopTasks
// =============================================================================

type Predicate = Rc<dyn Fn(f64) -> bool>;

struct TaskEntry {
    id: u64,
    predicate: Predicate,
    done: ObservablePromise<()>,
}

struct LoopInner {
    frames: FrameScheduler,
    tasks: RefCell<Vec<TaskEntry>>,
    next_id: Cell<u64>,
    pump_scheduled: Cell<bool>,
}

/// Shared set of per-frame predicates.
#[derive(Clone)]
pub struct LoopTasks {
    inner: Rc<LoopInner>,
}

impl fmt::Debug for LoopTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopTasks").field("active", &self.len()).finish()
    }
}

impl LoopTasks {
    pub fn new(frames: FrameScheduler) -> Self {
        Self {
            inner: Rc::new(LoopInner {
                frames,
                tasks: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                pump_scheduled: Cell::new(false),
            }),
        }
    }

    /// Register `predicate`; it runs once per frame until it returns `false`.
    pub fn run_loop(&self, predicate: impl Fn(f64) -> bool + 'static) -> LoopTask {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let done = ObservablePromise::new();

        let was_empty = self.inner.tasks.borrow().is_empty();
        self.inner.tasks.borrow_mut().push(TaskEntry {
            id,
            predicate: Rc::new(predicate),
            done: done.clone(),
        });
        if was_empty {
            self.schedule_pump();
        }

        LoopTask { id, tasks: self.clone(), done }
    }

    fn schedule_pump(&self) {
        if self.inner.pump_scheduled.replace(true) {
            return;
        }
        let tasks = self.clone();
        self.inner.frames.request_animation_frame(move |now| tasks.pump(now));
    }

    fn pump(&self, now: f64) {
        self.inner.pump_scheduled.set(false);

        let snapshot: Vec<(u64, Predicate)> = self
            .inner
            .tasks
            .borrow()
            .iter()
            .map(|t| (t.id, t.predicate.clone()))
            .collect();

        for (id, predicate) in snapshot {
            if !self.contains(id) {
                continue;
            }
            if !predicate(now) {
                if let Some(entry) = self.take(id) {
                    entry.done.resolve(());
                }
            }
        }

        if !self.is_empty() {
            self.schedule_pump();
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.inner.tasks.borrow().iter().any(|t| t.id == id)
    }

    fn take(&self, id: u64) -> Option<TaskEntry> {
        let mut tasks = self.inner.tasks.borrow_mut();
        let index = tasks.iter().position(|t| t.id == id)?;
        Some(tasks.remove(index))
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.borrow().is_empty()
    }

    /// Remove every task without resolving.
    pub fn abort_all(&self) {
        let drained = std::mem::take(&mut *self.inner.tasks.borrow_mut());
        drop(drained);
    }
}

/// Handle to a registered loop predicate.
pub struct LoopTask {
    id: u64,
    tasks: LoopTasks,
    done: ObservablePromise<()>,
}

impl fmt::Debug for LoopTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopTask").field("id", &self.id).finish()
    }
}

impl LoopTask {
    /// Stop ticking. The promise is left unresolved; DOM changes already
    /// made by earlier ticks stay.
    pub fn abort(&self) {
        let removed = self.tasks.take(self.id);
        drop(removed);
    }

    /// Resolved when the predicate returns `false`.
    pub fn promise(&self) -> &ObservablePromise<()> {
        &self.done
    }

    pub fn is_running(&self) -> bool {
        self.tasks.contains(self.id)
    }
}
