//! Transitions - CSS keyframe and tick-driven animations.
//!
//! - [`frame`] - animation-frame queue and the cooperative loop-task set
//! - [`props`] - transition props, easings, `fade`/`fly`/`slide`/`scale`/`flip`
//! - [`animation`] - generated `@keyframes` rules guarded by RAII handles
//! - [`engine`] - the intro/outro state machine, show/hide blocks, `wait`

pub mod animation;
pub mod engine;
pub mod frame;
pub mod props;

pub use animation::{AnimationGuard, AnimationRegistry};
pub use engine::{
    as_promise, run_transition, show_if, transition, transition_node, wait, TransitionHandle,
    TransitionKind,
};
pub use frame::{FrameId, FrameScheduler, LoopTask, LoopTasks};
pub use props::{
    animate_of, easing, fade, flip, fly, intro_of, outro_of, scale, slide, CssGen, Easing, TickFn,
    Transition, TransitionAttribute, TransitionFactory, TransitionProp,
};
