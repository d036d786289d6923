//! Transition descriptions - props, easings and the built-in transitions.
//!
//! A [`Transition`] is produced by folding a list of [`TransitionProp`]s over
//! a default. Built-ins (`fade`, `fly`, `slide`, `scale`) return a
//! [`TransitionFactory`] that inspects the node when the transition starts
//! (target opacity, measured height) and fills in a CSS generator.
//!
//! ```ignore
//! let intro = fly(vec![TransitionProp::Y(20.0), TransitionProp::Duration(200.0)]);
//! el("li", vec![...]) // used through TransitionAttribute::In(intro)
//! ```

use std::fmt;
use std::rc::Rc;

use crate::dom::{style, Document};
use crate::types::{NodeId, Rect};

/// Easing curve over `[0, 1]`.
pub type Easing = Rc<dyn Fn(f64) -> f64>;
/// CSS generator: `(t, 1 - t)` to declarations.
pub type CssGen = Rc<dyn Fn(f64, f64) -> String>;
/// Per-frame callback: `(t, 1 - t)`.
pub type TickFn = Rc<dyn Fn(f64, f64)>;
/// Builds the transition for a node when it starts.
pub type TransitionFactory = Rc<dyn Fn(&Document, NodeId) -> Transition>;

// =============================================================================
// Easing
// =============================================================================

pub mod easing {
    pub fn linear(t: f64) -> f64 {
        t
    }

    pub fn quad_out(t: f64) -> f64 {
        -t * (t - 2.0)
    }

    pub fn cubic_in(t: f64) -> f64 {
        t * t * t
    }

    pub fn cubic_out(t: f64) -> f64 {
        let f = t - 1.0;
        f * f * f + 1.0
    }

    pub fn cubic_in_out(t: f64) -> f64 {
        if t < 0.5 {
            4.0 * t * t * t
        } else {
            0.5 * (2.0 * t - 2.0).powi(3) + 1.0
        }
    }
}

fn ease(f: fn(f64) -> f64) -> Easing {
    Rc::new(f)
}

// =============================================================================
// Props
// =============================================================================

/// One setting of a [`Transition`].
#[derive(Clone)]
pub enum TransitionProp {
    Key(String),
    X(f64),
    Y(f64),
    Opacity(f64),
    Delay(f64),
    Duration(f64),
    /// Duration computed from the distance travelled (FLIP).
    DurationFn(Rc<dyn Fn(f64) -> f64>),
    /// Pixels per millisecond (FLIP), used when no duration is given.
    Speed(f64),
    Ease(Easing),
    CssGen(CssGen),
    Tick(TickFn),
    /// Used when the transition itself produces neither CSS nor ticks.
    Fallback(TransitionFactory),
}

impl fmt::Debug for TransitionProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionProp::Key(k) => write!(f, "Key({k:?})"),
            TransitionProp::X(v) => write!(f, "X({v})"),
            TransitionProp::Y(v) => write!(f, "Y({v})"),
            TransitionProp::Opacity(v) => write!(f, "Opacity({v})"),
            TransitionProp::Delay(v) => write!(f, "Delay({v})"),
            TransitionProp::Duration(v) => write!(f, "Duration({v})"),
            TransitionProp::DurationFn(_) => f.write_str("DurationFn(..)"),
            TransitionProp::Speed(v) => write!(f, "Speed({v})"),
            TransitionProp::Ease(_) => f.write_str("Ease(..)"),
            TransitionProp::CssGen(_) => f.write_str("CssGen(..)"),
            TransitionProp::Tick(_) => f.write_str("Tick(..)"),
            TransitionProp::Fallback(_) => f.write_str("Fallback(..)"),
        }
    }
}

// =============================================================================
// Transition
// =============================================================================

/// A fully resolved transition.
#[derive(Clone)]
pub struct Transition {
    pub key: String,
    pub x: f64,
    pub y: f64,
    pub opacity: f64,
    pub delay: f64,
    pub duration: f64,
    pub duration_fn: Option<Rc<dyn Fn(f64) -> f64>>,
    pub speed: f64,
    pub ease: Easing,
    pub css: Option<CssGen>,
    pub tick: Option<TickFn>,
    pub fallback: Option<TransitionFactory>,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            key: String::new(),
            x: 0.0,
            y: 0.0,
            opacity: 0.0,
            delay: 0.0,
            duration: 0.0,
            duration_fn: None,
            speed: 0.0,
            ease: ease(easing::linear),
            css: None,
            tick: None,
            fallback: None,
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("key", &self.key)
            .field("delay", &self.delay)
            .field("duration", &self.duration)
            .field("css", &self.css.is_some())
            .field("tick", &self.tick.is_some())
            .finish()
    }
}

impl Transition {
    /// Fold `props` over the default transition.
    pub fn from_props(props: &[TransitionProp]) -> Self {
        Self::default().with_props(props)
    }

    /// Apply `props` on top of `self`; later props win.
    pub fn with_props(self, props: &[TransitionProp]) -> Self {
        props.iter().cloned().fold(self, |mut t, prop| {
            match prop {
                TransitionProp::Key(k) => t.key = k,
                TransitionProp::X(v) => t.x = v,
                TransitionProp::Y(v) => t.y = v,
                TransitionProp::Opacity(v) => t.opacity = v,
                TransitionProp::Delay(v) => t.delay = v,
                TransitionProp::Duration(v) => t.duration = v,
                TransitionProp::DurationFn(f) => t.duration_fn = Some(f),
                TransitionProp::Speed(v) => t.speed = v,
                TransitionProp::Ease(e) => t.ease = e,
                TransitionProp::CssGen(c) => t.css = Some(c),
                TransitionProp::Tick(f) => t.tick = Some(f),
                TransitionProp::Fallback(f) => t.fallback = Some(f),
            }
            t
        })
    }

    /// True when running this transition changes nothing visible.
    pub fn is_empty(&self) -> bool {
        self.css.is_none() && self.tick.is_none()
    }

    /// Resolve the fallback when the transition itself is empty.
    pub fn or_fallback(self, document: &Document, node: NodeId) -> Self {
        match (&self.fallback, self.is_empty()) {
            (Some(fallback), true) => fallback(document, node),
            _ => self,
        }
    }
}

/// Opacity the node has when fully shown.
fn target_opacity(document: &Document, node: NodeId) -> f64 {
    document
        .style_value(node, "opacity")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0)
}

// =============================================================================
// Built-in transitions
// =============================================================================

/// Fade opacity in/out.
pub fn fade(props: Vec<TransitionProp>) -> TransitionFactory {
    Rc::new(move |document: &Document, node: NodeId| {
        let base = Transition { duration: 400.0, ..Transition::default() }.with_props(&props);
        let target = target_opacity(document, node);
        Transition {
            css: Some(Rc::new(move |t: f64, _: f64| format!("opacity: {};", t * target))),
            ..base
        }
    })
}

/// Fly from an `(x, y)` offset while fading from `opacity`.
pub fn fly(props: Vec<TransitionProp>) -> TransitionFactory {
    Rc::new(move |document: &Document, node: NodeId| {
        let base = Transition {
            duration: 400.0,
            ease: ease(easing::cubic_out),
            ..Transition::default()
        }
        .with_props(&props);
        let target = target_opacity(document, node);
        let od = target * (1.0 - base.opacity);
        let (x, y) = (base.x, base.y);
        Transition {
            css: Some(Rc::new(move |t: f64, u: f64| {
                format!(
                    "transform: translate({}px, {}px); opacity: {};",
                    (1.0 - t) * x,
                    (1.0 - t) * y,
                    target - od * u
                )
            })),
            ..base
        }
    })
}

/// Slide the height open/closed.
pub fn slide(props: Vec<TransitionProp>) -> TransitionFactory {
    Rc::new(move |document: &Document, node: NodeId| {
        let base = Transition {
            duration: 400.0,
            ease: ease(easing::cubic_out),
            ..Transition::default()
        }
        .with_props(&props);
        let target = target_opacity(document, node);
        let height = document
            .style_value(node, "height")
            .and_then(|h| style::parse_px(&h))
            .unwrap_or_else(|| document.bounding_client_rect(node).height);
        Transition {
            css: Some(Rc::new(move |t: f64, _: f64| {
                format!(
                    "overflow: hidden; opacity: {}; height: {}px;",
                    (t * 20.0).min(1.0) * target,
                    t * height
                )
            })),
            ..base
        }
    })
}

/// Scale up from nothing while fading from `opacity`.
pub fn scale(props: Vec<TransitionProp>) -> TransitionFactory {
    Rc::new(move |document: &Document, node: NodeId| {
        let base = Transition {
            duration: 400.0,
            ease: ease(easing::cubic_out),
            ..Transition::default()
        }
        .with_props(&props);
        let target = target_opacity(document, node);
        let od = target * (1.0 - base.opacity);
        Transition {
            css: Some(Rc::new(move |t: f64, u: f64| {
                format!("transform: scale({t}); opacity: {};", target - od * u)
            })),
            ..base
        }
    })
}

/// FLIP move from `from` to `to`.
///
/// Duration is `DurationFn(distance)` if given, else `distance / Speed`,
/// else `sqrt(distance) * 120` ms.
pub fn flip(from: Rect, to: Rect, props: &[TransitionProp]) -> Transition {
    let base = Transition { ease: ease(easing::cubic_out), ..Transition::default() }.with_props(props);
    let dx = from.left - to.left;
    let dy = from.top - to.top;
    let distance = (dx * dx + dy * dy).sqrt();

    let explicit = props.iter().any(|p| matches!(p, TransitionProp::Duration(_)));
    let duration = match (&base.duration_fn, explicit) {
        (Some(f), false) => f(distance),
        (None, false) if base.speed > 0.0 => distance / base.speed,
        (None, false) => distance.sqrt() * 120.0,
        (_, true) => base.duration,
    };

    Transition {
        duration,
        css: Some(Rc::new(move |_: f64, u: f64| format!("transform: translate({}px, {}px);", u * dx, u * dy))),
        ..base
    }
}

// =============================================================================
// Transition attributes
// =============================================================================

/// How a block transitions its nodes.
#[derive(Clone)]
pub enum TransitionAttribute {
    /// Same factory for intro and outro.
    InOut(TransitionFactory),
    In(TransitionFactory),
    Out(TransitionFactory),
    /// FLIP move animation with these props.
    Animate(Vec<TransitionProp>),
}

impl fmt::Debug for TransitionAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAttribute::InOut(_) => f.write_str("InOut(..)"),
            TransitionAttribute::In(_) => f.write_str("In(..)"),
            TransitionAttribute::Out(_) => f.write_str("Out(..)"),
            TransitionAttribute::Animate(props) => write!(f, "Animate({props:?})"),
        }
    }
}

/// Intro factory of a block, if any (the last matching attribute wins).
pub fn intro_of(attrs: &[TransitionAttribute]) -> Option<TransitionFactory> {
    attrs.iter().rev().find_map(|a| match a {
        TransitionAttribute::InOut(f) | TransitionAttribute::In(f) => Some(f.clone()),
        _ => None,
    })
}

/// Outro factory of a block, if any.
pub fn outro_of(attrs: &[TransitionAttribute]) -> Option<TransitionFactory> {
    attrs.iter().rev().find_map(|a| match a {
        TransitionAttribute::InOut(f) | TransitionAttribute::Out(f) => Some(f.clone()),
        _ => None,
    })
}

/// FLIP props of a block, if it animates moves.
pub fn animate_of(attrs: &[TransitionAttribute]) -> Option<Vec<TransitionProp>> {
    attrs.iter().rev().find_map(|a| match a {
        TransitionAttribute::Animate(props) => Some(props.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_props_later_wins() {
        let t = Transition::from_props(&[
            TransitionProp::Duration(100.0),
            TransitionProp::Delay(5.0),
            TransitionProp::Duration(250.0),
        ]);
        assert_eq!(t.duration, 250.0);
        assert_eq!(t.delay, 5.0);
        assert!(t.is_empty());
    }

    #[test]
    fn test_easing_endpoints() {
        for f in [easing::linear, easing::quad_out, easing::cubic_in, easing::cubic_out, easing::cubic_in_out] {
            assert!((f(0.0)).abs() < 1e-9);
            assert!((f(1.0) - 1.0).abs() < 1e-9);
        }
        assert!(easing::cubic_out(0.5) > 0.5);
        assert!(easing::cubic_in(0.5) < 0.5);
    }

    #[test]
    fn test_fade_uses_node_opacity() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.set_style_value(div, "opacity", Some("0.5")).unwrap();

        let t = fade(vec![TransitionProp::Duration(100.0)])(&doc, div);
        assert_eq!(t.duration, 100.0);
        let css = t.css.unwrap();
        assert_eq!(css(1.0, 0.0), "opacity: 0.5;");
        assert_eq!(css(0.0, 1.0), "opacity: 0;");
    }

    #[test]
    fn test_fly_offsets_shrink_to_zero() {
        let doc = Document::new();
        let div = doc.create_element("div");
        let t = fly(vec![TransitionProp::X(10.0), TransitionProp::Y(4.0)])(&doc, div);
        let css = t.css.unwrap();
        assert_eq!(css(0.0, 1.0), "transform: translate(10px, 4px); opacity: 0;");
        assert_eq!(css(1.0, 0.0), "transform: translate(0px, 0px); opacity: 1;");
    }

    #[test]
    fn test_flip_duration_rules() {
        let from = Rect::new(0.0, 0.0, 10.0, 10.0);
        let to = Rect::new(0.0, 100.0, 10.0, 10.0);

        assert_eq!(flip(from, to, &[]).duration, 1200.0);
        assert_eq!(flip(from, to, &[TransitionProp::Speed(0.5)]).duration, 200.0);
        assert_eq!(flip(from, to, &[TransitionProp::DurationFn(Rc::new(|d: f64| d / 10.0))]).duration, 10.0);
        assert_eq!(flip(from, to, &[TransitionProp::Duration(50.0)]).duration, 50.0);

        let css = flip(from, to, &[]).css.unwrap();
        assert_eq!(css(0.0, 1.0), "transform: translate(0px, -100px);");
    }

    #[test]
    fn test_fallback_used_for_empty_transition() {
        let doc = Document::new();
        let div = doc.create_element("div");
        let t = Transition::from_props(&[TransitionProp::Fallback(fade(vec![]))]).or_fallback(&doc, div);
        assert!(t.css.is_some());
    }

    #[test]
    fn test_attribute_lookup() {
        let attrs = vec![TransitionAttribute::In(fade(vec![])), TransitionAttribute::Animate(vec![])];
        assert!(intro_of(&attrs).is_some());
        assert!(outro_of(&attrs).is_none());
        assert!(animate_of(&attrs).is_some());
    }
}
