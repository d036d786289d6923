//! Layout - bounding client rects for the headless document via Taffy.
//!
//! Elements are flex containers (column unless `flex-direction: row`),
//! `display:none` elements and comments take no space, and text is measured
//! with a fixed-pitch font: [`CHAR_WIDTH`] per character, [`LINE_HEIGHT`] per
//! wrapped line. Pixel `width`/`height` inline styles are honoured.
//!
//! The result is deterministic, which is all FLIP animation and the tests
//! need from `getBoundingClientRect`.

use std::collections::HashMap;

use taffy::{
    AvailableSpace, Dimension, Display, FlexDirection, NodeId as TaffyNodeId, Size, Style,
    TaffyTree,
};

use crate::types::{NodeId, Rect};

/// Width of the layout viewport in CSS pixels.
pub const VIEWPORT_WIDTH: f32 = 1024.0;
/// Advance of one character.
pub const CHAR_WIDTH: f32 = 8.0;
/// Height of one line of text.
pub const LINE_HEIGHT: f32 = 16.0;

// =============================================================================
// Layout input tree
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LayoutKind {
    Hidden,
    Text { chars: usize },
    Element { width: Option<f64>, height: Option<f64>, row: bool },
}

/// Snapshot of the document subtree handed to Taffy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayoutNode {
    pub(crate) node: NodeId,
    pub(crate) kind: LayoutKind,
    pub(crate) children: Vec<LayoutNode>,
}

impl LayoutNode {
    pub(crate) fn hidden(node: NodeId) -> Self {
        Self { node, kind: LayoutKind::Hidden, children: Vec::new() }
    }

    pub(crate) fn text(node: NodeId, chars: usize) -> Self {
        Self { node, kind: LayoutKind::Text { chars }, children: Vec::new() }
    }

    pub(crate) fn element(
        node: NodeId,
        display_none: bool,
        width: Option<f64>,
        height: Option<f64>,
        row: bool,
        children: Vec<LayoutNode>,
    ) -> Self {
        if display_none {
            return Self::hidden(node);
        }
        Self { node, kind: LayoutKind::Element { width, height, row }, children }
    }
}

// =============================================================================
// Conversion
// =============================================================================

fn to_dimension(px: Option<f64>) -> Dimension {
    match px {
        Some(px) => Dimension::Length(px as f32),
        None => Dimension::Auto,
    }
}

fn build_style(kind: &LayoutKind) -> Style {
    match kind {
        LayoutKind::Hidden => Style { display: Display::None, ..Style::default() },
        LayoutKind::Text { .. } => Style::default(),
        LayoutKind::Element { width, height, row } => Style {
            display: Display::Flex,
            flex_direction: if *row { FlexDirection::Row } else { FlexDirection::Column },
            size: Size { width: to_dimension(*width), height: to_dimension(*height) },
            ..Style::default()
        },
    }
}

/// Measure `chars` characters of fixed-pitch text, wrapping to the width
/// Taffy offers.
fn measure_text(
    chars: usize,
    known_dimensions: Size<Option<f32>>,
    available_space: Size<AvailableSpace>,
) -> Size<f32> {
    let natural = chars as f32 * CHAR_WIDTH;
    let max_width = match available_space.width {
        AvailableSpace::Definite(w) => w.max(CHAR_WIDTH),
        AvailableSpace::MinContent => CHAR_WIDTH,
        AvailableSpace::MaxContent => f32::INFINITY,
    };
    let width = known_dimensions.width.unwrap_or(natural.min(max_width));
    let lines = if chars == 0 {
        0.0
    } else if width <= 0.0 {
        1.0
    } else {
        (natural / width).ceil().max(1.0)
    };
    Size {
        width,
        height: known_dimensions.height.unwrap_or(lines * LINE_HEIGHT),
    }
}

fn insert(tree: &mut TaffyTree<usize>, node: &LayoutNode, index: &mut Vec<(NodeId, TaffyNodeId)>) -> Option<TaffyNodeId> {
    let style = build_style(&node.kind);
    let taffy_node = match node.kind {
        LayoutKind::Text { chars } => tree.new_leaf_with_context(style, chars).ok()?,
        _ => tree.new_leaf(style).ok()?,
    };
    index.push((node.node, taffy_node));
    for child in &node.children {
        if let Some(child_node) = insert(tree, child, index) {
            let _ = tree.add_child(taffy_node, child_node);
        }
    }
    Some(taffy_node)
}

/// Compute the absolute rect of every node under `root`.
pub(crate) fn compute_rects(root: &LayoutNode) -> HashMap<NodeId, Rect> {
    let mut tree: TaffyTree<usize> = TaffyTree::new();
    let mut index = Vec::new();
    let mut rects = HashMap::new();

    let Some(root_node) = insert(&mut tree, root, &mut index) else {
        return rects;
    };

    let available = Size {
        width: AvailableSpace::Definite(VIEWPORT_WIDTH),
        height: AvailableSpace::MaxContent,
    };
    let mut measure_fn = |known_dimensions: Size<Option<f32>>,
                          available_space: Size<AvailableSpace>,
                          _node_id: TaffyNodeId,
                          context: Option<&mut usize>,
                          _style: &Style| {
        match context {
            Some(&mut chars) => measure_text(chars, known_dimensions, available_space),
            None => Size::ZERO,
        }
    };
    if tree
        .compute_layout_with_measure(root_node, available, &mut measure_fn)
        .is_err()
    {
        return rects;
    }

    accumulate(&tree, root, &index, 0.0, 0.0, &mut rects);
    rects
}

fn accumulate(
    tree: &TaffyTree<usize>,
    node: &LayoutNode,
    index: &[(NodeId, TaffyNodeId)],
    parent_left: f64,
    parent_top: f64,
    rects: &mut HashMap<NodeId, Rect>,
) {
    let Some(&(_, taffy_node)) = index.iter().find(|(n, _)| *n == node.node) else {
        return;
    };
    let Ok(layout) = tree.layout(taffy_node) else {
        return;
    };
    if node.kind == LayoutKind::Hidden {
        rects.insert(node.node, Rect::ZERO);
        return;
    }
    let left = parent_left + layout.location.x as f64;
    let top = parent_top + layout.location.y as f64;
    rects.insert(
        node.node,
        Rect::new(left, top, layout.size.width as f64, layout.size.height as f64),
    );
    for child in &node.children {
        accumulate(tree, child, index, left, top, rects);
    }
}
