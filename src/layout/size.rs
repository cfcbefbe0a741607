use super::text::{TextMeasure, label_width};
use crate::sdfg::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSize {
    pub width: f32,
    pub height: f32,
}

/// Everything the size rules look at.
#[derive(Debug, Clone, Copy)]
pub struct NodeSizeInput<'a> {
    pub kind: &'a NodeKind,
    pub label: &'a str,
    pub in_connectors: usize,
    pub out_connectors: usize,
    pub collapsed: bool,
    /// Content extent of an expanded nested graph.
    pub nested_extent: Option<(f32, f32)>,
}

/// Width needed for one row of `count` connectors of diameter `l` with gaps of `l`.
fn connector_row_width(count: usize, l: f32) -> f32 {
    2.0 * l * count as f32 - l
}

pub fn calculate_node_size(
    input: &NodeSizeInput<'_>,
    line_height: f32,
    measure: Option<&dyn TextMeasure>,
) -> NodeSize {
    let l = line_height;
    let connectors = connector_row_width(input.in_connectors, l)
        .max(connector_row_width(input.out_connectors, l));

    if input.kind.is_nested() {
        if !input.collapsed
            && let Some((width, height)) = input.nested_extent
        {
            return NodeSize {
                width: width + 2.0 * l,
                height: height + 2.0 * l,
            };
        }
        let mut width = (input.label.chars().count() as f32 * l * 0.8).max(connectors);
        let mut height = 6.0 * l;
        width += 2.0 * (height / 3.0);
        height /= 1.75;
        return NodeSize { width, height };
    }

    let mut width = label_width(input.label, measure).max(connectors);
    let mut height = 6.0 * l;
    match input.kind {
        NodeKind::AccessNode => {
            height -= 4.0 * l;
            width += height;
        }
        NodeKind::Entry(_) | NodeKind::Exit(_) => {
            width += 2.0 * height;
            height /= 1.75;
        }
        NodeKind::Tasklet | NodeKind::Library(_) => {
            width += 2.0 * (height / 3.0);
            height /= 1.75;
        }
        NodeKind::Reduce => {
            width *= 2.0;
            height = width / 3.0;
        }
        NodeKind::NestedSdfg => {}
    }
    NodeSize { width, height }
}
