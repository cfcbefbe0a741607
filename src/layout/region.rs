//! Control-flow layout: blocks of a region, loops and conditionals, recursing
//! into states and nested regions before placing the region itself.

use super::LayoutCx;
use super::layered::{LayeredGraph, Placement};
use super::state::layout_state;
use super::translate::Translate;
use super::types::{
    BlockContents, BlockKind, BlockLayout, BranchLayout, CfgLayout, InterstateEdgeLayout,
    LoopHeader, extent_from_origin,
};
use crate::error::LayoutError;
use crate::sdfg::{Block, CodeBlock, ConditionalBlock, ControlFlowRegion, InterstateEdge, Sdfg};

/// Lays out a whole description; the result's origin is `(0, 0)`.
pub fn layout_sdfg(sdfg: &Sdfg, cx: &LayoutCx<'_>) -> Result<CfgLayout, LayoutError> {
    let graph = RegionGraph {
        cfg_id: sdfg.cfg_list_id,
        blocks: &sdfg.nodes,
        edges: &sdfg.edges,
        start: sdfg.start_block,
    };
    layout_region(&graph, sdfg, cx)
}

struct RegionGraph<'a> {
    cfg_id: usize,
    blocks: &'a [Block],
    edges: &'a [InterstateEdge],
    start: Option<usize>,
}

impl<'a> RegionGraph<'a> {
    fn of(region: &'a ControlFlowRegion, parent_cfg: usize) -> Self {
        Self {
            cfg_id: region.effective_cfg_id(parent_cfg),
            blocks: &region.nodes,
            edges: &region.edges,
            start: region.start_block,
        }
    }
}

/// Vertical bands of a loop block above and below its body.
fn loop_bands(header: &LoopHeader, band: f32) -> (f32, f32) {
    let mut top = 0.0;
    let mut bottom = 0.0;
    if header.init.is_some() {
        top += band;
    }
    if header.condition.is_some() {
        if header.inverted {
            bottom += band;
        } else {
            top += band;
        }
    }
    if header.update.is_some() {
        bottom += band;
    }
    (top, bottom)
}

fn loop_header(region: &ControlFlowRegion) -> LoopHeader {
    LoopHeader {
        condition: region.loop_condition().map(str::to_string),
        init: region.init_statement().map(str::to_string),
        update: region.update_statement().map(str::to_string),
        inverted: region.is_inverted(),
    }
}

fn branch_condition(condition: Option<&CodeBlock>) -> Option<String> {
    condition
        .map(|code| code.string_data.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn layout_region(
    graph: &RegionGraph<'_>,
    sdfg: &Sdfg,
    cx: &LayoutCx<'_>,
) -> Result<CfgLayout, LayoutError> {
    let mut layout = CfgLayout {
        cfg_id: graph.cfg_id,
        ..CfgLayout::default()
    };

    let mut blocks: Vec<BlockLayout> = Vec::with_capacity(graph.blocks.len());
    for block in graph.blocks {
        blocks.push(size_block(block, graph.cfg_id, sdfg, cx)?);
    }

    let mut layered = LayeredGraph::new(cx.region_spacing());
    for block in &blocks {
        layered.set_node(block.id, block.width, block.height);
    }
    let mut edges: Vec<InterstateEdgeLayout> = Vec::with_capacity(graph.edges.len());
    for (id, edge) in graph.edges.iter().enumerate() {
        for endpoint in [edge.src, edge.dst] {
            if !layered.has_node(endpoint) {
                return Err(LayoutError::UnknownBlock {
                    cfg_id: graph.cfg_id,
                    edge: id,
                    block: endpoint,
                });
            }
        }
        layered.set_edge(edge.src, edge.dst);
        edges.push(InterstateEdgeLayout {
            id,
            src: edge.src,
            dst: edge.dst,
            label: edge.label().to_string(),
            points: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        });
    }

    let placement = place(&layered, graph, cx);

    for mut block in blocks {
        if let Some(center) = placement.centers.get(&block.id) {
            block.x = center.x;
            block.y = center.y;
        }
        offset_contents(&mut block, cx);
        layout.blocks.insert(block.id, block);
    }
    for (edge, route) in edges.iter_mut().zip(&placement.routes) {
        edge.points = route.clone();
        edge.update_bounds();
    }
    layout.edges = edges;

    let (width, height) = extent_from_origin(layout.calculate_bounding_box());
    layout.width = width;
    layout.height = height;
    log::trace!(
        "graph {}: {} block(s) in {}x{}",
        graph.cfg_id,
        layout.blocks.len(),
        width,
        height
    );
    Ok(layout)
}

/// Vertical state-machine placement first, the generic layered one if that fails.
fn place(layered: &LayeredGraph, graph: &RegionGraph<'_>, cx: &LayoutCx<'_>) -> Placement {
    if !cx.options.vertical_state_machine {
        return layered.layout();
    }
    let start = graph.start.filter(|id| layered.has_node(*id));
    match layered.layout_vertical_state_machine(start) {
        Ok(placement) => placement,
        Err(err) => {
            log::debug!(
                "graph {}: vertical layout failed ({err}); using layered layout",
                graph.cfg_id
            );
            layered.layout()
        }
    }
}

/// Lays out a block's contents (unless collapsed) and sizes the block around
/// them; contents stay at their local origin until [`offset_contents`].
fn size_block(
    block: &Block,
    cfg_id: usize,
    sdfg: &Sdfg,
    cx: &LayoutCx<'_>,
) -> Result<BlockLayout, LayoutError> {
    let config = cx.config;
    let margin = config.block_margin;
    let label = block.label().to_string();
    let collapsed = block.is_collapsed();
    let mut layout = BlockLayout {
        id: block.id(),
        cfg_id,
        kind: BlockKind::State,
        label,
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
        collapsed,
        header: None,
        contents: None,
    };
    let mut label_width = cx.label_width(&layout.label);

    match block {
        Block::State(state) => {
            if !collapsed {
                let contents = layout_state(state, sdfg, cfg_id, cx)?;
                layout.width = contents.width.max(label_width);
                layout.height = contents.height;
                layout.contents = Some(BlockContents::State(contents));
            }
        }
        Block::ControlFlowRegion(region) => {
            layout.kind = BlockKind::Region;
            if !collapsed {
                let contents = layout_region(&RegionGraph::of(region, cfg_id), sdfg, cx)?;
                layout.width = contents.width.max(label_width);
                layout.height = contents.height;
                layout.contents = Some(BlockContents::Region(contents));
            }
        }
        Block::LoopRegion(region) => {
            layout.kind = BlockKind::Loop;
            let header = loop_header(region);
            for text in [&header.condition, &header.init, &header.update]
                .into_iter()
                .flatten()
            {
                label_width = label_width.max(cx.label_width(text));
            }
            if !collapsed {
                let contents = layout_region(&RegionGraph::of(region, cfg_id), sdfg, cx)?;
                let (top, bottom) = loop_bands(&header, config.loop_band_height);
                layout.width = contents.width.max(label_width);
                layout.height = contents.height + top + bottom;
                layout.contents = Some(BlockContents::Region(contents));
            }
            layout.header = Some(header);
        }
        Block::ConditionalBlock(cond) => {
            layout.kind = BlockKind::Conditional;
            for (condition, _) in &cond.branches {
                if let Some(text) = branch_condition(condition.as_ref()) {
                    label_width = label_width.max(cx.label_width(&text));
                }
            }
            if !collapsed {
                let branches = layout_branches(cond, cfg_id, sdfg, cx)?;
                let inner_width = branches
                    .iter()
                    .map(|branch| branch.width)
                    .fold(label_width, f32::max);
                let inner_height = branches.iter().map(|branch| branch.height).sum::<f32>()
                    + config.branch_spacing * branches.len().saturating_sub(1) as f32;
                layout.width = inner_width;
                layout.height = inner_height;
                layout.contents = Some(BlockContents::Conditional(branches));
            }
        }
    }

    if collapsed {
        layout.width = label_width + 2.0 * margin;
        layout.height = 2.0 * config.line_height + 2.0 * margin;
    } else {
        layout.width += 2.0 * margin;
        layout.height += 2.0 * margin;
    }
    Ok(layout)
}

/// Each branch is laid out as its own region under a condition band.
fn layout_branches(
    cond: &ConditionalBlock,
    cfg_id: usize,
    sdfg: &Sdfg,
    cx: &LayoutCx<'_>,
) -> Result<Vec<BranchLayout>, LayoutError> {
    let band = cx.config.condition_band_height;
    let mut branches = Vec::with_capacity(cond.branches.len());
    for (condition, region) in &cond.branches {
        let condition = branch_condition(condition.as_ref());
        let body = layout_region(&RegionGraph::of(region, cfg_id), sdfg, cx)?;
        let label_width = condition
            .as_deref()
            .map_or(cx.label_width("else"), |text| cx.label_width(text));
        let width = body.width.max(label_width);
        let height = body.height + band;
        branches.push(BranchLayout {
            condition,
            x: width / 2.0,
            y: height / 2.0,
            width,
            height,
            region: body,
        });
    }
    Ok(branches)
}

/// Moves a placed block's contents from their local origin into its rectangle.
fn offset_contents(block: &mut BlockLayout, cx: &LayoutCx<'_>) {
    let config = cx.config;
    let margin = config.block_margin;
    let left = block.x - block.width / 2.0 + margin;
    let top = block.y - block.height / 2.0 + margin;
    let inner_width = block.width - 2.0 * margin;
    let band_top = block
        .header
        .as_ref()
        .map_or(0.0, |header| loop_bands(header, config.loop_band_height).0);

    match &mut block.contents {
        None => {}
        Some(BlockContents::State(state)) => {
            let origin = (state.x, state.y);
            state.move_origin(origin, (left, top));
        }
        Some(BlockContents::Region(region)) => {
            let origin = (region.x, region.y);
            region.move_origin(origin, (left, top + band_top));
        }
        Some(BlockContents::Conditional(branches)) => {
            let mut cursor = top;
            for branch in branches {
                branch.width = inner_width;
                let center = (left + inner_width / 2.0, cursor + branch.height / 2.0);
                let body_origin = (branch.region.x, branch.region.y);
                branch
                    .region
                    .move_origin(body_origin, (left, cursor + config.condition_band_height));
                branch.x = center.0;
                branch.y = center.1;
                cursor += branch.height + config.branch_spacing;
            }
        }
    }
}
