//! Writes a computed layout back into a copy of the description.
//!
//! Every placed block, node, connector and edge gets a `layout` annotation.
//! Elements left out of the drawing lose any stale annotation, edges feeding a
//! shortcut are marked `shortcut: false` and the shortcuts synthesized by the
//! pass are appended to their state's edge list.

use std::collections::BTreeMap;

use crate::layout::{
    BlockContents, CfgLayout, ConnectorLayout, InterstateEdgeLayout, MemletLayout, NodeLayout,
    StateLayout,
};
use crate::sdfg::{Block, InterstateEdge, LayoutAttr, Sdfg, State};

fn box_attr(x: f32, y: f32, width: f32, height: f32) -> LayoutAttr {
    LayoutAttr {
        x,
        y,
        width,
        height,
        ..LayoutAttr::default()
    }
}

fn connector_attrs(connectors: &[ConnectorLayout]) -> impl Iterator<Item = (String, LayoutAttr)> + '_ {
    connectors
        .iter()
        .map(|c| (c.name.clone(), box_attr(c.x, c.y, c.width, c.height)))
}

fn node_attr(node: &NodeLayout) -> LayoutAttr {
    let connectors: BTreeMap<String, LayoutAttr> = connector_attrs(&node.in_connectors)
        .chain(connector_attrs(&node.out_connectors))
        .collect();
    LayoutAttr {
        connectors,
        ..box_attr(node.x, node.y, node.width, node.height)
    }
}

fn memlet_attr(edge: &MemletLayout) -> LayoutAttr {
    LayoutAttr {
        points: edge.points.clone(),
        ..box_attr(edge.x, edge.y, edge.width, edge.height)
    }
}

fn interstate_attr(edge: &InterstateEdgeLayout) -> LayoutAttr {
    LayoutAttr {
        points: edge.points.clone(),
        ..box_attr(edge.x, edge.y, edge.width, edge.height)
    }
}

fn graph_attr(layout: &CfgLayout) -> LayoutAttr {
    box_attr(
        layout.x + layout.width / 2.0,
        layout.y + layout.height / 2.0,
        layout.width,
        layout.height,
    )
}

/// A copy of `sdfg` carrying `layout`.
pub fn annotate_sdfg(sdfg: &Sdfg, layout: &CfgLayout) -> Sdfg {
    let mut out = sdfg.clone();
    annotate_in_place(&mut out, layout);
    out
}

pub fn annotate_in_place(sdfg: &mut Sdfg, layout: &CfgLayout) {
    sdfg.attributes.layout = Some(graph_attr(layout));
    annotate_graph(&mut sdfg.nodes, &mut sdfg.edges, layout);
}

fn annotate_graph(blocks: &mut [Block], edges: &mut [InterstateEdge], layout: &CfgLayout) {
    for block in blocks.iter_mut() {
        let Some(placed) = layout.blocks.get(&block.id()) else {
            block.attributes_mut().layout = None;
            continue;
        };
        block.attributes_mut().layout = Some(box_attr(placed.x, placed.y, placed.width, placed.height));
        match (block, &placed.contents) {
            (Block::State(state), Some(BlockContents::State(contents))) => {
                annotate_state(state, contents)
            }
            (
                Block::ControlFlowRegion(region) | Block::LoopRegion(region),
                Some(BlockContents::Region(contents)),
            ) => annotate_graph(&mut region.nodes, &mut region.edges, contents),
            (Block::ConditionalBlock(cond), Some(BlockContents::Conditional(branches))) => {
                for ((_, region), branch) in cond.branches.iter_mut().zip(branches) {
                    region.attributes.layout =
                        Some(box_attr(branch.x, branch.y, branch.width, branch.height));
                    annotate_graph(&mut region.nodes, &mut region.edges, &branch.region);
                }
            }
            _ => {}
        }
    }
    for (idx, edge) in edges.iter_mut().enumerate() {
        edge.attributes.layout = layout
            .edges
            .iter()
            .find(|placed| placed.id == idx)
            .map(interstate_attr);
    }
}

fn annotate_state(state: &mut State, layout: &StateLayout) {
    for node in &mut state.nodes {
        let placed = layout.nodes.get(&node.id);
        node.attributes.layout = placed.map(node_attr);
        if let (Some(nested_layout), Some(nested)) = (
            placed.and_then(|n| n.nested.as_deref()),
            node.attributes.sdfg.as_deref_mut(),
        ) {
            annotate_in_place(nested, nested_layout);
        }
    }

    let described = state.edges.len();
    for (idx, edge) in state.edges.iter_mut().enumerate() {
        edge.attributes.layout = layout.edge(idx).map(memlet_attr);
        if layout.fragment_edges.contains(&idx) && !edge.is_shortcut() {
            edge.attributes.data.attributes.shortcut = Some(false);
        }
    }
    for (offset, shortcut) in layout.synthesized.iter().enumerate() {
        let mut shortcut = shortcut.clone();
        shortcut.attributes.layout = layout.edge(described + offset).map(memlet_attr);
        state.edges.push(shortcut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutConfig, LayoutOptions};
    use crate::layout::{FixedWidth, LayoutCx, layout_sdfg};
    use crate::sdfg::{fixtures, parse_sdfg, stringify_sdfg};

    fn annotated(sdfg: &Sdfg, options: LayoutOptions) -> Sdfg {
        let config = LayoutConfig::default();
        let measure = FixedWidth(6.0);
        let layout = layout_sdfg(sdfg, &LayoutCx::new(&config, &options, Some(&measure))).unwrap();
        annotate_sdfg(sdfg, &layout)
    }

    fn first_state(sdfg: &Sdfg) -> &State {
        match &sdfg.nodes[0] {
            Block::State(state) => state,
            other => panic!("expected a state, got {other:?}"),
        }
    }

    #[test]
    fn every_drawn_element_is_annotated() {
        let sdfg = annotated(&fixtures::map_state(), LayoutOptions::default());
        assert!(sdfg.attributes.layout.is_some());
        assert!(sdfg.nodes[0].attributes().layout.is_some());
        let state = first_state(&sdfg);
        assert!(state.nodes.iter().all(|node| node.attributes.layout.is_some()));
        assert!(state.edges.iter().all(|edge| {
            edge.attributes
                .layout
                .as_ref()
                .is_some_and(|layout| layout.points.len() >= 2)
        }));
        let entry = state.node(1).and_then(|n| n.attributes.layout.as_ref()).unwrap();
        assert_eq!(
            entry.connectors.keys().cloned().collect::<Vec<_>>(),
            vec!["IN_A".to_string(), "OUT_A".to_string()]
        );
    }

    #[test]
    fn shortcuts_are_appended_and_fragments_marked() {
        let options = LayoutOptions {
            omit_access_nodes: true,
            ..LayoutOptions::default()
        };
        let sdfg = annotated(&fixtures::access_chain(), options);
        let state = first_state(&sdfg);
        assert_eq!(state.edges.len(), 4);
        let flags: Vec<Option<bool>> = state.edges.iter().map(|edge| edge.shortcut()).collect();
        assert_eq!(flags, vec![Some(false), Some(false), Some(false), Some(true)]);
        assert!(state.node(1).unwrap().attributes.layout.is_none());
        assert!(state.edges[3].attributes.layout.is_some());

        // A second pass over the annotated copy adds nothing.
        let again = annotated(&sdfg, options);
        assert_eq!(first_state(&again).edges.len(), 4);
    }

    #[test]
    fn nested_annotations_survive_serialization() {
        let sdfg = annotated(&fixtures::nested_two_levels(), LayoutOptions::default());
        let reparsed = parse_sdfg(&stringify_sdfg(&sdfg).unwrap()).unwrap();
        let middle = first_state(&reparsed).node(0).unwrap().attributes.sdfg.as_deref().unwrap();
        assert!(middle.attributes.layout.is_some());
        assert!(first_state(middle).node(1).unwrap().attributes.layout.is_some());
    }

    #[test]
    fn interstate_edges_carry_points() {
        let sdfg = annotated(&fixtures::control_flow(), LayoutOptions::default());
        assert!(sdfg.edges.iter().all(|edge| {
            edge.attributes
                .layout
                .as_ref()
                .is_some_and(|layout| !layout.points.is_empty())
        }));
    }
}
