//! Hit testing over a computed layout.

use crate::config::LayoutOptions;
use crate::element::{ConnectorSide, ElementId, ElementRef};
use crate::geometry::{Point, Rect, polyline_bounds, polyline_distance, polyline_intersects_rect};
use crate::layout::{BlockContents, CfgLayout, StateLayout};

/// Distance within which a point counts as touching an edge polyline.
pub const EDGE_HIT_TOLERANCE: f32 = 5.0;

pub type Hit<'a> = (ElementId, ElementRef<'a>);

enum Shape<'a> {
    Box(Rect),
    Line(&'a [Point]),
}

/// Elements whose box (or polyline) overlaps `rect`.
pub fn elements_in_rect<'a>(layout: &'a CfgLayout, rect: &Rect, options: &LayoutOptions) -> Vec<Hit<'a>> {
    collect(layout, options, &|shape| match shape {
        Shape::Box(bounds) => bounds.intersects(rect),
        Shape::Line(points) => polyline_intersects_rect(points, rect),
    })
}

/// Elements under `point`; edges match within [`EDGE_HIT_TOLERANCE`].
pub fn elements_at_point<'a>(layout: &'a CfgLayout, point: Point, options: &LayoutOptions) -> Vec<Hit<'a>> {
    collect(layout, options, &|shape| match shape {
        Shape::Box(bounds) => bounds.contains_point(point),
        Shape::Line(points) => polyline_distance(points, point) <= EDGE_HIT_TOLERANCE,
    })
}

/// Elements lying entirely inside `rect`.
pub fn elements_contained_in<'a>(
    layout: &'a CfgLayout,
    rect: &Rect,
    options: &LayoutOptions,
) -> Vec<Hit<'a>> {
    collect(layout, options, &|shape| match shape {
        Shape::Box(bounds) => rect.contains_rect(&bounds),
        Shape::Line(points) => polyline_bounds(points).is_some_and(|bounds| rect.contains_rect(&bounds)),
    })
}

fn collect<'a>(layout: &'a CfgLayout, options: &LayoutOptions, test: &dyn Fn(Shape<'_>) -> bool) -> Vec<Hit<'a>> {
    let mut hits = Vec::new();
    walk_cfg(layout, options, test, &mut hits);
    hits
}

fn walk_cfg<'a>(
    cfg: &'a CfgLayout,
    options: &LayoutOptions,
    test: &dyn Fn(Shape<'_>) -> bool,
    hits: &mut Vec<Hit<'a>>,
) {
    for block in cfg.blocks.values() {
        if test(Shape::Box(block.bounds())) {
            hits.push((ElementId::block(block.cfg_id, block.id), ElementRef::Block(block)));
        }
        match &block.contents {
            Some(BlockContents::State(state)) => walk_state(state, options, test, hits),
            Some(BlockContents::Region(region)) => walk_cfg(region, options, test, hits),
            Some(BlockContents::Conditional(branches)) => {
                for branch in branches {
                    walk_cfg(&branch.region, options, test, hits);
                }
            }
            None => {}
        }
    }
    for (idx, edge) in cfg.edges.iter().enumerate() {
        if test(Shape::Line(&edge.points)) {
            hits.push((ElementId::interstate_edge(cfg.cfg_id, idx), ElementRef::InterstateEdge(edge)));
        }
    }
}

fn walk_state<'a>(
    state: &'a StateLayout,
    options: &LayoutOptions,
    test: &dyn Fn(Shape<'_>) -> bool,
    hits: &mut Vec<Hit<'a>>,
) {
    for node in state.nodes.values() {
        if options.omit_access_nodes && node.kind.is_access() {
            continue;
        }
        let id = ElementId::node(state.cfg_id, state.state_id, node.id);
        if test(Shape::Box(node.bounds())) {
            hits.push((id, ElementRef::Node(node)));
        }
        let connectors = node
            .in_connectors
            .iter()
            .map(|c| (ConnectorSide::In, c))
            .chain(node.out_connectors.iter().map(|c| (ConnectorSide::Out, c)));
        for (side, connector) in connectors {
            if test(Shape::Box(connector.bounds())) {
                hits.push((
                    id,
                    ElementRef::Connector {
                        node,
                        side,
                        connector,
                    },
                ));
            }
        }
        if let Some(nested) = node.nested.as_deref() {
            walk_cfg(nested, options, test, hits);
        }
    }
    for edge in &state.edges {
        let drawn = if options.omit_access_nodes {
            !state.fragment_edges.contains(&edge.id)
        } else {
            !edge.shortcut
        };
        if !drawn {
            continue;
        }
        if test(Shape::Line(&edge.points)) {
            hits.push((
                ElementId::memlet(state.cfg_id, state.state_id, edge.id),
                ElementRef::Memlet(edge),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::{FixedWidth, LayoutCx, layout_sdfg};
    use crate::sdfg::{Sdfg, fixtures};

    fn layout_with(sdfg: &Sdfg, options: &LayoutOptions) -> CfgLayout {
        let config = LayoutConfig::default();
        let measure = FixedWidth(6.0);
        layout_sdfg(sdfg, &LayoutCx::new(&config, options, Some(&measure))).unwrap()
    }

    fn everything() -> Rect {
        Rect::new(-1.0e6, -1.0e6, 2.0e6, 2.0e6)
    }

    #[test]
    fn a_large_box_hits_every_element() {
        let options = LayoutOptions::default();
        let layout = layout_with(&fixtures::map_state(), &options);
        let hits = elements_in_rect(&layout, &everything(), &options);
        let count = |kind: &str| hits.iter().filter(|(_, e)| e.kind_name() == kind).count();
        assert_eq!(count("block"), 1);
        assert_eq!(count("node"), 5);
        assert_eq!(count("connector"), 6);
        assert_eq!(count("memlet"), 4);
    }

    #[test]
    fn point_query_finds_node_and_its_state() {
        let options = LayoutOptions::default();
        let layout = layout_with(&fixtures::map_state(), &options);
        let state = layout.block(0).and_then(|b| b.state()).unwrap();
        let tasklet = state.node(2).unwrap();
        let ids: Vec<ElementId> = elements_at_point(&layout, tasklet.center(), &options)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert!(ids.contains(&ElementId::node(0, 0, 2)));
        assert!(ids.contains(&ElementId::block(0, 0)));
        assert!(!ids.contains(&ElementId::node(0, 0, 0)));
    }

    #[test]
    fn containment_excludes_enclosing_block() {
        let options = LayoutOptions::default();
        let layout = layout_with(&fixtures::map_state(), &options);
        let state = layout.block(0).and_then(|b| b.state()).unwrap();
        let area = state.node(2).unwrap().bounds().expand(20.0);
        let ids: Vec<ElementId> = elements_contained_in(&layout, &area, &options)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert!(ids.contains(&ElementId::node(0, 0, 2)));
        assert!(!ids.contains(&ElementId::block(0, 0)));
    }

    #[test]
    fn hidden_access_nodes_leave_only_shortcuts() {
        let options = LayoutOptions {
            omit_access_nodes: true,
            ..LayoutOptions::default()
        };
        let layout = layout_with(&fixtures::access_chain(), &options);
        let hits = elements_in_rect(&layout, &everything(), &options);
        let memlets: Vec<ElementId> = hits
            .iter()
            .filter(|(_, e)| e.kind_name() == "memlet")
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(memlets, vec![ElementId::memlet(0, 0, 3)]);
        let nodes = hits.iter().filter(|(_, e)| e.kind_name() == "node").count();
        assert_eq!(nodes, 2);
    }

    #[test]
    fn nested_graphs_are_searched() {
        let options = LayoutOptions::default();
        let layout = layout_with(&fixtures::nested_two_levels(), &options);
        let hits = elements_in_rect(&layout, &everything(), &options);
        assert!(hits.iter().any(|(id, _)| *id == ElementId::node(2, 0, 1)));
        assert!(hits.iter().any(|(id, _)| *id == ElementId::interstate_edge(0, 0)));
    }
}
