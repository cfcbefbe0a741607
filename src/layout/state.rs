//! Dataflow layout of a single state.
//!
//! Nodes are collected top-down by scope and hidden access nodes are bridged
//! by shortcut edges. After placement, connectors are placed on their node's
//! rim, in-connectors are reordered against their upstream geometry, and every
//! edge is snapped onto its connectors.

use std::collections::{BTreeMap, BTreeSet};

use super::LayoutCx;
use super::layered::LayeredGraph;
use super::region::layout_sdfg;
use super::size::{NodeSizeInput, calculate_node_size};
use super::translate::Translate;
use super::types::{ConnectorLayout, MemletLayout, NodeLayout, StateLayout, extent_from_origin};
use crate::error::LayoutError;
use crate::geometry::{Point, intersect_ellipse, intersect_rect_boundary};
use crate::sdfg::{Memlet, NodeKind, Sdfg, State, StateIndex};

#[derive(Debug, Default)]
struct HiddenNode {
    /// Edges entering the node from a drawn source.
    sources: Vec<usize>,
    /// Edges leaving the node towards a drawn destination.
    destinations: Vec<usize>,
    /// Hidden node feeding this one directly.
    upstream: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Drawn(usize),
    Hidden(usize),
    /// Inside a collapsed scope with no drawn stand-in.
    Elided,
}

struct Collector<'a, 'cx> {
    cfg_id: usize,
    state: &'a State,
    sdfg: &'a Sdfg,
    index: &'a StateIndex,
    cx: &'a LayoutCx<'cx>,
    visited: BTreeSet<usize>,
    drawn: Vec<NodeLayout>,
    drawn_ids: BTreeSet<usize>,
    hidden: BTreeSet<usize>,
}

impl Collector<'_, '_> {
    fn visit_scope(&mut self, ids: &[usize]) -> Result<(), LayoutError> {
        let index = self.index;
        for &id in ids {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(node) = index.node(self.state, id) else {
                continue;
            };
            if self.cx.options.omit_access_nodes && node.kind.is_access() {
                self.hidden.insert(id);
                continue;
            }
            let collapsed = node.is_collapsed();
            self.drawn.push(self.node_layout(id)?);
            self.drawn_ids.insert(id);
            if !collapsed {
                self.visit_scope(index.children(id as i64))?;
            }
        }
        Ok(())
    }

    fn node_layout(&self, id: usize) -> Result<NodeLayout, LayoutError> {
        let config = self.cx.config;
        let Some(node) = self.index.node(self.state, id) else {
            return Err(LayoutError::UnknownNode {
                cfg_id: self.cfg_id,
                state: self.state.id,
                edge: 0,
                node: id,
            });
        };
        let collapsed = node.is_collapsed();
        let in_names = node.in_connector_names();
        let out_names = if collapsed && node.kind.is_entry() {
            // A collapsed scope shows its exit's fan-out on the entry.
            self.index
                .find_exit_for_entry(id)
                .and_then(|exit| self.index.node(self.state, exit))
                .map(|exit| exit.out_connector_names())
                .unwrap_or_else(|| node.out_connector_names())
        } else {
            node.out_connector_names()
        };

        let nested = match (&node.kind, &node.attributes.sdfg) {
            (NodeKind::NestedSdfg, Some(sub)) if !collapsed => {
                Some(Box::new(layout_sdfg(sub, self.cx)?))
            }
            _ => None,
        };
        let size = calculate_node_size(
            &NodeSizeInput {
                kind: &node.kind,
                label: &node.label,
                in_connectors: in_names.len(),
                out_connectors: out_names.len(),
                collapsed,
                nested_extent: nested.as_ref().map(|graph| (graph.width, graph.height)),
            },
            config.line_height,
            self.cx.measure,
        );

        let data = node.attributes.data.clone();
        let is_view = data.as_deref().is_some_and(|name| self.sdfg.is_view(name));
        let empty_row = |names: Vec<String>| {
            names
                .into_iter()
                .map(|name| ConnectorLayout {
                    name,
                    x: 0.0,
                    y: 0.0,
                    width: config.connector_size,
                    height: config.connector_size,
                })
                .collect::<Vec<_>>()
        };
        Ok(NodeLayout {
            id,
            kind: node.kind.clone(),
            label: node.label.clone(),
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
            in_connectors: empty_row(in_names),
            out_connectors: empty_row(out_names),
            scope_entry: node.scope_entry,
            scope_exit: node.scope_exit,
            collapsed,
            data,
            is_view,
            summarize_in_edges: false,
            summarize_out_edges: false,
            nested,
        })
    }

    /// Nodes no scope list reaches are drawn at top level unless a collapsed
    /// scope swallows them.
    fn visit_orphans(&mut self) -> Result<(), LayoutError> {
        let orphans: Vec<usize> = self
            .state
            .nodes
            .iter()
            .map(|node| node.id)
            .filter(|id| !self.visited.contains(id))
            .filter(|id| {
                !self
                    .index
                    .scope_ancestors(*id)
                    .iter()
                    .any(|entry| self.is_collapsed_drawn(*entry))
            })
            .collect();
        if !orphans.is_empty() {
            log::debug!(
                "state {}: {} node(s) missing from the scope dictionary",
                self.state.id,
                orphans.len()
            );
        }
        self.visit_scope(&orphans)
    }

    fn is_collapsed_drawn(&self, id: usize) -> bool {
        self.drawn_ids.contains(&id)
            && self
                .index
                .node(self.state, id)
                .is_some_and(|node| node.is_collapsed())
    }

    fn resolve(&self, edge: usize, id: usize) -> Result<Endpoint, LayoutError> {
        if self.drawn_ids.contains(&id) {
            return Ok(Endpoint::Drawn(id));
        }
        if self.hidden.contains(&id) {
            return Ok(Endpoint::Hidden(id));
        }
        if !self.index.contains(id) {
            return Err(LayoutError::UnknownNode {
                cfg_id: self.cfg_id,
                state: self.state.id,
                edge,
                node: id,
            });
        }
        let stand_in = self
            .index
            .scope_ancestors(id)
            .into_iter()
            .rev()
            .find(|entry| self.is_collapsed_drawn(*entry));
        Ok(stand_in.map_or(Endpoint::Elided, Endpoint::Drawn))
    }
}

/// Lays out one state's dataflow graph in a frame whose top-left is the origin.
pub fn layout_state(
    state: &State,
    sdfg: &Sdfg,
    cfg_id: usize,
    cx: &LayoutCx<'_>,
) -> Result<StateLayout, LayoutError> {
    let index = StateIndex::build(state);
    let mut collector = Collector {
        cfg_id,
        state,
        sdfg,
        index: &index,
        cx,
        visited: BTreeSet::new(),
        drawn: Vec::new(),
        drawn_ids: BTreeSet::new(),
        hidden: BTreeSet::new(),
    };
    collector.visit_scope(index.top_level())?;
    collector.visit_orphans()?;

    let mut layout = StateLayout {
        cfg_id,
        state_id: state.id,
        scope_dict: index.scope_dict().clone(),
        ..StateLayout::default()
    };

    let omit = cx.options.omit_access_nodes;
    let mut pending: BTreeMap<usize, HiddenNode> = BTreeMap::new();
    let mut shortcut_keys: BTreeSet<(usize, Option<String>)> = state
        .edges
        .iter()
        .filter(|edge| edge.is_shortcut())
        .map(|edge| (edge.dst, edge.dst_connector.clone()))
        .collect();
    let mut candidates: Vec<(usize, Memlet)> = Vec::new();

    for (id, edge) in state.edges.iter().enumerate() {
        let src = collector.resolve(id, edge.src)?;
        let dst = collector.resolve(id, edge.dst)?;
        if edge.is_shortcut() {
            if omit {
                candidates.push((id, edge.clone()));
            }
            continue;
        }
        match (src, dst) {
            (Endpoint::Hidden(from), Endpoint::Hidden(to)) => {
                layout.fragment_edges.insert(id);
                pending.entry(to).or_default().upstream = Some(from);
                pending.entry(from).or_default();
            }
            (Endpoint::Hidden(from), _) => {
                layout.fragment_edges.insert(id);
                pending.entry(from).or_default().destinations.push(id);
            }
            (_, Endpoint::Hidden(to)) => {
                layout.fragment_edges.insert(id);
                pending.entry(to).or_default().sources.push(id);
            }
            _ => candidates.push((id, edge.clone())),
        }
    }

    for (hidden, entry) in &pending {
        if entry.destinations.is_empty() {
            continue;
        }
        let Some(source) = upstream_source(&pending, *hidden) else {
            log::warn!(
                "state {}: hidden access node {} has no upstream source; {} edge(s) not bridged",
                state.id,
                hidden,
                entry.destinations.len()
            );
            continue;
        };
        let Some(source) = state.edges.get(source) else {
            continue;
        };
        for dst_edge in &entry.destinations {
            let Some(template) = state.edges.get(*dst_edge) else {
                continue;
            };
            let key = (template.dst, template.dst_connector.clone());
            if !shortcut_keys.insert(key) {
                continue;
            }
            let mut shortcut = template.clone();
            shortcut.src = source.src;
            shortcut.src_connector = source.src_connector.clone();
            shortcut.attributes.layout = None;
            shortcut.attributes.data.attributes.shortcut = Some(true);
            let id = state.edges.len() + layout.synthesized.len();
            layout.synthesized.push(shortcut.clone());
            candidates.push((id, shortcut));
        }
    }

    // Redirect endpoints onto drawn stand-ins and drop edges that vanish.
    let mut drawn_edges: Vec<(usize, Memlet)> = Vec::new();
    for (id, mut edge) in candidates {
        let src = collector.resolve(id, edge.src)?;
        let dst = collector.resolve(id, edge.dst)?;
        let (Endpoint::Drawn(src), Endpoint::Drawn(dst)) = (src, dst) else {
            continue;
        };
        let redirected = src != edge.src || dst != edge.dst;
        if redirected && src == dst {
            continue;
        }
        edge.src = src;
        edge.dst = dst;
        drawn_edges.push((id, edge));
    }

    let mut graph = LayeredGraph::new(cx.state_spacing());
    for node in &collector.drawn {
        graph.set_node(node.id, node.width, node.height);
    }
    let route_index: Vec<Option<usize>> = drawn_edges
        .iter()
        .map(|(_, edge)| graph.set_edge(edge.src, edge.dst))
        .collect();
    let placement = graph.layout();

    let config = cx.config;
    for mut node in std::mem::take(&mut collector.drawn) {
        let center = placement
            .centers
            .get(&node.id)
            .copied()
            .unwrap_or_default();
        node.x = center.x;
        node.y = center.y;
        let top = node.y - node.height / 2.0;
        let bottom = node.y + node.height / 2.0;
        place_connector_row(&mut node.in_connectors, node.x, top, config.connector_size, config.connector_spacing);
        place_connector_row(&mut node.out_connectors, node.x, bottom, config.connector_size, config.connector_spacing);
        if let Some(nested) = node.nested.as_deref_mut() {
            let left = node.x - node.width / 2.0;
            nested.translate(left + config.nested_margin, top + config.nested_margin);
        }
        layout.nodes.insert(node.id, node);
    }

    reorder_in_connectors(&mut layout.nodes, &drawn_edges);

    if cx.options.summarize_edges {
        for node in layout.nodes.values_mut() {
            node.summarize_in_edges = node.in_connectors.len() > config.summarize_threshold;
            node.summarize_out_edges = node.out_connectors.len() > config.summarize_threshold;
        }
    }

    for ((id, edge), route) in drawn_edges.iter().zip(route_index) {
        let (Some(src), Some(dst)) = (layout.nodes.get(&edge.src), layout.nodes.get(&edge.dst)) else {
            continue;
        };
        let mut points = route
            .and_then(|idx| placement.routes.get(idx))
            .cloned()
            .unwrap_or_default();
        snap_endpoints(
            &mut points,
            src,
            edge.src_connector.as_deref(),
            dst,
            edge.dst_connector.as_deref(),
        );
        let summarized = src.summarize_out_edges || dst.summarize_in_edges;
        let mut memlet = MemletLayout {
            id: *id,
            src: edge.src,
            dst: edge.dst,
            src_connector: edge.src_connector.clone(),
            dst_connector: edge.dst_connector.clone(),
            data: edge.data_name().map(str::to_string),
            points,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            shortcut: edge.is_shortcut(),
            summarized,
        };
        memlet.update_bounds();
        layout.edges.push(memlet);
    }
    layout.hidden_nodes = collector.hidden;

    // Connector rims poke out of the placement frame; pull them back in.
    if let Some(bounds) = layout.calculate_bounding_box() {
        let dx = (-bounds.x).max(0.0);
        let dy = (-bounds.y).max(0.0);
        if dx > 0.0 || dy > 0.0 {
            layout.translate(dx, dy);
            layout.x = 0.0;
            layout.y = 0.0;
        }
    }
    let (width, height) = extent_from_origin(layout.calculate_bounding_box());
    layout.width = width;
    layout.height = height;
    log::trace!(
        "state {} of graph {}: {}x{} with {} node(s), {} edge(s)",
        state.id,
        cfg_id,
        width,
        height,
        layout.nodes.len(),
        layout.edges.len()
    );
    Ok(layout)
}

/// First real upstream edge of a hidden node, following hidden-to-hidden links.
fn upstream_source(pending: &BTreeMap<usize, HiddenNode>, hidden: usize) -> Option<usize> {
    let mut cursor = hidden;
    let mut seen = BTreeSet::new();
    while seen.insert(cursor) {
        let entry = pending.get(&cursor)?;
        if let Some(edge) = entry.sources.first() {
            return Some(*edge);
        }
        cursor = entry.upstream?;
    }
    None
}

fn place_connector_row(row: &mut [ConnectorLayout], center_x: f32, y: f32, size: f32, spacing: f32) {
    if row.is_empty() {
        return;
    }
    let total = (size + spacing) * row.len() as f32 - spacing;
    let mut x = center_x - total / 2.0 + size / 2.0;
    for connector in row {
        connector.x = x;
        connector.y = y;
        x += size + spacing;
    }
}

/// Sorts each node's in connectors by the x position of what feeds them.
fn reorder_in_connectors(nodes: &mut BTreeMap<usize, NodeLayout>, edges: &[(usize, Memlet)]) {
    let mut orders: Vec<(usize, Vec<String>)> = Vec::new();
    for node in nodes.values() {
        if node.in_connectors.len() < 2 {
            continue;
        }
        let mut keyed: Vec<(f32, String)> = node
            .in_connectors
            .iter()
            .map(|connector| {
                let upstream = edges
                    .iter()
                    .map(|(_, edge)| edge)
                    .find(|edge| {
                        edge.dst == node.id
                            && edge.dst_connector.as_deref() == Some(connector.name.as_str())
                    })
                    .and_then(|edge| {
                        let source = nodes.get(&edge.src)?;
                        if source.out_connectors.is_empty() {
                            return Some(source.x);
                        }
                        Some(
                            edge.src_connector
                                .as_deref()
                                .and_then(|name| source.out_connector(name))
                                .map_or(source.x, |c| c.x),
                        )
                    });
                (upstream.unwrap_or(connector.x), connector.name.clone())
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        orders.push((node.id, keyed.into_iter().map(|(_, name)| name).collect()));
    }
    for (id, names) in orders {
        if let Some(node) = nodes.get_mut(&id) {
            for (connector, name) in node.in_connectors.iter_mut().zip(names) {
                connector.name = name;
            }
        }
    }
}

fn rim_of_node(node: &NodeLayout, toward: Point) -> Point {
    match node.kind {
        NodeKind::AccessNode => {
            intersect_ellipse(node.center(), node.width / 2.0, node.height / 2.0, toward)
        }
        _ => intersect_rect_boundary(&node.bounds(), toward),
    }
}

fn rim_of_connector(connector: &ConnectorLayout, toward: Point) -> Point {
    intersect_ellipse(
        connector.center(),
        connector.width / 2.0,
        connector.height / 2.0,
        toward,
    )
}

fn snap_endpoints(
    points: &mut Vec<Point>,
    src: &NodeLayout,
    src_connector: Option<&str>,
    dst: &NodeLayout,
    dst_connector: Option<&str>,
) {
    if points.len() < 2 {
        *points = vec![
            Point::new(src.x, src.y + src.height / 2.0),
            Point::new(dst.x, dst.y - dst.height / 2.0),
        ];
    }
    let src_anchor = src_connector.and_then(|name| src.out_connector(name));
    let dst_anchor = dst_connector.and_then(|name| dst.in_connector(name));
    if let Some(first) = points.first_mut()
        && let Some(connector) = src_anchor
    {
        *first = connector.center();
    }
    if let Some(last) = points.last_mut()
        && let Some(connector) = dst_anchor
    {
        *last = connector.center();
    }

    let last_idx = points.len() - 1;
    let after_start = points[1];
    let before_end = points[last_idx - 1];
    points[0] = match src_anchor {
        Some(connector) => rim_of_connector(connector, after_start),
        None => rim_of_node(src, after_start),
    };
    points[last_idx] = match dst_anchor {
        Some(connector) => rim_of_connector(connector, before_end),
        None => rim_of_node(dst, before_end),
    };

    if points.len() == 3 && (points[0].x - points[2].x).abs() < 1e-3 {
        points.remove(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutConfig, LayoutOptions};
    use crate::layout::text::FixedWidth;
    use crate::sdfg::{Block, fixtures};

    fn first_state(sdfg: &Sdfg) -> &State {
        match &sdfg.nodes[0] {
            Block::State(state) => state,
            other => panic!("expected a state, got {other:?}"),
        }
    }

    fn run(sdfg: &Sdfg, options: LayoutOptions) -> StateLayout {
        let config = LayoutConfig::default();
        let measure = FixedWidth(6.0);
        let cx = LayoutCx::new(&config, &options, Some(&measure));
        layout_state(first_state(sdfg), sdfg, sdfg.cfg_list_id, &cx).unwrap()
    }

    #[test]
    fn map_scope_is_laid_out_top_down() {
        let sdfg = fixtures::map_state();
        let layout = run(&sdfg, LayoutOptions::default());
        assert_eq!(layout.nodes.len(), 5);
        assert_eq!(layout.edges.len(), 4);
        let y = |id: usize| layout.nodes[&id].y;
        assert!(y(0) < y(1) && y(1) < y(2) && y(2) < y(3) && y(3) < y(4));
        let bounds = layout.calculate_bounding_box().unwrap();
        assert!(bounds.x >= -1e-3 && bounds.y >= -1e-3);
        assert!(bounds.right() <= layout.width + 1e-3);
    }

    #[test]
    fn connectors_sit_on_node_edges() {
        let sdfg = fixtures::map_state();
        let layout = run(&sdfg, LayoutOptions::default());
        let entry = &layout.nodes[&1];
        let top = entry.y - entry.height / 2.0;
        let bottom = entry.y + entry.height / 2.0;
        assert!((entry.in_connectors[0].y - top).abs() < 1e-3);
        assert!((entry.out_connectors[0].y - bottom).abs() < 1e-3);
        assert!((entry.in_connectors[0].x - entry.x).abs() < 1e-3);
    }

    #[test]
    fn edges_end_on_connector_rims() {
        let sdfg = fixtures::map_state();
        let layout = run(&sdfg, LayoutOptions::default());
        let edge = layout.edge(1).unwrap();
        let out = layout.nodes[&1].out_connector("OUT_A").unwrap();
        let first = edge.points[0];
        assert!((first.distance(out.center()) - out.width / 2.0).abs() < 1e-2);
        let input = layout.nodes[&2].in_connector("a").unwrap();
        let last = *edge.points.last().unwrap();
        assert!((last.distance(input.center()) - input.width / 2.0).abs() < 1e-2);
    }

    #[test]
    fn collapsed_entry_borrows_exit_connectors() {
        let mut sdfg = fixtures::map_state();
        if let Block::State(state) = &mut sdfg.nodes[0] {
            state.node_mut(1).unwrap().attributes.is_collapsed = true;
        }
        let layout = run(&sdfg, LayoutOptions::default());
        let ids: Vec<usize> = layout.nodes.keys().copied().collect();
        assert_eq!(ids, vec![0, 1, 4]);
        let names: Vec<&str> = layout.nodes[&1]
            .out_connectors
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["OUT_B"]);
        // The exit's outgoing edge now leaves from the entry.
        let edge = layout.edge(3).unwrap();
        assert_eq!((edge.src, edge.dst), (1, 4));
        assert_eq!(layout.edges.len(), 2);
    }

    #[test]
    fn hidden_access_chain_becomes_one_shortcut() {
        let sdfg = fixtures::access_chain();
        let options = LayoutOptions {
            omit_access_nodes: true,
            ..LayoutOptions::default()
        };
        let layout = run(&sdfg, options);
        assert_eq!(layout.hidden_nodes, BTreeSet::from([1, 2]));
        assert_eq!(layout.fragment_edges, BTreeSet::from([0, 1, 2]));
        assert_eq!(layout.synthesized.len(), 1);
        let shortcut = &layout.synthesized[0];
        assert_eq!((shortcut.src, shortcut.dst), (0, 3));
        assert_eq!(shortcut.src_connector.as_deref(), Some("o"));
        assert_eq!(shortcut.dst_connector.as_deref(), Some("i"));
        assert!(shortcut.is_shortcut());
        assert_eq!(layout.edges.len(), 1);
        assert_eq!(layout.edges[0].id, 3);
    }

    #[test]
    fn existing_shortcuts_are_not_duplicated() {
        let mut sdfg = fixtures::access_chain();
        let options = LayoutOptions {
            omit_access_nodes: true,
            ..LayoutOptions::default()
        };
        let first = run(&sdfg, options);
        if let Block::State(state) = &mut sdfg.nodes[0] {
            state.edges.extend(first.synthesized.clone());
        }
        let second = run(&sdfg, options);
        assert!(second.synthesized.is_empty());
        assert_eq!(second.edges.len(), 1);
        assert_eq!(second.edges[0].id, 3);
    }

    #[test]
    fn shortcuts_are_not_drawn_with_access_nodes_visible() {
        let mut sdfg = fixtures::access_chain();
        let hidden = LayoutOptions {
            omit_access_nodes: true,
            ..LayoutOptions::default()
        };
        let synthesized = run(&sdfg, hidden).synthesized;
        if let Block::State(state) = &mut sdfg.nodes[0] {
            state.edges.extend(synthesized);
        }
        let layout = run(&sdfg, LayoutOptions::default());
        assert_eq!(layout.nodes.len(), 4);
        assert!(layout.edges.iter().all(|edge| !edge.shortcut));
        assert_eq!(layout.edges.len(), 3);
    }

    #[test]
    fn expanded_nested_graph_sits_inside_its_node() {
        let sdfg = fixtures::nested_two_levels();
        let layout = run(&sdfg, LayoutOptions::default());
        let node = &layout.nodes[&0];
        let nested = node.nested.as_ref().unwrap();
        let inner = nested.calculate_bounding_box().unwrap();
        assert!(node.bounds().expand(1e-2).contains_rect(&inner));
    }

    #[test]
    fn empty_state_is_a_zero_size_layout() {
        let sdfg = fixtures::nested_two_levels();
        let state = match &sdfg.nodes[1] {
            Block::State(state) => state,
            _ => unreachable!(),
        };
        let config = LayoutConfig::default();
        let options = LayoutOptions::default();
        let cx = LayoutCx::new(&config, &options, None);
        let layout = layout_state(state, &sdfg, 0, &cx).unwrap();
        assert!(layout.nodes.is_empty());
        assert_eq!((layout.width, layout.height), (0.0, 0.0));
    }
}
