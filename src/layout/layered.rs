//! Layered (Sugiyama-style) placement of one graph level.
//!
//! Node centers come from `dagre_rust`, or from a longest-path ranker once a
//! graph reaches the large-graph threshold. Edges are routed here: forward
//! edges drop straight through a midpoint, back edges and self loops take a
//! lane on the right-hand side of the nodes they pass.

use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use std::collections::{BTreeMap, BTreeSet};

use super::ranking::{compute_ranks, order_rank_nodes};
use crate::error::LayoutError;
use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayeredSpacing {
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub large_graph_threshold: usize,
    pub order_passes: usize,
}

impl Default for LayeredSpacing {
    fn default() -> Self {
        Self {
            node_spacing: 50.0,
            rank_spacing: 50.0,
            large_graph_threshold: 1000,
            order_passes: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LayeredNode {
    id: usize,
    width: f32,
    height: f32,
}

/// Result of a placement: node centers and one polyline per edge, in a frame
/// whose top-left corner is the origin.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Placement {
    pub centers: BTreeMap<usize, Point>,
    pub routes: Vec<Vec<Point>>,
    pub width: f32,
    pub height: f32,
}

/// A directed multigraph of sized nodes.
#[derive(Debug, Clone, Default)]
pub struct LayeredGraph {
    spacing: LayeredSpacing,
    nodes: Vec<LayeredNode>,
    index: BTreeMap<usize, usize>,
    edges: Vec<(usize, usize)>,
}

impl LayeredGraph {
    pub fn new(spacing: LayeredSpacing) -> Self {
        Self {
            spacing,
            ..Self::default()
        }
    }

    pub fn set_graph(&mut self, spacing: LayeredSpacing) {
        self.spacing = spacing;
    }

    /// Adds a node or resizes an existing one.
    pub fn set_node(&mut self, id: usize, width: f32, height: f32) {
        let node = LayeredNode { id, width, height };
        match self.index.get(&id) {
            Some(idx) => self.nodes[*idx] = node,
            None => {
                self.index.insert(id, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Adds an edge and returns its index; both endpoints must be nodes.
    pub fn set_edge(&mut self, src: usize, dst: usize) -> Option<usize> {
        if !self.has_node(src) || !self.has_node(dst) {
            return None;
        }
        self.edges.push((src, dst));
        Some(self.edges.len() - 1)
    }

    pub fn has_node(&self, id: usize) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node(&self, id: usize) -> Option<(f32, f32)> {
        self.index
            .get(&id)
            .map(|idx| (self.nodes[*idx].width, self.nodes[*idx].height))
    }

    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge(&self, idx: usize) -> Option<(usize, usize)> {
        self.edges.get(idx).copied()
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn in_edges(&self, id: usize) -> Vec<usize> {
        (0..self.edges.len())
            .filter(|idx| self.edges[*idx].1 == id)
            .collect()
    }

    pub fn out_edges(&self, id: usize) -> Vec<usize> {
        (0..self.edges.len())
            .filter(|idx| self.edges[*idx].0 == id)
            .collect()
    }

    /// Generic layered placement.
    pub fn layout(&self) -> Placement {
        if self.nodes.is_empty() {
            return Placement {
                routes: vec![Vec::new(); self.edges.len()],
                ..Placement::default()
            };
        }
        let centers = if self.nodes.len() >= self.spacing.large_graph_threshold {
            log::debug!(
                "{} nodes: using longest-path ranking instead of dagre",
                self.nodes.len()
            );
            self.place_manual()
        } else {
            self.place_dagre().unwrap_or_else(|| self.place_manual())
        };
        self.finish(centers)
    }

    /// Top-down state-machine placement: ranks follow the longest forward path
    /// from the start node and loops are closed by back edges. Fails when a
    /// back edge enters a cycle that its target does not dominate.
    pub fn layout_vertical_state_machine(
        &self,
        start: Option<usize>,
    ) -> Result<Placement, LayoutError> {
        if self.nodes.is_empty() {
            return Ok(self.layout());
        }
        let flow = FlowAnalysis::new(self, start);
        for &(src, dst) in &flow.back_edges {
            if !flow.dominates(dst, src) {
                return Err(LayoutError::IrreducibleControlFlow {
                    block: dst.to_string(),
                });
            }
        }

        let forward: Vec<(usize, usize)> = self
            .edges
            .iter()
            .copied()
            .filter(|edge| edge.0 != edge.1 && !flow.back_edges.contains(edge))
            .collect();
        let ranks = compute_ranks(&flow.preorder, &forward);
        let max_rank = ranks.values().copied().max().unwrap_or(0);
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); max_rank + 1];
        for id in &flow.preorder {
            rows[ranks.get(id).copied().unwrap_or(0)].push(*id);
        }

        let mut centers = BTreeMap::new();
        let mut cursor_y = 0.0f32;
        for row in &rows {
            let sizes: Vec<(f32, f32)> = row.iter().filter_map(|id| self.node(*id)).collect();
            let row_height = sizes.iter().map(|s| s.1).fold(0.0, f32::max);
            let row_width = sizes.iter().map(|s| s.0).sum::<f32>()
                + self.spacing.node_spacing * sizes.len().saturating_sub(1) as f32;
            let mut cursor_x = -row_width / 2.0;
            for (id, (width, _)) in row.iter().zip(&sizes) {
                centers.insert(*id, Point::new(cursor_x + width / 2.0, cursor_y + row_height / 2.0));
                cursor_x += width + self.spacing.node_spacing;
            }
            cursor_y += row_height + self.spacing.rank_spacing;
        }
        Ok(self.finish(centers))
    }

    fn place_dagre(&self) -> Option<BTreeMap<usize, Point>> {
        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(false),
            }));

        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some("tb".to_string());
        graph_config.nodesep = Some(self.spacing.node_spacing);
        graph_config.ranksep = Some(self.spacing.rank_spacing);
        graph_config.marginx = Some(0.0);
        graph_config.marginy = Some(0.0);
        dagre_graph.set_graph(graph_config);

        for (order, node) in self.nodes.iter().enumerate() {
            let mut dagre_node = DagreNode::default();
            dagre_node.width = node.width;
            dagre_node.height = node.height;
            dagre_node.order = Some(order);
            dagre_graph.set_node(node.id.to_string(), Some(dagre_node));
        }

        let mut seen: BTreeSet<(usize, usize)> = BTreeSet::new();
        for &(src, dst) in &self.edges {
            if src == dst || !seen.insert((src, dst)) {
                continue;
            }
            let from = src.to_string();
            let to = dst.to_string();
            let _ = dagre_graph.set_edge(&from, &to, Some(DagreEdge::default()), None);
        }

        dagre_layout::run_layout(&mut dagre_graph);

        let mut centers = BTreeMap::new();
        for node in &self.nodes {
            let key = node.id.to_string();
            let placed = dagre_graph.node(&key)?;
            if !placed.x.is_finite() || !placed.y.is_finite() {
                return None;
            }
            centers.insert(node.id, Point::new(placed.x, placed.y));
        }
        Some(centers)
    }

    fn place_manual(&self) -> BTreeMap<usize, Point> {
        let ids: Vec<usize> = self.nodes().collect();
        let ranks = compute_ranks(&ids, &self.edges);
        let max_rank = ranks.values().copied().max().unwrap_or(0);
        let mut rank_nodes: Vec<Vec<usize>> = vec![Vec::new(); max_rank + 1];
        for id in &ids {
            rank_nodes[ranks.get(id).copied().unwrap_or(0)].push(*id);
        }

        // Long edges get one placeholder per crossed rank so ordering sees them.
        let mut expanded: Vec<(usize, usize)> = Vec::new();
        let mut next_dummy = ids.iter().copied().max().unwrap_or(0) + 1;
        for &(src, dst) in &self.edges {
            let (Some(&from_rank), Some(&to_rank)) = (ranks.get(&src), ranks.get(&dst)) else {
                continue;
            };
            if to_rank <= from_rank {
                continue;
            }
            let mut prev = src;
            for step in 1..(to_rank - from_rank) {
                let dummy = next_dummy;
                next_dummy += 1;
                rank_nodes[from_rank + step].push(dummy);
                expanded.push((prev, dummy));
                prev = dummy;
            }
            expanded.push((prev, dst));
        }
        order_rank_nodes(&mut rank_nodes, &expanded, self.spacing.order_passes);

        let mut centers: BTreeMap<usize, Point> = BTreeMap::new();
        let mut cursor_y = 0.0f32;
        for bucket in &rank_nodes {
            let row_height = bucket
                .iter()
                .filter_map(|id| self.node(*id))
                .map(|size| size.1)
                .fold(0.0, f32::max);
            for id in bucket {
                if self.has_node(*id) {
                    centers.insert(*id, Point::new(0.0, cursor_y + row_height / 2.0));
                }
            }
            cursor_y += row_height + self.spacing.rank_spacing;
        }

        let mut incoming: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(src, dst) in &self.edges {
            if src != dst {
                incoming.entry(dst).or_default().push(src);
                outgoing.entry(src).or_default().push(dst);
            }
        }

        let mut cross: BTreeMap<usize, f32> = BTreeMap::new();
        let mut place_rank = |bucket: &[usize],
                              neighbors: &BTreeMap<usize, Vec<usize>>,
                              centers: &mut BTreeMap<usize, Point>| {
            let mut entries: Vec<(usize, f32, f32)> = Vec::new();
            for id in bucket {
                let Some((width, _)) = self.node(*id) else {
                    continue;
                };
                let placed: Vec<f32> = neighbors
                    .get(id)
                    .into_iter()
                    .flatten()
                    .filter_map(|n| cross.get(n).copied())
                    .collect();
                let desired = if placed.is_empty() {
                    0.0
                } else {
                    placed.iter().sum::<f32>() / placed.len() as f32
                };
                entries.push((*id, desired, width / 2.0));
            }
            if entries.is_empty() {
                return;
            }
            let desired_mean =
                entries.iter().map(|entry| entry.1).sum::<f32>() / entries.len() as f32;
            let mut assigned: Vec<(usize, f32)> = Vec::with_capacity(entries.len());
            let mut prev: Option<(f32, f32)> = None;
            for (id, desired, half) in entries {
                let center = match prev {
                    Some((prev_center, prev_half)) => {
                        desired.max(prev_center + prev_half + half + self.spacing.node_spacing)
                    }
                    None => desired,
                };
                assigned.push((id, center));
                prev = Some((center, half));
            }
            let actual_mean =
                assigned.iter().map(|entry| entry.1).sum::<f32>() / assigned.len() as f32;
            let delta = desired_mean - actual_mean;
            for (id, center) in assigned {
                let center = center + delta;
                if let Some(point) = centers.get_mut(&id) {
                    point.x = center;
                }
                cross.insert(id, center);
            }
        };

        for _ in 0..2 {
            for bucket in &rank_nodes {
                place_rank(bucket, &incoming, &mut centers);
            }
            for bucket in rank_nodes.iter().rev() {
                place_rank(bucket, &outgoing, &mut centers);
            }
        }
        centers
    }

    fn rect_of(&self, id: usize, centers: &BTreeMap<usize, Point>) -> Option<Rect> {
        let (width, height) = self.node(id)?;
        let center = centers.get(&id)?;
        Some(Rect::from_center(center.x, center.y, width, height))
    }

    fn route(&self, src: usize, dst: usize, centers: &BTreeMap<usize, Point>) -> Vec<Point> {
        let (Some(from), Some(to)) = (self.rect_of(src, centers), self.rect_of(dst, centers)) else {
            return Vec::new();
        };
        let start = Point::new(from.center().x, from.bottom());
        let end = Point::new(to.center().x, to.y);
        if src != dst && to.center().y > from.center().y + 1e-3 {
            let mid = Point::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0);
            return vec![start, mid, end];
        }

        let gap = self.spacing.rank_spacing / 4.0;
        let band_top = to.y - gap;
        let band_bottom = from.bottom() + gap;
        let lane = self
            .nodes
            .iter()
            .filter_map(|node| self.rect_of(node.id, centers))
            .filter(|rect| rect.bottom() >= band_top && rect.y <= band_bottom)
            .map(|rect| rect.right())
            .fold(from.right().max(to.right()), f32::max)
            + self.spacing.node_spacing / 2.0;
        vec![
            start,
            Point::new(start.x, band_bottom),
            Point::new(lane, band_bottom),
            Point::new(lane, band_top),
            Point::new(end.x, band_top),
            end,
        ]
    }

    fn finish(&self, mut centers: BTreeMap<usize, Point>) -> Placement {
        let mut routes: Vec<Vec<Point>> = self
            .edges
            .iter()
            .map(|&(src, dst)| self.route(src, dst, &centers))
            .collect();

        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        for node in &self.nodes {
            if let Some(rect) = self.rect_of(node.id, &centers) {
                min_x = min_x.min(rect.x);
                min_y = min_y.min(rect.y);
            }
        }
        for point in routes.iter().flatten() {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
        }
        if !min_x.is_finite() || !min_y.is_finite() {
            min_x = 0.0;
            min_y = 0.0;
        }
        for center in centers.values_mut() {
            *center = center.offset(-min_x, -min_y);
        }
        for point in routes.iter_mut().flatten() {
            *point = point.offset(-min_x, -min_y);
        }

        let mut width = 0.0f32;
        let mut height = 0.0f32;
        for node in &self.nodes {
            if let Some(rect) = self.rect_of(node.id, &centers) {
                width = width.max(rect.right());
                height = height.max(rect.bottom());
            }
        }
        for point in routes.iter().flatten() {
            width = width.max(point.x);
            height = height.max(point.y);
        }
        Placement {
            centers,
            routes,
            width,
            height,
        }
    }
}

/// Depth-first edge classification and dominators, rooted at the start node
/// with any unreachable nodes attached to a virtual root.
struct FlowAnalysis {
    preorder: Vec<usize>,
    back_edges: BTreeSet<(usize, usize)>,
    idom: BTreeMap<usize, usize>,
}

impl FlowAnalysis {
    const VIRTUAL_ROOT: usize = usize::MAX;

    fn new(graph: &LayeredGraph, start: Option<usize>) -> Self {
        let mut succ: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(src, dst) in &graph.edges {
            succ.entry(src).or_default().push(dst);
        }
        let ids: Vec<usize> = graph.nodes().collect();
        let start = start.filter(|id| graph.has_node(*id)).unwrap_or(ids[0]);

        let mut roots = vec![start];
        let mut preorder = Vec::new();
        let mut postorder = Vec::new();
        let mut back_edges = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut root_cursor = 0;
        loop {
            let root = roots[root_cursor];
            Self::dfs(
                root,
                &succ,
                &mut visited,
                &mut preorder,
                &mut postorder,
                &mut back_edges,
            );
            root_cursor += 1;
            if root_cursor == roots.len() {
                match ids.iter().find(|id| !visited.contains(*id)) {
                    Some(next) => roots.push(*next),
                    None => break,
                }
            }
        }

        let mut preds: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(src, dst) in &graph.edges {
            preds.entry(dst).or_default().push(src);
        }
        for root in &roots {
            preds.entry(*root).or_default().push(Self::VIRTUAL_ROOT);
        }

        let mut rpo: Vec<usize> = vec![Self::VIRTUAL_ROOT];
        rpo.extend(postorder.iter().rev().copied());
        let rpo_index: BTreeMap<usize, usize> =
            rpo.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

        let mut idom: BTreeMap<usize, usize> = BTreeMap::new();
        idom.insert(Self::VIRTUAL_ROOT, Self::VIRTUAL_ROOT);
        let mut changed = true;
        while changed {
            changed = false;
            for &node in rpo.iter().skip(1) {
                let mut candidate: Option<usize> = None;
                for &pred in preds.get(&node).into_iter().flatten() {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    candidate = Some(match candidate {
                        None => pred,
                        Some(current) => Self::intersect(pred, current, &idom, &rpo_index),
                    });
                }
                if let Some(new_idom) = candidate
                    && idom.get(&node) != Some(&new_idom)
                {
                    idom.insert(node, new_idom);
                    changed = true;
                }
            }
        }

        Self {
            preorder,
            back_edges,
            idom,
        }
    }

    fn dfs(
        root: usize,
        succ: &BTreeMap<usize, Vec<usize>>,
        visited: &mut BTreeSet<usize>,
        preorder: &mut Vec<usize>,
        postorder: &mut Vec<usize>,
        back_edges: &mut BTreeSet<(usize, usize)>,
    ) {
        if !visited.insert(root) {
            return;
        }
        let mut on_stack: BTreeSet<usize> = BTreeSet::new();
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        preorder.push(root);
        on_stack.insert(root);
        while let Some((node, next_child)) = stack.last().copied() {
            let children = succ.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if next_child < children.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let child = children[next_child];
                if on_stack.contains(&child) {
                    back_edges.insert((node, child));
                } else if visited.insert(child) {
                    preorder.push(child);
                    on_stack.insert(child);
                    stack.push((child, 0));
                }
            } else {
                stack.pop();
                on_stack.remove(&node);
                postorder.push(node);
            }
        }
    }

    fn intersect(
        mut a: usize,
        mut b: usize,
        idom: &BTreeMap<usize, usize>,
        rpo_index: &BTreeMap<usize, usize>,
    ) -> usize {
        let order = |id: usize| rpo_index.get(&id).copied().unwrap_or(0);
        while a != b {
            while order(a) > order(b) {
                a = idom.get(&a).copied().unwrap_or(Self::VIRTUAL_ROOT);
            }
            while order(b) > order(a) {
                b = idom.get(&b).copied().unwrap_or(Self::VIRTUAL_ROOT);
            }
        }
        a
    }

    fn dominates(&self, dominator: usize, node: usize) -> bool {
        let mut cursor = node;
        loop {
            if cursor == dominator {
                return true;
            }
            match self.idom.get(&cursor) {
                Some(parent) if *parent != cursor => cursor = *parent,
                _ => return false,
            }
        }
    }
}
