//! Manual element moves that survive relayout.
//!
//! Offsets are stored per [`ElementId`] and re-applied on top of every fresh
//! layout. A node moves by its own offset plus the offsets of all enclosing
//! scope entries; edge endpoints follow their nodes while interior points move
//! with the scope the edge lies in and by their own per-point offsets.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::element::ElementId;
use crate::geometry::Point;
use crate::layout::{
    BlockContents, CfgLayout, InterstateEdgeLayout, NodeLayout, StateLayout, Translate,
};
use crate::sdfg::TOP_LEVEL_SCOPE;
use crate::traverse::{ScopeVisitor, traverse_scopes};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub dx: f32,
    #[serde(default)]
    pub dy: f32,
    /// Offsets of individual polyline points, by point index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
}

impl Offset {
    fn delta(&self) -> Point {
        Point::new(self.dx, self.dy)
    }

    fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.points.iter().all(|p| p.x == 0.0 && p.y == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionOverrides {
    offsets: BTreeMap<ElementId, Offset>,
}

impl PositionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn get(&self, id: &ElementId) -> Option<&Offset> {
        self.offsets.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &Offset)> {
        self.offsets.iter()
    }

    /// Adds a whole-element move.
    pub fn record_move(&mut self, id: ElementId, dx: f32, dy: f32) {
        let offset = self.offsets.entry(id).or_default();
        offset.dx += dx;
        offset.dy += dy;
        self.prune(id);
    }

    /// Adds a move of one polyline point of an edge.
    pub fn record_point_move(&mut self, id: ElementId, index: usize, dx: f32, dy: f32) {
        let offset = self.offsets.entry(id).or_default();
        if offset.points.len() <= index {
            offset.points.resize(index + 1, Point::default());
        }
        offset.points[index] = offset.points[index].offset(dx, dy);
        self.prune(id);
    }

    pub fn clear(&mut self, id: &ElementId) -> Option<Offset> {
        self.offsets.remove(id)
    }

    fn prune(&mut self, id: ElementId) {
        if self.offsets.get(&id).is_some_and(Offset::is_zero) {
            self.offsets.remove(&id);
        }
    }

    fn delta(&self, id: &ElementId) -> Point {
        self.offsets.get(id).map(Offset::delta).unwrap_or_default()
    }

    fn point_delta(&self, id: &ElementId, index: usize) -> Point {
        self.offsets
            .get(id)
            .and_then(|offset| offset.points.get(index))
            .copied()
            .unwrap_or_default()
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        match serde_json::from_str(text) {
            Ok(parsed) => Ok(parsed),
            Err(err) => json5::from_str(text)
                .with_context(|| format!("invalid position overrides: {err}")),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Sums the offsets of enclosing scope entries while walking down the scopes.
struct ScopeOffsets<'o> {
    overrides: &'o PositionOverrides,
    stack: Vec<(ElementId, Point)>,
    totals: BTreeMap<ElementId, Point>,
}

impl<'a> ScopeVisitor<'a> for ScopeOffsets<'_> {
    fn visit_node(&mut self, node: &'a NodeLayout, state: &'a StateLayout) -> bool {
        let id = ElementId::node(state.cfg_id, state.state_id, node.id);
        let own = self.overrides.delta(&id);
        let mut total = own;
        for (frame, delta) in &self.stack {
            if frame.cfg_id == id.cfg_id && frame.state_id == id.state_id {
                total = total.offset(delta.x, delta.y);
            }
        }
        if total != Point::default() {
            self.totals.insert(id, total);
        }
        if node.kind.is_entry() {
            self.stack.push((id, own));
        }
        true
    }

    fn leave_node(&mut self, node: &'a NodeLayout, state: &'a StateLayout) {
        let id = ElementId::node(state.cfg_id, state.state_id, node.id);
        if self.stack.last().is_some_and(|(frame, _)| *frame == id) {
            self.stack.pop();
        }
    }
}

/// Applies stored moves to a freshly computed layout.
pub fn apply_position_overrides(layout: &mut CfgLayout, overrides: &PositionOverrides) {
    if overrides.is_empty() {
        return;
    }
    let mut collector = ScopeOffsets {
        overrides,
        stack: Vec::new(),
        totals: BTreeMap::new(),
    };
    traverse_scopes(layout, &mut collector);
    let totals = collector.totals;
    apply_cfg(layout, overrides, &totals);
}

fn apply_cfg(cfg: &mut CfgLayout, overrides: &PositionOverrides, totals: &BTreeMap<ElementId, Point>) {
    let mut block_moves: BTreeMap<usize, Point> = BTreeMap::new();
    for block in cfg.blocks.values_mut() {
        let delta = overrides.delta(&ElementId::block(block.cfg_id, block.id));
        if delta != Point::default() {
            block.translate(delta.x, delta.y);
            block_moves.insert(block.id, delta);
        }
        match &mut block.contents {
            Some(BlockContents::State(state)) => apply_state(state, overrides, totals),
            Some(BlockContents::Region(region)) => apply_cfg(region, overrides, totals),
            Some(BlockContents::Conditional(branches)) => {
                for branch in branches {
                    apply_cfg(&mut branch.region, overrides, totals);
                }
            }
            None => {}
        }
    }
    let cfg_id = cfg.cfg_id;
    for edge in &mut cfg.edges {
        let id = ElementId::interstate_edge(cfg_id, edge.id);
        let src = block_moves.get(&edge.src).copied().unwrap_or_default();
        let dst = block_moves.get(&edge.dst).copied().unwrap_or_default();
        move_interstate_edge(edge, src, dst, |index| overrides.point_delta(&id, index));
    }
}

fn move_interstate_edge(
    edge: &mut InterstateEdgeLayout,
    src: Point,
    dst: Point,
    point_delta: impl Fn(usize) -> Point,
) {
    let count = edge.points.len();
    if count == 0 {
        return;
    }
    let common = if src == dst { src } else { Point::default() };
    for (index, point) in edge.points.iter_mut().enumerate() {
        let delta = if index == 0 {
            src
        } else if index == count - 1 {
            dst
        } else {
            let own = point_delta(index);
            common.offset(own.x, own.y)
        };
        *point = point.offset(delta.x, delta.y);
    }
    edge.update_bounds();
}

/// Scope entries whose scope contains `node`, the node itself included when
/// it is an entry.
fn scope_chain(state: &StateLayout, parents: &BTreeMap<usize, usize>, node: usize) -> BTreeSet<usize> {
    let mut chain = BTreeSet::new();
    if state.nodes.get(&node).is_some_and(|n| n.kind.is_entry()) {
        chain.insert(node);
    }
    let mut cursor = parents.get(&node).copied();
    while let Some(entry) = cursor {
        if !chain.insert(entry) {
            break;
        }
        cursor = parents.get(&entry).copied();
    }
    chain
}

fn apply_state(state: &mut StateLayout, overrides: &PositionOverrides, totals: &BTreeMap<ElementId, Point>) {
    let (cfg_id, state_id) = (state.cfg_id, state.state_id);
    let node_total = |node: usize| {
        totals
            .get(&ElementId::node(cfg_id, state_id, node))
            .copied()
            .unwrap_or_default()
    };

    let parents: BTreeMap<usize, usize> = state
        .scope_dict
        .iter()
        .filter(|(scope, _)| **scope != TOP_LEVEL_SCOPE)
        .flat_map(|(scope, ids)| ids.iter().map(move |id| (*id, *scope as usize)))
        .collect();

    let mut edge_moves = Vec::with_capacity(state.edges.len());
    for edge in &state.edges {
        let src_chain = scope_chain(state, &parents, edge.src);
        let dst_chain = scope_chain(state, &parents, edge.dst);
        let common = src_chain
            .intersection(&dst_chain)
            .map(|entry| overrides.delta(&ElementId::node(cfg_id, state_id, *entry)))
            .fold(Point::default(), |acc, delta| acc.offset(delta.x, delta.y));
        edge_moves.push((node_total(edge.src), node_total(edge.dst), common));
    }

    for node in state.nodes.values_mut() {
        let delta = node_total(node.id);
        if delta != Point::default() {
            node.translate(delta.x, delta.y);
        }
        if let Some(nested) = node.nested.as_deref_mut() {
            apply_cfg(nested, overrides, totals);
        }
    }

    for (edge, (src, dst, common)) in state.edges.iter_mut().zip(edge_moves) {
        let id = ElementId::memlet(cfg_id, state_id, edge.id);
        let count = edge.points.len();
        if count == 0 {
            continue;
        }
        for (index, point) in edge.points.iter_mut().enumerate() {
            let delta = if index == 0 {
                src
            } else if index == count - 1 {
                dst
            } else {
                let own = overrides.point_delta(&id, index);
                common.offset(own.x, own.y)
            };
            *point = point.offset(delta.x, delta.y);
        }
        edge.update_bounds();
    }
}
