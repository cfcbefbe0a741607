use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::geometry::{Point, Rect, polyline_bounds};
use crate::sdfg::{Memlet, NodeKind, ScopeDict};

/// A connector anchor, center-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorLayout {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ConnectorLayout {
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }
}

/// A placed dataflow node, center-based.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLayout {
    pub id: usize,
    pub kind: NodeKind,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub in_connectors: Vec<ConnectorLayout>,
    pub out_connectors: Vec<ConnectorLayout>,
    pub scope_entry: Option<usize>,
    pub scope_exit: Option<usize>,
    pub collapsed: bool,
    pub data: Option<String>,
    pub is_view: bool,
    pub summarize_in_edges: bool,
    pub summarize_out_edges: bool,
    /// Laid-out body of an expanded nested SDFG.
    pub nested: Option<Box<CfgLayout>>,
}

impl NodeLayout {
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn in_connector(&self, name: &str) -> Option<&ConnectorLayout> {
        self.in_connectors.iter().find(|c| c.name == name)
    }

    pub fn out_connector(&self, name: &str) -> Option<&ConnectorLayout> {
        self.out_connectors.iter().find(|c| c.name == name)
    }
}

/// A routed data-dependency edge. `id` is the edge's index in the state's
/// edge list, synthesized shortcuts included.
#[derive(Debug, Clone, PartialEq)]
pub struct MemletLayout {
    pub id: usize,
    pub src: usize,
    pub dst: usize,
    pub src_connector: Option<String>,
    pub dst_connector: Option<String>,
    pub data: Option<String>,
    pub points: Vec<Point>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub shortcut: bool,
    pub summarized: bool,
}

impl MemletLayout {
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }

    /// Recomputes the center-based box from the polyline.
    pub fn update_bounds(&mut self) {
        let rect = edge_bounding_box(&self.points);
        let center = rect.center();
        self.x = center.x;
        self.y = center.y;
        self.width = rect.width;
        self.height = rect.height;
    }
}

/// The dataflow graph of one state after layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateLayout {
    pub cfg_id: usize,
    pub state_id: usize,
    /// Top-left corner of the content area.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub nodes: BTreeMap<usize, NodeLayout>,
    /// Drawn edges only.
    pub edges: Vec<MemletLayout>,
    pub scope_dict: ScopeDict,
    /// Access nodes left out of the drawing.
    pub hidden_nodes: BTreeSet<usize>,
    /// Edges that touch a hidden access node.
    pub fragment_edges: BTreeSet<usize>,
    /// Shortcut edges created by this pass, to be appended to the description.
    pub synthesized: Vec<Memlet>,
}

impl StateLayout {
    pub fn node(&self, id: usize) -> Option<&NodeLayout> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: usize) -> Option<&MemletLayout> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// Union of node, connector and edge boxes.
    pub fn calculate_bounding_box(&self) -> Option<Rect> {
        let nodes = self.nodes.values().flat_map(|node| {
            std::iter::once(node.bounds()).chain(
                node.in_connectors
                    .iter()
                    .chain(&node.out_connectors)
                    .map(ConnectorLayout::bounds),
            )
        });
        let edges = self
            .edges
            .iter()
            .filter(|edge| !edge.points.is_empty())
            .map(MemletLayout::bounds);
        nodes.chain(edges).reduce(|acc, rect| acc.union(&rect))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    State,
    Region,
    Loop,
    Conditional,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LoopHeader {
    pub condition: Option<String>,
    pub init: Option<String>,
    pub update: Option<String>,
    pub inverted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockContents {
    State(StateLayout),
    Region(CfgLayout),
    Conditional(Vec<BranchLayout>),
}

/// A placed control-flow block, center-based.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    pub id: usize,
    pub cfg_id: usize,
    pub kind: BlockKind,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub collapsed: bool,
    pub header: Option<LoopHeader>,
    /// `None` while collapsed.
    pub contents: Option<BlockContents>,
}

impl BlockLayout {
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }

    pub fn state(&self) -> Option<&StateLayout> {
        match &self.contents {
            Some(BlockContents::State(state)) => Some(state),
            _ => None,
        }
    }
}

/// One branch of a conditional block; the box spans condition band and body.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchLayout {
    pub condition: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub region: CfgLayout,
}

impl BranchLayout {
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterstateEdgeLayout {
    pub id: usize,
    pub src: usize,
    pub dst: usize,
    pub label: String,
    pub points: Vec<Point>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl InterstateEdgeLayout {
    pub fn bounds(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }

    pub fn update_bounds(&mut self) {
        let rect = edge_bounding_box(&self.points);
        let center = rect.center();
        self.x = center.x;
        self.y = center.y;
        self.width = rect.width;
        self.height = rect.height;
    }
}

/// A laid-out control-flow region.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CfgLayout {
    pub cfg_id: usize,
    /// Top-left corner of the content area.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub blocks: BTreeMap<usize, BlockLayout>,
    pub edges: Vec<InterstateEdgeLayout>,
}

impl CfgLayout {
    pub fn block(&self, id: usize) -> Option<&BlockLayout> {
        self.blocks.get(&id)
    }

    pub fn calculate_bounding_box(&self) -> Option<Rect> {
        let blocks = self.blocks.values().map(BlockLayout::bounds);
        let edges = self
            .edges
            .iter()
            .filter(|edge| !edge.points.is_empty())
            .map(InterstateEdgeLayout::bounds);
        blocks.chain(edges).reduce(|acc, rect| acc.union(&rect))
    }
}

/// Box of a polyline; an empty polyline has a zero box at the origin.
pub fn edge_bounding_box(points: &[Point]) -> Rect {
    polyline_bounds(points).unwrap_or_default()
}

/// Extent of a content area measured from its local origin.
pub(crate) fn extent_from_origin(bounds: Option<Rect>) -> (f32, f32) {
    bounds
        .map(|rect| (rect.right().max(0.0), rect.bottom().max(0.0)))
        .unwrap_or((0.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memlet(points: Vec<Point>) -> MemletLayout {
        let mut edge = MemletLayout {
            id: 0,
            src: 0,
            dst: 1,
            src_connector: None,
            dst_connector: None,
            data: None,
            points,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            shortcut: false,
            summarized: false,
        };
        edge.update_bounds();
        edge
    }

    #[test]
    fn edge_box_is_center_based() {
        let edge = memlet(vec![Point::new(10.0, 0.0), Point::new(30.0, 40.0)]);
        assert_eq!((edge.x, edge.y, edge.width, edge.height), (20.0, 20.0, 20.0, 40.0));
        assert_eq!(edge.bounds(), Rect::new(10.0, 0.0, 20.0, 40.0));
    }

    #[test]
    fn empty_state_has_no_bounds() {
        let state = StateLayout::default();
        assert!(state.calculate_bounding_box().is_none());
        assert_eq!(extent_from_origin(state.calculate_bounding_box()), (0.0, 0.0));
    }

    #[test]
    fn state_bounds_cover_edges() {
        let mut state = StateLayout::default();
        state.edges.push(memlet(vec![Point::new(0.0, 0.0), Point::new(50.0, 80.0)]));
        let bounds = state.calculate_bounding_box().unwrap();
        assert_eq!(extent_from_origin(Some(bounds)), (50.0, 80.0));
    }
}
