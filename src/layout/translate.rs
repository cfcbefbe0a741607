//! Rigid translation of laid-out sub-trees, used by the offset pass to move a
//! child layout from its local origin into its parent's rectangle.

use super::types::{
    BlockContents, BlockLayout, BranchLayout, CfgLayout, ConnectorLayout, InterstateEdgeLayout,
    MemletLayout, NodeLayout, StateLayout,
};

pub trait Translate {
    fn translate(&mut self, dx: f32, dy: f32);

    /// Moves a layout whose content origin is `from` so that it lands at `to`.
    fn move_origin(&mut self, from: (f32, f32), to: (f32, f32)) {
        self.translate(to.0 - from.0, to.1 - from.1);
    }
}

impl Translate for ConnectorLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }
}

impl Translate for NodeLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        for connector in self
            .in_connectors
            .iter_mut()
            .chain(self.out_connectors.iter_mut())
        {
            connector.translate(dx, dy);
        }
        if let Some(nested) = self.nested.as_deref_mut() {
            nested.translate(dx, dy);
        }
    }
}

impl Translate for MemletLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            *point = point.offset(dx, dy);
        }
        self.x += dx;
        self.y += dy;
    }
}

impl Translate for StateLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        for node in self.nodes.values_mut() {
            node.translate(dx, dy);
        }
        for edge in &mut self.edges {
            edge.translate(dx, dy);
        }
    }
}

impl Translate for InterstateEdgeLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            *point = point.offset(dx, dy);
        }
        self.x += dx;
        self.y += dy;
    }
}

impl Translate for BranchLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        self.region.translate(dx, dy);
    }
}

impl Translate for BlockContents {
    fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            BlockContents::State(state) => state.translate(dx, dy),
            BlockContents::Region(region) => region.translate(dx, dy),
            BlockContents::Conditional(branches) => {
                for branch in branches {
                    branch.translate(dx, dy);
                }
            }
        }
    }
}

impl Translate for BlockLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        if let Some(contents) = &mut self.contents {
            contents.translate(dx, dy);
        }
    }
}

impl Translate for CfgLayout {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        for block in self.blocks.values_mut() {
            block.translate(dx, dy);
        }
        for edge in &mut self.edges {
            edge.translate(dx, dy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::layout::types::BlockKind;
    use crate::sdfg::NodeKind;

    fn access(id: usize, x: f32, y: f32) -> NodeLayout {
        NodeLayout {
            id,
            kind: NodeKind::AccessNode,
            label: "A".to_string(),
            x,
            y,
            width: 30.0,
            height: 20.0,
            in_connectors: vec![ConnectorLayout {
                name: "IN_A".to_string(),
                x,
                y: y - 10.0,
                width: 10.0,
                height: 10.0,
            }],
            out_connectors: Vec::new(),
            scope_entry: None,
            scope_exit: None,
            collapsed: false,
            data: Some("A".to_string()),
            is_view: false,
            summarize_in_edges: false,
            summarize_out_edges: false,
            nested: None,
        }
    }

    #[test]
    fn translation_reaches_nested_graphs() {
        let mut inner_state = StateLayout::default();
        inner_state.nodes.insert(0, access(0, 5.0, 5.0));
        let mut inner = CfgLayout::default();
        inner.blocks.insert(
            0,
            BlockLayout {
                id: 0,
                cfg_id: 1,
                kind: BlockKind::State,
                label: "s".to_string(),
                x: 10.0,
                y: 10.0,
                width: 20.0,
                height: 20.0,
                collapsed: false,
                header: None,
                contents: Some(BlockContents::State(inner_state)),
            },
        );
        let mut outer = access(1, 0.0, 0.0);
        outer.nested = Some(Box::new(inner));
        outer.translate(100.0, 50.0);

        assert_eq!((outer.x, outer.y), (100.0, 50.0));
        assert_eq!(outer.in_connectors[0].y, 40.0);
        let nested = outer.nested.as_ref().unwrap();
        assert_eq!((nested.x, nested.y), (100.0, 50.0));
        let state = nested.blocks[&0].state().unwrap();
        assert_eq!(state.nodes[&0].center(), Point::new(105.0, 55.0));
    }

    #[test]
    fn edges_move_with_their_bounds() {
        let mut edge = InterstateEdgeLayout {
            id: 0,
            src: 0,
            dst: 1,
            label: String::new(),
            points: vec![Point::new(0.0, 0.0), Point::new(0.0, 10.0)],
            x: 0.0,
            y: 5.0,
            width: 0.0,
            height: 10.0,
        };
        edge.move_origin((0.0, 0.0), (3.0, 4.0));
        assert_eq!(edge.points[1], Point::new(3.0, 14.0));
        assert_eq!((edge.x, edge.y), (3.0, 9.0));
    }
}
