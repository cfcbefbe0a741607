use super::model::{Block, InterstateEdge, Sdfg};
use crate::element::ElementId;
use crate::error::SdfgError;

fn visit_blocks_mut(cfg_id: usize, blocks: &mut [Block], f: &mut dyn FnMut(usize, &mut Block)) {
    for block in blocks.iter_mut() {
        f(cfg_id, block);
        match block {
            Block::State(state) => {
                for node in &mut state.nodes {
                    if let Some(nested) = node.attributes.sdfg.as_deref_mut() {
                        visit_blocks_mut(nested.cfg_list_id, &mut nested.nodes, f);
                    }
                }
            }
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => {
                let child = region.effective_cfg_id(cfg_id);
                visit_blocks_mut(child, &mut region.nodes, f);
            }
            Block::ConditionalBlock(cond) => {
                for (_, region) in &mut cond.branches {
                    let child = region.effective_cfg_id(cfg_id);
                    visit_blocks_mut(child, &mut region.nodes, f);
                }
            }
        }
    }
}

fn update_collapse(
    sdfg: &mut Sdfg,
    id: &ElementId,
    op: impl Fn(bool) -> bool,
) -> Result<bool, SdfgError> {
    let Some(block_id) = id.state_id else {
        return Err(SdfgError::UnknownElement(id.to_string()));
    };
    if id.edge_id.is_some() {
        return Err(SdfgError::UnknownElement(id.to_string()));
    }
    let mut result = None;
    visit_blocks_mut(sdfg.cfg_list_id, &mut sdfg.nodes, &mut |cfg_id, block| {
        if result.is_some() || cfg_id != id.cfg_id || block.id() != block_id {
            return;
        }
        match id.node_id {
            None => {
                let attrs = block.attributes_mut();
                attrs.is_collapsed = op(attrs.is_collapsed);
                result = Some(attrs.is_collapsed);
            }
            Some(node_id) => {
                let Block::State(state) = block else {
                    return;
                };
                // An exit shares the collapse flag of its entry.
                let target = match state.node(node_id) {
                    Some(node) if node.kind.is_exit() => node.scope_entry.unwrap_or(node_id),
                    Some(_) => node_id,
                    None => return,
                };
                if let Some(node) = state.node_mut(target) {
                    node.attributes.is_collapsed = op(node.attributes.is_collapsed);
                    result = Some(node.attributes.is_collapsed);
                }
            }
        }
    });
    result.ok_or_else(|| SdfgError::UnknownElement(id.to_string()))
}

/// Sets the collapse flag of a block or node.
pub fn set_collapsed(sdfg: &mut Sdfg, id: &ElementId, collapsed: bool) -> Result<(), SdfgError> {
    update_collapse(sdfg, id, |_| collapsed).map(|_| ())
}

/// Flips the collapse flag of a block or node and returns the new value.
pub fn toggle_collapsed(sdfg: &mut Sdfg, id: &ElementId) -> Result<bool, SdfgError> {
    update_collapse(sdfg, id, |current| !current)
}

fn set_all(sdfg: &mut Sdfg, collapsed: bool) {
    visit_blocks_mut(sdfg.cfg_list_id, &mut sdfg.nodes, &mut |_, block| {
        block.attributes_mut().is_collapsed = collapsed;
        if let Block::State(state) = block {
            for node in &mut state.nodes {
                if node.kind.is_entry() || node.kind.is_nested() {
                    node.attributes.is_collapsed = collapsed;
                }
            }
        }
    });
}

/// Collapses every block, scope entry and nested graph node.
pub fn collapse_all(sdfg: &mut Sdfg) {
    set_all(sdfg, true);
}

pub fn expand_all(sdfg: &mut Sdfg) {
    set_all(sdfg, false);
}

fn strip_edges(edges: &mut [InterstateEdge]) {
    for edge in edges {
        edge.attributes.layout = None;
    }
}

/// Removes every computed annotation, including synthesized shortcut edges.
pub fn strip_layout(sdfg: &mut Sdfg) {
    sdfg.attributes.layout = None;
    strip_edges(&mut sdfg.edges);
    visit_blocks_mut(sdfg.cfg_list_id, &mut sdfg.nodes, &mut |_, block| {
        block.attributes_mut().layout = None;
        match block {
            Block::State(state) => {
                state.edges.retain(|edge| !edge.is_shortcut());
                for edge in &mut state.edges {
                    edge.attributes.layout = None;
                    edge.attributes.data.attributes.shortcut = None;
                }
                for node in &mut state.nodes {
                    node.attributes.layout = None;
                    if let Some(nested) = node.attributes.sdfg.as_deref_mut() {
                        nested.attributes.layout = None;
                        strip_edges(&mut nested.edges);
                    }
                }
            }
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => {
                strip_edges(&mut region.edges);
            }
            Block::ConditionalBlock(cond) => {
                for (_, region) in &mut cond.branches {
                    region.attributes.layout = None;
                    strip_edges(&mut region.edges);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdfg::fixtures;

    fn node_collapsed(sdfg: &Sdfg, node: usize) -> bool {
        match &sdfg.nodes[0] {
            Block::State(state) => state.node(node).unwrap().is_collapsed(),
            _ => panic!("expected a state"),
        }
    }

    #[test]
    fn toggling_an_exit_collapses_its_entry() {
        let mut sdfg = fixtures::map_state();
        let now = toggle_collapsed(&mut sdfg, &ElementId::node(0, 0, 3)).unwrap();
        assert!(now);
        assert!(node_collapsed(&sdfg, 1));
        assert!(!node_collapsed(&sdfg, 3));
    }

    #[test]
    fn collapses_nested_blocks_by_graph_id() {
        let mut sdfg = fixtures::control_flow();
        set_collapsed(&mut sdfg, &ElementId::block(1, 0), true).unwrap();
        let Block::LoopRegion(body) = &sdfg.nodes[1] else {
            panic!("expected a loop");
        };
        assert!(body.nodes[0].is_collapsed());
        assert!(!sdfg.nodes[0].is_collapsed());
    }

    #[test]
    fn unknown_elements_are_reported() {
        let mut sdfg = fixtures::map_state();
        let err = set_collapsed(&mut sdfg, &ElementId::node(0, 0, 42), true).unwrap_err();
        assert!(matches!(err, SdfgError::UnknownElement(_)));
        assert!(set_collapsed(&mut sdfg, &ElementId::interstate_edge(0, 0), true).is_err());
    }

    #[test]
    fn collapse_all_then_expand_all() {
        let mut sdfg = fixtures::nested_two_levels();
        collapse_all(&mut sdfg);
        assert!(sdfg.nodes.iter().all(Block::is_collapsed));
        assert!(node_collapsed(&sdfg, 0));
        expand_all(&mut sdfg);
        assert!(!sdfg.nodes.iter().any(Block::is_collapsed));
        assert!(!node_collapsed(&sdfg, 0));
    }
}
