//! Scope-aware walk over a computed layout.
//!
//! Nodes are visited top-down by scope: a scope entry's children follow the
//! entry, nested graphs are entered after their node, and `leave_node` fires
//! once everything below a node has been seen.

use std::collections::BTreeSet;

use crate::element::ElementId;
use crate::layout::{BlockContents, BlockLayout, CfgLayout, NodeLayout, StateLayout};
use crate::sdfg::TOP_LEVEL_SCOPE;

pub trait ScopeVisitor<'a> {
    /// Returning `false` skips the block's contents.
    fn visit_block(&mut self, _block: &'a BlockLayout) -> bool {
        true
    }

    /// Returning `false` skips the node's scope children and nested graph.
    fn visit_node(&mut self, node: &'a NodeLayout, state: &'a StateLayout) -> bool;

    fn leave_node(&mut self, _node: &'a NodeLayout, _state: &'a StateLayout) {}
}

impl<'a, F> ScopeVisitor<'a> for F
where
    F: FnMut(&'a NodeLayout, &'a StateLayout) -> bool,
{
    fn visit_node(&mut self, node: &'a NodeLayout, state: &'a StateLayout) -> bool {
        self(node, state)
    }
}

/// Walks every block and node of `cfg`, recursing through nested graphs.
pub fn traverse_scopes<'a, V: ScopeVisitor<'a> + ?Sized>(cfg: &'a CfgLayout, visitor: &mut V) {
    let mut seen = BTreeSet::new();
    walk_cfg(cfg, visitor, &mut seen);
}

/// Walks the nodes of one state and everything nested below them.
pub fn traverse_state<'a, V: ScopeVisitor<'a> + ?Sized>(state: &'a StateLayout, visitor: &mut V) {
    let mut seen = BTreeSet::new();
    walk_state(state, visitor, &mut seen);
}

fn walk_cfg<'a, V: ScopeVisitor<'a> + ?Sized>(
    cfg: &'a CfgLayout,
    visitor: &mut V,
    seen: &mut BTreeSet<ElementId>,
) {
    for block in cfg.blocks.values() {
        if !visitor.visit_block(block) {
            continue;
        }
        match &block.contents {
            Some(BlockContents::State(state)) => walk_state(state, visitor, seen),
            Some(BlockContents::Region(region)) => walk_cfg(region, visitor, seen),
            Some(BlockContents::Conditional(branches)) => {
                for branch in branches {
                    walk_cfg(&branch.region, visitor, seen);
                }
            }
            None => {}
        }
    }
}

fn walk_state<'a, V: ScopeVisitor<'a> + ?Sized>(
    state: &'a StateLayout,
    visitor: &mut V,
    seen: &mut BTreeSet<ElementId>,
) {
    if state.scope_dict.is_empty() {
        let ids: Vec<usize> = state.nodes.keys().copied().collect();
        walk_nodes(&ids, state, visitor, seen, false);
        return;
    }
    if let Some(top) = state.scope_dict.get(&TOP_LEVEL_SCOPE) {
        walk_nodes(top, state, visitor, seen, true);
    }
    // Drawn nodes no scope list mentions are laid out at top level.
    let listed: BTreeSet<usize> = state.scope_dict.values().flatten().copied().collect();
    let orphans: Vec<usize> = state
        .nodes
        .keys()
        .copied()
        .filter(|id| !listed.contains(id))
        .collect();
    walk_nodes(&orphans, state, visitor, seen, true);
}

fn walk_nodes<'a, V: ScopeVisitor<'a> + ?Sized>(
    ids: &[usize],
    state: &'a StateLayout,
    visitor: &mut V,
    seen: &mut BTreeSet<ElementId>,
    scoped: bool,
) {
    for id in ids {
        let Some(node) = state.nodes.get(id) else {
            continue;
        };
        if !seen.insert(ElementId::node(state.cfg_id, state.state_id, node.id)) {
            continue;
        }
        if visitor.visit_node(node, state) {
            if scoped
                && node.kind.is_entry()
                && let Some(children) = state.scope_dict.get(&(node.id as i64))
            {
                walk_nodes(children, state, visitor, seen, true);
            }
            if let Some(nested) = node.nested.as_deref() {
                walk_cfg(nested, visitor, seen);
            }
        }
        visitor.leave_node(node, state);
    }
}
