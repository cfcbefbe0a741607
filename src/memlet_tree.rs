//! Memlet trees: the set of edges one data movement fans out over.
//!
//! A tree is rooted at the outermost edge of a chain of scope entries (or
//! exits) paired by connector names `IN_x` / `OUT_x`, and continues into
//! nested SDFGs and through view access nodes.

use std::collections::{BTreeMap, BTreeSet};

use crate::element::ElementId;
use crate::error::SdfgError;
use crate::sdfg::{Memlet, Node, NodeKind, Sdfg, State, StateIndex};

struct StateEntry<'a> {
    sdfg: &'a Sdfg,
    state: &'a State,
    index: StateIndex,
}

impl StateEntry<'_> {
    fn node(&self, id: usize) -> Option<&Node> {
        self.index.node(self.state, id)
    }

    fn edge(&self, id: usize) -> Option<&Memlet> {
        self.state.edges.get(id)
    }

    fn edges_into(&self, node: usize) -> impl Iterator<Item = (usize, &Memlet)> {
        self.state
            .edges
            .iter()
            .enumerate()
            .filter(move |(_, edge)| edge.dst == node && !edge.is_shortcut())
    }

    fn edges_out_of(&self, node: usize) -> impl Iterator<Item = (usize, &Memlet)> {
        self.state
            .edges
            .iter()
            .enumerate()
            .filter(move |(_, edge)| edge.src == node && !edge.is_shortcut())
    }

    fn is_view(&self, node: &Node) -> bool {
        node.kind.is_access()
            && node
                .attributes
                .data
                .as_deref()
                .is_some_and(|data| self.sdfg.is_view(data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Every state of a description, nested SDFGs included, keyed by `(cfg, state)`.
pub struct MemletIndex<'a> {
    states: BTreeMap<(usize, usize), StateEntry<'a>>,
}

fn collect_states<'a>(sdfg: &'a Sdfg, out: &mut BTreeMap<(usize, usize), StateEntry<'a>>) {
    for (cfg_id, state) in sdfg.states() {
        for node in &state.nodes {
            if let Some(nested) = node.attributes.sdfg.as_deref() {
                collect_states(nested, out);
            }
        }
        out.insert(
            (cfg_id, state.id),
            StateEntry {
                sdfg,
                state,
                index: StateIndex::build(state),
            },
        );
    }
}

impl<'a> MemletIndex<'a> {
    pub fn build(sdfg: &'a Sdfg) -> Self {
        let mut states = BTreeMap::new();
        collect_states(sdfg, &mut states);
        Self { states }
    }

    fn entry(&self, id: &ElementId) -> Option<(&StateEntry<'a>, usize)> {
        if !id.is_memlet() {
            return None;
        }
        let state = self.states.get(&(id.cfg_id, id.state_id?))?;
        let edge = id.edge_id?;
        state.edge(edge)?;
        Some((state, edge))
    }

    /// All non-shortcut memlets, in `(cfg, state, edge)` order.
    pub fn memlets(&self) -> Vec<ElementId> {
        self.states
            .iter()
            .flat_map(|((cfg, state_id), entry)| {
                entry
                    .state
                    .edges
                    .iter()
                    .enumerate()
                    .filter(|(_, edge)| !edge.is_shortcut())
                    .map(move |(idx, _)| ElementId::memlet(*cfg, *state_id, idx))
            })
            .collect()
    }

    fn direction(state: &StateEntry<'_>, edge: &Memlet) -> Option<Direction> {
        let src = state.node(edge.src);
        let dst = state.node(edge.dst);
        let forward = (edge.src_connector.is_some() && src.is_some_and(|n| n.kind.is_entry()))
            || (edge
                .dst_connector
                .as_deref()
                .is_some_and(|conn| conn.starts_with("IN_"))
                && dst.is_some_and(|n| n.kind.is_entry()));
        let backward = (edge.src_connector.is_some() && src.is_some_and(|n| n.kind.is_exit()))
            || (edge.dst_connector.is_some() && dst.is_some_and(|n| n.kind.is_exit()));
        match (forward, backward) {
            (true, false) => Some(Direction::Forward),
            (false, true) => Some(Direction::Backward),
            _ => None,
        }
    }

    /// The tree containing `edge`, root first. Shortcut edges are never part
    /// of a tree; a shortcut or non-scoped edge yields a singleton.
    pub fn tree(&self, edge: &ElementId, root_only: bool) -> Result<Vec<ElementId>, SdfgError> {
        let (state, edge_idx) = self
            .entry(edge)
            .ok_or_else(|| SdfgError::UnknownElement(edge.to_string()))?;
        let (cfg_id, state_id) = (edge.cfg_id, state.state.id);
        let Some(memlet) = state.edge(edge_idx) else {
            return Err(SdfgError::UnknownElement(edge.to_string()));
        };
        let Some(direction) = Self::direction(state, memlet) else {
            return Ok(vec![*edge]);
        };

        let mut result = vec![*edge];
        let mut current = edge_idx;
        let mut seen = BTreeSet::from([current]);
        loop {
            let Some(cur) = state.edge(current) else {
                break;
            };
            let next = match direction {
                Direction::Forward => {
                    let Some(name) = cur.src_connector.as_deref().and_then(|c| c.strip_prefix("OUT_"))
                    else {
                        break;
                    };
                    if !state.node(cur.src).is_some_and(|n| n.kind.is_entry()) {
                        break;
                    }
                    let wanted = format!("IN_{name}");
                    state
                        .edges_into(cur.src)
                        .find(|(_, e)| e.dst_connector.as_deref() == Some(wanted.as_str()))
                        .map(|(idx, _)| idx)
                }
                Direction::Backward => {
                    let Some(name) = cur.dst_connector.as_deref().and_then(|c| c.strip_prefix("IN_"))
                    else {
                        break;
                    };
                    if !state.node(cur.dst).is_some_and(|n| n.kind.is_exit()) {
                        break;
                    }
                    let wanted = format!("OUT_{name}");
                    state
                        .edges_out_of(cur.dst)
                        .find(|(_, e)| e.src_connector.as_deref() == Some(wanted.as_str()))
                        .map(|(idx, _)| idx)
                }
            };
            match next {
                Some(idx) if seen.insert(idx) => {
                    result.insert(0, ElementId::memlet(cfg_id, state_id, idx));
                    current = idx;
                }
                _ => break,
            }
        }
        if root_only {
            return Ok(vec![result[0]]);
        }

        let root = result[0];
        let mut tree = vec![root];
        let mut visited = BTreeSet::from([root]);
        self.add_children(root, direction, &mut tree, &mut visited);
        Ok(tree)
    }

    fn add_children(
        &self,
        edge: ElementId,
        direction: Direction,
        tree: &mut Vec<ElementId>,
        visited: &mut BTreeSet<ElementId>,
    ) {
        let Some((state, edge_idx)) = self.entry(&edge) else {
            return;
        };
        let Some(memlet) = state.edge(edge_idx) else {
            return;
        };
        let (cfg_id, state_id) = (edge.cfg_id, state.state.id);
        let mut children: Vec<ElementId> = Vec::new();
        let local = |idx: usize| ElementId::memlet(cfg_id, state_id, idx);

        match direction {
            Direction::Forward => {
                let Some(next) = state.node(memlet.dst) else {
                    return;
                };
                if let NodeKind::NestedSdfg = next.kind
                    && let (Some(conn), Some(nested)) =
                        (memlet.dst_connector.as_deref(), next.attributes.sdfg.as_deref())
                {
                    children.extend(self.nested_edges(nested, conn, Direction::Forward));
                } else if let Some(name) = memlet
                    .dst_connector
                    .as_deref()
                    .and_then(|c| c.strip_prefix("IN_"))
                    && next.kind.is_entry()
                    && !next.is_collapsed()
                {
                    let wanted = format!("OUT_{name}");
                    children.extend(
                        state
                            .edges_out_of(next.id)
                            .filter(|(_, e)| e.src_connector.as_deref() == Some(wanted.as_str()))
                            .map(|(idx, _)| local(idx)),
                    );
                } else if state.is_view(next) {
                    children.extend(state.edges_out_of(next.id).map(|(idx, _)| local(idx)));
                }
            }
            Direction::Backward => {
                let Some(next) = state.node(memlet.src) else {
                    return;
                };
                if let NodeKind::NestedSdfg = next.kind
                    && let (Some(conn), Some(nested)) =
                        (memlet.src_connector.as_deref(), next.attributes.sdfg.as_deref())
                {
                    children.extend(self.nested_edges(nested, conn, Direction::Backward));
                } else if let Some(name) = memlet
                    .src_connector
                    .as_deref()
                    .and_then(|c| c.strip_prefix("OUT_"))
                    && next.kind.is_exit()
                {
                    let wanted = format!("IN_{name}");
                    children.extend(
                        state
                            .edges_into(next.id)
                            .filter(|(_, e)| e.dst_connector.as_deref() == Some(wanted.as_str()))
                            .map(|(idx, _)| local(idx)),
                    );
                } else if state.is_view(next) {
                    children.extend(state.edges_into(next.id).map(|(idx, _)| local(idx)));
                }
            }
        }

        for child in children {
            if visited.insert(child) {
                tree.push(child);
                self.add_children(child, direction, tree, visited);
            }
        }
    }

    /// Edges inside a nested SDFG touching access nodes bound to `connector`.
    fn nested_edges(&self, nested: &Sdfg, connector: &str, direction: Direction) -> Vec<ElementId> {
        let mut out = Vec::new();
        for (cfg_id, state) in nested.states() {
            for node in &state.nodes {
                if !node.kind.is_access() || node.attributes.data.as_deref() != Some(connector) {
                    continue;
                }
                for (idx, edge) in state.edges.iter().enumerate() {
                    if edge.is_shortcut() {
                        continue;
                    }
                    let touches = match direction {
                        Direction::Forward => edge.src == node.id,
                        Direction::Backward => edge.dst == node.id,
                    };
                    if touches {
                        out.push(ElementId::memlet(cfg_id, state.id, idx));
                    }
                }
            }
        }
        out
    }

    /// Disjoint partition of all non-shortcut memlets into trees; trees that
    /// share an edge are merged.
    pub fn partition(&self) -> Vec<Vec<ElementId>> {
        let memlets = self.memlets();
        let position: BTreeMap<ElementId, usize> = memlets
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();
        let mut sets = DisjointSets::new(memlets.len());
        let mut covered: BTreeSet<ElementId> = BTreeSet::new();
        for id in &memlets {
            if covered.contains(id) {
                continue;
            }
            let Ok(tree) = self.tree(id, false) else {
                continue;
            };
            let Some(&first) = tree.first().and_then(|root| position.get(root)) else {
                continue;
            };
            for member in &tree {
                if let Some(&idx) = position.get(member) {
                    sets.union(first, idx);
                    covered.insert(*member);
                }
            }
            if let Some(&idx) = position.get(id) {
                sets.union(first, idx);
            }
        }

        let mut groups: BTreeMap<usize, Vec<ElementId>> = BTreeMap::new();
        for (idx, id) in memlets.iter().enumerate() {
            groups.entry(sets.find(idx)).or_default().push(*id);
        }
        let mut out: Vec<Vec<ElementId>> = groups.into_values().collect();
        out.sort();
        out
    }
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut idx: usize) -> usize {
        while self.parent[idx] != idx {
            self.parent[idx] = self.parent[self.parent[idx]];
            idx = self.parent[idx];
        }
        idx
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

pub fn memlet_tree(sdfg: &Sdfg, edge: &ElementId) -> Result<Vec<ElementId>, SdfgError> {
    MemletIndex::build(sdfg).tree(edge, false)
}

pub fn memlet_tree_root(sdfg: &Sdfg, edge: &ElementId) -> Result<ElementId, SdfgError> {
    let tree = MemletIndex::build(sdfg).tree(edge, true)?;
    tree.first()
        .copied()
        .ok_or_else(|| SdfgError::UnknownElement(edge.to_string()))
}

pub fn memlet_tree_partition(sdfg: &Sdfg) -> Vec<Vec<ElementId>> {
    MemletIndex::build(sdfg).partition()
}
