use std::collections::BTreeMap;

use super::model::{Node, ScopeDict, State, TOP_LEVEL_SCOPE};

/// Adjacency built once per state: node lookup, entry/exit pairing and scope parents.
#[derive(Debug, Clone, Default)]
pub struct StateIndex {
    state_id: usize,
    positions: BTreeMap<usize, usize>,
    entry_to_exit: BTreeMap<usize, usize>,
    exit_to_entry: BTreeMap<usize, usize>,
    parent: BTreeMap<usize, usize>,
    children: ScopeDict,
}

impl StateIndex {
    pub fn build(state: &State) -> Self {
        let positions = state
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id, idx))
            .collect::<BTreeMap<_, _>>();

        let mut entry_to_exit = BTreeMap::new();
        let mut exit_to_entry = BTreeMap::new();
        for node in &state.nodes {
            if node.kind.is_exit()
                && let Some(entry) = node.scope_entry
                && positions.contains_key(&entry)
            {
                entry_to_exit.entry(entry).or_insert(node.id);
                exit_to_entry.insert(node.id, entry);
            }
        }

        let mut parent = BTreeMap::new();
        let children = if state.scope_dict.is_empty() {
            // Older descriptions only carry per-node scope_entry links.
            let mut derived = ScopeDict::new();
            for node in &state.nodes {
                let scope = node
                    .scope_entry
                    .filter(|entry| positions.contains_key(entry))
                    .map(|entry| entry as i64)
                    .unwrap_or(TOP_LEVEL_SCOPE);
                derived.entry(scope).or_default().push(node.id);
            }
            derived
        } else {
            state.scope_dict.clone()
        };
        for (scope, ids) in &children {
            if *scope == TOP_LEVEL_SCOPE {
                continue;
            }
            for id in ids {
                parent.insert(*id, *scope as usize);
            }
        }

        Self {
            state_id: state.id,
            positions,
            entry_to_exit,
            exit_to_entry,
            parent,
            children,
        }
    }

    pub fn node<'a>(&self, state: &'a State, id: usize) -> Option<&'a Node> {
        self.positions.get(&id).and_then(|idx| state.nodes.get(*idx))
    }

    pub fn contains(&self, id: usize) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn exit_of(&self, entry: usize) -> Option<usize> {
        self.entry_to_exit.get(&entry).copied()
    }

    pub fn entry_of(&self, exit: usize) -> Option<usize> {
        self.exit_to_entry.get(&exit).copied()
    }

    /// Like [`exit_of`](Self::exit_of) but reports a dangling entry.
    pub fn find_exit_for_entry(&self, entry: usize) -> Option<usize> {
        let exit = self.exit_of(entry);
        if exit.is_none() {
            log::warn!(
                "state {}: no scope exit found for entry node {}",
                self.state_id,
                entry
            );
        }
        exit
    }

    /// Directly enclosing scope entry; `None` for top-level nodes.
    pub fn parent_scope(&self, node: usize) -> Option<usize> {
        self.parent.get(&node).copied()
    }

    /// Enclosing scope entries, innermost first.
    pub fn scope_ancestors(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = self.parent_scope(node);
        while let Some(entry) = cursor {
            if out.contains(&entry) {
                break;
            }
            out.push(entry);
            cursor = self.parent_scope(entry);
        }
        out
    }

    pub fn children(&self, scope: i64) -> &[usize] {
        self.children.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn top_level(&self) -> &[usize] {
        self.children(TOP_LEVEL_SCOPE)
    }

    pub fn scope_dict(&self) -> &ScopeDict {
        &self.children
    }
}
