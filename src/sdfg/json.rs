use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::model::{Block, ControlFlowRegion, InterstateEdge, NodeKind, ScopeDict, Sdfg, State};
use crate::error::SdfgError;

/// Parses a persisted description and rejects structurally invalid graphs.
///
/// Nested SDFG payloads stored as JSON strings inside an `sdfg` attribute are
/// decoded recursively.
pub fn parse_sdfg(text: &str) -> Result<Sdfg, SdfgError> {
    let sdfg: Sdfg = serde_json::from_str(text)?;
    validate_sdfg(&sdfg)?;
    Ok(sdfg)
}

/// Serializes a description. Nested SDFGs are written back in their string form.
pub fn stringify_sdfg(sdfg: &Sdfg) -> Result<String, SdfgError> {
    Ok(serde_json::to_string(sdfg)?)
}

pub fn stringify_sdfg_pretty(sdfg: &Sdfg) -> Result<String, SdfgError> {
    Ok(serde_json::to_string_pretty(sdfg)?)
}

pub fn validate_sdfg(sdfg: &Sdfg) -> Result<(), SdfgError> {
    let mut seen = BTreeSet::new();
    validate_graph(sdfg, &mut seen)
}

fn validate_graph(sdfg: &Sdfg, seen: &mut BTreeSet<usize>) -> Result<(), SdfgError> {
    if !seen.insert(sdfg.cfg_list_id) {
        return Err(SdfgError::DuplicateGraphId(sdfg.cfg_list_id));
    }
    validate_region(sdfg.cfg_list_id, &sdfg.nodes, &sdfg.edges, seen)
}

fn validate_region(
    cfg_id: usize,
    blocks: &[Block],
    edges: &[InterstateEdge],
    seen: &mut BTreeSet<usize>,
) -> Result<(), SdfgError> {
    let ids: BTreeSet<usize> = blocks.iter().map(Block::id).collect();
    for (idx, edge) in edges.iter().enumerate() {
        for block in [edge.src, edge.dst] {
            if !ids.contains(&block) {
                return Err(SdfgError::UnknownBlock {
                    cfg_id,
                    edge: idx,
                    block,
                });
            }
        }
    }
    for block in blocks {
        match block {
            Block::State(state) => validate_state(cfg_id, state, seen)?,
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => {
                validate_subregion(cfg_id, region, seen)?
            }
            Block::ConditionalBlock(cond) => {
                for (_, region) in &cond.branches {
                    validate_subregion(cfg_id, region, seen)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_subregion(
    parent: usize,
    region: &ControlFlowRegion,
    seen: &mut BTreeSet<usize>,
) -> Result<(), SdfgError> {
    let cfg_id = region.effective_cfg_id(parent);
    if cfg_id != parent && !seen.insert(cfg_id) {
        return Err(SdfgError::DuplicateGraphId(cfg_id));
    }
    validate_region(cfg_id, &region.nodes, &region.edges, seen)
}

fn validate_state(cfg_id: usize, state: &State, seen: &mut BTreeSet<usize>) -> Result<(), SdfgError> {
    let node_ids: BTreeSet<usize> = state.nodes.iter().map(|node| node.id).collect();
    for (idx, edge) in state.edges.iter().enumerate() {
        for node in [edge.src, edge.dst] {
            if !node_ids.contains(&node) {
                return Err(SdfgError::UnknownEdgeEndpoint {
                    cfg_id,
                    state: state.id,
                    edge: idx,
                    node,
                });
            }
        }
    }

    let mut parent: BTreeMap<usize, i64> = BTreeMap::new();
    for (scope, children) in &state.scope_dict {
        for child in children {
            if !node_ids.contains(child) {
                return Err(SdfgError::ScopeUnknownNode {
                    cfg_id,
                    state: state.id,
                    node: *child,
                });
            }
            if let Some(first) = parent.insert(*child, *scope)
                && first != *scope
            {
                return Err(SdfgError::ScopeOverlap {
                    cfg_id,
                    state: state.id,
                    node: *child,
                    first,
                    second: *scope,
                });
            }
        }
    }

    let mut exits_per_entry: BTreeMap<usize, usize> = BTreeMap::new();
    for node in &state.nodes {
        if node.kind.is_exit()
            && let Some(entry) = node.scope_entry
        {
            let count = exits_per_entry.entry(entry).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(SdfgError::DuplicateScopeExit {
                    cfg_id,
                    state: state.id,
                    entry,
                });
            }
        }
        if node.kind == NodeKind::NestedSdfg
            && let Some(nested) = node.attributes.sdfg.as_deref()
        {
            validate_graph(nested, seen)?;
        }
    }
    Ok(())
}

fn value_to_id(value: &Value) -> Option<usize> {
    match value {
        Value::Number(num) => num.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Node and block references are written as decimal strings.
pub(crate) mod id_string {
    use super::*;

    pub fn serialize<S: Serializer>(id: &usize, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_to_id(&value).ok_or_else(|| D::Error::custom(format!("expected an id, found {value}")))
    }
}

pub(crate) mod opt_id_string {
    use super::*;

    pub fn serialize<S: Serializer>(id: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => serializer.collect_str(id),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        value_to_id(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an id, found {value}")))
    }
}

/// Scope dictionaries key children by the entry id as a string, `"-1"` for top level.
/// A `null` child list counts as empty.
pub(crate) mod scope_dict {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ScopeDict, D::Error> {
        let raw = match Value::deserialize(deserializer)? {
            Value::Null => return Ok(ScopeDict::new()),
            Value::Object(map) => map,
            other => {
                return Err(D::Error::custom(format!(
                    "expected a scope dictionary, found {other}"
                )));
            }
        };
        let mut dict = ScopeDict::new();
        for (key, children) in raw {
            let scope: i64 = key
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid scope id `{key}`")))?;
            let ids = match children {
                Value::Null => Vec::new(),
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        value_to_id(item).ok_or_else(|| {
                            D::Error::custom(format!("expected a node id, found {item}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                other => {
                    return Err(D::Error::custom(format!(
                        "expected a list of node ids, found {other}"
                    )));
                }
            };
            dict.insert(scope, ids);
        }
        Ok(dict)
    }
}

/// Connector sets are maps of name -> type; plain name lists are accepted too.
pub(crate) mod connectors {
    use super::*;

    pub fn serialize<S: Serializer>(
        connectors: &Map<String, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(connectors, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Map<String, Value>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map),
            Value::Array(names) => names
                .into_iter()
                .map(|name| match name {
                    Value::String(name) => Ok((name, Value::Null)),
                    other => Err(D::Error::custom(format!(
                        "expected a connector name, found {other}"
                    ))),
                })
                .collect(),
            other => Err(D::Error::custom(format!(
                "expected connector map, found {other}"
            ))),
        }
    }
}

/// Nested graphs are sometimes embedded as already-serialized JSON strings.
pub(crate) mod nested_sdfg {
    use super::*;

    pub fn serialize<S: Serializer>(
        sdfg: &Option<Box<Sdfg>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match sdfg {
            Some(inner) => {
                let text = serde_json::to_string(inner).map_err(S::Error::custom)?;
                serializer.serialize_str(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Box<Sdfg>>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::String(text) => serde_json::from_str::<Sdfg>(&text)
                .map(|sdfg| Some(Box::new(sdfg)))
                .map_err(D::Error::custom),
            other => serde_json::from_value::<Sdfg>(other)
                .map(|sdfg| Some(Box::new(sdfg)))
                .map_err(D::Error::custom),
        }
    }
}
