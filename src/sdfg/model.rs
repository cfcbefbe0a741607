use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::json::{connectors, id_string, nested_sdfg, opt_id_string};
use crate::geometry::Point;

/// Layout annotation written back into a description after a layout pass.
/// Coordinates are center-based.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutAttr {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    /// Connector anchors of a node, keyed by connector name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connectors: BTreeMap<String, LayoutAttr>,
}

/// Scope entry id -> directly contained node ids; key `-1` holds the top level.
pub type ScopeDict = BTreeMap<i64, Vec<usize>>;

pub const TOP_LEVEL_SCOPE: i64 = -1;

/// The outermost graph description (also the payload of a nested SDFG node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sdfg {
    #[serde(rename = "type", default = "sdfg_type")]
    pub kind: String,
    #[serde(default, alias = "sdfg_list_id")]
    pub cfg_list_id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_block: Option<usize>,
    #[serde(default)]
    pub attributes: SdfgAttributes,
    #[serde(default)]
    pub nodes: Vec<Block>,
    #[serde(default)]
    pub edges: Vec<InterstateEdge>,
}

fn sdfg_type() -> String {
    "SDFG".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SdfgAttributes {
    #[serde(rename = "_arrays", default, skip_serializing_if = "Map::is_empty")]
    pub arrays: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutAttr>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Sdfg {
    pub fn name(&self) -> &str {
        self.attributes
            .other
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// True if `data` names a view descriptor (a transparent alias of another container).
    pub fn is_view(&self, data: &str) -> bool {
        self.attributes
            .arrays
            .get(data)
            .and_then(|desc| desc.get("type"))
            .and_then(Value::as_str)
            .map(|ty| ty.ends_with("View"))
            .unwrap_or(false)
    }

    /// States of this graph and its regions with their graph ids; nested SDFGs excluded.
    pub fn states(&self) -> Vec<(usize, &State)> {
        fn walk<'a>(cfg_id: usize, blocks: &'a [Block], out: &mut Vec<(usize, &'a State)>) {
            for block in blocks {
                match block {
                    Block::State(state) => out.push((cfg_id, state)),
                    Block::ControlFlowRegion(region) | Block::LoopRegion(region) => {
                        walk(region.effective_cfg_id(cfg_id), &region.nodes, out)
                    }
                    Block::ConditionalBlock(cond) => {
                        for (_, region) in &cond.branches {
                            walk(region.effective_cfg_id(cfg_id), &region.nodes, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self.cfg_list_id, &self.nodes, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Block {
    #[serde(rename = "SDFGState")]
    State(State),
    ControlFlowRegion(ControlFlowRegion),
    LoopRegion(ControlFlowRegion),
    ConditionalBlock(ConditionalBlock),
}

impl Block {
    pub fn id(&self) -> usize {
        match self {
            Block::State(state) => state.id,
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => region.id,
            Block::ConditionalBlock(cond) => cond.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Block::State(state) => &state.label,
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => &region.label,
            Block::ConditionalBlock(cond) => &cond.label,
        }
    }

    pub fn attributes(&self) -> &BlockAttributes {
        match self {
            Block::State(state) => &state.attributes,
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => &region.attributes,
            Block::ConditionalBlock(cond) => &cond.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut BlockAttributes {
        match self {
            Block::State(state) => &mut state.attributes,
            Block::ControlFlowRegion(region) | Block::LoopRegion(region) => &mut region.attributes,
            Block::ConditionalBlock(cond) => &mut cond.attributes,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.attributes().is_collapsed
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockAttributes {
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutAttr>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: usize,
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "crate::sdfg::json::scope_dict::deserialize")]
    pub scope_dict: ScopeDict,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Memlet>,
    #[serde(default)]
    pub attributes: BlockAttributes,
}

impl State {
    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes
            .get(id)
            .filter(|node| node.id == id)
            .or_else(|| self.nodes.iter().find(|node| node.id == id))
    }

    pub fn node_mut(&mut self, id: usize) -> Option<&mut Node> {
        let idx = self.nodes.iter().position(|node| node.id == id)?;
        self.nodes.get_mut(idx)
    }

    /// Ids of the unscoped nodes; every node when no scope dictionary is present.
    pub fn top_level_nodes(&self) -> Vec<usize> {
        match self.scope_dict.get(&TOP_LEVEL_SCOPE) {
            Some(ids) => ids.clone(),
            None => self.nodes.iter().map(|node| node.id).collect(),
        }
    }
}

/// A control-flow region; used for nested regions, loop bodies and conditional branches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlFlowRegion {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: usize,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub cfg_list_id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_block: Option<usize>,
    #[serde(default)]
    pub attributes: BlockAttributes,
    #[serde(default)]
    pub nodes: Vec<Block>,
    #[serde(default)]
    pub edges: Vec<InterstateEdge>,
}

impl ControlFlowRegion {
    /// Graph id of this region; regions written without one share their parent's.
    pub fn effective_cfg_id(&self, parent: usize) -> usize {
        if self.cfg_list_id == 0 {
            parent
        } else {
            self.cfg_list_id
        }
    }

    fn code_attr(&self, key: &str) -> Option<&str> {
        code_string(self.attributes.other.get(key)?)
    }

    pub fn loop_condition(&self) -> Option<&str> {
        self.code_attr("loop_condition")
    }

    pub fn init_statement(&self) -> Option<&str> {
        self.code_attr("init_statement")
    }

    pub fn update_statement(&self) -> Option<&str> {
        self.code_attr("update_statement")
    }

    /// Inverted loops evaluate their condition after the body.
    pub fn is_inverted(&self) -> bool {
        self.attributes
            .other
            .get("inverted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

fn code_string(value: &Value) -> Option<&str> {
    let text = match value {
        Value::String(text) => text.as_str(),
        Value::Object(obj) => obj.get("string_data")?.as_str()?,
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeBlock {
    #[serde(default)]
    pub string_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBlock {
    pub id: usize,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub cfg_list_id: usize,
    #[serde(default)]
    pub attributes: BlockAttributes,
    /// `(condition, body)`; a `None` condition is the else branch.
    #[serde(default)]
    pub branches: Vec<(Option<CodeBlock>, ControlFlowRegion)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Map,
    Consume,
    Pipeline,
}

impl ScopeKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "Map" => Some(Self::Map),
            "Consume" => Some(Self::Consume),
            "Pipeline" => Some(Self::Pipeline),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Map => "Map",
            Self::Consume => "Consume",
            Self::Pipeline => "Pipeline",
        }
    }
}

/// Dataflow node variants; unknown type names are treated as library nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    AccessNode,
    Tasklet,
    Reduce,
    NestedSdfg,
    Entry(ScopeKind),
    Exit(ScopeKind),
    Library(String),
}

impl NodeKind {
    pub fn is_entry(&self) -> bool {
        matches!(self, NodeKind::Entry(_))
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, NodeKind::Exit(_))
    }

    pub fn is_access(&self) -> bool {
        matches!(self, NodeKind::AccessNode)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, NodeKind::NestedSdfg)
    }

    pub fn type_name(&self) -> String {
        String::from(self.clone())
    }
}

impl From<String> for NodeKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "AccessNode" => NodeKind::AccessNode,
            "Tasklet" => NodeKind::Tasklet,
            "Reduce" => NodeKind::Reduce,
            "NestedSDFG" => NodeKind::NestedSdfg,
            _ => {
                if let Some(scope) = name.strip_suffix("Entry").and_then(ScopeKind::from_prefix) {
                    NodeKind::Entry(scope)
                } else if let Some(scope) = name.strip_suffix("Exit").and_then(ScopeKind::from_prefix) {
                    NodeKind::Exit(scope)
                } else {
                    NodeKind::Library(name)
                }
            }
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::AccessNode => "AccessNode".to_string(),
            NodeKind::Tasklet => "Tasklet".to_string(),
            NodeKind::Reduce => "Reduce".to_string(),
            NodeKind::NestedSdfg => "NestedSDFG".to_string(),
            NodeKind::Entry(scope) => format!("{}Entry", scope.prefix()),
            NodeKind::Exit(scope) => format!("{}Exit", scope.prefix()),
            NodeKind::Library(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub label: String,
    pub id: usize,
    #[serde(default, with = "opt_id_string")]
    pub scope_entry: Option<usize>,
    #[serde(default, with = "opt_id_string")]
    pub scope_exit: Option<usize>,
    #[serde(default)]
    pub attributes: NodeAttributes,
}

impl Node {
    pub fn is_collapsed(&self) -> bool {
        self.attributes.is_collapsed
    }

    pub fn in_connector_names(&self) -> Vec<String> {
        self.attributes.in_connectors.keys().cloned().collect()
    }

    pub fn out_connector_names(&self) -> Vec<String> {
        self.attributes.out_connectors.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeAttributes {
    #[serde(default, with = "connectors")]
    pub in_connectors: Map<String, Value>,
    #[serde(default, with = "connectors")]
    pub out_connectors: Map<String, Value>,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "nested_sdfg"
    )]
    pub sdfg: Option<Box<Sdfg>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutAttr>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A data-dependency edge inside a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memlet {
    #[serde(rename = "type", default = "memlet_edge_type")]
    pub kind: String,
    #[serde(with = "id_string")]
    pub src: usize,
    #[serde(with = "id_string")]
    pub dst: usize,
    #[serde(default)]
    pub src_connector: Option<String>,
    #[serde(default)]
    pub dst_connector: Option<String>,
    #[serde(default)]
    pub attributes: MemletAttributes,
}

fn memlet_edge_type() -> String {
    "MultiConnectorEdge".to_string()
}

impl Memlet {
    /// `Some(true)` for synthesized shortcuts, `Some(false)` for edges feeding one.
    pub fn shortcut(&self) -> Option<bool> {
        self.attributes.data.attributes.shortcut
    }

    pub fn is_shortcut(&self) -> bool {
        self.shortcut() == Some(true)
    }

    pub fn data_name(&self) -> Option<&str> {
        self.attributes.data.attributes.data.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemletAttributes {
    #[serde(default)]
    pub data: MemletData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutAttr>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemletData {
    #[serde(rename = "type", default = "memlet_type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: MemletDataAttributes,
}

impl Default for MemletData {
    fn default() -> Self {
        Self {
            kind: memlet_type(),
            attributes: MemletDataAttributes::default(),
        }
    }
}

fn memlet_type() -> String {
    "Memlet".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemletDataAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<bool>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A state-transition edge between blocks of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterstateEdge {
    #[serde(rename = "type", default = "interstate_edge_type")]
    pub kind: String,
    #[serde(with = "id_string")]
    pub src: usize,
    #[serde(with = "id_string")]
    pub dst: usize,
    #[serde(default)]
    pub attributes: InterstateEdgeAttributes,
}

fn interstate_edge_type() -> String {
    "Edge".to_string()
}

impl InterstateEdge {
    pub fn label(&self) -> &str {
        self.attributes.data.label.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterstateEdgeAttributes {
    #[serde(default)]
    pub data: InterstateEdgeData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutAttr>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterstateEdgeData {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}
