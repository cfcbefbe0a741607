//! Element identity and borrowed views over the layout tree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::SdfgError;
use crate::geometry::Rect;
use crate::layout::types::{
    BlockLayout, ConnectorLayout, InterstateEdgeLayout, MemletLayout, NodeLayout,
};

/// Identity of a drawable element, written `cfg/state/node/edge` with `-1`
/// for the parts that do not apply.
///
/// * block: `cfg/block/-1/-1`
/// * node: `cfg/state/node/-1`
/// * memlet: `cfg/state/-1/edge`
/// * interstate edge: `cfg/-1/-1/edge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId {
    pub cfg_id: usize,
    pub state_id: Option<usize>,
    pub node_id: Option<usize>,
    pub edge_id: Option<usize>,
}

impl ElementId {
    pub const fn block(cfg_id: usize, block: usize) -> Self {
        Self {
            cfg_id,
            state_id: Some(block),
            node_id: None,
            edge_id: None,
        }
    }

    pub const fn node(cfg_id: usize, state: usize, node: usize) -> Self {
        Self {
            cfg_id,
            state_id: Some(state),
            node_id: Some(node),
            edge_id: None,
        }
    }

    pub const fn memlet(cfg_id: usize, state: usize, edge: usize) -> Self {
        Self {
            cfg_id,
            state_id: Some(state),
            node_id: None,
            edge_id: Some(edge),
        }
    }

    pub const fn interstate_edge(cfg_id: usize, edge: usize) -> Self {
        Self {
            cfg_id,
            state_id: None,
            node_id: None,
            edge_id: Some(edge),
        }
    }

    pub fn is_block(&self) -> bool {
        self.state_id.is_some() && self.node_id.is_none() && self.edge_id.is_none()
    }

    pub fn is_node(&self) -> bool {
        self.node_id.is_some()
    }

    pub fn is_memlet(&self) -> bool {
        self.state_id.is_some() && self.edge_id.is_some()
    }

    pub fn is_interstate_edge(&self) -> bool {
        self.state_id.is_none() && self.edge_id.is_some()
    }

    /// The enclosing state of a node or memlet.
    pub fn parent(&self) -> Option<ElementId> {
        if self.is_node() || self.is_memlet() {
            self.state_id.map(|state| ElementId::block(self.cfg_id, state))
        } else {
            None
        }
    }
}

fn write_part(f: &mut fmt::Formatter<'_>, part: Option<usize>) -> fmt::Result {
    match part {
        Some(value) => write!(f, "{value}"),
        None => write!(f, "-1"),
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.cfg_id)?;
        write_part(f, self.state_id)?;
        f.write_str("/")?;
        write_part(f, self.node_id)?;
        f.write_str("/")?;
        write_part(f, self.edge_id)
    }
}

impl FromStr for ElementId {
    type Err = SdfgError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || SdfgError::InvalidElementId(text.to_string());
        let parts: Vec<i64> = text
            .split('/')
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        let [cfg, state, node, edge] = parts.as_slice() else {
            return Err(invalid());
        };
        let part = |value: i64| -> Result<Option<usize>, SdfgError> {
            match value {
                -1 => Ok(None),
                v if v >= 0 => Ok(Some(v as usize)),
                _ => Err(invalid()),
            }
        };
        let cfg_id = part(*cfg)?.ok_or_else(invalid)?;
        let id = ElementId {
            cfg_id,
            state_id: part(*state)?,
            node_id: part(*node)?,
            edge_id: part(*edge)?,
        };
        if id.node_id.is_some() && (id.state_id.is_none() || id.edge_id.is_some()) {
            return Err(invalid());
        }
        Ok(id)
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorSide {
    In,
    Out,
}

/// Borrowed view of one element of a computed layout.
#[derive(Debug, Clone, Copy)]
pub enum ElementRef<'a> {
    Block(&'a BlockLayout),
    Node(&'a NodeLayout),
    Connector {
        node: &'a NodeLayout,
        side: ConnectorSide,
        connector: &'a ConnectorLayout,
    },
    Memlet(&'a MemletLayout),
    InterstateEdge(&'a InterstateEdgeLayout),
}

impl ElementRef<'_> {
    pub fn bounds(&self) -> Rect {
        match self {
            ElementRef::Block(block) => block.bounds(),
            ElementRef::Node(node) => node.bounds(),
            ElementRef::Connector { connector, .. } => connector.bounds(),
            ElementRef::Memlet(edge) => edge.bounds(),
            ElementRef::InterstateEdge(edge) => edge.bounds(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ElementRef::Block(_) => "block",
            ElementRef::Node(_) => "node",
            ElementRef::Connector { .. } => "connector",
            ElementRef::Memlet(_) => "memlet",
            ElementRef::InterstateEdge(_) => "interstate_edge",
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ElementRef::Block(block) => &block.label,
            ElementRef::Node(node) => &node.label,
            ElementRef::Connector { connector, .. } => &connector.name,
            ElementRef::Memlet(edge) => edge.data.as_deref().unwrap_or(""),
            ElementRef::InterstateEdge(edge) => &edge.label,
        }
    }
}
