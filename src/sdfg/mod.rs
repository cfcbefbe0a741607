//! Persisted graph description: data model, JSON codec and edit helpers.

pub mod edit;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod index;
pub mod json;
pub mod model;

pub use edit::{collapse_all, expand_all, set_collapsed, strip_layout, toggle_collapsed};
pub use index::StateIndex;
pub use json::{parse_sdfg, stringify_sdfg, stringify_sdfg_pretty, validate_sdfg};
pub use model::{
    Block, BlockAttributes, CodeBlock, ConditionalBlock, ControlFlowRegion, InterstateEdge,
    LayoutAttr, Memlet, Node, NodeKind, ScopeDict, ScopeKind, Sdfg, State, TOP_LEVEL_SCOPE,
};
