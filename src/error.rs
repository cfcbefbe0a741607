use thiserror::Error;

/// Problems found while loading a persisted graph description.
#[derive(Debug, Error)]
pub enum SdfgError {
    #[error("invalid SDFG JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state {state} of graph {cfg_id}: edge {edge} references unknown node {node}")]
    UnknownEdgeEndpoint {
        cfg_id: usize,
        state: usize,
        edge: usize,
        node: usize,
    },
    #[error("graph {cfg_id}: interstate edge {edge} references unknown block {block}")]
    UnknownBlock {
        cfg_id: usize,
        edge: usize,
        block: usize,
    },
    #[error("state {state} of graph {cfg_id}: node {node} appears under scopes {first} and {second}")]
    ScopeOverlap {
        cfg_id: usize,
        state: usize,
        node: usize,
        first: i64,
        second: i64,
    },
    #[error("state {state} of graph {cfg_id}: scope dictionary lists unknown node {node}")]
    ScopeUnknownNode {
        cfg_id: usize,
        state: usize,
        node: usize,
    },
    #[error("state {state} of graph {cfg_id}: scope entry {entry} has more than one exit")]
    DuplicateScopeExit {
        cfg_id: usize,
        state: usize,
        entry: usize,
    },
    #[error("graph id {0} is used by more than one control-flow region")]
    DuplicateGraphId(usize),
    #[error("invalid element id `{0}`")]
    InvalidElementId(String),
    #[error("no element with id `{0}`")]
    UnknownElement(String),
}

/// Failures of a layout pass.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("state {state} of graph {cfg_id}: edge {edge} references unknown node {node}")]
    UnknownNode {
        cfg_id: usize,
        state: usize,
        edge: usize,
        node: usize,
    },
    #[error("graph {cfg_id}: edge {edge} references unknown block {block}")]
    UnknownBlock {
        cfg_id: usize,
        edge: usize,
        block: usize,
    },
    #[error("irreducible control flow into block {block}")]
    IrreducibleControlFlow { block: String },
    #[error(transparent)]
    Description(#[from] SdfgError),
}
