//! Small graph descriptions shared by unit tests.

use serde_json::{Value, json};

use super::model::Sdfg;

pub(crate) fn connectors(names: &[&str]) -> Value {
    let mut map = serde_json::Map::new();
    for name in names {
        map.insert((*name).to_string(), Value::Null);
    }
    Value::Object(map)
}

pub(crate) fn access(id: usize, data: &str, entry: Option<usize>) -> Value {
    json!({
        "type": "AccessNode", "label": data, "id": id,
        "scope_entry": entry.map(|e| e.to_string()), "scope_exit": null,
        "attributes": {"data": data, "in_connectors": {}, "out_connectors": {}}
    })
}

pub(crate) fn tasklet(
    id: usize,
    label: &str,
    ins: &[&str],
    outs: &[&str],
    entry: Option<usize>,
) -> Value {
    json!({
        "type": "Tasklet", "label": label, "id": id,
        "scope_entry": entry.map(|e| e.to_string()), "scope_exit": null,
        "attributes": {"in_connectors": connectors(ins), "out_connectors": connectors(outs),
                       "code": {"string_data": "b = a", "language": "Python"}}
    })
}

pub(crate) fn map_entry(
    id: usize,
    exit: usize,
    ins: &[&str],
    outs: &[&str],
    entry: Option<usize>,
) -> Value {
    json!({
        "type": "MapEntry", "label": format!("map_{id}"), "id": id,
        "scope_entry": entry.map(|e| e.to_string()), "scope_exit": exit.to_string(),
        "attributes": {"in_connectors": connectors(ins), "out_connectors": connectors(outs),
                       "is_collapsed": false, "params": ["i"]}
    })
}

pub(crate) fn map_exit(id: usize, entry: usize, ins: &[&str], outs: &[&str]) -> Value {
    json!({
        "type": "MapExit", "label": format!("map_{entry}"), "id": id,
        "scope_entry": entry.to_string(), "scope_exit": id.to_string(),
        "attributes": {"in_connectors": connectors(ins), "out_connectors": connectors(outs)}
    })
}

pub(crate) fn nested(
    id: usize,
    label: &str,
    ins: &[&str],
    outs: &[&str],
    sdfg: Value,
    as_string: bool,
) -> Value {
    let payload = if as_string {
        Value::String(sdfg.to_string())
    } else {
        sdfg
    };
    json!({
        "type": "NestedSDFG", "label": label, "id": id,
        "scope_entry": null, "scope_exit": null,
        "attributes": {"in_connectors": connectors(ins), "out_connectors": connectors(outs),
                       "sdfg": payload}
    })
}

pub(crate) fn memlet(
    src: usize,
    src_conn: Option<&str>,
    dst: usize,
    dst_conn: Option<&str>,
    data: &str,
) -> Value {
    json!({
        "type": "MultiConnectorEdge",
        "src": src.to_string(), "dst": dst.to_string(),
        "src_connector": src_conn, "dst_connector": dst_conn,
        "attributes": {"data": {"type": "Memlet", "attributes": {"data": data, "subset": "0:N"}}}
    })
}

pub(crate) fn state(id: usize, scope_dict: Value, nodes: Vec<Value>, edges: Vec<Value>) -> Value {
    json!({
        "type": "SDFGState", "label": format!("state_{id}"), "id": id,
        "scope_dict": scope_dict, "nodes": nodes, "edges": edges,
        "attributes": {"is_collapsed": false, "nosync": false}
    })
}

pub(crate) fn interstate(src: usize, dst: usize, label: &str) -> Value {
    json!({
        "type": "Edge", "src": src.to_string(), "dst": dst.to_string(),
        "attributes": {"data": {"type": "InterstateEdge", "label": label,
                                "attributes": {"assignments": {}, "condition": {"string_data": "1"}}}}
    })
}

pub(crate) fn graph(cfg_id: usize, name: &str, blocks: Vec<Value>, edges: Vec<Value>, arrays: Value) -> Value {
    json!({
        "type": "SDFG", "cfg_list_id": cfg_id, "start_block": 0,
        "attributes": {"name": name, "_arrays": arrays},
        "nodes": blocks, "edges": edges
    })
}

pub(crate) fn build(value: Value) -> Sdfg {
    serde_json::from_value(value).expect("fixture must deserialize")
}

/// `A -> MapEntry -> t -> MapExit -> B` in a single state.
pub(crate) fn map_state_value() -> Value {
    let nodes = vec![
        access(0, "A", None),
        map_entry(1, 3, &["IN_A"], &["OUT_A"], None),
        tasklet(2, "t", &["a"], &["b"], Some(1)),
        map_exit(3, 1, &["IN_B"], &["OUT_B"]),
        access(4, "B", None),
    ];
    let edges = vec![
        memlet(0, None, 1, Some("IN_A"), "A"),
        memlet(1, Some("OUT_A"), 2, Some("a"), "A"),
        memlet(2, Some("b"), 3, Some("IN_B"), "B"),
        memlet(3, Some("OUT_B"), 4, None, "B"),
    ];
    graph(
        0,
        "map_state",
        vec![state(0, json!({"-1": [0, 1, 4], "1": [2, 3]}), nodes, edges)],
        vec![],
        json!({"A": {"type": "Array"}, "B": {"type": "Array"}}),
    )
}

pub(crate) fn map_state() -> Sdfg {
    build(map_state_value())
}

/// Outer graph -> nested graph (string-encoded) -> nested graph.
pub(crate) fn nested_two_levels_value() -> Value {
    let innermost = graph(
        2,
        "innermost",
        vec![state(
            0,
            json!({"-1": [0, 1, 2]}),
            vec![
                access(0, "p", None),
                tasklet(1, "work", &["a"], &["b"], None),
                access(2, "q", None),
            ],
            vec![
                memlet(0, None, 1, Some("a"), "p"),
                memlet(1, Some("b"), 2, None, "q"),
            ],
        )],
        vec![],
        json!({"p": {"type": "Array"}, "q": {"type": "Array"}}),
    );
    let middle = graph(
        1,
        "middle",
        vec![state(
            0,
            json!({"-1": [0, 1, 2]}),
            vec![
                access(0, "x", None),
                nested(1, "innermost", &["p"], &["q"], innermost, false),
                access(2, "y", None),
            ],
            vec![
                memlet(0, None, 1, Some("p"), "x"),
                memlet(1, Some("q"), 2, None, "y"),
            ],
        )],
        vec![],
        json!({"x": {"type": "Array"}, "y": {"type": "Array"}}),
    );
    graph(
        0,
        "outer",
        vec![
            state(
                0,
                json!({"-1": [0, 1, 2]}),
                vec![
                    nested(0, "middle", &["x"], &["y"], middle, true),
                    access(1, "A", None),
                    access(2, "B", None),
                ],
                vec![
                    memlet(1, None, 0, Some("x"), "A"),
                    memlet(0, Some("y"), 2, None, "B"),
                ],
            ),
            state(1, json!({"-1": []}), vec![], vec![]),
        ],
        vec![interstate(0, 1, "")],
        json!({"A": {"type": "Array"}, "B": {"type": "Array"}}),
    )
}

pub(crate) fn nested_two_levels() -> Sdfg {
    build(nested_two_levels_value())
}

/// `S -> A -> B -> D` where `A` and `B` are access nodes.
pub(crate) fn access_chain() -> Sdfg {
    let nodes = vec![
        tasklet(0, "S", &[], &["o"], None),
        access(1, "A", None),
        access(2, "B", None),
        tasklet(3, "D", &["i"], &[], None),
    ];
    let edges = vec![
        memlet(0, Some("o"), 1, None, "A"),
        memlet(1, None, 2, None, "A"),
        memlet(2, None, 3, Some("i"), "B"),
    ];
    build(graph(
        0,
        "access_chain",
        vec![state(0, json!({"-1": [0, 1, 2, 3]}), nodes, edges)],
        vec![],
        json!({"A": {"type": "Array"}, "B": {"type": "Array"}}),
    ))
}

/// A state machine with a loop region, a conditional block and plain states.
pub(crate) fn control_flow() -> Sdfg {
    let body = json!({
        "type": "LoopRegion", "id": 1, "label": "loop", "cfg_list_id": 1, "start_block": 0,
        "attributes": {
            "is_collapsed": false,
            "loop_condition": {"string_data": "i < N", "language": "Python"},
            "init_statement": {"string_data": "i = 0", "language": "Python"},
            "update_statement": {"string_data": "i = i + 1", "language": "Python"},
            "inverted": false
        },
        "nodes": [
            state(0, json!({"-1": [0]}), vec![access(0, "A", None)], vec![]),
            state(1, json!({"-1": [0]}), vec![access(0, "B", None)], vec![])
        ],
        "edges": [interstate(0, 1, "")]
    });
    let branch_then = json!({
        "type": "ControlFlowRegion", "id": 0, "label": "then", "cfg_list_id": 3,
        "attributes": {},
        "nodes": [state(0, json!({"-1": [0]}), vec![access(0, "A", None)], vec![])],
        "edges": []
    });
    let branch_else = json!({
        "type": "ControlFlowRegion", "id": 0, "label": "else", "cfg_list_id": 4,
        "attributes": {},
        "nodes": [state(0, json!({"-1": [0]}), vec![access(0, "B", None)], vec![])],
        "edges": []
    });
    let cond = json!({
        "type": "ConditionalBlock", "id": 2, "label": "branch", "cfg_list_id": 2,
        "attributes": {"is_collapsed": false},
        "branches": [
            [{"string_data": "x > 0", "language": "Python"}, branch_then],
            [null, branch_else]
        ]
    });
    build(graph(
        0,
        "control_flow",
        vec![
            state(0, json!({"-1": [0]}), vec![access(0, "A", None)], vec![]),
            body,
            cond,
            state(3, json!({"-1": []}), vec![], vec![]),
        ],
        vec![
            interstate(0, 1, ""),
            interstate(1, 2, ""),
            interstate(2, 3, "done"),
        ],
        json!({"A": {"type": "Array"}, "B": {"type": "Array"}}),
    ))
}

/// Two-entry cycle `0 -> 1 <-> 2 <- 0` that a vertical state-machine layout cannot order.
pub(crate) fn irreducible() -> Sdfg {
    build(graph(
        0,
        "irreducible",
        vec![
            state(0, json!({"-1": []}), vec![], vec![]),
            state(1, json!({"-1": []}), vec![], vec![]),
            state(2, json!({"-1": []}), vec![], vec![]),
        ],
        vec![
            interstate(0, 1, ""),
            interstate(0, 2, ""),
            interstate(1, 2, ""),
            interstate(2, 1, ""),
        ],
        json!({}),
    ))
}
