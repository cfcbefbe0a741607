use std::collections::BTreeSet;
use std::path::Path;

use proptest::prelude::*;
use serde_json::{Value, json};

use sdfg_layout::config::{LayoutConfig, LayoutOptions};
use sdfg_layout::element::ElementId;
use sdfg_layout::geometry::Rect;
use sdfg_layout::layout::{
    BlockContents, CfgLayout, FixedWidth, LayoutCx, NodeLayout, NodeSizeInput, StateLayout,
    calculate_node_size, layout_sdfg,
};
use sdfg_layout::memlet_tree::{MemletIndex, memlet_tree_partition};
use sdfg_layout::sdfg::{
    Block, NodeKind, Sdfg, parse_sdfg, set_collapsed, strip_layout, stringify_sdfg, validate_sdfg,
};
use sdfg_layout::{annotate::annotate_sdfg, traverse::traverse_scopes};

const FIXTURES: [&str; 4] = ["map_scope", "nested", "control_flow", "access_fan"];

fn load_fixture(name: &str) -> Sdfg {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{name}.sdfg"));
    let text = std::fs::read_to_string(&path).expect("fixture read failed");
    let sdfg = parse_sdfg(&text).expect("parse failed");
    validate_sdfg(&sdfg).expect("fixture must validate");
    sdfg
}

fn run_layout(sdfg: &Sdfg, options: LayoutOptions) -> CfgLayout {
    let config = LayoutConfig::default();
    let measure = FixedWidth(6.0);
    layout_sdfg(sdfg, &LayoutCx::new(&config, &options, Some(&measure))).expect("layout failed")
}

fn omitting() -> LayoutOptions {
    LayoutOptions {
        omit_access_nodes: true,
        ..LayoutOptions::default()
    }
}

/// Every state layout in the hierarchy together with its block's box.
fn states(layout: &CfgLayout) -> Vec<(&StateLayout, Rect)> {
    fn walk<'a>(cfg: &'a CfgLayout, out: &mut Vec<(&'a StateLayout, Rect)>) {
        for block in cfg.blocks.values() {
            match &block.contents {
                Some(BlockContents::State(state)) => {
                    out.push((state, block.bounds()));
                    for node in state.nodes.values() {
                        if let Some(nested) = node.nested.as_deref() {
                            walk(nested, out);
                        }
                    }
                }
                Some(BlockContents::Region(region)) => walk(region, out),
                Some(BlockContents::Conditional(branches)) => {
                    for branch in branches {
                        walk(&branch.region, out);
                    }
                }
                None => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(layout, &mut out);
    out
}

fn first_state(layout: &CfgLayout) -> &StateLayout {
    layout.blocks[&0].state().expect("block 0 is a state")
}

/// Nodes of a scope lie below its entry and above its exit.
fn assert_scopes_nest(state: &StateLayout) {
    const EPS: f32 = 1e-3;
    for (scope, children) in &state.scope_dict {
        if *scope < 0 {
            continue;
        }
        let Some(entry) = state.nodes.get(&(*scope as usize)) else {
            continue;
        };
        let exit = entry.scope_exit.and_then(|id| state.nodes.get(&id));
        for child in children {
            let Some(node) = state.nodes.get(child) else {
                continue;
            };
            assert!(
                entry.bounds().bottom() <= node.bounds().y + EPS,
                "node {} starts above its entry {}",
                node.id,
                entry.id
            );
            if let Some(exit) = exit
                && exit.id != node.id
            {
                assert!(
                    node.bounds().bottom() <= exit.bounds().y + EPS,
                    "node {} ends below its exit {}",
                    node.id,
                    exit.id
                );
            }
        }
    }
}

#[test]
fn scope_dictionaries_survive_loading() {
    let sdfg = load_fixture("map_scope");
    let Block::State(state) = &sdfg.nodes[0] else {
        panic!("block 0 is a state");
    };
    let keys: Vec<i64> = state.scope_dict.keys().copied().collect();
    assert_eq!(keys, vec![-1, 1, 2]);
    assert_eq!(state.scope_dict[&-1], vec![0, 1, 6, 7]);
    assert_eq!(state.scope_dict[&1], vec![2, 5]);
    assert_eq!(state.scope_dict[&2], vec![3, 4]);

    // Scoped nodes are nested under their entries, not drawn at top level.
    let layout = run_layout(&sdfg, LayoutOptions::default());
    let placed = first_state(&layout);
    assert_eq!(placed.scope_dict, state.scope_dict);
    assert_eq!(placed.nodes.len(), 8);

    // The string-encoded middle graph keeps its scope dictionary too.
    let nested = load_fixture("nested");
    let scoped_graphs: Vec<usize> = states(&run_layout(&nested, LayoutOptions::default()))
        .iter()
        .filter(|(state, _)| !state.scope_dict.is_empty())
        .map(|(state, _)| state.cfg_id)
        .collect();
    assert!(scoped_graphs.contains(&1), "nested graph lost its scope dictionary");
}

#[test]
fn all_fixtures_lay_out() {
    for name in FIXTURES {
        let sdfg = load_fixture(name);
        for options in [LayoutOptions::default(), omitting()] {
            let layout = run_layout(&sdfg, options);
            assert!(layout.width > 0.0 && layout.height > 0.0, "{name}: empty layout");
            for (state, block) in states(&layout) {
                let area = block.expand(1e-3);
                for node in state.nodes.values() {
                    assert!(
                        area.contains_rect(&node.bounds()),
                        "{name}: node {} of state {} escapes its block",
                        node.id,
                        state.state_id
                    );
                }
                assert_scopes_nest(state);
            }
        }
    }
}

#[test]
fn layout_is_idempotent() {
    for name in FIXTURES {
        let sdfg = load_fixture(name);
        assert_eq!(
            run_layout(&sdfg, LayoutOptions::default()),
            run_layout(&sdfg, LayoutOptions::default()),
            "{name}"
        );
        assert_eq!(run_layout(&sdfg, omitting()), run_layout(&sdfg, omitting()), "{name}");
    }
}

#[test]
fn traversal_reaches_every_drawn_node() {
    for name in FIXTURES {
        let layout = run_layout(&load_fixture(name), LayoutOptions::default());
        let expected: usize = states(&layout).iter().map(|(state, _)| state.nodes.len()).sum();
        let mut seen = BTreeSet::new();
        traverse_scopes(&layout, &mut |node: &NodeLayout, state: &StateLayout| {
            seen.insert(ElementId::node(state.cfg_id, state.state_id, node.id));
            true
        });
        assert_eq!(seen.len(), expected, "{name}");
    }
}

#[test]
fn shortcuts_are_unique_per_destination_connector() {
    let sdfg = load_fixture("access_fan");
    let layout = run_layout(&sdfg, omitting());
    let state = first_state(&layout);
    assert_eq!(state.nodes.keys().copied().collect::<Vec<_>>(), vec![0, 3, 4]);
    assert_eq!(state.synthesized.len(), 3);
    let keys: BTreeSet<(usize, Option<String>)> = state
        .synthesized
        .iter()
        .map(|edge| (edge.dst, edge.dst_connector.clone()))
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(state.synthesized.iter().all(|edge| edge.src == 0));

    // Feeding the annotated description back in synthesizes nothing new.
    let annotated = annotate_sdfg(&sdfg, &layout);
    let again = run_layout(&annotated, omitting());
    assert!(first_state(&again).synthesized.is_empty());
    assert_eq!(first_state(&again).edges.len(), 3);
}

#[test]
fn two_hidden_access_nodes_alone_draw_nothing() {
    let sdfg: Sdfg = serde_json::from_value(json!({
        "type": "SDFG", "cfg_list_id": 0, "start_block": 0,
        "attributes": {"name": "pair", "_arrays": {"A": {"type": "Array"}, "B": {"type": "Array"}}},
        "nodes": [{
            "type": "SDFGState", "id": 0, "label": "s", "scope_dict": {"-1": [0, 1]},
            "nodes": [
                {"type": "AccessNode", "id": 0, "label": "A", "attributes": {"data": "A"}},
                {"type": "AccessNode", "id": 1, "label": "B", "attributes": {"data": "B"}}
            ],
            "edges": [{"type": "MultiConnectorEdge", "src": "0", "dst": "1",
                       "src_connector": null, "dst_connector": null,
                       "attributes": {"data": {"type": "Memlet", "attributes": {"data": "A"}}}}]
        }],
        "edges": []
    }))
    .unwrap();
    let layout = run_layout(&sdfg, omitting());
    let state = first_state(&layout);
    assert!(state.nodes.is_empty());
    assert!(state.edges.is_empty());
    assert!(state.synthesized.is_empty());
    assert_eq!(state.hidden_nodes, BTreeSet::from([0, 1]));
}

#[test]
fn collapsed_scope_borrows_exit_connectors() {
    let mut sdfg = load_fixture("map_scope");
    set_collapsed(&mut sdfg, &ElementId::node(0, 0, 1), true).unwrap();
    let layout = run_layout(&sdfg, LayoutOptions::default());
    let state = first_state(&layout);
    assert_eq!(state.nodes.keys().copied().collect::<Vec<_>>(), vec![0, 1, 6, 7]);
    let entry = &state.nodes[&1];
    let names: Vec<&str> = entry.out_connectors.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["OUT_B"]);
    let pairs: BTreeSet<(usize, usize)> = state.edges.iter().map(|e| (e.src, e.dst)).collect();
    assert_eq!(pairs, BTreeSet::from([(0, 1), (1, 6), (6, 7)]));
}

#[test]
fn memlet_partition_covers_each_edge_once() {
    let sdfg = load_fixture("map_scope");
    let partition = memlet_tree_partition(&sdfg);
    let memlet = |edge| ElementId::memlet(0, 0, edge);
    assert_eq!(
        partition,
        vec![
            vec![memlet(0), memlet(1), memlet(2)],
            vec![memlet(3), memlet(4), memlet(5)],
            vec![memlet(6)],
        ]
    );

    for name in FIXTURES {
        let sdfg = load_fixture(name);
        let all: Vec<ElementId> = memlet_tree_partition(&sdfg).into_iter().flatten().collect();
        let unique: BTreeSet<ElementId> = all.iter().copied().collect();
        assert_eq!(all.len(), unique.len(), "{name}: edge in two trees");
        assert_eq!(
            unique.into_iter().collect::<Vec<_>>(),
            MemletIndex::build(&sdfg).memlets(),
            "{name}: edge missing from partition"
        );
    }
}

#[test]
fn descriptions_round_trip() {
    for name in FIXTURES {
        let sdfg = load_fixture(name);
        let text = stringify_sdfg(&sdfg).unwrap();
        assert_eq!(parse_sdfg(&text).unwrap(), sdfg, "{name}");
    }
}

#[test]
fn nested_payloads_are_written_as_strings() {
    let sdfg = load_fixture("nested");
    let value: Value = serde_json::from_str(&stringify_sdfg(&sdfg).unwrap()).unwrap();
    let payload = &value["nodes"][0]["nodes"][0]["attributes"]["sdfg"];
    let middle: Value = serde_json::from_str(payload.as_str().expect("string payload")).unwrap();
    assert_eq!(middle["attributes"]["name"], "middle");
    assert!(middle["nodes"][0]["nodes"][1]["attributes"]["sdfg"].is_string());
}

#[test]
fn annotations_strip_back_to_the_input() {
    for name in FIXTURES {
        let sdfg = load_fixture(name);
        let layout = run_layout(&sdfg, omitting());
        let annotated = annotate_sdfg(&sdfg, &layout);
        let mut reparsed = parse_sdfg(&stringify_sdfg(&annotated).unwrap()).unwrap();
        strip_layout(&mut reparsed);
        assert_eq!(reparsed, sdfg, "{name}");
    }
}

/// `inputs` access nodes feed `depth` nested maps; the tasklet's connectors
/// are wired in the order given by `wiring`.
fn nested_scope_state(depth: usize, wiring: &[usize]) -> Sdfg {
    let inputs = wiring.len();
    let entry = |d: usize| inputs + d;
    let tasklet = inputs + depth;
    let exit = |d: usize| tasklet + depth - d;
    let output = tasklet + depth + 1;
    let ins: Vec<String> = (0..inputs).map(|i| format!("IN_{i}")).collect();
    let outs: Vec<String> = (0..inputs).map(|i| format!("OUT_{i}")).collect();
    let names = |list: &[String]| -> Value {
        Value::Object(list.iter().map(|n| (n.clone(), Value::Null)).collect())
    };
    let owner = |d: usize| if d == 0 { Value::Null } else { json!(entry(d - 1).to_string()) };

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let memlet = |src: usize, sc: Option<String>, dst: usize, dc: Option<String>| {
        json!({"type": "MultiConnectorEdge", "src": src.to_string(), "dst": dst.to_string(),
               "src_connector": sc, "dst_connector": dc,
               "attributes": {"data": {"type": "Memlet", "attributes": {"data": "x"}}}})
    };
    for i in 0..inputs {
        nodes.push(json!({"type": "AccessNode", "id": i, "label": format!("in{i}"),
                          "attributes": {"data": format!("in{i}")}}));
        edges.push(memlet(i, None, entry(0), Some(format!("IN_{i}"))));
    }
    for d in 0..depth {
        nodes.push(json!({"type": "MapEntry", "id": entry(d), "label": format!("m{d}"),
                          "scope_entry": owner(d), "scope_exit": exit(d).to_string(),
                          "attributes": {"in_connectors": names(&ins), "out_connectors": names(&outs)}}));
        for i in 0..inputs {
            let dst = if d + 1 < depth { entry(d + 1) } else { tasklet };
            let dc = if d + 1 < depth { format!("IN_{i}") } else { format!("t{}", wiring[i]) };
            edges.push(memlet(entry(d), Some(format!("OUT_{i}")), dst, Some(dc)));
        }
    }
    let tasklet_ins: Vec<String> = (0..inputs).map(|i| format!("t{i}")).collect();
    nodes.push(json!({"type": "Tasklet", "id": tasklet, "label": "t",
                      "scope_entry": entry(depth - 1).to_string(),
                      "attributes": {"in_connectors": names(&tasklet_ins), "out_connectors": {"r": null}}}));
    edges.push(memlet(tasklet, Some("r".into()), exit(depth - 1), Some("IN_r".into())));
    for d in (0..depth).rev() {
        nodes.push(json!({"type": "MapExit", "id": exit(d), "label": format!("m{d}"),
                          "scope_entry": entry(d).to_string(), "scope_exit": exit(d).to_string(),
                          "attributes": {"in_connectors": {"IN_r": null}, "out_connectors": {"OUT_r": null}}}));
        let (dst, dc) = if d == 0 { (output, None) } else { (exit(d - 1), Some("IN_r".to_string())) };
        edges.push(memlet(exit(d), Some("OUT_r".into()), dst, dc));
    }
    nodes.push(json!({"type": "AccessNode", "id": output, "label": "out", "attributes": {"data": "out"}}));
    nodes.sort_by_key(|node| node["id"].as_u64());

    let mut scope_dict = serde_json::Map::new();
    let mut top: Vec<usize> = (0..inputs).collect();
    top.extend([entry(0), output]);
    scope_dict.insert("-1".into(), json!(top));
    for d in 0..depth {
        let inner = if d + 1 < depth { entry(d + 1) } else { tasklet };
        scope_dict.insert(entry(d).to_string(), json!([inner, exit(d)]));
    }
    serde_json::from_value(json!({
        "type": "SDFG", "cfg_list_id": 0, "start_block": 0,
        "attributes": {"name": "generated"},
        "nodes": [{"type": "SDFGState", "id": 0, "label": "s", "scope_dict": scope_dict,
                   "nodes": nodes, "edges": edges}],
        "edges": []
    }))
    .expect("generated description must deserialize")
}

fn upstream_key(state: &StateLayout, node: usize, connector: &str) -> Option<f32> {
    let edge = state
        .edges
        .iter()
        .find(|e| e.dst == node && e.dst_connector.as_deref() == Some(connector))?;
    let source = state.nodes.get(&edge.src)?;
    Some(
        edge.src_connector
            .as_deref()
            .and_then(|name| source.out_connector(name))
            .map_or(source.x, |c| c.x),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn connector_count_never_shrinks_width(
        label in "[a-z]{0,12}",
        ins in 0usize..12,
        outs in 0usize..12,
    ) {
        let measure = FixedWidth(6.0);
        let size = |count: usize| {
            calculate_node_size(
                &NodeSizeInput {
                    kind: &NodeKind::Tasklet,
                    label: &label,
                    in_connectors: count,
                    out_connectors: outs,
                    collapsed: false,
                    nested_extent: None,
                },
                10.0,
                Some(&measure),
            )
        };
        prop_assert!(size(ins + 1).width >= size(ins).width);
    }

    #[test]
    fn nested_scopes_lay_out_consistently(
        depth in 1usize..4,
        wiring in (1usize..4).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
    ) {
        let sdfg = nested_scope_state(depth, &wiring);
        validate_sdfg(&sdfg).unwrap();
        let first = run_layout(&sdfg, LayoutOptions::default());
        prop_assert_eq!(&first, &run_layout(&sdfg, LayoutOptions::default()));

        let state = first_state(&first);
        assert_scopes_nest(state);

        // In-connectors read left to right in the order of their sources.
        let tasklet = depth + wiring.len();
        let node = &state.nodes[&tasklet];
        let mut placed: Vec<(f32, f32)> = node
            .in_connectors
            .iter()
            .filter_map(|c| upstream_key(state, tasklet, &c.name).map(|key| (c.x, key)))
            .collect();
        prop_assert_eq!(placed.len(), wiring.len());
        placed.sort_by(|a, b| a.0.total_cmp(&b.0));
        prop_assert!(placed.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }
}
