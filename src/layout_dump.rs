use crate::element::ElementId;
use crate::layout::{BlockContents, BlockKind, CfgLayout, NodeLayout, StateLayout};
use crate::registry::LayoutSnapshot;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub name: String,
    pub generation: u64,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<BlockDump>,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
pub struct BlockDump {
    pub id: ElementId,
    pub kind: BlockKind,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub collapsed: bool,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: ElementId,
    pub kind: String,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub collapsed: bool,
    pub in_connectors: Vec<ConnectorDump>,
    pub out_connectors: Vec<ConnectorDump>,
}

#[derive(Debug, Serialize)]
pub struct ConnectorDump {
    pub name: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub id: ElementId,
    pub from: ElementId,
    pub to: ElementId,
    pub label: String,
    pub shortcut: bool,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_layout(layout: &CfgLayout, name: &str) -> Self {
        let mut dump = LayoutDump {
            name: name.to_string(),
            generation: 0,
            width: layout.width,
            height: layout.height,
            blocks: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        dump.add_cfg(layout);
        dump
    }

    pub fn from_snapshot(snapshot: &LayoutSnapshot) -> Self {
        let mut dump = Self::from_layout(&snapshot.layout, snapshot.sdfg.name());
        dump.generation = snapshot.generation;
        dump
    }

    fn add_cfg(&mut self, cfg: &CfgLayout) {
        for block in cfg.blocks.values() {
            self.blocks.push(BlockDump {
                id: ElementId::block(block.cfg_id, block.id),
                kind: block.kind,
                label: block.label.clone(),
                x: block.x,
                y: block.y,
                width: block.width,
                height: block.height,
                collapsed: block.collapsed,
            });
            match &block.contents {
                Some(BlockContents::State(state)) => self.add_state(state),
                Some(BlockContents::Region(region)) => self.add_cfg(region),
                Some(BlockContents::Conditional(branches)) => {
                    for branch in branches {
                        self.add_cfg(&branch.region);
                    }
                }
                None => {}
            }
        }
        for edge in &cfg.edges {
            self.edges.push(EdgeDump {
                id: ElementId::interstate_edge(cfg.cfg_id, edge.id),
                from: ElementId::block(cfg.cfg_id, edge.src),
                to: ElementId::block(cfg.cfg_id, edge.dst),
                label: edge.label.clone(),
                shortcut: false,
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
            });
        }
    }

    fn add_state(&mut self, state: &StateLayout) {
        let node_id = |id: usize| ElementId::node(state.cfg_id, state.state_id, id);
        for node in state.nodes.values() {
            self.nodes.push(NodeDump {
                id: node_id(node.id),
                kind: node.kind.type_name(),
                label: node.label.clone(),
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
                collapsed: node.collapsed,
                in_connectors: connectors(node, true),
                out_connectors: connectors(node, false),
            });
            if let Some(nested) = node.nested.as_deref() {
                self.add_cfg(nested);
            }
        }
        for edge in &state.edges {
            self.edges.push(EdgeDump {
                id: ElementId::memlet(state.cfg_id, state.state_id, edge.id),
                from: node_id(edge.src),
                to: node_id(edge.dst),
                label: edge.data.clone().unwrap_or_default(),
                shortcut: edge.shortcut,
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
            });
        }
    }
}

fn connectors(node: &NodeLayout, inputs: bool) -> Vec<ConnectorDump> {
    let list = if inputs {
        &node.in_connectors
    } else {
        &node.out_connectors
    };
    list.iter()
        .map(|c| ConnectorDump {
            name: c.name.clone(),
            x: c.x,
            y: c.y,
        })
        .collect()
}

pub fn write_layout_dump(path: &Path, snapshot: &LayoutSnapshot) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_snapshot(snapshot);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutConfig, LayoutOptions};
    use crate::layout::{FixedWidth, LayoutCx, layout_sdfg};
    use crate::sdfg::fixtures;

    #[test]
    fn dump_flattens_the_hierarchy() {
        let config = LayoutConfig::default();
        let options = LayoutOptions::default();
        let measure = FixedWidth(6.0);
        let sdfg = fixtures::nested_two_levels();
        let layout = layout_sdfg(&sdfg, &LayoutCx::new(&config, &options, Some(&measure))).unwrap();
        let dump = LayoutDump::from_layout(&layout, sdfg.name());
        assert_eq!(dump.name, "outer");
        assert_eq!(dump.blocks.len(), 4);
        assert_eq!(dump.nodes.len(), 9);
        assert_eq!(dump.edges.len(), 7);

        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["nodes"][0]["id"], "0/0/0/-1");
        assert_eq!(json["blocks"][0]["kind"], "state");
    }
}
