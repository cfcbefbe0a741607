//! Graph registry, immutable layout snapshots and the serialized relayout engine.
//!
//! Every relayout pass rebuilds the registry, lays the description out, applies
//! manual offsets and only then publishes the finished [`LayoutSnapshot`].
//! The whole pass runs under one lock, so two passes never interleave and a
//! reader only ever sees a complete snapshot.

use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::annotate::annotate_sdfg;
use crate::config::{Config, LayoutOptions};
use crate::element::ElementId;
use crate::error::{LayoutError, SdfgError};
use crate::geometry::{Point, Rect};
use crate::layout::{CfgLayout, FontMetrics, LayoutCx, layout_sdfg};
use crate::memlet_tree::{MemletIndex, memlet_tree_partition};
use crate::positioning::{PositionOverrides, apply_position_overrides};
use crate::query::{self, Hit};
use crate::sdfg::{self, Block, Sdfg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Sdfg,
    Region,
    Loop,
    Branch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEntry {
    pub cfg_id: usize,
    pub kind: GraphKind,
    pub parent: Option<usize>,
    /// Nested SDFG node (for nested graphs) or block (for regions) owning the graph.
    pub owner: Option<ElementId>,
    pub label: String,
}

/// Graph id -> where the graph lives in the hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfgRegistry {
    graphs: BTreeMap<usize, GraphEntry>,
}

impl CfgRegistry {
    pub fn build(sdfg: &Sdfg) -> Result<Self, SdfgError> {
        let mut registry = Self::default();
        registry.register_sdfg(sdfg, None, None)?;
        Ok(registry)
    }

    fn insert(&mut self, entry: GraphEntry) -> Result<(), SdfgError> {
        if self.graphs.contains_key(&entry.cfg_id) {
            return Err(SdfgError::DuplicateGraphId(entry.cfg_id));
        }
        self.graphs.insert(entry.cfg_id, entry);
        Ok(())
    }

    fn register_sdfg(
        &mut self,
        sdfg: &Sdfg,
        parent: Option<usize>,
        owner: Option<ElementId>,
    ) -> Result<(), SdfgError> {
        self.insert(GraphEntry {
            cfg_id: sdfg.cfg_list_id,
            kind: GraphKind::Sdfg,
            parent,
            owner,
            label: sdfg.name().to_string(),
        })?;
        self.register_blocks(sdfg.cfg_list_id, &sdfg.nodes)
    }

    fn register_blocks(&mut self, cfg_id: usize, blocks: &[Block]) -> Result<(), SdfgError> {
        for block in blocks {
            let owner = ElementId::block(cfg_id, block.id());
            match block {
                Block::State(state) => {
                    for node in &state.nodes {
                        if let Some(nested) = node.attributes.sdfg.as_deref() {
                            let owner = ElementId::node(cfg_id, state.id, node.id);
                            self.register_sdfg(nested, Some(cfg_id), Some(owner))?;
                        }
                    }
                }
                Block::ControlFlowRegion(region) | Block::LoopRegion(region) => {
                    let kind = if matches!(block, Block::LoopRegion(_)) {
                        GraphKind::Loop
                    } else {
                        GraphKind::Region
                    };
                    let id = region.effective_cfg_id(cfg_id);
                    if id != cfg_id {
                        self.insert(GraphEntry {
                            cfg_id: id,
                            kind,
                            parent: Some(cfg_id),
                            owner: Some(owner),
                            label: region.label.clone(),
                        })?;
                    }
                    self.register_blocks(id, &region.nodes)?;
                }
                Block::ConditionalBlock(cond) => {
                    for (_, region) in &cond.branches {
                        let id = region.effective_cfg_id(cfg_id);
                        if id != cfg_id {
                            self.insert(GraphEntry {
                                cfg_id: id,
                                kind: GraphKind::Branch,
                                parent: Some(cfg_id),
                                owner: Some(owner),
                                label: region.label.clone(),
                            })?;
                        }
                        self.register_blocks(id, &region.nodes)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, cfg_id: usize) -> Option<&GraphEntry> {
        self.graphs.get(&cfg_id)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.graphs.keys().copied()
    }

    /// Nested SDFG nodes leading from the root to the SDFG that owns `cfg_id`.
    pub fn sdfg_path(&self, cfg_id: usize) -> Option<Vec<ElementId>> {
        let mut path = Vec::new();
        let mut cursor = self.graphs.get(&cfg_id)?;
        for _ in 0..=self.graphs.len() {
            if cursor.kind == GraphKind::Sdfg
                && let Some(owner) = cursor.owner
            {
                path.push(owner);
            }
            match cursor.parent {
                Some(parent) => cursor = self.graphs.get(&parent)?,
                None => {
                    path.reverse();
                    return Some(path);
                }
            }
        }
        None
    }

    /// The SDFG (root or nested) whose graph hierarchy contains `cfg_id`.
    pub fn resolve_sdfg<'a>(&self, root: &'a Sdfg, cfg_id: usize) -> Option<&'a Sdfg> {
        let mut current = root;
        for owner in self.sdfg_path(cfg_id)? {
            let (_, state) = current
                .states()
                .into_iter()
                .find(|(cfg, state)| *cfg == owner.cfg_id && Some(state.id) == owner.state_id)?;
            current = state.node(owner.node_id?)?.attributes.sdfg.as_deref()?;
        }
        Some(current)
    }
}

/// One published layout: the description it was computed from, its graph
/// registry and the positioned layout tree.
#[derive(Debug)]
pub struct LayoutSnapshot {
    pub generation: u64,
    pub sdfg: Arc<Sdfg>,
    pub registry: CfgRegistry,
    pub layout: CfgLayout,
    pub options: LayoutOptions,
}

impl LayoutSnapshot {
    pub fn memlet_partition(&self) -> Vec<Vec<ElementId>> {
        memlet_tree_partition(&self.sdfg)
    }

    pub fn memlet_tree(&self, edge: &ElementId) -> Result<Vec<ElementId>, SdfgError> {
        MemletIndex::build(&self.sdfg).tree(edge, false)
    }

    /// A copy of the description carrying the computed layout.
    pub fn annotated(&self) -> Sdfg {
        annotate_sdfg(&self.sdfg, &self.layout)
    }

    pub fn elements_at_point(&self, point: Point) -> Vec<Hit<'_>> {
        query::elements_at_point(&self.layout, point, &self.options)
    }

    pub fn elements_in_rect(&self, rect: &Rect) -> Vec<Hit<'_>> {
        query::elements_in_rect(&self.layout, rect, &self.options)
    }

    pub fn elements_contained_in(&self, rect: &Rect) -> Vec<Hit<'_>> {
        query::elements_contained_in(&self.layout, rect, &self.options)
    }
}

struct EngineState {
    sdfg: Arc<Sdfg>,
    config: Config,
    overrides: PositionOverrides,
    generation: u64,
}

/// Owns a description and serializes relayout passes over it.
pub struct LayoutEngine {
    state: Mutex<EngineState>,
    published: Mutex<Option<Arc<LayoutSnapshot>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LayoutEngine {
    pub fn new(sdfg: Sdfg, config: Config) -> Self {
        Self {
            state: Mutex::new(EngineState {
                sdfg: Arc::new(sdfg),
                config,
                overrides: PositionOverrides::new(),
                generation: 0,
            }),
            published: Mutex::new(None),
        }
    }

    pub fn with_overrides(self, overrides: PositionOverrides) -> Self {
        lock(&self.state).overrides = overrides;
        self
    }

    /// Rebuilds the registry, lays out the current description and publishes
    /// the result.
    pub fn relayout(&self) -> Result<Arc<LayoutSnapshot>, LayoutError> {
        let mut state = lock(&self.state);
        let registry = CfgRegistry::build(&state.sdfg)?;
        let metrics = FontMetrics::new(&state.config.font);
        let cx = LayoutCx::new(&state.config.layout, &state.config.options, Some(&metrics));
        let mut layout = layout_sdfg(&state.sdfg, &cx)?;
        apply_position_overrides(&mut layout, &state.overrides);

        state.generation += 1;
        let snapshot = Arc::new(LayoutSnapshot {
            generation: state.generation,
            sdfg: Arc::clone(&state.sdfg),
            registry,
            layout,
            options: state.config.options,
        });
        *lock(&self.published) = Some(Arc::clone(&snapshot));
        debug!(
            "published layout generation {} ({} graphs)",
            snapshot.generation,
            snapshot.registry.len()
        );
        Ok(snapshot)
    }

    /// The most recently published snapshot, if any pass has completed.
    pub fn snapshot(&self) -> Option<Arc<LayoutSnapshot>> {
        lock(&self.published).clone()
    }

    pub fn description(&self) -> Arc<Sdfg> {
        Arc::clone(&lock(&self.state).sdfg)
    }

    /// Mutates the description; published snapshots keep their own copy.
    pub fn edit<R>(&self, f: impl FnOnce(&mut Sdfg) -> R) -> R {
        let mut state = lock(&self.state);
        f(Arc::make_mut(&mut state.sdfg))
    }

    pub fn replace_description(&self, sdfg: Sdfg) {
        lock(&self.state).sdfg = Arc::new(sdfg);
    }

    pub fn set_collapsed(&self, id: &ElementId, collapsed: bool) -> Result<(), SdfgError> {
        self.edit(|description| sdfg::set_collapsed(description, id, collapsed))
    }

    pub fn toggle_collapsed(&self, id: &ElementId) -> Result<bool, SdfgError> {
        self.edit(|description| sdfg::toggle_collapsed(description, id))
    }

    pub fn options(&self) -> LayoutOptions {
        lock(&self.state).config.options
    }

    pub fn set_options(&self, options: LayoutOptions) {
        lock(&self.state).config.options = options;
    }

    pub fn move_element(&self, id: ElementId, dx: f32, dy: f32) {
        lock(&self.state).overrides.record_move(id, dx, dy);
    }

    pub fn move_edge_point(&self, id: ElementId, index: usize, dx: f32, dy: f32) {
        lock(&self.state).overrides.record_point_move(id, index, dx, dy);
    }

    pub fn overrides(&self) -> PositionOverrides {
        lock(&self.state).overrides.clone()
    }
}
