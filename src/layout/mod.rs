mod layered;
mod ranking;
mod region;
pub mod size;
mod state;
pub mod text;
pub mod translate;
pub(crate) mod types;

pub use layered::{LayeredGraph, LayeredSpacing, Placement};
pub use region::layout_sdfg;
pub use size::{NodeSize, NodeSizeInput, calculate_node_size};
pub use state::layout_state;
pub use text::{FixedWidth, FontMetrics, TextMeasure};
pub use translate::Translate;
pub use types::*;

use crate::config::{Config, LayoutConfig, LayoutOptions};
use crate::error::LayoutError;
use crate::sdfg::Sdfg;

/// Shared inputs of one layout pass.
#[derive(Clone, Copy)]
pub struct LayoutCx<'a> {
    pub config: &'a LayoutConfig,
    pub options: &'a LayoutOptions,
    pub measure: Option<&'a dyn TextMeasure>,
}

impl<'a> LayoutCx<'a> {
    pub fn new(
        config: &'a LayoutConfig,
        options: &'a LayoutOptions,
        measure: Option<&'a dyn TextMeasure>,
    ) -> Self {
        Self {
            config,
            options,
            measure,
        }
    }

    pub(crate) fn label_width(&self, text: &str) -> f32 {
        text::label_width(text, self.measure)
    }

    pub(crate) fn state_spacing(&self) -> LayeredSpacing {
        LayeredSpacing {
            node_spacing: self.config.state_node_spacing,
            rank_spacing: self.config.state_rank_spacing,
            large_graph_threshold: self.config.large_graph_threshold,
            order_passes: self.config.order_passes,
        }
    }

    pub(crate) fn region_spacing(&self) -> LayeredSpacing {
        LayeredSpacing {
            node_spacing: self.config.node_spacing,
            rank_spacing: self.config.rank_spacing,
            large_graph_threshold: self.config.large_graph_threshold,
            order_passes: self.config.order_passes,
        }
    }
}

impl std::fmt::Debug for LayoutCx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutCx")
            .field("config", self.config)
            .field("options", self.options)
            .field("measure", &self.measure.is_some())
            .finish()
    }
}

/// Lays out a whole description with font-backed text measurement.
pub fn compute_layout(sdfg: &Sdfg, config: &Config) -> Result<CfgLayout, LayoutError> {
    let metrics = FontMetrics::new(&config.font);
    let cx = LayoutCx::new(&config.layout, &config.options, Some(&metrics));
    layout_sdfg(sdfg, &cx)
}
