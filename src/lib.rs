pub mod annotate;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod layout_dump;
pub mod memlet_tree;
pub mod positioning;
pub mod query;
pub mod registry;
pub mod sdfg;
pub mod text_metrics;
pub mod traverse;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, LayoutOptions, load_config};
pub use element::{ElementId, ElementRef};
pub use error::{LayoutError, SdfgError};
pub use layout::{CfgLayout, LayoutCx, compute_layout, layout_sdfg};
pub use memlet_tree::{memlet_tree, memlet_tree_partition, memlet_tree_root};
pub use positioning::{PositionOverrides, apply_position_overrides};
pub use registry::{CfgRegistry, LayoutEngine, LayoutSnapshot};
pub use sdfg::{Sdfg, parse_sdfg, stringify_sdfg};
