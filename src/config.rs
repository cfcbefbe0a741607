use serde::{Deserialize, Serialize};
use std::path::Path;

/// Geometry constants of the layout pass. Every length derives from `line_height`
/// unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub line_height: f32,
    pub connector_size: f32,
    pub connector_spacing: f32,
    pub block_margin: f32,
    pub nested_margin: f32,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub state_node_spacing: f32,
    pub state_rank_spacing: f32,
    pub loop_band_height: f32,
    pub condition_band_height: f32,
    pub branch_spacing: f32,
    pub summarize_threshold: usize,
    pub large_graph_threshold: usize,
    pub order_passes: usize,
}

impl LayoutConfig {
    pub fn with_line_height(line_height: f32) -> Self {
        let l = line_height;
        Self {
            line_height: l,
            connector_size: l,
            connector_spacing: l,
            block_margin: 4.0 * l,
            nested_margin: l,
            node_spacing: 5.0 * l,
            rank_spacing: 5.0 * l,
            state_node_spacing: 10.0 * l,
            state_rank_spacing: 5.0 * l,
            loop_band_height: 3.0 * l,
            condition_band_height: 3.0 * l,
            branch_spacing: 2.0 * l,
            summarize_threshold: 10,
            large_graph_threshold: 1000,
            order_passes: 4,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::with_line_height(10.0)
    }
}

/// Display toggles that change which elements take part in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub omit_access_nodes: bool,
    pub vertical_state_machine: bool,
    pub summarize_edges: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            omit_access_nodes: false,
            vertical_state_machine: true,
            summarize_edges: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    pub font_family: String,
    pub font_size: f32,
    /// Skip system font lookup and use calibrated character widths.
    pub fast_text_metrics: bool,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            font_family: "Arial, sans-serif".to_string(),
            font_size: 10.0,
            fast_text_metrics: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub options: LayoutOptions,
    pub font: FontConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    line_height: Option<f32>,
    connector_size: Option<f32>,
    connector_spacing: Option<f32>,
    block_margin: Option<f32>,
    nested_margin: Option<f32>,
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    state_node_spacing: Option<f32>,
    state_rank_spacing: Option<f32>,
    loop_band_height: Option<f32>,
    condition_band_height: Option<f32>,
    branch_spacing: Option<f32>,
    summarize_threshold: Option<usize>,
    large_graph_threshold: Option<usize>,
    order_passes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct OptionsFile {
    omit_access_nodes: Option<bool>,
    vertical_state_machine: Option<bool>,
    summarize_edges: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FontFile {
    font_family: Option<String>,
    font_size: Option<f32>,
    fast_text_metrics: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    options: Option<OptionsFile>,
    font: Option<FontFile>,
}

fn parse_config_file(contents: &str) -> anyhow::Result<ConfigFile> {
    match serde_json::from_str(contents) {
        Ok(parsed) => Ok(parsed),
        // Hand-written config files often carry comments or trailing commas.
        Err(json_err) => json5::from_str(contents).map_err(|_| json_err.into()),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed = parse_config_file(&contents)?;

    if let Some(layout) = parsed.layout {
        if let Some(v) = layout.line_height {
            // Derived lengths follow a new line height unless set explicitly below.
            config.layout = LayoutConfig::with_line_height(v);
        }
        if let Some(v) = layout.connector_size {
            config.layout.connector_size = v;
        }
        if let Some(v) = layout.connector_spacing {
            config.layout.connector_spacing = v;
        }
        if let Some(v) = layout.block_margin {
            config.layout.block_margin = v;
        }
        if let Some(v) = layout.nested_margin {
            config.layout.nested_margin = v;
        }
        if let Some(v) = layout.node_spacing {
            config.layout.node_spacing = v;
        }
        if let Some(v) = layout.rank_spacing {
            config.layout.rank_spacing = v;
        }
        if let Some(v) = layout.state_node_spacing {
            config.layout.state_node_spacing = v;
        }
        if let Some(v) = layout.state_rank_spacing {
            config.layout.state_rank_spacing = v;
        }
        if let Some(v) = layout.loop_band_height {
            config.layout.loop_band_height = v;
        }
        if let Some(v) = layout.condition_band_height {
            config.layout.condition_band_height = v;
        }
        if let Some(v) = layout.branch_spacing {
            config.layout.branch_spacing = v;
        }
        if let Some(v) = layout.summarize_threshold {
            config.layout.summarize_threshold = v;
        }
        if let Some(v) = layout.large_graph_threshold {
            config.layout.large_graph_threshold = v;
        }
        if let Some(v) = layout.order_passes {
            config.layout.order_passes = v;
        }
    }

    if let Some(options) = parsed.options {
        if let Some(v) = options.omit_access_nodes {
            config.options.omit_access_nodes = v;
        }
        if let Some(v) = options.vertical_state_machine {
            config.options.vertical_state_machine = v;
        }
        if let Some(v) = options.summarize_edges {
            config.options.summarize_edges = v;
        }
    }

    if let Some(font) = parsed.font {
        if let Some(v) = font.font_family {
            config.font.font_family = v;
        }
        if let Some(v) = font.font_size {
            config.font.font_size = v;
        }
        if let Some(v) = font.fast_text_metrics {
            config.font.fast_text_metrics = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sdfg-layout-config-{}-{}.json",
            std::process::id(),
            name
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_derive_from_line_height() {
        let config = LayoutConfig::default();
        assert_eq!(config.line_height, 10.0);
        assert_eq!(config.block_margin, 40.0);
        assert_eq!(config.loop_band_height, 30.0);
        assert_eq!(config.summarize_threshold, 10);
    }

    #[test]
    fn missing_path_yields_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn overrides_are_merged() {
        let path = write_temp(
            "merge",
            r#"{"layout": {"lineHeight": 20, "blockMargin": 5},
                "options": {"omitAccessNodes": true},
                "font": {"fastTextMetrics": true}}"#,
        );
        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.layout.line_height, 20.0);
        assert_eq!(config.layout.nested_margin, 20.0);
        assert_eq!(config.layout.block_margin, 5.0);
        assert!(config.options.omit_access_nodes);
        assert!(config.options.vertical_state_machine);
        assert!(config.font.fast_text_metrics);
    }

    #[test]
    fn accepts_relaxed_json() {
        let path = write_temp(
            "json5",
            "{\n  // hide data containers\n  options: {omitAccessNodes: true,},\n}",
        );
        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(config.options.omit_access_nodes);
    }
}
