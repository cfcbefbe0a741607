use crate::config::{Config, load_config};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::positioning::PositionOverrides;
use crate::registry::LayoutEngine;
use crate::sdfg::{parse_sdfg, stringify_sdfg_pretty, validate_sdfg};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "sdfgl", version, about = "Hierarchical layout for SDFG graph descriptions")]
pub struct Args {
    /// Input file (.sdfg JSON) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "annotated")]
    pub format: OutputFormat,

    /// Config JSON file with layout constants and display options
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Manual position offsets keyed by element id
    #[arg(long = "positions")]
    pub positions: Option<PathBuf>,

    /// Hide access nodes and draw shortcut edges instead
    #[arg(long = "omit-access-nodes")]
    pub omit_access_nodes: bool,

    /// Use the generic layered layout for every state machine
    #[arg(long = "no-vertical-layout")]
    pub no_vertical_layout: bool,

    /// Never bundle the edges of high-degree nodes
    #[arg(long = "no-summarize")]
    pub no_summarize: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// The input description with layout annotations
    Annotated,
    /// A flat dump of every placed element
    Dump,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if self.omit_access_nodes {
            config.options.omit_access_nodes = true;
        }
        if self.no_vertical_layout {
            config.options.vertical_state_machine = false;
        }
        if self.no_summarize {
            config.options.summarize_edges = false;
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("sdfg_layout=warn");
    // A logger may already be installed by an embedding host.
    let _ = env_logger::Builder::from_env(env).try_init();
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging();
    run_with(&args)
}

pub fn run_with(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);

    let input = read_input(args.input.as_deref())?;
    let sdfg = parse_sdfg(&input).context("failed to parse SDFG")?;
    validate_sdfg(&sdfg)?;

    let overrides = match args.positions.as_deref() {
        Some(path) => PositionOverrides::load(path)?,
        None => PositionOverrides::new(),
    };

    let engine = LayoutEngine::new(sdfg, config).with_overrides(overrides);
    let snapshot = engine.relayout()?;
    info!(
        "laid out {} graphs, {}x{}",
        snapshot.registry.len(),
        snapshot.layout.width,
        snapshot.layout.height
    );

    let text = match (args.format, args.output.as_deref()) {
        (OutputFormat::Dump, Some(path)) => return write_layout_dump(path, &snapshot),
        (OutputFormat::Dump, None) => serde_json::to_string_pretty(&LayoutDump::from_snapshot(&snapshot))?,
        (OutputFormat::Annotated, _) => stringify_sdfg_pretty(&snapshot.annotated())?,
    };
    write_output(&text, args.output.as_deref())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
    }
}
