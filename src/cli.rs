use crate::config::load_config;
use crate::ir::{Graph, GraphSpec};
use crate::layout::{LayoutKind, compute_layout};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rlay", version, about = "Grid-based graph layout: positions nodes and routes edges")]
pub struct Args {
    /// Input graph (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the layout JSON. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Layout strategy
    #[arg(short = 'l', long = "layout", value_enum, default_value = "smart")]
    pub layout: Strategy,

    /// Config JSON/JSON5 file with per-strategy overrides
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Print the layout report to stderr
    #[arg(long = "stats")]
    pub stats: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Smart,
    Flow,
    Tree,
    Circle,
    Grid,
}

impl From<Strategy> for LayoutKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Smart => LayoutKind::Smart,
            Strategy::Flow => LayoutKind::Flow,
            Strategy::Tree => LayoutKind::Tree,
            Strategy::Circle => LayoutKind::Circle,
            Strategy::Grid => LayoutKind::Grid,
        }
    }
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())
        .with_context(|| format!("failed to load config {:?}", args.config))?;

    let input = read_input(args.input.as_deref())?;
    let mut graph = parse_graph(&input)?;
    let kind = LayoutKind::from(args.layout);
    let report = compute_layout(&mut graph, kind, &config)?;

    if args.stats {
        eprintln!("{}", report.describe());
    }

    match args.output.as_deref() {
        Some(path) => write_layout_dump(path, &graph, kind)?,
        None => LayoutDump::from_graph(&graph, kind).write_to(io::stdout().lock())?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path.filter(|path| *path != Path::new("-")) {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn parse_graph(input: &str) -> Result<Graph> {
    let spec: GraphSpec = serde_json::from_str(input).context("invalid graph JSON")?;
    Ok(Graph::from_spec(&spec)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_graph_with_default_sizes() {
        let graph = parse_graph(
            r#"{
                "nodes": [{ "name": "a" }, { "name": "b", "width": 120, "height": 60 }],
                "edges": [{ "from": "a", "to": "b" }]
            }"#,
        )
        .unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.nodes()[1].half_width, 60.0);
        assert_eq!(graph.nodes()[1].half_height, 30.0);
    }

    #[test]
    fn unknown_edge_endpoint_is_an_error() {
        let err = parse_graph(r#"{ "nodes": [{ "name": "a" }], "edges": [{ "from": "a", "to": "x" }] }"#)
            .unwrap_err();
        assert!(err.to_string().contains('x'));
    }

    #[test]
    fn args_accept_layout_and_stats() {
        let args = Args::try_parse_from(["rlay", "-i", "g.json", "-l", "circle", "--stats"]).unwrap();
        assert_eq!(args.layout, Strategy::Circle);
        assert!(args.stats);
        assert_eq!(LayoutKind::from(args.layout), LayoutKind::Circle);

        let defaults = Args::try_parse_from(["rlay"]).unwrap();
        assert_eq!(defaults.layout, Strategy::Smart);
        assert!(defaults.output.is_none());
    }
}
