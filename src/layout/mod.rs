mod annotation;
mod bucket;
mod circle;
mod error;
mod flow;
pub mod grid;
pub mod routing;
mod smart;
mod tree;

pub use annotation::{Annotation, Annotations, Mode};
pub use bucket::BucketLayout;
pub use circle::CircleLayout;
pub use error::LayoutError;
pub use flow::FlowLayout;
pub use grid::{Axis, CellState, GridPos, OccupancyGrid};
pub use routing::RouteStats;
pub use smart::SmartLayout;
pub use tree::TreeLayout;

use crate::config::LayoutConfig;
use crate::ir::{Graph, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Smart,
    Flow,
    Tree,
    Circle,
    Grid,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 5] = [
        LayoutKind::Smart,
        LayoutKind::Flow,
        LayoutKind::Tree,
        LayoutKind::Circle,
        LayoutKind::Grid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Smart => "smart",
            LayoutKind::Flow => "flow",
            LayoutKind::Tree => "tree",
            LayoutKind::Circle => "circle",
            LayoutKind::Grid => "grid",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            LayoutKind::Smart => "Smart Layout",
            LayoutKind::Flow => "Flow Layout",
            LayoutKind::Tree => "Tree Layout",
            LayoutKind::Circle => "Circle Layout",
            LayoutKind::Grid => "Grid Layout",
        }
    }

    pub fn build(self, config: &LayoutConfig) -> Box<dyn LayoutStrategy> {
        match self {
            LayoutKind::Smart => Box::new(SmartLayout::new(config.smart.clone())),
            LayoutKind::Flow => Box::new(FlowLayout::new(config.flow.clone())),
            LayoutKind::Tree => Box::new(TreeLayout::new(config.tree.clone())),
            LayoutKind::Circle => Box::new(CircleLayout::new(config.circle.clone())),
            LayoutKind::Grid => Box::new(BucketLayout::new(config.bucket.clone())),
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown layout '{0}' (expected smart, flow, tree, circle or grid)")]
pub struct UnknownLayout(pub String);

impl FromStr for LayoutKind {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        LayoutKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| UnknownLayout(s.to_string()))
    }
}

/// Two-phase layout contract. Strategies hold configuration only; all
/// per-pass state travels in the [`NodePass`] returned by node placement and
/// consumed by edge routing.
pub trait LayoutStrategy {
    fn kind(&self) -> LayoutKind;

    /// Assigns a centre position to every node.
    fn layout_nodes(&self, graph: &mut Graph) -> Result<NodePass, LayoutError>;

    /// Writes a polyline to every edge using the state of a node pass.
    fn layout_edges(&self, graph: &mut Graph, pass: NodePass) -> Result<LayoutReport, LayoutError>;
}

/// Distances between grid lines, in output units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Spacing {
    pub distance_ratio: f32,
    pub distance_multiplier: f32,
    pub x: f32,
    pub y: f32,
    /// Gap between parallel edges sharing a channel.
    pub edge: f32,
}

impl Spacing {
    pub fn half_x(&self) -> f32 {
        (self.x / 2.0).trunc()
    }

    pub fn half_y(&self) -> f32 {
        (self.y / 2.0).trunc()
    }

    pub fn eighth_x(&self) -> f32 {
        (self.x / 8.0).trunc()
    }

    pub fn eighth_y(&self) -> f32 {
        (self.y / 8.0).trunc()
    }
}

/// State produced by node placement and required by edge routing.
#[derive(Debug, Clone)]
pub struct NodePass {
    pub kind: LayoutKind,
    pub annotations: Annotations,
    pub grid: Option<OccupancyGrid>,
    pub spacing: Spacing,
    pub adaptive_edges: bool,
    pub uncompress: bool,
    pub start_nodes: Vec<NodeId>,
    pub elapsed: Duration,
}

impl NodePass {
    pub fn new(kind: LayoutKind, graph: &Graph) -> Self {
        Self {
            kind,
            annotations: Annotations::new(graph.node_count(), graph.edge_count()),
            grid: None,
            spacing: Spacing::default(),
            adaptive_edges: false,
            uncompress: false,
            start_nodes: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Fails if the pass was computed for a graph of a different shape.
    pub fn check(&self, graph: &Graph) -> Result<(), LayoutError> {
        if self.annotations.node_count() != graph.node_count() {
            return Err(LayoutError::StalePass {
                expected: self.annotations.node_count(),
                actual: graph.node_count(),
            });
        }
        if self.annotations.edge_count() != graph.edge_count() {
            return Err(LayoutError::StalePass {
                expected: self.annotations.edge_count(),
                actual: graph.edge_count(),
            });
        }
        Ok(())
    }

    pub fn into_report(self, graph: &Graph, stats: RouteStats, edge_time: Duration) -> LayoutReport {
        let (grid_dims, used_rows, used_columns) = match &self.grid {
            Some(grid) => (
                Some(grid.dims()),
                grid.used_row_count(),
                grid.used_column_count(),
            ),
            None => (None, 0, 0),
        };
        LayoutReport {
            kind: self.kind,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            spacing: self.spacing,
            grid_dims,
            used_rows,
            used_columns,
            adaptive_edges: self.adaptive_edges,
            uncompress: self.uncompress,
            start_nodes: self
                .start_nodes
                .iter()
                .map(|id| graph.node(*id).name.clone())
                .collect(),
            stats,
            node_time: self.elapsed,
            edge_time,
        }
    }
}

/// Summary of a finished layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutReport {
    pub kind: LayoutKind,
    pub node_count: usize,
    pub edge_count: usize,
    pub spacing: Spacing,
    pub grid_dims: Option<(usize, usize)>,
    pub used_rows: usize,
    pub used_columns: usize,
    pub adaptive_edges: bool,
    pub uncompress: bool,
    pub start_nodes: Vec<String>,
    pub stats: RouteStats,
    pub node_time: Duration,
    pub edge_time: Duration,
}

impl LayoutReport {
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LayoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind.title())?;
        writeln!(f, "  nodes: {}, edges: {}", self.node_count, self.edge_count)?;
        if self.spacing.x > 0.0 || self.spacing.y > 0.0 {
            writeln!(
                f,
                "  spacing: {} x {} (edge gap {})",
                self.spacing.x, self.spacing.y, self.spacing.edge
            )?;
        }
        if self.spacing.distance_multiplier > 0.0 {
            writeln!(
                f,
                "  distance ratio: {}, distance multiplier: {}",
                self.spacing.distance_ratio, self.spacing.distance_multiplier
            )?;
        }
        if let Some((dim_x, dim_y)) = self.grid_dims {
            writeln!(
                f,
                "  grid: {dim_x} x {dim_y}, allocated rows: {}, allocated columns: {}",
                self.used_rows, self.used_columns
            )?;
        }
        if self.kind == LayoutKind::Smart {
            writeln!(
                f,
                "  adaptive edges: {}, uncompress: {}",
                self.adaptive_edges, self.uncompress
            )?;
        }
        if !self.start_nodes.is_empty() {
            writeln!(f, "  start nodes: {}", self.start_nodes.join(", "))?;
        }
        writeln!(f, "  {}", self.stats)?;
        write!(
            f,
            "  node layout: {:?}, edge layout: {:?}",
            self.node_time, self.edge_time
        )
    }
}

/// Validates the graph, then runs both phases of the selected strategy.
pub fn compute_layout(
    graph: &mut Graph,
    kind: LayoutKind,
    config: &LayoutConfig,
) -> Result<LayoutReport, LayoutError> {
    graph.validate()?;
    let strategy = kind.build(config);
    let pass = strategy.layout_nodes(graph)?;
    strategy.layout_edges(graph, pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> Graph {
        let mut graph = Graph::new();
        let ids: Vec<NodeId> = (0..len)
            .map(|i| graph.add_node(format!("n{i}"), 30.0, 15.0))
            .collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1]).unwrap();
        }
        graph
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("Flow".parse::<LayoutKind>().unwrap(), LayoutKind::Flow);
        assert_eq!(" grid ".parse::<LayoutKind>().unwrap(), LayoutKind::Grid);
        assert!("radial".parse::<LayoutKind>().is_err());
        for kind in LayoutKind::ALL {
            assert_eq!(kind.as_str().parse::<LayoutKind>().unwrap(), kind);
        }
    }

    #[test]
    fn every_strategy_handles_empty_graph() {
        for kind in LayoutKind::ALL {
            let mut graph = Graph::new();
            let report = compute_layout(&mut graph, kind, &LayoutConfig::default()).unwrap();
            assert_eq!(report.node_count, 0);
            assert_eq!(report.stats, RouteStats::default(), "{kind}");
        }
    }

    #[test]
    fn every_strategy_routes_every_edge() {
        for kind in LayoutKind::ALL {
            let mut graph = chain(6);
            compute_layout(&mut graph, kind, &LayoutConfig::default()).unwrap();
            for edge in graph.edges() {
                assert!(edge.points.len() >= 2, "{kind}: {edge:?}");
            }
        }
    }

    #[test]
    fn stale_pass_is_rejected() {
        let strategy = SmartLayout::default();
        let mut graph = chain(3);
        let pass = strategy.layout_nodes(&mut graph).unwrap();
        let mut other = chain(4);
        let err = strategy.layout_edges(&mut other, pass).unwrap_err();
        assert_eq!(
            err,
            LayoutError::StalePass {
                expected: 3,
                actual: 4
            }
        );
    }

    #[test]
    fn invalid_graph_fails_before_layout() {
        let mut graph = Graph::new();
        graph.add_node("bad", f32::NAN, 1.0);
        let err = compute_layout(&mut graph, LayoutKind::Tree, &LayoutConfig::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::Graph(_)));
    }

    #[test]
    fn report_mentions_counts_and_grid() {
        let mut graph = chain(3);
        let report = compute_layout(&mut graph, LayoutKind::Smart, &LayoutConfig::default())
            .unwrap();
        let text = report.describe();
        assert!(text.starts_with("Smart Layout"));
        assert!(text.contains("nodes: 3, edges: 2"));
        assert!(text.contains("grid: 15 x 10"));
        assert!(text.contains("self loops: 0"));
    }

    #[test]
    fn chain_endpoints_touch_node_boundaries() {
        let mut graph = chain(4);
        compute_layout(&mut graph, LayoutKind::Smart, &LayoutConfig::default()).unwrap();
        for edge in graph.edges() {
            let first = edge.points[0];
            let last = edge.points[edge.points.len() - 1];
            assert!(graph.node(edge.from).boundary_side(first).is_some());
            assert!(graph.node(edge.to).boundary_side(last).is_some());
        }
    }
}
