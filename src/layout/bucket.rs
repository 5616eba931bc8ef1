use std::time::Instant;

use tracing::debug;

use crate::config::BucketConfig;
use crate::ir::{Graph, NodeId};

use super::annotation::Annotation;
use super::routing::{self, RouteStats};
use super::{LayoutError, LayoutKind, LayoutReport, LayoutStrategy, NodePass, Spacing};

/// Row-major placement, busiest callers first.
#[derive(Debug, Clone, Default)]
pub struct BucketLayout {
    config: BucketConfig,
}

impl BucketLayout {
    pub fn new(config: BucketConfig) -> Self {
        Self { config }
    }
}

/// Node ids ordered by outgoing edge count, highest first. Ties keep
/// insertion order.
fn by_outgoing(graph: &Graph) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = graph.node_ids().collect();
    ids.sort_by_key(|id| std::cmp::Reverse(graph.node(*id).outgoing().len()));
    ids
}

impl LayoutStrategy for BucketLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Grid
    }

    fn layout_nodes(&self, graph: &mut Graph) -> Result<NodePass, LayoutError> {
        let started = Instant::now();
        let mut pass = NodePass::new(LayoutKind::Grid, graph);
        pass.spacing = Spacing {
            x: self.config.gap,
            y: self.config.gap,
            ..Spacing::default()
        };

        let mut cursor = 0.0_f32;
        let mut row_top = 0.0_f32;
        let mut row_height = 0.0_f32;
        let mut rows = usize::from(!graph.is_empty());
        for id in by_outgoing(graph) {
            let (width, height) = {
                let node = graph.node(id);
                (node.half_width, node.half_height)
            };
            graph.set_position(id, cursor + width, row_top + height);
            pass.annotations.set_node(id, Annotation::marked());

            cursor += 2.0 * width + self.config.gap;
            row_height = row_height.max(2.0 * height);
            if cursor > self.config.width_budget {
                cursor = 0.0;
                row_top += row_height + self.config.gap;
                row_height = 0.0;
                rows += 1;
            }
        }
        debug!(rows, "bucket placement");

        pass.elapsed = started.elapsed();
        Ok(pass)
    }

    fn layout_edges(&self, graph: &mut Graph, pass: NodePass) -> Result<LayoutReport, LayoutError> {
        pass.check(graph)?;
        let started = Instant::now();
        if let Some(id) = graph.node_ids().find(|id| !pass.annotations.is_annotated(*id)) {
            return Err(LayoutError::Unplaced(id));
        }
        let stats = RouteStats {
            self_loops: routing::anchor_all_straight(
                graph,
                self.config.self_loop_lateral,
                self.config.self_loop_lift,
            ),
            ..RouteStats::default()
        };
        Ok(pass.into_report(graph, stats, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Point;

    fn callers() -> (Graph, [NodeId; 3]) {
        let mut graph = Graph::new();
        let idle = graph.add_node("idle", 100.0, 20.0);
        let busy = graph.add_node("busy", 100.0, 20.0);
        let some = graph.add_node("some", 100.0, 30.0);
        graph.add_edge(busy, idle).unwrap();
        graph.add_edge(busy, some).unwrap();
        graph.add_edge(some, idle).unwrap();
        (graph, [idle, busy, some])
    }

    #[test]
    fn busiest_callers_come_first() {
        let (mut graph, [idle, busy, some]) = callers();
        BucketLayout::default().layout_nodes(&mut graph).unwrap();
        assert_eq!(graph.node(busy).center(), Point::new(100.0, 20.0));
        assert_eq!(graph.node(some).center(), Point::new(450.0, 30.0));
        assert_eq!(graph.node(idle).center(), Point::new(800.0, 20.0));
    }

    #[test]
    fn rows_wrap_past_the_width_budget() {
        let (mut graph, [idle, busy, some]) = callers();
        let strategy = BucketLayout::new(BucketConfig {
            width_budget: 600.0,
            ..BucketConfig::default()
        });
        strategy.layout_nodes(&mut graph).unwrap();
        assert_eq!(graph.node(busy).center(), Point::new(100.0, 20.0));
        assert_eq!(graph.node(some).center(), Point::new(450.0, 30.0));
        // Second row starts below the tallest node of the first (60) plus the gap.
        assert_eq!(graph.node(idle).center(), Point::new(100.0, 210.0 + 20.0));
    }

    #[test]
    fn edges_get_two_anchors() {
        let (mut graph, _) = callers();
        let strategy = BucketLayout::default();
        let pass = strategy.layout_nodes(&mut graph).unwrap();
        let report = strategy.layout_edges(&mut graph, pass).unwrap();
        assert_eq!(report.kind, LayoutKind::Grid);
        assert!(report.grid_dims.is_none());
        for edge in graph.edges() {
            assert_eq!(edge.points.len(), 2);
            assert!(graph.node(edge.from).boundary_side(edge.points[0]).is_some());
            assert!(graph.node(edge.to).boundary_side(edge.points[1]).is_some());
        }
    }
}
