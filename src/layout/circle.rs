use std::f64::consts::TAU;
use std::time::Instant;

use tracing::debug;

use crate::config::CircleConfig;
use crate::ir::{Graph, NodeId};

use super::annotation::Annotation;
use super::routing::{self, RouteStats};
use super::{LayoutError, LayoutKind, LayoutReport, LayoutStrategy, NodePass, Spacing};

/// Places connected nodes on one ring and isolated nodes on a second ring
/// below it.
#[derive(Debug, Clone, Default)]
pub struct CircleLayout {
    config: CircleConfig,
}

impl CircleLayout {
    pub fn new(config: CircleConfig) -> Self {
        Self { config }
    }

    fn radius(&self, count: usize) -> f64 {
        count as f64 * f64::from(self.config.distance_multiplier)
    }
}

/// Walks a point around `center` by repeatedly rotating the offset vector
/// through a fixed step angle.
struct Ring {
    center: (f64, f64),
    offset: (f64, f64),
    sin: f64,
    cos: f64,
}

impl Ring {
    fn new(center: (f64, f64), radius: f64, count: usize) -> Self {
        let step = TAU / count.max(1) as f64;
        Self {
            center,
            offset: (radius, 0.0),
            sin: step.sin(),
            cos: step.cos(),
        }
    }

    fn advance(&mut self) -> (f64, f64) {
        let (x, y) = self.offset;
        self.offset = (x * self.cos - y * self.sin, x * self.sin + y * self.cos);
        (self.center.0 + self.offset.0, self.center.1 + self.offset.1)
    }
}

fn place_ring(graph: &mut Graph, pass: &mut NodePass, members: &[NodeId], mut ring: Ring) {
    for id in members {
        let (x, y) = ring.advance();
        graph.set_position(*id, x as f32, y as f32);
        pass.annotations.set_node(*id, Annotation::marked());
    }
}

impl LayoutStrategy for CircleLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Circle
    }

    fn layout_nodes(&self, graph: &mut Graph) -> Result<NodePass, LayoutError> {
        let started = Instant::now();
        let mut pass = NodePass::new(LayoutKind::Circle, graph);
        pass.spacing = Spacing {
            distance_multiplier: self.config.distance_multiplier,
            ..Spacing::default()
        };

        let (connected, isolated): (Vec<NodeId>, Vec<NodeId>) =
            graph.node_ids().partition(|id| graph.node(*id).degree() > 0);

        if !connected.is_empty() {
            let ring = Ring::new((0.0, 0.0), self.radius(connected.len()), connected.len());
            place_ring(graph, &mut pass, &connected, ring);
        }
        if !isolated.is_empty() {
            let total = connected.len() + isolated.len() + self.config.ring_gap;
            let center = (0.0, self.radius(total));
            let ring = Ring::new(center, self.radius(isolated.len()), isolated.len());
            place_ring(graph, &mut pass, &isolated, ring);
        }
        debug!(
            connected = connected.len(),
            isolated = isolated.len(),
            "circle placement"
        );

        pass.elapsed = started.elapsed();
        Ok(pass)
    }

    fn layout_edges(&self, graph: &mut Graph, pass: NodePass) -> Result<LayoutReport, LayoutError> {
        pass.check(graph)?;
        let started = Instant::now();
        if let Some(id) = graph.node_ids().find(|id| !pass.annotations.is_annotated(*id)) {
            return Err(LayoutError::Unplaced(id));
        }
        let self_loops = routing::anchor_all_straight(
            graph,
            self.config.self_loop_lateral,
            self.config.self_loop_lift,
        );
        let stats = RouteStats {
            self_loops,
            ..RouteStats::default()
        };
        Ok(pass.into_report(graph, stats, started.elapsed()))
    }
}
