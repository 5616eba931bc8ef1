use std::time::Instant;

use tracing::{debug, info};

use crate::config::TreeConfig;
use crate::ir::{EdgeId, Graph, NodeId};

use super::annotation::{Annotation, Annotations, Mode};
use super::routing::{self, RouteStats};
use super::{LayoutError, LayoutKind, LayoutReport, LayoutStrategy, NodePass, Spacing};

/// Top-down tree placement from the root that leaves the fewest nodes
/// unvisited and the fewest edges pointing back into the tree.
#[derive(Debug, Clone, Default)]
pub struct TreeLayout {
    config: TreeConfig,
}

impl TreeLayout {
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    fn candidates(&self, graph: &Graph) -> Vec<NodeId> {
        let limit = self.config.candidate_limit.min(graph.node_count());
        let mut candidates: Vec<NodeId> = graph
            .node_ids()
            .filter(|id| graph.node(*id).incoming().len() <= self.config.root_max_incoming)
            .take(limit)
            .collect();
        if !graph.is_empty() {
            candidates.push(NodeId(0));
        }
        candidates
    }

    fn choose_root(&self, graph: &Graph, annotations: &mut Annotations) -> Option<NodeId> {
        let mut best = None;
        let mut best_unvisited = usize::MAX;
        let mut best_callbacks = usize::MAX;
        for candidate in self.candidates(graph) {
            let callbacks = count_callbacks(graph, annotations, candidate);
            let unvisited = clear_marks(graph, annotations);
            let differs = best_unvisited != unvisited || best_callbacks != callbacks;
            let no_worse = best_unvisited >= unvisited && best_callbacks >= callbacks;
            let sum_no_worse = best_unvisited.saturating_add(best_callbacks) >= unvisited + callbacks;
            if differs && (no_worse || sum_no_worse) {
                best = Some(candidate);
                best_unvisited = unvisited;
                best_callbacks = callbacks;
            }
        }
        if let Some(root) = best {
            info!(
                root = %graph.node(root).name,
                callbacks = best_callbacks,
                unvisited = best_unvisited,
                nodes = graph.node_count(),
                "tree root selected"
            );
        }
        best
    }
}

/// Marks everything reachable from `id`, counting edges into nodes that
/// were already marked when their parent was reached.
fn count_callbacks(graph: &Graph, annotations: &mut Annotations, id: NodeId) -> usize {
    let mut callbacks = 0;
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
        if annotations.is_annotated(id) {
            continue;
        }
        annotations.set_node(id, Annotation::marked());
        let children = graph.children(id);
        callbacks += children
            .iter()
            .filter(|child| annotations.is_annotated(**child))
            .count();
        stack.extend(children.into_iter().rev());
    }
    callbacks
}

/// Drops all marks and returns how many nodes were not marked.
fn clear_marks(graph: &Graph, annotations: &mut Annotations) -> usize {
    let mut unvisited = 0;
    for id in graph.node_ids() {
        if annotations.is_annotated(id) {
            annotations.clear_node(id);
        } else {
            unvisited += 1;
        }
    }
    unvisited
}

struct Placement<'a> {
    config: &'a TreeConfig,
    graph: &'a mut Graph,
    annotations: Annotations,
}

/// A node whose children are being laid out below it.
struct Slot {
    id: NodeId,
    x: f32,
    y: f32,
    extent: (f32, f32),
    next_x: f32,
    next_y: f32,
    outgoing: Vec<EdgeId>,
    index: usize,
}

impl Placement<'_> {
    /// Lays out the subtree of `id` in the slot whose top-left corner is
    /// `(x, y)` and returns the bottom-right extent it used. A node that is
    /// already placed uses nothing, and the edge that led to it becomes a
    /// callback.
    fn layout_node(&mut self, id: NodeId, x: f32, y: f32) -> (f32, f32) {
        let Some(root) = self.enter(id, x, y) else {
            return (x, y);
        };
        let mut stack = vec![root];
        let mut used = (x, y);
        while let Some(slot) = stack.last_mut() {
            let Some(&edge_id) = slot.outgoing.get(slot.index) else {
                if let Some(done) = stack.pop() {
                    used = self.leave(done);
                }
                if let Some(parent) = stack.last_mut() {
                    parent.extent.0 = parent.extent.0.max(used.0);
                    parent.extent.1 = parent.extent.1.max(used.1);
                    parent.next_x = used.0;
                }
                continue;
            };
            slot.index += 1;
            let (next_x, next_y) = (slot.next_x, slot.next_y);
            let child = self.graph.edge(edge_id).to;
            match self.enter(child, next_x, next_y) {
                Some(child) => stack.push(child),
                None => self
                    .annotations
                    .set_edge(edge_id, Annotation::new(Mode::Callback)),
            }
        }
        used
    }

    fn enter(&mut self, id: NodeId, x: f32, y: f32) -> Option<Slot> {
        if self.annotations.is_annotated(id) {
            return None;
        }
        self.annotations.set_node(id, Annotation::marked());

        let node = self.graph.node(id);
        let extent = (
            x + 2.0 * node.half_width + self.config.dist_x,
            y + 2.0 * node.half_height,
        );
        Some(Slot {
            id,
            x,
            y,
            extent,
            next_x: x,
            next_y: extent.1 + self.config.dist_y,
            outgoing: node.outgoing().to_vec(),
            index: 0,
        })
    }

    /// Centres the node over the columns its subtree used.
    fn leave(&mut self, slot: Slot) -> (f32, f32) {
        let half_height = self.graph.node(slot.id).half_height;
        let right = slot.extent.0 - self.config.dist_x;
        self.graph
            .set_position(slot.id, (slot.x + right) / 2.0, slot.y + half_height);
        slot.extent
    }
}

impl LayoutStrategy for TreeLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Tree
    }

    fn layout_nodes(&self, graph: &mut Graph) -> Result<NodePass, LayoutError> {
        let started = Instant::now();
        let mut pass = NodePass::new(LayoutKind::Tree, graph);
        pass.spacing = Spacing {
            x: self.config.dist_x,
            y: self.config.dist_y,
            ..Spacing::default()
        };
        let Some(root) = self.choose_root(graph, &mut pass.annotations) else {
            pass.elapsed = started.elapsed();
            return Ok(pass);
        };
        pass.start_nodes = vec![root];

        let mut placement = Placement {
            config: &self.config,
            graph,
            annotations: std::mem::take(&mut pass.annotations),
        };
        let mut extent = placement.layout_node(root, 0.0, 0.0);
        for id in placement.graph.node_ids() {
            if !placement.annotations.is_annotated(id) {
                extent = placement.layout_node(id, 0.0, extent.1 + self.config.stack_gap);
            }
        }
        debug!(width = extent.0, height = extent.1, "tree placement");

        pass.annotations = placement.annotations;
        pass.elapsed = started.elapsed();
        Ok(pass)
    }

    fn layout_edges(&self, graph: &mut Graph, pass: NodePass) -> Result<LayoutReport, LayoutError> {
        pass.check(graph)?;
        let started = Instant::now();
        let mut stats = RouteStats::default();

        for edge_id in graph.edge_ids() {
            let edge = graph.edge(edge_id);
            for end in [edge.from, edge.to] {
                if pass.annotations.node_mode(end) != Mode::Marked {
                    return Err(LayoutError::Unplaced(end));
                }
            }
            let from = graph.node(edge.from);
            let to = graph.node(edge.to);
            let points = if edge.is_self_loop() {
                stats.self_loops += 1;
                routing::self_loop(from, self.config.self_loop_lateral, self.config.self_loop_lift)
            } else {
                let (start, mut end) = routing::anchor_via(from, to, to.center(), from.center());
                if pass.annotations.edge_mode(edge_id) == Mode::Callback {
                    stats.callbacks += 1;
                    end = routing::shift_along_side(to, end, self.config.callback_offset);
                }
                vec![start, end]
            };
            graph.edge_mut(edge_id).points = points;
        }

        debug!(%stats, "tree routing");
        Ok(pass.into_report(graph, stats, started.elapsed()))
    }
}
