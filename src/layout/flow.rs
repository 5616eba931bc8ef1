use std::time::Instant;

use tracing::{debug, warn};

use crate::config::FlowConfig;
use crate::ir::{Graph, NodeId, Point, Side};

use super::annotation::{Annotation, Annotations, Mode};
use super::grid::{CellState, GridPos, OccupancyGrid};
use super::routing::{self, RouteStats};
use super::{LayoutError, LayoutKind, LayoutReport, LayoutStrategy, NodePass, Spacing};

/// Flow-chart placement: trees grow south from start nodes, one column
/// block per tree.
#[derive(Debug, Clone, Default)]
pub struct FlowLayout {
    config: FlowConfig,
}

impl FlowLayout {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    fn is_start_node(&self, graph: &Graph, id: NodeId) -> bool {
        let node = graph.node(id);
        node.name == self.config.start_marker
            || (!self.config.start_prefix.is_empty() && node.name.starts_with(&self.config.start_prefix))
            || node.incoming().is_empty()
    }
}

impl LayoutStrategy for FlowLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Flow
    }

    fn layout_nodes(&self, graph: &mut Graph) -> Result<NodePass, LayoutError> {
        let started = Instant::now();
        let mut pass = NodePass::new(LayoutKind::Flow, graph);
        let (half_width, half_height) = graph.largest_half_extent();
        let x = 2.0 * half_width + self.config.node_gap;
        let y = 2.0 * half_height + self.config.node_gap;
        pass.spacing = Spacing {
            distance_ratio: x / y,
            distance_multiplier: 0.0,
            x,
            y,
            edge: 15.0,
        };
        pass.start_nodes = graph
            .node_ids()
            .filter(|id| self.is_start_node(graph, *id))
            .collect();
        if graph.is_empty() {
            pass.elapsed = started.elapsed();
            return Ok(pass);
        }

        let (dim_x, dim_y) = self.config.grid.dims(graph.node_count());
        let dim_x = dim_x.max(column_reach(graph));
        let grid = OccupancyGrid::with_origin(dim_x, dim_y, 0, (dim_y / 2) as i32);
        debug!(grid = ?grid.dims(), starts = pass.start_nodes.len(), "flow placement");

        let mut placement = Placement {
            layout: self,
            graph,
            grid,
            annotations: std::mem::take(&mut pass.annotations),
            spacing: pass.spacing,
        };
        placement.place_trees(&pass.start_nodes)?;
        placement.optimise()?;
        pass.annotations = placement.annotations;
        pass.grid = Some(placement.grid);
        pass.elapsed = started.elapsed();
        Ok(pass)
    }

    fn layout_edges(&self, graph: &mut Graph, pass: NodePass) -> Result<LayoutReport, LayoutError> {
        pass.check(graph)?;
        let started = Instant::now();
        let mut stats = RouteStats::default();
        let margin = self.config.loop_margin;
        let lift = self.config.loop_lift;

        for edge_id in graph.edge_ids() {
            let edge = graph.edge(edge_id);
            let parent = graph.node(edge.from);
            let child = graph.node(edge.to);
            if pass.annotations.node_cell(edge.from).is_none() {
                return Err(LayoutError::Unplaced(edge.from));
            }
            if pass.annotations.node_cell(edge.to).is_none() {
                return Err(LayoutError::Unplaced(edge.to));
            }

            let points = if edge.is_self_loop() {
                stats.self_loops += 1;
                routing::self_loop(parent, self.config.self_loop_lateral, pass.spacing.half_y())
            } else if child.x == parent.x && child.y > parent.y {
                vec![parent.anchor(Side::South), child.anchor(Side::North)]
            } else if child.x > parent.x && child.y > parent.y {
                let start = parent.anchor(Side::East);
                vec![start, Point::new(child.x, start.y), child.anchor(Side::North)]
            } else if child.x < parent.x && child.y > parent.y {
                let end = child.anchor(Side::East);
                vec![parent.anchor(Side::South), Point::new(parent.x, end.y), end]
            } else if child.x >= parent.x && child.y < parent.y {
                let start = parent.anchor(Side::West);
                let end = child.anchor(Side::West);
                let x = start.x.min(end.x) - margin;
                vec![start, Point::new(x, start.y), Point::new(x, end.y), end]
            } else if child.x < parent.x && child.y < parent.y {
                let start = parent.anchor(Side::East);
                let end = child.anchor(Side::North);
                vec![
                    start,
                    Point::new(start.x + margin, start.y),
                    Point::new(start.x + margin, end.y - lift),
                    Point::new(end.x, end.y - lift),
                    end,
                ]
            } else {
                warn!(from = %parent.name, to = %child.name, "cannot route flow edge");
                stats.unrouted += 1;
                let (start, end) = routing::anchor_via(parent, child, child.center(), parent.center());
                vec![start, end]
            };
            graph.edge_mut(edge_id).points = points;
        }

        debug!(%stats, "flow routing");
        Ok(pass.into_report(graph, stats, started.elapsed()))
    }
}

/// Columns placement can reach. A node lands at most one column past the
/// used ones and reserves its fan east of it, every tree leaves one spare
/// column, and the edge count covers nodes that are displaced and placed
/// again.
fn column_reach(graph: &Graph) -> usize {
    let landings: usize = graph
        .nodes()
        .iter()
        .map(|node| node.outgoing().len().max(1))
        .sum();
    landings + graph.node_count() + graph.edge_count() + 1
}

/// A node whose children are placed and are being walked in order.
struct Walk {
    id: NodeId,
    children: Vec<NodeId>,
    next: usize,
}

struct Placement<'a> {
    layout: &'a FlowLayout,
    graph: &'a mut Graph,
    grid: OccupancyGrid,
    annotations: Annotations,
    spacing: Spacing,
}

impl Placement<'_> {
    fn place_trees(&mut self, starts: &[NodeId]) -> Result<(), LayoutError> {
        loop {
            let next = starts
                .iter()
                .copied()
                .find(|id| !self.annotations.is_annotated(*id));
            let Some(start) = next else { break };
            self.grow_tree(start)?;
        }
        loop {
            let next = self
                .graph
                .node_ids()
                .find(|id| !self.annotations.is_annotated(*id));
            let Some(node) = next else { break };
            self.grow_tree(node)?;
        }
        Ok(())
    }

    fn grow_tree(&mut self, root: NodeId) -> Result<(), LayoutError> {
        let column = self.next_start_column()?;
        let mut linked = self.process_graph(root, true, column, 0)?;
        while !linked.is_empty() {
            linked = self.process_linked_nodes(linked)?;
        }
        Ok(())
    }

    /// First unused column; a tree that is not the first leaves one spare
    /// column before it.
    fn next_start_column(&mut self) -> Result<i32, LayoutError> {
        let mut column = 0;
        while self.grid.column_used(column) {
            column += 1;
        }
        if column != 0 {
            self.grid.mark_column_used(column)?;
            column += 1;
        }
        Ok(column)
    }

    /// Places the children of `id` one row below it, then walks into each
    /// child that is not yet processed and does the same. Returns the parents
    /// of every node walked, deepest first, for the caller to link in.
    fn process_graph(
        &mut self,
        id: NodeId,
        place: bool,
        x: i32,
        y: i32,
    ) -> Result<Vec<NodeId>, LayoutError> {
        if place {
            self.place_node(id, x, y)?;
        }
        let mut linked = Vec::new();
        let mut stack = vec![self.place_children(id, x, y)?];
        while let Some(walk) = stack.last_mut() {
            let Some(&child) = walk.children.get(walk.next) else {
                if let Some(done) = stack.pop() {
                    linked.extend(self.graph.parents(done.id));
                }
                continue;
            };
            walk.next += 1;
            if let Some(cell) = self.mark_processed(child)? {
                stack.push(self.place_children(child, cell.x, cell.y)?);
            }
        }
        Ok(linked)
    }

    fn place_children(&mut self, id: NodeId, x: i32, y: i32) -> Result<Walk, LayoutError> {
        let children = self.graph.children(id);
        for &child in &children {
            self.place_node(child, x, y + 1)?;
        }
        Ok(Walk {
            id,
            children,
            next: 0,
        })
    }

    /// Tags a placed node as processed and returns its cell, or `None` when
    /// it was processed before.
    fn mark_processed(&mut self, id: NodeId) -> Result<Option<GridPos>, LayoutError> {
        if let Mode::Processed(_) = self.annotations.node_mode(id) {
            return Ok(None);
        }
        let cell = self
            .annotations
            .node_cell(id)
            .ok_or(LayoutError::Unplaced(id))?;
        if let Some(annotation) = self.annotations.node_mut(id) {
            annotation.mode = Mode::Processed(cell);
        }
        Ok(Some(cell))
    }

    fn process_linked_nodes(&mut self, linked: Vec<NodeId>) -> Result<Vec<NodeId>, LayoutError> {
        let mut next = Vec::new();
        for id in linked {
            if self.annotations.is_annotated(id) {
                continue;
            }
            let mut reachable = Vec::new();
            self.collect_reachable(id, &mut reachable);
            self.annotations.reset_reached(&reachable);
            for candidate in reachable {
                if self.annotations.is_annotated(candidate)
                    || !self.layout.is_start_node(self.graph, candidate)
                {
                    continue;
                }
                let column = self.next_start_column()?;
                next.extend(self.process_graph(candidate, true, column, 0)?);
            }
        }
        Ok(next)
    }

    /// Every node connected to `id` that is not yet reached, depth first with
    /// parents before children. Each one is marked reached.
    fn collect_reachable(&mut self, id: NodeId, out: &mut Vec<NodeId>) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if self.annotations.is_reached(id) {
                continue;
            }
            self.annotations.mark_reached(id);
            out.push(id);
            stack.extend(self.graph.children(id).into_iter().rev());
            stack.extend(self.graph.parents(id).into_iter().rev());
        }
    }

    /// Rows a node needs below it: itself, one spare row, and its chain of
    /// first children that are still unplaced.
    fn depth(&mut self, id: NodeId) -> i32 {
        let mut depth = 2;
        let mut visited = Vec::new();
        let mut current = id;
        loop {
            let node = self.graph.node(current);
            if self.annotations.is_annotated(current) || self.annotations.is_reached(current) {
                break;
            }
            let Some(&first) = node.outgoing().first() else {
                break;
            };
            self.annotations.mark_reached(current);
            visited.push(current);
            depth += 1;
            current = self.graph.edge(first).to;
        }
        self.annotations.reset_reached(&visited);
        depth
    }

    fn column_is_free(&self, x: i32, y: i32, depth: i32) -> bool {
        (0..depth).all(|i| {
            self.grid
                .cell(GridPos::new(x, y + i))
                .is_none_or(|state| state == CellState::Free)
        })
    }

    /// Places `id` in the first column at or east of `x` that is free for
    /// its depth. A node pushed east displaces whatever sits directly north
    /// of it, which is placed again the same way.
    fn place_node(&mut self, id: NodeId, x: i32, y: i32) -> Result<(), LayoutError> {
        let mut pending = Some((id, x, y));
        while let Some((id, x, y)) = pending.take() {
            if matches!(
                self.annotations.node_mode(id),
                Mode::Placed(_) | Mode::Processed(_)
            ) {
                continue;
            }
            if !self.grid.contains_row(y) {
                return Err(self.grid.exhausted(GridPos::new(x, y)));
            }

            let depth = self.depth(id);
            let mut offset = 0;
            let column = loop {
                let column = x + offset;
                if !self.grid.contains_column(column) {
                    return Err(self.grid.exhausted(GridPos::new(column, y)));
                }
                if self.column_is_free(column, y, depth) {
                    break column;
                }
                offset += 1;
            };

            let cell = GridPos::new(column, y);
            self.allocate(id, cell)?;

            if offset != 0 {
                let above = GridPos::new(column, y - 1);
                if let Some(CellState::Node(other)) = self.grid.cell(above) {
                    self.grid.set_cell(above, CellState::Engaged)?;
                    self.annotations.clear_node(other);
                    pending = Some((other, column, y - 1));
                }
            }
        }
        Ok(())
    }

    fn allocate(&mut self, id: NodeId, cell: GridPos) -> Result<(), LayoutError> {
        self.graph.set_position(
            id,
            cell.x as f32 * self.spacing.x,
            cell.y as f32 * self.spacing.y,
        );
        self.grid.set_cell(cell, CellState::Node(id))?;
        self.grid.mark_column_used(cell.x)?;
        self.grid.mark_row_used(cell.y)?;
        let fan = self.graph.node(id).outgoing().len() as i32;
        for i in 1..fan {
            let pos = GridPos::new(cell.x + i, cell.y);
            if self.grid.cell(pos) == Some(CellState::Free) {
                self.grid.set_cell(pos, CellState::Reserved)?;
                self.grid.mark_column_used(pos.x)?;
            }
        }
        self.annotations.set_node(id, Annotation::placed(cell));
        Ok(())
    }

    /// Moves a branching node over one of its children when none of them
    /// sits in its column.
    fn optimise(&mut self) -> Result<(), LayoutError> {
        for id in self.graph.node_ids() {
            if self.graph.node(id).outgoing().len() <= 1 {
                continue;
            }
            let Some(cell) = self.annotations.node_cell(id) else {
                continue;
            };
            let children = self.graph.children(id);
            let columns: Vec<i32> = children
                .iter()
                .filter_map(|child| self.annotations.node_cell(*child))
                .map(|child| child.x)
                .collect();
            if columns.contains(&cell.x) {
                continue;
            }
            for column in columns {
                let target = GridPos::new(column, cell.y);
                if matches!(self.grid.cell(target), Some(state) if !state.is_node()) {
                    self.grid.set_cell(cell, CellState::Free)?;
                    self.allocate_moved(id, target)?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn allocate_moved(&mut self, id: NodeId, target: GridPos) -> Result<(), LayoutError> {
        let mode = self.annotations.node_mode(id);
        self.graph.set_position(
            id,
            target.x as f32 * self.spacing.x,
            target.y as f32 * self.spacing.y,
        );
        self.grid.set_cell(target, CellState::Node(id))?;
        self.grid.mark_column_used(target.x)?;
        let moved = match mode {
            Mode::Processed(_) => Mode::Processed(target),
            _ => Mode::Placed(target),
        };
        if let Some(annotation) = self.annotations.node_mut(id) {
            annotation.mode = moved;
        }
        Ok(())
    }
}
