use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::config::{HubThresholds, SmartConfig};
use crate::ir::{EdgeId, Graph, NodeId, Point, Side};

use super::annotation::{Annotation, Annotations, Mode};
use super::grid::{Axis, CellState, GridPos, OccupancyGrid, next_channel};
use super::routing::{self, RouteStats};
use super::{LayoutError, LayoutKind, LayoutReport, LayoutStrategy, NodePass, Spacing};

/// Grid-based placement that grows each connected component from its most
/// connected node, followed by diversion routing around occupied cells.
#[derive(Debug, Clone, Default)]
pub struct SmartLayout {
    config: SmartConfig,
}

impl SmartLayout {
    pub fn new(config: SmartConfig) -> Self {
        Self { config }
    }

    fn spacing(&self, graph: &Graph) -> Spacing {
        let nodes = graph.node_count();
        let edges = graph.edge_count();
        let ratio = self.config.distance_ratio(nodes, edges);
        let multiplier = self.config.distance_multiplier(edges);
        let (half_width, half_height) = graph.largest_half_extent();
        let x = (multiplier * ratio)
            .trunc()
            .max(2.0 * half_width + self.config.node_gap);
        let y = (multiplier / ratio)
            .trunc()
            .max(2.0 * half_height + self.config.node_gap);
        Spacing {
            distance_ratio: ratio,
            distance_multiplier: multiplier,
            x,
            y,
            edge: (x / self.config.edge_distance_divisor).trunc(),
        }
    }

    /// The configured sizing, widened to the rows placement can reach and to
    /// one column per node and reserved cell, with a spare line on each side
    /// for outer diversions.
    fn grid(&self, graph: &Graph, uncompress: bool) -> OccupancyGrid {
        let sizing = if uncompress {
            &self.config.uncompressed_grid
        } else {
            &self.config.compact_grid
        };
        let (dim_x, dim_y) = sizing.dims(graph.node_count());
        let (north, south) = row_reach(graph, &self.config.hubs);
        let reserved: usize = if uncompress {
            graph
                .nodes()
                .iter()
                .map(|node| node.incoming().len().max(node.outgoing().len()).saturating_sub(1))
                .sum()
        } else {
            0
        };
        let rows = 2 * (north.max(south) + 1) + 1;
        let columns = 2 * (graph.node_count() + reserved + 1) + 1;
        OccupancyGrid::new(dim_x.max(columns), dim_y.max(rows))
    }
}

impl LayoutStrategy for SmartLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Smart
    }

    fn layout_nodes(&self, graph: &mut Graph) -> Result<NodePass, LayoutError> {
        let started = Instant::now();
        let mut pass = NodePass::new(LayoutKind::Smart, graph);
        let edges = graph.edge_count();
        pass.spacing = self.spacing(graph);
        pass.adaptive_edges = edges <= self.config.adaptive_edge_limit;
        pass.uncompress = edges <= self.config.uncompress_edge_limit;
        if graph.is_empty() {
            pass.elapsed = started.elapsed();
            return Ok(pass);
        }

        let grid = self.grid(graph, pass.uncompress);
        debug!(
            spacing_x = pass.spacing.x,
            spacing_y = pass.spacing.y,
            grid = ?grid.dims(),
            uncompress = pass.uncompress,
            "smart placement"
        );

        let mut placement = Placement {
            graph,
            hubs: &self.config.hubs,
            grid,
            annotations: std::mem::take(&mut pass.annotations),
            spacing: pass.spacing,
            uncompress: pass.uncompress,
        };
        placement.run()?;
        pass.annotations = placement.annotations;
        pass.grid = Some(placement.grid);
        pass.elapsed = started.elapsed();
        Ok(pass)
    }

    fn layout_edges(&self, graph: &mut Graph, mut pass: NodePass) -> Result<LayoutReport, LayoutError> {
        pass.check(graph)?;
        let started = Instant::now();
        let mut stats = RouteStats::default();
        let lift = pass.spacing.half_y();

        if let Some(grid) = pass.grid.as_mut() {
            for node in graph.node_ids() {
                if pass.annotations.node_cell(node).is_none() {
                    return Err(LayoutError::Unplaced(node));
                }
            }
            if pass.adaptive_edges {
                stats = route_edges(
                    graph,
                    &self.config,
                    grid,
                    &mut pass.annotations,
                    pass.spacing,
                )?;
            } else {
                stats.self_loops =
                    routing::anchor_all_straight(graph, self.config.self_loop_lateral, lift);
            }
        }

        debug!(%stats, "smart routing");
        Ok(pass.into_report(graph, stats, started.elapsed()))
    }
}

// ── Node placement ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toward {
    Parents,
    Children,
}

/// Row step and number of spacer rows between a node and its `index`-th
/// neighbour. `far` is the neighbour's fan towards the node, `near` the
/// node's fan towards the neighbour and `other` the node's opposite fan.
pub(super) fn neighbour_step(
    hubs: &HubThresholds,
    far: usize,
    near: usize,
    other: usize,
    index: usize,
) -> (i32, i32) {
    let index = index as i32;
    if far > hubs.heavy {
        (3, 2)
    } else if far > hubs.many {
        (2, 1)
    } else if near > hubs.massive {
        (3 + index % 6, 2)
    } else if near > hubs.heavy {
        (3 + index % 4, 2)
    } else if near > hubs.dense {
        (2 + index % 3, 1)
    } else if near > hubs.crowded {
        (2 + index % 2, 1)
    } else if near > hubs.many {
        (2, 1)
    } else if other > hubs.heavy {
        (3, 2)
    } else if other > hubs.many {
        (2, 1)
    } else {
        (1, 0)
    }
}

/// Bounds on how many rows north and south of row 0 placement can use.
///
/// A node lands at most its largest neighbour step away from the node that
/// placed it. Only nodes with two or more edges pass placement on, so a
/// component reaches at most the sum of their steps plus one final step.
/// Components are stacked south with a blank row between them and the
/// isolated block starts two rows below the last one.
fn row_reach(graph: &Graph, hubs: &HubThresholds) -> (usize, usize) {
    let mut step = vec![0usize; graph.node_count()];
    for id in graph.node_ids() {
        let node = graph.node(id);
        let (ins, outs) = (node.incoming().len(), node.outgoing().len());
        for (index, &edge_id) in node.outgoing().iter().enumerate() {
            let child = graph.edge(edge_id).to;
            let far = graph.node(child).incoming().len();
            let (rows, _) = neighbour_step(hubs, far, outs, ins, index);
            step[child.0] = step[child.0].max(rows as usize);
        }
        for (index, &edge_id) in node.incoming().iter().enumerate() {
            let parent = graph.edge(edge_id).from;
            let far = graph.node(parent).outgoing().len();
            let (rows, _) = neighbour_step(hubs, far, ins, outs, index);
            step[parent.0] = step[parent.0].max(rows as usize);
        }
    }

    let mut seen = vec![false; graph.node_count()];
    let (mut north, mut south) = (0, 0);
    let (mut components, mut isolated) = (0usize, 0usize);
    for root in graph.node_ids() {
        if seen[root.0] {
            continue;
        }
        seen[root.0] = true;
        if graph.node(root).degree() == 0 {
            isolated += 1;
            continue;
        }
        let (mut inner, mut last) = (0, 0);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if graph.node(id).degree() >= 2 {
                inner += step[id.0];
            }
            last = last.max(step[id.0]);
            for next in graph.parents(id).into_iter().chain(graph.children(id)) {
                if !seen[next.0] {
                    seen[next.0] = true;
                    stack.push(next);
                }
            }
        }
        let span = inner + last;
        north = north.max(span);
        south += span;
        components += 1;
    }
    south += 2 * components.saturating_sub(1);
    if isolated > 0 {
        south += 2 + isolated.div_ceil(2);
    }
    (north, south)
}

/// Pending work of the depth-first placement walk.
#[derive(Debug, Clone, Copy)]
enum Step {
    Place { id: NodeId, x: i32, y: i32 },
    /// Marks `count` rows after `row` in direction `sign` as used.
    Spacers { row: i32, sign: i32, count: i32 },
}

struct Placement<'a> {
    graph: &'a mut Graph,
    hubs: &'a HubThresholds,
    grid: OccupancyGrid,
    annotations: Annotations,
    spacing: Spacing,
    uncompress: bool,
}

impl Placement<'_> {
    fn run(&mut self) -> Result<(), LayoutError> {
        let mut isolated = Vec::new();
        for id in self.graph.node_ids() {
            if self.graph.node(id).degree() == 0 {
                self.annotations.set_node(id, Annotation::marked());
                isolated.push(id);
            }
        }

        let mut row = 0;
        while let Some(start) = self.best_start_node() {
            self.place_single_node(start, 0, row)?;
            while self.grid.row_used(row) {
                row += 1;
            }
            row += 1;
        }

        self.place_isolated(&isolated)
    }

    /// Highest-degree node without an annotation; ties go to the later node.
    fn best_start_node(&self) -> Option<NodeId> {
        let mut best: Option<(NodeId, usize)> = None;
        for id in self.graph.node_ids() {
            if self.annotations.is_annotated(id) {
                continue;
            }
            let degree = self.graph.node(id).degree();
            if best.is_none_or(|(_, top)| degree >= top) {
                best = Some((id, degree));
            }
        }
        best.map(|(id, _)| id)
    }

    fn place_isolated(&mut self, isolated: &[NodeId]) -> Result<(), LayoutError> {
        if isolated.is_empty() {
            return Ok(());
        }
        let width = ((isolated.len() as f64).sqrt() as i32) / 2;
        let mut y = self.grid.last_used_row().map_or(0, |row| row + 2);
        let mut x = 0;
        for &id in isolated {
            self.annotations.clear_node(id);
            self.place_single_node(id, x, y)?;
            if x <= 0 {
                x -= 1;
            }
            x = -x;
            if x <= -width {
                y += 1;
                x = 0;
            }
        }
        Ok(())
    }

    /// Places `id` near `(x, y)`, then its parents and children depth first.
    /// Nodes that already carry an annotation are skipped.
    fn place_single_node(&mut self, id: NodeId, x: i32, y: i32) -> Result<(), LayoutError> {
        let mut stack = vec![Step::Place { id, x, y }];
        while let Some(step) = stack.pop() {
            match step {
                Step::Place { id, x, y } => {
                    if self.annotations.is_annotated(id) {
                        continue;
                    }
                    let cell = self.free_cell(id, x, y)?;
                    self.commit(id, cell)?;
                    let first = stack.len();
                    self.push_neighbours(&mut stack, id, cell, Toward::Parents);
                    self.push_neighbours(&mut stack, id, cell, Toward::Children);
                    stack[first..].reverse();
                }
                Step::Spacers { row, sign, count } => {
                    for k in 1..=count {
                        self.grid.mark_row_used(row + sign * k)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Nearest acceptable cell on row `y`, searching outward from column `x`.
    fn free_cell(&mut self, id: NodeId, x: i32, y: i32) -> Result<GridPos, LayoutError> {
        self.grid.mark_row_used(y)?;

        let single = self.graph.node(id).degree() == 1;
        let grid = &self.grid;
        let acceptable = |pos: GridPos| match grid.cell(pos) {
            Some(CellState::Free) => true,
            Some(CellState::Reserved) => single,
            _ => false,
        };

        if acceptable(GridPos::new(x, y)) {
            return Ok(GridPos::new(x, y));
        }
        let mut offset = 1;
        loop {
            let east = GridPos::new(x + offset, y);
            let west = GridPos::new(x - offset, y);
            if !grid.contains(east) && !grid.contains(west) {
                return Err(grid.exhausted(east));
            }
            if acceptable(east) {
                return Ok(east);
            }
            if acceptable(west) {
                return Ok(west);
            }
            offset += 1;
        }
    }

    fn commit(&mut self, id: NodeId, cell: GridPos) -> Result<(), LayoutError> {
        self.grid.mark_column_used(cell.x)?;
        let mut px = cell.x as f32 * self.spacing.x;
        let py = cell.y as f32 * self.spacing.y;
        // Odd rows are interlaced half a column west.
        if cell.y % 2 != 0 {
            px -= self.spacing.half_x();
        }
        self.graph.set_position(id, px, py);
        self.annotations.set_node(id, Annotation::placed(cell));
        self.grid.set_cell(cell, CellState::Node(id))?;

        if self.uncompress {
            let node = self.graph.node(id);
            let reserve = node.incoming().len().max(node.outgoing().len()).saturating_sub(1);
            let mut offset = 0;
            for _ in 0..reserve {
                if offset >= 0 {
                    offset += 1;
                }
                let pos = GridPos::new(cell.x + offset, cell.y);
                if self.grid.cell(pos) == Some(CellState::Free) {
                    self.grid.set_cell(pos, CellState::Reserved)?;
                }
                offset = -offset;
            }
        }
        Ok(())
    }

    /// Queues one placement per edge towards `toward`, each followed by its
    /// spacer rows, in edge order.
    fn push_neighbours(&self, stack: &mut Vec<Step>, id: NodeId, cell: GridPos, toward: Toward) {
        let node = self.graph.node(id);
        let (edges, near, other, sign) = match toward {
            Toward::Parents => (node.incoming(), node.incoming().len(), node.outgoing().len(), -1),
            Toward::Children => (node.outgoing(), node.outgoing().len(), node.incoming().len(), 1),
        };

        for (index, &edge_id) in edges.iter().enumerate() {
            let edge = self.graph.edge(edge_id);
            let (neighbour, far) = match toward {
                Toward::Parents => (edge.from, self.graph.node(edge.from).outgoing().len()),
                Toward::Children => (edge.to, self.graph.node(edge.to).incoming().len()),
            };
            let (step, spacers) = neighbour_step(self.hubs, far, near, other, index);
            stack.push(Step::Place {
                id: neighbour,
                x: cell.x,
                y: cell.y + sign * step,
            });
            stack.push(Step::Spacers {
                row: cell.y,
                sign,
                count: spacers,
            });
        }
    }
}

// ── Edge routing ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fan {
    Incoming,
    Outgoing,
}

/// Classifies every edge, anchors its endpoints and adds diversion points.
/// Every endpoint must already carry a grid cell in `annotations`.
pub(super) fn route_edges(
    graph: &mut Graph,
    config: &SmartConfig,
    grid: &mut OccupancyGrid,
    annotations: &mut Annotations,
    spacing: Spacing,
) -> Result<RouteStats, LayoutError> {
    let mut router = Router {
        graph,
        config,
        grid,
        annotations,
        spacing,
        ports: HashMap::new(),
        loops: HashMap::new(),
        stats: RouteStats::default(),
    };
    router.run()?;
    Ok(router.stats)
}

struct Router<'a> {
    graph: &'a mut Graph,
    config: &'a SmartConfig,
    grid: &'a mut OccupancyGrid,
    annotations: &'a mut Annotations,
    spacing: Spacing,
    /// Next channel per node side for endpoints of undiverted edges.
    ports: HashMap<(NodeId, Side), i32>,
    /// Self-loops already drawn per node; each further one is lifted higher.
    loops: HashMap<NodeId, usize>,
    stats: RouteStats,
}

impl Router<'_> {
    fn run(&mut self) -> Result<(), LayoutError> {
        for edge_id in self.graph.edge_ids() {
            let edge = self.graph.edge(edge_id);
            let points = vec![
                self.graph.node(edge.from).center(),
                self.graph.node(edge.to).center(),
            ];
            self.graph.edge_mut(edge_id).points = points;
        }

        for edge_id in self.graph.edge_ids() {
            if let Some(mode) = self.classify(edge_id)? {
                self.annotations.set_edge(edge_id, Annotation::new(mode));
            }
        }

        for edge_id in self.graph.edge_ids() {
            let mode = self.prepare(edge_id);
            if let Some(annotation) = self.annotations.edge_mut(edge_id) {
                annotation.mode = mode;
            }
            self.anchor(edge_id, mode);
        }

        for edge_id in self.graph.edge_ids() {
            self.divert(edge_id)?;
        }
        Ok(())
    }

    fn cell(&self, id: NodeId) -> Result<GridPos, LayoutError> {
        self.annotations
            .node_cell(id)
            .ok_or(LayoutError::Unplaced(id))
    }

    /// No node-occupied cell lies beyond `cell` towards `side`.
    fn is_outer(&self, cell: GridPos, side: Side) -> bool {
        let (dx, dy) = side.grid_step();
        let mut pos = GridPos::new(cell.x + dx, cell.y + dy);
        while let Some(state) = self.grid.cell(pos) {
            if !state.is_passable() {
                return false;
            }
            pos = GridPos::new(pos.x + dx, pos.y + dy);
        }
        true
    }

    /// Few of the node's neighbours on the `fan` side have further edges.
    fn is_simple_tree(&self, id: NodeId, fan: Fan) -> bool {
        let node = self.graph.node(id);
        let limit = self.config.simple_tree_limit(node.degree());
        let edges = match fan {
            Fan::Incoming => node.incoming(),
            Fan::Outgoing => node.outgoing(),
        };
        let branching = edges
            .iter()
            .filter(|edge_id| {
                let edge = self.graph.edge(**edge_id);
                let neighbour = match fan {
                    Fan::Incoming => edge.from,
                    Fan::Outgoing => edge.to,
                };
                self.graph.node(neighbour).degree() > 1
            })
            .count();
        branching <= limit
    }

    fn classify(&self, edge_id: EdgeId) -> Result<Option<Mode>, LayoutError> {
        let edge = self.graph.edge(edge_id);
        let (from, to) = (edge.from, edge.to);
        if from == to {
            return Ok(Some(Mode::SelfCall));
        }
        let from_cell = self.cell(from)?;
        let to_cell = self.cell(to)?;
        if from_cell.y == to_cell.y {
            return Ok(Some(Mode::InnerDiversion));
        }

        let northbound = to_cell.y < from_cell.y;
        for side in Side::ALL {
            if self.is_outer(from_cell, side)
                && self.is_outer(to_cell, side)
                && (northbound
                    || !self.is_simple_tree(from, Fan::Outgoing)
                    || !self.is_simple_tree(to, Fan::Incoming))
            {
                return Ok(Some(Mode::OuterDiversion {
                    side,
                    start: Point::default(),
                    end: Point::default(),
                }));
            }
        }

        let jump = (from_cell.y - to_cell.y).abs();
        let from_fan = self.graph.node(from).outgoing().len();
        let to_fan = self.graph.node(to).incoming().len();
        if from_fan <= to_fan {
            if jump <= 1 || self.is_simple_tree(to, Fan::Incoming) {
                return Ok(None);
            }
            let row = to_cell.y + (from_cell.y - to_cell.y).signum();
            Ok(Some(Mode::Incoming {
                cell: GridPos::new(from_cell.x, row),
                via: Point::default(),
            }))
        } else {
            if jump <= 1 || self.is_simple_tree(from, Fan::Outgoing) {
                return Ok(None);
            }
            let row = from_cell.y + (to_cell.y - from_cell.y).signum();
            Ok(Some(Mode::Outgoing {
                cell: GridPos::new(to_cell.x, row),
                via: Point::default(),
            }))
        }
    }

    /// Fills in the literal hint coordinates of a classified edge.
    fn prepare(&self, edge_id: EdgeId) -> Mode {
        let edge = self.graph.edge(edge_id);
        let from = self.graph.node(edge.from).center();
        let to = self.graph.node(edge.to).center();
        let xs = self.spacing.x;
        let ys = self.spacing.y;
        let line = |found: Option<i32>| found.unwrap_or(0);

        match self.annotations.edge_mode(edge_id) {
            Mode::OuterDiversion { side, .. } => {
                let (start, end) = match side {
                    Side::West => {
                        let x = (line(self.grid.first_used_column()) - 1) as f32 * xs;
                        (Point::new(x, from.y), Point::new(x, to.y))
                    }
                    Side::East => {
                        let x = (line(self.grid.last_used_column()) + 1) as f32 * xs;
                        (Point::new(x, from.y), Point::new(x, to.y))
                    }
                    Side::South => {
                        let y = (line(self.grid.last_used_row()) + 1) as f32 * ys;
                        (Point::new(from.x, y), Point::new(to.x, y))
                    }
                    Side::North => {
                        let y = (line(self.grid.first_used_row()) - 1) as f32 * ys;
                        (Point::new(from.x, y), Point::new(to.x, y))
                    }
                };
                Mode::OuterDiversion { side, start, end }
            }
            Mode::Incoming { cell, .. } => Mode::Incoming {
                cell,
                via: Point::new(from.x, cell.y as f32 * ys),
            },
            Mode::Outgoing { cell, .. } => Mode::Outgoing {
                cell,
                via: Point::new(to.x, cell.y as f32 * ys),
            },
            other => other,
        }
    }

    fn anchor(&mut self, edge_id: EdgeId, mode: Mode) {
        let edge = self.graph.edge(edge_id);
        let from = self.graph.node(edge.from);
        let to = self.graph.node(edge.to);
        let (start, end) = match mode {
            Mode::SelfCall | Mode::InnerDiversion => {
                (from.anchor(Side::North), to.anchor(Side::North))
            }
            Mode::OuterDiversion { start, end, .. } => routing::anchor_via(from, to, start, end),
            Mode::Incoming { via, .. } | Mode::Outgoing { via, .. } => {
                routing::anchor_via(from, to, via, via)
            }
            _ => {
                let (from_id, to_id) = (edge.from, edge.to);
                let (start, end) = routing::anchor_via(from, to, to.center(), from.center());
                let start = self.spread(from_id, start, self.config.source_port_step);
                let end = self.spread(to_id, end, self.config.target_port_step);
                (start, end)
            }
        };
        self.graph.edge_mut(edge_id).points = vec![start, end];
    }

    /// Slides an endpoint along its side by the side's next channel times
    /// `step`, so edges sharing a side keep distinct endpoints.
    fn spread(&mut self, id: NodeId, point: Point, step: f32) -> Point {
        let node = self.graph.node(id);
        let Some(side) = node.boundary_side(point) else {
            return point;
        };
        let channel = self.ports.entry((id, side)).or_insert(0);
        let current = *channel;
        *channel = next_channel(current);
        routing::shift_along_side(node, point, current as f32 * step)
    }

    fn divert(&mut self, edge_id: EdgeId) -> Result<(), LayoutError> {
        let mode = self.annotations.edge_mode(edge_id);
        let edge = self.graph.edge(edge_id);
        let (from, to) = (edge.from, edge.to);
        let Some((&start, &end)) = edge.points.first().zip(edge.points.last()) else {
            return Ok(());
        };
        let xs = self.spacing.x;
        let ys = self.spacing.y;
        let x8 = self.spacing.eighth_x();
        let y8 = self.spacing.eighth_y();
        let gap = self.spacing.edge;

        let points = match mode {
            Mode::SelfCall => {
                self.stats.self_loops += 1;
                let nth = self.loops.entry(from).or_insert(0);
                let lift = self.spacing.half_y() + *nth as f32 * gap;
                *nth += 1;
                routing::self_loop(self.graph.node(from), self.config.self_loop_lateral, lift)
            }
            Mode::InnerDiversion => {
                self.stats.inner += 1;
                let row = self.cell(from)?.y;
                let offset = self.grid.edge_channel_offset(Axis::Row, row)? as f32 * gap;
                let lift = self.spacing.half_y() + offset;
                let inward = if start.x < end.x { x8 } else { -x8 };
                vec![
                    start,
                    Point::new(start.x + inward, start.y - lift),
                    Point::new(end.x - inward, end.y - lift),
                    end,
                ]
            }
            Mode::OuterDiversion { side, .. } => {
                self.stats.outer += 1;
                let a = self.cell(from)?;
                let b = self.cell(to)?;
                match side {
                    Side::West | Side::East => {
                        let (origin, step) = if side == Side::West {
                            (a.x.min(b.x), -1)
                        } else {
                            (a.x.max(b.x), 1)
                        };
                        let column = self.free_line(Axis::Column, origin, step, a.y.min(b.y), (a.y - b.y).abs())?;
                        let offset = self.grid.edge_channel_offset(Axis::Column, column)? as f32 * gap;
                        let mut x = column as f32 * xs + offset;
                        if side == Side::West {
                            x -= self.spacing.half_x();
                        }
                        let toward = if start.y < end.y { y8 } else { -y8 };
                        vec![
                            start,
                            Point::new(x, start.y + toward),
                            Point::new(x, end.y - toward),
                            end,
                        ]
                    }
                    Side::South | Side::North => {
                        let (origin, step) = if side == Side::North {
                            (a.y.min(b.y), -1)
                        } else {
                            (a.y.max(b.y), 1)
                        };
                        let row = self.free_line(Axis::Row, origin, step, a.x.min(b.x), (a.x - b.x).abs())?;
                        let offset = self.grid.edge_channel_offset(Axis::Row, row)? as f32 * gap;
                        let y = row as f32 * ys + offset;
                        let toward = if start.x < end.x { x8 } else { -x8 };
                        vec![
                            start,
                            Point::new(start.x + toward, y),
                            Point::new(end.x - toward, y),
                            end,
                        ]
                    }
                }
            }
            Mode::Incoming { cell, .. } => {
                self.stats.incoming += 1;
                let offset = self.grid.edge_channel_offset(Axis::Column, cell.x)? as f32 * gap;
                vec![start, Point::new(start.x + offset, cell.y as f32 * ys), end]
            }
            Mode::Outgoing { cell, .. } => {
                self.stats.outgoing += 1;
                let offset = self.grid.edge_channel_offset(Axis::Column, cell.x)? as f32 * gap;
                vec![start, Point::new(end.x + offset, cell.y as f32 * ys), end]
            }
            _ => return Ok(()),
        };

        if let Some(annotation) = self.annotations.edge_mut(edge_id) {
            annotation.points = points[1..points.len() - 1].to_vec();
        }
        self.graph.edge_mut(edge_id).points = points;
        Ok(())
    }

    /// First grid line beyond `origin` (moving by `step`) whose cells across
    /// `start..=start + span` on the other axis are all passable.
    fn free_line(
        &self,
        axis: Axis,
        origin: i32,
        step: i32,
        start: i32,
        span: i32,
    ) -> Result<i32, LayoutError> {
        let mut line = origin + step;
        loop {
            let inside = match axis {
                Axis::Column => self.grid.contains_column(line),
                Axis::Row => self.grid.contains_row(line),
            };
            let first = match axis {
                Axis::Column => GridPos::new(line, start),
                Axis::Row => GridPos::new(start, line),
            };
            if !inside {
                return Err(self.grid.exhausted(first));
            }
            let free = (0..=span).all(|i| {
                let pos = match axis {
                    Axis::Column => GridPos::new(line, start + i),
                    Axis::Row => GridPos::new(start + i, line),
                };
                self.grid.cell(pos).is_none_or(CellState::is_passable)
            });
            if free {
                return Ok(line);
            }
            line += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(graph: &mut Graph) -> (NodePass, LayoutReport) {
        let strategy = SmartLayout::default();
        let pass = strategy.layout_nodes(graph).unwrap();
        let snapshot = NodePass {
            grid: pass.grid.clone(),
            annotations: pass.annotations.clone(),
            ..NodePass::new(LayoutKind::Smart, graph)
        };
        let report = strategy.layout_edges(graph, pass).unwrap();
        (snapshot, report)
    }

    #[test]
    fn hub_neighbours_interleave_over_rows() {
        let hubs = HubThresholds::default();
        let rows: Vec<i32> = (0..12)
            .map(|i| neighbour_step(&hubs, 1, 300, 0, i).0)
            .collect();
        assert_eq!(rows, vec![3, 4, 5, 6, 7, 8, 3, 4, 5, 6, 7, 8]);
        assert_eq!(neighbour_step(&hubs, 150, 1, 0, 0), (3, 2));
        assert_eq!(neighbour_step(&hubs, 6, 1, 0, 0), (2, 1));
        assert_eq!(neighbour_step(&hubs, 1, 30, 0, 1), (3, 1));
        assert_eq!(neighbour_step(&hubs, 1, 1, 1, 0), (1, 0));
    }

    #[test]
    fn single_node_lands_on_origin() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let (pass, report) = layout(&mut graph);
        assert_eq!(graph.node(a).center(), Point::new(0.0, 0.0));
        assert_eq!(pass.annotations.node_cell(a), Some(GridPos::new(0, 0)));
        assert_eq!(report.stats, RouteStats::default());
    }

    #[test]
    fn parent_sits_one_row_north() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let b = graph.add_node("B", 20.0, 10.0);
        graph.add_edge(a, b).unwrap();
        let (pass, _) = layout(&mut graph);
        assert_eq!(pass.annotations.node_cell(b), Some(GridPos::new(0, 0)));
        assert_eq!(pass.annotations.node_cell(a), Some(GridPos::new(0, -1)));
        let (na, nb) = (graph.node(a), graph.node(b));
        assert_eq!(na.y, -250.0);
        assert_eq!(na.x, -125.0);
        assert_eq!(
            graph.edges()[0].points,
            vec![na.anchor(Side::South), nb.anchor(Side::North)]
        );
    }

    #[test]
    fn opposite_edges_on_one_row_get_distinct_inner_diversions() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let b = graph.add_node("B", 20.0, 10.0);
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, a).unwrap();
        graph.set_position(a, 0.0, 0.0);
        graph.set_position(b, 250.0, 0.0);

        let mut grid = OccupancyGrid::new(10, 10);
        let mut annotations = Annotations::new(2, 2);
        for (id, x) in [(a, 0), (b, 1)] {
            let cell = GridPos::new(x, 0);
            grid.set_cell(cell, CellState::Node(id)).unwrap();
            grid.mark_column_used(x).unwrap();
            annotations.set_node(id, Annotation::placed(cell));
        }
        grid.mark_row_used(0).unwrap();
        let spacing = Spacing {
            distance_ratio: 1.0,
            distance_multiplier: 250.0,
            x: 250.0,
            y: 250.0,
            edge: 16.0,
        };

        let stats = route_edges(
            &mut graph,
            &SmartConfig::default(),
            &mut grid,
            &mut annotations,
            spacing,
        )
        .unwrap();
        assert_eq!(stats.inner, 2);

        let forward = &graph.edges()[0].points;
        let back = &graph.edges()[1].points;
        assert_eq!(forward.len(), 4);
        assert_eq!(back.len(), 4);
        assert_eq!(forward[0], graph.node(a).anchor(Side::North));
        assert_eq!(forward[3], graph.node(b).anchor(Side::North));
        assert_eq!(forward[1], Point::new(31.0, -10.0 - 125.0));
        assert_eq!(back[1], Point::new(250.0 - 31.0, -10.0 - 125.0 - 16.0));
        assert_ne!(forward, back);
    }

    #[test]
    fn back_edge_of_a_pair_is_diverted_west() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let b = graph.add_node("B", 20.0, 10.0);
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, a).unwrap();
        let (pass, report) = layout(&mut graph);
        assert_eq!(report.stats.outer, 1);
        assert!(matches!(
            pass.annotations.node_cell(a),
            Some(GridPos { x: 0, y: -1 })
        ));
        assert_eq!(graph.edges()[0].points.len(), 2);
        let back = &graph.edges()[1].points;
        assert_eq!(back.len(), 4);
        assert_eq!(back[0], graph.node(b).anchor(Side::West));
        assert_eq!(back[3], graph.node(a).anchor(Side::West));
        // Column -1, interlaced half a column further west.
        assert_eq!(back[1].x, -250.0 - 125.0);
        assert_eq!(back[1].x, back[2].x);
    }

    #[test]
    fn self_loop_is_lifted_half_a_row() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        graph.add_edge(a, a).unwrap();
        let (_, report) = layout(&mut graph);
        assert_eq!(report.stats.self_loops, 1);
        let points = &graph.edges()[0].points;
        let north = graph.node(a).anchor(Side::North);
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], Point::new(north.x - 40.0, north.y - 125.0));
        assert_eq!(points[2], Point::new(north.x + 40.0, north.y - 125.0));
    }

    #[test]
    fn hub_children_spread_over_six_rows() {
        let mut graph = Graph::new();
        let hub = graph.add_node("hub", 20.0, 10.0);
        for i in 0..300 {
            let child = graph.add_node(format!("c{i}"), 20.0, 10.0);
            graph.add_edge(hub, child).unwrap();
        }
        let pass = SmartLayout::default().layout_nodes(&mut graph).unwrap();
        assert_eq!(pass.annotations.node_cell(hub), Some(GridPos::new(0, 0)));
        let mut rows: Vec<i32> = graph
            .node_ids()
            .skip(1)
            .filter_map(|id| pass.annotations.node_cell(id).map(|cell| cell.y))
            .collect();
        rows.sort_unstable();
        rows.dedup();
        assert_eq!(rows, vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn isolated_nodes_go_below_components() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let b = graph.add_node("B", 20.0, 10.0);
        let lone = graph.add_node("lone", 20.0, 10.0);
        graph.add_edge(a, b).unwrap();
        let pass = SmartLayout::default().layout_nodes(&mut graph).unwrap();
        assert_eq!(pass.annotations.node_cell(lone), Some(GridPos::new(0, 2)));
    }

    #[test]
    fn parallel_edges_get_distinct_endpoints() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let b = graph.add_node("B", 20.0, 10.0);
        graph.add_edge(a, b).unwrap();
        graph.add_edge(a, b).unwrap();
        graph.add_edge(a, b).unwrap();
        let (_, report) = layout(&mut graph);
        assert_eq!(report.stats.diversions(), 0);

        let (na, nb) = (graph.node(a), graph.node(b));
        let (south, north) = (na.anchor(Side::South), nb.anchor(Side::North));
        let edges = graph.edges();
        assert_eq!(edges[0].points, vec![south, north]);
        assert_eq!(
            edges[1].points,
            vec![
                Point::new(south.x + 5.0, south.y),
                Point::new(north.x + 20.0, north.y)
            ]
        );
        assert_eq!(
            edges[2].points,
            vec![
                Point::new(south.x - 5.0, south.y),
                Point::new(north.x - 20.0, north.y)
            ]
        );
        for edge in edges {
            assert_eq!(na.boundary_side(edge.points[0]), Some(Side::South));
            assert_eq!(nb.boundary_side(edge.points[1]), Some(Side::North));
        }
    }

    #[test]
    fn repeated_self_loops_are_stacked() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        graph.add_edge(a, a).unwrap();
        graph.add_edge(a, a).unwrap();
        let (_, report) = layout(&mut graph);
        assert_eq!(report.stats.self_loops, 2);
        let north = graph.node(a).anchor(Side::North);
        let lift = report.spacing.half_y();
        let gap = report.spacing.edge;
        assert_eq!(graph.edges()[0].points[1].y, north.y - lift);
        assert_eq!(graph.edges()[1].points[1].y, north.y - lift - gap);
        assert_ne!(graph.edges()[0].points, graph.edges()[1].points);
    }

    #[test]
    fn row_reach_counts_components_and_isolated_nodes() {
        let hubs = HubThresholds::default();
        let mut chain = Graph::new();
        let ids: Vec<NodeId> = (0..3)
            .map(|i| chain.add_node(format!("c{i}"), 20.0, 10.0))
            .collect();
        chain.add_edge(ids[0], ids[1]).unwrap();
        chain.add_edge(ids[1], ids[2]).unwrap();
        assert_eq!(row_reach(&chain, &hubs), (2, 2));

        let mut pairs = Graph::new();
        for i in 0..3 {
            let a = pairs.add_node(format!("a{i}"), 20.0, 10.0);
            let b = pairs.add_node(format!("b{i}"), 20.0, 10.0);
            pairs.add_edge(b, a).unwrap();
        }
        pairs.add_node("lone", 20.0, 10.0);
        // Three one-row spans, two blank rows between them, then the
        // isolated block two rows further down.
        assert_eq!(row_reach(&pairs, &hubs), (1, 3 + 4 + 3));
    }

    #[test]
    fn hub_reach_counts_its_widest_step_once() {
        let mut graph = Graph::new();
        let hub = graph.add_node("hub", 20.0, 10.0);
        for i in 0..300 {
            let child = graph.add_node(format!("c{i}"), 20.0, 10.0);
            graph.add_edge(hub, child).unwrap();
        }
        // The hub sits three rows from a child; children reach eight rows.
        assert_eq!(row_reach(&graph, &HubThresholds::default()), (11, 11));
    }

    #[test]
    fn exhausted_grid_is_reported() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 20.0, 10.0);
        let mut placement = Placement {
            graph: &mut graph,
            hubs: &HubThresholds::default(),
            grid: OccupancyGrid::new(1, 1),
            annotations: Annotations::new(1, 0),
            spacing: Spacing::default(),
            uncompress: false,
        };
        placement.grid.set_cell(GridPos::new(0, 0), CellState::Engaged).unwrap();
        let err = placement.place_single_node(a, 0, 0).unwrap_err();
        assert!(matches!(err, LayoutError::GridExhausted { .. }));
    }
}
