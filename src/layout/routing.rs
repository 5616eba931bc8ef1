use std::fmt;

use crate::ir::{EdgeId, Graph, Node, Point, Side};

// ── Endpoint side selection ─────────────────────────────────────────

/// Side of a node an edge should leave through to head along `(dx, dy)`.
///
/// The dominant component wins; ties and the zero vector resolve vertically,
/// with a zero or positive `dy` mapping to the south side.
pub fn side_towards(dx: f32, dy: f32) -> Side {
    if -dx > dy.abs() {
        Side::West
    } else if dx > dy.abs() {
        Side::East
    } else if dy >= 0.0 {
        Side::South
    } else {
        Side::North
    }
}

fn direction(from: Point, to: Point) -> (f32, f32) {
    (to.x - from.x, to.y - from.y)
}

/// Anchors for an edge whose first interior waypoint is `first_hint` and
/// whose last interior waypoint is `last_hint`.
pub fn anchor_via(from: &Node, to: &Node, first_hint: Point, last_hint: Point) -> (Point, Point) {
    let (dx1, dy1) = direction(from.center(), first_hint);
    let (dx2, dy2) = direction(to.center(), last_hint);
    (
        from.anchor(side_towards(dx1, dy1)),
        to.anchor(side_towards(dx2, dy2)),
    )
}

/// Writes the two straight anchors of every non-self-loop edge and the
/// shared north loop for self-loops. Returns the number of self-loops.
pub fn anchor_all_straight(graph: &mut Graph, lateral: f32, lift: f32) -> usize {
    let mut self_loops = 0;
    for edge_id in graph.edge_ids() {
        let points = route_straight_or_loop(graph, edge_id, lateral, lift);
        if graph.edge(edge_id).is_self_loop() {
            self_loops += 1;
        }
        graph.edge_mut(edge_id).points = points;
    }
    self_loops
}

fn route_straight_or_loop(graph: &Graph, edge_id: EdgeId, lateral: f32, lift: f32) -> Vec<Point> {
    let edge = graph.edge(edge_id);
    let from = graph.node(edge.from);
    if edge.is_self_loop() {
        return self_loop(from, lateral, lift);
    }
    let to = graph.node(edge.to);
    let (start, end) = anchor_via(from, to, to.center(), from.center());
    vec![start, end]
}

// ── Self-loops ──────────────────────────────────────────────────────

/// North loop: both ends on the north anchor, two waypoints `lateral` to
/// either side and `lift` above it.
pub fn self_loop(node: &Node, lateral: f32, lift: f32) -> Vec<Point> {
    let north = node.anchor(Side::North);
    vec![
        north,
        Point::new(north.x - lateral, north.y - lift),
        Point::new(north.x + lateral, north.y - lift),
        north,
    ]
}

// ── Endpoint shifting ───────────────────────────────────────────────

/// Slides an anchor along its side by up to `amount`, clamped to the side's
/// half-extent. East/west anchors move north, north/south anchors move east;
/// a negative `amount` moves the other way.
pub fn shift_along_side(node: &Node, point: Point, amount: f32) -> Point {
    match node.boundary_side(point) {
        Some(Side::West | Side::East) => {
            let limit = node.half_height;
            Point::new(point.x, point.y - amount.clamp(-limit, limit))
        }
        Some(Side::North | Side::South) => {
            let limit = node.half_width;
            Point::new(point.x + amount.clamp(-limit, limit), point.y)
        }
        None => point,
    }
}

// ── Statistics ──────────────────────────────────────────────────────

/// Per-pass counters of how edges were routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub self_loops: usize,
    pub inner: usize,
    pub outer: usize,
    pub incoming: usize,
    pub outgoing: usize,
    pub callbacks: usize,
    pub unrouted: usize,
}

impl RouteStats {
    pub fn diversions(&self) -> usize {
        self.inner + self.outer + self.incoming + self.outgoing
    }
}

impl fmt::Display for RouteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "self loops: {}, inner diversions: {}, outer diversions: {}, incoming: {}, outgoing: {}",
            self.self_loops, self.inner, self.outer, self.incoming, self.outgoing
        )?;
        if self.callbacks > 0 {
            write!(f, ", callbacks: {}", self.callbacks)?;
        }
        if self.unrouted > 0 {
            write!(f, ", unrouted: {}", self.unrouted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(graph: &mut Graph, name: &str, x: f32, y: f32) -> crate::ir::NodeId {
        let id = graph.add_node(name, 20.0, 10.0);
        graph.set_position(id, x, y);
        id
    }

    #[test]
    fn dominant_axis_picks_side() {
        assert_eq!(side_towards(-10.0, 3.0), Side::West);
        assert_eq!(side_towards(10.0, -3.0), Side::East);
        assert_eq!(side_towards(3.0, 10.0), Side::South);
        assert_eq!(side_towards(3.0, -10.0), Side::North);
        assert_eq!(side_towards(5.0, 5.0), Side::South);
        assert_eq!(side_towards(-5.0, -5.0), Side::North);
        assert_eq!(side_towards(0.0, 0.0), Side::South);
    }

    #[test]
    fn straight_edge_uses_facing_sides() {
        let mut graph = Graph::new();
        let a = node_at(&mut graph, "A", 0.0, 0.0);
        let b = node_at(&mut graph, "B", 0.0, 200.0);
        graph.add_edge(a, b).unwrap();
        let loops = anchor_all_straight(&mut graph, 40.0, 50.0);
        assert_eq!(loops, 0);
        let points = &graph.edges()[0].points;
        assert_eq!(points, &vec![Point::new(0.0, 10.0), Point::new(0.0, 190.0)]);
    }

    #[test]
    fn self_loop_sits_above_north_side() {
        let mut graph = Graph::new();
        let a = node_at(&mut graph, "A", 100.0, 100.0);
        let points = self_loop(graph.node(a), 40.0, 50.0);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], Point::new(100.0, 90.0));
        assert_eq!(points[1], Point::new(60.0, 40.0));
        assert_eq!(points[2], Point::new(140.0, 40.0));
        assert_eq!(points[3], points[0]);
    }

    #[test]
    fn shift_is_clamped_to_half_extent() {
        let mut graph = Graph::new();
        let a = graph.add_node("A", 5.0, 30.0);
        graph.set_position(a, 0.0, 0.0);
        let node = graph.node(a);
        let north = node.anchor(Side::North);
        assert_eq!(shift_along_side(node, north, 20.0), Point::new(5.0, -30.0));
        let west = node.anchor(Side::West);
        assert_eq!(shift_along_side(node, west, 20.0), Point::new(-5.0, -20.0));
        assert_eq!(shift_along_side(node, north, -20.0), Point::new(-5.0, -30.0));
        assert_eq!(shift_along_side(node, west, -50.0), Point::new(-5.0, 30.0));
        assert_eq!(node.boundary_side(shift_along_side(node, west, -50.0)), Some(Side::West));
    }
}
