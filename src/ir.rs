use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One of the four sides of a node's bounding box. `North` is the side with
/// the smaller `y` (screen orientation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    West,
    East,
    South,
    North,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::West, Side::East, Side::South, Side::North];

    pub fn letter(self) -> char {
        match self {
            Side::West => 'W',
            Side::East => 'E',
            Side::South => 'S',
            Side::North => 'N',
        }
    }

    /// Unit step on the grid when moving out of this side.
    pub fn grid_step(self) -> (i32, i32) {
        match self {
            Side::West => (-1, 0),
            Side::East => (1, 0),
            Side::South => (0, 1),
            Side::North => (0, -1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("edge {edge} references node {node}, which is not in the graph")]
    UnknownNode { edge: usize, node: usize },
    #[error("edge references unknown node name '{0}'")]
    UnknownNodeName(String),
    #[error("duplicate node name '{0}'")]
    DuplicateNodeName(String),
    #[error("node '{name}' has an invalid extent ({half_width} x {half_height})")]
    InvalidExtent {
        name: String,
        half_width: f32,
        half_height: f32,
    },
}

/// A graph node. `half_width`/`half_height` are half-extents around the
/// centre `(x, y)`.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub half_width: f32,
    pub half_height: f32,
    pub x: f32,
    pub y: f32,
    incoming: Vec<EdgeId>,
    outgoing: Vec<EdgeId>,
}

impl Node {
    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    /// Number of edge ends attached to the node; a self-loop counts twice.
    pub fn degree(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn anchor(&self, side: Side) -> Point {
        match side {
            Side::North => Point::new(self.x, self.y - self.half_height),
            Side::South => Point::new(self.x, self.y + self.half_height),
            Side::West => Point::new(self.x - self.half_width, self.y),
            Side::East => Point::new(self.x + self.half_width, self.y),
        }
    }

    /// The side of the bounding box `point` lies on, if any.
    pub fn boundary_side(&self, point: Point) -> Option<Side> {
        let left = self.x - self.half_width;
        let right = self.x + self.half_width;
        let top = self.y - self.half_height;
        let bottom = self.y + self.half_height;
        let within_x = point.x >= left && point.x <= right;
        let within_y = point.y >= top && point.y <= bottom;
        if point.y == top && within_x {
            Some(Side::North)
        } else if point.y == bottom && within_x {
            Some(Side::South)
        } else if point.x == left && within_y {
            Some(Side::West)
        } else if point.x == right && within_y {
            Some(Side::East)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub points: Vec<Point>,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, half_width: f32, half_height: f32) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            half_width,
            half_height,
            x: 0.0,
            y: 0.0,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, GraphError> {
        let id = EdgeId(self.edges.len());
        for end in [from, to] {
            if end.0 >= self.nodes.len() {
                return Err(GraphError::UnknownNode {
                    edge: id.0,
                    node: end.0,
                });
            }
        }
        self.nodes[from.0].outgoing.push(id);
        self.nodes[to.0].incoming.push(id);
        self.edges.push(Edge {
            from,
            to,
            points: Vec::new(),
        });
        Ok(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + use<> {
        (0..self.edges.len()).map(EdgeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.0]
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.name == name).map(NodeId)
    }

    /// Source nodes of the incoming edges of `id`, in edge order.
    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0]
            .incoming
            .iter()
            .map(|edge| self.edges[edge.0].from)
            .collect()
    }

    /// Target nodes of the outgoing edges of `id`, in edge order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0]
            .outgoing
            .iter()
            .map(|edge| self.edges[edge.0].to)
            .collect()
    }

    pub fn largest_half_extent(&self) -> (f32, f32) {
        self.nodes.iter().fold((0.0_f32, 0.0_f32), |(w, h), node| {
            (w.max(node.half_width), h.max(node.half_height))
        })
    }

    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) {
        let node = &mut self.nodes[id.0];
        node.x = x;
        node.y = y;
    }

    /// Rejects graphs that would make a layout pass meaningless.
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            let valid = |v: f32| v.is_finite() && v >= 0.0;
            if !valid(node.half_width) || !valid(node.half_height) {
                return Err(GraphError::InvalidExtent {
                    name: node.name.clone(),
                    half_width: node.half_width,
                    half_height: node.half_height,
                });
            }
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            for end in [edge.from, edge.to] {
                if end.0 >= self.nodes.len() {
                    return Err(GraphError::UnknownNode {
                        edge: idx,
                        node: end.0,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn from_spec(spec: &GraphSpec) -> Result<Self, GraphError> {
        let mut graph = Graph::new();
        let mut by_name: HashMap<&str, NodeId> = HashMap::new();
        for node in &spec.nodes {
            if by_name.contains_key(node.name.as_str()) {
                return Err(GraphError::DuplicateNodeName(node.name.clone()));
            }
            let id = graph.add_node(node.name.clone(), node.width / 2.0, node.height / 2.0);
            by_name.insert(node.name.as_str(), id);
        }
        for edge in &spec.edges {
            let lookup = |name: &str| {
                by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownNodeName(name.to_string()))
            };
            let from = lookup(&edge.from)?;
            let to = lookup(&edge.to)?;
            graph.add_edge(from, to)?;
        }
        graph.validate()?;
        Ok(graph)
    }
}

/// Serialisable description of a graph. Sizes are full widths/heights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default = "default_node_width")]
    pub width: f32,
    #[serde(default = "default_node_height")]
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
}

fn default_node_width() -> f32 {
    80.0
}

fn default_node_height() -> f32 {
    40.0
}
