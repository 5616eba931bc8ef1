use crate::ir::{EdgeId, NodeId, Point, Side};

use super::grid::GridPos;

/// What a layout pass has decided about a node or an edge so far.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Mode {
    #[default]
    Undefined,
    // Edge classifications.
    SelfCall,
    InnerDiversion,
    OuterDiversion {
        side: Side,
        start: Point,
        end: Point,
    },
    Incoming {
        cell: GridPos,
        via: Point,
    },
    Outgoing {
        cell: GridPos,
        via: Point,
    },
    Callback,
    // Node states.
    Placed(GridPos),
    Processed(GridPos),
    Marked,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    pub mode: Mode,
    pub reached: bool,
    pub points: Vec<Point>,
}

impl Annotation {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            reached: false,
            points: Vec::new(),
        }
    }

    pub fn placed(cell: GridPos) -> Self {
        Self::new(Mode::Placed(cell))
    }

    pub fn marked() -> Self {
        Self::new(Mode::Marked)
    }

    pub fn reached() -> Self {
        Self {
            mode: Mode::Undefined,
            reached: true,
            points: Vec::new(),
        }
    }

    /// Grid cell for placed or processed nodes.
    pub fn cell(&self) -> Option<GridPos> {
        match self.mode {
            Mode::Placed(cell) | Mode::Processed(cell) => Some(cell),
            _ => None,
        }
    }
}

/// Per-pass side table of annotations keyed by node and edge id.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    nodes: Vec<Option<Annotation>>,
    edges: Vec<Option<Annotation>>,
}

impl Annotations {
    pub fn new(node_count: usize, edge_count: usize) -> Self {
        Self {
            nodes: vec![None; node_count],
            edges: vec![None; edge_count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Annotation> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Annotation> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn set_node(&mut self, id: NodeId, annotation: Annotation) {
        self.nodes[id.0] = Some(annotation);
    }

    pub fn clear_node(&mut self, id: NodeId) {
        self.nodes[id.0] = None;
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Annotation> {
        self.edges.get(id.0).and_then(Option::as_ref)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Annotation> {
        self.edges.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn set_edge(&mut self, id: EdgeId, annotation: Annotation) {
        self.edges[id.0] = Some(annotation);
    }

    pub fn node_mode(&self, id: NodeId) -> Mode {
        self.node(id).map_or(Mode::Undefined, |a| a.mode)
    }

    pub fn edge_mode(&self, id: EdgeId) -> Mode {
        self.edge(id).map_or(Mode::Undefined, |a| a.mode)
    }

    pub fn is_annotated(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node_cell(&self, id: NodeId) -> Option<GridPos> {
        self.node(id).and_then(Annotation::cell)
    }

    pub fn is_reached(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|a| a.reached)
    }

    /// Sets the reached flag, creating a bare annotation if needed.
    pub fn mark_reached(&mut self, id: NodeId) {
        match self.nodes[id.0].as_mut() {
            Some(annotation) => annotation.reached = true,
            None => self.nodes[id.0] = Some(Annotation::reached()),
        }
    }

    /// Clears reached flags; bare annotations created only for the scan are dropped.
    pub fn reset_reached(&mut self, ids: &[NodeId]) {
        for id in ids {
            let slot = &mut self.nodes[id.0];
            if let Some(annotation) = slot {
                if annotation.mode == Mode::Undefined {
                    *slot = None;
                } else {
                    annotation.reached = false;
                }
            }
        }
    }
}
