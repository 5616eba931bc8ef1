use thiserror::Error;

use crate::ir::{GraphError, NodeId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("occupancy grid exhausted at ({x}, {y}); grid is {dim_x} x {dim_y}")]
    GridExhausted {
        x: i32,
        y: i32,
        dim_x: usize,
        dim_y: usize,
    },
    #[error("node pass was computed for {expected} nodes but the graph has {actual}")]
    StalePass { expected: usize, actual: usize },
    #[error("node {0} has no placement in this pass")]
    Unplaced(NodeId),
}
