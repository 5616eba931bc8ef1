#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod ir;
pub mod layout;
pub mod layout_dump;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{LayoutConfig, load_config};
pub use ir::{EdgeId, Graph, GraphError, GraphSpec, NodeId, Point, Side};
pub use layout::{LayoutError, LayoutKind, LayoutReport, LayoutStrategy, NodePass, compute_layout};
pub use layout_dump::LayoutDump;
