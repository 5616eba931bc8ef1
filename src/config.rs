use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grid dimensions as `max(node_count * factor, min_dim)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSizing {
    pub factor_x: usize,
    pub factor_y: usize,
    pub min_dim: usize,
}

impl GridSizing {
    pub fn dims(&self, node_count: usize) -> (usize, usize) {
        (
            (node_count * self.factor_x).max(self.min_dim),
            (node_count * self.factor_y).max(self.min_dim),
        )
    }
}

impl Default for GridSizing {
    fn default() -> Self {
        Self {
            factor_x: 2,
            factor_y: 2,
            min_dim: 10,
        }
    }
}

/// Fan-out tiers that decide how far apart neighbours of a hub are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubThresholds {
    pub many: usize,
    pub crowded: usize,
    pub dense: usize,
    pub heavy: usize,
    pub massive: usize,
}

impl Default for HubThresholds {
    fn default() -> Self {
        Self {
            many: 5,
            crowded: 25,
            dense: 50,
            heavy: 100,
            massive: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartConfig {
    /// Diversion routing runs only up to this many edges.
    pub adaptive_edge_limit: usize,
    /// Wider grids and cell reservation up to this many edges.
    pub uncompress_edge_limit: usize,
    /// Ratio picked by how many multiples of the node count the edge count exceeds.
    pub distance_ratio_steps: Vec<f32>,
    /// `(edge count below, multiplier)` pairs, checked in order.
    pub multiplier_steps: Vec<(usize, f32)>,
    pub multiplier_max: f32,
    pub node_gap: f32,
    pub edge_distance_divisor: f32,
    pub self_loop_lateral: f32,
    /// Step between the source endpoints of edges that leave one side of a node.
    pub source_port_step: f32,
    /// Step between the target endpoints of edges that enter one side of a node.
    pub target_port_step: f32,
    /// `(degree below, limit)` pairs for the simple-tree check.
    pub simple_tree_limits: Vec<(usize, usize)>,
    pub simple_tree_fallback: usize,
    pub uncompressed_grid: GridSizing,
    pub compact_grid: GridSizing,
    pub hubs: HubThresholds,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            adaptive_edge_limit: 1000,
            uncompress_edge_limit: 500,
            distance_ratio_steps: vec![1.0, 0.9, 0.8, 0.7, 0.6, 0.5],
            multiplier_steps: vec![
                (10, 250.0),
                (50, 300.0),
                (100, 350.0),
                (150, 400.0),
                (200, 450.0),
                (250, 500.0),
                (300, 550.0),
                (350, 600.0),
                (400, 650.0),
                (450, 700.0),
                (500, 750.0),
            ],
            multiplier_max: 800.0,
            node_gap: 10.0,
            edge_distance_divisor: 15.0,
            self_loop_lateral: 40.0,
            source_port_step: 5.0,
            target_port_step: 20.0,
            simple_tree_limits: vec![(10, 3), (25, 5), (50, 10)],
            simple_tree_fallback: 25,
            uncompressed_grid: GridSizing {
                factor_x: 5,
                factor_y: 3,
                min_dim: 10,
            },
            compact_grid: GridSizing::default(),
            hubs: HubThresholds::default(),
        }
    }
}

impl SmartConfig {
    pub fn distance_ratio(&self, node_count: usize, edge_count: usize) -> f32 {
        let steps = self.distance_ratio_steps.len().saturating_sub(1);
        let exceeded = (1..=steps)
            .filter(|k| edge_count > k * node_count)
            .count();
        self.distance_ratio_steps.get(exceeded).copied().unwrap_or(1.0)
    }

    pub fn distance_multiplier(&self, edge_count: usize) -> f32 {
        self.multiplier_steps
            .iter()
            .find(|(below, _)| edge_count < *below)
            .map_or(self.multiplier_max, |(_, mult)| *mult)
    }

    pub fn simple_tree_limit(&self, degree: usize) -> usize {
        self.simple_tree_limits
            .iter()
            .find(|(below, _)| degree < *below)
            .map_or(self.simple_tree_fallback, |(_, limit)| *limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub start_marker: String,
    pub start_prefix: String,
    pub node_gap: f32,
    pub loop_margin: f32,
    pub loop_lift: f32,
    pub self_loop_lateral: f32,
    pub grid: GridSizing,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            start_marker: "start".to_string(),
            start_prefix: "-".to_string(),
            node_gap: 100.0,
            loop_margin: 100.0,
            loop_lift: 50.0,
            self_loop_lateral: 40.0,
            grid: GridSizing::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub dist_x: f32,
    pub dist_y: f32,
    pub candidate_limit: usize,
    pub root_max_incoming: usize,
    pub stack_gap: f32,
    pub callback_offset: f32,
    pub self_loop_lateral: f32,
    pub self_loop_lift: f32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            dist_x: 100.0,
            dist_y: 400.0,
            candidate_limit: 100,
            root_max_incoming: 5,
            stack_gap: 50.0,
            callback_offset: 20.0,
            self_loop_lateral: 40.0,
            self_loop_lift: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    pub distance_multiplier: f32,
    pub ring_gap: usize,
    pub self_loop_lateral: f32,
    pub self_loop_lift: f32,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            distance_multiplier: 80.0,
            ring_gap: 5,
            self_loop_lateral: 40.0,
            self_loop_lift: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub width_budget: f32,
    pub gap: f32,
    pub self_loop_lateral: f32,
    pub self_loop_lift: f32,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            width_budget: 1200.0,
            gap: 150.0,
            self_loop_lateral: 40.0,
            self_loop_lift: 50.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub smart: SmartConfig,
    pub flow: FlowConfig,
    pub tree: TreeConfig,
    pub circle: CircleConfig,
    pub bucket: BucketConfig,
}

/// Reads a JSON/JSON5 layout configuration. Missing fields keep their defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LayoutConfig> {
    let Some(path) = path else {
        return Ok(LayoutConfig::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<LayoutConfig> {
    if contents.trim().is_empty() {
        return Ok(LayoutConfig::default());
    }
    let config: LayoutConfig = json5::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_follows_edge_density() {
        let config = SmartConfig::default();
        assert_eq!(config.distance_ratio(10, 10), 1.0);
        assert_eq!(config.distance_ratio(10, 11), 0.9);
        assert_eq!(config.distance_ratio(10, 31), 0.7);
        assert_eq!(config.distance_ratio(10, 51), 0.5);
        assert_eq!(config.distance_ratio(0, 0), 1.0);
    }

    #[test]
    fn multiplier_grows_with_edges() {
        let config = SmartConfig::default();
        assert_eq!(config.distance_multiplier(0), 250.0);
        assert_eq!(config.distance_multiplier(10), 300.0);
        assert_eq!(config.distance_multiplier(120), 400.0);
        assert_eq!(config.distance_multiplier(499), 750.0);
        assert_eq!(config.distance_multiplier(500), 800.0);
    }

    #[test]
    fn simple_tree_limits_by_degree() {
        let config = SmartConfig::default();
        assert_eq!(config.simple_tree_limit(9), 3);
        assert_eq!(config.simple_tree_limit(10), 5);
        assert_eq!(config.simple_tree_limit(49), 10);
        assert_eq!(config.simple_tree_limit(300), 25);
    }

    #[test]
    fn partial_json5_keeps_defaults() {
        let config = parse_config(
            r#"{
                // relaxed syntax
                flow: { node_gap: 60 },
                bucket: { width_budget: 600, },
            }"#,
        )
        .unwrap();
        assert_eq!(config.flow.node_gap, 60.0);
        assert_eq!(config.flow.start_marker, "start");
        assert_eq!(config.bucket.width_budget, 600.0);
        assert_eq!(config.smart, SmartConfig::default());
    }

    #[test]
    fn missing_path_yields_defaults() {
        assert_eq!(load_config(None).unwrap(), LayoutConfig::default());
    }
}
