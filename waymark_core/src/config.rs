// Data-driven planner configuration.
//
// Every tunable the planner reads lives in `NetworkConfig`, grouped by the
// component that consumes it: `GraphParams` (edge construction and pruning),
// `PathfindingParams` (A* grid, cost weights, heuristic, budgets),
// `SpanParams` (bridge/tunnel annotation), `CacheParams` (memo limits and
// TTL), and `DiscoveryParams` (worker pool, batching, tiling). Components
// never hard-code these values; they take the relevant group by reference.
//
// The host loads the config from JSON (`from_json` / `from_file`) or starts
// from `Default`. Unknown-but-missing fields fall back to defaults via
// `#[serde(default)]` so old config files keep loading as knobs are added.
// `validate()` enforces ranges; the orchestrator calls it once at
// construction.
//
// See also: `network.rs` which owns the config, `planner/mod.rs` and
// `pathfinding/astar.rs` which are the heaviest readers.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which edge-construction strategy a planning pass uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphAlgorithm {
    /// Bowyer–Watson triangulation, edges filtered by length.
    Delaunay,
    /// Adaptive-radius k-nearest-neighbor linking.
    Knn,
    /// Relative neighborhood graph (lune test).
    RelativeNeighborhood,
    /// Kruskal minimum spanning tree, repaired incrementally for small batches.
    MinimumSpanningTree,
}

/// Edge construction and geometric pruning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    pub algorithm: GraphAlgorithm,
    /// Longest edge any planner may emit, in blocks.
    pub max_edge_length: f64,
    /// Maximum neighbors accepted per node by the KNN planner.
    pub knn_k: usize,
    /// Adaptive radius multiplier: candidates must lie within
    /// `alpha * max(own NN distance, candidate NN distance)`.
    pub knn_alpha: f64,
    /// Degree cap per node (KNN and component connector).
    pub max_degree: usize,
    /// Minimum angle between two edges sharing an endpoint.
    pub min_angle_degrees: f64,
    /// Run the Gabriel filter after the planner.
    pub apply_gabriel: bool,
    /// Run the minimum-angle filter after the planner.
    pub apply_min_angle: bool,
    /// Bridge disjoint components with the shortest legal edges.
    pub connect_components: bool,
    /// Greedy ascending-length sparsification after filtering.
    pub optimize_structure: bool,
    /// MST mode only: batches with at most this many new nodes are attached
    /// with `mst::add_node` instead of a full recompute.
    pub incremental_mst_batch_limit: usize,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            algorithm: GraphAlgorithm::Delaunay,
            max_edge_length: 600.0,
            knn_k: 4,
            knn_alpha: 2.5,
            max_degree: 5,
            min_angle_degrees: 25.0,
            apply_gabriel: false,
            apply_min_angle: true,
            connect_components: true,
            optimize_structure: false,
            incremental_mst_batch_limit: 4,
        }
    }
}

/// Terrain-cost A* settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingParams {
    /// Spacing of search states, in blocks (4..=128).
    pub grid_step: i32,
    /// Expansion budget per search.
    pub max_steps: usize,
    /// Per-block multiplier for orthogonal moves.
    pub weight_orthogonal: f64,
    /// Per-block multiplier for diagonal moves (measured along the axis).
    pub weight_diagonal: f64,
    /// Cost per block of height change between consecutive states.
    pub elevation_weight: f64,
    /// Cost per unit of local height variance at the destination state.
    pub stability_weight: f64,
    /// Cost per block of water depth at the destination state.
    pub water_depth_weight: f64,
    pub river_penalty: f64,
    pub ocean_penalty: f64,
    pub deep_ocean_penalty: f64,
    /// Flat penalty for entering any water column.
    pub water_penalty: f64,
    /// Flat penalty for dry ground adjacent to water (banks flood, shores erode).
    pub near_water_penalty: f64,
    /// Cost per block of perpendicular distance from the start→end line
    /// beyond `deviation_free_distance`.
    pub deviation_weight: f64,
    pub deviation_free_distance: f64,
    /// Height change between consecutive states beyond which the move is
    /// refused outright.
    pub max_height_step: i32,
    /// Heuristic scale used for trips of zero length.
    pub heuristic_scale_near: f64,
    /// Heuristic scale used for trips at or beyond `heuristic_far_distance`.
    pub heuristic_scale_far: f64,
    /// Manhattan distance at which the heuristic scale saturates.
    pub heuristic_far_distance: f64,
    /// Inflation in `f = g + (1 + epsilon) * h`.
    pub heuristic_epsilon: f64,
    /// Minimum progress fraction for accepting a partial path when the
    /// budget runs out. `None` disables partial paths.
    pub partial_path_threshold: Option<f64>,
    /// Road width used when the caller does not specify one.
    pub default_width: i32,
    /// Interpolate unit steps between grid vertices before stamping width.
    pub densify: bool,
}

impl Default for PathfindingParams {
    fn default() -> Self {
        Self {
            grid_step: 16,
            max_steps: 20_000,
            weight_orthogonal: 1.0,
            weight_diagonal: std::f64::consts::SQRT_2,
            elevation_weight: 8.0,
            stability_weight: 2.0,
            water_depth_weight: 30.0,
            river_penalty: 200.0,
            ocean_penalty: 400.0,
            deep_ocean_penalty: 800.0,
            water_penalty: 300.0,
            near_water_penalty: 20.0,
            deviation_weight: 0.05,
            deviation_free_distance: 64.0,
            max_height_step: 12,
            heuristic_scale_near: 1.0,
            heuristic_scale_far: 2.5,
            heuristic_far_distance: 4000.0,
            heuristic_epsilon: 0.05,
            partial_path_threshold: Some(0.75),
            default_width: 3,
            densify: true,
        }
    }
}

/// Bridge and tunnel detection over finished paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanParams {
    /// Shortest run of water centers reported as a bridge.
    pub min_bridge_length: usize,
    /// Rise over run between consecutive centers that counts as steep.
    pub tunnel_grade: f64,
    /// Shortest run of steep steps reported as a tunnel.
    pub min_tunnel_length: usize,
}

impl Default for SpanParams {
    fn default() -> Self {
        Self {
            min_bridge_length: 3,
            tunnel_grade: 0.6,
            min_tunnel_length: 4,
        }
    }
}

/// Memoization limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Entry count at which a terrain sample cache is cleared wholesale.
    pub sample_cache_limit: usize,
    /// Entry count at which the path cache is cleared wholesale.
    pub path_cache_limit: usize,
    /// Ticks a cached path stays valid.
    pub path_ttl_ticks: u64,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            sample_cache_limit: 200_000,
            path_cache_limit: 256,
            path_ttl_ticks: 600_000,
        }
    }
}

/// Node discovery, batching, and tile bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryParams {
    /// Worker threads for discovery searches. 0 runs searches on the caller.
    pub worker_count: usize,
    /// Feature kinds searched for, cycled round-robin.
    pub target_filters: Vec<String>,
    pub search_radius: i32,
    /// Pending nodes per region that trigger a flush.
    pub batch_size: usize,
    /// Ticks since a region's last update after which it flushes anyway.
    pub flush_timeout_ticks: u64,
    /// Side length of a planned-tile cell, in blocks.
    pub tile_size: i32,
    /// Edges allowed in `Generating` at once.
    pub max_generating: usize,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            worker_count: 2,
            target_filters: vec!["village".into()],
            search_radius: 1024,
            batch_size: 8,
            flush_timeout_ticks: 5_000,
            tile_size: 256,
            max_generating: 2,
        }
    }
}

/// Complete planner configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub graph: GraphParams,
    pub pathfinding: PathfindingParams,
    pub spans: SpanParams,
    pub cache: CacheParams,
    pub discovery: DiscoveryParams,
}

impl NetworkConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.graph;
        let p = &self.pathfinding;
        let d = &self.discovery;
        let weights = [
            p.elevation_weight,
            p.stability_weight,
            p.water_depth_weight,
            p.river_penalty,
            p.ocean_penalty,
            p.deep_ocean_penalty,
            p.water_penalty,
            p.near_water_penalty,
            p.deviation_weight,
            p.deviation_free_distance,
        ];
        let checks: [(bool, &str); 17] = [
            (g.max_edge_length > 0.0, "graph.max_edge_length must be positive"),
            (g.knn_k >= 1, "graph.knn_k must be at least 1"),
            (g.knn_alpha > 0.0, "graph.knn_alpha must be positive"),
            (g.max_degree >= 1, "graph.max_degree must be at least 1"),
            (
                (0.0..90.0).contains(&g.min_angle_degrees),
                "graph.min_angle_degrees must be in [0, 90)",
            ),
            ((4..=128).contains(&p.grid_step), "pathfinding.grid_step must be in 4..=128"),
            (p.max_steps >= 1, "pathfinding.max_steps must be at least 1"),
            (
                p.heuristic_scale_near > 0.0 && p.heuristic_scale_far >= p.heuristic_scale_near,
                "pathfinding heuristic scales must satisfy 0 < near <= far",
            ),
            (
                p.weight_orthogonal > 0.0 && p.weight_diagonal > 0.0,
                "pathfinding step weights must be positive",
            ),
            (
                weights.iter().all(|w| *w >= 0.0),
                "pathfinding weights and penalties must be non-negative",
            ),
            (p.max_height_step >= 0, "pathfinding.max_height_step must be non-negative"),
            (p.heuristic_epsilon >= 0.0, "pathfinding.heuristic_epsilon must be non-negative"),
            (
                p.partial_path_threshold.is_none_or(|t| (0.0..=1.0).contains(&t)),
                "pathfinding.partial_path_threshold must be in [0, 1]",
            ),
            (p.default_width >= 1, "pathfinding.default_width must be at least 1"),
            (d.batch_size >= 1, "discovery.batch_size must be at least 1"),
            (d.tile_size >= 1, "discovery.tile_size must be at least 1"),
            (d.max_generating >= 1, "discovery.max_generating must be at least 1"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(ConfigError::Invalid((*msg).to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        NetworkConfig::default().validate().unwrap();
    }

    #[test]
    fn default_config_serializes() {
        let config = NetworkConfig::default();
        let json = config.to_json().unwrap();
        let restored = NetworkConfig::from_json(&json).unwrap();
        assert_eq!(restored.pathfinding.grid_step, config.pathfinding.grid_step);
        assert_eq!(restored.graph.algorithm, config.graph.algorithm);
        assert_eq!(
            restored.pathfinding.partial_path_threshold,
            config.pathfinding.partial_path_threshold
        );
        assert_eq!(restored.discovery.target_filters, config.discovery.target_filters);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "graph": { "algorithm": "Knn", "knn_k": 6 },
            "pathfinding": { "grid_step": 32, "partial_path_threshold": null },
            "discovery": { "target_filters": ["village", "outpost"], "worker_count": 0 }
        }"#;
        let config = NetworkConfig::from_json(json).unwrap();
        assert_eq!(config.graph.algorithm, GraphAlgorithm::Knn);
        assert_eq!(config.graph.knn_k, 6);
        assert_eq!(config.graph.max_degree, GraphParams::default().max_degree);
        assert_eq!(config.pathfinding.grid_step, 32);
        assert_eq!(config.pathfinding.partial_path_threshold, None);
        assert_eq!(config.discovery.target_filters.len(), 2);
        assert_eq!(config.discovery.worker_count, 0);
        assert_eq!(config.spans.min_bridge_length, SpanParams::default().min_bridge_length);
    }

    #[test]
    fn rejects_out_of_range_grid_step() {
        let json = r#"{ "pathfinding": { "grid_step": 2 } }"#;
        match NetworkConfig::from_json(json) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("grid_step")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_costs() {
        let cases = [
            (r#"{ "pathfinding": { "elevation_weight": -1.0 } }"#, "penalties"),
            (r#"{ "pathfinding": { "river_penalty": -200.0 } }"#, "penalties"),
            (r#"{ "pathfinding": { "weight_diagonal": 0.0 } }"#, "step weights"),
            (r#"{ "pathfinding": { "max_height_step": -1 } }"#, "max_height_step"),
            (r#"{ "pathfinding": { "heuristic_epsilon": -0.5 } }"#, "heuristic_epsilon"),
        ];
        for (json, field) in cases {
            match NetworkConfig::from_json(json) {
                Err(ConfigError::Invalid(msg)) => assert!(msg.contains(field), "{json}: {msg}"),
                other => panic!("{json}: expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            NetworkConfig::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = Path::new("/nonexistent/waymark/config.json");
        assert!(matches!(NetworkConfig::from_file(path), Err(ConfigError::Io(_))));
    }
}
