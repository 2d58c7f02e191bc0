// Terrain-aware route finding between two graph nodes.
//
// Module overview:
// - `astar.rs`:     Weighted A* over a grid lattice with step budget and
//                   partial-path fallback. Entry point: `Pathfinder`.
// - `cost.rs`:      `CostModel` trait and the terrain-backed implementation.
// - `footprint.rs`: Densification and width materialization into
//                   `PathSegment`s.
// - `spans.rs`:     Bridge/tunnel annotation over finished segments.
//
// All terrain reads go through `cache::TerrainSampler`.

pub mod astar;
pub mod cost;
pub mod footprint;
pub mod spans;

pub use astar::{PathOutcome, PathResult, Pathfinder, heuristic_scale};
pub use cost::{CostModel, RouteContext, TerrainCostModel};
