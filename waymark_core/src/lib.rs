// waymark_core: incremental road-network planning.
//
// This crate decides which discovered points of interest to connect and
// finds terrain-aware routes for those connections. It never places blocks
// or reads a world directly: terrain comes in through the `TerrainOracle`
// trait and feature searches through `FeatureLocator`, both supplied by the
// host.
//
// Module overview:
// - `types.rs`:       Point2, EdgeKey (symmetric pair key), Node, PathSegment, RoadSpan.
// - `config.rs`:      NetworkConfig and its parameter groups, JSON loading + validation.
// - `error.rs`:       PathError, TransitionError, DiscoveryError, ConfigError.
// - `terrain.rs`:     TerrainOracle trait + FlatTerrain / FnTerrain reference oracles.
// - `cache.rs`:       TerrainSampler (memoized oracle + water predicates), PathCache (TTL).
// - `graph.rs`:       GraphStore: nodes, edges with the EdgeStatus state machine, paths.
// - `planner/`:       Delaunay, KNN, RNG, MST planners; Gabriel/min-angle filters;
//                     component connector; incremental MST repair.
// - `pathfinding/`:   Weighted terrain-cost A*, width materialization, bridge/tunnel spans.
// - `discovery.rs`:   Worker-pool feature search with round-robin target filters.
// - `batch.rs`:       Per-region pending node buffers and planned-tile bookkeeping.
// - `network.rs`:     RoadNetwork, the orchestrator tying the above together.
// - `prng`:           Re-exported from `waymark_prng`, xoshiro256++ with SplitMix64 seeding.
//
// **Critical constraint: determinism.** Planning and pathfinding are pure
// functions of their inputs. Point sets are deduplicated and sorted before
// planning, ordered output comes from `BTreeMap`/`BTreeSet`, hash maps are
// only used for lookups, and time is a caller-supplied tick. The library
// never installs a logger.

pub mod batch;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod network;
pub mod pathfinding;
pub mod planner;
pub use waymark_prng as prng;
pub mod terrain;
pub mod types;

pub use config::NetworkConfig;
pub use error::{ConfigError, DiscoveryError, PathError, TransitionError};
pub use graph::{EdgeStatus, EdgeView, GraphStore, PlanOutcome, StoredPath};
pub use network::{Generated, RoadNetwork};
pub use terrain::{FlatTerrain, FnTerrain, TerrainClass, TerrainOracle};
pub use types::{EdgeKey, Node, Point2};
