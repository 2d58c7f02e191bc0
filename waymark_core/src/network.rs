// The road network orchestrator.
//
// `RoadNetwork` ties the pieces together into one control flow:
//
//   discovery results ─▶ NodeBatcher ─▶ ingest_nodes ─▶ planner ─▶ GraphStore
//                                                          (Planned edges)
//   generate_next ─▶ claim edge ─▶ PathCache / Pathfinder ─▶ spans ─▶ store
//                                                (Completed or Failed)
//
// Every method takes `&self`, so one network can be shared between a
// discovery thread, a ticking thread, and any number of generation workers.
// The graph store synchronizes itself (edge status is CAS). Batching and
// tile bookkeeping sit behind `parking_lot` mutexes, and planning passes are
// serialized by their own mutex so two batches never plan against the same
// stale node snapshot. The number of edges in `Generating` at once is capped
// by `max_generating` through an atomic slot counter.
//
// Incremental MST: when the configured algorithm is the MST and a batch is
// small (`incremental_mst_batch_limit`), new nodes are attached one at a
// time with `mst::add_node` instead of re-running Kruskal over every node.
// Any other case runs a full `plan_edges` pass over all known positions;
// `plan_edge` ignores pairs that already have a record, so replanning never
// duplicates or resets an edge. Edges from earlier passes are never removed,
// so a replanned edge that would cross one of them is skipped.
//
// See also: `graph.rs` (edge lifecycle), `batch.rs`, `discovery.rs`,
// `pathfinding/` (route search).

use crate::batch::{NodeBatcher, PlannedTiles};
use crate::cache::{CacheStats, PathCache, PathKey, TerrainSampler};
use crate::config::{GraphAlgorithm, NetworkConfig};
use crate::discovery::{TaskResult, scatter_search_centers};
use crate::error::{ConfigError, PathError, TransitionError};
use crate::graph::{EdgeStatus, EdgeView, GraphStore, PlanOutcome, StoredPath};
use crate::pathfinding::spans::annotate_spans;
use crate::pathfinding::{PathResult, Pathfinder};
use crate::planner::constraints::segments_cross;
use crate::planner::{mst, plan_edges};
use crate::terrain::TerrainOracle;
use crate::types::{EdgeKey, Node, Point2, RoadSpan};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use waymark_prng::PlanRng;

/// Label given to nodes created implicitly by a manual edge.
pub const MANUAL_LABEL: &str = "manual";

/// What one `generate_next` call did.
#[derive(Clone, Debug, PartialEq)]
pub struct Generated {
    pub edge: EdgeKey,
    /// `Completed` or `Failed`.
    pub status: EdgeStatus,
    /// Why the search failed, for `Failed` edges.
    pub error: Option<PathError>,
}

/// Releases a generation slot when dropped.
struct GenerationSlot<'a>(&'a AtomicUsize);

impl Drop for GenerationSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct RoadNetwork {
    config: NetworkConfig,
    graph: GraphStore,
    sampler: TerrainSampler,
    path_cache: PathCache,
    batcher: Mutex<NodeBatcher>,
    tiles: Mutex<PlannedTiles>,
    planning: Mutex<()>,
    generating: AtomicUsize,
}

impl RoadNetwork {
    pub fn new(config: NetworkConfig, oracle: Arc<dyn TerrainOracle>) -> Result<Self, ConfigError> {
        config.validate()?;
        let sampler = TerrainSampler::new(oracle, &config.cache, config.pathfinding.grid_step);
        Ok(Self {
            graph: GraphStore::new(),
            sampler,
            path_cache: PathCache::new(&config.cache),
            batcher: Mutex::new(NodeBatcher::new(&config.discovery)),
            tiles: Mutex::new(PlannedTiles::new(config.discovery.tile_size)),
            planning: Mutex::new(()),
            generating: AtomicUsize::new(0),
            config,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn sampler(&self) -> &TerrainSampler {
        &self.sampler
    }

    // -- discovery intake ---------------------------------------------------

    /// Search centers for the next discovery round around `origin`, skipping
    /// tiles of `world` that earlier rounds already covered. At most one
    /// center per tile.
    pub fn unplanned_centers(
        &self,
        world: &str,
        origin: Point2,
        count: usize,
        rng: &mut PlanRng,
    ) -> Vec<Point2> {
        let radius = self.config.discovery.search_radius;
        let tiles = self.tiles.lock();
        let mut seen = std::collections::BTreeSet::new();
        scatter_search_centers(origin, radius, count, rng)
            .into_iter()
            .filter(|&c| !tiles.is_planned(world, c) && seen.insert(tiles.tile_of(c)))
            .collect()
    }

    /// Feed finished discovery tasks into the pending buffers. The tile of
    /// every task's search center is marked planned, found or not. Regions
    /// that fill up are planned right away. Returns how many new nodes
    /// reached the graph.
    pub fn absorb_discovery(&self, world: &str, results: &[TaskResult], now: u64) -> usize {
        let mut ready = Vec::new();
        {
            let mut tiles = self.tiles.lock();
            let mut batcher = self.batcher.lock();
            for result in results.iter().filter(|r| r.completed) {
                tiles.mark(world, result.center);
                let Some(pos) = result.position else {
                    continue;
                };
                if self.graph.contains_node(pos) {
                    continue;
                }
                if let Some(batch) = batcher.push(Node::new(pos, result.label.clone(), now), now) {
                    ready.extend(batch);
                }
            }
        }
        self.ingest_nodes(ready)
    }

    /// Periodic housekeeping: plan regions whose flush timeout has elapsed
    /// and drop expired cached paths. Returns how many new nodes reached the
    /// graph.
    pub fn tick(&self, now: u64) -> usize {
        let expired = self.batcher.lock().drain_expired(now);
        let evicted = self.path_cache.evict_expired(now);
        if evicted > 0 {
            debug!("evicted {evicted} expired paths");
        }
        self.ingest_nodes(expired)
    }

    /// Plan every pending node now, regardless of batch size or age.
    pub fn flush(&self) -> usize {
        let pending = self.batcher.lock().drain_all();
        self.ingest_nodes(pending)
    }

    pub fn pending_nodes(&self) -> usize {
        self.batcher.lock().pending()
    }

    // -- planning -----------------------------------------------------------

    /// Commit `nodes` to the graph and plan connections for them. Nodes at
    /// known positions are skipped. Returns how many were new.
    pub fn ingest_nodes(&self, nodes: Vec<Node>) -> usize {
        if nodes.is_empty() {
            return 0;
        }
        let _planning = self.planning.lock();
        let before = self.graph.positions();
        let added: Vec<Point2> = nodes
            .into_iter()
            .filter_map(|n| {
                let pos = n.pos;
                self.graph.insert_node(n).then_some(pos)
            })
            .collect();
        if added.is_empty() {
            return 0;
        }

        let g = &self.config.graph;
        let existing: BTreeSet<EdgeKey> = self.graph.edge_keys().into_iter().collect();
        let incremental = g.algorithm == GraphAlgorithm::MinimumSpanningTree
            && !before.is_empty()
            && added.len() <= g.incremental_mst_batch_limit;
        let edges = if incremental {
            let mut positions = before;
            let mut edges: Vec<EdgeKey> = existing.iter().copied().collect();
            for &p in &added {
                edges = mst::add_node(&positions, &edges, p, g.max_edge_length);
                positions.push(p);
            }
            edges
        } else {
            plan_edges(&self.graph.positions(), g)
        };

        // Edges from earlier passes stay; a new edge may not cut through one.
        let mut inserted = 0;
        let mut crossing = 0;
        for e in edges.iter().filter(|e| !existing.contains(e)) {
            if let Some(old) = existing
                .iter()
                .find(|o| segments_cross(e.lo(), e.hi(), o.lo(), o.hi()))
            {
                debug!("not planning {e}: crosses existing {old}");
                crossing += 1;
                continue;
            }
            if self.graph.plan_edge(e.lo(), e.hi(), false) == PlanOutcome::Inserted {
                inserted += 1;
            }
        }
        info!(
            "ingested {} nodes ({}), {} new edges ({} skipped as crossing); \
             graph has {} nodes, {} edges",
            added.len(),
            if incremental { "incremental" } else { "full pass" },
            inserted,
            crossing,
            self.graph.node_count(),
            self.graph.edge_count()
        );
        added.len()
    }

    /// Operator-authored connection. Missing endpoints become nodes labeled
    /// `MANUAL_LABEL`.
    pub fn add_manual_edge(&self, a: Point2, b: Point2) -> PlanOutcome {
        for p in [a, b] {
            self.graph.insert_node(Node::new(p, MANUAL_LABEL, 0));
        }
        let outcome = self.graph.plan_edge(a, b, true);
        debug!("manual edge {}: {outcome:?}", EdgeKey::new(a, b));
        outcome
    }

    /// Replace a `Failed` connection with a fresh `Planned` one so it is
    /// generated again. The manual flag carries over.
    pub fn retry_failed(&self, a: Point2, b: Point2) -> Result<(), TransitionError> {
        let key = EdgeKey::new(a, b);
        let manual = self.graph.is_manual(key).ok_or(TransitionError::UnknownEdge)?;
        self.graph.replace_failed(a, b, manual)
    }

    // -- generation ---------------------------------------------------------

    fn reserve_slot(&self) -> Option<GenerationSlot<'_>> {
        let limit = self.config.discovery.max_generating;
        self.generating
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        Some(GenerationSlot(&self.generating))
    }

    /// Edges currently being generated.
    pub fn generating(&self) -> usize {
        self.generating.load(Ordering::Acquire)
    }

    /// Route cached or freshly searched between the endpoints of `key`.
    fn route(&self, key: EdgeKey, now: u64) -> Result<Arc<PathResult>, PathError> {
        let p = &self.config.pathfinding;
        let cache_key = PathKey {
            start: key.lo(),
            end: key.hi(),
            width: p.default_width,
        };
        if let Some(hit) = self.path_cache.get(&cache_key, now) {
            return Ok(hit);
        }
        let result = Arc::new(Pathfinder::new(&self.sampler, p).find_path(
            cache_key.start,
            cache_key.end,
            cache_key.width,
            p.max_steps,
        )?);
        self.path_cache.insert(cache_key, Arc::clone(&result), now);
        Ok(result)
    }

    /// Claim the next `Planned` edge and generate its route. Returns `None`
    /// when nothing is planned or `max_generating` edges are already in
    /// flight.
    pub fn generate_next(&self, now: u64) -> Option<Generated> {
        let _slot = self.reserve_slot()?;
        let edge = self.graph.claim_next_planned()?;
        let (status, error) = match self.route(edge, now) {
            Ok(result) => {
                let spans = annotate_spans(&result.segments, &self.sampler, &self.config.spans);
                self.graph.set_path(
                    edge,
                    StoredPath {
                        segments: result.segments.clone(),
                        spans,
                        complete: result.is_complete(),
                    },
                );
                (EdgeStatus::Completed, None)
            }
            Err(e) => {
                debug!("edge {edge} failed: {e}");
                (EdgeStatus::Failed, Some(e))
            }
        };
        if let Err(e) = self.graph.transition(edge, EdgeStatus::Generating, status) {
            warn!("edge {edge} changed while generating: {e}");
        }
        Some(Generated {
            edge,
            status,
            error,
        })
    }

    /// Generate until nothing is left to claim.
    pub fn generate_all(&self, now: u64) -> Vec<Generated> {
        std::iter::from_fn(|| self.generate_next(now)).collect()
    }

    // -- snapshots ----------------------------------------------------------

    pub fn edge_views(&self) -> Vec<EdgeView> {
        self.graph.edge_views()
    }

    pub fn path(&self, a: Point2, b: Point2) -> Option<Arc<StoredPath>> {
        self.graph.path(EdgeKey::new(a, b))
    }

    /// Bridge and tunnel spans of the route between `a` and `b`; empty if it
    /// has not been generated.
    pub fn spans(&self, a: Point2, b: Point2) -> Vec<RoadSpan> {
        self.path(a, b).map(|p| p.spans.clone()).unwrap_or_default()
    }

    /// Search origins of every planned tile in `world`.
    pub fn planned_tiles(&self, world: &str) -> Vec<Point2> {
        self.tiles.lock().centers(world)
    }

    pub fn is_planned(&self, world: &str, p: Point2) -> bool {
        self.tiles.lock().is_planned(world, p)
    }

    pub fn sample_cache_stats(&self) -> CacheStats {
        self.sampler.stats()
    }

    pub fn path_cache_stats(&self) -> CacheStats {
        self.path_cache.stats()
    }

    /// Drop every memoized sample and route.
    pub fn clear_caches(&self) {
        self.sampler.clear();
        self.path_cache.clear();
    }
}
