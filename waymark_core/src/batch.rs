// Pending-node batching and planned-tile bookkeeping.
//
// Discovery is cheap and planning is not: a Delaunay pass is superlinear in
// the node count, so running one per discovered node wastes most of the
// work. `NodeBatcher` holds discovered nodes in per-region buffers (regions
// are `tile_size` squares) and releases a region's nodes either when the
// buffer reaches `batch_size` or when `flush_timeout_ticks` have passed since
// the region last received a node.
//
// `PlannedTiles` records which coarse cells have already been the subject of
// a discovery round, per world, with the center each cell was searched
// from. Hosts use it to skip replanning an area and to draw coverage.
//
// **Critical constraint: determinism.** Regions live in a `BTreeMap` and
// drain in region-key order; nodes inside a region keep arrival order. Time
// is the caller's tick.
//
// See also: `discovery.rs` (producer), `network.rs` (consumer).

use crate::config::DiscoveryParams;
use crate::types::{Node, Point2};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

/// Integer cell of `p` in a grid of `size`-block squares.
fn tile_of(p: Point2, size: i32) -> (i32, i32) {
    let size = size.max(1);
    (p.x.div_euclid(size), p.z.div_euclid(size))
}

#[derive(Debug, Default)]
struct Region {
    nodes: Vec<Node>,
    last_update: u64,
}

/// Per-region buffer of discovered, not yet planned nodes.
#[derive(Debug)]
pub struct NodeBatcher {
    regions: BTreeMap<(i32, i32), Region>,
    /// Positions currently buffered in any region.
    queued: BTreeSet<Point2>,
    region_size: i32,
    batch_size: usize,
    flush_timeout: u64,
}

impl NodeBatcher {
    pub fn new(params: &DiscoveryParams) -> Self {
        Self {
            regions: BTreeMap::new(),
            queued: BTreeSet::new(),
            region_size: params.tile_size.max(1),
            batch_size: params.batch_size.max(1),
            flush_timeout: params.flush_timeout_ticks,
        }
    }

    pub fn region_of(&self, p: Point2) -> (i32, i32) {
        tile_of(p, self.region_size)
    }

    /// Buffer `node`. Returns the region's nodes if this push filled it.
    /// A node at an already-buffered position is ignored.
    pub fn push(&mut self, node: Node, now: u64) -> Option<Vec<Node>> {
        if !self.queued.insert(node.pos) {
            trace!("node at {} already pending", node.pos);
            return None;
        }
        let key = self.region_of(node.pos);
        let region = self.regions.entry(key).or_default();
        region.nodes.push(node);
        region.last_update = now;
        if region.nodes.len() < self.batch_size {
            return None;
        }
        let batch = self.take_region(key);
        debug!("region {key:?} full: flushing {} nodes", batch.len());
        Some(batch)
    }

    /// Flush every region untouched for at least the timeout.
    pub fn drain_expired(&mut self, now: u64) -> Vec<Node> {
        let expired: Vec<(i32, i32)> = self
            .regions
            .iter()
            .filter(|(_, r)| now.saturating_sub(r.last_update) >= self.flush_timeout)
            .map(|(&k, _)| k)
            .collect();
        let mut out = Vec::new();
        for key in expired {
            let batch = self.take_region(key);
            debug!("region {key:?} timed out: flushing {} nodes", batch.len());
            out.extend(batch);
        }
        out
    }

    /// Flush everything regardless of age.
    pub fn drain_all(&mut self) -> Vec<Node> {
        self.queued.clear();
        std::mem::take(&mut self.regions)
            .into_values()
            .flat_map(|r| r.nodes)
            .collect()
    }

    /// Nodes currently buffered.
    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    fn take_region(&mut self, key: (i32, i32)) -> Vec<Node> {
        let nodes = self.regions.remove(&key).map(|r| r.nodes).unwrap_or_default();
        for n in &nodes {
            self.queued.remove(&n.pos);
        }
        nodes
    }
}

/// Cells already covered by a discovery round, per world.
#[derive(Clone, Debug, Default)]
pub struct PlannedTiles {
    tile_size: i32,
    worlds: BTreeMap<String, BTreeMap<(i32, i32), Point2>>,
}

impl PlannedTiles {
    pub fn new(tile_size: i32) -> Self {
        Self {
            tile_size: tile_size.max(1),
            worlds: BTreeMap::new(),
        }
    }

    pub fn tile_of(&self, p: Point2) -> (i32, i32) {
        tile_of(p, self.tile_size)
    }

    /// Center block of a tile.
    pub fn tile_center(&self, tile: (i32, i32)) -> Point2 {
        let s = self.tile_size;
        Point2::new(tile.0 * s + s / 2, tile.1 * s + s / 2)
    }

    /// Mark the tile containing `p` as planned, remembering `p` as its
    /// origin. Returns `false` if the tile was already marked; the first
    /// origin is kept.
    pub fn mark(&mut self, world: &str, p: Point2) -> bool {
        let tile = self.tile_of(p);
        let tiles = self.worlds.entry(world.to_string()).or_default();
        if tiles.contains_key(&tile) {
            return false;
        }
        tiles.insert(tile, p);
        true
    }

    pub fn is_planned(&self, world: &str, p: Point2) -> bool {
        let tile = self.tile_of(p);
        self.worlds
            .get(world)
            .is_some_and(|tiles| tiles.contains_key(&tile))
    }

    /// Origins of every planned tile in `world`, in tile order.
    pub fn centers(&self, world: &str) -> Vec<Point2> {
        self.worlds
            .get(world)
            .map(|tiles| tiles.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn tile_count(&self, world: &str) -> usize {
        self.worlds.get(world).map_or(0, BTreeMap::len)
    }
}
