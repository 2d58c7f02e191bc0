// Terrain sample and path caches.
//
// `TerrainSampler` wraps the host's `TerrainOracle` and memoizes the two raw
// height queries plus the two derived water predicates, each in its own
// `SampleCache` keyed by the packed 64-bit coordinate (`Point2::pack`). It
// also derives the quantities the cost model needs that the oracle does not
// answer directly: water columns, water depth, local height variance
// ("stability"), and proximity to water.
//
// `PathCache` memoizes finished routes keyed by `(start, end, width)` with a
// tick-based TTL.
//
// Both caches are pure memoizations of deterministic computations. They grow
// without LRU bookkeeping and are cleared wholesale once they pass a size
// limit: a cleared cache is cold, never wrong. The `cache_is_transparent`
// tests pin that property.
//
// Sample caches are sharded so concurrent generation workers contend on one
// of sixteen small locks rather than one big one.
//
// See also: `terrain.rs` for the oracle, `pathfinding/cost.rs` for the cost
// model that reads the sampler, `network.rs` which owns both caches.

use crate::config::CacheParams;
use crate::pathfinding::PathResult;
use crate::terrain::{TerrainClass, TerrainOracle};
use crate::types::{Point2, pack_xz};
use log::debug;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const SHARD_COUNT: usize = 16;

/// Hit/miss/clear counters, for tuning cache limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Sample cache
// ---------------------------------------------------------------------------

/// Sharded `u64 -> V` memo table, cleared wholesale at `limit` entries.
struct SampleCache<V: Copy> {
    name: &'static str,
    shards: [RwLock<FxHashMap<u64, V>>; SHARD_COUNT],
    len: AtomicUsize,
    limit: usize,
    stats: StatCounters,
}

impl<V: Copy> SampleCache<V> {
    fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            shards: std::array::from_fn(|_| RwLock::new(FxHashMap::default())),
            len: AtomicUsize::new(0),
            limit: limit.max(1),
            stats: StatCounters::default(),
        }
    }

    fn shard(&self, key: u64) -> &RwLock<FxHashMap<u64, V>> {
        let mixed = (key ^ (key >> 29)).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        &self.shards[(mixed >> 60) as usize % SHARD_COUNT]
    }

    fn get_or_insert_with(&self, key: u64, compute: impl FnOnce() -> V) -> V {
        let shard = self.shard(key);
        if let Some(&v) = shard.read().get(&key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return v;
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        // Computed outside the lock: the oracle may be slow, and two threads
        // racing on the same key compute the same value.
        let value = compute();
        let inserted = shard.write().insert(key, value).is_none();
        if inserted && self.len.fetch_add(1, Ordering::Relaxed) + 1 > self.limit {
            debug!("{} cache passed {} entries; clearing", self.name, self.limit);
            self.clear();
            self.stats.clears.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
        self.len.store(0, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Terrain sampler
// ---------------------------------------------------------------------------

/// Memoizing view over a `TerrainOracle`.
pub struct TerrainSampler {
    oracle: Arc<dyn TerrainOracle>,
    /// Offset used by the near-water and stability samples; normally the
    /// pathfinder's grid step.
    sample_step: i32,
    heights: SampleCache<i32>,
    floors: SampleCache<i32>,
    water: SampleCache<bool>,
    near_water: SampleCache<bool>,
}

/// The eight neighbor directions, in a fixed order.
pub(crate) const NEIGHBOR_DIRS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

impl TerrainSampler {
    pub fn new(oracle: Arc<dyn TerrainOracle>, params: &CacheParams, sample_step: i32) -> Self {
        let limit = params.sample_cache_limit;
        Self {
            oracle,
            sample_step: sample_step.max(1),
            heights: SampleCache::new("height", limit),
            floors: SampleCache::new("ocean-floor", limit),
            water: SampleCache::new("water", limit),
            near_water: SampleCache::new("near-water", limit),
        }
    }

    pub fn sample_step(&self) -> i32 {
        self.sample_step
    }

    pub fn sea_level(&self) -> i32 {
        self.oracle.sea_level()
    }

    pub fn height(&self, x: i32, z: i32) -> i32 {
        self.heights
            .get_or_insert_with(pack_xz(x, z), || self.oracle.surface_height(x, z))
    }

    pub fn ocean_floor(&self, x: i32, z: i32) -> i32 {
        self.floors
            .get_or_insert_with(pack_xz(x, z), || self.oracle.ocean_floor_height(x, z))
    }

    /// Terrain class straight from the oracle; classes are cheap to answer
    /// and only read once per expanded state.
    pub fn terrain_class(&self, x: i32, z: i32) -> TerrainClass {
        self.oracle.terrain_class(x, z)
    }

    /// A column is water when its surface sits at or above sea level and
    /// above the ocean floor.
    pub fn is_water(&self, x: i32, z: i32) -> bool {
        self.water.get_or_insert_with(pack_xz(x, z), || {
            let surface = self.height(x, z);
            let floor = self.ocean_floor(x, z);
            surface >= self.oracle.sea_level() && surface > floor
        })
    }

    /// Any of the eight columns `sample_step` away is water.
    pub fn is_near_water(&self, x: i32, z: i32) -> bool {
        self.near_water.get_or_insert_with(pack_xz(x, z), || {
            let s = self.sample_step;
            NEIGHBOR_DIRS
                .iter()
                .any(|&(dx, dz)| self.is_water(x + dx * s, z + dz * s))
        })
    }

    /// Blocks of water above the floor; 0 on dry land.
    pub fn water_depth(&self, x: i32, z: i32) -> i32 {
        if self.is_water(x, z) {
            (self.height(x, z) - self.ocean_floor(x, z)).max(0)
        } else {
            0
        }
    }

    /// Height variance over the column and its four axis neighbors at half
    /// the sample step. Flat ground scores 0; broken ground scores high.
    pub fn stability(&self, x: i32, z: i32) -> f64 {
        let r = (self.sample_step / 2).max(1);
        let samples = [
            self.height(x, z),
            self.height(x + r, z),
            self.height(x - r, z),
            self.height(x, z + r),
            self.height(x, z - r),
        ];
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&h| h as f64).sum::<f64>() / n;
        samples
            .iter()
            .map(|&h| {
                let d = h as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n
    }

    pub fn height_at(&self, p: Point2) -> i32 {
        self.height(p.x, p.z)
    }

    pub fn is_water_at(&self, p: Point2) -> bool {
        self.is_water(p.x, p.z)
    }

    /// Drop every memoized sample.
    pub fn clear(&self) {
        self.heights.clear();
        self.floors.clear();
        self.water.clear();
        self.near_water.clear();
    }

    /// Total memoized entries across the four caches.
    pub fn len(&self) -> usize {
        self.heights.len() + self.floors.len() + self.water.len() + self.near_water.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combined statistics of the four caches.
    pub fn stats(&self) -> CacheStats {
        [
            self.heights.stats.snapshot(),
            self.floors.stats.snapshot(),
            self.water.stats.snapshot(),
            self.near_water.stats.snapshot(),
        ]
        .into_iter()
        .fold(CacheStats::default(), |acc, s| CacheStats {
            hits: acc.hits + s.hits,
            misses: acc.misses + s.misses,
            clears: acc.clears + s.clears,
        })
    }
}

// ---------------------------------------------------------------------------
// Path cache
// ---------------------------------------------------------------------------

/// Key for a memoized route. Direction matters: `(a, b)` and `(b, a)` are
/// separate searches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub start: Point2,
    pub end: Point2,
    pub width: i32,
}

struct PathEntry {
    result: Arc<PathResult>,
    inserted_at: u64,
}

/// TTL memo of finished routes.
pub struct PathCache {
    entries: Mutex<FxHashMap<PathKey, PathEntry>>,
    limit: usize,
    ttl_ticks: u64,
    stats: StatCounters,
}

impl PathCache {
    pub fn new(params: &CacheParams) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            limit: params.path_cache_limit.max(1),
            ttl_ticks: params.path_ttl_ticks,
            stats: StatCounters::default(),
        }
    }

    /// Look up a route. Expired entries are removed and count as misses.
    pub fn get(&self, key: &PathKey, now: u64) -> Option<Arc<PathResult>> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some(entry) if now.saturating_sub(entry.inserted_at) <= self.ttl_ticks => {
                Some(Arc::clone(&entry.result))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        let counter = if fresh.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        fresh
    }

    pub fn insert(&self, key: PathKey, result: Arc<PathResult>, now: u64) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.limit && !entries.contains_key(&key) {
            debug!("path cache passed {} entries; clearing", self.limit);
            entries.clear();
            self.stats.clears.fetch_add(1, Ordering::Relaxed);
        }
        entries.insert(
            key,
            PathEntry {
                result,
                inserted_at: now,
            },
        );
    }

    /// Remove every entry older than the TTL. Returns how many were dropped.
    pub fn evict_expired(&self, now: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let ttl = self.ttl_ticks;
        entries.retain(|_, e| now.saturating_sub(e.inserted_at) <= ttl);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::PathOutcome;
    use crate::terrain::FnTerrain;
    use std::sync::atomic::AtomicUsize;

    /// Oracle with a lake at x in [100, 140), counting surface queries.
    struct CountingLake {
        calls: AtomicUsize,
    }

    impl TerrainOracle for CountingLake {
        fn surface_height(&self, x: i32, z: i32) -> i32 {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if (100..140).contains(&x) { 63 } else { 64 + (z.rem_euclid(3)) }
        }
        fn ocean_floor_height(&self, x: i32, z: i32) -> i32 {
            if (100..140).contains(&x) { 55 } else { 64 + (z.rem_euclid(3)) }
        }
        fn terrain_class(&self, _x: i32, _z: i32) -> TerrainClass {
            TerrainClass::Ordinary
        }
        fn sea_level(&self) -> i32 {
            63
        }
    }

    fn lake_sampler(limit: usize) -> (Arc<CountingLake>, TerrainSampler) {
        let oracle = Arc::new(CountingLake {
            calls: AtomicUsize::new(0),
        });
        let params = CacheParams {
            sample_cache_limit: limit,
            ..CacheParams::default()
        };
        let sampler = TerrainSampler::new(oracle.clone(), &params, 16);
        (oracle, sampler)
    }

    #[test]
    fn height_is_memoized() {
        let (oracle, sampler) = lake_sampler(1000);
        assert_eq!(sampler.height(0, 0), 64);
        assert_eq!(sampler.height(0, 0), 64);
        assert_eq!(oracle.calls.load(Ordering::Relaxed), 1);
        let stats = sampler.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn water_column_detection() {
        let (_, sampler) = lake_sampler(1000);
        assert!(sampler.is_water(120, 0));
        assert_eq!(sampler.water_depth(120, 0), 8);
        assert!(!sampler.is_water(0, 0));
        assert_eq!(sampler.water_depth(0, 0), 0);
    }

    #[test]
    fn below_sea_level_depression_is_not_water() {
        // Surface under sea level with no water above the floor: a dry pit.
        let t = FnTerrain::new(|_, _| 40).with_floor(|_, _| 40);
        let sampler = TerrainSampler::new(Arc::new(t), &CacheParams::default(), 16);
        assert!(!sampler.is_water(0, 0));
    }

    #[test]
    fn near_water_checks_eight_offsets() {
        let (_, sampler) = lake_sampler(1000);
        // 90 + 16 = 106 is inside the lake.
        assert!(sampler.is_near_water(90, 0));
        // 60 + 16 = 76; nothing within one step.
        assert!(!sampler.is_near_water(60, 0));
        // 86 + 16 = 102.
        assert!(sampler.is_near_water(86, 500));
    }

    #[test]
    fn stability_flat_is_zero_and_rough_is_positive() {
        let flat = TerrainSampler::new(
            Arc::new(FnTerrain::new(|_, _| 70)),
            &CacheParams::default(),
            16,
        );
        assert_eq!(flat.stability(5, 5), 0.0);
        let rough = TerrainSampler::new(
            Arc::new(FnTerrain::new(|x, z| if (x + z).rem_euclid(16) == 0 { 90 } else { 64 })),
            &CacheParams::default(),
            16,
        );
        assert!(rough.stability(0, 0) > 0.0);
    }

    #[test]
    fn cache_clears_at_limit() {
        let (_, sampler) = lake_sampler(10);
        for x in 0..11 {
            sampler.height(x, 0);
        }
        assert!(sampler.stats().clears >= 1);
        assert!(sampler.len() < 11);
    }

    #[test]
    fn cache_is_transparent() {
        let (_, sampler) = lake_sampler(50);
        let sample_all = |s: &TerrainSampler| -> Vec<(i32, bool, bool, i32)> {
            (0..40)
                .map(|i| {
                    let x = i * 7;
                    let z = i * 3 - 50;
                    (s.height(x, z), s.is_water(x, z), s.is_near_water(x, z), s.water_depth(x, z))
                })
                .collect()
        };
        let first = sample_all(&sampler);
        sampler.clear();
        assert!(sampler.is_empty());
        let second = sample_all(&sampler);
        assert_eq!(first, second);
    }

    fn dummy_result() -> Arc<PathResult> {
        Arc::new(PathResult {
            vertices: vec![Point2::new(0, 0)],
            segments: Vec::new(),
            outcome: PathOutcome::Complete,
            expansions: 0,
            cost: 0.0,
        })
    }

    #[test]
    fn path_cache_ttl() {
        let params = CacheParams {
            path_ttl_ticks: 100,
            ..CacheParams::default()
        };
        let cache = PathCache::new(&params);
        let key = PathKey {
            start: Point2::new(0, 0),
            end: Point2::new(10, 0),
            width: 3,
        };
        cache.insert(key, dummy_result(), 1000);
        assert!(cache.get(&key, 1050).is_some());
        assert!(cache.get(&key, 1100).is_some());
        assert!(cache.get(&key, 1101).is_none());
        assert!(cache.is_empty(), "expired entry is removed on lookup");
    }

    #[test]
    fn path_cache_width_is_part_of_key() {
        let cache = PathCache::new(&CacheParams::default());
        let narrow = PathKey {
            start: Point2::new(0, 0),
            end: Point2::new(10, 0),
            width: 3,
        };
        let wide = PathKey { width: 5, ..narrow };
        cache.insert(narrow, dummy_result(), 0);
        assert!(cache.get(&wide, 0).is_none());
        assert!(cache.get(&narrow, 0).is_some());
    }

    #[test]
    fn path_cache_evicts_expired_and_clears_at_limit() {
        let params = CacheParams {
            path_cache_limit: 3,
            path_ttl_ticks: 20,
            ..CacheParams::default()
        };
        let cache = PathCache::new(&params);
        for i in 0..3 {
            let key = PathKey {
                start: Point2::new(i, 0),
                end: Point2::new(i, 10),
                width: 1,
            };
            cache.insert(key, dummy_result(), i as u64 * 10);
        }
        assert_eq!(cache.evict_expired(25), 1);
        assert_eq!(cache.len(), 2);
        cache.insert(
            PathKey {
                start: Point2::new(9, 9),
                end: Point2::new(0, 0),
                width: 1,
            },
            dummy_result(),
            25,
        );
        assert_eq!(cache.len(), 3);
        cache.insert(
            PathKey {
                start: Point2::new(8, 8),
                end: Point2::new(0, 0),
                width: 1,
            },
            dummy_result(),
            25,
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().clears, 1);
    }
}
