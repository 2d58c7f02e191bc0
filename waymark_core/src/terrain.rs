// Terrain oracle interface.
//
// The planner never owns terrain. The host supplies a `TerrainOracle` that
// answers four deterministic questions about a column `(x, z)`: the world
// surface height (water surface included), the ocean floor height (first
// solid block under any water), a coarse terrain class, and the sea level.
// Everything else the pathfinder needs (water columns, water depth, local
// roughness, proximity to water) is derived from these in `cache.rs`.
//
// Two reference oracles live here: `FlatTerrain` (constant dry ground) and
// `FnTerrain` (closure-backed heightfield). Tests and benches use them, and
// hosts can prototype against them before wiring a real world generator.
//
// **Critical constraint: determinism.** Oracle answers must be a pure
// function of the coordinate. The caches assume so; a non-deterministic
// oracle makes cache clearing observable.

use serde::{Deserialize, Serialize};

/// Coarse classification of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainClass {
    Ordinary,
    Beach,
    River,
    Ocean,
    DeepOcean,
}

/// Read-only view of the host's terrain. Implementations may block (world
/// generation, chunk loads); callers treat each query as potentially slow and
/// go through `TerrainSampler` to memoize.
pub trait TerrainOracle: Send + Sync {
    /// Highest non-air block, water surface included.
    fn surface_height(&self, x: i32, z: i32) -> i32;

    /// Highest solid block, ignoring any water above it.
    fn ocean_floor_height(&self, x: i32, z: i32) -> i32;

    fn terrain_class(&self, x: i32, z: i32) -> TerrainClass;

    fn sea_level(&self) -> i32;
}

/// Constant-height dry terrain.
#[derive(Clone, Copy, Debug)]
pub struct FlatTerrain {
    pub height: i32,
    pub sea_level: i32,
}

impl FlatTerrain {
    pub fn new(height: i32) -> Self {
        Self {
            height,
            sea_level: 63,
        }
    }
}

impl TerrainOracle for FlatTerrain {
    fn surface_height(&self, _x: i32, _z: i32) -> i32 {
        self.height
    }

    fn ocean_floor_height(&self, _x: i32, _z: i32) -> i32 {
        self.height
    }

    fn terrain_class(&self, _x: i32, _z: i32) -> TerrainClass {
        TerrainClass::Ordinary
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }
}

type ColumnFn<T> = Box<dyn Fn(i32, i32) -> T + Send + Sync>;

/// Terrain defined by closures. Unless overridden the floor equals the
/// surface (no water anywhere) and every column is `Ordinary`.
pub struct FnTerrain {
    surface: ColumnFn<i32>,
    floor: Option<ColumnFn<i32>>,
    class: Option<ColumnFn<TerrainClass>>,
    sea_level: i32,
}

impl FnTerrain {
    pub fn new(surface: impl Fn(i32, i32) -> i32 + Send + Sync + 'static) -> Self {
        Self {
            surface: Box::new(surface),
            floor: None,
            class: None,
            sea_level: 63,
        }
    }

    pub fn with_floor(mut self, floor: impl Fn(i32, i32) -> i32 + Send + Sync + 'static) -> Self {
        self.floor = Some(Box::new(floor));
        self
    }

    pub fn with_class(
        mut self,
        class: impl Fn(i32, i32) -> TerrainClass + Send + Sync + 'static,
    ) -> Self {
        self.class = Some(Box::new(class));
        self
    }

    pub fn with_sea_level(mut self, sea_level: i32) -> Self {
        self.sea_level = sea_level;
        self
    }
}

impl TerrainOracle for FnTerrain {
    fn surface_height(&self, x: i32, z: i32) -> i32 {
        (self.surface)(x, z)
    }

    fn ocean_floor_height(&self, x: i32, z: i32) -> i32 {
        match &self.floor {
            Some(floor) => floor(x, z),
            None => (self.surface)(x, z),
        }
    }

    fn terrain_class(&self, x: i32, z: i32) -> TerrainClass {
        match &self.class {
            Some(class) => class(x, z),
            None => TerrainClass::Ordinary,
        }
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }
}
