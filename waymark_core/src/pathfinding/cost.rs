// Transition costs for the terrain A*.
//
// `CostModel` is the seam between the search and the terrain: the search
// only ever asks "what does it cost to step from here to there, if the step
// is allowed at all". `TerrainCostModel` is the standard implementation,
// summing these terms for a move `from -> to`:
//
//   step length × (orthogonal | diagonal weight)
// + |Δheight| × elevation weight          (move refused past max_height_step)
// + terrain class penalty at `to`         (river / ocean / deep ocean)
// + water penalty + depth × depth weight  (water columns)
// + near-water penalty                    (dry banks next to water)
// + local height variance × stability weight
// + deviation weight × distance past the free corridor around start→end
//
// Every term reads the memoizing `TerrainSampler`, never the oracle.
//
// See also: `astar.rs` (the search), `cache.rs` (the sampler).

use crate::cache::TerrainSampler;
use crate::config::PathfindingParams;
use crate::terrain::TerrainClass;
use crate::types::Point2;

/// The straight line a search is trying to follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteContext {
    pub start: Point2,
    pub end: Point2,
}

impl RouteContext {
    /// Perpendicular distance from `p` to the infinite line through
    /// `start` and `end` (distance to `start` when the two coincide).
    pub fn deviation(&self, p: Point2) -> f64 {
        let (ax, az) = (self.start.x as f64, self.start.z as f64);
        let (dx, dz) = (self.end.x as f64 - ax, self.end.z as f64 - az);
        let len = (dx * dx + dz * dz).sqrt();
        if len == 0.0 {
            return p.distance(self.start);
        }
        ((p.x as f64 - ax) * dz - (p.z as f64 - az) * dx).abs() / len
    }
}

/// Prices one move of the search. `None` forbids the move.
pub trait CostModel: Send + Sync {
    fn transition_cost(&self, from: Point2, to: Point2, route: &RouteContext) -> Option<f64>;
}

/// Cost model backed by terrain samples and `PathfindingParams` weights.
pub struct TerrainCostModel<'a> {
    sampler: &'a TerrainSampler,
    params: &'a PathfindingParams,
}

impl<'a> TerrainCostModel<'a> {
    pub fn new(sampler: &'a TerrainSampler, params: &'a PathfindingParams) -> Self {
        Self { sampler, params }
    }

    fn class_penalty(&self, class: TerrainClass) -> f64 {
        match class {
            TerrainClass::River => self.params.river_penalty,
            TerrainClass::Ocean => self.params.ocean_penalty,
            TerrainClass::DeepOcean => self.params.deep_ocean_penalty,
            TerrainClass::Ordinary | TerrainClass::Beach => 0.0,
        }
    }
}

impl CostModel for TerrainCostModel<'_> {
    fn transition_cost(&self, from: Point2, to: Point2, route: &RouteContext) -> Option<f64> {
        let p = self.params;
        let s = self.sampler;

        let rise = (s.height_at(to) - s.height_at(from)).abs();
        if rise > p.max_height_step {
            return None;
        }

        let (dx, dz) = ((to.x - from.x).abs(), (to.z - from.z).abs());
        let weight = if dx != 0 && dz != 0 {
            p.weight_diagonal
        } else {
            p.weight_orthogonal
        };
        let mut cost = dx.max(dz) as f64 * weight;
        cost += rise as f64 * p.elevation_weight;
        cost += self.class_penalty(s.terrain_class(to.x, to.z));

        if s.is_water(to.x, to.z) {
            cost += p.water_penalty + s.water_depth(to.x, to.z) as f64 * p.water_depth_weight;
        } else if s.is_near_water(to.x, to.z) {
            cost += p.near_water_penalty;
        }

        cost += s.stability(to.x, to.z) * p.stability_weight;

        let excess = route.deviation(to) - p.deviation_free_distance;
        if excess > 0.0 {
            cost += excess * p.deviation_weight;
        }
        Some(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheParams;
    use crate::terrain::{FlatTerrain, FnTerrain};
    use std::sync::Arc;

    fn sampler(oracle: impl crate::terrain::TerrainOracle + 'static) -> TerrainSampler {
        TerrainSampler::new(Arc::new(oracle), &CacheParams::default(), 16)
    }

    fn route() -> RouteContext {
        RouteContext {
            start: Point2::new(0, 0),
            end: Point2::new(1000, 0),
        }
    }

    #[test]
    fn deviation_is_perpendicular_distance() {
        let r = route();
        assert_eq!(r.deviation(Point2::new(500, 30)), 30.0);
        assert_eq!(r.deviation(Point2::new(-50, -40)), 40.0);
        let degenerate = RouteContext {
            start: Point2::new(0, 0),
            end: Point2::new(0, 0),
        };
        assert_eq!(degenerate.deviation(Point2::new(3, 4)), 5.0);
    }

    #[test]
    fn flat_orthogonal_and_diagonal_steps() {
        let s = sampler(FlatTerrain::new(70));
        let params = PathfindingParams::default();
        let model = TerrainCostModel::new(&s, &params);
        let a = Point2::new(0, 0);
        let ortho = model.transition_cost(a, Point2::new(16, 0), &route()).unwrap();
        let diag = model.transition_cost(a, Point2::new(16, 16), &route()).unwrap();
        assert_eq!(ortho, 16.0);
        assert!((diag - 16.0 * std::f64::consts::SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn steep_step_is_refused_and_moderate_step_is_priced() {
        let s = sampler(FnTerrain::new(|x, _| 64 + x / 2));
        let params = PathfindingParams {
            max_height_step: 10,
            ..PathfindingParams::default()
        };
        let model = TerrainCostModel::new(&s, &params);
        // Rise of 8 over 16 blocks.
        assert!(model.transition_cost(Point2::new(0, 0), Point2::new(16, 0), &route()).is_some());
        // Rise of 16 over 32 blocks.
        assert!(model.transition_cost(Point2::new(0, 0), Point2::new(32, 0), &route()).is_none());
    }

    #[test]
    fn water_and_banks_cost_more() {
        // Lake at x >= 100: surface at sea level, floor 10 below.
        let s = sampler(
            FnTerrain::new(|_, _| 63)
                .with_floor(|x, _| if x >= 100 { 53 } else { 63 })
                .with_class(|x, _| if x >= 100 { TerrainClass::River } else { TerrainClass::Ordinary }),
        );
        let params = PathfindingParams::default();
        let model = TerrainCostModel::new(&s, &params);
        let dry = model.transition_cost(Point2::new(0, 0), Point2::new(16, 0), &route()).unwrap();
        let bank = model.transition_cost(Point2::new(80, 0), Point2::new(96, 0), &route()).unwrap();
        let wet = model.transition_cost(Point2::new(96, 0), Point2::new(112, 0), &route()).unwrap();
        assert_eq!(bank, dry + params.near_water_penalty);
        assert_eq!(
            wet,
            dry + params.river_penalty + params.water_penalty + 10.0 * params.water_depth_weight
        );
    }

    #[test]
    fn deviation_only_beyond_free_corridor() {
        let s = sampler(FlatTerrain::new(70));
        let params = PathfindingParams::default();
        let model = TerrainCostModel::new(&s, &params);
        let near = model.transition_cost(Point2::new(0, 48), Point2::new(16, 48), &route()).unwrap();
        let far = model.transition_cost(Point2::new(0, 96), Point2::new(16, 96), &route()).unwrap();
        assert_eq!(near, 16.0);
        assert!((far - (16.0 + 32.0 * params.deviation_weight)).abs() < 1e-9);
    }
}
