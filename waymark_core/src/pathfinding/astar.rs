// Weighted A* over a terrain lattice.
//
// Search states are positions on a lattice of spacing `grid_step` anchored
// at the start position, with eight-connected moves. Lattice quantization is
// what keeps a search across thousands of blocks tractable; the step is the
// precision/performance knob. The goal test is "within one step of the end
// (Chebyshev)"; the exact end is then appended to the vertex list.
//
// The open set is a `BinaryHeap` of `OpenEntry` with reversed ordering, same
// pattern as the event queue. Ties on `f` are broken by the lower heuristic
// (deeper node first), then by position, so equal-cost alternatives always
// resolve the same way.
//
// Heuristic: octile-style `(dx + dz - 0.6 * min(dx, dz)) * scale`, where
// `scale` is interpolated between `heuristic_scale_near` and
// `heuristic_scale_far` by the start-to-end Manhattan distance. With the
// `(1 + epsilon)` inflation in `f = g + (1 + epsilon) * h`, this is
// deliberately inadmissible: long searches get greedier and cheaper, short
// searches stay close to optimal.
//
// Budget: the search stops after `max_steps` expansions. It then falls back
// to the best node seen (lowest remaining distance). If that node covered
// at least `partial_path_threshold` of the initial distance, the route up to
// it is returned as `PathOutcome::Partial`. The progress fraction and the
// heuristic scale both depend on the initial distance, so tune the two
// together.
//
// **Critical constraint: determinism.** The search is a pure function of
// `(start, end, width, max_steps)`, the parameters, and the terrain. Score
// tables are `FxHashMap`s but are only ever looked up by key, never iterated.
//
// See also: `cost.rs` (move costs), `footprint.rs` (width materialization),
// `spans.rs` (bridge/tunnel annotation), `network.rs` (the caller).

use crate::cache::{NEIGHBOR_DIRS, TerrainSampler};
use crate::config::PathfindingParams;
use crate::error::PathError;
use crate::pathfinding::cost::{CostModel, RouteContext, TerrainCostModel};
use crate::pathfinding::footprint::{densify, materialize_width};
use crate::types::{PathSegment, Point2};
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Whether a route reaches its goal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathOutcome {
    Complete,
    /// The budget ran out; the route stops short of the goal after covering
    /// `progress` (0..=1) of the initial distance.
    Partial { progress: f64 },
}

/// A successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    /// Lattice vertices from start to goal (or to the partial endpoint),
    /// densified if configured.
    pub vertices: Vec<Point2>,
    /// One width-stamped segment per vertex.
    pub segments: Vec<PathSegment>,
    pub outcome: PathOutcome,
    pub expansions: usize,
    /// Accumulated move cost of the lattice route.
    pub cost: f64,
}

impl PathResult {
    pub fn is_complete(&self) -> bool {
        self.outcome == PathOutcome::Complete
    }
}

/// Heuristic scale for a trip of the given Manhattan length.
pub fn heuristic_scale(params: &PathfindingParams, manhattan: u64) -> f64 {
    let t = if params.heuristic_far_distance > 0.0 {
        (manhattan as f64 / params.heuristic_far_distance).clamp(0.0, 1.0)
    } else {
        1.0
    };
    params.heuristic_scale_near + (params.heuristic_scale_far - params.heuristic_scale_near) * t
}

/// Unscaled octile-style distance estimate.
fn octile(a: Point2, b: Point2) -> f64 {
    let dx = (a.x as f64 - b.x as f64).abs();
    let dz = (a.z as f64 - b.z as f64).abs();
    dx + dz - 0.6 * dx.min(dz)
}

fn chebyshev(a: Point2, b: Point2) -> i64 {
    let dx = (a.x as i64 - b.x as i64).abs();
    let dz = (a.z as i64 - b.z as i64).abs();
    dx.max(dz)
}

/// Entry in the open set (min-heap via reversed ordering).
struct OpenEntry {
    f: f64,
    h: f64,
    pos: Point2,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f is "greatest".
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

/// Terrain-aware route search.
pub struct Pathfinder<'a, C = TerrainCostModel<'a>> {
    sampler: &'a TerrainSampler,
    params: &'a PathfindingParams,
    cost: C,
}

impl<'a> Pathfinder<'a> {
    /// Pathfinder with the standard terrain cost model.
    pub fn new(sampler: &'a TerrainSampler, params: &'a PathfindingParams) -> Self {
        Self {
            sampler,
            params,
            cost: TerrainCostModel::new(sampler, params),
        }
    }
}

impl<'a, C: CostModel> Pathfinder<'a, C> {
    pub fn with_cost_model(
        sampler: &'a TerrainSampler,
        params: &'a PathfindingParams,
        cost: C,
    ) -> Self {
        Self {
            sampler,
            params,
            cost,
        }
    }

    /// Search from `start` to `end` for a road of `width`, expanding at most
    /// `max_steps` states.
    pub fn find_path(
        &self,
        start: Point2,
        end: Point2,
        width: i32,
        max_steps: usize,
    ) -> Result<PathResult, PathError> {
        let p = self.params;
        if p.grid_step <= 0 {
            debug!("rejecting search: grid step {}", p.grid_step);
            return Err(PathError::InvalidRequest(format!("grid step {}", p.grid_step)));
        }
        if width < 1 {
            debug!("rejecting search: width {width}");
            return Err(PathError::InvalidRequest(format!("width {width}")));
        }
        let d = p.grid_step;
        let route = RouteContext { start, end };
        let scale = heuristic_scale(p, start.manhattan_distance(end));
        let inflate = 1.0 + p.heuristic_epsilon;
        let initial = octile(start, end);
        trace!("search {start} -> {end}, width {width}, scale {scale:.2}, budget {max_steps}");

        // pos -> (g, parent)
        let mut scores: FxHashMap<Point2, (f64, Option<Point2>)> = FxHashMap::default();
        let mut closed: FxHashSet<Point2> = FxHashSet::default();
        let mut open = BinaryHeap::new();
        scores.insert(start, (0.0, None));
        open.push(OpenEntry {
            f: inflate * initial * scale,
            h: initial,
            pos: start,
        });

        let mut expansions = 0usize;
        let mut best = (initial, start);
        let mut budget_hit = false;

        while let Some(current) = open.pop() {
            let pos = current.pos;
            if !closed.insert(pos) {
                continue;
            }
            if current.h < best.0 || (current.h == best.0 && pos < best.1) {
                best = (current.h, pos);
            }
            if chebyshev(pos, end) <= d as i64 {
                // The hop onto the exact end is priced like any other move.
                let last_hop = if pos == end {
                    Some(0.0)
                } else {
                    self.cost.transition_cost(pos, end, &route)
                };
                match last_hop {
                    Some(hop) => {
                        let g = scores.get(&pos).map_or(0.0, |s| s.0) + hop;
                        let mut vertices = reconstruct(&scores, pos);
                        if pos != end {
                            vertices.push(end);
                        }
                        return Ok(self.finish(vertices, width, PathOutcome::Complete, expansions, g));
                    }
                    None => trace!("{pos} is within a step of {end} but cannot reach it"),
                }
            }
            if expansions >= max_steps {
                budget_hit = true;
                break;
            }
            expansions += 1;

            let g = scores.get(&pos).map_or(0.0, |s| s.0);
            for &(dx, dz) in &NEIGHBOR_DIRS {
                let next = pos.offset(dx * d, dz * d);
                if closed.contains(&next) {
                    continue;
                }
                let Some(step) = self.cost.transition_cost(pos, next, &route) else {
                    continue;
                };
                let tentative = g + step;
                if scores.get(&next).is_some_and(|s| s.0 <= tentative) {
                    continue;
                }
                scores.insert(next, (tentative, Some(pos)));
                let h = octile(next, end);
                open.push(OpenEntry {
                    f: tentative + inflate * h * scale,
                    h,
                    pos: next,
                });
            }
        }

        if !budget_hit {
            debug!("search {start} -> {end}: open set exhausted after {expansions} expansions");
            return Err(PathError::Unreachable { expansions });
        }

        let progress = if initial > 0.0 {
            ((initial - best.0) / initial).clamp(0.0, 1.0)
        } else {
            0.0
        };
        match p.partial_path_threshold {
            Some(threshold) if progress > threshold => {
                debug!(
                    "search {start} -> {end}: budget exhausted, accepting partial path \
                     ({progress:.2} > {threshold:.2})"
                );
                let g = scores.get(&best.1).map_or(0.0, |s| s.0);
                let vertices = reconstruct(&scores, best.1);
                Ok(self.finish(vertices, width, PathOutcome::Partial { progress }, expansions, g))
            }
            _ => {
                debug!(
                    "search {start} -> {end}: budget exhausted after {expansions} expansions \
                     (best progress {progress:.2})"
                );
                Err(PathError::NoPathFound {
                    expansions,
                    best_progress: progress,
                })
            }
        }
    }

    fn finish(
        &self,
        vertices: Vec<Point2>,
        width: i32,
        outcome: PathOutcome,
        expansions: usize,
        cost: f64,
    ) -> PathResult {
        let vertices = if self.params.densify {
            densify(&vertices)
        } else {
            vertices
        };
        let segments = materialize_width(&vertices, width, self.sampler);
        PathResult {
            vertices,
            segments,
            outcome,
            expansions,
            cost,
        }
    }
}

/// Walk parent links back from `goal` and return start..=goal.
fn reconstruct(scores: &FxHashMap<Point2, (f64, Option<Point2>)>, goal: Point2) -> Vec<Point2> {
    let mut path = vec![goal];
    let mut cur = goal;
    while let Some(&(_, Some(parent))) = scores.get(&cur) {
        path.push(parent);
        cur = parent;
    }
    path.reverse();
    path
}
