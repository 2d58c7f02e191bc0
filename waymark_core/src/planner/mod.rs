// Graph planners: which node pairs should be connected.
//
// Every planner has the same contract: take a list of node positions and a
// maximum edge length, return undirected edges as `EdgeKey`s. Planners are
// pure functions. They hold no state between passes and never touch the
// terrain.
//
// Module overview:
// - `delaunay.rs`:              Bowyer–Watson triangulation.
// - `knn.rs`:                   Adaptive-radius k-nearest-neighbor linking.
// - `relative_neighborhood.rs`: RNG lune test over all pairs.
// - `mst.rs`:                   Kruskal MST plus incremental add/remove repair.
// - `constraints.rs`:           Gabriel and minimum-angle pruning, greedy
//                               sparsification, segment crossing test.
// - `connector.rs`:             Union-find and component bridging.
//
// `plan_edges` strings these together according to `GraphParams`:
// dedup + canonical sort, run the chosen algorithm, prune (Gabriel, angle,
// or the dual filter doing both), optionally sparsify, then bridge any
// components the pruning split apart.
//
// **Critical constraint: determinism.** Inputs are deduplicated and sorted by
// `(x, z)` before any planner sees them, and outputs are returned sorted by
// `EdgeKey`. Two calls with the same point set in any order give the same
// edges.

pub mod connector;
pub mod constraints;
pub mod delaunay;
pub mod knn;
pub mod mst;
pub mod relative_neighborhood;

use crate::config::{GraphAlgorithm, GraphParams};
use crate::types::{EdgeKey, Point2};
use log::debug;

/// Sort by `(x, z)` and drop duplicate positions.
pub fn dedup_points(points: &[Point2]) -> Vec<Point2> {
    let mut pts = points.to_vec();
    pts.sort_unstable();
    pts.dedup();
    pts
}

/// `max_len²` as an `f64`, for comparing against exact `i64` squared lengths.
pub(crate) fn max_len_sq(max_len: f64) -> f64 {
    max_len * max_len
}

pub(crate) fn within(a: Point2, b: Point2, max_len: f64) -> bool {
    (a.dist_sq(b) as f64) <= max_len_sq(max_len)
}

/// Run a full planning pass over `points`.
pub fn plan_edges(points: &[Point2], params: &GraphParams) -> Vec<EdgeKey> {
    let pts = dedup_points(points);
    let max_len = params.max_edge_length;

    let mut edges = match params.algorithm {
        GraphAlgorithm::Delaunay => delaunay::triangulate(&pts, max_len),
        GraphAlgorithm::Knn => knn::plan(&pts, params),
        GraphAlgorithm::RelativeNeighborhood => relative_neighborhood::plan(&pts, max_len),
        GraphAlgorithm::MinimumSpanningTree => mst::minimum_spanning_tree(&pts, max_len),
    };
    let raw = edges.len();

    let min_angle = params.min_angle_degrees;
    if params.optimize_structure {
        if params.apply_gabriel {
            edges = constraints::apply_gabriel(&pts, &edges);
        }
        edges = constraints::optimize_structure(&pts, &edges, min_angle);
    } else {
        edges = match (params.apply_gabriel, params.apply_min_angle) {
            (true, true) => constraints::apply_dual(&pts, &edges, min_angle),
            (true, false) => constraints::apply_gabriel(&pts, &edges),
            (false, true) => constraints::apply_min_angle(&pts, &edges, min_angle),
            (false, false) => edges,
        };
    }
    if params.connect_components {
        edges = connector::connect_components(&pts, &edges, params);
    }

    edges.sort_unstable();
    edges.dedup();
    debug!(
        "{:?} pass: {} nodes, {} raw edges, {} after constraints",
        params.algorithm,
        pts.len(),
        raw,
        edges.len()
    );
    edges
}
