// Adaptive-radius k-nearest-neighbor linking.
//
// For every node the nearest-neighbor distance `nn` is computed first. A pair
// `(i, j)` is a candidate only if it is shorter than
// `alpha * max(nn_i, nn_j)` (and within the maximum edge length). The radius
// adapts to local density: a node in a sparse region will not reach across
// the map just because its k-th neighbor is far away, while nodes in a
// cluster still link to each other.
//
// Nodes are processed in canonical `(x, z)` order, candidates closest first,
// and up to `k` edges are accepted per node (edges accepted earlier by a
// neighbor count toward `k`). A candidate is rejected if:
// - another candidate of the same node is closer to both endpoints than they
//   are to each other (a local Gabriel-style check),
// - either endpoint has reached `max_degree`, or
// - it sits closer than `min_angle_degrees` to an edge already accepted at
//   either endpoint.
//
// Acceptance is order-dependent and therefore not a global optimum. With the
// canonical input order the result is still fully reproducible.

use crate::config::GraphParams;
use crate::planner::constraints::Adjacency;
use crate::planner::max_len_sq;
use crate::types::{EdgeKey, Point2};
use rayon::prelude::*;

/// Squared nearest-neighbor distance per point (`i64::MAX` for a lone point).
fn nearest_neighbor_sq(points: &[Point2]) -> Vec<i64> {
    points
        .par_iter()
        .enumerate()
        .map(|(i, &p)| {
            points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &q)| p.dist_sq(q))
                .min()
                .unwrap_or(i64::MAX)
        })
        .collect()
}

/// Plan edges over `points` (deduplicated, sorted).
pub fn plan(points: &[Point2], params: &GraphParams) -> Vec<EdgeKey> {
    if points.len() < 2 {
        return Vec::new();
    }
    let nn = nearest_neighbor_sq(points);
    let alpha_sq = params.knn_alpha * params.knn_alpha;
    let max_sq = max_len_sq(params.max_edge_length);

    let mut adj = Adjacency::new(params.min_angle_degrees);
    for (i, &p) in points.iter().enumerate() {
        let mut candidates: Vec<(i64, Point2)> = points
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .filter_map(|(j, &q)| {
                let d = p.dist_sq(q);
                let radius_sq = nn[i].max(nn[j]) as f64 * alpha_sq;
                (d as f64 <= radius_sq && d as f64 <= max_sq).then_some((d, q))
            })
            .collect();
        candidates.sort_unstable();

        let mut accepted = candidates
            .iter()
            .filter(|&&(_, q)| adj.contains(EdgeKey::new(p, q)))
            .count();
        for &(d, q) in &candidates {
            if accepted >= params.knn_k {
                break;
            }
            let key = EdgeKey::new(p, q);
            if adj.contains(key) {
                continue;
            }
            let blocked = candidates
                .iter()
                .any(|&(dc, c)| c != q && dc < d && q.dist_sq(c) < d);
            if blocked
                || adj.degree(p) >= params.max_degree
                || adj.degree(q) >= params.max_degree
                || !adj.angle_ok(p, q)
            {
                continue;
            }
            adj.insert(key);
            accepted += 1;
        }
    }
    adj.into_edges()
}
