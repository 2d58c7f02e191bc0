// Relative neighborhood graph.
//
// `(a, b)` is an edge iff no third point `c` is closer to both `a` and `b`
// than they are to each other, i.e. the lune (intersection of the two
// circles of radius `|ab|` centered at each endpoint) is empty. Plain
// O(n³): each candidate pair scans every other point. Region node sets are
// tens to low hundreds, and the pair scan runs on the rayon pool.
//
// The RNG is a subgraph of the Gabriel graph and of the Delaunay
// triangulation, and contains the Euclidean MST, so on an unbounded
// `max_len` it is always connected.

use crate::planner::within;
use crate::types::{EdgeKey, Point2};
use rayon::prelude::*;

/// Does some point other than `a` and `b` lie strictly inside the lune of `ab`?
fn lune_occupied(points: &[Point2], a: Point2, b: Point2) -> bool {
    let d = a.dist_sq(b);
    points
        .iter()
        .any(|&c| c != a && c != b && a.dist_sq(c) < d && b.dist_sq(c) < d)
}

/// Plan edges over `points` (deduplicated, sorted).
pub fn plan(points: &[Point2], max_len: f64) -> Vec<EdgeKey> {
    let mut edges: Vec<EdgeKey> = (0..points.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let a = points[i];
            points[i + 1..]
                .iter()
                .filter(move |&&b| within(a, b, max_len) && !lune_occupied(points, a, b))
                .map(move |&b| EdgeKey::new(a, b))
        })
        .collect();
    edges.sort_unstable();
    edges
}
