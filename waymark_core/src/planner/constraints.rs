// Geometric constraint filters.
//
// Pure post-processing over an edge list:
//
// - `apply_gabriel` drops `(a, b)` if any other node lies strictly inside
//   the circle with diameter `ab`. Exact integer test: `p` is inside iff
//   `|2p - a - b|² < |a - b|²`.
// - `apply_min_angle` walks the edges in the given order and keeps an edge
//   only if, at both endpoints, it makes at least `min_degrees` with every
//   edge already kept there. The comparison is on cosines: the threshold's
//   cosine is computed once and no inverse trig is needed.
// - `apply_dual` is Gabriel, then angle. Gabriel pruning thins the candidate
//   set first so the angle pass sees a sparser, more meaningful fan.
// - `optimize_structure` re-inserts edges shortest first and applies the
//   angle test, a greedy sparsification that does not care which planner
//   produced the candidates.
//
// `Adjacency` is the incremental bookkeeping the angle test needs; the KNN
// planner and the component connector reuse it for their degree caps.
//
// See also: `planner/mod.rs` for the pass ordering, `knn.rs` and
// `connector.rs` for the other `Adjacency` users.

use crate::planner::dedup_points;
use crate::types::{EdgeKey, Point2};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Edges accepted so far, indexed by endpoint, with an angle threshold.
pub(crate) struct Adjacency {
    neighbors: BTreeMap<Point2, Vec<Point2>>,
    edges: BTreeSet<EdgeKey>,
    cos_min: f64,
}

impl Adjacency {
    pub(crate) fn new(min_degrees: f64) -> Self {
        Self {
            neighbors: BTreeMap::new(),
            edges: BTreeSet::new(),
            cos_min: min_degrees.to_radians().cos(),
        }
    }

    /// Seed with an existing edge set, bypassing the checks.
    pub(crate) fn with_edges(min_degrees: f64, edges: &[EdgeKey]) -> Self {
        let mut adj = Self::new(min_degrees);
        for &e in edges {
            adj.insert(e);
        }
        adj
    }

    pub(crate) fn contains(&self, key: EdgeKey) -> bool {
        self.edges.contains(&key)
    }

    pub(crate) fn degree(&self, p: Point2) -> usize {
        self.neighbors.get(&p).map_or(0, Vec::len)
    }

    /// Whether `a-b` keeps at least the minimum angle to every existing edge
    /// at both `a` and `b`.
    pub(crate) fn angle_ok(&self, a: Point2, b: Point2) -> bool {
        self.angle_ok_at(a, b) && self.angle_ok_at(b, a)
    }

    fn angle_ok_at(&self, center: Point2, toward: Point2) -> bool {
        let Some(existing) = self.neighbors.get(&center) else {
            return true;
        };
        existing
            .iter()
            .all(|&other| other == toward || cos_angle(center, toward, other) <= self.cos_min)
    }

    pub(crate) fn insert(&mut self, key: EdgeKey) -> bool {
        if !self.edges.insert(key) {
            return false;
        }
        let (a, b) = key.endpoints();
        self.neighbors.entry(a).or_default().push(b);
        self.neighbors.entry(b).or_default().push(a);
        true
    }

    pub(crate) fn into_edges(self) -> Vec<EdgeKey> {
        self.edges.into_iter().collect()
    }
}

/// Cosine of the angle at `center` between rays to `a` and `b`.
/// Degenerate rays (zero length) count as perfectly aligned.
fn cos_angle(center: Point2, a: Point2, b: Point2) -> f64 {
    let (cx, cz) = (center.x as i64, center.z as i64);
    let (ux, uz) = ((a.x as i64 - cx) as f64, (a.z as i64 - cz) as f64);
    let (vx, vz) = ((b.x as i64 - cx) as f64, (b.z as i64 - cz) as f64);
    let nu = (ux * ux + uz * uz).sqrt();
    let nv = (vx * vx + vz * vz).sqrt();
    if nu == 0.0 || nv == 0.0 {
        return 1.0;
    }
    (ux * vx + uz * vz) / (nu * nv)
}

/// Is `p` strictly inside the circle with diameter `ab`?
pub fn in_diametral_circle(a: Point2, b: Point2, p: Point2) -> bool {
    let px = 2 * p.x as i64 - a.x as i64 - b.x as i64;
    let pz = 2 * p.z as i64 - a.z as i64 - b.z as i64;
    (px * px + pz * pz) < a.dist_sq(b)
}

/// Keep only edges whose diametral circle is empty of other nodes.
pub fn apply_gabriel(nodes: &[Point2], edges: &[EdgeKey]) -> Vec<EdgeKey> {
    let nodes = dedup_points(nodes);
    edges
        .par_iter()
        .filter(|e| {
            let (a, b) = e.endpoints();
            !nodes
                .iter()
                .any(|&p| p != a && p != b && in_diametral_circle(a, b, p))
        })
        .copied()
        .collect()
}

/// Keep edges, in the given order, that respect `min_degrees` against the
/// edges already kept at both endpoints. Edges touching a position not in
/// `nodes` are dropped.
pub fn apply_min_angle(nodes: &[Point2], edges: &[EdgeKey], min_degrees: f64) -> Vec<EdgeKey> {
    let known: BTreeSet<Point2> = nodes.iter().copied().collect();
    let mut adj = Adjacency::new(min_degrees);
    let mut kept = Vec::with_capacity(edges.len());
    for &e in edges {
        let (a, b) = e.endpoints();
        if !known.contains(&a) || !known.contains(&b) || adj.contains(e) {
            continue;
        }
        if adj.angle_ok(a, b) {
            adj.insert(e);
            kept.push(e);
        }
    }
    kept
}

/// Gabriel pruning followed by angle pruning.
pub fn apply_dual(nodes: &[Point2], edges: &[EdgeKey], min_degrees: f64) -> Vec<EdgeKey> {
    let gabriel = apply_gabriel(nodes, edges);
    apply_min_angle(nodes, &gabriel, min_degrees)
}

/// Greedy sparsification: shortest edges first, each kept only if it passes
/// the angle test against edges kept before it.
pub fn optimize_structure(nodes: &[Point2], edges: &[EdgeKey], min_degrees: f64) -> Vec<EdgeKey> {
    let mut sorted = edges.to_vec();
    sorted.sort_by_key(|e| (e.len_sq(), *e));
    apply_min_angle(nodes, &sorted, min_degrees)
}

fn orient(a: Point2, b: Point2, c: Point2) -> i128 {
    let abx = b.x as i128 - a.x as i128;
    let abz = b.z as i128 - a.z as i128;
    let acx = c.x as i128 - a.x as i128;
    let acz = c.z as i128 - a.z as i128;
    abx * acz - abz * acx
}

/// Do segments `ab` and `cd` cross at a point interior to both? Segments
/// that merely share an endpoint do not cross; collinear overlap does.
pub fn segments_cross(a: Point2, b: Point2, c: Point2, d: Point2) -> bool {
    if a == c || a == d || b == c || b == d {
        return false;
    }
    let o1 = orient(a, b, c).signum();
    let o2 = orient(a, b, d).signum();
    let o3 = orient(c, d, a).signum();
    let o4 = orient(c, d, b).signum();
    if o1 != o2 && o3 != o4 && o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0 {
        return true;
    }
    let on_segment = |p: Point2, q: Point2, r: Point2| {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.z >= p.z.min(q.z) && r.z <= p.z.max(q.z)
    };
    (o1 == 0 && on_segment(a, b, c))
        || (o2 == 0 && on_segment(a, b, d))
        || (o3 == 0 && on_segment(c, d, a))
        || (o4 == 0 && on_segment(c, d, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waymark_prng::PlanRng;

    fn p(x: i32, z: i32) -> Point2 {
        Point2::new(x, z)
    }

    fn all_pairs(pts: &[Point2]) -> Vec<EdgeKey> {
        let mut out = Vec::new();
        for (i, &a) in pts.iter().enumerate() {
            for &b in &pts[i + 1..] {
                out.push(EdgeKey::new(a, b));
            }
        }
        out
    }

    #[test]
    fn gabriel_removes_edge_with_point_inside() {
        let nodes = [p(0, 0), p(100, 0), p(50, 10)];
        let edges = all_pairs(&nodes);
        let kept = apply_gabriel(&nodes, &edges);
        assert!(!kept.contains(&EdgeKey::new(p(0, 0), p(100, 0))));
        assert!(kept.contains(&EdgeKey::new(p(0, 0), p(50, 10))));
        assert!(kept.contains(&EdgeKey::new(p(100, 0), p(50, 10))));
    }

    #[test]
    fn gabriel_boundary_point_is_not_inside() {
        // (50, 50) sits exactly on the circle with diameter (0,0)-(100,0).
        let nodes = [p(0, 0), p(100, 0), p(50, 50)];
        let kept = apply_gabriel(&nodes, &[EdgeKey::new(p(0, 0), p(100, 0))]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn gabriel_soundness_on_random_clouds() {
        let mut rng = PlanRng::new(10);
        for _ in 0..20 {
            let nodes: Vec<Point2> = (0..25)
                .map(|_| p(rng.range_i32(-300, 300), rng.range_i32(-300, 300)))
                .collect();
            let nodes = dedup_points(&nodes);
            let kept = apply_gabriel(&nodes, &all_pairs(&nodes));
            for e in &kept {
                let (a, b) = e.endpoints();
                for &q in &nodes {
                    if q != a && q != b {
                        assert!(!in_diametral_circle(a, b, q), "{q} inside circle of {e}");
                    }
                }
            }
        }
    }

    #[test]
    fn min_angle_rejects_near_parallel_edges() {
        let nodes = [p(0, 0), p(100, 0), p(100, 10), p(0, 100)];
        let edges = [
            EdgeKey::new(p(0, 0), p(100, 0)),
            // ~5.7 degrees from the first edge at (0, 0).
            EdgeKey::new(p(0, 0), p(100, 10)),
            EdgeKey::new(p(0, 0), p(0, 100)),
        ];
        let kept = apply_min_angle(&nodes, &edges, 20.0);
        assert_eq!(kept, vec![edges[0], edges[2]]);
    }

    #[test]
    fn min_angle_zero_keeps_everything_distinct() {
        let nodes = [p(0, 0), p(100, 0), p(100, 10)];
        let edges = all_pairs(&nodes);
        assert_eq!(apply_min_angle(&nodes, &edges, 0.0).len(), 3);
    }

    #[test]
    fn min_angle_drops_edges_to_unknown_nodes() {
        let nodes = [p(0, 0), p(10, 0)];
        let edges = [EdgeKey::new(p(0, 0), p(10, 0)), EdgeKey::new(p(0, 0), p(0, 10))];
        assert_eq!(apply_min_angle(&nodes, &edges, 10.0), vec![edges[0]]);
    }

    #[test]
    fn optimize_structure_prefers_short_edges() {
        let nodes = [p(0, 0), p(50, 2), p(200, 0)];
        // Long edge listed first; after sorting the short one wins the fan at (0, 0).
        let edges = [EdgeKey::new(p(0, 0), p(200, 0)), EdgeKey::new(p(0, 0), p(50, 2))];
        let kept = optimize_structure(&nodes, &edges, 15.0);
        assert!(kept.contains(&EdgeKey::new(p(0, 0), p(50, 2))));
        assert!(!kept.contains(&EdgeKey::new(p(0, 0), p(200, 0))));
        // Plain angle filtering keeps whichever came first.
        let plain = apply_min_angle(&nodes, &edges, 15.0);
        assert!(plain.contains(&EdgeKey::new(p(0, 0), p(200, 0))));
    }

    #[test]
    fn dual_runs_gabriel_first() {
        let nodes = [p(0, 0), p(100, 0), p(50, 10), p(0, 100)];
        let edges = all_pairs(&nodes);
        let dual = apply_dual(&nodes, &edges, 10.0);
        assert!(!dual.contains(&EdgeKey::new(p(0, 0), p(100, 0))));
    }

    #[test]
    fn angles_between_far_apart_coordinates() {
        let center = p(i32::MIN + 10, 0);
        let east = p(i32::MAX, 0);
        let west = p(i32::MIN, 0);
        assert!((cos_angle(center, east, west) + 1.0).abs() < 1e-9);
        let north = p(i32::MIN + 10, i32::MAX);
        assert!(cos_angle(center, east, north).abs() < 1e-9);
    }

    #[test]
    fn crossing_detection() {
        assert!(segments_cross(p(0, 0), p(10, 10), p(0, 10), p(10, 0)));
        assert!(!segments_cross(p(0, 0), p(10, 0), p(0, 5), p(10, 5)));
        // Shared endpoint.
        assert!(!segments_cross(p(0, 0), p(10, 0), p(10, 0), p(10, 10)));
        // T-junction touching the interior.
        assert!(segments_cross(p(0, 0), p(10, 0), p(5, 0), p(5, 10)));
        // Collinear overlap.
        assert!(segments_cross(p(0, 0), p(10, 0), p(5, 0), p(15, 0)));
    }
}
