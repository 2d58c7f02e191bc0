// Bowyer–Watson Delaunay triangulation.
//
// Points are inserted one at a time into a triangulation seeded with a
// synthetic super-triangle that encloses the bounding box with a margin of
// twice its longer side. Each insertion removes every triangle whose
// circumcircle strictly contains the new point, collects the boundary of the
// resulting cavity (edges that occur once among the removed triangles), and
// fans new triangles from the boundary to the point.
//
// All predicates are exact integer determinants in `i128`. The circumcircle
// test never computes a center or a radius, so nearly-degenerate triangles
// cannot produce NaN or a wrong sign. Coordinates beyond roughly ±2^28
// (super-triangle included) can overflow the incircle determinant; world
// coordinates stay well inside that.
//
// Co-circular points (e.g. the four corners of a square) are resolved by
// insertion order: a point exactly on a circumcircle does not invalidate the
// triangle. Since insertion order is the canonical `(x, z)` order, the
// resulting diagonal is deterministic.
//
// When every input point is collinear there is no triangle to keep; the
// sorted points are then chained consecutively.

use crate::planner::within;
use crate::types::{EdgeKey, Point2};
use log::trace;
use std::collections::{BTreeMap, BTreeSet};

type Vertex = (i64, i64);

fn orient(a: Vertex, b: Vertex, c: Vertex) -> i128 {
    let abx = (b.0 - a.0) as i128;
    let abz = (b.1 - a.1) as i128;
    let acx = (c.0 - a.0) as i128;
    let acz = (c.1 - a.1) as i128;
    abx * acz - abz * acx
}

/// Positive iff `d` lies strictly inside the circumcircle of the
/// counter-clockwise triangle `(a, b, c)`.
fn incircle(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> i128 {
    let row = |p: Vertex| {
        let x = (p.0 - d.0) as i128;
        let z = (p.1 - d.1) as i128;
        (x, z, x * x + z * z)
    };
    let (ax, az, aw) = row(a);
    let (bx, bz, bw) = row(b);
    let (cx, cz, cw) = row(c);
    ax * (bz * cw - bw * cz) - az * (bx * cw - bw * cx) + aw * (bx * cz - bz * cx)
}

fn collinear(points: &[Point2]) -> bool {
    let Some((&first, rest)) = points.split_first() else {
        return true;
    };
    let Some(&second) = rest.iter().find(|&&p| p != first) else {
        return true;
    };
    let v = |p: Point2| (p.x as i64, p.z as i64);
    rest.iter().all(|&p| orient(v(first), v(second), v(p)) == 0)
}

fn chain(points: &[Point2], max_len: f64) -> Vec<EdgeKey> {
    points
        .windows(2)
        .filter(|w| within(w[0], w[1], max_len))
        .map(|w| EdgeKey::new(w[0], w[1]))
        .collect()
}

/// Triangulate `points` (deduplicated, sorted) and return every triangle edge
/// no longer than `max_len`, sorted.
pub fn triangulate(points: &[Point2], max_len: f64) -> Vec<EdgeKey> {
    if points.len() < 2 {
        return Vec::new();
    }
    if collinear(points) {
        return chain(points, max_len);
    }

    let n = points.len();
    let mut verts: Vec<Vertex> = points.iter().map(|p| (p.x as i64, p.z as i64)).collect();

    let (mut min_x, mut min_z, mut max_x, mut max_z) = (i64::MAX, i64::MAX, i64::MIN, i64::MIN);
    for &(x, z) in &verts {
        min_x = min_x.min(x);
        min_z = min_z.min(z);
        max_x = max_x.max(x);
        max_z = max_z.max(z);
    }
    let dmax = (max_x - min_x).max(max_z - min_z).max(1);
    let margin = 2 * dmax;
    let (x0, z0) = (min_x - margin, min_z - margin);
    let side = dmax + 2 * margin;
    verts.push((x0, z0));
    verts.push((x0 + 3 * side, z0));
    verts.push((x0, z0 + 3 * side));

    // Counter-clockwise vertex index triples.
    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];

    for (i, &p) in verts.iter().enumerate().take(n) {
        let (bad, good): (Vec<[usize; 3]>, Vec<[usize; 3]>) = triangles
            .into_iter()
            .partition(|t| incircle(verts[t[0]], verts[t[1]], verts[t[2]], p) > 0);
        triangles = good;

        // Undirected edge -> (occurrences, directed form of the last occurrence).
        let mut boundary: BTreeMap<(usize, usize), (u32, (usize, usize))> = BTreeMap::new();
        for t in &bad {
            for (u, v) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                let entry = boundary.entry((u.min(v), u.max(v))).or_insert((0, (u, v)));
                entry.0 += 1;
                entry.1 = (u, v);
            }
        }
        for (count, (u, v)) in boundary.into_values() {
            if count % 2 == 1 && orient(verts[u], verts[v], p) != 0 {
                triangles.push([u, v, i]);
            }
        }
    }

    let mut edges = BTreeSet::new();
    for t in triangles.iter().filter(|t| t.iter().all(|&v| v < n)) {
        for (u, v) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            if within(points[u], points[v], max_len) {
                edges.insert(EdgeKey::new(points[u], points[v]));
            }
        }
    }
    trace!("triangulated {} points into {} edges", n, edges.len());
    edges.into_iter().collect()
}
