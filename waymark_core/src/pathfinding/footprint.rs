// Road width materialization.
//
// The search returns a thin polyline of vertices. `densify` fills in unit
// steps between consecutive vertices, and `materialize_width` turns every
// vertex into a `PathSegment` covering the road's full width.
//
// The footprint depends on the movement direction at the vertex. Axis moves
// stamp a full `(2h+1)²` square (`h = width / 2`). Diagonal moves stamp the
// same square with the two corners that lie across the direction of travel
// cut off: only cells whose lateral distance from the center line is at most
// `h` are kept. Stamping full squares along a diagonal would make the road
// visibly wider there than on the straights.
//
// Even widths round up to the next odd width, since a footprint has to be
// symmetric about its center.

use crate::cache::TerrainSampler;
use crate::types::{PathSegment, Point2, SegmentDirection};
use smallvec::SmallVec;

/// Join consecutive vertices by unit-step line interpolation. Each output
/// point differs from the previous one by at most 1 on each axis.
pub fn densify(vertices: &[Point2]) -> Vec<Point2> {
    let Some(&first) = vertices.first() else {
        return Vec::new();
    };
    let mut out = vec![first];
    for w in vertices.windows(2) {
        let (a, b) = (w[0], w[1]);
        let dx = b.x as i64 - a.x as i64;
        let dz = b.z as i64 - a.z as i64;
        let n = dx.abs().max(dz.abs());
        for i in 1..=n {
            out.push(Point2::new(
                a.x + round_div(dx * i, n) as i32,
                a.z + round_div(dz * i, n) as i32,
            ));
        }
    }
    out
}

/// `num / den` rounded half away from zero, `den > 0`.
fn round_div(num: i64, den: i64) -> i64 {
    if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((-2 * num + den) / (2 * den))
    }
}

/// Cells covered at `center` for a road of `width` moving in `direction`.
/// The center comes first.
pub fn footprint(center: Point2, direction: SegmentDirection, width: i32) -> SmallVec<[Point2; 9]> {
    let h = width.max(1) / 2;
    let limit = 2 * (h as i64) * (h as i64);
    let mut cells = SmallVec::new();
    cells.push(center);
    for dz in -h..=h {
        for dx in -h..=h {
            if dx == 0 && dz == 0 {
                continue;
            }
            let lateral = match direction {
                SegmentDirection::AxisX | SegmentDirection::AxisZ => 0,
                SegmentDirection::Diagonal1 => (dx - dz) as i64,
                SegmentDirection::Diagonal2 => (dx + dz) as i64,
            };
            if lateral * lateral <= limit {
                cells.push(center.offset(dx, dz));
            }
        }
    }
    cells
}

/// Movement direction at vertex `i`: toward the next vertex, or from the
/// previous one at the end of the path.
fn direction_at(vertices: &[Point2], i: usize) -> SegmentDirection {
    let (a, b) = match (i.checked_sub(1), vertices.get(i + 1)) {
        (_, Some(&next)) => (vertices[i], next),
        (Some(prev), None) => (vertices[prev], vertices[i]),
        (None, None) => return SegmentDirection::AxisX,
    };
    SegmentDirection::from_step(b.x - a.x, b.z - a.z)
}

/// Expand every vertex into a width-stamped `PathSegment`.
pub fn materialize_width(
    vertices: &[Point2],
    width: i32,
    sampler: &TerrainSampler,
) -> Vec<PathSegment> {
    vertices
        .iter()
        .enumerate()
        .map(|(i, &center)| {
            let direction = direction_at(vertices, i);
            PathSegment {
                center,
                height: sampler.height_at(center),
                offsets: footprint(center, direction, width),
                direction,
            }
        })
        .collect()
}
