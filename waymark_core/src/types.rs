// Core types shared across the planner.
//
// Defines the planar coordinate (`Point2`), the symmetric edge key
// (`EdgeKey`), discovered nodes, and the path output types (`PathSegment`,
// `SegmentDirection`, `RoadSpan`). Everything here is plain data: no
// terrain access, no locking.
//
// Coordinates are terrain block coordinates on the horizontal plane. The
// vertical axis is never stored on a node; elevation is sampled from the
// terrain oracle on demand (see `cache.rs`).
//
// **Critical constraint: determinism.** All key types derive `Ord` so they can
// live in `BTreeMap`/`BTreeSet` and produce a canonical iteration order.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A position on the horizontal terrain plane.
///
/// Ordering is lexicographic on `(x, z)`, which is the canonical order used
/// to sort point sets before planning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point2 {
    pub x: i32,
    pub z: i32,
}

impl Point2 {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Squared Euclidean distance, exact in `i64`.
    pub fn dist_sq(self, other: Self) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dz = self.z as i64 - other.z as i64;
        dx * dx + dz * dz
    }

    pub fn distance(self, other: Self) -> f64 {
        (self.dist_sq(other) as f64).sqrt()
    }

    pub fn manhattan_distance(self, other: Self) -> u64 {
        (self.x as i64 - other.x as i64).unsigned_abs()
            + (self.z as i64 - other.z as i64).unsigned_abs()
    }

    /// Saturates at the edge of the coordinate range.
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.z.saturating_add(dz))
    }

    /// Pack into a 64-bit cache key: `x` in the high half, `z` in the low half.
    pub fn pack(self) -> u64 {
        pack_xz(self.x, self.z)
    }

    pub fn unpack(key: u64) -> Self {
        Self::new((key >> 32) as u32 as i32, key as u32 as i32)
    }
}

impl fmt::Display for Point2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Pack two coordinates into one `u64` without allocating a `Point2`.
pub fn pack_xz(x: i32, z: i32) -> u64 {
    ((x as u32 as u64) << 32) | (z as u32 as u64)
}

// ---------------------------------------------------------------------------
// Edge key
// ---------------------------------------------------------------------------

/// Symmetric key for an unordered node pair.
///
/// `EdgeKey::new(a, b) == EdgeKey::new(b, a)`: the smaller point (by `Ord`)
/// is always stored first, so a map keyed on `EdgeKey` can never hold both
/// `(a, b)` and `(b, a)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    lo: Point2,
    hi: Point2,
}

impl EdgeKey {
    pub fn new(a: Point2, b: Point2) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn lo(self) -> Point2 {
        self.lo
    }

    pub fn hi(self) -> Point2 {
        self.hi
    }

    pub fn endpoints(self) -> (Point2, Point2) {
        (self.lo, self.hi)
    }

    pub fn touches(self, p: Point2) -> bool {
        self.lo == p || self.hi == p
    }

    /// The endpoint that is not `p`. Returns `None` if `p` is not an endpoint.
    pub fn other(self, p: Point2) -> Option<Point2> {
        if self.lo == p {
            Some(self.hi)
        } else if self.hi == p {
            Some(self.lo)
        } else {
            None
        }
    }

    pub fn len_sq(self) -> i64 {
        self.lo.dist_sq(self.hi)
    }

    /// 64-bit mix of both packed endpoints, for collaborators that want a
    /// compact handle (e.g. as a persistence key).
    pub fn hash64(self) -> u64 {
        let mut h = self.lo.pack().wrapping_mul(0x9e37_79b9_7f4a_7c15);
        h ^= self.hi.pack().rotate_left(29);
        h = (h ^ (h >> 31)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        h ^ (h >> 29)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A discovered point of interest. Immutable once created; identity is the
/// position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub pos: Point2,
    /// Discovery origin tag, e.g. the target filter that found it.
    pub label: String,
    /// Caller-supplied tick at which the node was discovered.
    pub discovered_at: u64,
}

impl Node {
    pub fn new(pos: Point2, label: impl Into<String>, discovered_at: u64) -> Self {
        Self {
            pos,
            label: label.into(),
            discovered_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Path output
// ---------------------------------------------------------------------------

/// Movement direction at a path vertex. Controls how the road width is
/// stamped around the center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentDirection {
    /// Moving along the X axis.
    AxisX,
    /// Moving along the Z axis.
    AxisZ,
    /// Moving along `(+1, +1)` or `(-1, -1)`.
    Diagonal1,
    /// Moving along `(+1, -1)` or `(-1, +1)`.
    Diagonal2,
}

impl SegmentDirection {
    /// Classify a step vector. A zero step is treated as `AxisX`.
    pub fn from_step(dx: i32, dz: i32) -> Self {
        match (dx.signum(), dz.signum()) {
            (0, 0) | (_, 0) => SegmentDirection::AxisX,
            (0, _) => SegmentDirection::AxisZ,
            (sx, sz) if sx == sz => SegmentDirection::Diagonal1,
            _ => SegmentDirection::Diagonal2,
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(self, SegmentDirection::Diagonal1 | SegmentDirection::Diagonal2)
    }
}

/// One vertex of a finished route plus the ground it covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub center: Point2,
    /// Surface height at `center` when the path was computed.
    pub height: i32,
    /// Every position covered by the road at this vertex, center included.
    pub offsets: SmallVec<[Point2; 9]>,
    pub direction: SegmentDirection,
}

/// What a `RoadSpan` marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanKind {
    /// The route crosses water.
    Bridge,
    /// The route climbs or descends a sustained steep grade.
    Tunnel,
}

/// A contiguous range of path segments `[start, end)` that downstream
/// placement has to special-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadSpan {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
}

impl RoadSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
