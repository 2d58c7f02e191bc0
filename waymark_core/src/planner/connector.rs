// Component bridging.
//
// Pruning (Gabriel, min-angle) and the adaptive KNN radius can split the
// graph. `connect_components` merges the pieces back: it unions the existing
// edges, then walks every cross-component pair within the maximum edge
// length, shortest first, and accepts a pair if it still joins two different
// components and passes the same degree-cap and minimum-angle checks the
// planners use. It stops when one component remains or the candidates run
// out; a graph that cannot be joined legally stays split.
//
// `UnionFind` is the plain path-compressing, union-by-rank structure. The MST
// module uses it too.

use crate::config::GraphParams;
use crate::planner::constraints::Adjacency;
use crate::planner::{dedup_points, within};
use crate::types::{EdgeKey, Point2};
use log::debug;

/// Disjoint-set forest over `0..n`.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
    components: usize,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            components: n,
        }
    }

    pub fn find(&mut self, mut i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[i] != root {
            let next = self.parent[i];
            self.parent[i] = root;
            i = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`. Returns false if they were already one.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        self.components -= 1;
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn component_count(&self) -> usize {
        self.components
    }
}

/// Add bridging edges until `edges` spans one component over `points` or no
/// legal bridge remains. Endpoints of `edges` missing from `points` are
/// treated as nodes too. Returns the full edge set, sorted.
pub fn connect_components(
    points: &[Point2],
    edges: &[EdgeKey],
    params: &GraphParams,
) -> Vec<EdgeKey> {
    let mut all: Vec<Point2> = points.to_vec();
    all.extend(edges.iter().flat_map(|e| [e.lo(), e.hi()]));
    let nodes = dedup_points(&all);
    let index = |p: Point2| nodes.binary_search(&p).ok();

    let mut uf = UnionFind::new(nodes.len());
    for e in edges {
        if let (Some(a), Some(b)) = (index(e.lo()), index(e.hi())) {
            uf.union(a, b);
        }
    }
    let mut adj = Adjacency::with_edges(params.min_angle_degrees, edges);
    if uf.component_count() <= 1 {
        return adj.into_edges();
    }

    let mut candidates: Vec<(i64, EdgeKey, usize, usize)> = Vec::new();
    for (i, &a) in nodes.iter().enumerate() {
        for (j, &b) in nodes.iter().enumerate().skip(i + 1) {
            if !uf.connected(i, j) && within(a, b, params.max_edge_length) {
                let key = EdgeKey::new(a, b);
                candidates.push((key.len_sq(), key, i, j));
            }
        }
    }
    candidates.sort_unstable();

    let before = uf.component_count();
    let mut bridges = 0usize;
    for (_, key, i, j) in candidates {
        if uf.component_count() == 1 {
            break;
        }
        let (a, b) = key.endpoints();
        if uf.connected(i, j)
            || adj.degree(a) >= params.max_degree
            || adj.degree(b) >= params.max_degree
            || !adj.angle_ok(a, b)
        {
            continue;
        }
        adj.insert(key);
        uf.union(i, j);
        bridges += 1;
    }
    debug!(
        "connector: {} components -> {} with {} bridges",
        before,
        uf.component_count(),
        bridges
    );
    adj.into_edges()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, z: i32) -> Point2 {
        Point2::new(x, z)
    }

    #[test]
    fn union_find_basics() {
        let mut uf = UnionFind::new(5);
        assert_eq!(uf.component_count(), 5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert!(uf.connected(0, 1));
        assert!(!uf.connected(1, 3));
        assert!(uf.union(1, 4));
        assert!(uf.connected(0, 3));
        assert_eq!(uf.component_count(), 2);
    }

    #[test]
    fn bridges_two_clusters_with_shortest_link() {
        let points = [p(0, 0), p(10, 0), p(100, 0), p(110, 0)];
        let edges = [EdgeKey::new(p(0, 0), p(10, 0)), EdgeKey::new(p(100, 0), p(110, 0))];
        let out = connect_components(&points, &edges, &GraphParams::default());
        assert_eq!(out.len(), 3);
        assert!(out.contains(&EdgeKey::new(p(10, 0), p(100, 0))));
    }

    #[test]
    fn respects_max_length() {
        let points = [p(0, 0), p(1000, 0)];
        let params = GraphParams {
            max_edge_length: 500.0,
            ..GraphParams::default()
        };
        assert!(connect_components(&points, &[], &params).is_empty());
    }

    #[test]
    fn respects_degree_cap() {
        // The hub is closest but already at the cap.
        let hub = p(0, 0);
        let spokes = [p(100, 0), p(0, 100), p(-100, 0), p(0, -100)];
        let mut points = vec![hub, p(10, 10)];
        points.extend(spokes);
        let edges: Vec<EdgeKey> = spokes.iter().map(|&s| EdgeKey::new(hub, s)).collect();
        let params = GraphParams {
            max_degree: 4,
            min_angle_degrees: 0.0,
            ..GraphParams::default()
        };
        let out = connect_components(&points, &edges, &params);
        assert_eq!(out.len(), 5);
        assert!(!out.contains(&EdgeKey::new(hub, p(10, 10))));
        assert!(out.contains(&EdgeKey::new(p(0, 100), p(10, 10))));
    }

    #[test]
    fn angle_check_can_leave_graph_split() {
        // Every bridge to (10, 10) runs within ~6 degrees of a spoke.
        let hub = p(0, 0);
        let spokes = [p(100, 0), p(0, 100), p(-100, 0), p(0, -100)];
        let mut points = vec![hub, p(10, 10)];
        points.extend(spokes);
        let edges: Vec<EdgeKey> = spokes.iter().map(|&s| EdgeKey::new(hub, s)).collect();
        let params = GraphParams {
            max_degree: 4,
            min_angle_degrees: 10.0,
            ..GraphParams::default()
        };
        assert_eq!(connect_components(&points, &edges, &params).len(), 4);
    }

    #[test]
    fn already_connected_is_unchanged() {
        let edges = vec![EdgeKey::new(p(0, 0), p(5, 5)), EdgeKey::new(p(5, 5), p(9, 0))];
        let points = [p(0, 0), p(5, 5), p(9, 0)];
        let out = connect_components(&points, &edges, &GraphParams::default());
        assert_eq!(out, edges);
    }
}
