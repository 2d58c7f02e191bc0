// Minimum spanning tree and its incremental repair.
//
// `minimum_spanning_tree` is Kruskal over every pair within the maximum edge
// length. It is both a selectable planner and the seed the incremental
// operations work from.
//
// `add_node` and `remove_node` keep a tree (or forest) valid without a full
// recompute:
// - Adding attaches the new node to its single nearest existing node. O(n),
//   never more than one new edge.
// - Removing strips every edge touching the node, finds the components the
//   surviving edges leave behind (iterative DFS), picks the shortest legal
//   bridge for each pair of components, and runs Kruskal over the components
//   with those bridges.
//
// The repaired tree is not guaranteed to be the true MST of the new node
// set. The work is proportional to the damage, not to the whole graph.

use crate::planner::connector::UnionFind;
use crate::planner::{dedup_points, within};
use crate::types::{EdgeKey, Point2};
use std::collections::{BTreeMap, BTreeSet};

/// Kruskal MST (a forest if some pairs are out of range), sorted.
pub fn minimum_spanning_tree(points: &[Point2], max_len: f64) -> Vec<EdgeKey> {
    let mut candidates: Vec<(i64, EdgeKey, usize, usize)> = Vec::new();
    for (i, &a) in points.iter().enumerate() {
        for (j, &b) in points.iter().enumerate().skip(i + 1) {
            if within(a, b, max_len) {
                let key = EdgeKey::new(a, b);
                candidates.push((key.len_sq(), key, i, j));
            }
        }
    }
    candidates.sort_unstable();

    let mut uf = UnionFind::new(points.len());
    let mut tree = Vec::with_capacity(points.len().saturating_sub(1));
    for (_, key, i, j) in candidates {
        if uf.union(i, j) {
            tree.push(key);
            if uf.component_count() == 1 {
                break;
            }
        }
    }
    tree.sort_unstable();
    tree
}

/// Attach `new_node` to its nearest node in `nodes` within `max_len`.
///
/// Returns `mst_edges` plus at most one appended edge. Ties between equally
/// near nodes go to the smaller position.
pub fn add_node(
    nodes: &[Point2],
    mst_edges: &[EdgeKey],
    new_node: Point2,
    max_len: f64,
) -> Vec<EdgeKey> {
    let mut edges = mst_edges.to_vec();
    let nearest = nodes
        .iter()
        .copied()
        .filter(|&p| p != new_node && within(p, new_node, max_len))
        .min_by_key(|&p| (p.dist_sq(new_node), p));
    if let Some(p) = nearest {
        let key = EdgeKey::new(p, new_node);
        if !edges.contains(&key) {
            edges.push(key);
        }
    }
    edges
}

/// Remove `removed` and reconnect what its edges held together.
///
/// `remaining_nodes` is the node set after the removal. Surviving edges are
/// those of `mst_edges` that touch neither `removed` nor any position outside
/// `remaining_nodes`. Returns the surviving edges plus the bridges, sorted.
pub fn remove_node(
    remaining_nodes: &[Point2],
    mst_edges: &[EdgeKey],
    removed: Point2,
    max_len: f64,
) -> Vec<EdgeKey> {
    let nodes: Vec<Point2> = dedup_points(remaining_nodes)
        .into_iter()
        .filter(|&p| p != removed)
        .collect();
    let index = |p: Point2| nodes.binary_search(&p).ok();

    let surviving: BTreeSet<EdgeKey> = mst_edges
        .iter()
        .copied()
        .filter(|e| !e.touches(removed) && index(e.lo()).is_some() && index(e.hi()).is_some())
        .collect();

    // Component id per node, by DFS over the surviving adjacency.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for e in &surviving {
        if let (Some(a), Some(b)) = (index(e.lo()), index(e.hi())) {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }
    let mut component = vec![usize::MAX; nodes.len()];
    let mut count = 0;
    for start in 0..nodes.len() {
        if component[start] != usize::MAX {
            continue;
        }
        let mut stack = vec![start];
        component[start] = count;
        while let Some(v) = stack.pop() {
            for &w in &adjacency[v] {
                if component[w] == usize::MAX {
                    component[w] = count;
                    stack.push(w);
                }
            }
        }
        count += 1;
    }

    let mut edges: Vec<EdgeKey> = surviving.into_iter().collect();
    if count > 1 {
        // Shortest legal bridge per component pair.
        let mut best: BTreeMap<(usize, usize), (i64, EdgeKey)> = BTreeMap::new();
        for (i, &a) in nodes.iter().enumerate() {
            for (j, &b) in nodes.iter().enumerate().skip(i + 1) {
                let (ci, cj) = (component[i], component[j]);
                if ci == cj || !within(a, b, max_len) {
                    continue;
                }
                let key = EdgeKey::new(a, b);
                let candidate = (key.len_sq(), key);
                best.entry((ci.min(cj), ci.max(cj)))
                    .and_modify(|cur| {
                        if candidate < *cur {
                            *cur = candidate;
                        }
                    })
                    .or_insert(candidate);
            }
        }
        let mut bridges: Vec<((i64, EdgeKey), (usize, usize))> =
            best.into_iter().map(|(pair, cand)| (cand, pair)).collect();
        bridges.sort_unstable();
        let mut uf = UnionFind::new(count);
        for ((_, key), (ci, cj)) in bridges {
            if uf.union(ci, cj) {
                edges.push(key);
            }
        }
        edges.sort_unstable();
    }
    edges
}
