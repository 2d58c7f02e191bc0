// Node/edge graph store.
//
// `GraphStore` is the authoritative record of discovered nodes, the
// connections planned between them, and the finished route for each
// completed connection. It is shared between the discovery side (which
// inserts nodes), the planners (which insert `Planned` edges), and
// generation workers (which claim edges and report results).
//
// ## Edge lifecycle
//
// `EdgeStatus` is a small state machine:
//
//   Planned ──claim──> Generating ──> Completed
//                           └──────> Failed ──replace_failed──> (new) Planned
//
// `EdgeStatus::can_transition` is the single source of truth for legal
// moves. Each edge lives in an `EdgeSlot` whose status is an `AtomicU8`;
// `transition` performs a compare-and-swap against the expected old status,
// so two workers can never both claim the same edge and a completed edge can
// never silently revert. The only way back to `Planned` is
// `replace_failed`, which removes the failed record under the write lock and
// inserts a fresh slot.
//
// ## Locking
//
// Map structure (insert/remove of nodes and edges) goes through
// `parking_lot::RwLock`s; status changes only take the read lock and rely on
// the slot's atomic. Edges are keyed by the symmetric `EdgeKey`, so the map
// can never hold both `(a, b)` and `(b, a)`.
//
// See also: `network.rs` which drives claims and completions,
// `planner/mod.rs` for where `Planned` edges come from, `types.rs` for
// `EdgeKey` and `Node`.
//
// **Critical constraint: determinism.** Nodes and edges are held in
// `BTreeMap`s; snapshots and claims iterate in `EdgeKey` order.

use crate::error::TransitionError;
use crate::types::{EdgeKey, Node, PathSegment, Point2, RoadSpan};
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle status of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeStatus {
    /// Chosen by a planner (or an operator); no route yet.
    Planned,
    /// A worker has claimed the edge and is searching for a route.
    Generating,
    /// A route exists and is stored.
    Completed,
    /// The pathfinder gave up.
    Failed,
}

impl EdgeStatus {
    /// Whether `self -> to` is a legal move.
    pub fn can_transition(self, to: EdgeStatus) -> bool {
        matches!(
            (self, to),
            (EdgeStatus::Planned, EdgeStatus::Generating)
                | (EdgeStatus::Generating, EdgeStatus::Completed)
                | (EdgeStatus::Generating, EdgeStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EdgeStatus::Completed | EdgeStatus::Failed)
    }

    fn to_u8(self) -> u8 {
        match self {
            EdgeStatus::Planned => 0,
            EdgeStatus::Generating => 1,
            EdgeStatus::Completed => 2,
            EdgeStatus::Failed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => EdgeStatus::Planned,
            1 => EdgeStatus::Generating,
            2 => EdgeStatus::Completed,
            _ => EdgeStatus::Failed,
        }
    }
}

/// Check a transition without touching any edge.
pub fn transition(from: EdgeStatus, to: EdgeStatus) -> Result<(), TransitionError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

/// One connection record. Endpoints and the manual flag are fixed for the
/// slot's life; only the status moves.
struct EdgeSlot {
    key: EdgeKey,
    manual: bool,
    status: AtomicU8,
}

impl EdgeSlot {
    fn new(key: EdgeKey, manual: bool) -> Self {
        Self {
            key,
            manual,
            status: AtomicU8::new(EdgeStatus::Planned.to_u8()),
        }
    }

    fn status(&self) -> EdgeStatus {
        EdgeStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn compare_exchange(&self, from: EdgeStatus, to: EdgeStatus) -> Result<(), TransitionError> {
        transition(from, to)?;
        self.status
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| TransitionError::StatusMismatch {
                expected: from,
                actual: EdgeStatus::from_u8(actual),
            })
    }
}

/// Read-only view of a connection, for visualization and persistence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeView {
    pub key: EdgeKey,
    pub status: EdgeStatus,
    pub manual: bool,
}

/// Outcome of `plan_edge`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A new `Planned` record was created.
    Inserted,
    /// A record already exists for the pair; nothing changed.
    Existing(EdgeStatus),
}

/// A stored route and its annotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredPath {
    pub segments: Vec<PathSegment>,
    pub spans: Vec<RoadSpan>,
    /// False when the route is a partial path accepted at the step budget.
    pub complete: bool,
}

/// Authoritative node and edge store.
#[derive(Default)]
pub struct GraphStore {
    nodes: RwLock<BTreeMap<Point2, Node>>,
    edges: RwLock<BTreeMap<EdgeKey, Arc<EdgeSlot>>>,
    paths: RwLock<BTreeMap<EdgeKey, Arc<StoredPath>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- nodes --------------------------------------------------------------

    /// Insert a node unless one already exists at its position. Returns
    /// `true` if inserted.
    pub fn insert_node(&self, node: Node) -> bool {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.pos) {
            return false;
        }
        nodes.insert(node.pos, node);
        true
    }

    pub fn node(&self, pos: Point2) -> Option<Node> {
        self.nodes.read().get(&pos).cloned()
    }

    pub fn contains_node(&self, pos: Point2) -> bool {
        self.nodes.read().contains_key(&pos)
    }

    /// All nodes, in position order.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    /// All node positions, in position order.
    pub fn positions(&self) -> Vec<Point2> {
        self.nodes.read().keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    // -- edges --------------------------------------------------------------

    /// Record a `Planned` connection between `a` and `b` unless the pair
    /// already has one. Failed records are left alone here; superseding them
    /// is `replace_failed`'s job.
    pub fn plan_edge(&self, a: Point2, b: Point2, manual: bool) -> PlanOutcome {
        let key = EdgeKey::new(a, b);
        let mut edges = self.edges.write();
        if let Some(slot) = edges.get(&key) {
            return PlanOutcome::Existing(slot.status());
        }
        edges.insert(key, Arc::new(EdgeSlot::new(key, manual)));
        PlanOutcome::Inserted
    }

    /// Supersede a `Failed` record for the pair with a fresh `Planned` one.
    /// Also drops any stored path for the pair.
    pub fn replace_failed(&self, a: Point2, b: Point2, manual: bool) -> Result<(), TransitionError> {
        let key = EdgeKey::new(a, b);
        let mut edges = self.edges.write();
        let current = edges
            .get(&key)
            .map(|slot| slot.status())
            .ok_or(TransitionError::UnknownEdge)?;
        if current != EdgeStatus::Failed {
            debug!("refusing to replace {key}: status is {current:?}");
            return Err(TransitionError::StatusMismatch {
                expected: EdgeStatus::Failed,
                actual: current,
            });
        }
        edges.insert(key, Arc::new(EdgeSlot::new(key, manual)));
        drop(edges);
        self.paths.write().remove(&key);
        debug!("replaced failed edge {key} with a planned one");
        Ok(())
    }

    pub fn status(&self, key: EdgeKey) -> Option<EdgeStatus> {
        self.edges.read().get(&key).map(|slot| slot.status())
    }

    pub fn is_manual(&self, key: EdgeKey) -> Option<bool> {
        self.edges.read().get(&key).map(|slot| slot.manual)
    }

    /// Compare-and-swap the status of `key` from `from` to `to`.
    pub fn transition(
        &self,
        key: EdgeKey,
        from: EdgeStatus,
        to: EdgeStatus,
    ) -> Result<(), TransitionError> {
        let slot = self
            .edges
            .read()
            .get(&key)
            .cloned()
            .ok_or(TransitionError::UnknownEdge)?;
        let result = slot.compare_exchange(from, to);
        if let Err(e) = &result {
            debug!("edge {key}: {e}");
        }
        result
    }

    /// Claim the first `Planned` edge in key order, moving it to
    /// `Generating`. Concurrent callers never receive the same edge.
    pub fn claim_next_planned(&self) -> Option<EdgeKey> {
        let edges = self.edges.read();
        edges.values().find_map(|slot| {
            slot.compare_exchange(EdgeStatus::Planned, EdgeStatus::Generating)
                .ok()
                .map(|()| slot.key)
        })
    }

    /// Snapshot of every connection with its status.
    pub fn edge_views(&self) -> Vec<EdgeView> {
        self.edges
            .read()
            .values()
            .map(|slot| EdgeView {
                key: slot.key,
                status: slot.status(),
                manual: slot.manual,
            })
            .collect()
    }

    /// Every edge key regardless of status, in key order.
    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        self.edges.read().keys().copied().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    pub fn count_with_status(&self, status: EdgeStatus) -> usize {
        self.edges
            .read()
            .values()
            .filter(|slot| slot.status() == status)
            .count()
    }

    // -- paths --------------------------------------------------------------

    pub fn set_path(&self, key: EdgeKey, path: StoredPath) {
        self.paths.write().insert(key, Arc::new(path));
    }

    pub fn path(&self, key: EdgeKey) -> Option<Arc<StoredPath>> {
        self.paths.read().get(&key).cloned()
    }
}
