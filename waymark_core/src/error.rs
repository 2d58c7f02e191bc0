// Error taxonomy.
//
// One enum per concern. None of these ever surface as a process-level
// failure: the orchestrator (`network.rs`) turns a `PathError` into a
// `Failed` edge, the discovery coordinator logs and drops tasks with an
// `InvalidTargetFilter`, and `WorkerPoolUnavailable` only triggers the
// synchronous fallback. A partial path is not an error at all; see
// `PathOutcome::Partial` in `pathfinding/astar.rs`.

use crate::graph::EdgeStatus;
use thiserror::Error;

/// Why the pathfinder produced no route.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    /// The step budget ran out and the best node reached did not make enough
    /// progress to be accepted as a partial path.
    #[error("no path found after {expansions} expansions (best progress {best_progress:.2})")]
    NoPathFound { expansions: usize, best_progress: f64 },

    /// Every reachable state was expanded without reaching the goal.
    #[error("goal unreachable; open set exhausted after {expansions} expansions")]
    Unreachable { expansions: usize },

    #[error("invalid path request: {0}")]
    InvalidRequest(String),
}

/// Rejected edge status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid edge transition {from:?} -> {to:?}")]
    InvalidTransition { from: EdgeStatus, to: EdgeStatus },

    /// The compare-and-swap lost: someone else moved the edge first.
    #[error("edge status was {actual:?}, expected {expected:?}")]
    StatusMismatch { expected: EdgeStatus, actual: EdgeStatus },

    #[error("no such edge")]
    UnknownEdge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("invalid target filter: {0:?}")]
    InvalidTargetFilter(String),

    #[error("worker pool unavailable: {0}")]
    WorkerPoolUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
