//! Graph mutation errors.
//!
//! Every variant here is an internal-consistency failure: the correct
//! response is to abort the enclosing compilation with the attached
//! diagnostic context, never to continue with a possibly inconsistent
//! graph. "This rewrite does not apply yet" is not an error; rules report
//! it as an unchanged canonical form.

use thiserror::Error;

use crate::{
    location::LocationIdentity,
    node::{EdgeKind, NodeId},
    stage::{StageFlag, StageFlags},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The two-branch deletion precondition failed: the node still has
    /// usages that are meaningful at the current stage.
    #[error("cannot delete {node} with outstanding usages {usages:?} (completed stages: {stages:?})")]
    DeleteWithUsages {
        node: NodeId,
        usages: Vec<(NodeId, EdgeKind)>,
        stages: StageFlags,
    },

    /// An input edge of `kind` may not point at `node`.
    #[error("{kind:?} usage by {user} is not allowed on {node}")]
    DisallowedUsage {
        node: NodeId,
        user: NodeId,
        kind: EdgeKind,
    },

    /// A node declared a kill of storage that is never written.
    #[error("kill declared on {location} (completed stages: {stages:?})")]
    ImmutableKill {
        location: LocationIdentity,
        stages: StageFlags,
    },

    /// A stage flag was marked twice; flags are monotonic and set once.
    #[error("stage {flag:?} marked twice (completed stages: {stages:?})")]
    StageAlreadyMarked { flag: StageFlag, stages: StageFlags },

    /// Catch-all for structural violations (dangling handles, bad
    /// successor slots, edges that do not exist).
    #[error("{reason}: {node} (completed stages: {stages:?})")]
    InvariantViolation {
        reason: &'static str,
        node: NodeId,
        stages: StageFlags,
    },
}

pub type Result<T> = std::result::Result<T, GraphError>;
