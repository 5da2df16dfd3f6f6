//! AmrError: Unified error type for tet-amr public APIs
//!
//! Every fallible operation of the adaptation cycle returns this type. Errors fall
//! into three families (see [`ErrorClass`]): broken mesh invariants, boundary
//! protocol failures and failures reported by external callbacks. None of them is
//! recovered locally; the adapter aborts the running cycle and leaves the committed
//! mesh untouched.

use crate::topology::ids::{EdgeId, EdgeKey, NodeId, TetId};
use thiserror::Error;

/// Error type returned by the external indicator / geometry / transfer callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of an [`AmrError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Topology or template invariant violated; the cycle cannot continue.
    Invariant,
    /// Boundary exchange failed (timeouts after retries, malformed or conflicting messages).
    Protocol,
    /// An external callback reported failure.
    Callback,
    /// The adapter was constructed or driven with an invalid configuration.
    Config,
}

/// Unified error type for tet-amr operations.
#[derive(Debug, Error)]
pub enum AmrError {
    /// Attempted to construct a NodeId with a zero value (invalid).
    #[error("NodeId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidNodeId,
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown edge {0:?}")]
    UnknownEdge(EdgeId),
    #[error("no edge {0} in the edge store")]
    UnknownEdgeKey(EdgeKey),
    #[error("unknown tetrahedron {0:?}")]
    UnknownTet(TetId),
    #[error("node {0} appears twice in the initial mesh")]
    DuplicateNode(NodeId),
    #[error("invalid tetrahedron {nodes:?}: {reason}")]
    InvalidTet {
        nodes: [NodeId; 4],
        reason: &'static str,
    },
    /// An edge already maps to a different split node.
    #[error("edge {edge} is already split by node {existing}; refusing {requested}")]
    SplitNodeConflict {
        edge: EdgeKey,
        existing: NodeId,
        requested: NodeId,
    },
    /// The marked edges of a tet correspond to no supported template.
    #[error("tet {tet:?}: marked edges {mask:#08b} match no split template")]
    UnsupportedSplitPattern { tet: TetId, mask: u8 },
    /// A refine/derefine operator was applied to a tet in the wrong state.
    #[error("tet {tet:?}: expected {expected}, found {found}")]
    TemplateMismatch {
        tet: TetId,
        expected: String,
        found: String,
    },
    #[error("tet {0:?} is not active")]
    InactiveTet(TetId),
    #[error("tet {0:?} still has refined children")]
    UnsupportedHierarchy(TetId),
    /// An active edge is split by a node that is itself active (hanging node).
    #[error("face incompatibility: active edge {edge} is split by active node {node}")]
    FaceIncompatibility { edge: EdgeKey, node: NodeId },
    #[error("face {face:?} is shared by {count} active tets")]
    NonManifoldFace { face: [NodeId; 3], count: usize },
    #[error("tet {tet:?} has non-positive volume {volume}")]
    InvertedTet { tet: TetId, volume: f64 },
    #[error("edge {0} is locked for the rest of this adaptation cycle")]
    LockedEdge(EdgeKey),
    #[error("`{operation}` is not allowed while the cycle is {phase}")]
    PhaseViolation {
        operation: &'static str,
        phase: &'static str,
    },
    #[error("marking did not reach a local fixpoint after {passes} passes")]
    MarkingDidNotConverge { passes: usize },
    #[error("boundary exchange did not reach quiescence after {rounds} rounds")]
    QuiescenceNotReached { rounds: usize },
    #[error("no message from rank {peer} for round {round} after {attempts} attempts")]
    ExchangeTimeout { peer: usize, round: u32, attempts: u32 },
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("wire format error: {0}")]
    Wire(String),
    #[error("protocol violation by rank {peer}: {reason}")]
    ProtocolViolation { peer: usize, reason: String },
    #[error("adaptation cycle aborted: rank {rank} did not commit")]
    CycleAborted { rank: usize },
    #[error("{callback} callback failed: {source}")]
    Callback {
        callback: &'static str,
        #[source]
        source: CallbackError,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("node id space exhausted")]
    NodeIdOverflow,
    #[error("{arena} arena exceeds u32::MAX records")]
    ArenaOverflow { arena: &'static str },
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl AmrError {
    /// Which family this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            AmrError::ExchangeTimeout { .. }
            | AmrError::CommError { .. }
            | AmrError::Wire(_)
            | AmrError::ProtocolViolation { .. }
            | AmrError::CycleAborted { .. }
            | AmrError::QuiescenceNotReached { .. } => ErrorClass::Protocol,
            AmrError::Callback { .. } => ErrorClass::Callback,
            AmrError::Config(_) | AmrError::Checkpoint(_) => ErrorClass::Config,
            _ => ErrorClass::Invariant,
        }
    }

    pub(crate) fn callback(callback: &'static str, source: CallbackError) -> Self {
        AmrError::Callback { callback, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        let timeout = AmrError::ExchangeTimeout {
            peer: 1,
            round: 3,
            attempts: 4,
        };
        assert_eq!(timeout.class(), ErrorClass::Protocol);
        assert_eq!(
            AmrError::UnsupportedSplitPattern {
                tet: TetId::new(0),
                mask: 0b000101
            }
            .class(),
            ErrorClass::Invariant
        );
        let cb = AmrError::callback("indicator", "boom".into());
        assert_eq!(cb.class(), ErrorClass::Callback);
        assert!(cb.to_string().contains("indicator"));
    }
}
