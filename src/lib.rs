#![cfg_attr(docsrs, feature(doc_cfg))]
//! # tet-amr
//!
//! tet-amr is the adaptive refinement engine for partitioned tetrahedral meshes. Given a
//! per-element refine/derefine demand from an error indicator, it decides edge by edge how
//! the mesh must change so that every active face stays compatible with its neighbour,
//! and it makes the partitions of a distributed mesh agree on one outcome by exchanging
//! boundary messages.
//!
//! ## Features
//! - Arena stores for nodes, edges and tetrahedra that keep the full refinement history,
//!   so derefinement and re-refinement reuse the same ids
//! - Isotropic 1:2, 1:4 and 1:8 split templates with class 1–3 marking closure
//! - Full and partial derefinement (2:1, 4:1, 8:1, 4:2, 8:2, 8:4)
//! - Barrier-synchronized boundary exchange over pluggable communicators (serial,
//!   in-process threads, MPI)
//! - Transactional cycles: the solver only ever sees committed meshes
//! - serde checkpoints
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! tet-amr = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "check-invariants"]
//! ```
//!
//! One [`MeshAdapter`](adapt::MeshAdapter) runs per partition; drive a whole cycle with
//! [`run_cycle`](adapt::MeshAdapter::run_cycle) or stage by stage.
//!
//! ## Determinism
//!
//! Every decision depends on ids and coordinates only; iteration orders are ascending
//! ids, so identical inputs give identical meshes on every run.

pub mod adapt;
pub mod algs;
pub mod amr_error;
pub mod callbacks;
pub mod debug_invariants;
pub mod overlap;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::{
        AdaptConfig, BoundaryMessage, CycleSummary, MarkingReport, MeshAdapter, MeshCheckpoint,
        Phase,
    };
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::exchange::ExchangeOptions;
    pub use crate::amr_error::{AmrError, ErrorClass};
    pub use crate::callbacks::{
        ErrorIndicator, FnIndicator, GeometryModel, Midpoint, NoAdaptation, NoTransfer,
        SolutionTransfer,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::topology::ids::{EdgeId, EdgeKey, NodeId, TetId};
    pub use crate::topology::mesh::{InitialMesh, TetMesh};
    pub use crate::topology::templates::SplitPattern;
}
