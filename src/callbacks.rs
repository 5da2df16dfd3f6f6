//! Interfaces to the collaborators outside the engine: the error indicator that
//! drives adaptation, the geometry model placing new nodes and the solver's
//! solution transfer.
//!
//! All callbacks are fallible; a failure aborts the running cycle with
//! [`AmrError::Callback`](crate::amr_error::AmrError::Callback).

use crate::amr_error::CallbackError;
use crate::topology::ids::{EdgeKey, NodeId, TetId};

/// Per-element adaptation demand, queried once per active tet in
/// [`begin_cycle`](crate::adapt::MeshAdapter::begin_cycle).
pub trait ErrorIndicator {
    fn wants_refine(&mut self, tet: TetId, nodes: &[NodeId; 4]) -> Result<bool, CallbackError>;

    fn wants_derefine(&mut self, _tet: TetId, _nodes: &[NodeId; 4]) -> Result<bool, CallbackError> {
        Ok(false)
    }
}

/// Indicator built from two closures.
pub struct FnIndicator<R, D> {
    refine: R,
    derefine: D,
}

impl<R, D> FnIndicator<R, D>
where
    R: FnMut(TetId, &[NodeId; 4]) -> bool,
    D: FnMut(TetId, &[NodeId; 4]) -> bool,
{
    pub fn new(refine: R, derefine: D) -> Self {
        Self { refine, derefine }
    }
}

impl<R, D> ErrorIndicator for FnIndicator<R, D>
where
    R: FnMut(TetId, &[NodeId; 4]) -> bool,
    D: FnMut(TetId, &[NodeId; 4]) -> bool,
{
    fn wants_refine(&mut self, tet: TetId, nodes: &[NodeId; 4]) -> Result<bool, CallbackError> {
        Ok((self.refine)(tet, nodes))
    }

    fn wants_derefine(&mut self, tet: TetId, nodes: &[NodeId; 4]) -> Result<bool, CallbackError> {
        Ok((self.derefine)(tet, nodes))
    }
}

/// Indicator that asks for nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoAdaptation;

impl ErrorIndicator for NoAdaptation {
    fn wants_refine(&mut self, _tet: TetId, _nodes: &[NodeId; 4]) -> Result<bool, CallbackError> {
        Ok(false)
    }
}

/// Places the split node of an edge.
///
/// Every partition holding a shared edge evaluates this independently, so the
/// result must depend on its arguments only.
pub trait GeometryModel {
    fn split_point(
        &self,
        edge: EdgeKey,
        a: [f64; 3],
        b: [f64; 3],
    ) -> Result<[f64; 3], CallbackError>;
}

/// Straight-sided geometry: the split node is the edge midpoint.
#[derive(Copy, Clone, Debug, Default)]
pub struct Midpoint;

impl GeometryModel for Midpoint {
    fn split_point(
        &self,
        _edge: EdgeKey,
        a: [f64; 3],
        b: [f64; 3],
    ) -> Result<[f64; 3], CallbackError> {
        Ok([
            0.5 * (a[0] + b[0]),
            0.5 * (a[1] + b[1]),
            0.5 * (a[2] + b[2]),
        ])
    }
}

/// Solver hook invoked at commit for every node entering or leaving the active
/// mesh.
pub trait SolutionTransfer {
    /// `node` became active; `parents` are the endpoints of the edge it splits.
    fn interpolate_on_split(&mut self, parents: [NodeId; 2], node: NodeId)
    -> Result<(), CallbackError>;

    fn on_node_removed(&mut self, node: NodeId) -> Result<(), CallbackError>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoTransfer;

impl SolutionTransfer for NoTransfer {
    fn interpolate_on_split(
        &mut self,
        _parents: [NodeId; 2],
        _node: NodeId,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    fn on_node_removed(&mut self, _node: NodeId) -> Result<(), CallbackError> {
        Ok(())
    }
}
