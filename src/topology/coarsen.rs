//! Derefinement operators.
//!
//! Full derefinement (2:1, 4:1, 8:1) swaps the leaf children of a tet for the tet
//! itself. The children are retired into the parent's history, never deleted, so
//! a later refinement with the same pattern brings back the same ids. Partial
//! derefinement (4:2, 8:2, 8:4) is a full derefinement followed by refinement with
//! the smaller template, which reuses the split nodes it keeps.

use crate::amr_error::AmrError;
use crate::topology::ids::TetId;
use crate::topology::refine::Refiner;
use crate::topology::templates::{FACE_EDGES, SplitPattern};

impl Refiner<'_> {
    /// Inverse of 1:2.
    pub fn derefine_two_to_one(&mut self, tet: TetId) -> Result<(), AmrError> {
        self.expect_split(tet, |p| matches!(p, SplitPattern::OneToTwo { .. }))?;
        self.coarsen(tet)
    }

    /// Inverse of 1:4.
    pub fn derefine_four_to_one(&mut self, tet: TetId) -> Result<(), AmrError> {
        self.expect_split(tet, |p| matches!(p, SplitPattern::OneToFour { .. }))?;
        self.coarsen(tet)
    }

    /// Inverse of 1:8.
    pub fn derefine_eight_to_one(&mut self, tet: TetId) -> Result<(), AmrError> {
        self.expect_split(tet, |p| p == SplitPattern::OneToEight)?;
        self.coarsen(tet)
    }

    /// Turn a 1:4 split into the bisection of `keep_edge`, one of the face's edges.
    pub fn derefine_four_to_two(
        &mut self,
        tet: TetId,
        keep_edge: u8,
    ) -> Result<Vec<TetId>, AmrError> {
        self.expect_split(tet, |p| match p {
            SplitPattern::OneToFour { face } => {
                keep_edge < 6 && FACE_EDGES[face as usize] & (1 << keep_edge) != 0
            }
            _ => false,
        })?;
        self.coarsen(tet)?;
        self.refine_one_to_two(tet, keep_edge)
    }

    /// Turn a 1:8 split into the bisection of `keep_edge`.
    pub fn derefine_eight_to_two(
        &mut self,
        tet: TetId,
        keep_edge: u8,
    ) -> Result<Vec<TetId>, AmrError> {
        self.expect_split(tet, |p| p == SplitPattern::OneToEight && keep_edge < 6)?;
        self.coarsen(tet)?;
        self.refine_one_to_two(tet, keep_edge)
    }

    /// Turn a 1:8 split into the 1:4 split of `keep_face`.
    pub fn derefine_eight_to_four(
        &mut self,
        tet: TetId,
        keep_face: u8,
    ) -> Result<Vec<TetId>, AmrError> {
        self.expect_split(tet, |p| p == SplitPattern::OneToEight && keep_face < 4)?;
        self.coarsen(tet)?;
        self.refine_one_to_four(tet, keep_face)
    }

    /// Derefine `tet` down to `keep` (`None` for full derefinement); returns the
    /// tets that became active.
    pub fn derefine(
        &mut self,
        tet: TetId,
        keep: Option<SplitPattern>,
    ) -> Result<Vec<TetId>, AmrError> {
        let current = self.current_split(tet)?;
        match (current, keep) {
            (SplitPattern::OneToTwo { .. }, None) => {
                self.derefine_two_to_one(tet).map(|()| vec![tet])
            }
            (SplitPattern::OneToFour { .. }, None) => {
                self.derefine_four_to_one(tet).map(|()| vec![tet])
            }
            (SplitPattern::OneToEight, None) => {
                self.derefine_eight_to_one(tet).map(|()| vec![tet])
            }
            (SplitPattern::OneToFour { .. }, Some(SplitPattern::OneToTwo { edge })) => {
                self.derefine_four_to_two(tet, edge)
            }
            (SplitPattern::OneToEight, Some(SplitPattern::OneToTwo { edge })) => {
                self.derefine_eight_to_two(tet, edge)
            }
            (SplitPattern::OneToEight, Some(SplitPattern::OneToFour { face })) => {
                self.derefine_eight_to_four(tet, face)
            }
            (_, Some(target)) => Err(AmrError::UnsupportedSplitPattern {
                tet,
                mask: target.edge_mask(),
            }),
        }
    }

    fn current_split(&self, tet: TetId) -> Result<SplitPattern, AmrError> {
        self.mesh
            .tets
            .get(tet)?
            .split
            .ok_or_else(|| AmrError::TemplateMismatch {
                tet,
                expected: "refined tet".into(),
                found: "leaf".into(),
            })
    }

    fn expect_split(
        &self,
        tet: TetId,
        accepts: impl Fn(SplitPattern) -> bool,
    ) -> Result<(), AmrError> {
        let current = self.current_split(tet)?;
        if accepts(current) {
            Ok(())
        } else {
            Err(AmrError::UnsupportedSplitPattern {
                tet,
                mask: current.edge_mask(),
            })
        }
    }

    /// Replace the active children of `tet` by `tet`.
    fn coarsen(&mut self, tet: TetId) -> Result<(), AmrError> {
        let children = self.mesh.tets.get(tet)?.children.clone();
        if let Some(&c) = children.iter().find(|&&c| !self.mesh.active.is_active(c)) {
            return Err(AmrError::InactiveTet(c));
        }
        let (pattern, retired) = self.mesh.tets.retire_children(tet)?;
        for c in retired {
            let nodes = self.mesh.tets.nodes_of(c)?;
            self.mesh.active.remove(c, &nodes)?;
        }
        let nodes = self.mesh.tets.nodes_of(tet)?;
        self.mesh.active.insert(tet, &nodes);
        log::trace!("tet {tet:?}: retired {pattern} children");
        Ok(())
    }
}
