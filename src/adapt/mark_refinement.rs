//! Refinement marking: complete every active tet's marked edges to a split
//! template.
//!
//! Each pass classifies the marked-edge mask of every active tet (class 1: already
//! a template; class 2: one more edge completes one; class 3: everything else,
//! completed to all six edges) and adds the missing marks. Marks are only ever
//! added, so the passes reach a fixpoint.

use crate::amr_error::AmrError;
use crate::topology::edge_store::Origin;
use crate::topology::ids::TetId;
use crate::topology::mesh::TetMesh;
use crate::topology::templates::{MarkClass, classify, edges_in};

/// Run classification passes until one adds no mark; returns the passes used.
pub(crate) fn refinement_fixpoint(mesh: &mut TetMesh, max_passes: usize) -> Result<usize, AmrError> {
    let active: Vec<TetId> = mesh.active.iter().collect();
    for pass in 1..=max_passes {
        let mut added = 0usize;
        for &t in &active {
            if mesh.fully_locked(t)? {
                continue;
            }
            let mask = mesh.refine_mask(t)?;
            let class = classify(mask);
            let missing = class.completed_mask() & !mask;
            if missing == 0 {
                continue;
            }
            if let MarkClass::Irregular = class {
                log::trace!("tet {t:?}: irregular marks {mask:#08b}, octasecting");
            }
            let edges = mesh.tets.edges_of(t)?;
            for e in edges_in(missing) {
                if mesh.edges.mark_refinement(edges[e], Origin::Local)? {
                    added += 1;
                }
            }
        }
        log::debug!("rank {}: refinement pass {pass} added {added} marks", mesh.rank());
        if added == 0 {
            return Ok(pass);
        }
    }
    Err(AmrError::MarkingDidNotConverge { passes: max_passes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ids::{EdgeKey, NodeId};
    use crate::topology::mesh::InitialMesh;

    fn n(raw: u64) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    /// Two tets sharing face 1-2-3.
    fn pair() -> TetMesh {
        let init = InitialMesh::new(
            vec![
                (n(1), [0.0, 0.0, 0.0]),
                (n(2), [1.0, 0.0, 0.0]),
                (n(3), [0.0, 1.0, 0.0]),
                (n(4), [0.0, 0.0, 1.0]),
                (n(5), [0.0, 0.0, -1.0]),
            ],
            vec![[n(1), n(2), n(3), n(4)], [n(1), n(3), n(2), n(5)]],
        );
        TetMesh::from_initial(&init, 0, 1, None).unwrap()
    }

    fn mark(mesh: &mut TetMesh, a: u64, b: u64) {
        let e = mesh.edges.find(EdgeKey::new(n(a), n(b)).unwrap()).unwrap();
        mesh.edges.mark_refinement(e, Origin::Local).unwrap();
    }

    #[test]
    fn class_two_completes_shared_face() {
        let mut mesh = pair();
        mark(&mut mesh, 1, 2);
        mark(&mut mesh, 2, 3);
        let passes = refinement_fixpoint(&mut mesh, 8).unwrap();
        assert_eq!(passes, 2);
        for t in [TetId::new(0), TetId::new(1)] {
            let mask = mesh.refine_mask(t).unwrap();
            assert_eq!(classify(mask).number(), 1);
            assert_eq!(mask.count_ones(), 3);
        }
    }

    #[test]
    fn opposite_edges_octasect_and_spread() {
        let mut mesh = pair();
        mark(&mut mesh, 1, 2);
        mark(&mut mesh, 3, 4);
        refinement_fixpoint(&mut mesh, 8).unwrap();
        assert_eq!(mesh.refine_mask(TetId::new(0)).unwrap(), 0b111111);
        // The neighbour sees the whole shared face marked.
        assert_eq!(mesh.refine_mask(TetId::new(1)).unwrap().count_ones(), 3);
    }

    #[test]
    fn pass_bound_is_reported() {
        let mut mesh = pair();
        mark(&mut mesh, 1, 2);
        mark(&mut mesh, 3, 4);
        assert!(matches!(
            refinement_fixpoint(&mut mesh, 1),
            Err(AmrError::MarkingDidNotConverge { passes: 1 })
        ));
    }
}
