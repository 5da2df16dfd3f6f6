use crate::amr_error::AmrError;
use crate::topology::mesh::{TetMesh, edge_keys};

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), AmrError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

impl DebugInvariants for TetMesh {
    fn debug_assert_invariants(&self) {
        debug_invariants!(self.validate_invariants(), "TetMesh");
    }

    /// Store consistency: tet edges match tet nodes, parent/child links agree,
    /// active tets are leaves, split edges point at their registered split node.
    fn validate_invariants(&self) -> Result<(), AmrError> {
        for (id, t) in self.tets().iter() {
            let keys = edge_keys(&t.nodes)?;
            for (k, e) in keys.iter().zip(t.edges) {
                if self.edges().key(e)? != *k {
                    return Err(AmrError::InvalidTet {
                        nodes: t.nodes,
                        reason: "edge list does not match vertices",
                    });
                }
            }
            for &c in &t.children {
                if self.tets().get(c)?.parent != Some(id) {
                    return Err(AmrError::TemplateMismatch {
                        tet: c,
                        expected: format!("parent {id:?}"),
                        found: format!("{:?}", self.tets().get(c)?.parent),
                    });
                }
            }
            if t.children.is_empty() != t.split.is_none() {
                return Err(AmrError::TemplateMismatch {
                    tet: id,
                    expected: "split pattern iff children".into(),
                    found: format!("{:?} with {} children", t.split, t.children.len()),
                });
            }
        }
        for t in self.active().iter() {
            if !self.tets().is_leaf(t)? {
                return Err(AmrError::UnsupportedHierarchy(t));
            }
        }
        for (_, e) in self.edges().iter() {
            if let Some((node, _)) = e.split {
                if self.nodes().split_node(e.key) != Some(node) {
                    return Err(AmrError::SplitNodeConflict {
                        edge: e.key,
                        existing: self.nodes().split_node(e.key).unwrap_or(node),
                        requested: node,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Midpoint;
    use crate::topology::ids::{NodeId, TetId};
    use crate::topology::mesh::InitialMesh;
    use crate::topology::refine::Refiner;

    #[test]
    fn refined_mesh_is_consistent() {
        let n = |r| NodeId::new(r).unwrap();
        let init = InitialMesh::new(
            vec![
                (n(1), [0.0, 0.0, 0.0]),
                (n(2), [1.0, 0.0, 0.0]),
                (n(3), [0.0, 1.0, 0.0]),
                (n(4), [0.0, 0.0, 1.0]),
            ],
            vec![[n(1), n(2), n(3), n(4)]],
        );
        let mut mesh = TetMesh::from_initial(&init, 0, 1, None).unwrap();
        let kids = Refiner::new(&mut mesh, &Midpoint)
            .refine_one_to_eight(TetId::new(0))
            .unwrap();
        Refiner::new(&mut mesh, &Midpoint)
            .refine_one_to_four(kids[7], 2)
            .unwrap();
        mesh.validate_invariants().unwrap();
        mesh.debug_assert_invariants();
    }
}
