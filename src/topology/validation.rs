//! Mesh validation helpers.
//!
//! These checks look at the active mesh of one partition: conformity (no active
//! edge is split by an active node, so every shared face is subdivided the same
//! way on both sides), manifold faces and positive orientation.

use crate::amr_error::AmrError;
use crate::topology::ids::NodeId;
use crate::topology::mesh::TetMesh;
use crate::topology::templates::FACE_VERTICES;
use hashbrown::HashMap;

/// Optional validation toggles for active-mesh checks.
#[derive(Debug, Clone, Copy)]
pub struct MeshValidationOptions {
    /// Reject hanging nodes.
    pub check_conformity: bool,
    /// Reject faces shared by more than two active tets.
    pub check_manifold_faces: bool,
    /// Reject non-positive volumes.
    pub check_orientation: bool,
}

impl MeshValidationOptions {
    /// Enable all checks.
    pub fn all() -> Self {
        Self {
            check_conformity: true,
            check_manifold_faces: true,
            check_orientation: true,
        }
    }
}

/// Signed volume of the tet `a b c d`; positive for the orientation tet records use.
pub fn signed_volume(a: [f64; 3], b: [f64; 3], c: [f64; 3], d: [f64; 3]) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let w = [d[0] - a[0], d[1] - a[1], d[2] - a[2]];
    let det = u[0] * (v[1] * w[2] - v[2] * w[1]) - u[1] * (v[0] * w[2] - v[2] * w[0])
        + u[2] * (v[0] * w[1] - v[1] * w[0]);
    det / 6.0
}

/// Validate the active mesh of `mesh` with the selected checks.
pub fn validate_mesh(mesh: &TetMesh, options: MeshValidationOptions) -> Result<(), AmrError> {
    if options.check_orientation {
        check_orientation(mesh)?;
    }
    if options.check_manifold_faces {
        check_manifold_faces(mesh)?;
    }
    if options.check_conformity {
        check_conformity(mesh)?;
    }
    Ok(())
}

/// No active edge may carry an active split node.
pub fn check_conformity(mesh: &TetMesh) -> Result<(), AmrError> {
    for t in mesh.active().iter() {
        for e in mesh.tets().edges_of(t)? {
            let key = mesh.edges().key(e)?;
            if let Some(node) = mesh.nodes().split_node(key) {
                if mesh.active().is_node_active(node) {
                    return Err(AmrError::FaceIncompatibility { edge: key, node });
                }
            }
        }
    }
    Ok(())
}

/// Every face is shared by at most two active tets.
pub fn check_manifold_faces(mesh: &TetMesh) -> Result<(), AmrError> {
    let mut faces: HashMap<[NodeId; 3], usize> = HashMap::new();
    for t in mesh.active().iter() {
        let nodes = mesh.tets().nodes_of(t)?;
        for fv in FACE_VERTICES {
            let mut face = fv.map(|i| nodes[i]);
            face.sort_unstable();
            *faces.entry(face).or_insert(0) += 1;
        }
    }
    match faces.into_iter().find(|(_, c)| *c > 2) {
        Some((face, count)) => Err(AmrError::NonManifoldFace { face, count }),
        None => Ok(()),
    }
}

/// Every active tet has positive volume.
pub fn check_orientation(mesh: &TetMesh) -> Result<(), AmrError> {
    for t in mesh.active().iter() {
        let volume = mesh.tet_volume(t)?;
        if volume <= 0.0 {
            return Err(AmrError::InvertedTet { tet: t, volume });
        }
    }
    Ok(())
}

/// Sum of the volumes of all active tets.
pub fn total_active_volume(mesh: &TetMesh) -> Result<f64, AmrError> {
    mesh.active().iter().map(|t| mesh.tet_volume(t)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_tet_volume() {
        let v = signed_volume(
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        );
        assert!((v - 1.0 / 6.0).abs() < 1e-15);
        let w = signed_volume(
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0],
        );
        assert!((w + 1.0 / 6.0).abs() < 1e-15);
    }
}
