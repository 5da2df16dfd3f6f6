//! Refinement operators.
//!
//! [`Refiner`] applies one split template to one active tet of a [`TetMesh`]:
//! it resolves or creates the split nodes of the template's edges, creates the
//! children (or revives the ones the tet had under the same pattern before) and
//! swaps the tet for its children in the active set.
//!
//! # Expected invariants
//! - The refined tet is active.
//! - Face compatibility is the caller's business: the operators never look at
//!   neighbours. Marking guarantees that neighbours agree on shared split edges.
//! - Split nodes are permanent; refining an already split edge reuses its node and
//!   its two halves.

use crate::amr_error::AmrError;
use crate::callbacks::GeometryModel;
use crate::topology::ids::{EdgeId, EdgeKey, NodeId, TetId};
use crate::topology::mesh::TetMesh;
use crate::topology::templates::{DIAGONALS, SplitPattern, edges_in, subdivide};

/// Topological refine/derefine operators over one partition's mesh.
pub struct Refiner<'a> {
    pub(crate) mesh: &'a mut TetMesh,
    geometry: &'a dyn GeometryModel,
}

/// Register `id` as the split node of `key`, placing it with `geometry`.
///
/// Already split edges keep their node; asking for a different one is
/// [`AmrError::SplitNodeConflict`].
pub(crate) fn place_split_node(
    mesh: &mut TetMesh,
    geometry: &dyn GeometryModel,
    key: EdgeKey,
    id: NodeId,
) -> Result<NodeId, AmrError> {
    if let Some(existing) = mesh.nodes.split_node(key) {
        if existing != id {
            return Err(AmrError::SplitNodeConflict {
                edge: key,
                existing,
                requested: id,
            });
        }
        return Ok(existing);
    }
    let [a, b] = key.nodes();
    let coords = geometry
        .split_point(key, mesh.nodes.coords(a)?, mesh.nodes.coords(b)?)
        .map_err(|e| AmrError::callback("geometry", e))?;
    let peers = mesh.nodes.edge_peers(key);
    mesh.nodes.insert_split_node(key, id, coords, peers)
}

fn half(a: NodeId, b: NodeId) -> Result<EdgeKey, AmrError> {
    EdgeKey::new(a, b).ok_or(AmrError::DuplicateNode(a))
}

impl<'a> Refiner<'a> {
    pub fn new(mesh: &'a mut TetMesh, geometry: &'a dyn GeometryModel) -> Self {
        Self { mesh, geometry }
    }

    /// Split node of `edge`, created (with both halves) on first use.
    pub fn split_edge(&mut self, edge: EdgeId) -> Result<NodeId, AmrError> {
        let key = self.mesh.edges.key(edge)?;
        let node = match self.mesh.nodes.split_node(key) {
            Some(node) => node,
            None => {
                let id = self.mesh.allocator.next_id()?;
                place_split_node(self.mesh, self.geometry, key, id)?
            }
        };
        let [a, b] = key.nodes();
        let lo = self.mesh.edges.get_or_insert(half(a, node)?)?;
        let hi = self.mesh.edges.get_or_insert(half(node, b)?)?;
        self.mesh.edges.link_split(edge, node, [lo, hi])?;
        Ok(node)
    }

    /// Bisect local edge `edge` of `tet`.
    pub fn refine_one_to_two(&mut self, tet: TetId, edge: u8) -> Result<Vec<TetId>, AmrError> {
        self.refine(tet, SplitPattern::OneToTwo { edge })
    }

    /// Split local face `face` of `tet` into four.
    pub fn refine_one_to_four(&mut self, tet: TetId, face: u8) -> Result<Vec<TetId>, AmrError> {
        self.refine(tet, SplitPattern::OneToFour { face })
    }

    /// Octasect `tet`.
    pub fn refine_one_to_eight(&mut self, tet: TetId) -> Result<Vec<TetId>, AmrError> {
        self.refine(tet, SplitPattern::OneToEight)
    }

    /// Apply `pattern` to the active tet `tet`; returns the children.
    pub fn refine(&mut self, tet: TetId, pattern: SplitPattern) -> Result<Vec<TetId>, AmrError> {
        if !self.mesh.active.is_active(tet) {
            return Err(AmrError::InactiveTet(tet));
        }
        let nodes = self.mesh.tets.nodes_of(tet)?;
        let children = match self.mesh.tets.restore_children(tet, pattern)? {
            Some(children) => {
                log::trace!("tet {tet:?}: revived {pattern} children");
                children
            }
            None => self.create_children(tet, pattern, nodes)?,
        };
        self.mesh.active.remove(tet, &nodes)?;
        for &c in &children {
            let child_nodes = self.mesh.tets.nodes_of(c)?;
            self.mesh.active.insert(c, &child_nodes);
        }
        Ok(children)
    }

    fn create_children(
        &mut self,
        tet: TetId,
        pattern: SplitPattern,
        nodes: [NodeId; 4],
    ) -> Result<Vec<TetId>, AmrError> {
        let edges = self.mesh.tets.edges_of(tet)?;
        let mut mids = [None; 6];
        for e in edges_in(pattern.edge_mask()) {
            mids[e] = Some(self.split_edge(edges[e])?);
        }
        let diagonal = match pattern {
            SplitPattern::OneToEight => self.shortest_diagonal(&mids)?,
            _ => 0,
        };
        let quads = subdivide(pattern, nodes, &mids, diagonal).ok_or(
            AmrError::UnsupportedSplitPattern {
                tet,
                mask: pattern.edge_mask(),
            },
        )?;
        let mut specs = Vec::with_capacity(quads.len());
        for quad in quads {
            let quad = self.mesh.orient(quad)?;
            let child_edges = self.mesh.intern_edges(&quad)?;
            specs.push((quad, child_edges));
        }
        self.mesh.tets.create_children(tet, pattern, specs)
    }

    /// Index into [`DIAGONALS`] of the shortest octahedron diagonal; ties go to the
    /// lower index.
    fn shortest_diagonal(&self, mids: &[Option<NodeId>; 6]) -> Result<usize, AmrError> {
        let mut best = (0, f64::INFINITY);
        for (d, (p, q, _)) in DIAGONALS.iter().enumerate() {
            let (Some(mp), Some(mq)) = (mids[*p], mids[*q]) else {
                continue;
            };
            let (a, b) = (self.mesh.nodes.coords(mp)?, self.mesh.nodes.coords(mq)?);
            let len2: f64 = (0..3).map(|k| (a[k] - b[k]).powi(2)).sum();
            if len2 < best.1 {
                best = (d, len2);
            }
        }
        Ok(best.0)
    }
}
