//! Derefinement marking.
//!
//! Edges start out marked `needs_derefinement` wherever every active tet around
//! them asks for coarsening, then marks are only ever removed. A split node of a
//! refined tet may disappear when all child edges incident to it are still
//! marked. Each refined tet whose children are leaves then picks, from the split
//! edges whose nodes must stay, the smallest template containing them:
//!
//! | kept split edges completed by classification | decision |
//! |-----------------------------------------------|----------|
//! | none                                          | full (2:1, 4:1, 8:1) |
//! | a template smaller than the current split     | partial (4:2, 8:2, 8:4) |
//! | the current split                             | refuse |
//!
//! A kept node is protected by unmarking the two halves of the edge it splits;
//! a refusal unmarks all child edges. Every tet around that edge sees the
//! unmarked halves and keeps the node too. A tet refined two or more levels deep
//! is not coarsened this cycle, so its split nodes are protected at seeding.

use crate::amr_error::AmrError;
use crate::topology::edge_store::Origin;
use crate::topology::ids::{NodeId, TetId};
use crate::topology::mesh::TetMesh;
use crate::topology::templates::{SplitPattern, classify, edges_in};
use std::collections::BTreeSet;

/// Outcome of Algorithm 4 for one refined tet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Remove every split node.
    Full,
    /// Keep exactly the split nodes of this smaller template.
    Partial(SplitPattern),
    /// Keep the current split.
    Refuse,
}

/// Derefinements agreed at quiescence: each tet with the template it keeps
/// (`None` for full derefinement).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DerefinementPlan {
    pub entries: Vec<(TetId, Option<SplitPattern>)>,
}

impl DerefinementPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TetId, Option<SplitPattern>)> {
        self.entries.iter()
    }
}

/// Optimistic seeding: mark every edge of every active tet, then unmark the
/// edges of tets that do not want coarsening or carry a refinement mark, and
/// the halves of every edge split by a tet with grandchildren.
pub(crate) fn seed_derefinement(
    mesh: &mut TetMesh,
    wanted: &BTreeSet<TetId>,
) -> Result<(), AmrError> {
    let active: Vec<TetId> = mesh.active.iter().collect();
    for &t in &active {
        for e in mesh.tets.edges_of(t)? {
            mesh.edges.seed_derefinement(e)?;
        }
    }
    for &t in &active {
        if wanted.contains(&t) && mesh.refine_mask(t)? == 0 {
            continue;
        }
        for e in mesh.tets.edges_of(t)? {
            mesh.edges.unmark_derefinement(e, Origin::Local)?;
        }
    }
    let refined: Vec<(TetId, SplitPattern)> = mesh
        .tets
        .iter()
        .filter_map(|(t, r)| r.split.map(|p| (t, p)))
        .collect();
    for (t, pattern) in refined {
        if !mesh.tets.children_are_leaves(t)? {
            keep_split_nodes(mesh, t, pattern.edge_mask())?;
        }
    }
    Ok(())
}

/// Unmark both halves of the split edges of `tet` in `mask`; returns the number
/// of marks removed.
fn keep_split_nodes(mesh: &mut TetMesh, tet: TetId, mask: u8) -> Result<usize, AmrError> {
    let edges = mesh.tets.edges_of(tet)?;
    let mut removed = 0;
    for e in edges_in(mask) {
        let rec = mesh.edges.get(edges[e])?;
        let (_, halves) = rec.split.ok_or(AmrError::UnknownEdgeKey(rec.key))?;
        for h in halves {
            if mesh.edges.unmark_derefinement(h, Origin::Local)? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Parents of active tets, ascending.
fn candidates(mesh: &TetMesh) -> Result<Vec<TetId>, AmrError> {
    let mut parents = BTreeSet::new();
    for t in mesh.active.iter() {
        if let Some(p) = mesh.tets.get(t)?.parent {
            parents.insert(p);
        }
    }
    Ok(parents.into_iter().collect())
}

/// Split node of local edge `local` of `tet`.
fn split_node_of(mesh: &TetMesh, tet: TetId, local: usize) -> Result<NodeId, AmrError> {
    let key = mesh.edges.key(mesh.tets.edges_of(tet)?[local])?;
    mesh.nodes
        .split_node(key)
        .ok_or(AmrError::UnknownEdgeKey(key))
}

/// Whether every child edge of `parent` incident to `node` is marked.
fn removal_safe(mesh: &TetMesh, children: &[TetId], node: NodeId) -> Result<bool, AmrError> {
    for &c in children {
        for e in mesh.tets.edges_of(c)? {
            let rec = mesh.edges.get(e)?;
            if rec.key.contains(node) && !rec.needs_derefinement {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Evaluate the decision table for `parent` under the current marks.
pub(crate) fn decide(mesh: &TetMesh, parent: TetId) -> Result<Decision, AmrError> {
    let rec = mesh.tets.get(parent)?;
    let Some(pattern) = rec.split else {
        return Ok(Decision::Refuse);
    };
    // Grandchildren: multi-level derefinement is not supported.
    if !mesh.tets.children_are_leaves(parent)? {
        return Ok(Decision::Refuse);
    }
    for &c in &rec.children {
        if mesh.refine_mask(c)? != 0 {
            return Ok(Decision::Refuse);
        }
    }
    let split = pattern.edge_mask();
    let mut removable = 0u8;
    for e in edges_in(split) {
        if removal_safe(mesh, &rec.children, split_node_of(mesh, parent, e)?)? {
            removable |= 1 << e;
        }
    }
    let target = classify(split & !removable).completed_mask();
    if target == split || target & !split != 0 {
        return Ok(Decision::Refuse);
    }
    if target == 0 {
        return Ok(Decision::Full);
    }
    SplitPattern::from_edge_mask(target)
        .map(Decision::Partial)
        .ok_or(AmrError::UnsupportedSplitPattern {
            tet: parent,
            mask: target,
        })
}

/// Unmark what `decision` keeps; returns the number of marks removed.
fn protect(mesh: &mut TetMesh, parent: TetId, decision: Decision) -> Result<usize, AmrError> {
    match decision {
        Decision::Full => Ok(0),
        Decision::Partial(target) => keep_split_nodes(mesh, parent, target.edge_mask()),
        Decision::Refuse => {
            let mut removed = 0;
            for c in mesh.tets.get(parent)?.children.clone() {
                for e in mesh.tets.edges_of(c)? {
                    if mesh.edges.unmark_derefinement(e, Origin::Local)? {
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        }
    }
}

/// Run decision passes until one removes no mark; returns the passes used.
pub(crate) fn derefinement_fixpoint(
    mesh: &mut TetMesh,
    max_passes: usize,
) -> Result<usize, AmrError> {
    let parents = candidates(mesh)?;
    for pass in 1..=max_passes {
        let mut removed = 0usize;
        for &p in &parents {
            let decision = decide(mesh, p)?;
            removed += protect(mesh, p, decision)?;
        }
        log::debug!("rank {}: derefinement pass {pass} removed {removed} marks", mesh.rank());
        if removed == 0 {
            return Ok(pass);
        }
    }
    Err(AmrError::MarkingDidNotConverge { passes: max_passes })
}

/// Decisions at the fixpoint, refusals left out.
pub(crate) fn build_plan(mesh: &TetMesh) -> Result<DerefinementPlan, AmrError> {
    let mut plan = DerefinementPlan::default();
    for p in candidates(mesh)? {
        match decide(mesh, p)? {
            Decision::Full => plan.entries.push((p, None)),
            Decision::Partial(target) => plan.entries.push((p, Some(target))),
            Decision::Refuse => {}
        }
    }
    Ok(plan)
}
