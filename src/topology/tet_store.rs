//! Arena of every tetrahedron the mesh ever had.
//!
//! Ancestors stay alive next to the leaves; a derefined tet keeps its former
//! children in `history`, so a later refinement with the same pattern revives the
//! very same child records instead of allocating new ones.

use crate::amr_error::AmrError;
use crate::topology::ids::{EdgeId, NodeId, TetId};
use crate::topology::templates::SplitPattern;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TetRecord {
    /// Positively oriented vertices.
    pub nodes: [NodeId; 4],
    /// Edges in local order `(0,1) (1,2) (2,0) (0,3) (1,3) (2,3)`.
    pub edges: [EdgeId; 6],
    pub level: u32,
    pub parent: Option<TetId>,
    /// Current children; empty for a leaf.
    pub children: Vec<TetId>,
    pub split: Option<SplitPattern>,
    /// Every child set this tet ever had.
    pub history: Vec<(SplitPattern, Vec<TetId>)>,
}

impl TetRecord {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn remembered(&self, pattern: SplitPattern) -> Option<&Vec<TetId>> {
        self.history
            .iter()
            .find(|(p, _)| *p == pattern)
            .map(|(_, c)| c)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TetStore {
    tets: Vec<TetRecord>,
}

impl TetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a level-0 tetrahedron.
    pub fn insert_root(&mut self, nodes: [NodeId; 4], edges: [EdgeId; 6]) -> Result<TetId, AmrError> {
        self.push(nodes, edges, 0, None)
    }

    fn push(
        &mut self,
        nodes: [NodeId; 4],
        edges: [EdgeId; 6],
        level: u32,
        parent: Option<TetId>,
    ) -> Result<TetId, AmrError> {
        let id = TetId::from_index(self.tets.len())?;
        self.tets.push(TetRecord {
            nodes,
            edges,
            level,
            parent,
            children: Vec::new(),
            split: None,
            history: Vec::new(),
        });
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: TetId) -> Result<&TetRecord, AmrError> {
        self.tets.get(id.index()).ok_or(AmrError::UnknownTet(id))
    }

    #[inline]
    fn get_mut(&mut self, id: TetId) -> Result<&mut TetRecord, AmrError> {
        self.tets.get_mut(id.index()).ok_or(AmrError::UnknownTet(id))
    }

    pub fn nodes_of(&self, id: TetId) -> Result<[NodeId; 4], AmrError> {
        self.get(id).map(|t| t.nodes)
    }

    pub fn edges_of(&self, id: TetId) -> Result<[EdgeId; 6], AmrError> {
        self.get(id).map(|t| t.edges)
    }

    pub fn is_leaf(&self, id: TetId) -> Result<bool, AmrError> {
        self.get(id).map(TetRecord::is_leaf)
    }

    fn ensure_leaf(&self, id: TetId) -> Result<&TetRecord, AmrError> {
        let t = self.get(id)?;
        if t.is_leaf() {
            Ok(t)
        } else {
            Err(AmrError::TemplateMismatch {
                tet: id,
                expected: "leaf".into(),
                found: format!("{} refined", t.children.len()),
            })
        }
    }

    /// Create fresh children of the leaf `id`. Pure bookkeeping: the caller
    /// supplies vertices and edges of every child.
    pub fn create_children(
        &mut self,
        id: TetId,
        pattern: SplitPattern,
        children: Vec<([NodeId; 4], [EdgeId; 6])>,
    ) -> Result<Vec<TetId>, AmrError> {
        let level = self.ensure_leaf(id)?.level + 1;
        if children.len() != pattern.child_count() {
            return Err(AmrError::TemplateMismatch {
                tet: id,
                expected: format!("{} children for {pattern}", pattern.child_count()),
                found: children.len().to_string(),
            });
        }
        let ids: Vec<TetId> = children
            .into_iter()
            .map(|(nodes, edges)| self.push(nodes, edges, level, Some(id)))
            .collect::<Result<_, _>>()?;
        let t = self.get_mut(id)?;
        t.history.retain(|(p, _)| *p != pattern);
        t.history.push((pattern, ids.clone()));
        t.children = ids.clone();
        t.split = Some(pattern);
        Ok(ids)
    }

    /// Revive the child set `id` had under `pattern`; `None` if it never had one.
    pub fn restore_children(
        &mut self,
        id: TetId,
        pattern: SplitPattern,
    ) -> Result<Option<Vec<TetId>>, AmrError> {
        let Some(ids) = self.ensure_leaf(id)?.remembered(pattern).cloned() else {
            return Ok(None);
        };
        let t = self.get_mut(id)?;
        t.children = ids.clone();
        t.split = Some(pattern);
        Ok(Some(ids))
    }

    /// Detach the current children of `id` (they stay in `history`).
    ///
    /// Every child must be a leaf: multi-level derefinement is
    /// [`AmrError::UnsupportedHierarchy`].
    pub fn retire_children(&mut self, id: TetId) -> Result<(SplitPattern, Vec<TetId>), AmrError> {
        let t = self.get(id)?;
        let Some(pattern) = t.split else {
            return Err(AmrError::TemplateMismatch {
                tet: id,
                expected: "refined tet".into(),
                found: "leaf".into(),
            });
        };
        for &c in &t.children {
            if !self.get(c)?.is_leaf() {
                return Err(AmrError::UnsupportedHierarchy(id));
            }
        }
        let t = self.get_mut(id)?;
        t.split = None;
        Ok((pattern, std::mem::take(&mut t.children)))
    }

    /// Whether `id` is refined and all its children are leaves.
    pub fn children_are_leaves(&self, id: TetId) -> Result<bool, AmrError> {
        let t = self.get(id)?;
        if t.is_leaf() {
            return Ok(false);
        }
        for &c in &t.children {
            if !self.get(c)?.is_leaf() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.tets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TetId, &TetRecord)> {
        self.tets
            .iter()
            .zip(0..u32::MAX)
            .map(|(t, i)| (TetId::new(i), t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u64) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    fn e(i: u32) -> EdgeId {
        EdgeId::new(i)
    }

    const EDGES: [EdgeId; 6] = [
        EdgeId::new(0),
        EdgeId::new(1),
        EdgeId::new(2),
        EdgeId::new(3),
        EdgeId::new(4),
        EdgeId::new(5),
    ];

    fn bisect(ts: &mut TetStore, root: TetId) -> Vec<TetId> {
        ts.create_children(
            root,
            SplitPattern::OneToTwo { edge: 0 },
            vec![
                ([n(1), n(5), n(3), n(4)], [e(6), e(7), e(2), e(3), e(8), e(5)]),
                ([n(5), n(2), n(3), n(4)], [e(9), e(1), e(7), e(8), e(4), e(5)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn children_are_created_and_linked() {
        let mut ts = TetStore::new();
        let root = ts.insert_root([n(1), n(2), n(3), n(4)], EDGES).unwrap();
        let kids = bisect(&mut ts, root);
        assert_eq!(kids.len(), 2);
        assert!(!ts.is_leaf(root).unwrap());
        assert_eq!(ts.get(kids[1]).unwrap().parent, Some(root));
        assert_eq!(ts.get(kids[0]).unwrap().level, 1);
        assert!(ts.children_are_leaves(root).unwrap());
    }

    #[test]
    fn retire_then_restore_reuses_ids() {
        let mut ts = TetStore::new();
        let root = ts.insert_root([n(1), n(2), n(3), n(4)], EDGES).unwrap();
        let kids = bisect(&mut ts, root);
        let (pattern, retired) = ts.retire_children(root).unwrap();
        assert_eq!(pattern, SplitPattern::OneToTwo { edge: 0 });
        assert_eq!(retired, kids);
        assert!(ts.is_leaf(root).unwrap());
        assert_eq!(ts.restore_children(root, SplitPattern::OneToEight).unwrap(), None);
        assert_eq!(ts.restore_children(root, pattern).unwrap(), Some(kids));
        assert_eq!(ts.len(), 3);
    }

    #[test]
    fn refining_a_refined_tet_fails() {
        let mut ts = TetStore::new();
        let root = ts.insert_root([n(1), n(2), n(3), n(4)], EDGES).unwrap();
        bisect(&mut ts, root);
        assert!(matches!(
            ts.restore_children(root, SplitPattern::OneToEight),
            Err(AmrError::TemplateMismatch { .. })
        ));
    }

    #[test]
    fn grandchildren_block_retirement() {
        let mut ts = TetStore::new();
        let root = ts.insert_root([n(1), n(2), n(3), n(4)], EDGES).unwrap();
        let kids = bisect(&mut ts, root);
        bisect(&mut ts, kids[0]);
        assert!(!ts.children_are_leaves(root).unwrap());
        assert!(matches!(
            ts.retire_children(root),
            Err(AmrError::UnsupportedHierarchy(_))
        ));
        assert!(matches!(
            ts.retire_children(kids[1]),
            Err(AmrError::TemplateMismatch { .. })
        ));
    }
}
