//! The active (leaf) element set and per-node reference counts.

use crate::amr_error::AmrError;
use crate::topology::ids::{NodeId, TetId};
use crate::topology::tet_store::TetStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Leaf tetrahedra visible to the solver.
///
/// Only the tet ids are persisted; node reference counts are rebuilt from the
/// tet store with [`ActiveElementStore::rebuild_index`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveElementStore {
    active: BTreeSet<TetId>,
    #[serde(skip)]
    node_refs: BTreeMap<NodeId, u32>,
}

impl ActiveElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tet: TetId, nodes: &[NodeId; 4]) -> bool {
        if !self.active.insert(tet) {
            return false;
        }
        for &n in nodes {
            *self.node_refs.entry(n).or_insert(0) += 1;
        }
        true
    }

    pub fn remove(&mut self, tet: TetId, nodes: &[NodeId; 4]) -> Result<(), AmrError> {
        if !self.active.remove(&tet) {
            return Err(AmrError::InactiveTet(tet));
        }
        for n in nodes {
            let Some(count) = self.node_refs.get_mut(n) else {
                return Err(AmrError::UnknownNode(*n));
            };
            *count -= 1;
            if *count == 0 {
                self.node_refs.remove(n);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_active(&self, tet: TetId) -> bool {
        self.active.contains(&tet)
    }

    /// Number of active tets using `node`.
    #[inline]
    pub fn node_refcount(&self, node: NodeId) -> u32 {
        self.node_refs.get(&node).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_node_active(&self, node: NodeId) -> bool {
        self.node_refs.contains_key(&node)
    }

    /// Active tets in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = TetId> + '_ {
        self.active.iter().copied()
    }

    /// Active nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_refs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn rebuild_index(&mut self, tets: &TetStore) -> Result<(), AmrError> {
        self.node_refs.clear();
        for &t in &self.active {
            for n in tets.nodes_of(t)? {
                *self.node_refs.entry(n).or_insert(0) += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u64) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    #[test]
    fn refcounts_follow_membership() {
        let mut a = ActiveElementStore::new();
        let t0 = [n(1), n(2), n(3), n(4)];
        let t1 = [n(1), n(2), n(3), n(5)];
        assert!(a.insert(TetId::new(0), &t0));
        assert!(!a.insert(TetId::new(0), &t0));
        a.insert(TetId::new(1), &t1);
        assert_eq!(a.node_refcount(n(1)), 2);
        assert_eq!(a.node_refcount(n(5)), 1);
        a.remove(TetId::new(1), &t1).unwrap();
        assert!(!a.is_node_active(n(5)));
        assert_eq!(a.node_refcount(n(1)), 1);
        assert!(matches!(
            a.remove(TetId::new(1), &t1),
            Err(AmrError::InactiveTet(_))
        ));
        assert_eq!(a.nodes().collect::<Vec<_>>(), t0.to_vec());
    }
}
