//! Node table and the permanent edge → split-node map.
//!
//! Every node that ever existed stays in the table. A split node remembers the
//! edge it bisects, which makes the edge → node map derivable from the records;
//! the map itself is an index rebuilt after deserialization.

use crate::amr_error::AmrError;
use crate::topology::ids::{EdgeKey, NodeId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// One node of the mesh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub coords: [f64; 3],
    /// Other ranks holding a copy of this node, sorted.
    pub peers: Vec<usize>,
    /// The edge this node splits; `None` for nodes of the initial mesh.
    pub parent_edge: Option<EdgeKey>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConnectivity {
    nodes: Vec<NodeRecord>,
    #[serde(skip)]
    index: HashMap<NodeId, usize>,
    #[serde(skip)]
    split: HashMap<EdgeKey, NodeId>,
}

impl NodeConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node of the initial mesh.
    pub fn insert_node(
        &mut self,
        id: NodeId,
        coords: [f64; 3],
        peers: Vec<usize>,
    ) -> Result<(), AmrError> {
        self.push(NodeRecord {
            id,
            coords,
            peers,
            parent_edge: None,
        })
    }

    /// Register `id` as the split node of `edge`.
    ///
    /// Idempotent when `edge` is already split by `id`. A different node for the
    /// same edge is [`AmrError::SplitNodeConflict`]; reusing an id that already names
    /// another node is [`AmrError::DuplicateNode`].
    pub fn insert_split_node(
        &mut self,
        edge: EdgeKey,
        id: NodeId,
        coords: [f64; 3],
        peers: Vec<usize>,
    ) -> Result<NodeId, AmrError> {
        if let Some(&existing) = self.split.get(&edge) {
            return if existing == id {
                Ok(id)
            } else {
                Err(AmrError::SplitNodeConflict {
                    edge,
                    existing,
                    requested: id,
                })
            };
        }
        self.push(NodeRecord {
            id,
            coords,
            peers,
            parent_edge: Some(edge),
        })?;
        self.split.insert(edge, id);
        Ok(id)
    }

    fn push(&mut self, mut record: NodeRecord) -> Result<(), AmrError> {
        if self.index.contains_key(&record.id) {
            return Err(AmrError::DuplicateNode(record.id));
        }
        record.peers.sort_unstable();
        record.peers.dedup();
        self.index.insert(record.id, self.nodes.len());
        self.nodes.push(record);
        Ok(())
    }

    /// Split node of `edge`, if the edge was ever refined.
    #[inline]
    pub fn split_node(&self, edge: EdgeKey) -> Option<NodeId> {
        self.split.get(&edge).copied()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn coords(&self, id: NodeId) -> Result<[f64; 3], AmrError> {
        self.get(id)
            .map(|r| r.coords)
            .ok_or(AmrError::UnknownNode(id))
    }

    /// Ranks sharing `id`; empty for interior or unknown nodes.
    pub fn peers(&self, id: NodeId) -> &[usize] {
        self.get(id).map_or(&[], |r| r.peers.as_slice())
    }

    /// Ranks sharing both endpoints of `edge`, i.e. the ranks the edge may be
    /// shared with.
    pub fn edge_peers(&self, edge: EdgeKey) -> Vec<usize> {
        let [a, b] = edge.nodes();
        let pb = self.peers(b);
        self.peers(a)
            .iter()
            .copied()
            .filter(|r| pb.binary_search(r).is_ok())
            .collect()
    }

    /// Every rank some node is shared with.
    pub fn neighbour_ranks(&self) -> Vec<usize> {
        let mut ranks: Vec<usize> = self
            .nodes
            .iter()
            .flat_map(|r| r.peers.iter().copied())
            .collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    pub fn max_id(&self) -> Option<NodeId> {
        self.nodes.iter().map(|r| r.id).max()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.iter()
    }

    /// Rebuild the lookup maps after deserialization.
    pub fn rebuild_index(&mut self) -> Result<(), AmrError> {
        self.index.clear();
        self.split.clear();
        for (i, r) in self.nodes.iter().enumerate() {
            if self.index.insert(r.id, i).is_some() {
                return Err(AmrError::DuplicateNode(r.id));
            }
            if let Some(edge) = r.parent_edge {
                if let Some(existing) = self.split.insert(edge, r.id) {
                    return Err(AmrError::SplitNodeConflict {
                        edge,
                        existing,
                        requested: r.id,
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

    fn n(raw: u64) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    #[test]
    fn split_node_is_idempotent_and_unique() {
        let mut nc = NodeConnectivity::new();
        nc.insert_node(n(1), [0.0; 3], vec![]).unwrap();
        nc.insert_node(n(2), [1.0, 0.0, 0.0], vec![]).unwrap();
        let e = EdgeKey::new(n(1), n(2)).unwrap();
        assert_eq!(nc.split_node(e), None);
        nc.insert_split_node(e, n(10), [0.5, 0.0, 0.0], vec![]).unwrap();
        assert_eq!(nc.insert_split_node(e, n(10), [0.5, 0.0, 0.0], vec![]).unwrap(), n(10));
        assert!(matches!(
            nc.insert_split_node(e, n(11), [0.5, 0.0, 0.0], vec![]),
            Err(AmrError::SplitNodeConflict { .. })
        ));
        assert_eq!(nc.split_node(e), Some(n(10)));
        assert_eq!(nc.len(), 3);
    }

    #[test]
    fn duplicate_nodes_are_rejected() {
        let mut nc = NodeConnectivity::new();
        nc.insert_node(n(1), [0.0; 3], vec![]).unwrap();
        assert!(matches!(
            nc.insert_node(n(1), [0.0; 3], vec![]),
            Err(AmrError::DuplicateNode(_))
        ));
    }

    #[test]
    fn edge_peers_intersect_endpoints() {
        let mut nc = NodeConnectivity::new();
        nc.insert_node(n(1), [0.0; 3], vec![2, 1]).unwrap();
        nc.insert_node(n(2), [0.0; 3], vec![1, 3]).unwrap();
        nc.insert_node(n(3), [0.0; 3], vec![]).unwrap();
        assert_eq!(nc.peers(n(1)), &[1, 2]);
        assert_eq!(nc.edge_peers(EdgeKey::new(n(1), n(2)).unwrap()), vec![1]);
        assert!(nc.edge_peers(EdgeKey::new(n(1), n(3)).unwrap()).is_empty());
        assert_eq!(nc.neighbour_ranks(), vec![1, 2, 3]);
    }

    #[test]
    fn index_survives_serde() {
        let mut nc = NodeConnectivity::new();
        nc.insert_node(n(1), [0.0; 3], vec![]).unwrap();
        nc.insert_node(n(2), [2.0, 0.0, 0.0], vec![]).unwrap();
        let e = EdgeKey::new(n(1), n(2)).unwrap();
        nc.insert_split_node(e, n(5), [1.0, 0.0, 0.0], vec![]).unwrap();
        let json = serde_json::to_string(&nc).unwrap();
        let mut back: NodeConnectivity = serde_json::from_str(&json).unwrap();
        assert_eq!(back.split_node(e), None);
        back.rebuild_index().unwrap();
        assert_eq!(back.split_node(e), Some(n(5)));
        assert_eq!(back.coords(n(5)).unwrap(), [1.0, 0.0, 0.0]);
    }
}
