//! [`TetMesh`]: the four stores of one partition plus its node-id allocator.
//!
//! A `TetMesh` is plain data: it clones cheaply enough to serve as the working
//! copy of an adaptation cycle and serializes as a checkpoint. Lookup indices are
//! not serialized; call [`TetMesh::rebuild_index`] after loading.

use crate::amr_error::AmrError;
use crate::topology::active::ActiveElementStore;
use crate::topology::edge_store::EdgeStore;
use crate::topology::ids::{EdgeId, EdgeKey, NodeId, TetId};
use crate::topology::node_connectivity::NodeConnectivity;
use crate::topology::templates::EDGE_VERTICES;
use crate::topology::tet_store::TetStore;
use crate::topology::validation::signed_volume;
use serde::{Deserialize, Serialize};

/// Input description of one partition of the initial mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialMesh {
    pub nodes: Vec<(NodeId, [f64; 3])>,
    pub tets: Vec<[NodeId; 4]>,
    /// Nodes held by other partitions too, with the ranks holding them.
    pub shared_nodes: Vec<(NodeId, Vec<usize>)>,
}

impl InitialMesh {
    pub fn new(nodes: Vec<(NodeId, [f64; 3])>, tets: Vec<[NodeId; 4]>) -> Self {
        Self {
            nodes,
            tets,
            shared_nodes: Vec::new(),
        }
    }

    pub fn with_shared_nodes(mut self, shared: Vec<(NodeId, Vec<usize>)>) -> Self {
        self.shared_nodes = shared;
        self
    }
}

/// Rank-strided node ids: the k-th id allocated by `rank` is
/// `base + k * stride + rank`, with `stride` the number of partitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdAllocator {
    base: u64,
    stride: u64,
    rank: u64,
    next: u64,
}

impl NodeIdAllocator {
    pub fn new(base: u64, num_partitions: usize, rank: usize) -> Self {
        Self {
            base,
            stride: num_partitions.max(1) as u64,
            rank: rank as u64,
            next: 0,
        }
    }

    pub fn next_id(&mut self) -> Result<NodeId, AmrError> {
        let raw = self
            .next
            .checked_mul(self.stride)
            .and_then(|o| o.checked_add(self.base))
            .and_then(|o| o.checked_add(self.rank))
            .ok_or(AmrError::NodeIdOverflow)?;
        self.next += 1;
        NodeId::new(raw)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next
    }
}

/// Keys of the six edges of a tet with `nodes`, in local order.
pub fn edge_keys(nodes: &[NodeId; 4]) -> Result<[EdgeKey; 6], AmrError> {
    let mut keys = Vec::with_capacity(6);
    for [i, j] in EDGE_VERTICES {
        keys.push(EdgeKey::new(nodes[i], nodes[j]).ok_or(AmrError::InvalidTet {
            nodes: *nodes,
            reason: "repeated vertex",
        })?);
    }
    keys.try_into().map_err(|_| AmrError::InvalidTet {
        nodes: *nodes,
        reason: "wrong edge count",
    })
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TetMesh {
    pub(crate) nodes: NodeConnectivity,
    pub(crate) edges: EdgeStore,
    pub(crate) tets: TetStore,
    pub(crate) active: ActiveElementStore,
    pub(crate) allocator: NodeIdAllocator,
    rank: usize,
}

impl TetMesh {
    /// Build the partition `rank` of `num_partitions` from its initial mesh.
    ///
    /// Negatively oriented input tets are reoriented; degenerate ones are
    /// [`AmrError::InvalidTet`]. Split-node ids start at `node_id_base`, which is
    /// mandatory for more than one partition and defaults to one past the largest
    /// initial id otherwise.
    pub fn from_initial(
        initial: &InitialMesh,
        rank: usize,
        num_partitions: usize,
        node_id_base: Option<u64>,
    ) -> Result<Self, AmrError> {
        let mut nodes = NodeConnectivity::new();
        let shared: hashbrown::HashMap<NodeId, &Vec<usize>> = initial
            .shared_nodes
            .iter()
            .map(|(n, ranks)| (*n, ranks))
            .collect();
        for &(id, coords) in &initial.nodes {
            let peers: Vec<usize> = shared
                .get(&id)
                .map(|ranks| ranks.iter().copied().filter(|&r| r != rank).collect())
                .unwrap_or_default();
            nodes.insert_node(id, coords, peers)?;
        }
        if let Some(&(id, _)) = initial.shared_nodes.iter().find(|(n, _)| !nodes.contains(*n)) {
            return Err(AmrError::UnknownNode(id));
        }

        let max_id = nodes.max_id().map_or(0, NodeId::get);
        let base = match node_id_base {
            Some(base) if base <= max_id => {
                return Err(AmrError::Config(format!(
                    "node_id_base {base} does not exceed initial node id {max_id}"
                )));
            }
            Some(base) => base,
            None if num_partitions > 1 => {
                return Err(AmrError::Config(
                    "node_id_base is required with more than one partition".into(),
                ));
            }
            None => max_id + 1,
        };

        let mut mesh = TetMesh {
            nodes,
            edges: EdgeStore::new(),
            tets: TetStore::new(),
            active: ActiveElementStore::new(),
            allocator: NodeIdAllocator::new(base, num_partitions, rank),
            rank,
        };
        for &tet in &initial.tets {
            let oriented = mesh.orient(tet)?;
            let edges = mesh.intern_edges(&oriented)?;
            let id = mesh.tets.insert_root(oriented, edges)?;
            mesh.active.insert(id, &oriented);
        }
        log::debug!(
            "rank {rank}: initial mesh with {} nodes, {} tets, {} edges",
            mesh.nodes.len(),
            mesh.tets.len(),
            mesh.edges.len()
        );
        Ok(mesh)
    }

    /// Reorder `nodes` to positive orientation (swapping the last two vertices).
    pub(crate) fn orient(&self, nodes: [NodeId; 4]) -> Result<[NodeId; 4], AmrError> {
        let volume = self.volume_of(&nodes)?;
        if volume > 0.0 {
            Ok(nodes)
        } else if volume < 0.0 {
            Ok([nodes[0], nodes[1], nodes[3], nodes[2]])
        } else {
            Err(AmrError::InvalidTet {
                nodes,
                reason: "zero volume",
            })
        }
    }

    pub(crate) fn intern_edges(&mut self, nodes: &[NodeId; 4]) -> Result<[EdgeId; 6], AmrError> {
        let keys = edge_keys(nodes)?;
        let mut ids = [EdgeId::new(0); 6];
        for (id, key) in ids.iter_mut().zip(keys) {
            *id = self.edges.get_or_insert(key)?;
        }
        Ok(ids)
    }

    fn volume_of(&self, nodes: &[NodeId; 4]) -> Result<f64, AmrError> {
        let [a, b, c, d] = [
            self.nodes.coords(nodes[0])?,
            self.nodes.coords(nodes[1])?,
            self.nodes.coords(nodes[2])?,
            self.nodes.coords(nodes[3])?,
        ];
        Ok(signed_volume(a, b, c, d))
    }

    pub fn tet_volume(&self, tet: TetId) -> Result<f64, AmrError> {
        self.volume_of(&self.tets.nodes_of(tet)?)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn nodes(&self) -> &NodeConnectivity {
        &self.nodes
    }

    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    pub fn tets(&self) -> &TetStore {
        &self.tets
    }

    pub fn active(&self) -> &ActiveElementStore {
        &self.active
    }

    pub fn allocator(&self) -> &NodeIdAllocator {
        &self.allocator
    }

    /// Vertices of every active tet, in ascending tet id order.
    pub fn active_connectivity(&self) -> Result<Vec<[NodeId; 4]>, AmrError> {
        self.active.iter().map(|t| self.tets.nodes_of(t)).collect()
    }

    /// Mask of the local edges of `tet` marked for refinement.
    pub fn refine_mask(&self, tet: TetId) -> Result<u8, AmrError> {
        let mut mask = 0u8;
        for (i, e) in self.tets.edges_of(tet)?.into_iter().enumerate() {
            if self.edges.get(e)?.needs_refinement {
                mask |= 1 << i;
            }
        }
        Ok(mask)
    }

    /// Whether every edge of `tet` is locked.
    pub fn fully_locked(&self, tet: TetId) -> Result<bool, AmrError> {
        for e in self.tets.edges_of(tet)? {
            if !self.edges.get(e)?.locked {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Ranks the edge `id` may be shared with.
    pub fn edge_peers(&self, id: EdgeId) -> Result<Vec<usize>, AmrError> {
        Ok(self.nodes.edge_peers(self.edges.key(id)?))
    }

    /// Every rank this partition shares a node with.
    pub fn neighbour_ranks(&self) -> Vec<usize> {
        self.nodes.neighbour_ranks()
    }

    /// Rebuild every lookup index after deserialization.
    pub fn rebuild_index(&mut self) -> Result<(), AmrError> {
        self.nodes.rebuild_index()?;
        self.edges.rebuild_index()?;
        self.active.rebuild_index(&self.tets)
    }
}
