//! Arena of every edge the mesh ever had.
//!
//! Besides its key and hierarchy links an edge carries the three per-cycle flags
//! used by marking: `needs_refinement`, `needs_derefinement` and `locked`.
//! Local flag changes are recorded so they can be exported to neighbouring
//! partitions; changes imported from a neighbour are never recorded, so they are
//! not echoed back.

use crate::amr_error::AmrError;
use crate::overlap::delta::DeltaKind;
use crate::topology::ids::{EdgeId, EdgeKey, NodeId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Where a flag change comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Decided by this partition; recorded for export.
    Local,
    /// Imported from a neighbour; applied silently.
    Remote,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub key: EdgeKey,
    pub needs_refinement: bool,
    pub needs_derefinement: bool,
    /// Flags are final for the rest of the cycle.
    pub locked: bool,
    /// Split node and the two halves `(lo, node)`, `(node, hi)`.
    pub split: Option<(NodeId, [EdgeId; 2])>,
    /// The edge this one is a half of.
    pub parent: Option<EdgeId>,
}

impl EdgeRecord {
    fn new(key: EdgeKey) -> Self {
        Self {
            key,
            needs_refinement: false,
            needs_derefinement: false,
            locked: false,
            split: None,
            parent: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeStore {
    edges: Vec<EdgeRecord>,
    #[serde(skip)]
    index: HashMap<EdgeKey, EdgeId>,
    #[serde(skip)]
    changes: Vec<(EdgeId, DeltaKind)>,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the edge `key`, creating an unflagged record on first use.
    pub fn get_or_insert(&mut self, key: EdgeKey) -> Result<EdgeId, AmrError> {
        if let Some(&id) = self.index.get(&key) {
            return Ok(id);
        }
        let id = EdgeId::from_index(self.edges.len())?;
        self.edges.push(EdgeRecord::new(key));
        self.index.insert(key, id);
        Ok(id)
    }

    #[inline]
    pub fn find(&self, key: EdgeKey) -> Option<EdgeId> {
        self.index.get(&key).copied()
    }

    #[inline]
    pub fn get(&self, id: EdgeId) -> Result<&EdgeRecord, AmrError> {
        self.edges.get(id.index()).ok_or(AmrError::UnknownEdge(id))
    }

    #[inline]
    fn get_mut(&mut self, id: EdgeId) -> Result<&mut EdgeRecord, AmrError> {
        self.edges.get_mut(id.index()).ok_or(AmrError::UnknownEdge(id))
    }

    pub fn key(&self, id: EdgeId) -> Result<EdgeKey, AmrError> {
        self.get(id).map(|e| e.key)
    }

    /// Record that `parent` is split by `node` into `halves`.
    ///
    /// Re-linking the same split is a no-op; a different one is
    /// [`AmrError::SplitNodeConflict`].
    pub fn link_split(
        &mut self,
        parent: EdgeId,
        node: NodeId,
        halves: [EdgeId; 2],
    ) -> Result<(), AmrError> {
        let rec = self.get(parent)?;
        match rec.split {
            Some((existing, _)) if existing != node => {
                return Err(AmrError::SplitNodeConflict {
                    edge: rec.key,
                    existing,
                    requested: node,
                });
            }
            Some(_) => return Ok(()),
            None => {}
        }
        for h in halves {
            self.get_mut(h)?.parent = Some(parent);
        }
        self.get_mut(parent)?.split = Some((node, halves));
        Ok(())
    }

    /// Set `needs_refinement`; returns whether the flag changed.
    pub fn mark_refinement(&mut self, id: EdgeId, origin: Origin) -> Result<bool, AmrError> {
        self.apply(id, DeltaKind::MarkRefine, origin)
    }

    /// Clear `needs_derefinement`; returns whether the flag changed.
    pub fn unmark_derefinement(&mut self, id: EdgeId, origin: Origin) -> Result<bool, AmrError> {
        self.apply(id, DeltaKind::UnmarkDerefine, origin)
    }

    fn apply(&mut self, id: EdgeId, kind: DeltaKind, origin: Origin) -> Result<bool, AmrError> {
        let rec = self.get_mut(id)?;
        let mut flag = match kind {
            DeltaKind::MarkRefine => rec.needs_refinement,
            DeltaKind::UnmarkDerefine => rec.needs_derefinement,
        };
        if !kind.fuse_into(&mut flag) {
            return Ok(false);
        }
        if rec.locked {
            return Err(AmrError::LockedEdge(rec.key));
        }
        match kind {
            DeltaKind::MarkRefine => rec.needs_refinement = flag,
            DeltaKind::UnmarkDerefine => rec.needs_derefinement = flag,
        }
        if origin == Origin::Local {
            self.changes.push((id, kind));
        }
        Ok(true)
    }

    /// Optimistically set `needs_derefinement` on an unlocked edge. Seeding is not
    /// a boundary delta and is never recorded.
    pub fn seed_derefinement(&mut self, id: EdgeId) -> Result<(), AmrError> {
        let rec = self.get_mut(id)?;
        if !rec.locked {
            rec.needs_derefinement = true;
        }
        Ok(())
    }

    pub fn lock(&mut self, id: EdgeId) -> Result<(), AmrError> {
        self.get_mut(id)?.locked = true;
        Ok(())
    }

    /// Lock every edge matching `pred`; returns how many were locked.
    pub fn lock_where(&mut self, pred: impl Fn(&EdgeRecord) -> bool) -> usize {
        let mut count = 0;
        for rec in self.edges.iter_mut().filter(|r| !r.locked && pred(r)) {
            rec.locked = true;
            count += 1;
        }
        count
    }

    /// Drop every per-cycle flag and pending change.
    pub fn reset_cycle_state(&mut self) {
        for rec in &mut self.edges {
            rec.needs_refinement = false;
            rec.needs_derefinement = false;
            rec.locked = false;
        }
        self.changes.clear();
    }

    /// Local changes recorded since the last call.
    pub fn take_changes(&mut self) -> Vec<(EdgeId, DeltaKind)> {
        std::mem::take(&mut self.changes)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &EdgeRecord)> {
        self.edges
            .iter()
            .zip(0..u32::MAX)
            .map(|(r, i)| (EdgeId::new(i), r))
    }

    pub fn rebuild_index(&mut self) -> Result<(), AmrError> {
        if let Some(last) = self.edges.len().checked_sub(1) {
            EdgeId::from_index(last)?;
        }
        self.index = self.iter().map(|(id, r)| (r.key, id)).collect();
        self.changes.clear();
        Ok(())
    }
}
