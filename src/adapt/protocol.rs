//! Boundary protocol of one partition.
//!
//! A marking stage alternates local fixpoints with exchange rounds: deltas go to
//! the neighbours sharing the changed edges, then every partition votes whether it
//! still has pending changes. The stage ends when nobody has. After refinement
//! marking one more round agrees on the ids of new nodes on shared edges, and
//! `finish_cycle` ends with an all-to-all commit vote.

use super::{MeshAdapter, Phase};
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{TAG_COMMIT, TAG_DELTAS, TAG_PROPOSALS, TAG_VOTE, exchange_round};
use crate::algs::wire::BoundaryMessage;
use crate::amr_error::AmrError;
use crate::overlap::delta::{DeltaKind, EdgeDelta};
use crate::topology::edge_store::Origin;
use crate::topology::ids::{EdgeKey, NodeId, TetId};
use crate::topology::mesh::TetMesh;
use crate::topology::refine::place_split_node;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Local fixpoint of a marking stage: `(mesh, max_passes) -> passes`.
pub(crate) type LocalFixpoint = fn(&mut TetMesh, usize) -> Result<usize, AmrError>;

fn unexpected(peer: usize, wanted: &str, got: &BoundaryMessage) -> AmrError {
    AmrError::ProtocolViolation {
        peer,
        reason: format!("expected {wanted}, got message kind {}", got.kind()),
    }
}

impl MeshAdapter {
    /// Drain the local edge changes into one [`BoundaryMessage::Deltas`] per
    /// neighbour. Every neighbour gets a message, possibly empty.
    pub fn export_boundary_deltas(
        &mut self,
    ) -> Result<BTreeMap<usize, BoundaryMessage>, AmrError> {
        let mesh = self.working_mut("export_boundary_deltas")?;
        let mut out: BTreeMap<usize, BTreeSet<EdgeDelta>> = mesh
            .neighbour_ranks()
            .into_iter()
            .map(|r| (r, BTreeSet::new()))
            .collect();
        for (id, kind) in mesh.edges.take_changes() {
            let key = mesh.edges.key(id)?;
            for peer in mesh.edge_peers(id)? {
                if let Some(set) = out.get_mut(&peer) {
                    set.insert(EdgeDelta { key, kind });
                }
            }
        }
        Ok(out
            .into_iter()
            .map(|(r, ds)| (r, BoundaryMessage::Deltas(ds.into_iter().collect())))
            .collect())
    }

    /// Apply the deltas `from` sent; returns whether any local flag changed.
    ///
    /// Refinement marks are accepted while refinement marking runs and unmarks
    /// while derefinement marking runs; anything else, and any change to a locked
    /// edge, is a [`AmrError::ProtocolViolation`]. Edges this partition does not
    /// hold are skipped.
    pub fn import_boundary_deltas(
        &mut self,
        from: usize,
        msg: BoundaryMessage,
    ) -> Result<bool, AmrError> {
        let expected = match self.phase {
            Phase::Begun => DeltaKind::MarkRefine,
            Phase::RefinementMarked => DeltaKind::UnmarkDerefine,
            other => {
                return Err(AmrError::PhaseViolation {
                    operation: "import_boundary_deltas",
                    phase: other.name(),
                });
            }
        };
        let deltas = match msg {
            BoundaryMessage::Deltas(deltas) => deltas,
            other => return Err(unexpected(from, "deltas", &other)),
        };
        let mesh = self.working_mut("import_boundary_deltas")?;
        let mut changed = false;
        for EdgeDelta { key, kind } in deltas {
            if kind != expected {
                return Err(AmrError::ProtocolViolation {
                    peer: from,
                    reason: format!("{kind:?} delta for edge {key} while expecting {expected:?}"),
                });
            }
            let Some(id) = mesh.edges.find(key) else {
                log::trace!("rank {}: ignoring delta for unknown edge {key} from {from}", mesh.rank());
                continue;
            };
            let applied = match kind {
                DeltaKind::MarkRefine => mesh.edges.mark_refinement(id, Origin::Remote),
                DeltaKind::UnmarkDerefine => mesh.edges.unmark_derefinement(id, Origin::Remote),
            };
            changed |= match applied {
                Ok(c) => c,
                Err(AmrError::LockedEdge(key)) => {
                    return Err(AmrError::ProtocolViolation {
                        peer: from,
                        reason: format!("delta for locked edge {key}"),
                    });
                }
                Err(e) => return Err(e),
            };
        }
        Ok(changed)
    }

    fn exchange<C>(
        &mut self,
        comm: &C,
        tag: CommTag,
        peers: &[usize],
        outgoing: &BTreeMap<usize, BoundaryMessage>,
    ) -> Result<BTreeMap<usize, BoundaryMessage>, AmrError>
    where
        C: Communicator + ?Sized,
    {
        self.epoch += 1;
        exchange_round(
            comm,
            self.config.tag_base + tag,
            self.epoch,
            peers,
            outgoing,
            &self.config.exchange,
        )
    }

    fn other_ranks(&self) -> Vec<usize> {
        (0..self.config.num_partitions)
            .filter(|&r| r != self.config.rank)
            .collect()
    }

    /// Run `local` and delta rounds until global quiescence; returns the local
    /// passes and the rounds used.
    pub(crate) fn quiesce<C>(
        &mut self,
        comm: &C,
        stage: &'static str,
        local: LocalFixpoint,
    ) -> Result<(usize, usize), AmrError>
    where
        C: Communicator + ?Sized,
    {
        let max_passes = self.config.max_passes;
        let neighbours = self.working_mut(stage)?.neighbour_ranks();
        let everyone = self.other_ranks();
        let mut passes = 0;
        for round in 1..=self.config.max_rounds {
            passes += local(self.working_mut(stage)?, max_passes)?;

            let outgoing = self.export_boundary_deltas()?;
            let sent = outgoing
                .values()
                .any(|m| matches!(m, BoundaryMessage::Deltas(ds) if !ds.is_empty()));
            let mut changed = false;
            for (from, msg) in self.exchange(comm, TAG_DELTAS, &neighbours, &outgoing)? {
                changed |= self.import_boundary_deltas(from, msg)?;
            }

            let pending = sent || changed;
            let ballot = everyone
                .iter()
                .map(|&r| (r, BoundaryMessage::Vote { pending }))
                .collect();
            let mut any = pending;
            for (from, msg) in self.exchange(comm, TAG_VOTE, &everyone, &ballot)? {
                match msg {
                    BoundaryMessage::Vote { pending } => any |= pending,
                    other => return Err(unexpected(from, "a vote", &other)),
                }
            }
            log::debug!(
                "rank {}: {stage} round {round}: sent {sent}, changed {changed}, pending anywhere {any}",
                self.config.rank
            );
            if !any {
                return Ok((passes, round));
            }
        }
        Err(AmrError::QuiescenceNotReached {
            rounds: self.config.max_rounds,
        })
    }

    /// Agree with the neighbours on the split-node ids of marked shared edges that
    /// have none yet. Every holder proposes an id from its own sequence; the
    /// lowest proposing rank wins. Returns the number of nodes placed.
    pub(crate) fn agree_on_split_nodes<C>(&mut self, comm: &C) -> Result<usize, AmrError>
    where
        C: Communicator + ?Sized,
    {
        let rank = self.config.rank;
        let mesh = self.working_mut("mark_refinement")?;
        let neighbours = mesh.neighbour_ranks();

        let mut proposed: BTreeMap<EdgeKey, (NodeId, Vec<usize>)> = BTreeMap::new();
        let active: Vec<TetId> = mesh.active.iter().collect();
        for t in active {
            for e in mesh.tets.edges_of(t)? {
                let rec = mesh.edges.get(e)?;
                let key = rec.key;
                if !rec.needs_refinement
                    || proposed.contains_key(&key)
                    || mesh.nodes.split_node(key).is_some()
                {
                    continue;
                }
                let peers = mesh.edge_peers(e)?;
                if peers.is_empty() {
                    continue;
                }
                let id = mesh.allocator.next_id()?;
                proposed.insert(key, (id, peers));
            }
        }

        let mut outgoing: BTreeMap<usize, Vec<(EdgeKey, NodeId)>> =
            neighbours.iter().map(|&r| (r, Vec::new())).collect();
        for (&key, (id, peers)) in &proposed {
            for p in peers {
                if let Some(list) = outgoing.get_mut(p) {
                    list.push((key, *id));
                }
            }
        }
        let outgoing = outgoing
            .into_iter()
            .map(|(r, ps)| (r, BoundaryMessage::NodeProposals(ps)))
            .collect();
        let incoming = self.exchange(comm, TAG_PROPOSALS, &neighbours, &outgoing)?;

        let mesh = self.working.as_mut().ok_or(AmrError::PhaseViolation {
            operation: "mark_refinement",
            phase: Phase::Idle.name(),
        })?;
        let mut winners: BTreeMap<EdgeKey, (usize, NodeId)> = proposed
            .iter()
            .map(|(&k, &(id, _))| (k, (rank, id)))
            .collect();
        for (from, msg) in incoming {
            let proposals = match msg {
                BoundaryMessage::NodeProposals(ps) => ps,
                other => return Err(unexpected(from, "node proposals", &other)),
            };
            for (key, id) in proposals {
                let Some(e) = mesh.edges.find(key) else {
                    log::trace!("rank {rank}: ignoring proposal for unknown edge {key} from {from}");
                    continue;
                };
                if let Some(existing) = mesh.nodes.split_node(key) {
                    if existing != id {
                        return Err(AmrError::SplitNodeConflict {
                            edge: key,
                            existing,
                            requested: id,
                        });
                    }
                    continue;
                }
                if !mesh.edges.get(e)?.needs_refinement {
                    return Err(AmrError::ProtocolViolation {
                        peer: from,
                        reason: format!("node proposal for unmarked edge {key}"),
                    });
                }
                match winners.entry(key) {
                    Entry::Vacant(v) => {
                        v.insert((from, id));
                    }
                    Entry::Occupied(mut o) => {
                        if from < o.get().0 {
                            o.insert((from, id));
                        }
                    }
                }
            }
        }
        for (&key, &(owner, id)) in &winners {
            place_split_node(mesh, &*self.geometry, key, id)?;
            log::trace!("rank {rank}: edge {key} split by {id} (proposed by {owner})");
        }
        Ok(winners.len())
    }

    /// All-to-all commit vote; returns the lowest rank that refused, if any.
    pub(crate) fn commit_vote<C>(&mut self, comm: &C, ready: bool) -> Result<Option<usize>, AmrError>
    where
        C: Communicator + ?Sized,
    {
        let everyone = self.other_ranks();
        let ballot = everyone
            .iter()
            .map(|&r| (r, BoundaryMessage::Commit { ready }))
            .collect();
        let mut refused = (!ready).then_some(self.config.rank);
        for (from, msg) in self.exchange(comm, TAG_COMMIT, &everyone, &ballot)? {
            match msg {
                BoundaryMessage::Commit { ready: true } => {}
                BoundaryMessage::Commit { ready: false } => {
                    refused = Some(refused.map_or(from, |r| r.min(from)));
                }
                other => return Err(unexpected(from, "a commit vote", &other)),
            }
        }
        Ok(refused)
    }
}
