//! The adaptation cycle of one partition.
//!
//! A [`MeshAdapter`] owns its partition's committed [`TetMesh`]. A cycle works on a
//! clone of it and goes through fixed stages:
//!
//! 1. [`begin_cycle`](MeshAdapter::begin_cycle) asks the indicator about every
//!    active tet and seeds refinement marks;
//! 2. [`mark_refinement`](MeshAdapter::mark_refinement) completes the marks to
//!    split templates, to global quiescence, and agrees on shared split nodes;
//! 3. [`mark_derefinement`](MeshAdapter::mark_derefinement) decides which refined
//!    tets lose (some of) their split nodes;
//! 4. [`perform_refinement`](MeshAdapter::perform_refinement) and
//!    [`perform_derefinement`](MeshAdapter::perform_derefinement) apply the
//!    decisions to the working copy;
//! 5. [`finish_cycle`](MeshAdapter::finish_cycle) validates the working copy,
//!    votes with every partition and, if everyone is ready, runs the solution
//!    transfer and makes the working copy the committed mesh.
//!
//! Any error aborts the cycle: the working copy is dropped and the committed mesh
//! is untouched. [`run_cycle`](MeshAdapter::run_cycle) drives all stages.

pub mod config;
pub mod mark_derefinement;
mod mark_refinement;
mod protocol;

pub use crate::algs::wire::BoundaryMessage;
pub use config::AdaptConfig;
pub use mark_derefinement::{Decision, DerefinementPlan};

use crate::algs::communicator::Communicator;
use crate::amr_error::AmrError;
use crate::callbacks::{ErrorIndicator, GeometryModel, Midpoint, NoTransfer, SolutionTransfer};
use crate::debug_invariants::DebugInvariants;
use crate::topology::edge_store::Origin;
use crate::topology::ids::{EdgeKey, NodeId, TetId};
use crate::topology::mesh::{InitialMesh, TetMesh};
use crate::topology::refine::Refiner;
use crate::topology::templates::SplitPattern;
use crate::topology::validation::{MeshValidationOptions, validate_mesh};
use itertools::{EitherOrBoth, Itertools};
use mark_derefinement::{build_plan, derefinement_fixpoint, seed_derefinement};
use mark_refinement::refinement_fixpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Bump when [`MeshCheckpoint`] changes incompatibly.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Where the running cycle stands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Begun,
    RefinementMarked,
    DerefinementMarked,
    Refined,
    Derefined,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Begun => "begun",
            Phase::RefinementMarked => "refinement-marked",
            Phase::DerefinementMarked => "derefinement-marked",
            Phase::Refined => "refined",
            Phase::Derefined => "derefined",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one marking stage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkingReport {
    /// Local passes summed over all rounds.
    pub passes: usize,
    /// Exchange rounds until quiescence.
    pub rounds: usize,
    /// Edges locked at quiescence.
    pub marked_edges: usize,
    /// Tets that will be refined, or derefined.
    pub planned_tets: usize,
    /// Split nodes agreed with neighbours (refinement only).
    pub shared_nodes: usize,
}

/// What a committed cycle changed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: u64,
    pub refined_tets: usize,
    pub derefined_tets: usize,
    /// Split nodes created this cycle (each got an interpolation call).
    pub nodes_created: usize,
    /// Permanent split nodes active again.
    pub nodes_revived: usize,
    pub nodes_removed: usize,
    pub active_tets: usize,
}

/// Everything needed to resume a partition after a restart, including the
/// inactive history that makes later derefinement possible.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshCheckpoint {
    pub format_version: u32,
    pub config: AdaptConfig,
    pub cycle: u64,
    pub epoch: u32,
    pub mesh: TetMesh,
}

/// Adaptation engine of one partition.
pub struct MeshAdapter {
    config: AdaptConfig,
    committed: TetMesh,
    working: Option<TetMesh>,
    phase: Phase,
    /// Round counter shared by every exchange; all partitions advance it in step.
    epoch: u32,
    cycle: u64,
    derefine_wanted: BTreeSet<TetId>,
    plan: Option<DerefinementPlan>,
    refined: usize,
    derefined: usize,
    geometry: Box<dyn GeometryModel + Send>,
    transfer: Box<dyn SolutionTransfer + Send>,
}

impl fmt::Debug for MeshAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshAdapter")
            .field("rank", &self.config.rank)
            .field("phase", &self.phase)
            .field("cycle", &self.cycle)
            .field("epoch", &self.epoch)
            .field("active_tets", &self.committed.active().len())
            .finish_non_exhaustive()
    }
}

impl MeshAdapter {
    /// Adapter for `config.rank`'s part `initial` of the mesh.
    pub fn new(initial: &InitialMesh, config: AdaptConfig) -> Result<Self, AmrError> {
        config.validate()?;
        let committed = TetMesh::from_initial(
            initial,
            config.rank,
            config.num_partitions,
            config.node_id_base,
        )?;
        committed.debug_assert_invariants();
        Ok(Self::assemble(config, committed, 0, 0))
    }

    fn assemble(config: AdaptConfig, committed: TetMesh, cycle: u64, epoch: u32) -> Self {
        Self {
            config,
            committed,
            working: None,
            phase: Phase::Idle,
            epoch,
            cycle,
            derefine_wanted: BTreeSet::new(),
            plan: None,
            refined: 0,
            derefined: 0,
            geometry: Box::new(Midpoint),
            transfer: Box::new(NoTransfer),
        }
    }

    pub fn with_geometry(mut self, geometry: impl GeometryModel + Send + 'static) -> Self {
        self.geometry = Box::new(geometry);
        self
    }

    pub fn with_transfer(mut self, transfer: impl SolutionTransfer + Send + 'static) -> Self {
        self.transfer = Box::new(transfer);
        self
    }

    pub fn config(&self) -> &AdaptConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of cycles begun so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The committed mesh, as the solver sees it.
    pub fn mesh(&self) -> &TetMesh {
        &self.committed
    }

    /// The working copy of the running cycle.
    pub fn working_mesh(&self) -> Option<&TetMesh> {
        self.working.as_ref()
    }

    /// The derefinement plan, once derefinement marking has run.
    pub fn plan(&self) -> Option<&DerefinementPlan> {
        self.plan.as_ref()
    }

    /// Vertices of every committed active tet.
    pub fn active_connectivity(&self) -> Result<Vec<[NodeId; 4]>, AmrError> {
        self.committed.active_connectivity()
    }

    pub(crate) fn working_mut(&mut self, operation: &'static str) -> Result<&mut TetMesh, AmrError> {
        let phase = self.phase.name();
        self.working
            .as_mut()
            .ok_or(AmrError::PhaseViolation { operation, phase })
    }

    fn expect_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), AmrError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(AmrError::PhaseViolation {
                operation,
                phase: self.phase.name(),
            })
        }
    }

    fn check_comm<C: Communicator + ?Sized>(&self, comm: &C) -> Result<(), AmrError> {
        if comm.rank() != self.config.rank || comm.size() != self.config.num_partitions {
            return Err(AmrError::Config(format!(
                "communicator is rank {} of {}, adapter is rank {} of {}",
                comm.rank(),
                comm.size(),
                self.config.rank,
                self.config.num_partitions
            )));
        }
        Ok(())
    }

    /// Run `stage`, aborting the cycle if it fails.
    fn guarded<T>(
        &mut self,
        stage: impl FnOnce(&mut Self) -> Result<T, AmrError>,
    ) -> Result<T, AmrError> {
        let result = stage(self);
        if let Err(e) = &result {
            if self.phase != Phase::Idle {
                log::warn!("rank {}: aborting cycle {}: {e}", self.config.rank, self.cycle);
                self.abort_cycle();
            }
        }
        result
    }

    /// Start a cycle: clone the committed mesh and ask `indicator` about every
    /// active tet. A tet that wants refinement gets all six edges marked; one that
    /// wants derefinement is remembered for derefinement marking.
    pub fn begin_cycle<I>(&mut self, indicator: &mut I) -> Result<(), AmrError>
    where
        I: ErrorIndicator + ?Sized,
    {
        self.expect_phase("begin_cycle", &[Phase::Idle])?;
        let mut working = self.committed.clone();
        working.edges.reset_cycle_state();
        let mut wanted = BTreeSet::new();
        let active: Vec<TetId> = working.active.iter().collect();
        for t in active {
            let nodes = working.tets.nodes_of(t)?;
            let refine = indicator
                .wants_refine(t, &nodes)
                .map_err(|e| AmrError::callback("indicator", e))?;
            if refine {
                for e in working.tets.edges_of(t)? {
                    working.edges.mark_refinement(e, Origin::Local)?;
                }
            } else if indicator
                .wants_derefine(t, &nodes)
                .map_err(|e| AmrError::callback("indicator", e))?
            {
                wanted.insert(t);
            }
        }
        self.cycle += 1;
        log::debug!(
            "rank {}: cycle {} begun, {} tets want derefinement",
            self.config.rank,
            self.cycle,
            wanted.len()
        );
        self.working = Some(working);
        self.derefine_wanted = wanted;
        self.plan = None;
        self.refined = 0;
        self.derefined = 0;
        self.phase = Phase::Begun;
        Ok(())
    }

    /// Mark one edge for refinement on top of the indicator's demand; returns
    /// whether the mark is new.
    pub fn mark_edge_for_refinement(&mut self, edge: EdgeKey) -> Result<bool, AmrError> {
        self.guarded(|s| {
            s.expect_phase("mark_edge_for_refinement", &[Phase::Begun])?;
            let mesh = s.working_mut("mark_edge_for_refinement")?;
            let id = mesh.edges.find(edge).ok_or(AmrError::UnknownEdgeKey(edge))?;
            mesh.edges.mark_refinement(id, Origin::Local)
        })
    }

    /// Complete the refinement marks to split templates everywhere, agree on the
    /// ids of new shared nodes and lock the marked edges.
    pub fn mark_refinement<C>(&mut self, comm: &C) -> Result<MarkingReport, AmrError>
    where
        C: Communicator + ?Sized,
    {
        self.guarded(|s| {
            s.expect_phase("mark_refinement", &[Phase::Begun])?;
            s.check_comm(comm)?;
            let (passes, rounds) = s.quiesce(comm, "refinement", refinement_fixpoint)?;
            let shared_nodes = s.agree_on_split_nodes(comm)?;
            let mesh = s.working_mut("mark_refinement")?;
            let marked_edges = mesh.edges.lock_where(|e| e.needs_refinement);
            let mut planned_tets = 0;
            for t in mesh.active.iter() {
                if mesh.refine_mask(t)? != 0 {
                    planned_tets += 1;
                }
            }
            s.phase = Phase::RefinementMarked;
            log::debug!(
                "rank {}: refinement marked: {marked_edges} edges, {planned_tets} tets, {passes} passes, {rounds} rounds",
                s.config.rank
            );
            Ok(MarkingReport {
                passes,
                rounds,
                marked_edges,
                planned_tets,
                shared_nodes,
            })
        })
    }

    /// Decide the derefinement plan: seed marks from the indicator's demand, run
    /// the decision passes to global quiescence and lock the surviving marks.
    pub fn mark_derefinement<C>(&mut self, comm: &C) -> Result<MarkingReport, AmrError>
    where
        C: Communicator + ?Sized,
    {
        self.guarded(|s| {
            s.expect_phase("mark_derefinement", &[Phase::RefinementMarked])?;
            s.check_comm(comm)?;
            let wanted = std::mem::take(&mut s.derefine_wanted);
            seed_derefinement(s.working_mut("mark_derefinement")?, &wanted)?;
            let (passes, rounds) = s.quiesce(comm, "derefinement", derefinement_fixpoint)?;
            let mesh = s.working_mut("mark_derefinement")?;
            let plan = build_plan(mesh)?;
            let marked_edges = mesh.edges.lock_where(|e| e.needs_derefinement);
            let planned_tets = plan.len();
            s.plan = Some(plan);
            s.phase = Phase::DerefinementMarked;
            log::debug!(
                "rank {}: derefinement marked: {planned_tets} tets, {passes} passes, {rounds} rounds",
                s.config.rank
            );
            Ok(MarkingReport {
                passes,
                rounds,
                marked_edges,
                planned_tets,
                shared_nodes: 0,
            })
        })
    }

    /// Split every active tet with marked edges by the template its marks form;
    /// returns the number of tets refined.
    pub fn perform_refinement(&mut self) -> Result<usize, AmrError> {
        self.guarded(|s| {
            s.expect_phase("perform_refinement", &[Phase::DerefinementMarked])?;
            let mesh = s
                .working
                .as_mut()
                .ok_or(AmrError::PhaseViolation {
                    operation: "perform_refinement",
                    phase: Phase::Idle.name(),
                })?;
            let mut targets = Vec::new();
            for t in mesh.active.iter() {
                let mask = mesh.refine_mask(t)?;
                if mask != 0 {
                    let pattern = SplitPattern::from_edge_mask(mask)
                        .ok_or(AmrError::UnsupportedSplitPattern { tet: t, mask })?;
                    targets.push((t, pattern));
                }
            }
            let mut refiner = Refiner::new(mesh, &*s.geometry);
            for &(t, pattern) in &targets {
                refiner.refine(t, pattern)?;
            }
            s.refined = targets.len();
            s.phase = Phase::Refined;
            Ok(targets.len())
        })
    }

    /// Apply the derefinement plan; returns the number of tets derefined.
    pub fn perform_derefinement(&mut self) -> Result<usize, AmrError> {
        self.guarded(|s| {
            s.expect_phase("perform_derefinement", &[Phase::Refined])?;
            let entries = match &s.plan {
                Some(plan) => plan.entries.clone(),
                None => {
                    return Err(AmrError::PhaseViolation {
                        operation: "perform_derefinement",
                        phase: "refined without a derefinement plan",
                    });
                }
            };
            let mesh = s
                .working
                .as_mut()
                .ok_or(AmrError::PhaseViolation {
                    operation: "perform_derefinement",
                    phase: Phase::Idle.name(),
                })?;
            let mut refiner = Refiner::new(mesh, &*s.geometry);
            for &(t, keep) in &entries {
                refiner.derefine(t, keep)?;
            }
            s.derefined = entries.len();
            s.phase = Phase::Derefined;
            Ok(entries.len())
        })
    }

    /// Validate the working copy, vote with every partition and commit. Only after
    /// both perform stages, so marks agreed with neighbours are never dropped.
    ///
    /// The solution transfer runs after a unanimous vote: first
    /// `interpolate_on_split` for every split node created this cycle, then
    /// `on_node_removed` for every node that left the active mesh, each in
    /// ascending id order.
    pub fn finish_cycle<C>(&mut self, comm: &C) -> Result<CycleSummary, AmrError>
    where
        C: Communicator + ?Sized,
    {
        self.guarded(|s| {
            s.expect_phase("finish_cycle", &[Phase::Derefined])?;
            s.check_comm(comm)?;
            let check = s.config.check_conformity;
            let working = s.working_mut("finish_cycle")?;
            working.debug_assert_invariants();
            let local = if check {
                validate_mesh(working, MeshValidationOptions::all())
            } else {
                Ok(())
            };
            let refused = s.commit_vote(comm, local.is_ok())?;
            local?;
            if let Some(rank) = refused {
                return Err(AmrError::CycleAborted { rank });
            }
            s.commit()
        })
    }

    fn commit(&mut self) -> Result<CycleSummary, AmrError> {
        let working = self.working.take().ok_or(AmrError::PhaseViolation {
            operation: "finish_cycle",
            phase: Phase::Idle.name(),
        })?;
        let old = &self.committed;
        let mut created = Vec::new();
        let mut removed = Vec::new();
        let mut revived = 0;
        for pair in old
            .active
            .nodes()
            .merge_join_by(working.active.nodes(), |a, b| a.cmp(b))
        {
            match pair {
                EitherOrBoth::Left(n) => removed.push(n),
                EitherOrBoth::Right(n) if old.nodes.contains(n) => revived += 1,
                EitherOrBoth::Right(n) => created.push(n),
                EitherOrBoth::Both(..) => {}
            }
        }
        for &n in &created {
            let parent = working
                .nodes
                .get(n)
                .and_then(|r| r.parent_edge)
                .ok_or(AmrError::UnknownNode(n))?;
            self.transfer
                .interpolate_on_split(parent.nodes(), n)
                .map_err(|e| AmrError::callback("transfer", e))?;
        }
        for &n in &removed {
            self.transfer
                .on_node_removed(n)
                .map_err(|e| AmrError::callback("transfer", e))?;
        }

        let summary = CycleSummary {
            cycle: self.cycle,
            refined_tets: self.refined,
            derefined_tets: self.derefined,
            nodes_created: created.len(),
            nodes_revived: revived,
            nodes_removed: removed.len(),
            active_tets: working.active.len(),
        };
        self.committed = working;
        self.committed.edges.reset_cycle_state();
        self.plan = None;
        self.phase = Phase::Idle;
        log::info!(
            "rank {}: cycle {} committed: {} refined, {} derefined, +{} -{} nodes, {} active tets",
            self.config.rank,
            summary.cycle,
            summary.refined_tets,
            summary.derefined_tets,
            summary.nodes_created + summary.nodes_revived,
            summary.nodes_removed,
            summary.active_tets
        );
        Ok(summary)
    }

    /// Drop the working copy; the committed mesh stays as it was.
    pub fn abort_cycle(&mut self) {
        self.working = None;
        self.plan = None;
        self.derefine_wanted.clear();
        self.phase = Phase::Idle;
    }

    /// Run every stage of one cycle.
    pub fn run_cycle<I, C>(&mut self, indicator: &mut I, comm: &C) -> Result<CycleSummary, AmrError>
    where
        I: ErrorIndicator + ?Sized,
        C: Communicator + ?Sized,
    {
        self.guarded(|s| s.begin_cycle(indicator))?;
        self.mark_refinement(comm)?;
        self.mark_derefinement(comm)?;
        self.perform_refinement()?;
        self.perform_derefinement()?;
        self.finish_cycle(comm)
    }

    /// Snapshot of the committed state; only between cycles.
    pub fn checkpoint(&self) -> Result<MeshCheckpoint, AmrError> {
        self.expect_phase("checkpoint", &[Phase::Idle])?;
        Ok(MeshCheckpoint {
            format_version: CHECKPOINT_FORMAT_VERSION,
            config: self.config.clone(),
            cycle: self.cycle,
            epoch: self.epoch,
            mesh: self.committed.clone(),
        })
    }

    /// Resume from `checkpoint` with the default geometry and transfer.
    pub fn restore(checkpoint: MeshCheckpoint) -> Result<Self, AmrError> {
        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(AmrError::Checkpoint(format!(
                "format version {} (expected {CHECKPOINT_FORMAT_VERSION})",
                checkpoint.format_version
            )));
        }
        checkpoint.config.validate()?;
        let mut mesh = checkpoint.mesh;
        if mesh.rank() != checkpoint.config.rank {
            return Err(AmrError::Checkpoint(format!(
                "mesh of rank {} under the configuration of rank {}",
                mesh.rank(),
                checkpoint.config.rank
            )));
        }
        mesh.rebuild_index()?;
        mesh.validate_invariants()?;
        log::debug!(
            "rank {}: restored after cycle {} with {} active tets",
            checkpoint.config.rank,
            checkpoint.cycle,
            mesh.active().len()
        );
        Ok(Self::assemble(
            checkpoint.config,
            mesh,
            checkpoint.cycle,
            checkpoint.epoch,
        ))
    }
}
