mod util;

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;
use tet_amr::prelude::*;
use util::*;

fn partition(rank: usize) -> MeshAdapter {
    let config = AdaptConfig::partition(rank, 2).with_node_id_base(100);
    MeshAdapter::new(&face_pair_partition(rank), config).unwrap()
}

/// Run `body` on both ranks of a two-rank universe, one thread each.
fn on_two_ranks<T, F>(body: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, LocalComm) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = LocalComm::universe(2)
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            let body = body.clone();
            thread::spawn(move || body(rank, comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Split nodes of the shared face edges, in a fixed order.
fn shared_mids(mesh: &TetMesh) -> Vec<Option<NodeId>> {
    [(1, 2), (2, 3), (1, 3)]
        .into_iter()
        .map(|(a, b)| mesh.nodes().split_node(key(a, b)))
        .collect()
}

fn on_shared_face(mesh: &TetMesh) -> BTreeSet<[NodeId; 3]> {
    faces_where(mesh, |p| p[2] == 0.0)
}

#[test]
fn one_sided_refinement_reaches_the_neighbour() {
    let out = on_two_ranks(|rank, comm| {
        let mut a = partition(rank);
        let summary = if rank == 0 {
            a.run_cycle(&mut refine_all(), &comm).unwrap()
        } else {
            a.run_cycle(&mut NoAdaptation, &comm).unwrap()
        };
        assert_valid(a.mesh());
        (summary, shared_mids(a.mesh()), on_shared_face(a.mesh()))
    });
    let (s0, mids0, face0) = &out[0];
    let (s1, mids1, face1) = &out[1];
    assert_eq!(s0.active_tets, 8);
    assert_eq!(s1.active_tets, 4);
    assert_eq!(mids0, mids1);
    for mid in mids0 {
        let id = mid.unwrap().get();
        assert!(id >= 100 && (id - 100) % 2 == 0, "{id} is not one of rank 0's ids");
    }
    assert_eq!(face0, face1);
    assert_eq!(face0.len(), 4);
}

#[test]
fn simultaneous_proposals_resolve_to_the_lowest_rank() {
    let out = on_two_ranks(|rank, comm| {
        let mut a = partition(rank);
        let summary = a.run_cycle(&mut refine_all(), &comm).unwrap();
        assert_eq!(summary.active_tets, 8);
        assert_eq!(summary.nodes_created, 6);
        (shared_mids(a.mesh()), on_shared_face(a.mesh()))
    });
    assert_eq!(out[0], out[1]);
    for mid in &out[0].0 {
        assert_eq!((mid.unwrap().get() - 100) % 2, 0);
    }
}

#[test]
fn one_sided_coarsening_keeps_the_shared_face() {
    let out = on_two_ranks(|rank, comm| {
        let mut a = partition(rank);
        if rank == 0 {
            a.run_cycle(&mut refine_all(), &comm).unwrap();
            a.run_cycle(&mut derefine_all(), &comm).unwrap()
        } else {
            a.run_cycle(&mut NoAdaptation, &comm).unwrap();
            a.run_cycle(&mut NoAdaptation, &comm).unwrap()
        }
    });
    assert_eq!(out[0].derefined_tets, 1);
    assert_eq!(out[0].nodes_removed, 3);
    assert_eq!(out[0].active_tets, 4);
    assert_eq!(out[1].derefined_tets, 0);
    assert_eq!(out[1].active_tets, 4);
}

#[test]
fn coarsening_on_both_sides_restores_the_input() {
    let out = on_two_ranks(|rank, comm| {
        let mut a = partition(rank);
        let original = sorted_connectivity(&a);
        a.run_cycle(&mut refine_all(), &comm).unwrap();
        let summary = a.run_cycle(&mut derefine_all(), &comm).unwrap();
        assert_eq!(sorted_connectivity(&a), original);
        assert_valid(a.mesh());
        summary
    });
    for summary in out {
        assert_eq!(summary.derefined_tets, 1);
        assert_eq!(summary.active_tets, 1);
        assert_eq!(summary.nodes_removed, 6);
    }
}

#[test]
fn silent_peer_times_out() {
    let comms = LocalComm::universe(2);
    let config = AdaptConfig::partition(0, 2)
        .with_node_id_base(100)
        .with_exchange_timeout(Duration::from_millis(10), 2);
    let mut a = MeshAdapter::new(&face_pair_partition(0), config).unwrap();
    let err = a.run_cycle(&mut refine_all(), &comms[0]).unwrap_err();
    assert!(matches!(err, AmrError::ExchangeTimeout { peer: 1, attempts: 3, .. }));
    assert_eq!(err.class(), ErrorClass::Protocol);
    assert_eq!(a.phase(), Phase::Idle);
    assert_eq!(a.mesh().active().len(), 1);
}
