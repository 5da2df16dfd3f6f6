mod util;

use tet_amr::prelude::*;
use util::*;

#[test]
fn refine_coarsen_refine_reuses_history() {
    let mut a = serial(&unit_tet());
    let first = a.run_cycle(&mut refine_all(), &NoComm).unwrap();
    assert_eq!(first.nodes_created, 6);
    let children = a.mesh().tets().get(TetId::new(0)).unwrap().children.clone();
    let fine = sorted_connectivity(&a);
    let edges = a.mesh().edges().len();
    let allocated = a.mesh().allocator().allocated();

    a.run_cycle(&mut derefine_all(), &NoComm).unwrap();
    assert_eq!(a.mesh().active().len(), 1);

    let again = a.run_cycle(&mut refine_all(), &NoComm).unwrap();
    assert_eq!(again.nodes_created, 0);
    assert_eq!(again.nodes_revived, 6);
    assert_eq!(a.mesh().tets().get(TetId::new(0)).unwrap().children, children);
    assert_eq!(sorted_connectivity(&a), fine);
    assert_eq!(a.mesh().edges().len(), edges);
    assert_eq!(a.mesh().allocator().allocated(), allocated);
    assert_valid(a.mesh());
}

#[test]
fn partial_then_full_coarsening() {
    let mut a = serial(&face_pair());
    refine_edges(&mut a, &[(1, 2), (3, 4)]);
    let upper: Vec<TetId> = a.mesh().tets().get(TetId::new(0)).unwrap().children.clone();
    let mut ind = FnIndicator::new(
        |_: TetId, _: &[NodeId; 4]| false,
        move |t: TetId, _: &[NodeId; 4]| upper.contains(&t),
    );
    let eight_to_four = a.run_cycle(&mut ind, &NoComm).unwrap();
    assert_eq!(eight_to_four.active_tets, 8);

    // Both sides now carry a 1:4 split of the shared face and coarsen together.
    let summary = a.run_cycle(&mut derefine_all(), &NoComm).unwrap();
    assert_eq!(summary.derefined_tets, 2);
    assert_eq!(summary.nodes_removed, 3);
    assert_eq!(summary.active_tets, 2);
    assert_valid(a.mesh());
}

#[test]
fn serial_node_ids_continue_after_the_input() {
    let mut a = serial(&unit_tet());
    a.run_cycle(&mut refine_all(), &NoComm).unwrap();
    let ids: Vec<u64> = a.mesh().nodes().iter().map(|r| r.id.get()).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
}
