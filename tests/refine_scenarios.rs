mod util;

use tet_amr::prelude::*;
use tet_amr::topology::validation::total_active_volume;
use util::*;

#[test]
fn one_marked_edge_bisects() {
    let mut a = serial(&unit_tet());
    let summary = refine_edges(&mut a, &[(1, 2)]);
    assert_eq!(summary.refined_tets, 1);
    assert_eq!(summary.active_tets, 2);
    assert_eq!(summary.nodes_created, 1);
    assert_eq!(a.mesh().nodes().len(), 5);
    let mid = a.mesh().nodes().split_node(key(1, 2)).unwrap();
    assert_eq!(a.mesh().nodes().coords(mid).unwrap(), [0.5, 0.0, 0.0]);
    assert_valid(a.mesh());
}

#[test]
fn refine_demand_octasects() {
    let mut a = serial(&unit_tet());
    let summary = a.run_cycle(&mut refine_all(), &NoComm).unwrap();
    assert_eq!(summary.refined_tets, 1);
    assert_eq!(summary.active_tets, 8);
    assert_eq!(summary.nodes_created, 6);
    let total = total_active_volume(a.mesh()).unwrap();
    assert!((total - 1.0 / 6.0).abs() < 1e-12);
    for t in a.mesh().active().iter() {
        assert!((a.mesh().tet_volume(t).unwrap() - 1.0 / 48.0).abs() < 1e-12);
    }
    assert_valid(a.mesh());
}

#[test]
fn class_two_marks_spread_to_the_neighbour() {
    let mut a = serial(&face_pair());
    // Two edges of the shared face: the third one completes a 1:4 on both sides.
    let summary = refine_edges(&mut a, &[(1, 2), (2, 3)]);
    assert_eq!(summary.refined_tets, 2);
    assert_eq!(summary.active_tets, 8);
    assert_eq!(summary.nodes_created, 3);
    assert!(a.mesh().nodes().split_node(key(1, 3)).is_some());
    for root in [TetId::new(0), TetId::new(1)] {
        assert!(matches!(
            a.mesh().tets().get(root).unwrap().split,
            Some(SplitPattern::OneToFour { .. })
        ));
    }
    assert_valid(a.mesh());
}

#[test]
fn opposite_edges_octasect_one_side_and_split_the_shared_face() {
    let mut a = serial(&face_pair());
    let summary = refine_edges(&mut a, &[(1, 2), (3, 4)]);
    let mesh = a.mesh();
    assert_eq!(mesh.tets().get(TetId::new(0)).unwrap().split, Some(SplitPattern::OneToEight));
    assert!(matches!(
        mesh.tets().get(TetId::new(1)).unwrap().split,
        Some(SplitPattern::OneToFour { .. })
    ));
    assert_eq!(summary.active_tets, 12);
    assert_eq!(summary.nodes_created, 6);
    // Both sides triangulate the shared face the same way: four triangles, no
    // hanging coarse face.
    let shared = faces_where(mesh, |p| p[2] == 0.0);
    assert_eq!(shared.len(), 4);
    let total = total_active_volume(mesh).unwrap();
    assert!((total - 2.0 / 6.0).abs() < 1e-12);
    assert_valid(mesh);
}

#[test]
fn repeated_refinement_of_the_cube_stays_conforming() {
    let mut a = serial(&kuhn_cube());
    for cycle in 0..2 {
        // Refine the tets touching the origin corner.
        let mut ind = FnIndicator::new(
            |_: TetId, nodes: &[NodeId; 4]| nodes.contains(&n(1)),
            |_: TetId, _: &[NodeId; 4]| false,
        );
        let summary = a.run_cycle(&mut ind, &NoComm).unwrap();
        if cycle == 0 {
            assert_eq!(summary.refined_tets, 6);
            assert_eq!(summary.active_tets, 48);
        }
        assert_valid(a.mesh());
    }
    assert_eq!(a.cycle(), 2);
    let total = total_active_volume(a.mesh()).unwrap();
    assert!((total - 1.0).abs() < 1e-12);
}
