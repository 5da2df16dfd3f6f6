mod util;

use proptest::prelude::*;
use tet_amr::prelude::*;
use tet_amr::topology::validation::total_active_volume;
use util::*;

fn cube_edges() -> Vec<EdgeKey> {
    let a = serial(&kuhn_cube());
    a.mesh().edges().iter().map(|(_, e)| e.key).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_marking_refines_conformingly(mask in 1u32..(1 << 19)) {
        let edges = cube_edges();
        prop_assert_eq!(edges.len(), 19);
        let mut a = serial(&kuhn_cube());
        let original = sorted_connectivity(&a);

        a.begin_cycle(&mut NoAdaptation).unwrap();
        for (i, &e) in edges.iter().enumerate() {
            if mask & (1 << i) != 0 {
                a.mark_edge_for_refinement(e).unwrap();
            }
        }
        let report = a.mark_refinement(&NoComm).unwrap();
        // Every pass but the last adds a mark.
        prop_assert!(report.passes <= edges.len() + 1, "{} passes", report.passes);
        a.mark_derefinement(&NoComm).unwrap();
        a.perform_refinement().unwrap();
        a.perform_derefinement().unwrap();
        let summary = a.finish_cycle(&NoComm).unwrap();
        prop_assert!(summary.refined_tets >= 1);
        assert_valid(a.mesh());
        let volume = total_active_volume(a.mesh()).unwrap();
        prop_assert!((volume - 1.0).abs() < 1e-12, "volume {}", volume);

        // Coarsening everything undoes the cycle.
        let back = a.run_cycle(&mut derefine_all(), &NoComm).unwrap();
        prop_assert_eq!(back.derefined_tets, summary.refined_tets);
        prop_assert_eq!(sorted_connectivity(&a), original);
    }

    #[test]
    fn coarsening_a_mixed_depth_hierarchy_stays_conforming(
        edge_mask in 1u32..(1 << 19),
        tet_mask in any::<u64>(),
    ) {
        let edges = cube_edges();
        let mut a = serial(&kuhn_cube());

        a.begin_cycle(&mut NoAdaptation).unwrap();
        for (i, &e) in edges.iter().enumerate() {
            if edge_mask & (1 << i) != 0 {
                a.mark_edge_for_refinement(e).unwrap();
            }
        }
        a.mark_refinement(&NoComm).unwrap();
        a.mark_derefinement(&NoComm).unwrap();
        a.perform_refinement().unwrap();
        a.perform_derefinement().unwrap();
        a.finish_cycle(&NoComm).unwrap();
        assert_valid(a.mesh());

        // Second level on a pseudo-random subset of the active tets.
        let mut deeper = FnIndicator::new(
            move |t: TetId, _: &[NodeId; 4]| tet_mask & (1 << (t.index() % 64)) != 0,
            |_: TetId, _: &[NodeId; 4]| false,
        );
        a.run_cycle(&mut deeper, &NoComm).unwrap();
        assert_valid(a.mesh());
        let fine = a.mesh().active().len();

        let summary = a.run_cycle(&mut derefine_all(), &NoComm).unwrap();
        assert_valid(a.mesh());
        prop_assert!(summary.active_tets <= fine);
        let volume = total_active_volume(a.mesh()).unwrap();
        prop_assert!((volume - 1.0).abs() < 1e-12, "volume {}", volume);
    }
}
