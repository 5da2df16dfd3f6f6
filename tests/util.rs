#![allow(dead_code)]
use std::collections::BTreeSet;
use tet_amr::prelude::*;
use tet_amr::topology::templates::FACE_VERTICES;
use tet_amr::topology::validation::{MeshValidationOptions, validate_mesh};

pub fn n(raw: u64) -> NodeId {
    NodeId::new(raw).unwrap()
}

pub fn key(a: u64, b: u64) -> EdgeKey {
    EdgeKey::new(n(a), n(b)).unwrap()
}

/// The unit tet 1-2-3-4.
pub fn unit_tet() -> InitialMesh {
    InitialMesh::new(
        vec![
            (n(1), [0.0, 0.0, 0.0]),
            (n(2), [1.0, 0.0, 0.0]),
            (n(3), [0.0, 1.0, 0.0]),
            (n(4), [0.0, 0.0, 1.0]),
        ],
        vec![[n(1), n(2), n(3), n(4)]],
    )
}

/// Two tets sharing face 1-2-3: apex 4 above, apex 5 below.
pub fn face_pair() -> InitialMesh {
    InitialMesh::new(
        vec![
            (n(1), [0.0, 0.0, 0.0]),
            (n(2), [1.0, 0.0, 0.0]),
            (n(3), [0.0, 1.0, 0.0]),
            (n(4), [0.0, 0.0, 1.0]),
            (n(5), [0.0, 0.0, -1.0]),
        ],
        vec![[n(1), n(2), n(3), n(4)], [n(1), n(3), n(2), n(5)]],
    )
}

/// Two tets sharing only edge 1-2: 1-2-3-4 above the x axis, 1-2-5-6 below it.
pub fn edge_pair() -> InitialMesh {
    InitialMesh::new(
        vec![
            (n(1), [0.0, 0.0, 0.0]),
            (n(2), [1.0, 0.0, 0.0]),
            (n(3), [0.0, 1.0, 0.0]),
            (n(4), [0.0, 0.0, 1.0]),
            (n(5), [0.0, -1.0, 0.0]),
            (n(6), [0.0, 0.0, -1.0]),
        ],
        vec![[n(1), n(2), n(3), n(4)], [n(1), n(2), n(5), n(6)]],
    )
}

/// `rank`'s half of [`face_pair`]: rank 0 holds the upper tet, rank 1 the lower.
pub fn face_pair_partition(rank: usize) -> InitialMesh {
    let apex = if rank == 0 {
        (n(4), [0.0, 0.0, 1.0])
    } else {
        (n(5), [0.0, 0.0, -1.0])
    };
    let tet = if rank == 0 {
        [n(1), n(2), n(3), n(4)]
    } else {
        [n(1), n(3), n(2), n(5)]
    };
    InitialMesh::new(
        vec![
            (n(1), [0.0, 0.0, 0.0]),
            (n(2), [1.0, 0.0, 0.0]),
            (n(3), [0.0, 1.0, 0.0]),
            apex,
        ],
        vec![tet],
    )
    .with_shared_nodes(vec![
        (n(1), vec![0, 1]),
        (n(2), vec![0, 1]),
        (n(3), vec![0, 1]),
    ])
}

/// Kuhn triangulation of the unit cube: six tets around the diagonal 0-0-0 → 1-1-1.
/// Node `1 + x + 2y + 4z` sits at `(x, y, z)`.
pub fn kuhn_cube() -> InitialMesh {
    let id = |x: u64, y: u64, z: u64| n(1 + x + 2 * y + 4 * z);
    let mut nodes = Vec::new();
    for z in 0..2 {
        for y in 0..2 {
            for x in 0..2 {
                nodes.push((id(x, y, z), [x as f64, y as f64, z as f64]));
            }
        }
    }
    let axes = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];
    let mut tets = Vec::new();
    for perm in [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        let mut p = [0u64; 3];
        let mut tet = vec![id(0, 0, 0)];
        for a in perm {
            for k in 0..3 {
                p[k] += axes[a][k];
            }
            tet.push(id(p[0], p[1], p[2]));
        }
        tets.push([tet[0], tet[1], tet[2], tet[3]]);
    }
    InitialMesh::new(nodes, tets)
}

pub fn serial(initial: &InitialMesh) -> MeshAdapter {
    MeshAdapter::new(initial, AdaptConfig::default()).unwrap()
}

/// Run one serial cycle that refines exactly the given edges (plus their closure).
pub fn refine_edges(adapter: &mut MeshAdapter, edges: &[(u64, u64)]) -> CycleSummary {
    adapter.begin_cycle(&mut NoAdaptation).unwrap();
    for &(a, b) in edges {
        adapter.mark_edge_for_refinement(key(a, b)).unwrap();
    }
    adapter.mark_refinement(&NoComm).unwrap();
    adapter.mark_derefinement(&NoComm).unwrap();
    adapter.perform_refinement().unwrap();
    adapter.perform_derefinement().unwrap();
    adapter.finish_cycle(&NoComm).unwrap()
}

/// Indicator refining every tet.
pub fn refine_all() -> FnIndicator<
    impl FnMut(TetId, &[NodeId; 4]) -> bool,
    impl FnMut(TetId, &[NodeId; 4]) -> bool,
> {
    FnIndicator::new(|_: TetId, _: &[NodeId; 4]| true, |_: TetId, _: &[NodeId; 4]| false)
}

/// Indicator asking every tet to coarsen.
pub fn derefine_all() -> FnIndicator<
    impl FnMut(TetId, &[NodeId; 4]) -> bool,
    impl FnMut(TetId, &[NodeId; 4]) -> bool,
> {
    FnIndicator::new(|_: TetId, _: &[NodeId; 4]| false, |_: TetId, _: &[NodeId; 4]| true)
}

pub fn assert_valid(mesh: &TetMesh) {
    validate_mesh(mesh, MeshValidationOptions::all()).unwrap();
    mesh.validate_invariants().unwrap();
}

/// Sorted active faces whose three nodes satisfy `on`.
pub fn faces_where(mesh: &TetMesh, on: impl Fn([f64; 3]) -> bool) -> BTreeSet<[NodeId; 3]> {
    let mut out = BTreeSet::new();
    for t in mesh.active().iter() {
        let nodes = mesh.tets().nodes_of(t).unwrap();
        for fv in FACE_VERTICES {
            let mut face = fv.map(|i| nodes[i]);
            if face.iter().all(|&v| on(mesh.nodes().coords(v).unwrap())) {
                face.sort_unstable();
                out.insert(face);
            }
        }
    }
    out
}

/// Sorted vertex lists of the committed active tets, for order-free comparison.
pub fn sorted_connectivity(adapter: &MeshAdapter) -> Vec<[NodeId; 4]> {
    let mut tets: Vec<[NodeId; 4]> = adapter
        .active_connectivity()
        .unwrap()
        .into_iter()
        .map(|mut t| {
            t.sort_unstable();
            t
        })
        .collect();
    tets.sort_unstable();
    tets
}
