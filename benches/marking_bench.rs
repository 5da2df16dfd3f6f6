use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use tet_amr::prelude::*;

/// `k`³ unit cubes, each cut into six Kuhn tets.
fn kuhn_grid(k: u64) -> InitialMesh {
    let id = |x: u64, y: u64, z: u64| NodeId::new(1 + x + (k + 1) * (y + (k + 1) * z)).unwrap();
    let mut nodes = Vec::new();
    for z in 0..=k {
        for y in 0..=k {
            for x in 0..=k {
                nodes.push((id(x, y, z), [x as f64, y as f64, z as f64]));
            }
        }
    }
    let axes = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];
    let perms = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut tets = Vec::new();
    for z in 0..k {
        for y in 0..k {
            for x in 0..k {
                for perm in perms {
                    let mut p = [x, y, z];
                    let mut tet = [id(x, y, z); 4];
                    for (slot, a) in perm.into_iter().enumerate() {
                        for c in 0..3 {
                            p[c] += axes[a][c];
                        }
                        tet[slot + 1] = id(p[0], p[1], p[2]);
                    }
                    tets.push(tet);
                }
            }
        }
    }
    InitialMesh::new(nodes, tets)
}

fn bench_refinement_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("refinement-cycle");
    for &k in &[2u64, 4, 6] {
        let initial = kuhn_grid(k);
        group.bench_with_input(BenchmarkId::new("kuhn-grid", k), &initial, |b, initial| {
            b.iter(|| {
                let mut rng = SmallRng::seed_from_u64(42);
                let mut adapter = MeshAdapter::new(initial, AdaptConfig::default()).unwrap();
                let mut ind = FnIndicator::new(
                    move |_: TetId, _: &[NodeId; 4]| rng.gen_bool(0.1),
                    |_: TetId, _: &[NodeId; 4]| false,
                );
                adapter.run_cycle(&mut ind, &NoComm).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let initial = kuhn_grid(3);
    c.bench_function("refine-then-coarsen", |b| {
        b.iter(|| {
            let mut adapter = MeshAdapter::new(&initial, AdaptConfig::default()).unwrap();
            let mut all = FnIndicator::new(
                |_: TetId, _: &[NodeId; 4]| true,
                |_: TetId, _: &[NodeId; 4]| false,
            );
            adapter.run_cycle(&mut all, &NoComm).unwrap();
            let mut none = FnIndicator::new(
                |_: TetId, _: &[NodeId; 4]| false,
                |_: TetId, _: &[NodeId; 4]| true,
            );
            adapter.run_cycle(&mut none, &NoComm).unwrap()
        });
    });
}

criterion_group!(benches, bench_refinement_cycle, bench_round_trip);
criterion_main!(benches);
