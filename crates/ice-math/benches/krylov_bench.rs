use criterion::{criterion_group, criterion_main, Criterion};
use ice_math::cg::{pcg_solve, CgConfig};
use ice_math::gmres::{gmres_solve, GmresConfig};
use ice_math::sor::sor_solve;
use ice_math::sparse::CsrMatrix;
use ice_math::sqrt_series::sqrt_action;
use std::hint::black_box;

/// 5-point Laplacian plus a mass-like shift on an m x m grid.
fn shifted_laplacian(m: usize, shift: f64) -> CsrMatrix {
    let idx = |i: usize, j: usize| j * m + i;
    let mut t = Vec::new();
    for j in 0..m {
        for i in 0..m {
            let k = idx(i, j);
            t.push((k, k, 4.0 + shift));
            if i > 0 {
                t.push((k, idx(i - 1, j), -1.0));
            }
            if i + 1 < m {
                t.push((k, idx(i + 1, j), -1.0));
            }
            if j > 0 {
                t.push((k, idx(i, j - 1), -1.0));
            }
            if j + 1 < m {
                t.push((k, idx(i, j + 1), -1.0));
            }
        }
    }
    CsrMatrix::from_triplets(m * m, &t).unwrap()
}

fn bench_cg_33(c: &mut Criterion) {
    let a = shifted_laplacian(33, 0.01);
    let b = vec![1.0; 33 * 33];
    let config = CgConfig::default();

    c.bench_function("pcg_ssor_33x33", |bch| {
        bch.iter(|| {
            let mut x = vec![0.0; 33 * 33];
            let res = pcg_solve(&a, &b, &mut x, &config).unwrap();
            black_box(res.iterations);
        })
    });
}

fn bench_cg_vs_gmres_65(c: &mut Criterion) {
    let a = shifted_laplacian(65, 0.01);
    let b = vec![1.0; 65 * 65];

    let mut group = c.benchmark_group("krylov_65x65");
    group.sample_size(10);

    group.bench_function("ssor_sweeps_200", |bch| {
        bch.iter(|| {
            let mut x = vec![0.0; 65 * 65];
            sor_solve(&a, &b, &mut x, 1.8, 200);
            black_box(x[32 * 65 + 32]);
        })
    });

    group.bench_function("pcg_ssor", |bch| {
        bch.iter(|| {
            let mut x = vec![0.0; 65 * 65];
            let res = pcg_solve(&a, &b, &mut x, &CgConfig::default()).unwrap();
            black_box(res.iterations);
        })
    });

    group.bench_function("gmres_50_ssor", |bch| {
        bch.iter(|| {
            let mut x = vec![0.0; 65 * 65];
            let res = gmres_solve(&a, &b, &mut x, &GmresConfig::default()).unwrap();
            black_box(res.iterations);
        })
    });

    group.finish();
}

fn bench_sqrt_series(c: &mut Criterion) {
    let a = shifted_laplacian(17, 4.0);
    let beta = a.inf_norm();
    let x: Vec<f64> = (0..17 * 17).map(|i| (i as f64).sin()).collect();

    c.bench_function("sqrt_series_17x17", |bch| {
        bch.iter(|| {
            let res = sqrt_action(&a, &x, beta, 1e-16, 100_000).unwrap();
            black_box(res.terms);
        })
    });
}

criterion_group!(benches, bench_cg_33, bench_cg_vs_gmres_65, bench_sqrt_series);
criterion_main!(benches);
