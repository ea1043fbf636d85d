use criterion::{criterion_group, criterion_main, Criterion};
use ice_core::domain::DomainLabels;
use ice_core::momentum::{Formulation, MomentumEquation};
use ice_core::prior::build_prior;
use ice_core::solver::solve_with_rng;
use ice_core::synthetic::ice_shelf_channel;
use ice_types::config::{DomainConfig, ModelConfig, PriorConfig};
use ice_types::mesh::DomainSide;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hint::black_box;

fn shelf_config(n: usize) -> ModelConfig {
    ModelConfig {
        name: "bench".to_string(),
        domain: DomainConfig {
            x_min: 0.0,
            x_max: 40_000.0,
            y_min: 0.0,
            y_max: 10_000.0,
            nx: 4 * n,
            ny: n,
            calving_sides: vec![DomainSide::East],
        },
        physics: Default::default(),
        momentum: Default::default(),
        solver: Default::default(),
        inversion: Default::default(),
        prior: Default::default(),
    }
}

fn bench_assembly(c: &mut Criterion) {
    let cfg = shelf_config(8);
    let mesh = cfg.create_mesh();
    let fields = ice_shelf_channel(&mesh, &cfg.physics);
    let labels = DomainLabels::classify(&mesh, &fields, &cfg.physics, &cfg.domain.calving_sides);
    let eq = MomentumEquation::new(&mesh, &labels, &fields, &cfg.physics, Formulation::Weak).unwrap();
    let u: Vec<f64> = (0..eq.n_dofs()).map(|i| 50.0 + (i % 7) as f64).collect();

    let mut group = c.benchmark_group("ssa_assembly_32x8");
    group.bench_function("residual", |b| b.iter(|| black_box(eq.residual(&u))));
    group.bench_function("jacobian", |b| b.iter(|| black_box(eq.jacobian(&u).nnz())));
    group.finish();
}

fn bench_newton(c: &mut Criterion) {
    let cfg = shelf_config(4);
    let mesh = cfg.create_mesh();
    let fields = ice_shelf_channel(&mesh, &cfg.physics);

    let mut group = c.benchmark_group("ssa_newton_16x4");
    group.sample_size(10);
    group.bench_function("cold_start", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            let (_, report) = solve_with_rng(&mesh, &fields, &cfg, &mut rng).unwrap();
            black_box(report.iterations)
        })
    });
    group.finish();
}

fn bench_prior_sample(c: &mut Criterion) {
    let cfg = shelf_config(4);
    let mesh = cfg.create_mesh();
    let lap = build_prior(&mesh, 1.0, 1.0, &PriorConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let mut group = c.benchmark_group("prior_16x4");
    group.sample_size(20);
    group.bench_function("sample", |b| b.iter(|| black_box(lap.sample_with_rng(&mut rng).unwrap())));
    group.bench_function("inv_action", |b| {
        let x = vec![1.0; mesh.n_vertices()];
        b.iter(|| black_box(lap.inv_action(&x).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_assembly, bench_newton, bench_prior_sample);
criterion_main!(benches);
