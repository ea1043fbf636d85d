// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Inversion Tests
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Drag inversion against a synthetic stream with a sticky patch.

use ice_core::inversion::invert_with_rng;
use ice_core::solver::solve_with_rng;
use ice_core::synthetic::{ice_stream, observations_from_velocity, STREAM_LOG_DRAG};
use ice_types::config::{
    ControlSelection, DomainConfig, InversionStrategy, ModelConfig, MomentumConfig,
};
use ice_types::error::IceError;
use ice_types::mesh::TriMesh;
use ice_types::state::ModelFields;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn stream_config(gamma: f64) -> ModelConfig {
    let mut cfg = ModelConfig {
        name: "stream-inversion".to_string(),
        domain: DomainConfig {
            x_min: 0.0,
            x_max: 6000.0,
            y_min: 0.0,
            y_max: 6000.0,
            nx: 8,
            ny: 8,
            calving_sides: Vec::new(),
        },
        physics: Default::default(),
        momentum: MomentumConfig::default(),
        solver: Default::default(),
        inversion: Default::default(),
        prior: Default::default(),
    };
    cfg.solver.max_iterations = 100;
    cfg.solver.relative_tolerance = 1e-12;
    cfg.solver.linear.relative_tolerance = 1e-12;
    cfg.inversion.gamma_alpha = gamma;
    cfg.inversion.max_iterations = 30;
    cfg
}

/// Truth fields, and the same fields with observations of the truth and
/// a uniform drag first guess.
fn synthetic_problem(mesh: &TriMesh, cfg: &ModelConfig) -> (ModelFields, ModelFields) {
    let truth = ice_stream(mesh, &cfg.physics);
    let (velocity, report) = solve_with_rng(mesh, &truth, cfg, &mut StdRng::seed_from_u64(11)).unwrap();
    assert!(report.converged);

    let mut start = truth.clone();
    start.observations = Some(observations_from_velocity(mesh, &velocity, 1.0).unwrap());
    start.alpha = Array1::from_elem(mesh.n_vertices(), STREAM_LOG_DRAG);
    (truth, start)
}

fn rms(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    let n = a.len() as f64;
    (a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / n).sqrt()
}

fn non_increasing(trace: &[f64]) -> bool {
    trace
        .windows(2)
        .all(|w| w[1] <= w[0] + 1e-12 * w[0].abs())
}

// ── Joint strategy ───────────────────────────────────────────────────

#[test]
fn drag_inversion_decreases_the_functional() {
    let cfg = stream_config(1e-6);
    let mesh = cfg.create_mesh();
    let (_, start) = synthetic_problem(&mesh, &cfg);

    let result = invert_with_rng(&mesh, &start, &cfg, &mut StdRng::seed_from_u64(21)).unwrap();

    assert!(result.iterate_trace.len() >= 2);
    assert!(non_increasing(&result.iterate_trace), "{:?}", result.iterate_trace);
    let first = result.iterate_trace[0];
    let last = *result.iterate_trace.last().unwrap();
    assert!(last < first, "{last} !< {first}");
    assert!(result.breakdown.total < result.trace[0]);
    assert!(result.trace.len() >= result.iterate_trace.len());
    assert!(result.forward_report.converged);
    assert!(result.alpha.iter().all(|a| a.is_finite()));
}

#[test]
fn weak_regularization_recovers_more_of_the_patch() {
    let loose = stream_config(1e-6);
    let stiff = stream_config(1e6);
    let mesh = loose.create_mesh();
    let (truth, start) = synthetic_problem(&mesh, &loose);

    let a = invert_with_rng(&mesh, &start, &loose, &mut StdRng::seed_from_u64(21)).unwrap();
    let b = invert_with_rng(&mesh, &start, &stiff, &mut StdRng::seed_from_u64(21)).unwrap();

    let err_loose = rms(&a.alpha, &truth.alpha);
    let err_stiff = rms(&b.alpha, &truth.alpha);
    assert!(err_loose < err_stiff, "{err_loose} !< {err_stiff}");
    assert!(b.breakdown.regularization >= 0.0);
}

// ── Alternating strategy ─────────────────────────────────────────────

#[test]
fn alternating_inversion_of_drag_and_stiffness() {
    let mut cfg = stream_config(1e-6);
    cfg.inversion.controls = ControlSelection::AlphaBeta;
    cfg.inversion.strategy = InversionStrategy::Alternating { passes: 2 };
    cfg.inversion.gamma_beta = 1e-6;
    cfg.inversion.max_iterations = 10;
    let mesh = cfg.create_mesh();
    let (truth, start) = synthetic_problem(&mesh, &cfg);

    let result = invert_with_rng(&mesh, &start, &cfg, &mut StdRng::seed_from_u64(5)).unwrap();

    assert!(non_increasing(&result.iterate_trace), "{:?}", result.iterate_trace);
    assert!(*result.iterate_trace.last().unwrap() < result.iterate_trace[0]);
    assert_eq!(result.beta.len(), truth.beta.len());
    assert!(result.beta.iter().all(|b| b.is_finite()));
}

// ── Failure modes ────────────────────────────────────────────────────

#[test]
fn inversion_without_observations_is_rejected() {
    let cfg = stream_config(1.0);
    let mesh = cfg.create_mesh();
    let fields = ice_stream(&mesh, &cfg.physics);
    let err = invert_with_rng(&mesh, &fields, &cfg, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(matches!(err, IceError::MissingObservationData(_)));
}

#[test]
fn inversion_with_unobserved_domain_is_rejected() {
    let cfg = stream_config(1.0);
    let mesh = cfg.create_mesh();
    let (_, mut start) = synthetic_problem(&mesh, &cfg);
    if let Some(obs) = start.observations.as_mut() {
        obs.obs_mask.fill(0.0);
    }
    let err = invert_with_rng(&mesh, &start, &cfg, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(matches!(err, IceError::MissingObservationData(_)));
}
