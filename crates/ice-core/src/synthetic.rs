// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Synthetic Domains
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Analytic test geometries and synthetic velocity observations.

use ice_types::config::PhysicsParams;
use ice_types::error::{IceError, IceResult};
use ice_types::mesh::TriMesh;
use ice_types::state::{ModelFields, VelocityField, VelocityObservations};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Basal drag of the stream and shelf scenarios, `ln(C)`.
pub const STREAM_LOG_DRAG: f64 = 6.7;

/// Amplitude of the sticky patch added to [`STREAM_LOG_DRAG`].
pub const STICKY_PATCH_AMPLITUDE: f64 = 1.0;

/// Uniform slab: constant bed, thickness and drag everywhere.
pub fn uniform_slab(mesh: &TriMesh, physics: &PhysicsParams, bed: f64, thickness: f64, alpha: f64) -> ModelFields {
    ModelFields::uniform(mesh, physics, bed, thickness, alpha)
}

/// `base + amplitude · exp(−r² / 2σ²)` centred in the domain with
/// `σ` a sixth of the shorter side.
pub fn sticky_patch(mesh: &TriMesh, base: f64, amplitude: f64) -> Array1<f64> {
    let cx = 0.5 * (mesh.x_min + mesh.x_max);
    let cy = 0.5 * (mesh.y_min + mesh.y_max);
    let sigma = (mesh.x_max - mesh.x_min).min(mesh.y_max - mesh.y_min) / 6.0;
    mesh.nodal_from_fn(|x, y| {
        let r2 = (x - cx).powi(2) + (y - cy).powi(2);
        base + amplitude * (-r2 / (2.0 * sigma * sigma)).exp()
    })
    .into()
}

/// Grounded stream on a bed inclined along `x` with a sticky patch in
/// the drag field.
pub fn ice_stream(mesh: &TriMesh, physics: &PhysicsParams) -> ModelFields {
    let mut fields = ModelFields::uniform(mesh, physics, 0.0, 0.0, STREAM_LOG_DRAG);
    let length = mesh.x_max - mesh.x_min;
    for (v, p) in mesh.vertices().iter().enumerate() {
        let s = (p[0] - mesh.x_min) / length;
        fields.bed[v] = 300.0 - 400.0 * s;
        fields.thickness[v] = 900.0 - 300.0 * s;
    }
    fields.alpha = sticky_patch(mesh, STREAM_LOG_DRAG, STICKY_PATCH_AMPLITUDE);
    fields
}

/// Channel whose bed deepens downstream so the ice lifts off and ends in
/// a floating tongue. Intended with a calving front on the east side.
pub fn ice_shelf_channel(mesh: &TriMesh, physics: &PhysicsParams) -> ModelFields {
    let mut fields = ModelFields::uniform(mesh, physics, 0.0, 0.0, STREAM_LOG_DRAG);
    let length = mesh.x_max - mesh.x_min;
    for (v, p) in mesh.vertices().iter().enumerate() {
        let s = (p[0] - mesh.x_min) / length;
        fields.bed[v] = -100.0 - 900.0 * s;
        fields.thickness[v] = 800.0 - 500.0 * s;
    }
    fields
}

/// Noise-free observations of `velocity` with uniform standard
/// deviation `std` over the whole mesh.
pub fn observations_from_velocity(mesh: &TriMesh, velocity: &VelocityField, std: f64) -> IceResult<VelocityObservations> {
    if !(std.is_finite() && std > 0.0) {
        return Err(IceError::ConfigError(format!(
            "observation standard deviation must be finite and > 0, got {std}"
        )));
    }
    if velocity.n_vertices() != mesh.n_vertices() {
        return Err(IceError::FieldMismatch {
            name: "velocity".to_string(),
            expected: 2 * mesh.n_vertices(),
            got: velocity.values.len(),
        });
    }
    let (u, v) = velocity.components();
    let nv = mesh.n_vertices();
    Ok(VelocityObservations {
        u_obs: u,
        v_obs: v,
        u_std: Array1::from_elem(nv, std),
        v_std: Array1::from_elem(nv, std),
        obs_mask: Array1::ones(mesh.n_cells()),
    })
}

/// As [`observations_from_velocity`] with `N(0, std²)` noise added to
/// both components.
pub fn noisy_observations<R: Rng + ?Sized>(
    mesh: &TriMesh,
    velocity: &VelocityField,
    std: f64,
    rng: &mut R,
) -> IceResult<VelocityObservations> {
    let mut obs = observations_from_velocity(mesh, velocity, std)?;
    let noise = Normal::new(0.0, std).map_err(|e| IceError::ConfigError(format!("noise model: {e}")))?;
    obs.u_obs.iter_mut().for_each(|u| *u += noise.sample(rng));
    obs.v_obs.iter_mut().for_each(|v| *v += noise.sample(rng));
    Ok(obs)
}
