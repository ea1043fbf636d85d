// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array1;

use crate::config::PhysicsParams;
use crate::error::{IceError, IceResult};
use crate::mesh::TriMesh;

/// Surface-velocity observations and their uncertainties.
///
/// Velocities and standard deviations are nodal; `obs_mask` is
/// cell-wise and marks cells where the misfit is evaluated.
#[derive(Debug, Clone)]
pub struct VelocityObservations {
    pub u_obs: Array1<f64>,
    pub v_obs: Array1<f64>,
    pub u_std: Array1<f64>,
    pub v_std: Array1<f64>,
    pub obs_mask: Array1<f64>,
}

/// Geometry, forcing and control fields of one model instance.
///
/// Nodal fields have one value per mesh vertex, `mask` one value per
/// cell. `alpha` is the log basal-drag parameter (drag coefficient
/// `exp(alpha)`), `beta` the log ice stiffness (`B = exp(beta)`).
#[derive(Debug, Clone)]
pub struct ModelFields {
    pub bed: Array1<f64>,
    pub thickness: Array1<f64>,
    pub mask: Array1<f64>,
    pub alpha: Array1<f64>,
    pub beta: Array1<f64>,
    pub bmelt: Array1<f64>,
    pub smb: Array1<f64>,
    pub observations: Option<VelocityObservations>,
}

impl ModelFields {
    /// Uniform ice cover over the whole mesh with constant bed,
    /// thickness and drag, default stiffness and no observations.
    pub fn uniform(
        mesh: &TriMesh,
        physics: &PhysicsParams,
        bed: f64,
        thickness: f64,
        alpha: f64,
    ) -> Self {
        let nv = mesh.n_vertices();
        ModelFields {
            bed: Array1::from_elem(nv, bed),
            thickness: Array1::from_elem(nv, thickness),
            mask: Array1::ones(mesh.n_cells()),
            alpha: Array1::from_elem(nv, alpha),
            beta: Array1::from_elem(nv, physics.log_stiffness()),
            bmelt: Array1::zeros(nv),
            smb: Array1::zeros(nv),
            observations: None,
        }
    }

    /// Check every field against the mesh sizes.
    pub fn validate(&self, mesh: &TriMesh) -> IceResult<()> {
        let nv = mesh.n_vertices();
        let nc = mesh.n_cells();
        check_len("bed", &self.bed, nv)?;
        check_len("thickness", &self.thickness, nv)?;
        check_len("mask", &self.mask, nc)?;
        check_len("alpha", &self.alpha, nv)?;
        check_len("beta", &self.beta, nv)?;
        check_len("bmelt", &self.bmelt, nv)?;
        check_len("smb", &self.smb, nv)?;
        if let Some(obs) = &self.observations {
            check_len("u_obs", &obs.u_obs, nv)?;
            check_len("v_obs", &obs.v_obs, nv)?;
            check_len("u_std", &obs.u_std, nv)?;
            check_len("v_std", &obs.v_std, nv)?;
            check_len("obs_mask", &obs.obs_mask, nc)?;
            if obs
                .u_std
                .iter()
                .chain(obs.v_std.iter())
                .any(|s| !(s.is_finite() && *s > 0.0))
            {
                return Err(IceError::ConfigError(
                    "observation standard deviations must be finite and > 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Upper ice surface: `bed + H` where grounded, the hydrostatic
    /// freeboard `(1 - rho_ice / rho_water) H` where floating.
    pub fn surface(&self, physics: &PhysicsParams) -> Array1<f64> {
        let delta = physics.density_contrast();
        self.bed
            .iter()
            .zip(self.thickness.iter())
            .map(|(&b, &h)| {
                if h <= physics.flotation_thickness(b) {
                    delta * h
                } else {
                    b + h
                }
            })
            .collect()
    }
}

fn check_len(name: &str, field: &Array1<f64>, expected: usize) -> IceResult<()> {
    if field.len() != expected {
        return Err(IceError::FieldMismatch {
            name: name.to_string(),
            expected,
            got: field.len(),
        });
    }
    Ok(())
}

/// Nodal velocity stored interleaved: `[u_0, v_0, u_1, v_1, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityField {
    pub values: Array1<f64>,
}

impl VelocityField {
    pub fn zeros(n_vertices: usize) -> Self {
        VelocityField {
            values: Array1::zeros(2 * n_vertices),
        }
    }

    pub fn from_components(u: &Array1<f64>, v: &Array1<f64>) -> Self {
        let mut values = Array1::zeros(2 * u.len());
        for i in 0..u.len() {
            values[2 * i] = u[i];
            values[2 * i + 1] = v[i];
        }
        VelocityField { values }
    }

    pub fn n_vertices(&self) -> usize {
        self.values.len() / 2
    }

    pub fn u(&self, vertex: usize) -> f64 {
        self.values[2 * vertex]
    }

    pub fn v(&self, vertex: usize) -> f64 {
        self.values[2 * vertex + 1]
    }

    /// Split into `(u, v)` component fields.
    pub fn components(&self) -> (Array1<f64>, Array1<f64>) {
        let n = self.n_vertices();
        let u = (0..n).map(|i| self.u(i)).collect();
        let v = (0..n).map(|i| self.v(i)).collect();
        (u, v)
    }

    pub fn speed(&self) -> Array1<f64> {
        (0..self.n_vertices())
            .map(|i| self.u(i).hypot(self.v(i)))
            .collect()
    }

    pub fn max_speed(&self) -> f64 {
        self.speed().iter().cloned().fold(0.0, f64::max)
    }
}

/// Outcome of one nonlinear momentum solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub converged: bool,
    pub iterations: usize,
    /// Final residual 2-norm.
    pub residual: f64,
    pub initial_residual: f64,
    /// Inner Krylov iterations summed over all Newton steps.
    pub linear_iterations: usize,
    pub solve_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_fields_validate() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 3, 2);
        let fields = ModelFields::uniform(&mesh, &PhysicsParams::default(), -400.0, 500.0, 6.9);
        fields.validate(&mesh).unwrap();
        assert_eq!(fields.mask.len(), 12);
        assert!(fields.observations.is_none());
    }

    #[test]
    fn test_field_mismatch_is_reported() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 3, 2);
        let mut fields = ModelFields::uniform(&mesh, &PhysicsParams::default(), 0.0, 1.0, 0.0);
        fields.smb = Array1::zeros(3);
        match fields.validate(&mesh).unwrap_err() {
            IceError::FieldMismatch { name, expected, got } => {
                assert_eq!(name, "smb");
                assert_eq!(expected, 12);
                assert_eq!(got, 3);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_surface_switches_at_flotation() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 1, 1);
        let physics = PhysicsParams::default();
        let mut fields = ModelFields::uniform(&mesh, &physics, -500.0, 1000.0, 0.0);
        fields.thickness[1] = 300.0;
        let s = fields.surface(&physics);
        assert!((s[0] - 500.0).abs() < 1e-9);
        assert!((s[1] - physics.density_contrast() * 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_components() {
        let u = Array1::from(vec![1.0, 2.0, 3.0]);
        let v = Array1::from(vec![-1.0, 0.0, 4.0]);
        let vel = VelocityField::from_components(&u, &v);
        assert_eq!(vel.values.len(), 6);
        assert_eq!(vel.u(2), 3.0);
        assert_eq!(vel.v(0), -1.0);
        let (u2, v2) = vel.components();
        assert_eq!(u2, u);
        assert_eq!(v2, v);
        assert!((vel.max_speed() - 5.0).abs() < 1e-12);
    }
}
