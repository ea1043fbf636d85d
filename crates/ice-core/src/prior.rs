// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Laplacian Prior
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Gaussian prior with precision `A M⁻¹ A`, `A = δM + γN`.
//!
//! `M` is the consistent P1 mass matrix and `N` the P1 stiffness matrix
//! over the whole mesh. Samples are drawn as `A⁻¹ M^½ z` with white
//! noise `z`, whose covariance is `A⁻¹ M A⁻¹`.

use ice_math::cg::{pcg_solve, CgConfig};
use ice_math::sparse::{CsrMatrix, SparsityPattern};
use ice_math::sqrt_series::sqrt_action;
use ice_types::config::PriorConfig;
use ice_types::error::{IceError, IceResult};
use ice_types::mesh::TriMesh;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Assemble the P1 mass and stiffness matrices.
pub fn assemble_mass_stiffness(mesh: &TriMesh) -> (CsrMatrix, CsrMatrix) {
    let rows: Vec<Vec<usize>> = (0..mesh.n_vertices())
        .map(|v| mesh.vertex_neighbors(v).to_vec())
        .collect();
    let pattern = SparsityPattern::from_rows(rows);
    let mut mass = CsrMatrix::zeros(pattern.clone());
    let mut stiffness = CsrMatrix::zeros(pattern);

    for c in 0..mesh.n_cells() {
        let verts = mesh.cell(c);
        let grad = mesh.gradients(c);
        let area = mesh.cell_area(c);
        for (i, &vi) in verts.iter().enumerate() {
            for (j, &vj) in verts.iter().enumerate() {
                let m = if i == j { area / 6.0 } else { area / 12.0 };
                mass.add(vi, vj, m);
                stiffness.add(vi, vj, area * (grad[i][0] * grad[j][0] + grad[i][1] * grad[j][1]));
            }
        }
    }
    (mass, stiffness)
}

/// Laplacian-type prior operator on a mesh.
#[derive(Debug, Clone)]
pub struct Laplacian {
    mass: CsrMatrix,
    stiffness: CsrMatrix,
    precision: CsrMatrix,
    delta: f64,
    gamma: f64,
    config: PriorConfig,
}

impl Laplacian {
    pub fn new(mesh: &TriMesh, delta: f64, gamma: f64, config: &PriorConfig) -> IceResult<Self> {
        if !(delta >= 0.0 && gamma >= 0.0) || delta + gamma == 0.0 {
            return Err(IceError::ConfigError(format!(
                "prior needs delta, gamma >= 0 not both zero, got delta={delta} gamma={gamma}"
            )));
        }
        let (mass, stiffness) = assemble_mass_stiffness(mesh);
        let precision = mass.linear_combination(delta, &stiffness, gamma)?;
        tracing::debug!(n = mass.n(), nnz = mass.nnz(), delta, gamma, "prior operator assembled");
        Ok(Laplacian {
            mass,
            stiffness,
            precision,
            delta,
            gamma,
            config: config.clone(),
        })
    }

    pub fn n(&self) -> usize {
        self.mass.n()
    }

    pub fn mass(&self) -> &CsrMatrix {
        &self.mass
    }

    pub fn stiffness(&self) -> &CsrMatrix {
        &self.stiffness
    }

    /// `A = δM + γN`.
    pub fn precision(&self) -> &CsrMatrix {
        &self.precision
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn check_len(&self, x: &[f64]) -> IceResult<()> {
        if x.len() != self.n() {
            return Err(IceError::FieldMismatch {
                name: "prior vector".to_string(),
                expected: self.n(),
                got: x.len(),
            });
        }
        Ok(())
    }

    fn solve(&self, matrix: &CsrMatrix, b: &[f64], rtol: f64, atol: f64, what: &str) -> IceResult<Vec<f64>> {
        let cfg = CgConfig {
            rtol,
            atol,
            max_iter: self.config.max_iterations,
            omega: 1.0,
        };
        let mut x = vec![0.0; b.len()];
        let res = pcg_solve(matrix, b, &mut x, &cfg)?;
        if !res.converged {
            return Err(IceError::LinearSolveFailure {
                iterations: res.iterations,
                residual: res.residual,
                message: format!("{what} solve did not converge"),
            });
        }
        Ok(x)
    }

    fn solve_mass(&self, b: &[f64]) -> IceResult<Vec<f64>> {
        self.solve(&self.mass, b, self.config.mass_rtol, self.config.mass_atol, "mass")
    }

    fn solve_precision(&self, b: &[f64]) -> IceResult<Vec<f64>> {
        self.solve(
            &self.precision,
            b,
            self.config.precision_rtol,
            self.config.precision_atol,
            "precision",
        )
    }

    /// `A M⁻¹ A x`.
    pub fn action(&self, x: &[f64]) -> IceResult<Vec<f64>> {
        self.check_len(x)?;
        let ax = self.precision.apply(x);
        let y = self.solve_mass(&ax)?;
        Ok(self.precision.apply(&y))
    }

    /// `A⁻¹ M A⁻¹ x`, the covariance action.
    pub fn inv_action(&self, x: &[f64]) -> IceResult<Vec<f64>> {
        self.check_len(x)?;
        let y = self.solve_precision(x)?;
        let my = self.mass.apply(&y);
        self.solve_precision(&my)
    }

    /// Draw one sample, seeding a fresh generator from system entropy.
    pub fn sample(&self) -> IceResult<Vec<f64>> {
        let mut rng = StdRng::from_entropy();
        self.sample_with_rng(&mut rng)
    }

    /// Draw one sample `A⁻¹ M^½ z`, `z ~ N(0, I)`.
    pub fn sample_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> IceResult<Vec<f64>> {
        let z: Vec<f64> = (0..self.n()).map(|_| rng.sample(StandardNormal)).collect();
        let root = sqrt_action(
            &self.mass,
            &z,
            self.mass.inf_norm(),
            self.config.sqrt_tol,
            self.config.sqrt_max_terms,
        )?;
        self.solve_precision(&root.value)
    }
}

/// Build the prior operator `δM + γN` on `mesh`.
pub fn build_prior(mesh: &TriMesh, delta: f64, gamma: f64, config: &PriorConfig) -> IceResult<Laplacian> {
    Laplacian::new(mesh, delta, gamma, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ice_math::vector::{dot, norm2};

    fn prior(n: usize, delta: f64, gamma: f64) -> (TriMesh, Laplacian) {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, n, n);
        let lap = build_prior(&mesh, delta, gamma, &PriorConfig::default()).unwrap();
        (mesh, lap)
    }

    #[test]
    fn test_mass_integrates_area() {
        let (mesh, lap) = prior(4, 1.0, 1.0);
        let ones = vec![1.0; mesh.n_vertices()];
        let total = dot(&ones, &lap.mass().apply(&ones));
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stiffness_annihilates_constants() {
        let (mesh, lap) = prior(5, 1.0, 1.0);
        let ones = vec![3.0; mesh.n_vertices()];
        assert!(norm2(&lap.stiffness().apply(&ones)) < 1e-12);
        assert!(lap.stiffness().is_symmetric(1e-14));
    }

    #[test]
    fn test_inv_action_inverts_action() {
        let (mesh, lap) = prior(6, 1.0, 0.05);
        let x: Vec<f64> = mesh.nodal_from_fn(|x, y| (3.0 * x).sin() + y * y);
        let back = lap.inv_action(&lap.action(&x).unwrap()).unwrap();
        for (a, b) in x.iter().zip(&back) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_action_is_symmetric_positive() {
        let (mesh, lap) = prior(4, 2.0, 0.5);
        let x = mesh.nodal_from_fn(|x, y| x - 0.3 * y);
        let y = mesh.nodal_from_fn(|x, y| (x * y).cos());
        let xay = dot(&x, &lap.action(&y).unwrap());
        let yax = dot(&y, &lap.action(&x).unwrap());
        assert!((xay - yax).abs() < 1e-8 * xay.abs().max(1.0));
        assert!(dot(&x, &lap.action(&x).unwrap()) > 0.0);
    }

    #[test]
    fn test_rejects_bad_hyperparameters() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 2, 2);
        let cfg = PriorConfig::default();
        assert!(matches!(build_prior(&mesh, 0.0, 0.0, &cfg), Err(IceError::ConfigError(_))));
        assert!(matches!(build_prior(&mesh, -1.0, 1.0, &cfg), Err(IceError::ConfigError(_))));
    }

    #[test]
    fn test_length_mismatch() {
        let (_, lap) = prior(2, 1.0, 1.0);
        assert!(matches!(lap.action(&[1.0; 3]), Err(IceError::FieldMismatch { .. })));
    }

    #[test]
    fn test_sample_is_seeded() {
        let (_, lap) = prior(3, 1.0, 0.1);
        let a = lap.sample_with_rng(&mut StdRng::seed_from_u64(42)).unwrap();
        let b = lap.sample_with_rng(&mut StdRng::seed_from_u64(42)).unwrap();
        let c = lap.sample_with_rng(&mut StdRng::seed_from_u64(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_entropy_samples_differ() {
        let (_, lap) = prior(3, 1.0, 0.1);
        assert_ne!(lap.sample().unwrap(), lap.sample().unwrap());
    }

    #[test]
    fn test_sample_series_cap_is_fatal() {
        let mesh = TriMesh::rectangle(0.0, 1.0, 0.0, 1.0, 3, 3);
        let cfg = PriorConfig {
            sqrt_max_terms: 2,
            ..PriorConfig::default()
        };
        let lap = build_prior(&mesh, 1.0, 1.0, &cfg).unwrap();
        let err = lap.sample_with_rng(&mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, IceError::LinearSolveFailure { .. }));
    }
}
