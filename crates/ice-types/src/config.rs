// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::constants::{
    GLEN_A, GLEN_N, GRAVITY, ICE_MASK_TOL, MARGIN_PROBE_TOL, RHO_ICE, RHO_SEAWATER,
    STRAIN_RATE_FLOOR,
};
use crate::error::{IceError, IceResult};
use crate::mesh::{DomainSide, TriMesh};

/// Top-level run configuration.
///
/// Only `name` and `domain` are mandatory in JSON; every other section
/// falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub domain: DomainConfig,
    #[serde(default)]
    pub physics: PhysicsParams,
    #[serde(default)]
    pub momentum: MomentumConfig,
    #[serde(default)]
    pub solver: NewtonConfig,
    #[serde(default)]
    pub inversion: InversionConfig,
    #[serde(default)]
    pub prior: PriorConfig,
}

/// Rectangular model domain and its structured triangulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Number of rectangles along x (each split into two triangles).
    pub nx: usize,
    /// Number of rectangles along y.
    pub ny: usize,
    /// Domain sides where ice meets the ocean. All other sides are
    /// lateral no-flow walls.
    #[serde(default)]
    pub calving_sides: Vec<DomainSide>,
}

/// Physical constants of the ice/ocean system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    #[serde(default = "default_rho_ice")]
    pub rho_ice: f64,
    #[serde(default = "default_rho_water")]
    pub rho_water: f64,
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    #[serde(default = "default_glen_n")]
    pub glen_n: f64,
    /// Glen rate factor in yr^-1 Pa^-n.
    #[serde(default = "default_glen_a")]
    pub glen_a: f64,
    /// Strain-rate floor in the effective strain rate.
    #[serde(default = "default_eps_rp")]
    pub eps_rp: f64,
    #[serde(default = "default_ice_mask_tol")]
    pub ice_mask_tol: f64,
    #[serde(default = "default_margin_probe_tol")]
    pub margin_probe_tol: f64,
}

fn default_rho_ice() -> f64 {
    RHO_ICE
}
fn default_rho_water() -> f64 {
    RHO_SEAWATER
}
fn default_gravity() -> f64 {
    GRAVITY
}
fn default_glen_n() -> f64 {
    GLEN_N
}
fn default_glen_a() -> f64 {
    GLEN_A
}
fn default_eps_rp() -> f64 {
    STRAIN_RATE_FLOOR
}
fn default_ice_mask_tol() -> f64 {
    ICE_MASK_TOL
}
fn default_margin_probe_tol() -> f64 {
    MARGIN_PROBE_TOL
}

impl Default for PhysicsParams {
    fn default() -> Self {
        PhysicsParams {
            rho_ice: default_rho_ice(),
            rho_water: default_rho_water(),
            gravity: default_gravity(),
            glen_n: default_glen_n(),
            glen_a: default_glen_a(),
            eps_rp: default_eps_rp(),
            ice_mask_tol: default_ice_mask_tol(),
            margin_probe_tol: default_margin_probe_tol(),
        }
    }
}

impl PhysicsParams {
    /// Ice stiffness `B = A^(-1/n)`.
    pub fn stiffness(&self) -> f64 {
        self.glen_a.powf(-1.0 / self.glen_n)
    }

    /// `ln(B)`, the default value of the stiffness control field.
    pub fn log_stiffness(&self) -> f64 {
        self.stiffness().ln()
    }

    /// Thickness at which ice of the given bed elevation floats,
    /// `-(rho_water / rho_ice) * bed` (negative above sea level).
    pub fn flotation_thickness(&self, bed: f64) -> f64 {
        -(self.rho_water / self.rho_ice) * bed
    }

    /// Relative density contrast `1 - rho_ice / rho_water`.
    pub fn density_contrast(&self) -> f64 {
        1.0 - self.rho_ice / self.rho_water
    }

    pub fn rho_g(&self) -> f64 {
        self.rho_ice * self.gravity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// "action" or "weak". Any other value falls back to "weak".
    #[serde(default = "default_formulation")]
    pub formulation: String,
}

fn default_formulation() -> String {
    "weak".to_string()
}

impl Default for MomentumConfig {
    fn default() -> Self {
        MomentumConfig {
            formulation: default_formulation(),
        }
    }
}

/// Krylov method for the linear systems inside Newton and the adjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearMethod {
    #[default]
    Cg,
    Gmres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverConfig {
    #[serde(default)]
    pub method: LinearMethod,
    #[serde(default = "default_linear_rtol")]
    pub relative_tolerance: f64,
    #[serde(default = "default_linear_atol")]
    pub absolute_tolerance: f64,
    #[serde(default = "default_linear_max_iter")]
    pub max_iterations: usize,
    /// SSOR relaxation factor of the preconditioner.
    #[serde(default = "default_ssor_omega")]
    pub ssor_omega: f64,
    /// GMRES restart length.
    #[serde(default = "default_gmres_restart")]
    pub gmres_restart: usize,
}

fn default_linear_rtol() -> f64 {
    1e-10
}
fn default_linear_atol() -> f64 {
    1e-30
}
fn default_linear_max_iter() -> usize {
    5000
}
fn default_ssor_omega() -> f64 {
    1.0
}
fn default_gmres_restart() -> usize {
    50
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        LinearSolverConfig {
            method: LinearMethod::default(),
            relative_tolerance: default_linear_rtol(),
            absolute_tolerance: default_linear_atol(),
            max_iterations: default_linear_max_iter(),
            ssor_omega: default_ssor_omega(),
            gmres_restart: default_gmres_restart(),
        }
    }
}

/// Newton iteration settings for the momentum balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewtonConfig {
    #[serde(default = "default_newton_max_iter")]
    pub max_iterations: usize,
    /// Converged when `||R|| <= absolute_tolerance`.
    #[serde(default = "default_newton_atol")]
    pub absolute_tolerance: f64,
    /// Converged when `||R|| <= relative_tolerance * ||R_0||`.
    #[serde(default = "default_newton_rtol")]
    pub relative_tolerance: f64,
    /// Converged when `||dU||_inf <= increment_tolerance * max(1, ||U||_inf)`.
    #[serde(default = "default_increment_tol")]
    pub increment_tolerance: f64,
    #[serde(default = "default_relaxation")]
    pub relaxation: f64,
    /// Backtrack on the action functional when a full step does not
    /// decrease it.
    #[serde(default = "default_true")]
    pub line_search: bool,
    #[serde(default = "default_max_backtracks")]
    pub max_backtracks: usize,
    #[serde(default = "default_true")]
    pub error_on_nonconvergence: bool,
    /// Range of the uniform random initial guess per degree of freedom.
    #[serde(default = "default_initial_guess_range")]
    pub initial_guess_range: [f64; 2],
    #[serde(default)]
    pub linear: LinearSolverConfig,
}

fn default_newton_max_iter() -> usize {
    60
}
fn default_newton_atol() -> f64 {
    1e-8
}
fn default_newton_rtol() -> f64 {
    1e-9
}
fn default_increment_tol() -> f64 {
    1e-9
}
fn default_relaxation() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_max_backtracks() -> usize {
    30
}
fn default_initial_guess_range() -> [f64; 2] {
    [1.0, 10.0]
}

impl Default for NewtonConfig {
    fn default() -> Self {
        NewtonConfig {
            max_iterations: default_newton_max_iter(),
            absolute_tolerance: default_newton_atol(),
            relative_tolerance: default_newton_rtol(),
            increment_tolerance: default_increment_tol(),
            relaxation: default_relaxation(),
            line_search: true,
            max_backtracks: default_max_backtracks(),
            error_on_nonconvergence: true,
            initial_guess_range: default_initial_guess_range(),
            linear: LinearSolverConfig::default(),
        }
    }
}

/// Which log-parameter fields the inversion optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSelection {
    #[default]
    Alpha,
    Beta,
    AlphaBeta,
}

/// How a two-control inversion walks the control set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionStrategy {
    /// One optimization over all selected controls.
    #[default]
    Joint,
    /// Optimize one control at a time, cycling `passes` times.
    Alternating { passes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationKind {
    /// `gamma * |grad exp(c)|^2` over grounded ice.
    #[default]
    Gradient,
    /// `0.5 (c - c_bg)^T A M^-1 A (c - c_bg)` with the Laplacian prior.
    Prior,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionConfig {
    #[serde(default)]
    pub controls: ControlSelection,
    #[serde(default)]
    pub strategy: InversionStrategy,
    #[serde(default)]
    pub regularization: RegularizationKind,
    #[serde(default = "default_gamma")]
    pub gamma_alpha: f64,
    #[serde(default = "default_gamma")]
    pub gamma_beta: f64,
    /// Mass weight of the prior regularization (ignored for `gradient`).
    #[serde(default = "default_delta")]
    pub delta_alpha: f64,
    #[serde(default = "default_delta")]
    pub delta_beta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_bounds: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta_bounds: Option<[f64; 2]>,
    #[serde(default = "default_inv_max_iter")]
    pub max_iterations: usize,
    #[serde(default = "default_ftol")]
    pub ftol: f64,
    #[serde(default = "default_gtol")]
    pub gtol: f64,
    /// L-BFGS memory length.
    #[serde(default = "default_memory")]
    pub memory: usize,
}

fn default_gamma() -> f64 {
    1.0
}
fn default_delta() -> f64 {
    1e-10
}
fn default_inv_max_iter() -> usize {
    50
}
fn default_ftol() -> f64 {
    1e-9
}
fn default_gtol() -> f64 {
    1e-8
}
fn default_memory() -> usize {
    10
}

impl Default for InversionConfig {
    fn default() -> Self {
        InversionConfig {
            controls: ControlSelection::default(),
            strategy: InversionStrategy::default(),
            regularization: RegularizationKind::default(),
            gamma_alpha: default_gamma(),
            gamma_beta: default_gamma(),
            delta_alpha: default_delta(),
            delta_beta: default_delta(),
            alpha_bounds: None,
            beta_bounds: None,
            max_iterations: default_inv_max_iter(),
            ftol: default_ftol(),
            gtol: default_gtol(),
            memory: default_memory(),
        }
    }
}

/// Laplacian prior `A = delta M + gamma N` used for sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorConfig {
    #[serde(default = "default_prior_delta")]
    pub delta: f64,
    #[serde(default = "default_prior_gamma")]
    pub gamma: f64,
    #[serde(default = "default_mass_atol")]
    pub mass_atol: f64,
    #[serde(default = "default_mass_rtol")]
    pub mass_rtol: f64,
    #[serde(default = "default_precision_atol")]
    pub precision_atol: f64,
    #[serde(default = "default_precision_rtol")]
    pub precision_rtol: f64,
    #[serde(default = "default_prior_max_iter")]
    pub max_iterations: usize,
    /// Termination tolerance of the square-root series.
    #[serde(default = "default_sqrt_tol")]
    pub sqrt_tol: f64,
    #[serde(default = "default_sqrt_max_terms")]
    pub sqrt_max_terms: usize,
}

fn default_prior_delta() -> f64 {
    1.0
}
fn default_prior_gamma() -> f64 {
    1.0
}
fn default_mass_atol() -> f64 {
    1e-32
}
fn default_mass_rtol() -> f64 {
    1e-14
}
fn default_precision_atol() -> f64 {
    1e-32
}
fn default_precision_rtol() -> f64 {
    1e-12
}
fn default_prior_max_iter() -> usize {
    10_000
}
fn default_sqrt_tol() -> f64 {
    1e-16
}
fn default_sqrt_max_terms() -> usize {
    100_000
}

impl Default for PriorConfig {
    fn default() -> Self {
        PriorConfig {
            delta: default_prior_delta(),
            gamma: default_prior_gamma(),
            mass_atol: default_mass_atol(),
            mass_rtol: default_mass_rtol(),
            precision_atol: default_precision_atol(),
            precision_rtol: default_precision_rtol(),
            max_iterations: default_prior_max_iter(),
            sqrt_tol: default_sqrt_tol(),
            sqrt_max_terms: default_sqrt_max_terms(),
        }
    }
}

impl ModelConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: &str) -> IceResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the structured triangulation described by `domain`.
    pub fn create_mesh(&self) -> TriMesh {
        let d = &self.domain;
        TriMesh::rectangle(d.x_min, d.x_max, d.y_min, d.y_max, d.nx, d.ny)
    }

    pub fn validate(&self) -> IceResult<()> {
        let d = &self.domain;
        if d.nx == 0 || d.ny == 0 {
            return Err(IceError::ConfigError(
                "domain.nx and domain.ny must be >= 1".to_string(),
            ));
        }
        if !(d.x_max > d.x_min) || !(d.y_max > d.y_min) {
            return Err(IceError::ConfigError(format!(
                "domain extent must be positive, got x=[{}, {}] y=[{}, {}]",
                d.x_min, d.x_max, d.y_min, d.y_max
            )));
        }

        let p = &self.physics;
        for (name, value) in [
            ("physics.rho_ice", p.rho_ice),
            ("physics.rho_water", p.rho_water),
            ("physics.gravity", p.gravity),
            ("physics.glen_n", p.glen_n),
            ("physics.glen_a", p.glen_a),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(IceError::ConfigError(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        if !p.eps_rp.is_finite() || p.eps_rp < 0.0 {
            return Err(IceError::ConfigError(format!(
                "physics.eps_rp must be finite and >= 0, got {}",
                p.eps_rp
            )));
        }
        if !p.margin_probe_tol.is_finite() || p.margin_probe_tol <= 0.0 {
            return Err(IceError::ConfigError(format!(
                "physics.margin_probe_tol must be finite and > 0, got {}",
                p.margin_probe_tol
            )));
        }

        let s = &self.solver;
        if s.max_iterations == 0 {
            return Err(IceError::ConfigError(
                "solver.max_iterations must be >= 1".to_string(),
            ));
        }
        if !s.relaxation.is_finite() || s.relaxation <= 0.0 || s.relaxation > 1.0 {
            return Err(IceError::ConfigError(format!(
                "solver.relaxation must be in (0, 1], got {}",
                s.relaxation
            )));
        }
        let [lo, hi] = s.initial_guess_range;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(IceError::ConfigError(format!(
                "solver.initial_guess_range must be an increasing finite pair, got [{lo}, {hi}]"
            )));
        }
        if s.linear.max_iterations == 0 {
            return Err(IceError::ConfigError(
                "solver.linear.max_iterations must be >= 1".to_string(),
            ));
        }
        if !(s.linear.ssor_omega > 0.0 && s.linear.ssor_omega < 2.0) {
            return Err(IceError::ConfigError(format!(
                "solver.linear.ssor_omega must be in (0, 2), got {}",
                s.linear.ssor_omega
            )));
        }

        let inv = &self.inversion;
        if inv.gamma_alpha < 0.0 || inv.gamma_beta < 0.0 {
            return Err(IceError::ConfigError(
                "inversion.gamma_alpha and inversion.gamma_beta must be >= 0".to_string(),
            ));
        }
        if inv.memory == 0 {
            return Err(IceError::ConfigError(
                "inversion.memory must be >= 1".to_string(),
            ));
        }
        if let InversionStrategy::Alternating { passes } = inv.strategy {
            if passes == 0 {
                return Err(IceError::ConfigError(
                    "inversion.strategy.alternating.passes must be >= 1".to_string(),
                ));
            }
        }
        for (name, bounds) in [
            ("inversion.alpha_bounds", inv.alpha_bounds),
            ("inversion.beta_bounds", inv.beta_bounds),
        ] {
            if let Some([lo, hi]) = bounds {
                if lo.is_nan() || hi.is_nan() || lo > hi {
                    return Err(IceError::ConfigError(format!(
                        "{name} must satisfy lower <= upper, got [{lo}, {hi}]"
                    )));
                }
            }
        }

        let pr = &self.prior;
        if pr.delta < 0.0 || pr.gamma < 0.0 || pr.delta + pr.gamma <= 0.0 {
            return Err(IceError::ConfigError(format!(
                "prior.delta and prior.gamma must be >= 0 and not both zero, got {} and {}",
                pr.delta, pr.gamma
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn demo_path(relative: &str) -> String {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("configs")
            .join(relative)
            .to_string_lossy()
            .to_string()
    }

    fn minimal_json() -> &'static str {
        r#"{
            "name": "slab",
            "domain": { "x_min": 0.0, "x_max": 10000.0, "y_min": 0.0, "y_max": 10000.0,
                        "nx": 4, "ny": 4 }
        }"#
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg: ModelConfig = serde_json::from_str(minimal_json()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.momentum.formulation, "weak");
        assert!((cfg.physics.rho_ice - 917.0).abs() < 1e-12);
        assert!((cfg.physics.glen_a - 3.5e-25 * 31_536_000.0).abs() < 1e-30);
        assert_eq!(cfg.solver.linear.method, LinearMethod::Cg);
        assert_eq!(cfg.inversion.controls, ControlSelection::Alpha);
        assert_eq!(cfg.inversion.strategy, InversionStrategy::Joint);
        assert!((cfg.prior.mass_atol - 1e-32).abs() < 1e-40);
        assert!(cfg.domain.calving_sides.is_empty());
    }

    #[test]
    fn test_enum_settings_parse() {
        let json = r#"{
            "name": "shelf",
            "domain": { "x_min": 0.0, "x_max": 1.0, "y_min": 0.0, "y_max": 1.0,
                        "nx": 2, "ny": 2, "calving_sides": ["east"] },
            "solver": { "linear": { "method": "gmres" } },
            "inversion": { "controls": "alpha_beta",
                           "strategy": { "alternating": { "passes": 3 } },
                           "regularization": "prior" }
        }"#;
        let cfg: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.domain.calving_sides, vec![DomainSide::East]);
        assert_eq!(cfg.solver.linear.method, LinearMethod::Gmres);
        assert_eq!(cfg.inversion.controls, ControlSelection::AlphaBeta);
        assert_eq!(
            cfg.inversion.strategy,
            InversionStrategy::Alternating { passes: 3 }
        );
        assert_eq!(cfg.inversion.regularization, RegularizationKind::Prior);
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg: ModelConfig = serde_json::from_str(minimal_json()).unwrap();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: ModelConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.domain.nx, 4);
        assert_eq!(back.physics, cfg.physics);
    }

    #[test]
    fn test_validate_rejects_bad_relaxation() {
        let mut cfg: ModelConfig = serde_json::from_str(minimal_json()).unwrap();
        cfg.solver.relaxation = 1.5;
        let err = cfg.validate().unwrap_err();
        match err {
            IceError::ConfigError(msg) => assert!(msg.contains("relaxation")),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut cfg: ModelConfig = serde_json::from_str(minimal_json()).unwrap();
        cfg.inversion.alpha_bounds = Some([5.0, -5.0]);
        let err = cfg.validate().unwrap_err();
        match err {
            IceError::ConfigError(msg) => assert!(msg.contains("alpha_bounds")),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_domain() {
        let mut cfg: ModelConfig = serde_json::from_str(minimal_json()).unwrap();
        cfg.domain.x_max = cfg.domain.x_min;
        assert!(cfg.validate().is_err());
        cfg.domain.x_max = 1.0;
        cfg.domain.nx = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_shipped_configs() {
        for relative in ["slab.json", "ice_stream.json", "shelf_channel.json"] {
            let path = demo_path(relative);
            let result = ModelConfig::from_file(&path);
            assert!(result.is_ok(), "Failed to load config {path}: {result:?}");
        }
    }

    #[test]
    fn test_physics_helpers() {
        let p = PhysicsParams::default();
        assert!((p.flotation_thickness(-100.0) - 100.0 * 1030.0 / 917.0).abs() < 1e-9);
        assert!((p.density_contrast() - (1.0 - 917.0 / 1030.0)).abs() < 1e-15);
        let b = p.stiffness();
        assert!((b.powf(-p.glen_n) - p.glen_a).abs() / p.glen_a < 1e-12);
    }
}
