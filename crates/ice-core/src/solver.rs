// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Nonlinear Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Damped Newton iteration for the momentum balance and the model that
//! owns the forward velocity.

use std::time::Instant;

use ice_math::cg::{pcg_solve, CgConfig};
use ice_math::gmres::{gmres_solve, GmresConfig};
use ice_math::sparse::CsrMatrix;
use ice_math::vector::{axpy, dot, norm2, norm_inf};
use ice_types::config::{LinearMethod, LinearSolverConfig, ModelConfig, NewtonConfig};
use ice_types::error::{IceError, IceResult};
use ice_types::mesh::TriMesh;
use ice_types::state::{ModelFields, SolveReport, VelocityField};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{dirichlet_dofs, CellRegion, DirichletSet, DomainLabels};
use crate::momentum::{Formulation, MomentumEquation};

/// Sufficient-decrease constant of the backtracking line search.
const ARMIJO: f64 = 1e-4;

/// Relative rounding allowance on the energy when comparing actions.
const MERIT_ROUNDOFF: f64 = 1e-12;

/// Outcome of a momentum solve.
pub type NewtonReport = SolveReport;

/// Outcome of one inner Krylov solve.
#[derive(Debug, Clone, Copy)]
pub struct LinearOutcome {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Solve `K x = b` with the configured Krylov method. `x` holds the
/// initial guess on entry.
pub fn solve_linear(
    k: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    config: &LinearSolverConfig,
) -> IceResult<LinearOutcome> {
    match config.method {
        LinearMethod::Cg => {
            let cfg = CgConfig {
                rtol: config.relative_tolerance,
                atol: config.absolute_tolerance,
                max_iter: config.max_iterations,
                omega: config.ssor_omega,
            };
            let res = pcg_solve(k, b, x, &cfg)?;
            Ok(LinearOutcome {
                iterations: res.iterations,
                residual: res.residual,
                converged: res.converged,
            })
        }
        LinearMethod::Gmres => {
            let restart = config.gmres_restart.max(1);
            let cfg = GmresConfig {
                restart,
                max_iter: ((config.max_iterations + restart - 1) / restart).max(1),
                rtol: config.relative_tolerance,
                atol: config.absolute_tolerance,
                precond_omega: config.ssor_omega,
            };
            let res = gmres_solve(k, b, x, &cfg)?;
            Ok(LinearOutcome {
                iterations: res.iterations,
                residual: res.residual,
                converged: res.converged,
            })
        }
    }
}

fn constrained_residual(eq: &MomentumEquation, bcs: &DirichletSet, u: &[f64]) -> Vec<f64> {
    let mut r = eq.residual(u);
    bcs.apply_zero(&mut r);
    r
}

/// Draw a uniform initial guess in `range` for every free dof.
pub fn initial_guess<R: Rng + ?Sized>(rng: &mut R, bcs: &DirichletSet, range: [f64; 2]) -> Vec<f64> {
    bcs.constrained
        .iter()
        .map(|&fixed| {
            if fixed {
                0.0
            } else {
                rng.gen_range(range[0]..=range[1])
            }
        })
        .collect()
}

/// Newton iteration on `R(U) = 0` from the velocity in `u`.
///
/// Each step solves `K dU = −R` with Dirichlet rows and columns replaced
/// by identity, then backtracks on the action until it decreases
/// sufficiently. Converged when the residual norm falls below
/// `max(atol, rtol · ||R_0||)` or a full step changes `U` by less than
/// `increment_tolerance` relative to `max(1, ||U||_∞)`.
pub fn newton_solve(
    eq: &MomentumEquation,
    bcs: &DirichletSet,
    u: &mut [f64],
    config: &NewtonConfig,
) -> IceResult<NewtonReport> {
    let start = Instant::now();
    bcs.apply_zero(u);

    let mut r = constrained_residual(eq, bcs, u);
    let initial_residual = norm2(&r);
    if !initial_residual.is_finite() {
        return Err(IceError::ConvergenceFailure {
            iterations: 0,
            residual: initial_residual,
        });
    }
    let tol = config
        .absolute_tolerance
        .max(config.relative_tolerance * initial_residual);
    let mut residual = initial_residual;
    let mut linear_iterations = 0;
    let mut iterations = 0;
    let mut converged = residual <= tol;

    let mut du = vec![0.0; u.len()];
    let mut trial = vec![0.0; u.len()];

    while !converged && iterations < config.max_iterations {
        iterations += 1;

        let mut k = eq.jacobian(u);
        k.constrain(&bcs.constrained);
        let rhs: Vec<f64> = r.iter().map(|v| -v).collect();
        du.iter_mut().for_each(|v| *v = 0.0);
        let lin = solve_linear(&k, &rhs, &mut du, &config.linear)?;
        linear_iterations += lin.iterations;
        if !lin.converged {
            tracing::debug!(
                iteration = iterations,
                linear_residual = lin.residual,
                "inner linear solve stopped early"
            );
        }

        let slope = dot(&r, &du);
        let mut t = config.relaxation;
        if config.line_search && slope < 0.0 {
            // Action change split as energy change plus the exact linear work
            let energy = eq.energy(u);
            let work_rate = dot(eq.load(), &du);
            let allowance = MERIT_ROUNDOFF * energy.abs();
            let mut accepted = false;
            for _ in 0..=config.max_backtracks {
                for ((ti, ui), di) in trial.iter_mut().zip(u.iter()).zip(&du) {
                    *ti = ui + t * di;
                }
                let change = eq.energy(&trial) - energy + t * work_rate;
                if change.is_finite() && change <= ARMIJO * t * slope + allowance {
                    accepted = true;
                    break;
                }
                t *= 0.5;
            }
            if !accepted {
                t *= 2.0;
                tracing::debug!(iteration = iterations, step = t, "line search exhausted");
            }
        }

        axpy(t, &du, u);
        r = constrained_residual(eq, bcs, u);
        residual = norm2(&r);
        let increment = t * norm_inf(&du);

        tracing::debug!(
            iteration = iterations,
            residual,
            step = t,
            increment,
            linear_iterations = lin.iterations,
            "Newton iteration"
        );

        if !residual.is_finite() {
            return Err(IceError::ConvergenceFailure {
                iterations,
                residual,
            });
        }
        let full_step = t >= config.relaxation;
        converged = residual <= tol
            || (full_step && increment <= config.increment_tolerance * norm_inf(u).max(1.0));
    }

    let report = NewtonReport {
        converged,
        iterations,
        residual,
        initial_residual,
        linear_iterations,
        solve_time_ms: start.elapsed().as_secs_f64() * 1000.0,
    };

    if !converged {
        if config.error_on_nonconvergence {
            return Err(IceError::ConvergenceFailure {
                iterations,
                residual,
            });
        }
        tracing::warn!(iterations, residual, "Newton solve did not converge");
    }
    Ok(report)
}

/// The forward model: labelled domain, boundary conditions, momentum
/// equation and the current velocity.
pub struct SsaSolver<'m> {
    mesh: &'m TriMesh,
    config: ModelConfig,
    fields: ModelFields,
    labels: DomainLabels,
    bcs: DirichletSet,
    equation: MomentumEquation<'m>,
    velocity: Option<Vec<f64>>,
    last_report: Option<NewtonReport>,
}

impl<'m> SsaSolver<'m> {
    pub fn new(mesh: &'m TriMesh, fields: &ModelFields, config: &ModelConfig) -> IceResult<Self> {
        config.validate()?;
        fields.validate(mesh)?;

        let physics = &config.physics;
        let labels = DomainLabels::classify(mesh, fields, physics, &config.domain.calving_sides);
        let bcs = dirichlet_dofs(mesh, &labels, &fields.mask, physics.margin_probe_tol);
        let formulation = Formulation::from_name(&config.momentum.formulation);
        let equation = MomentumEquation::new(mesh, &labels, fields, physics, formulation)?;

        tracing::info!(
            model = %config.name,
            grounded = labels.count(CellRegion::GroundedIce) + labels.count(CellRegion::GroundedIceObserved),
            floating = labels.count(CellRegion::FloatingIce) + labels.count(CellRegion::FloatingIceObserved),
            no_ice = labels.count(CellRegion::NoIce),
            constrained_dofs = bcs.n_constrained(),
            "domain labelled"
        );

        Ok(SsaSolver {
            mesh,
            config: config.clone(),
            fields: fields.clone(),
            labels,
            bcs,
            equation,
            velocity: None,
            last_report: None,
        })
    }

    pub fn mesh(&self) -> &'m TriMesh {
        self.mesh
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn fields(&self) -> &ModelFields {
        &self.fields
    }

    pub fn labels(&self) -> &DomainLabels {
        &self.labels
    }

    pub fn dirichlet(&self) -> &DirichletSet {
        &self.bcs
    }

    pub fn equation(&self) -> &MomentumEquation<'m> {
        &self.equation
    }

    pub fn last_report(&self) -> Option<&NewtonReport> {
        self.last_report.as_ref()
    }

    /// Current velocity dofs, if a solve has run.
    pub fn velocity(&self) -> Option<&[f64]> {
        self.velocity.as_deref()
    }

    pub fn velocity_field(&self) -> Option<VelocityField> {
        self.velocity.as_ref().map(|u| VelocityField {
            values: Array1::from(u.clone()),
        })
    }

    /// Replace the drag and stiffness fields.
    pub fn set_controls(&mut self, alpha: &[f64], beta: &[f64]) -> IceResult<()> {
        self.equation.set_controls(alpha, beta)?;
        self.fields.alpha = Array1::from(alpha.to_vec());
        self.fields.beta = Array1::from(beta.to_vec());
        Ok(())
    }

    /// Solve the momentum balance. The first solve starts from a random
    /// guess seeded from system entropy; later solves start from the
    /// previous velocity.
    pub fn solve_forward(&mut self) -> IceResult<NewtonReport> {
        let mut rng = StdRng::from_entropy();
        self.solve_forward_with_rng(&mut rng)
    }

    /// As [`Self::solve_forward`] with a caller-supplied generator for the
    /// initial guess.
    pub fn solve_forward_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) -> IceResult<NewtonReport> {
        // A failed solve leaves the previous velocity in place
        let mut u = match &self.velocity {
            Some(u) => u.clone(),
            None => initial_guess(rng, &self.bcs, self.config.solver.initial_guess_range),
        };
        let report = newton_solve(&self.equation, &self.bcs, &mut u, &self.config.solver)?;

        let speed_max = u
            .chunks_exact(2)
            .map(|c| c[0].hypot(c[1]))
            .fold(0.0, f64::max);
        let (nu_min, nu_max) = self
            .equation
            .viscosity(&u)
            .into_iter()
            .filter(|&nu| nu > 0.0)
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), nu| (lo.min(nu), hi.max(nu)));
        tracing::info!(
            iterations = report.iterations,
            residual = report.residual,
            converged = report.converged,
            max_speed = speed_max,
            nu_min,
            nu_max,
            time_ms = report.solve_time_ms,
            "forward solve finished"
        );

        self.velocity = Some(u);
        self.last_report = Some(report.clone());
        Ok(report)
    }
}

/// Solve the forward problem once, seeding the initial guess from system
/// entropy.
pub fn solve(
    mesh: &TriMesh,
    fields: &ModelFields,
    config: &ModelConfig,
) -> IceResult<(VelocityField, NewtonReport)> {
    let mut rng = StdRng::from_entropy();
    solve_with_rng(mesh, fields, config, &mut rng)
}

pub fn solve_with_rng<R: Rng + ?Sized>(
    mesh: &TriMesh,
    fields: &ModelFields,
    config: &ModelConfig,
    rng: &mut R,
) -> IceResult<(VelocityField, NewtonReport)> {
    let mut model = SsaSolver::new(mesh, fields, config)?;
    let report = model.solve_forward_with_rng(rng)?;
    let velocity = model
        .velocity_field()
        .unwrap_or_else(|| VelocityField::zeros(mesh.n_vertices()));
    Ok((velocity, report))
}
