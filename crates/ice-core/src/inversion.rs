// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Inversion Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Recover drag and stiffness log-parameter fields from surface velocity
//! observations by bound-constrained L-BFGS on the adjoint functional.

use std::time::Instant;

use ice_math::lbfgs::{minimize_bounded, LbfgsConfig, LbfgsResult, StopReason};
use ice_types::config::{InversionConfig, InversionStrategy, ModelConfig};
use ice_types::error::{IceError, IceResult};
use ice_types::mesh::TriMesh;
use ice_types::state::{ModelFields, VelocityField};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adjoint::{Control, CostBreakdown, ReducedFunctional, SsaReducedFunctional};
use crate::solver::{NewtonReport, SsaSolver};

/// Output of an inversion run.
#[derive(Debug, Clone)]
pub struct InversionResult {
    pub alpha: Array1<f64>,
    pub beta: Array1<f64>,
    /// Forward velocity at the optimum.
    pub velocity: VelocityField,
    /// Functional value at every gradient evaluation, in call order.
    pub trace: Vec<f64>,
    /// Functional value at the start and at every accepted iterate.
    pub iterate_trace: Vec<f64>,
    pub stop: StopReason,
    pub iterations: usize,
    pub breakdown: CostBreakdown,
    pub forward_report: NewtonReport,
    pub elapsed_ms: f64,
}

/// Runs the optimizer over a [`SsaReducedFunctional`].
pub struct InversionEngine<'m> {
    functional: SsaReducedFunctional<'m>,
    config: InversionConfig,
    trace: Vec<f64>,
    iterate_trace: Vec<f64>,
}

fn bounds_for(control: Control, config: &InversionConfig, n: usize) -> Vec<(f64, f64)> {
    let b = match control {
        Control::Alpha => config.alpha_bounds,
        Control::Beta => config.beta_bounds,
    };
    let pair = b
        .map(|[lo, hi]| (lo, hi))
        .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
    vec![pair; n]
}

/// Forward-model failures at trial points read as an infinite value,
/// which the line search rejects. A failure at the starting point is
/// still an error.
fn reject_failed_trials<F>(mut objective: F) -> impl FnMut(&[f64]) -> IceResult<(f64, Vec<f64>)>
where
    F: FnMut(&[f64]) -> IceResult<(f64, Vec<f64>)>,
{
    let mut first = true;
    move |x: &[f64]| {
        let initial = std::mem::replace(&mut first, false);
        match objective(x) {
            Err(IceError::ConvergenceFailure {
                iterations,
                residual,
            }) if !initial => {
                tracing::warn!(
                    iterations,
                    residual,
                    "forward solve failed at trial controls, step rejected"
                );
                Ok((f64::INFINITY, vec![0.0; x.len()]))
            }
            other => other,
        }
    }
}

fn lbfgs_config(config: &InversionConfig) -> LbfgsConfig {
    LbfgsConfig {
        memory: config.memory,
        max_iterations: config.max_iterations,
        ftol: config.ftol,
        gtol: config.gtol,
        ..LbfgsConfig::default()
    }
}

impl<'m> InversionEngine<'m> {
    /// Build the engine, seeding the initial forward guess from system
    /// entropy.
    pub fn new(mesh: &'m TriMesh, fields: &ModelFields, config: &ModelConfig) -> IceResult<Self> {
        let mut rng = StdRng::from_entropy();
        Self::with_rng(mesh, fields, config, &mut rng)
    }

    pub fn with_rng<R: Rng + ?Sized>(
        mesh: &'m TriMesh,
        fields: &ModelFields,
        config: &ModelConfig,
        rng: &mut R,
    ) -> IceResult<Self> {
        let model = SsaSolver::new(mesh, fields, config)?;
        let functional = SsaReducedFunctional::new(model, rng)?;
        Ok(InversionEngine {
            functional,
            config: config.inversion.clone(),
            trace: Vec::new(),
            iterate_trace: Vec::new(),
        })
    }

    pub fn functional(&self) -> &SsaReducedFunctional<'m> {
        &self.functional
    }

    pub fn trace(&self) -> &[f64] {
        &self.trace
    }

    /// Minimize over the control block `block`, or over all controls.
    fn minimize(&mut self, block: Option<usize>) -> IceResult<LbfgsResult> {
        let nv = self.functional.model().mesh().n_vertices();
        let controls = self.functional.controls().to_vec();
        let full = self.functional.current_controls();

        let (x0, bounds) = match block {
            Some(k) => (
                full[k * nv..(k + 1) * nv].to_vec(),
                bounds_for(controls[k], &self.config, nv),
            ),
            None => (
                full.clone(),
                controls
                    .iter()
                    .flat_map(|&c| bounds_for(c, &self.config, nv))
                    .collect(),
            ),
        };

        let functional = &mut self.functional;
        let trace = &mut self.trace;
        let objective = |x: &[f64]| -> IceResult<(f64, Vec<f64>)> {
            let (f, g) = match block {
                Some(k) => {
                    let mut point = full.clone();
                    point[k * nv..(k + 1) * nv].copy_from_slice(x);
                    let f = functional.evaluate(&point)?;
                    let g = functional.gradient()?;
                    (f, g[k * nv..(k + 1) * nv].to_vec())
                }
                None => {
                    let f = functional.evaluate(x)?;
                    (f, functional.gradient()?)
                }
            };
            trace.push(f);
            Ok((f, g))
        };

        let result = minimize_bounded(
            reject_failed_trials(objective),
            &x0,
            &bounds,
            &lbfgs_config(&self.config),
        )?;
        let skip = usize::from(!self.iterate_trace.is_empty());
        self.iterate_trace.extend(result.history.iter().skip(skip));

        // Leave the model at the accepted point
        let optimum = match block {
            Some(k) => {
                let mut point = full;
                point[k * nv..(k + 1) * nv].copy_from_slice(&result.x);
                point
            }
            None => result.x.clone(),
        };
        self.functional.evaluate(&optimum)?;
        Ok(result)
    }

    /// Run the configured strategy and re-solve the forward model at the
    /// optimum.
    pub fn run(&mut self) -> IceResult<InversionResult> {
        let start = Instant::now();
        let names: Vec<&str> = self.functional.controls().iter().map(|c| c.name()).collect();
        tracing::info!(controls = ?names, strategy = ?self.config.strategy, "inversion started");

        let (stop, iterations) = match self.config.strategy {
            InversionStrategy::Joint => {
                let res = self.minimize(None)?;
                (res.stop, res.iterations)
            }
            InversionStrategy::Alternating { passes } => {
                let mut stop = StopReason::Converged;
                let mut iterations = 0;
                for pass in 0..passes.max(1) {
                    for k in 0..self.functional.controls().len() {
                        let res = self.minimize(Some(k))?;
                        tracing::debug!(pass, block = k, iterations = res.iterations, stop = ?res.stop, "alternating block done");
                        iterations += res.iterations;
                        stop = res.stop;
                    }
                }
                (stop, iterations)
            }
        };

        let breakdown = self.functional.breakdown().unwrap_or_default();
        let model = self.functional.model();
        let forward_report = model.last_report().cloned().unwrap_or(NewtonReport {
            converged: false,
            iterations: 0,
            residual: f64::NAN,
            initial_residual: f64::NAN,
            linear_iterations: 0,
            solve_time_ms: 0.0,
        });
        let velocity = model
            .velocity_field()
            .unwrap_or_else(|| VelocityField::zeros(model.mesh().n_vertices()));
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            j = breakdown.total,
            j_misfit = breakdown.misfit,
            j_reg = breakdown.regularization,
            reg_to_misfit = breakdown.ratio(),
            iterations,
            evaluations = self.trace.len(),
            stop = ?stop,
            elapsed_ms,
            "inversion finished"
        );

        Ok(InversionResult {
            alpha: model.fields().alpha.clone(),
            beta: model.fields().beta.clone(),
            velocity,
            trace: self.trace.clone(),
            iterate_trace: self.iterate_trace.clone(),
            stop,
            iterations,
            breakdown,
            forward_report,
            elapsed_ms,
        })
    }
}

/// Invert for the configured controls, seeding the initial forward guess
/// from system entropy.
pub fn invert(mesh: &TriMesh, fields: &ModelFields, config: &ModelConfig) -> IceResult<InversionResult> {
    InversionEngine::new(mesh, fields, config)?.run()
}

pub fn invert_with_rng<R: Rng + ?Sized>(
    mesh: &TriMesh,
    fields: &ModelFields,
    config: &ModelConfig,
    rng: &mut R,
) -> IceResult<InversionResult> {
    InversionEngine::with_rng(mesh, fields, config, rng)?.run()
}
