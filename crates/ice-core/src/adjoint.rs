// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Adjoint Gradient
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Misfit + regularization functional of the control fields and its
//! gradient by the discrete adjoint of the momentum balance.
//!
//! With `R(U, c) = 0` the gradient of `J(U(c), c)` is
//! `∂J/∂c − λᵀ ∂R/∂c` where `K λ = ∂J/∂U` and `K = ∂R/∂U` is symmetric.

use ice_math::vector::norm2;
use ice_types::config::{ControlSelection, InversionConfig, ModelConfig, RegularizationKind};
use ice_types::error::{IceError, IceResult};
use ice_types::mesh::TriMesh;
use ice_types::state::VelocityObservations;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::CellRegion;
use crate::prior::Laplacian;
use crate::solver::{solve_linear, SsaSolver};

/// Scalar objective of a control vector with a gradient at the last
/// evaluated point.
pub trait ReducedFunctional {
    fn n_controls(&self) -> usize;

    /// Value at `controls`, solving the forward model as needed.
    fn evaluate(&mut self, controls: &[f64]) -> IceResult<f64>;

    /// Gradient at the point of the last [`Self::evaluate`].
    fn gradient(&mut self) -> IceResult<Vec<f64>>;
}

/// One control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Alpha,
    Beta,
}

impl Control {
    pub fn name(self) -> &'static str {
        match self {
            Control::Alpha => "alpha",
            Control::Beta => "beta",
        }
    }

    /// Active fields of a selection, in control-vector order.
    pub fn selected(selection: ControlSelection) -> Vec<Control> {
        match selection {
            ControlSelection::Alpha => vec![Control::Alpha],
            ControlSelection::Beta => vec![Control::Beta],
            ControlSelection::AlphaBeta => vec![Control::Alpha, Control::Beta],
        }
    }
}

/// Split of the objective into its parts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBreakdown {
    pub misfit: f64,
    pub regularization: f64,
    pub total: f64,
}

impl CostBreakdown {
    /// `J_reg / J_misfit`, infinite for a zero misfit.
    pub fn ratio(&self) -> f64 {
        if self.misfit > 0.0 {
            self.regularization / self.misfit
        } else {
            f64::INFINITY
        }
    }
}

#[derive(Debug, Clone)]
enum Regularizer {
    /// `γ Σ_T A |∇ exp(c)|²` over `cells`.
    Gradient { gamma: f64, cells: Vec<usize> },
    /// `½ (c − c_bg)ᵀ P (c − c_bg)` with `P` the prior precision action.
    Prior {
        operator: Box<Laplacian>,
        background: Vec<f64>,
    },
}

impl Regularizer {
    fn value_and_gradient(&self, mesh: &TriMesh, c: &[f64]) -> IceResult<(f64, Vec<f64>)> {
        match self {
            Regularizer::Gradient { gamma, cells } => {
                let mut value = 0.0;
                let mut grad = vec![0.0; c.len()];
                for &cell in cells {
                    let verts = mesh.cell(cell);
                    let g = mesh.gradients(cell);
                    let area = mesh.cell_area(cell);
                    let mut grad_e = [0.0; 2];
                    for (k, &v) in verts.iter().enumerate() {
                        let e = c[v].exp();
                        grad_e[0] += e * g[k][0];
                        grad_e[1] += e * g[k][1];
                    }
                    value += gamma * area * (grad_e[0] * grad_e[0] + grad_e[1] * grad_e[1]);
                    for (k, &v) in verts.iter().enumerate() {
                        let proj = grad_e[0] * g[k][0] + grad_e[1] * g[k][1];
                        grad[v] += 2.0 * gamma * area * proj * c[v].exp();
                    }
                }
                Ok((value, grad))
            }
            Regularizer::Prior {
                operator,
                background,
            } => {
                let d: Vec<f64> = c.iter().zip(background).map(|(a, b)| a - b).collect();
                let pd = operator.action(&d)?;
                let value = 0.5 * d.iter().zip(&pd).map(|(a, b)| a * b).sum::<f64>();
                Ok((value, pd))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Evaluation {
    breakdown: CostBreakdown,
}

/// Inversion functional over the drag and/or stiffness fields of an
/// [`SsaSolver`].
pub struct SsaReducedFunctional<'m> {
    model: SsaSolver<'m>,
    controls: Vec<Control>,
    regularizers: Vec<Regularizer>,
    observations: VelocityObservations,
    /// Vertex quadrature weight of the observed grounded region.
    misfit_weight: Vec<f64>,
    rng: StdRng,
    last: Option<Evaluation>,
}

impl<'m> SsaReducedFunctional<'m> {
    /// Wrap a model whose fields carry observations. Solves the forward
    /// problem once if it has not been solved yet.
    pub fn new<R: Rng + ?Sized>(mut model: SsaSolver<'m>, rng: &mut R) -> IceResult<Self> {
        let observations = model.fields().observations.clone().ok_or_else(|| {
            IceError::MissingObservationData(
                "inversion requires u_obs, v_obs, u_std, v_std and an observation mask".to_string(),
            )
        })?;
        let mesh = model.mesh();
        let config: ModelConfig = model.config().clone();
        let inv = &config.inversion;
        let labels = model.labels();

        let grounded: Vec<usize> = (0..mesh.n_cells())
            .filter(|&c| labels.cells[c].is_grounded())
            .collect();

        let mut misfit_weight = vec![0.0; mesh.n_vertices()];
        for c in 0..mesh.n_cells() {
            if labels.cells[c] == CellRegion::GroundedIceObserved {
                for v in mesh.cell(c) {
                    misfit_weight[v] += mesh.cell_area(c) / 3.0;
                }
            }
        }
        if misfit_weight.iter().all(|&w| w == 0.0) {
            return Err(IceError::MissingObservationData(
                "no grounded cell is covered by observations".to_string(),
            ));
        }

        let controls = Control::selected(inv.controls);
        let mut regularizers = Vec::with_capacity(controls.len());
        for &control in &controls {
            regularizers.push(regularizer(mesh, &config, inv, control, &grounded, &model)?);
        }

        if model.velocity().is_none() {
            model.solve_forward_with_rng(rng)?;
        }

        Ok(SsaReducedFunctional {
            model,
            controls,
            regularizers,
            observations,
            misfit_weight,
            rng: StdRng::seed_from_u64(rng.gen()),
            last: None,
        })
    }

    pub fn model(&self) -> &SsaSolver<'m> {
        &self.model
    }

    pub fn into_model(self) -> SsaSolver<'m> {
        self.model
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Breakdown of the last evaluation.
    pub fn breakdown(&self) -> Option<CostBreakdown> {
        self.last.as_ref().map(|e| e.breakdown)
    }

    /// Current values of the active controls, concatenated.
    pub fn current_controls(&self) -> Vec<f64> {
        let fields = self.model.fields();
        self.controls
            .iter()
            .flat_map(|c| match c {
                Control::Alpha => fields.alpha.to_vec(),
                Control::Beta => fields.beta.to_vec(),
            })
            .collect()
    }

    fn n_vertices(&self) -> usize {
        self.model.mesh().n_vertices()
    }

    fn block<'x>(&self, controls: &'x [f64], k: usize) -> &'x [f64] {
        let nv = self.n_vertices();
        &controls[k * nv..(k + 1) * nv]
    }

    fn misfit(&self, u: &[f64]) -> (f64, Vec<f64>) {
        let obs = &self.observations;
        let mut value = 0.0;
        let mut d_u = vec![0.0; u.len()];
        for (v, &w) in self.misfit_weight.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            let du = u[2 * v] - obs.u_obs[v];
            let dv = u[2 * v + 1] - obs.v_obs[v];
            let iu = 1.0 / (obs.u_std[v] * obs.u_std[v]);
            let iv = 1.0 / (obs.v_std[v] * obs.v_std[v]);
            value += w * (iu * du * du + iv * dv * dv);
            d_u[2 * v] = 2.0 * w * iu * du;
            d_u[2 * v + 1] = 2.0 * w * iv * dv;
        }
        (value, d_u)
    }

    fn velocity(&self) -> IceResult<&[f64]> {
        self.model
            .velocity()
            .ok_or_else(|| IceError::ConfigError("forward model has not been solved".to_string()))
    }
}

fn regularizer(
    mesh: &TriMesh,
    config: &ModelConfig,
    inv: &InversionConfig,
    control: Control,
    grounded: &[usize],
    model: &SsaSolver,
) -> IceResult<Regularizer> {
    let (gamma, delta, background) = match control {
        Control::Alpha => (inv.gamma_alpha, inv.delta_alpha, model.fields().alpha.to_vec()),
        Control::Beta => (inv.gamma_beta, inv.delta_beta, model.fields().beta.to_vec()),
    };
    Ok(match inv.regularization {
        RegularizationKind::Gradient => Regularizer::Gradient {
            gamma,
            cells: grounded.to_vec(),
        },
        RegularizationKind::Prior => Regularizer::Prior {
            operator: Box::new(Laplacian::new(mesh, delta, gamma, &config.prior)?),
            background,
        },
    })
}

impl ReducedFunctional for SsaReducedFunctional<'_> {
    fn n_controls(&self) -> usize {
        self.controls.len() * self.n_vertices()
    }

    fn evaluate(&mut self, controls: &[f64]) -> IceResult<f64> {
        if controls.len() != self.n_controls() {
            return Err(IceError::FieldMismatch {
                name: "controls".to_string(),
                expected: self.n_controls(),
                got: controls.len(),
            });
        }
        let mut alpha = self.model.fields().alpha.to_vec();
        let mut beta = self.model.fields().beta.to_vec();
        for (k, control) in self.controls.iter().enumerate() {
            let values = self.block(controls, k);
            match control {
                Control::Alpha => alpha.copy_from_slice(values),
                Control::Beta => beta.copy_from_slice(values),
            }
        }
        self.model.set_controls(&alpha, &beta)?;
        self.model.solve_forward_with_rng(&mut self.rng)?;

        let (misfit, _) = self.misfit(self.velocity()?);
        let mut regularization = 0.0;
        for (k, reg) in self.regularizers.iter().enumerate() {
            regularization += reg.value_and_gradient(self.model.mesh(), self.block(controls, k))?.0;
        }
        let breakdown = CostBreakdown {
            misfit,
            regularization,
            total: misfit + regularization,
        };
        tracing::debug!(
            j = breakdown.total,
            j_misfit = misfit,
            j_reg = regularization,
            "functional evaluated"
        );
        self.last = Some(Evaluation { breakdown });
        Ok(breakdown.total)
    }

    fn gradient(&mut self) -> IceResult<Vec<f64>> {
        if self.last.is_none() {
            return Err(IceError::ConfigError(
                "gradient requested before the functional was evaluated".to_string(),
            ));
        }
        let u = self.velocity()?.to_vec();
        let eq = self.model.equation();
        let bcs = self.model.dirichlet();

        let (_, mut rhs) = self.misfit(&u);
        bcs.apply_zero(&mut rhs);
        let mut k = eq.jacobian(&u);
        k.constrain(&bcs.constrained);
        let mut lambda = vec![0.0; rhs.len()];
        let lin = solve_linear(&k, &rhs, &mut lambda, &self.model.config().solver.linear)?;
        if !lin.converged {
            return Err(IceError::LinearSolveFailure {
                iterations: lin.iterations,
                residual: lin.residual,
                message: "adjoint solve did not converge".to_string(),
            });
        }
        let (d_alpha, d_beta) = eq.control_sensitivity(&u, &lambda);

        let current = self.current_controls();
        let mut grad = Vec::with_capacity(self.n_controls());
        for (k, control) in self.controls.iter().enumerate() {
            let (_, reg) = self.regularizers[k].value_and_gradient(self.model.mesh(), self.block(&current, k))?;
            let sens = match control {
                Control::Alpha => &d_alpha,
                Control::Beta => &d_beta,
            };
            grad.extend(reg.iter().zip(sens).map(|(r, s)| r - s));
        }
        tracing::trace!(norm = norm2(&grad), "adjoint gradient");
        Ok(grad)
    }
}
