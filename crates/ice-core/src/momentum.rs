// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Momentum Equation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Shallow-shelf momentum balance on P1 triangles.
//!
//! The discrete residual is the gradient of the action
//!
//! ```text
//! Action(U) = Σ_T A H_c (2n/(n+1)) B_c ε²^((n+1)/(2n))
//!           + Σ_a ½ w_a (1 − fl_a) e^{α_a} |U_a|²
//!           + fᵀ U
//! ```
//!
//! where `f` collects the driving stress `∇F + W∇b` and the hydrostatic
//! terminus traction. The viscous part and the drag depend on `U`; `f`
//! is assembled once. The `Weak` formulation assembles `f` after
//! integration by parts; both give the same vector.

use ice_math::sparse::{CsrMatrix, SparsityPattern};
use ice_types::config::PhysicsParams;
use ice_types::error::{IceError, IceResult};
use ice_types::mesh::TriMesh;
use ice_types::state::ModelFields;

use crate::domain::{is_floating, DomainLabels, FacetTag};

/// Strain-rate quadratic form `ε² = sᵀ Q s` for `s = [ε_xx, ε_yy, ε_xy]`.
const Q: [[f64; 3]; 3] = [[1.0, 0.5, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// How the driving stress is discretised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    Action,
    Weak,
}

impl Formulation {
    /// Parse the configured formulation name. Unknown names fall back to
    /// `Weak` with a warning.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "action" => Formulation::Action,
            "weak" => Formulation::Weak,
            other => {
                tracing::warn!(formulation = other, "unknown momentum formulation, using weak form");
                Formulation::Weak
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Formulation::Action => "action",
            Formulation::Weak => "weak",
        }
    }
}

/// Strain-rate operator column of local dof `l = 2k + comp`.
#[inline]
fn b_column(grad: &[[f64; 2]; 3], l: usize) -> [f64; 3] {
    let g = grad[l / 2];
    if l % 2 == 0 {
        [g[0], 0.0, 0.5 * g[1]]
    } else {
        [0.0, g[1], 0.5 * g[0]]
    }
}

#[inline]
fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn mul_q(s: &[f64; 3]) -> [f64; 3] {
    [
        Q[0][0] * s[0] + Q[0][1] * s[1],
        Q[1][0] * s[0] + Q[1][1] * s[1],
        Q[2][2] * s[2],
    ]
}

/// Per-cell viscous state at a given velocity.
struct CellState {
    dofs: [usize; 6],
    /// `A · H_c`
    weight: f64,
    stiffness: f64,
    eps2: f64,
    nu: f64,
    q: [f64; 3],
}

/// Hydrostatic driving terms at one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivingStress {
    /// Depth-integrated pressure `F`.
    pub pressure: f64,
    /// Bed-slope weight `W`.
    pub bed_weight: f64,
    /// Terminus traction `σ_n`.
    pub terminus: f64,
}

/// Driving stress at a vertex of thickness `h` on bed `bed`.
pub fn driving_stress(physics: &PhysicsParams, bed: f64, h: f64) -> DrivingStress {
    let rho_g = physics.rho_g();
    let hs = physics.flotation_thickness(bed);
    let delta = physics.density_contrast();
    let floating = is_floating(h, hs);

    let (pressure, bed_weight) = if floating {
        (0.5 * rho_g * (delta * h * h + (1.0 - delta) * hs * hs), rho_g * hs)
    } else {
        (0.5 * rho_g * h * h, rho_g * h)
    };
    let base = if floating {
        -(physics.rho_ice / physics.rho_water) * h
    } else {
        bed
    };
    let draft = base.min(0.0);
    let terminus =
        0.5 * rho_g * (h * h - (physics.rho_water / physics.rho_ice) * draft * draft);

    DrivingStress {
        pressure,
        bed_weight,
        terminus,
    }
}

/// Residual, Jacobian and action of the SSA momentum balance.
#[derive(Debug, Clone)]
pub struct MomentumEquation<'m> {
    mesh: &'m TriMesh,
    physics: PhysicsParams,
    formulation: Formulation,
    ice_cells: Vec<usize>,
    cell_thickness: Vec<f64>,
    floating: Vec<bool>,
    /// Lumped ice area per vertex, zero where the vertex floats.
    drag_weight: Vec<f64>,
    alpha: Vec<f64>,
    beta: Vec<f64>,
    load: Vec<f64>,
    pattern: SparsityPattern,
}

impl<'m> MomentumEquation<'m> {
    pub fn new(
        mesh: &'m TriMesh,
        labels: &DomainLabels,
        fields: &ModelFields,
        physics: &PhysicsParams,
        formulation: Formulation,
    ) -> IceResult<Self> {
        fields.validate(mesh)?;
        if labels.cells.len() != mesh.n_cells() || labels.facets.len() != mesh.edges().len() {
            return Err(IceError::FieldMismatch {
                name: "domain labels".to_string(),
                expected: mesh.n_cells(),
                got: labels.cells.len(),
            });
        }

        let nv = mesh.n_vertices();
        let thickness = fields.thickness.to_vec();
        let bed = fields.bed.to_vec();
        let ice_cells: Vec<usize> = labels.ice_cells().collect();

        let floating: Vec<bool> = (0..nv)
            .map(|v| is_floating(thickness[v], physics.flotation_thickness(bed[v])))
            .collect();

        let mut drag_weight = vec![0.0; nv];
        for &c in &ice_cells {
            for v in mesh.cell(c) {
                drag_weight[v] += mesh.cell_area(c) / 3.0;
            }
        }
        for (w, &fl) in drag_weight.iter_mut().zip(&floating) {
            if fl {
                *w = 0.0;
            }
        }

        let cell_thickness: Vec<f64> = (0..mesh.n_cells())
            .map(|c| mesh.cell_mean(c, &thickness))
            .collect();

        let rows: Vec<Vec<usize>> = (0..2 * nv)
            .map(|dof| {
                mesh.vertex_neighbors(dof / 2)
                    .iter()
                    .flat_map(|&w| [2 * w, 2 * w + 1])
                    .collect()
            })
            .collect();

        let mut eq = MomentumEquation {
            mesh,
            physics: *physics,
            formulation,
            ice_cells,
            cell_thickness,
            floating,
            drag_weight,
            alpha: fields.alpha.to_vec(),
            beta: fields.beta.to_vec(),
            load: Vec::new(),
            pattern: SparsityPattern::from_rows(rows),
        };
        eq.load = eq.assemble_load(labels, &bed, &thickness);

        tracing::debug!(
            formulation = formulation.name(),
            ice_cells = eq.ice_cells.len(),
            floating_vertices = eq.floating.iter().filter(|&&f| f).count(),
            "momentum equation assembled"
        );
        Ok(eq)
    }

    pub fn mesh(&self) -> &'m TriMesh {
        self.mesh
    }

    pub fn n_dofs(&self) -> usize {
        2 * self.mesh.n_vertices()
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    pub fn physics(&self) -> &PhysicsParams {
        &self.physics
    }

    /// Pointwise floating flag per vertex.
    pub fn floating(&self) -> &[bool] {
        &self.floating
    }

    /// Velocity-independent driving vector `f`.
    pub fn load(&self) -> &[f64] {
        &self.load
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    /// Replace the drag and stiffness log-parameters.
    pub fn set_controls(&mut self, alpha: &[f64], beta: &[f64]) -> IceResult<()> {
        let nv = self.mesh.n_vertices();
        for (name, field) in [("alpha", alpha), ("beta", beta)] {
            if field.len() != nv {
                return Err(IceError::FieldMismatch {
                    name: name.to_string(),
                    expected: nv,
                    got: field.len(),
                });
            }
        }
        self.alpha.copy_from_slice(alpha);
        self.beta.copy_from_slice(beta);
        Ok(())
    }

    fn assemble_load(&self, labels: &DomainLabels, bed: &[f64], thickness: &[f64]) -> Vec<f64> {
        let mesh = self.mesh;
        let stress: Vec<DrivingStress> = bed
            .iter()
            .zip(thickness)
            .map(|(&b, &h)| driving_stress(&self.physics, b, h))
            .collect();
        let mut load = vec![0.0; self.n_dofs()];

        for &c in &self.ice_cells {
            let verts = mesh.cell(c);
            let grad = mesh.gradients(c);
            let area = mesh.cell_area(c);

            let mut grad_b = [0.0; 2];
            let mut grad_f = [0.0; 2];
            let mut w_sum = 0.0;
            let mut f_sum = 0.0;
            for (k, &v) in verts.iter().enumerate() {
                for d in 0..2 {
                    grad_b[d] += bed[v] * grad[k][d];
                    grad_f[d] += stress[v].pressure * grad[k][d];
                }
                w_sum += stress[v].bed_weight;
                f_sum += stress[v].pressure;
            }

            for (k, &v) in verts.iter().enumerate() {
                let w_int = area / 12.0 * (w_sum + stress[v].bed_weight);
                for d in 0..2 {
                    let pressure = match self.formulation {
                        Formulation::Action => area / 3.0 * grad_f[d],
                        Formulation::Weak => -area * (f_sum / 3.0) * grad[k][d],
                    };
                    load[2 * v + d] += pressure + w_int * grad_b[d];
                }
            }
        }

        for (e, tag) in mesh.edges().iter().zip(&labels.facets) {
            let ice_side = labels.cells[e.cell].is_ice();
            let nb_ice = e.neighbor.map(|nb| labels.cells[nb].is_ice());
            let on_ice_boundary = match nb_ice {
                None => ice_side,
                Some(other) => ice_side != other,
            };
            if !on_ice_boundary {
                continue;
            }
            let n = if ice_side {
                e.normal
            } else {
                [-e.normal[0], -e.normal[1]]
            };
            let [a, b] = e.vertices;
            let edge_integral = |fa: f64, fb: f64| {
                (e.length * (2.0 * fa + fb) / 6.0, e.length * (fa + 2.0 * fb) / 6.0)
            };

            if self.formulation == Formulation::Weak {
                let (ia, ib) = edge_integral(stress[a].pressure, stress[b].pressure);
                for d in 0..2 {
                    load[2 * a + d] += ia * n[d];
                    load[2 * b + d] += ib * n[d];
                }
            }
            if *tag == FacetTag::Terminus {
                let (ia, ib) = edge_integral(stress[a].terminus, stress[b].terminus);
                for d in 0..2 {
                    load[2 * a + d] -= ia * n[d];
                    load[2 * b + d] -= ib * n[d];
                }
            }
        }

        load
    }

    fn cell_state(&self, c: usize, u: &[f64]) -> CellState {
        let verts = self.mesh.cell(c);
        let grad = self.mesh.gradients(c);
        let dofs = [
            2 * verts[0],
            2 * verts[0] + 1,
            2 * verts[1],
            2 * verts[1] + 1,
            2 * verts[2],
            2 * verts[2] + 1,
        ];

        let mut s = [0.0; 3];
        for (l, &dof) in dofs.iter().enumerate() {
            let col = b_column(grad, l);
            for i in 0..3 {
                s[i] += col[i] * u[dof];
            }
        }
        let q = mul_q(&s);
        let eps2 = dot3(&s, &q) + self.physics.eps_rp * self.physics.eps_rp;
        let n = self.physics.glen_n;
        let stiffness = verts.iter().map(|&v| self.beta[v].exp()).sum::<f64>() / 3.0;
        let nu = 0.5 * stiffness * eps2.powf((1.0 - n) / (2.0 * n));

        CellState {
            dofs,
            weight: self.mesh.cell_area(c) * self.cell_thickness[c],
            stiffness,
            eps2,
            nu,
            q,
        }
    }

    fn viscous_local(&self, c: usize, st: &CellState) -> [f64; 6] {
        let grad = self.mesh.gradients(c);
        let mut r = [0.0; 6];
        for (l, rl) in r.iter_mut().enumerate() {
            *rl = st.weight * 4.0 * st.nu * dot3(&b_column(grad, l), &st.q);
        }
        r
    }

    /// Residual `R(U) = ∂Action/∂U`.
    pub fn residual(&self, u: &[f64]) -> Vec<f64> {
        let mut r = self.load.clone();
        for &c in &self.ice_cells {
            let st = self.cell_state(c, u);
            for (dof, rl) in st.dofs.iter().zip(self.viscous_local(c, &st)) {
                r[*dof] += rl;
            }
        }
        for (v, &w) in self.drag_weight.iter().enumerate() {
            let k = w * self.alpha[v].exp();
            r[2 * v] += k * u[2 * v];
            r[2 * v + 1] += k * u[2 * v + 1];
        }
        r
    }

    /// Jacobian `∂R/∂U`, the symmetric Hessian of the action.
    pub fn jacobian(&self, u: &[f64]) -> CsrMatrix {
        let mut jac = CsrMatrix::zeros(self.pattern.clone());
        let kappa = (1.0 - self.physics.glen_n) / self.physics.glen_n;

        for &c in &self.ice_cells {
            let st = self.cell_state(c, u);
            let grad = self.mesh.gradients(c);
            let cols: [[f64; 3]; 6] = std::array::from_fn(|l| b_column(grad, l));
            let scale = st.weight * 4.0 * st.nu;

            for (l, bl) in cols.iter().enumerate() {
                let qbl = mul_q(bl);
                let ql = dot3(&st.q, bl);
                for (m, bm) in cols.iter().enumerate() {
                    let qm = dot3(&st.q, bm);
                    let value = scale * (dot3(&qbl, bm) + kappa * ql * qm / st.eps2);
                    jac.add(st.dofs[l], st.dofs[m], value);
                }
            }
        }
        for (v, &w) in self.drag_weight.iter().enumerate() {
            let k = w * self.alpha[v].exp();
            if k != 0.0 {
                jac.add(2 * v, 2 * v, k);
                jac.add(2 * v + 1, 2 * v + 1, k);
            }
        }
        jac
    }

    /// Viscous dissipation plus basal drag: the part of the action that
    /// is nonlinear in `U`. Never negative.
    pub fn energy(&self, u: &[f64]) -> f64 {
        let n = self.physics.glen_n;
        let expo = (n + 1.0) / (2.0 * n);
        let coeff = 2.0 * n / (n + 1.0);

        let viscous: f64 = self
            .ice_cells
            .iter()
            .map(|&c| {
                let st = self.cell_state(c, u);
                st.weight * coeff * st.stiffness * st.eps2.powf(expo)
            })
            .sum();
        let drag: f64 = self
            .drag_weight
            .iter()
            .enumerate()
            .map(|(v, &w)| {
                0.5 * w * self.alpha[v].exp() * (u[2 * v] * u[2 * v] + u[2 * v + 1] * u[2 * v + 1])
            })
            .sum();
        viscous + drag
    }

    /// The scalar action whose gradient is [`Self::residual`].
    pub fn action(&self, u: &[f64]) -> f64 {
        let work: f64 = self.load.iter().zip(u).map(|(f, ui)| f * ui).sum();
        self.energy(u) + work
    }

    /// `(λᵀ ∂R/∂α, λᵀ ∂R/∂β)` at velocity `u`, one entry per vertex.
    pub fn control_sensitivity(&self, u: &[f64], lambda: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let nv = self.mesh.n_vertices();
        let mut d_alpha = vec![0.0; nv];
        let mut d_beta = vec![0.0; nv];

        for (v, &w) in self.drag_weight.iter().enumerate() {
            d_alpha[v] = w
                * self.alpha[v].exp()
                * (lambda[2 * v] * u[2 * v] + lambda[2 * v + 1] * u[2 * v + 1]);
        }

        for &c in &self.ice_cells {
            let st = self.cell_state(c, u);
            let r = self.viscous_local(c, &st);
            let lr: f64 = st.dofs.iter().zip(&r).map(|(&dof, rl)| lambda[dof] * rl).sum();
            for v in self.mesh.cell(c) {
                d_beta[v] += lr * self.beta[v].exp() / (3.0 * st.stiffness);
            }
        }

        (d_alpha, d_beta)
    }

    /// Effective viscosity per ice cell (zero elsewhere).
    pub fn viscosity(&self, u: &[f64]) -> Vec<f64> {
        let mut nu = vec![0.0; self.mesh.n_cells()];
        for &c in &self.ice_cells {
            nu[c] = self.cell_state(c, u).nu;
        }
        nu
    }
}
