// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — GMRES
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Restarted GMRES(m) Krylov subspace solver for general sparse systems.
//!
//! GMRES (Generalised Minimal RESidual) builds an orthonormal Krylov
//! basis via Arnoldi iteration with modified Gram-Schmidt, then solves
//! the projected least-squares problem using Givens rotations on the
//! upper Hessenberg matrix.  When the basis reaches size `m` without
//! convergence the solver restarts from the current approximate
//! solution.
//!
//! A left-preconditioner is applied: instead of solving `A x = b`, we
//! solve `M⁻¹ A x = M⁻¹ b`, where `M⁻¹` is one SSOR application
//! (see [`crate::sor`]).

use ice_types::error::IceResult;

use crate::sor::{Preconditioner, SsorPreconditioner};
use crate::sparse::CsrMatrix;
use crate::vector::{axpy, dot, norm2, scale_into, sub_into};

// ───────────────────────────── configuration ─────────────────────────

/// Configuration for the GMRES(m) solver.
#[derive(Debug, Clone)]
pub struct GmresConfig {
    /// Krylov subspace dimension before restart (default: 50).
    pub restart: usize,
    /// Maximum number of outer (restart) iterations (default: 100).
    pub max_iter: usize,
    /// Convergence tolerance on the relative residual norm (default: 1e-10).
    pub rtol: f64,
    /// Absolute residual tolerance (default: 1e-30).
    pub atol: f64,
    /// SSOR relaxation factor for the preconditioner (default: 1.0).
    pub precond_omega: f64,
}

impl Default for GmresConfig {
    fn default() -> Self {
        GmresConfig {
            restart: 50,
            max_iter: 100,
            rtol: 1e-10,
            atol: 1e-30,
            precond_omega: 1.0,
        }
    }
}

/// Result of a GMRES solve.
#[derive(Debug, Clone)]
pub struct GmresResult {
    /// Total number of matrix-vector products (inner iterations summed
    /// over all restarts).
    pub iterations: usize,
    /// Final L2 residual norm of the unpreconditioned system.
    pub residual: f64,
    /// Whether convergence was achieved.
    pub converged: bool,
}

// ───────────────────── Givens rotation helpers ──────────────────────

/// A single Givens rotation storing (c, s) such that
/// ```text
/// | c  s | | a |   | r |
/// |-s  c | | b | = | 0 |
/// ```
#[derive(Clone, Copy)]
struct GivensRotation {
    c: f64,
    s: f64,
}

impl GivensRotation {
    /// Compute the rotation that zeroes `b` in (a, b).
    fn compute(a: f64, b: f64) -> Self {
        if b.abs() < 1e-300 {
            GivensRotation { c: 1.0, s: 0.0 }
        } else if b.abs() > a.abs() {
            let tau = -a / b;
            let s = 1.0 / (1.0 + tau * tau).sqrt();
            let c = s * tau;
            GivensRotation { c, s }
        } else {
            let tau = -b / a;
            let c = 1.0 / (1.0 + tau * tau).sqrt();
            let s = c * tau;
            GivensRotation { c, s }
        }
    }

    /// Apply this rotation to (a, b) in place.
    #[inline]
    fn apply(&self, a: &mut f64, b: &mut f64) {
        let ta = *a;
        let tb = *b;
        *a = self.c * ta - self.s * tb;
        *b = self.s * ta + self.c * tb;
    }
}

fn true_residual(a: &CsrMatrix, b: &[f64], x: &[f64], av: &mut [f64], r: &mut [f64]) -> f64 {
    a.mul_vec(x, av);
    sub_into(b, av, r);
    norm2(r)
}

// ─────────────────────────── main solver ─────────────────────────────

/// Solve `A x = b` using restarted GMRES(m) with a left SSOR
/// preconditioner. `x` is the initial guess on entry and the solution
/// on exit.
///
/// # Algorithm
///
/// ```text
/// for each restart cycle:
///   r = b - A·x                   (residual)
///   z = M⁻¹ r                    (precondition)
///   beta = ||z||₂
///   V[0] = z / beta
///   for j = 0 .. m-1:             (Arnoldi)
///     w = M⁻¹ A V[j]
///     for i = 0 .. j:             (modified Gram-Schmidt)
///       H[i,j] = <w, V[i]>
///       w -= H[i,j] V[i]
///     H[j+1,j] = ||w||₂
///     V[j+1]   = w / H[j+1,j]
///     apply previous Givens to H[:,j]
///     compute new Givens to zero H[j+1,j]
///     update residual norm estimate
///     if converged: break
///   solve upper triangular system for y
///   x += V · y
/// ```
pub fn gmres_solve(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    config: &GmresConfig,
) -> IceResult<GmresResult> {
    let precond = SsorPreconditioner::new(a, config.precond_omega)?;
    let n = a.n();

    if n == 0 {
        return Ok(GmresResult {
            iterations: 0,
            residual: 0.0,
            converged: true,
        });
    }

    let m = config.restart.clamp(1, n); // Krylov dimension cannot exceed n

    let mut av = vec![0.0; n]; // result of A*v
    let mut r = vec![0.0; n];

    let initial_res_norm = true_residual(a, b, x, &mut av, &mut r);
    let abs_tol = config.atol.max(config.rtol * norm2(b));

    if initial_res_norm <= abs_tol {
        return Ok(GmresResult {
            iterations: 0,
            residual: initial_res_norm,
            converged: true,
        });
    }

    // The Arnoldi loop tracks the preconditioned residual; scale the
    // target so both norms are compared on the same footing.
    let mut z = vec![0.0; n];
    precond.apply(&r, &mut z);
    let precond_ratio = norm2(&z) / initial_res_norm;
    let inner_tol = abs_tol * precond_ratio;

    let mut total_iters: usize = 0;

    // ───── outer restart loop ─────
    for _restart in 0..config.max_iter {
        true_residual(a, b, x, &mut av, &mut r);
        precond.apply(&r, &mut z);

        let beta = norm2(&z);
        if beta < 1e-300 {
            let res = true_residual(a, b, x, &mut av, &mut r);
            return Ok(GmresResult {
                iterations: total_iters,
                residual: res,
                converged: res <= abs_tol,
            });
        }

        // Krylov basis V[0..m+1], each of length n
        let mut v_basis: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        {
            let mut v0 = vec![0.0; n];
            scale_into(1.0 / beta, &z, &mut v0);
            v_basis.push(v0);
        }

        // Upper Hessenberg matrix H[(m+1) x m] stored column-major
        // H[i][j] => h_store[j * (m+1) + i]
        let h_rows = m + 1;
        let mut h_store = vec![0.0; h_rows * m];

        let mut givens: Vec<GivensRotation> = Vec::with_capacity(m);

        // Right-hand side of the Hessenberg least-squares: g = beta * e_1
        let mut g = vec![0.0; m + 1];
        g[0] = beta;

        let mut inner_iters: usize = 0;

        // ───── Arnoldi iteration ─────
        for j in 0..m {
            inner_iters = j + 1;
            total_iters += 1;

            a.mul_vec(&v_basis[j], &mut av);
            let mut w = vec![0.0; n];
            precond.apply(&av, &mut w);

            // Modified Gram-Schmidt orthogonalisation
            for i in 0..=j {
                let h_ij = dot(&w, &v_basis[i]);
                h_store[j * h_rows + i] = h_ij;
                axpy(-h_ij, &v_basis[i], &mut w);
            }

            let h_jp1_j = norm2(&w);
            h_store[j * h_rows + (j + 1)] = h_jp1_j;

            if h_jp1_j > 1e-300 {
                let mut vj1 = vec![0.0; n];
                scale_into(1.0 / h_jp1_j, &w, &mut vj1);
                v_basis.push(vj1);
            } else {
                // Happy breakdown: residual is zero in the Krylov subspace
                v_basis.push(vec![0.0; n]);
            }

            // Apply all previous Givens rotations to column j of H
            for (i, rot) in givens.iter().enumerate() {
                let a_ptr = j * h_rows + i;
                let b_ptr = j * h_rows + i + 1;
                let mut ha = h_store[a_ptr];
                let mut hb = h_store[b_ptr];
                rot.apply(&mut ha, &mut hb);
                h_store[a_ptr] = ha;
                h_store[b_ptr] = hb;
            }

            // Compute new Givens rotation to zero H[j+1, j]
            let rot =
                GivensRotation::compute(h_store[j * h_rows + j], h_store[j * h_rows + (j + 1)]);
            {
                let a_ptr = j * h_rows + j;
                let b_ptr = j * h_rows + (j + 1);
                let mut ha = h_store[a_ptr];
                let mut hb = h_store[b_ptr];
                rot.apply(&mut ha, &mut hb);
                h_store[a_ptr] = ha;
                h_store[b_ptr] = hb;
            }

            {
                let mut ga = g[j];
                let mut gb = g[j + 1];
                rot.apply(&mut ga, &mut gb);
                g[j] = ga;
                g[j + 1] = gb;
            }

            givens.push(rot);

            let res_est = g[j + 1].abs();
            tracing::trace!(iter = total_iters, residual = res_est, "GMRES iteration");

            if res_est <= inner_tol || h_jp1_j < 1e-300 {
                break;
            }
        }

        // ───── solve the upper triangular system H y = g ─────
        let k = inner_iters;
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for jj in (i + 1)..k {
                sum -= h_store[jj * h_rows + i] * y[jj];
            }
            let diag = h_store[i * h_rows + i];
            y[i] = if diag.abs() > 1e-300 { sum / diag } else { 0.0 };
        }

        // ───── update solution: x = x + V * y ─────
        for (i, yi) in y.iter().enumerate() {
            axpy(*yi, &v_basis[i], x);
        }

        let res = true_residual(a, b, x, &mut av, &mut r);
        if res <= abs_tol {
            return Ok(GmresResult {
                iterations: total_iters,
                residual: res,
                converged: true,
            });
        }
    }

    // Exhausted restarts
    let res = true_residual(a, b, x, &mut av, &mut r);
    Ok(GmresResult {
        iterations: total_iters,
        residual: res,
        converged: res <= abs_tol,
    })
}

// ═══════════════════════════════ tests ═══════════════════════════════
