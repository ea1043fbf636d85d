// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Conjugate Gradients
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Preconditioned conjugate gradients for symmetric positive definite
//! CSR systems.

use ice_types::error::IceResult;

use crate::sor::{Preconditioner, SsorPreconditioner};
use crate::sparse::CsrMatrix;
use crate::vector::{axpy, dot, norm2};

/// Configuration for the CG solver.
#[derive(Debug, Clone)]
pub struct CgConfig {
    /// Relative tolerance on `||r|| / ||b||` (default: 1e-10).
    pub rtol: f64,
    /// Absolute tolerance on `||r||` (default: 1e-30).
    pub atol: f64,
    /// Maximum number of iterations (default: 5000).
    pub max_iter: usize,
    /// SSOR relaxation factor of the preconditioner (default: 1.0).
    pub omega: f64,
}

impl Default for CgConfig {
    fn default() -> Self {
        CgConfig {
            rtol: 1e-10,
            atol: 1e-30,
            max_iter: 5000,
            omega: 1.0,
        }
    }
}

/// Result of a CG solve.
#[derive(Debug, Clone)]
pub struct CgResult {
    pub iterations: usize,
    /// Final L2 norm of the recursively updated residual.
    pub residual: f64,
    pub converged: bool,
}

/// Solve `A x = b` with SSOR-preconditioned CG. `x` is the initial
/// guess on entry.
///
/// Fails only when the preconditioner cannot be built; nonconvergence is
/// reported through [`CgResult::converged`].
pub fn pcg_solve(a: &CsrMatrix, b: &[f64], x: &mut [f64], config: &CgConfig) -> IceResult<CgResult> {
    let precond = SsorPreconditioner::new(a, config.omega)?;
    Ok(pcg_solve_with(a, b, x, config, &precond))
}

/// Solve `A x = b` with CG and a caller-supplied preconditioner.
pub fn pcg_solve_with<P: Preconditioner>(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    config: &CgConfig,
    precond: &P,
) -> CgResult {
    let n = a.n();
    let b_norm = norm2(b);
    let tol = config.atol.max(config.rtol * b_norm);

    let mut r = vec![0.0; n];
    a.mul_vec(x, &mut r);
    for (ri, bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    let mut res = norm2(&r);
    if res <= tol {
        return CgResult {
            iterations: 0,
            residual: res,
            converged: true,
        };
    }

    let mut z = vec![0.0; n];
    precond.apply(&r, &mut z);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    let mut q = vec![0.0; n];

    for iter in 1..=config.max_iter {
        a.mul_vec(&p, &mut q);
        let pq = dot(&p, &q);
        if !(pq > 0.0) || !pq.is_finite() {
            tracing::debug!(iter, pq, precond = precond.name(), "CG breakdown: matrix not SPD");
            return CgResult {
                iterations: iter,
                residual: res,
                converged: false,
            };
        }
        let step = rz / pq;
        axpy(step, &p, x);
        axpy(-step, &q, &mut r);
        res = norm2(&r);
        tracing::trace!(iter, residual = res, "CG iteration");
        if res <= tol {
            return CgResult {
                iterations: iter,
                residual: res,
                converged: true,
            };
        }

        precond.apply(&r, &mut z);
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;
        rz = rz_new;
        for (pi, zi) in p.iter_mut().zip(&z) {
            *pi = zi + beta * *pi;
        }
    }

    CgResult {
        iterations: config.max_iter,
        residual: res,
        converged: false,
    }
}
