//! Symmetric successive over-relaxation (SSOR) on CSR matrices.
//!
//! One application of the preconditioner is a forward SOR sweep, a
//! diagonal scaling and a backward SOR sweep starting from zero:
//!
//! ```text
//! M = ω/(2-ω) · (D/ω + L) (D/ω)⁻¹ (D/ω + U)
//! ```
//!
//! For a symmetric positive definite matrix and `0 < ω < 2`, `M` is
//! symmetric positive definite, so it is a valid CG preconditioner.

use ice_types::error::{IceError, IceResult};

use crate::sparse::CsrMatrix;

/// Approximate inverse applied inside a Krylov iteration.
pub trait Preconditioner {
    /// `z ≈ A⁻¹ r`.
    fn apply(&self, r: &[f64], z: &mut [f64]);

    fn name(&self) -> &'static str;
}

/// No preconditioning (`z = r`).
#[derive(Debug, Clone, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

#[derive(Debug, Clone)]
pub struct SsorPreconditioner<'a> {
    matrix: &'a CsrMatrix,
    diag: Vec<f64>,
    omega: f64,
}

impl<'a> SsorPreconditioner<'a> {
    /// Fails on a zero or non-finite diagonal entry, or `omega` outside
    /// `(0, 2)`.
    pub fn new(matrix: &'a CsrMatrix, omega: f64) -> IceResult<Self> {
        if !(omega > 0.0 && omega < 2.0) {
            return Err(IceError::LinAlg(format!(
                "SSOR relaxation must be in (0, 2), got {omega}"
            )));
        }
        let diag = matrix.diagonal();
        if let Some((i, d)) = diag
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || d.abs() < 1e-300)
        {
            return Err(IceError::LinAlg(format!(
                "SSOR needs a nonzero diagonal, row {i} has {d}"
            )));
        }
        Ok(SsorPreconditioner {
            matrix,
            diag,
            omega,
        })
    }
}

impl Preconditioner for SsorPreconditioner<'_> {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let n = self.matrix.n();
        let w = self.omega;

        // Forward sweep: (D/ω + L) y = r
        for i in 0..n {
            let (cols, vals) = self.matrix.row(i);
            let mut s = r[i];
            for (&j, &a) in cols.iter().zip(vals) {
                if j < i {
                    s -= a * z[j];
                }
            }
            z[i] = s * w / self.diag[i];
        }

        // Scale: y ← (2-ω)/ω · (D/ω) y
        let c = (2.0 - w) / w;
        for i in 0..n {
            z[i] *= c * self.diag[i] / w;
        }

        // Backward sweep: (D/ω + U) z = y
        for i in (0..n).rev() {
            let (cols, vals) = self.matrix.row(i);
            let mut s = z[i];
            for (&j, &a) in cols.iter().zip(vals) {
                if j > i {
                    s -= a * z[j];
                }
            }
            z[i] = s * w / self.diag[i];
        }
    }

    fn name(&self) -> &'static str {
        "ssor"
    }
}

/// Run `iterations` symmetric Gauss-Seidel/SOR sweeps on `A x = b`.
pub fn sor_solve(a: &CsrMatrix, b: &[f64], x: &mut [f64], omega: f64, iterations: usize) {
    let n = a.n();
    let sweep = |i: usize, x: &mut [f64]| {
        let (cols, vals) = a.row(i);
        let mut s = b[i];
        let mut d = 0.0;
        for (&j, &v) in cols.iter().zip(vals) {
            if j == i {
                d = v;
            } else {
                s -= v * x[j];
            }
        }
        if d != 0.0 {
            x[i] = (1.0 - omega) * x[i] + omega * s / d;
        }
    };
    for _ in 0..iterations {
        for i in 0..n {
            sweep(i, x);
        }
        for i in (0..n).rev() {
            sweep(i, x);
        }
    }
}

/// L2 norm of `b - A x`.
pub fn sor_residual(a: &CsrMatrix, b: &[f64], x: &[f64]) -> f64 {
    let ax = a.apply(x);
    b.iter()
        .zip(&ax)
        .map(|(bi, ai)| (bi - ai) * (bi - ai))
        .sum::<f64>()
        .sqrt()
}
