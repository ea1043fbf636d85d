//! Action of the square root of a symmetric positive definite matrix
//! through the binomial series
//!
//! ```text
//! A^½ x = √β · Σ_k c_k Tᵏ x,   T = I − A/β,   c_0 = 1,   c_k = c_{k−1} (k − 3/2) / k
//! ```
//!
//! The series converges when the spectrum of `A/β` lies in `(0, 1]`,
//! which holds for `β ≥ λ_max(A)`, e.g. `β = ||A||_∞`.

use ice_types::error::{IceError, IceResult};

use crate::sparse::CsrMatrix;
use crate::vector::{axpy, norm2};

/// Result of a series evaluation.
#[derive(Debug, Clone)]
pub struct SeriesResult {
    pub value: Vec<f64>,
    /// Number of series terms after the zeroth.
    pub terms: usize,
}

/// Compute `A^½ x`, stopping once a term's norm drops below
/// `tol · ||partial sum||`.
///
/// Returns [`IceError::LinearSolveFailure`] when `max_terms` is reached
/// first.
pub fn sqrt_action(
    a: &CsrMatrix,
    x: &[f64],
    beta: f64,
    tol: f64,
    max_terms: usize,
) -> IceResult<SeriesResult> {
    if !(beta > 0.0) || !beta.is_finite() {
        return Err(IceError::LinAlg(format!(
            "square-root series needs a positive scale, got {beta}"
        )));
    }
    let n = a.n();
    let mut sum = x.to_vec();
    let mut power = x.to_vec(); // Tᵏ x
    let mut a_power = vec![0.0; n];
    let mut coeff = 1.0;
    let mut last_norm = norm2(x);

    if last_norm == 0.0 {
        return Ok(SeriesResult {
            value: sum,
            terms: 0,
        });
    }

    for k in 1..=max_terms {
        a.mul_vec(&power, &mut a_power);
        for (p, ap) in power.iter_mut().zip(&a_power) {
            *p -= ap / beta;
        }
        coeff *= (k as f64 - 1.5) / k as f64;
        axpy(coeff, &power, &mut sum);

        last_norm = coeff.abs() * norm2(&power);
        if last_norm <= tol * norm2(&sum) {
            let scale = beta.sqrt();
            sum.iter_mut().for_each(|v| *v *= scale);
            tracing::debug!(terms = k, "square-root series converged");
            return Ok(SeriesResult {
                value: sum,
                terms: k,
            });
        }
    }

    Err(IceError::LinearSolveFailure {
        iterations: max_terms,
        residual: last_norm,
        message: "square-root series did not reach its tolerance".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_of_diagonal() {
        let a = CsrMatrix::from_triplets(3, &[(0, 0, 4.0), (1, 1, 1.0), (2, 2, 9.0)]).unwrap();
        let res = sqrt_action(&a, &[1.0, 1.0, 1.0], a.inf_norm(), 1e-14, 10_000).unwrap();
        let expect = [2.0, 1.0, 3.0];
        for (v, e) in res.value.iter().zip(expect) {
            assert!((v - e).abs() < 1e-10, "{v} vs {e}");
        }
    }

    #[test]
    fn test_sqrt_squares_to_matrix() {
        let mut t = Vec::new();
        for i in 0..8 {
            t.push((i, i, 3.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < 8 {
                t.push((i, i + 1, -1.0));
            }
        }
        let a = CsrMatrix::from_triplets(8, &t).unwrap();
        let beta = a.inf_norm();
        let x: Vec<f64> = (0..8).map(|i| 1.0 + (i as f64).sin()).collect();
        let half = sqrt_action(&a, &x, beta, 1e-15, 100_000).unwrap();
        let full = sqrt_action(&a, &half.value, beta, 1e-15, 100_000).unwrap();
        let ax = a.apply(&x);
        for (v, e) in full.value.iter().zip(&ax) {
            assert!((v - e).abs() < 1e-8 * norm2(&ax), "{v} vs {e}");
        }
    }

    #[test]
    fn test_term_cap_is_an_error() {
        let a = CsrMatrix::from_triplets(2, &[(0, 0, 1.0), (1, 1, 1e-3)]).unwrap();
        let err = sqrt_action(&a, &[1.0, 1.0], 1.0, 1e-16, 3).unwrap_err();
        assert!(matches!(err, IceError::LinearSolveFailure { iterations: 3, .. }));
    }

    #[test]
    fn test_zero_vector() {
        let a = CsrMatrix::identity(4);
        let res = sqrt_action(&a, &[0.0; 4], 1.0, 1e-16, 10).unwrap();
        assert_eq!(res.terms, 0);
        assert!(res.value.iter().all(|v| *v == 0.0));
    }
}
