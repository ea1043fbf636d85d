// ─────────────────────────────────────────────────────────────────────
// SSA Ice Core — Bound-Constrained L-BFGS
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Projected limited-memory BFGS with box bounds.
//!
//! Each iteration:
//!   1. stop if the projected gradient is below `gtol` (∞-norm),
//!   2. build the quasi-Newton direction with the two-loop recursion on
//!      the free variables (variables pinned at a bound with the
//!      gradient pushing outward are held fixed),
//!   3. backtrack along the projected path `P(x + t d)` until the Armijo
//!      condition holds,
//!   4. stop on a relative reduction below `ftol`,
//!      `(f_k − f_{k+1}) / max(|f_k|, |f_{k+1}|, 1) ≤ ftol`.
//!
//! The first step of a fresh memory is scaled so that no component moves
//! by more than one unit.

use std::collections::VecDeque;

use ice_types::error::{IceError, IceResult};

use crate::vector::{dot, norm_inf};

/// Configuration for the bounded L-BFGS minimizer.
#[derive(Debug, Clone)]
pub struct LbfgsConfig {
    /// Number of stored correction pairs (default: 10).
    pub memory: usize,
    /// Maximum number of iterations (default: 50).
    pub max_iterations: usize,
    /// Relative function reduction tolerance (default: 1e-9).
    pub ftol: f64,
    /// Projected-gradient tolerance, ∞-norm (default: 1e-8).
    pub gtol: f64,
    /// Maximum backtracking steps per line search (default: 20).
    pub max_line_search: usize,
    /// Armijo sufficient-decrease constant (default: 1e-4).
    pub armijo: f64,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        LbfgsConfig {
            memory: 10,
            max_iterations: 50,
            ftol: 1e-9,
            gtol: 1e-8,
            max_line_search: 20,
            armijo: 1e-4,
        }
    }
}

/// Why the minimizer returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Projected gradient or relative reduction below tolerance.
    Converged,
    /// `max_iterations` reached.
    IterationCap,
    /// No step along the search direction decreased the objective.
    LineSearchFailed,
}

#[derive(Debug, Clone)]
pub struct LbfgsResult {
    pub x: Vec<f64>,
    pub f: f64,
    pub gradient: Vec<f64>,
    pub iterations: usize,
    /// Number of objective/gradient evaluations.
    pub evaluations: usize,
    pub stop: StopReason,
    pub projected_gradient_norm: f64,
    /// Objective at the start point and at every accepted iterate.
    pub history: Vec<f64>,
}

/// Clamp `x` into the box.
pub fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.max(lo).min(hi);
    }
}

/// Gradient with components zeroed where a bound blocks descent.
pub fn projected_gradient(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(g)
        .zip(bounds)
        .map(|((&xi, &gi), &(lo, hi))| {
            if (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0) {
                0.0
            } else {
                gi
            }
        })
        .collect()
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Two-loop recursion restricted to the free variables.
fn two_loop(g: &[f64], free: &[bool], memory: &VecDeque<Correction>) -> Vec<f64> {
    let masked_dot = |a: &[f64], b: &[f64]| -> f64 {
        a.iter()
            .zip(b)
            .zip(free)
            .filter(|(_, f)| **f)
            .map(|((x, y), _)| x * y)
            .sum()
    };

    let mut q: Vec<f64> = g
        .iter()
        .zip(free)
        .map(|(&gi, &f)| if f { gi } else { 0.0 })
        .collect();
    let mut alphas = Vec::with_capacity(memory.len());
    for c in memory.iter().rev() {
        let a = c.rho * masked_dot(&c.s, &q);
        for ((qi, yi), &f) in q.iter_mut().zip(&c.y).zip(free) {
            if f {
                *qi -= a * yi;
            }
        }
        alphas.push(a);
    }

    if let Some(last) = memory.back() {
        let yy = masked_dot(&last.y, &last.y);
        let sy = masked_dot(&last.s, &last.y);
        if yy > 0.0 && sy > 0.0 {
            let gamma = sy / yy;
            q.iter_mut().for_each(|v| *v *= gamma);
        }
    }

    for (c, a) in memory.iter().zip(alphas.into_iter().rev()) {
        let b = c.rho * masked_dot(&c.y, &q);
        for ((qi, si), &f) in q.iter_mut().zip(&c.s).zip(free) {
            if f {
                *qi += (a - b) * si;
            }
        }
    }

    q.iter_mut().for_each(|v| *v = -*v);
    q
}

/// Minimize `objective` over the box `bounds` starting from `x0`.
///
/// `objective` returns the value and gradient at a point; its errors
/// abort the minimization and are propagated unchanged.
pub fn minimize_bounded<F>(
    mut objective: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &LbfgsConfig,
) -> IceResult<LbfgsResult>
where
    F: FnMut(&[f64]) -> IceResult<(f64, Vec<f64>)>,
{
    let n = x0.len();
    if bounds.len() != n {
        return Err(IceError::ConfigError(format!(
            "bounds length {} does not match {} controls",
            bounds.len(),
            n
        )));
    }
    if let Some((lo, hi)) = bounds.iter().find(|(lo, hi)| lo > hi) {
        return Err(IceError::ConfigError(format!(
            "lower bound {lo} exceeds upper bound {hi}"
        )));
    }

    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let (mut f, mut g) = objective(&x)?;
    let mut evaluations = 1;
    let mut history = vec![f];
    let mut memory: VecDeque<Correction> = VecDeque::with_capacity(config.memory);
    let mut stop = StopReason::IterationCap;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        let pg = projected_gradient(&x, &g, bounds);
        let pg_norm = norm_inf(&pg);
        if pg_norm <= config.gtol {
            stop = StopReason::Converged;
            break;
        }

        let free: Vec<bool> = pg
            .iter()
            .zip(&x)
            .zip(bounds)
            .map(|((&p, &xi), &(lo, hi))| p != 0.0 || (xi > lo && xi < hi))
            .collect();
        let mut d = two_loop(&g, &free, &memory);
        if !(dot(&g, &d) < 0.0) {
            memory.clear();
            d = pg.iter().map(|v| -v).collect();
        }

        let mut t = if memory.is_empty() {
            (1.0 / norm_inf(&d)).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..=config.max_line_search {
            let mut x_new: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + t * di).collect();
            project(&mut x_new, bounds);
            let step: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
            if norm_inf(&step) == 0.0 {
                break;
            }
            let (f_new, g_new) = objective(&x_new)?;
            evaluations += 1;
            if f_new.is_finite() && f_new <= f + config.armijo * dot(&g, &step) {
                accepted = Some((x_new, f_new, g_new, step));
                break;
            }
            t *= 0.5;
        }

        let Some((x_new, f_new, g_new, s)) = accepted else {
            stop = StopReason::LineSearchFailed;
            break;
        };
        iterations = iter + 1;

        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 * dot(&y, &y) {
            if memory.len() == config.memory.max(1) {
                memory.pop_front();
            }
            memory.push_back(Correction { s, y, rho: 1.0 / sy });
        }

        let reduction = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
        tracing::debug!(iteration = iterations, f = f_new, pg_norm, t, "L-BFGS iterate");
        x = x_new;
        f = f_new;
        g = g_new;
        history.push(f);

        if reduction <= config.ftol {
            stop = StopReason::Converged;
            break;
        }
    }

    let projected_gradient_norm = norm_inf(&projected_gradient(&x, &g, bounds));
    Ok(LbfgsResult {
        x,
        f,
        gradient: g,
        iterations,
        evaluations,
        stop,
        projected_gradient_norm,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded(n: usize) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); n]
    }

    /// f = Σ w_i (x_i − c_i)²
    fn quadratic(w: Vec<f64>, c: Vec<f64>) -> impl FnMut(&[f64]) -> IceResult<(f64, Vec<f64>)> {
        move |x: &[f64]| {
            let f = x
                .iter()
                .zip(&w)
                .zip(&c)
                .map(|((xi, wi), ci)| wi * (xi - ci).powi(2))
                .sum();
            let g = x
                .iter()
                .zip(&w)
                .zip(&c)
                .map(|((xi, wi), ci)| 2.0 * wi * (xi - ci))
                .collect();
            Ok((f, g))
        }
    }

    #[test]
    fn test_unbounded_quadratic() {
        let w = vec![1.0, 10.0, 100.0];
        let c = vec![1.0, -2.0, 0.5];
        let res = minimize_bounded(
            quadratic(w, c.clone()),
            &[0.0; 3],
            &unbounded(3),
            &LbfgsConfig::default(),
        )
        .unwrap();
        assert_eq!(res.stop, StopReason::Converged);
        for (xi, ci) in res.x.iter().zip(&c) {
            assert!((xi - ci).abs() < 1e-4, "{xi} vs {ci}");
        }
        assert_eq!(res.history.len(), res.iterations + 1);
        assert!(res.history.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_rosenbrock() {
        let rosen = |x: &[f64]| -> IceResult<(f64, Vec<f64>)> {
            let (a, b) = (x[0], x[1]);
            let f = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
            let g = vec![
                -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
                200.0 * (b - a * a),
            ];
            Ok((f, g))
        };
        let cfg = LbfgsConfig {
            max_iterations: 500,
            ftol: 0.0,
            gtol: 1e-7,
            ..LbfgsConfig::default()
        };
        let res = minimize_bounded(rosen, &[-1.2, 1.0], &unbounded(2), &cfg).unwrap();
        assert!((res.x[0] - 1.0).abs() < 1e-3, "x = {:?}", res.x);
        assert!((res.x[1] - 1.0).abs() < 1e-3, "x = {:?}", res.x);
    }

    #[test]
    fn test_active_bounds() {
        let c = vec![3.0, -3.0, 0.25];
        let bounds = vec![(-1.0, 1.0); 3];
        let res = minimize_bounded(
            quadratic(vec![1.0, 2.0, 3.0], c),
            &[0.0; 3],
            &bounds,
            &LbfgsConfig::default(),
        )
        .unwrap();
        assert!((res.x[0] - 1.0).abs() < 1e-12);
        assert!((res.x[1] + 1.0).abs() < 1e-12);
        assert!((res.x[2] - 0.25).abs() < 1e-3);
        assert!(res.projected_gradient_norm < 1e-2);
    }

    #[test]
    fn test_start_outside_box_is_projected() {
        let bounds = vec![(0.0, 2.0)];
        let mut seen = Vec::new();
        let obj = |x: &[f64]| -> IceResult<(f64, Vec<f64>)> {
            seen.push(x[0]);
            Ok(((x[0] - 1.0).powi(2), vec![2.0 * (x[0] - 1.0)]))
        };
        let res = minimize_bounded(obj, &[10.0], &bounds, &LbfgsConfig::default()).unwrap();
        assert!((res.x[0] - 1.0).abs() < 1e-6);
        assert!(seen.iter().all(|v| (0.0..=2.0).contains(v)));
    }

    #[test]
    fn test_iteration_cap() {
        let cfg = LbfgsConfig {
            max_iterations: 1,
            ..LbfgsConfig::default()
        };
        let res = minimize_bounded(
            quadratic(vec![1.0, 1000.0], vec![5.0, 5.0]),
            &[0.0, 0.0],
            &unbounded(2),
            &cfg,
        )
        .unwrap();
        assert_eq!(res.stop, StopReason::IterationCap);
        assert_eq!(res.iterations, 1);
    }

    #[test]
    fn test_objective_error_propagates() {
        let obj = |_: &[f64]| -> IceResult<(f64, Vec<f64>)> {
            Err(IceError::ConvergenceFailure {
                iterations: 3,
                residual: 1.0,
            })
        };
        let err = minimize_bounded(obj, &[0.0], &unbounded(1), &LbfgsConfig::default());
        assert!(matches!(err, Err(IceError::ConvergenceFailure { .. })));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = minimize_bounded(
            quadratic(vec![1.0], vec![0.0]),
            &[0.0],
            &[(1.0, -1.0)],
            &LbfgsConfig::default(),
        );
        assert!(matches!(err, Err(IceError::ConfigError(_))));
    }
}
