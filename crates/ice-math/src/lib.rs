//! Numerical kernels for the SSA ice-flow workspace: CSR matrices,
//! SSOR-preconditioned Krylov solvers, the square-root series and the
//! bound-constrained L-BFGS minimizer.

pub mod cg;
pub mod gmres;
pub mod lbfgs;
pub mod sor;
pub mod sparse;
pub mod sqrt_series;
pub mod vector;
