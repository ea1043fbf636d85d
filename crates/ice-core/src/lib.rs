//! Shallow-shelf ice-flow model: domain labelling, momentum balance,
//! Newton solve, adjoint inversion and the Laplacian prior.

pub mod adjoint;
pub mod domain;
pub mod inversion;
pub mod io;
pub mod momentum;
pub mod prior;
pub mod solver;
pub mod synthetic;

pub use inversion::{invert, invert_with_rng, InversionResult};
pub use prior::{build_prior, Laplacian};
pub use solver::{solve, solve_with_rng, NewtonReport};
