use thiserror::Error;

#[derive(Error, Debug)]
pub enum IceError {
    #[error("Nonlinear solve did not converge after {iterations} iterations (residual {residual:.3e})")]
    ConvergenceFailure { iterations: usize, residual: f64 },

    #[error("Linear solve failed after {iterations} iterations (residual {residual:.3e}): {message}")]
    LinearSolveFailure {
        iterations: usize,
        residual: f64,
        message: String,
    },

    #[error("Missing observation data: {0}")]
    MissingObservationData(String),

    #[error("Field '{name}' has length {got}, mesh expects {expected}")]
    FieldMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IceResult<T> = Result<T, IceError>;
