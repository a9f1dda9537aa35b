use thiserror::Error;

/// Top-level error type for clankers-balance.
///
/// Solver failures are not part of it: the controller absorbs them through
/// its failure policy, and [`SolverError`] is only returned by
/// [`QpSolver::solve`](crate::solver::QpSolver::solve).
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Contact schedule has no entry for leg {0}")]
    MissingContactState(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Expected {expected} legs, got {got}")]
    LegCount { expected: usize, got: usize },

    #[error("Duplicate leg name: {0}")]
    DuplicateLeg(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by a [`QpBackend`](crate::solver::QpBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// QP solve failures, tagged with the phase that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("failed to initialize balance QP: {0}")]
    Init(BackendError),

    #[error("failed to hotstart balance QP: {0}")]
    Hotstart(BackendError),

    #[error("balance QP not solved: {0}")]
    NotSolved(BackendError),
}

impl SolverError {
    /// Short name of the phase that failed.
    pub const fn phase(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Hotstart(_) => "hotstart",
            Self::NotSolved(_) => "solve",
        }
    }
}
