use thiserror::Error;

/// Why the optimizer did not return a schedule.
///
/// Everything except `InvalidInput` is recoverable: the caller is expected to
/// fall back to the rule-based scheduler exactly once.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Problem is infeasible")]
    Infeasible,

    #[error("Solver timeout without feasible solution")]
    Timeout,

    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("Solver failed: {0}")]
    SolverError(String),
}

impl OptimizeError {
    /// Whether a fallback schedule should be produced instead of surfacing the error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, OptimizeError::InvalidInput(_))
    }

    /// Stable kind string for logs and persisted run records
    pub fn kind(&self) -> &'static str {
        match self {
            OptimizeError::InvalidInput(_) => "invalid_input",
            OptimizeError::Infeasible => "infeasible",
            OptimizeError::Timeout => "timeout",
            OptimizeError::SolverUnavailable(_) => "solver_unavailable",
            OptimizeError::SolverError(_) => "solver_error",
        }
    }
}

#[cfg(feature = "optimization")]
impl From<good_lp::ResolutionError> for OptimizeError {
    fn from(error: good_lp::ResolutionError) -> Self {
        use good_lp::ResolutionError;
        match error {
            ResolutionError::Infeasible => OptimizeError::Infeasible,
            ResolutionError::Unbounded => OptimizeError::SolverError("problem is unbounded".to_string()),
            ResolutionError::Other(msg) if msg.to_lowercase().contains("time limit") => {
                OptimizeError::Timeout
            }
            other => OptimizeError::SolverError(other.to_string()),
        }
    }
}
