//! Solver-internal errors and the user-visible failure taxonomy.
//!
//! Internally the solve path propagates [`Error`]; analysis entry points
//! never leak it. They map the terminal error to a [`FailureReason`] on the
//! returned result, per the propagation policy: numerical trouble is data,
//! not an exception.

use thiserror::Error;

/// Internal solver errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Linear(#[from] voltaic_core::Error),

    #[error("newton iteration limit ({limit}) reached")]
    IterationLimit { limit: usize },

    #[error("LCP terminated on a ray (indefinite M)")]
    LcpUnbounded,

    #[error("LCP pivot limit reached")]
    LcpIterationLimit,

    #[error("continuation exhausted without convergence")]
    ContinuationExhausted,

    #[error("step size underflow: h = {h} below h_min = {h_min}")]
    StepUnderflow { h: f64, h_min: f64 },

    #[error("cancelled")]
    Cancelled,
}

/// Structured reason attached to a non-converged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("singular matrix")]
    SingularMatrix,
    #[error("iteration limit")]
    IterationLimit,
    #[error("LCP failed")]
    LcpFailed,
    #[error("step rejected below minimum step size")]
    StepRejectedBelowMin,
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Collapse an internal error to the reported reason.
    pub fn reason(&self) -> FailureReason {
        match self {
            Error::Linear(voltaic_core::Error::SingularMatrix) => FailureReason::SingularMatrix,
            Error::Linear(_) => FailureReason::SingularMatrix,
            Error::IterationLimit { .. } | Error::ContinuationExhausted => {
                FailureReason::IterationLimit
            }
            Error::LcpUnbounded | Error::LcpIterationLimit => FailureReason::LcpFailed,
            Error::StepUnderflow { .. } => FailureReason::StepRejectedBelowMin,
            Error::Cancelled => FailureReason::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
