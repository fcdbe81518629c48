//! Error types for the numeric core.

use thiserror::Error;

/// Errors from the linear-algebra layer.
///
/// These never terminate an analysis on their own: the nonlinear solver
/// treats them as non-convergence of the current iteration and falls back to
/// its continuation strategies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Zero pivot encountered even after partial pivoting.
    #[error("matrix is singular")]
    SingularMatrix,

    /// An element stamped a NaN or infinite value.
    #[error("non-finite stamp at ({row}, {col})")]
    NonFiniteStamp { row: usize, col: usize },

    /// Matrix/vector dimensions do not agree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A stamp addressed a row or column outside the system.
    #[error("index {index} out of bounds for system of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    /// The sparsity pattern changed under a cached symbolic factorization.
    #[error("sparsity pattern changed between factorizations")]
    PatternChanged,
}

pub type Result<T> = std::result::Result<T, Error>;
