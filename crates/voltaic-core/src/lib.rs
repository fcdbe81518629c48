//! Sparse MNA system container and direct linear solvers for Voltaic.
//!
//! This crate provides the numeric substrate the rest of the simulator is
//! built on:
//!
//! - [`mna::MnaSystem`]: the Modified Nodal Analysis matrix/RHS pair with
//!   triplet accumulation, stamp helpers, and Gmin injection
//! - [`linear`]: dense and sparse LU factor/solve with a size-based
//!   dispatch and a pattern-pinned cached sparse solver

pub mod error;
pub mod linear;
pub mod mna;

pub use error::{Error, Result};
pub use linear::{CachedSparseLu, SPARSE_THRESHOLD, solve_dense, solve_sparse};
pub use mna::MnaSystem;
