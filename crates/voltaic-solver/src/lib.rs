//! Nonlinear, complementarity, and transient solvers for Voltaic.
//!
//! Layering, bottom up:
//! - [`lcp`]: Lemke complementary pivoting for piecewise-linear switches
//! - [`newton`]: damped Newton-Raphson with Gmin stepping and source
//!   stepping continuation; switching elements couple in through the LCP
//! - [`dc`]: DC operating point and DC sweep
//! - [`transient`]: fixed/adaptive time stepping, the externally-stepped
//!   variant, and result collection
//! - [`measure`]: waveform statistics and zero-crossing location over
//!   transient results
//!
//! Numerical trouble is reported on the returned results (`converged`,
//! [`error::FailureReason`]); errors are reserved for programmer mistakes.

pub mod cancel;
pub mod dc;
pub mod error;
pub mod lcp;
pub mod measure;
pub mod newton;
pub mod transient;

pub use cancel::CancelToken;
pub use dc::{DcConfig, DcResult, DcSweepConfig, DcSweepResult, dc_analysis, dc_sweep};
pub use error::{Error, FailureReason, Result};
pub use lcp::{LcpConfig, LcpOutcome, LcpSolution, complementarity_residual, solve_lcp};
pub use measure::{Edge, MeasureError, Signal, Stat, crossing_time, delay_between, statistic, value_at};
pub use newton::{ConvergenceCriteria, NewtonConfig, NewtonStats, SolverStrategy};
pub use transient::driver::ControlInputs;
pub use transient::{
    StepResult, SteppedTransient, TimePoint, TransientConfig, TransientResult, transient,
    transient_cancellable,
};
