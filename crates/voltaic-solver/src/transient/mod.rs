//! Transient analysis engine.
//!
//! The driver runs the per-step state machine (refresh histories, assemble,
//! solve Newton + LCP, commit, sample), halving the step and retrying on
//! failure, with an optional LTE-based adaptive step control.
//!
//! Two front doors share the same machinery:
//! - [`driver::transient`]: the closed loop over `[0, t_stop]`
//! - [`stepped::SteppedTransient`]: the same solver with the loop
//!   externalized, for callers that drive PWM gates step by step

pub mod driver;
pub mod result;
pub mod stepped;

use voltaic_devices::companion::IntegrationMethod;

use crate::newton::NewtonConfig;

pub use driver::{transient, transient_cancellable};
pub use result::{TimePoint, TransientResult};
pub use stepped::{SteppedTransient, StepResult};

/// Transient analysis configuration.
#[derive(Debug, Clone, Copy)]
pub struct TransientConfig {
    /// First sampled time; the simulation itself always starts at 0.
    pub t_start: f64,
    pub t_stop: f64,
    /// Nominal (fixed-mode) or initial (adaptive-mode) step.
    pub h: f64,
    pub method: IntegrationMethod,
    /// Cap on the step size; defaults to `h` when `None`.
    pub max_step: Option<f64>,
    /// Fatal threshold for step halving.
    pub h_min: f64,
    /// Enable local-truncation-error step control.
    pub adaptive: bool,
    pub lte_reltol: f64,
    pub lte_abstol: f64,
    /// Start from element initial conditions instead of the DC point.
    pub use_ic: bool,
    pub newton: NewtonConfig,
}

impl Default for TransientConfig {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_stop: 1e-3,
            h: 1e-6,
            method: IntegrationMethod::BackwardEuler,
            max_step: None,
            h_min: 1e-15,
            adaptive: false,
            lte_reltol: 1e-3,
            lte_abstol: 1e-6,
            use_ic: false,
            newton: NewtonConfig::default(),
        }
    }
}

impl TransientConfig {
    /// Fixed-step configuration over `[0, t_stop]`.
    pub fn fixed(t_stop: f64, h: f64) -> Self {
        Self {
            t_stop,
            h,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: IntegrationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_ic(mut self) -> Self {
        self.use_ic = true;
        self
    }
}
