//! The transient time-stepping driver.

use std::collections::HashSet;

use indexmap::IndexMap;
use nalgebra::DVector;
use voltaic_core::MnaSystem;
use voltaic_devices::{AssembleCtx, CompiledCircuit, ControlSignal};

use crate::cancel::CancelToken;
use crate::dc::{DcConfig, dc_analysis_cancellable};
use crate::error::{Error, FailureReason};
use crate::newton::{CompSolution, PointContext, solve_with_continuation};

use super::TransientConfig;
use super::result::TransientResult;

/// Control inputs for one step: element name and the signal to apply.
pub type ControlInputs = Vec<(String, ControlSignal)>;

/// Outcome of one attempted (and possibly internally retried) step.
pub(crate) struct StepOutcome {
    /// Step size actually taken.
    pub h_used: f64,
    pub x_new: DVector<f64>,
    pub comp: CompSolution,
    pub rejects: usize,
}

/// Advance one accepted step from `t` using nominal step `h`, halving on
/// solver failure until success or `h_min` underflow. Does NOT commit
/// element state; the caller commits on acceptance.
pub(crate) fn attempt_step(
    circuit: &CompiledCircuit,
    mna: &mut MnaSystem,
    config: &TransientConfig,
    t: f64,
    h_nominal: f64,
    x_prev: &DVector<f64>,
    cancel: &CancelToken,
) -> Result<StepOutcome, Error> {
    let mut h = h_nominal;
    let mut rejects = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let point = PointContext {
            t: t + h,
            h: Some(h),
            method: config.method,
            x_prev,
        };

        match solve_with_continuation(circuit, mna, &point, x_prev, &config.newton, cancel) {
            Ok((x_new, comp, _stats)) => {
                return Ok(StepOutcome {
                    h_used: h,
                    x_new,
                    comp,
                    rejects,
                });
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                rejects += 1;
                h /= 2.0;
                log::warn!("step at t = {t:.3e} rejected ({e}); retrying with h = {h:.3e}");
                if h < config.h_min {
                    return Err(Error::StepUnderflow {
                        h,
                        h_min: config.h_min,
                    });
                }
            }
        }
    }
}

/// Branch currents of every element at a sample, for result collection.
pub(crate) fn collect_currents<'a>(
    circuit: &'a CompiledCircuit,
    x: &'a DVector<f64>,
    t: f64,
    h: f64,
    config: &TransientConfig,
) -> impl Iterator<Item = (String, f64)> + 'a {
    let ctx = AssembleCtx {
        t,
        h: Some(h),
        method: config.method,
        x_prev: x,
        x_iter: x,
        source_scale: 1.0,
    };
    circuit.elements().iter().filter_map(move |e| {
        e.branch_current(x, &ctx).map(|i| (e.name().to_string(), i))
    })
}

/// Run a transient simulation.
pub fn transient(
    circuit: &mut CompiledCircuit,
    config: &TransientConfig,
    control: Option<&mut dyn FnMut(f64) -> ControlInputs>,
) -> TransientResult {
    transient_cancellable(circuit, config, control, &CancelToken::new())
}

/// [`transient`] with an external cancellation token.
pub fn transient_cancellable(
    circuit: &mut CompiledCircuit,
    config: &TransientConfig,
    mut control: Option<&mut dyn FnMut(f64) -> ControlInputs>,
    cancel: &CancelToken,
) -> TransientResult {
    let node_names: IndexMap<String, usize> = circuit
        .node_names()
        .map(|(n, i)| (n.to_string(), i))
        .collect();
    let mut result = TransientResult::new(node_names);

    for name in circuit.pwl_coverage_gaps(config.t_stop) {
        result.diagnostics.push(format!(
            "PWL source {name} does not cover [0, {}]; clamping to its endpoints",
            config.t_stop
        ));
    }

    // Initial state: DC operating point, or element ICs.
    let x0 = if config.use_ic {
        DVector::zeros(circuit.size())
    } else {
        let dc = dc_analysis_cancellable(
            circuit,
            &DcConfig {
                newton: config.newton,
            },
            cancel,
        );
        if !dc.converged {
            result.converged = false;
            result.failure = dc.failure;
            result
                .diagnostics
                .push("DC operating point failed; transient not started".to_string());
            return result;
        }
        dc.solution().clone()
    };
    circuit.init_state(&x0, config.use_ic);

    let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
    let mut x_prev = x0;
    let mut t = 0.0_f64;
    let mut h = config.h;
    let h_max = config.max_step.unwrap_or(config.h);
    let mut warned_controls: HashSet<String> = HashSet::new();

    if config.t_start <= 0.0 {
        let currents: Vec<_> = collect_currents(circuit, &x_prev, 0.0, h, config).collect();
        result.push_sample(0.0, x_prev.clone(), currents.into_iter());
    }

    while t < config.t_stop * (1.0 - 1e-12) {
        if cancel.is_cancelled() {
            result.converged = false;
            result.failure = Some(FailureReason::Cancelled);
            result
                .diagnostics
                .push(format!("cancelled at t = {t:.6e}; partial results returned"));
            break;
        }

        h = h.clamp(config.h_min, h_max);
        if t + h > config.t_stop {
            h = config.t_stop - t;
        }

        // External control is applied before the assembly of this step.
        if let Some(cb) = control.as_mut() {
            for (name, signal) in cb(t + h) {
                if !circuit.set_control(&name, signal) && warned_controls.insert(name.clone()) {
                    result
                        .diagnostics
                        .push(format!("control references unknown element {name}"));
                }
            }
        }

        let snapshot = circuit.snapshot();
        let outcome = match attempt_step(circuit, &mut mna, config, t, h, &x_prev, cancel) {
            Ok(o) => o,
            Err(e) => {
                circuit.restore(&snapshot);
                result.converged = false;
                result.failure = Some(match e {
                    Error::StepUnderflow { .. } => FailureReason::StepRejectedBelowMin,
                    ref other => other.reason(),
                });
                result
                    .diagnostics
                    .push(format!("transient stopped at t = {t:.6e}: {e}"));
                break;
            }
        };
        result.steps_rejected += outcome.rejects;

        // Optional LTE-based step control on the candidate solution.
        if config.adaptive {
            let lte = circuit.max_lte(&outcome.x_new, outcome.h_used);
            let x_ref = outcome.x_new.amax();
            let tol = config.lte_abstol.max(config.lte_reltol * x_ref);
            if lte > tol && outcome.h_used > config.h_min {
                result.steps_rejected += 1;
                circuit.restore(&snapshot);
                let factor = (tol / lte).sqrt().min(0.5);
                h = (outcome.h_used * factor.max(0.1)).max(config.h_min);
                continue;
            }
            if lte < tol * 0.5 {
                let factor = (tol / lte.max(1e-20)).sqrt().min(2.0);
                h = (outcome.h_used * factor.min(1.5)).min(h_max);
            } else {
                h = outcome.h_used;
            }
        }

        // Accept: commit element state atomically, then sample.
        circuit.store_comp_solution(&outcome.comp.z, &outcome.comp.w);
        circuit.commit(&outcome.x_new, outcome.h_used, config.method);
        t += outcome.h_used;
        x_prev = outcome.x_new;
        result.steps_accepted += 1;
        result.min_step_used = result.min_step_used.min(outcome.h_used);
        result.max_step_used = result.max_step_used.max(outcome.h_used);

        if t >= config.t_start * (1.0 - 1e-12) {
            let currents: Vec<_> =
                collect_currents(circuit, &x_prev, t, outcome.h_used, config).collect();
            result.push_sample(t, x_prev.clone(), currents.into_iter());
        }
    }

    result
}
