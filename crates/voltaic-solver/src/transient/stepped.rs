//! Externally-stepped transient simulation.
//!
//! Same solver as [`super::driver::transient`], with the time loop handed to
//! the caller. This is the integration point for external controllers: the
//! caller feeds gate/level signals into [`SteppedTransient::step`], which
//! applies them before the next assembly and returns the solved state of
//! that one step.

use indexmap::IndexMap;
use nalgebra::DVector;
use voltaic_core::MnaSystem;
use voltaic_devices::{CompiledCircuit, ControlSignal, SwitchState};

use crate::cancel::CancelToken;
use crate::dc::{DcConfig, dc_analysis_cancellable};
use crate::error::{Error, FailureReason};

use super::TransientConfig;
use super::driver::{attempt_step, collect_currents};

/// State of one accepted step, keyed by element/node names.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub t: f64,
    pub node_voltages: IndexMap<String, f64>,
    pub branch_currents: IndexMap<String, f64>,
    pub component_states: IndexMap<String, SwitchState>,
}

/// A transient simulation advanced one step at a time.
#[derive(Debug)]
pub struct SteppedTransient {
    circuit: CompiledCircuit,
    config: TransientConfig,
    mna: MnaSystem,
    cancel: CancelToken,
    x_prev: DVector<f64>,
    t: f64,
    initialized: bool,
    failed: Option<FailureReason>,
    pub steps_accepted: usize,
    pub steps_rejected: usize,
}

impl SteppedTransient {
    pub fn new(circuit: CompiledCircuit, config: TransientConfig) -> Self {
        let mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let size = circuit.size();
        Self {
            circuit,
            config,
            mna,
            cancel: CancelToken::new(),
            x_prev: DVector::zeros(size),
            t: 0.0,
            initialized: false,
            failed: None,
            steps_accepted: 0,
            steps_rejected: 0,
        }
    }

    /// Establish the starting state (DC operating point, or element ICs).
    pub fn init(&mut self) -> Result<(), FailureReason> {
        if self.config.use_ic {
            self.x_prev = DVector::zeros(self.circuit.size());
        } else {
            let dc = dc_analysis_cancellable(
                &mut self.circuit,
                &DcConfig {
                    newton: self.config.newton,
                },
                &self.cancel,
            );
            if !dc.converged {
                let reason = dc.failure.unwrap_or(FailureReason::IterationLimit);
                self.failed = Some(reason);
                return Err(reason);
            }
            self.x_prev = dc.solution().clone();
        }
        self.circuit.init_state(&self.x_prev, self.config.use_ic);
        self.initialized = true;
        Ok(())
    }

    /// Advance one step, applying `inputs` before assembly.
    pub fn step(&mut self, inputs: &[(String, ControlSignal)]) -> Result<StepResult, FailureReason> {
        if let Some(reason) = self.failed {
            return Err(reason);
        }
        if !self.initialized {
            self.init()?;
        }
        if self.is_finished() {
            return Err(self.failed.unwrap_or(FailureReason::StepRejectedBelowMin));
        }
        if self.cancel.is_cancelled() {
            self.failed = Some(FailureReason::Cancelled);
            return Err(FailureReason::Cancelled);
        }

        for (name, signal) in inputs {
            if !self.circuit.set_control(name, *signal) {
                log::warn!("control input references unknown element {name}");
            }
        }

        let mut h = self.config.h;
        if self.t + h > self.config.t_stop {
            h = self.config.t_stop - self.t;
        }

        let snapshot = self.circuit.snapshot();
        let outcome = match attempt_step(
            &self.circuit,
            &mut self.mna,
            &self.config,
            self.t,
            h,
            &self.x_prev,
            &self.cancel,
        ) {
            Ok(o) => o,
            Err(e) => {
                self.circuit.restore(&snapshot);
                let reason = match e {
                    Error::StepUnderflow { .. } => FailureReason::StepRejectedBelowMin,
                    ref other => other.reason(),
                };
                self.failed = Some(reason);
                return Err(reason);
            }
        };
        self.steps_rejected += outcome.rejects;

        self.circuit
            .store_comp_solution(&outcome.comp.z, &outcome.comp.w);
        self.circuit
            .commit(&outcome.x_new, outcome.h_used, self.config.method);
        self.t += outcome.h_used;
        self.x_prev = outcome.x_new;
        self.steps_accepted += 1;

        let node_voltages = self
            .circuit
            .node_names()
            .map(|(n, i)| (n.to_string(), self.x_prev[i]))
            .collect();
        let branch_currents = collect_currents(
            &self.circuit,
            &self.x_prev,
            self.t,
            outcome.h_used,
            &self.config,
        )
        .collect();
        let component_states = self
            .circuit
            .switch_states(&self.x_prev)
            .into_iter()
            .collect();

        Ok(StepResult {
            t: self.t,
            node_voltages,
            branch_currents,
            component_states,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.failed.is_some() || self.t >= self.config.t_stop * (1.0 - 1e-12)
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    /// Token for cooperative cancellation from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn circuit(&self) -> &CompiledCircuit {
        &self.circuit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voltaic_devices::Circuit;

    fn rc_stepper() -> SteppedTransient {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_capacitor("C1", "out", "0", 1e-6, None).unwrap();
        let circuit = c.compile().unwrap();
        let config = TransientConfig {
            t_stop: 1e-3,
            h: 10e-6,
            use_ic: true,
            ..Default::default()
        };
        SteppedTransient::new(circuit, config)
    }

    #[test]
    fn steps_until_finished() {
        let mut sim = rc_stepper();
        sim.init().unwrap();
        let mut last = None;
        while !sim.is_finished() {
            last = Some(sim.step(&[]).unwrap());
        }
        let last = last.unwrap();
        assert_relative_eq!(last.t, 1e-3, max_relative = 1e-9);
        // One tau of charging.
        let expected = 5.0 * (1.0 - (-1.0_f64).exp());
        let v = last.node_voltages["out"];
        assert!((v - expected).abs() < 0.2, "V(out) = {v}");
        assert_eq!(sim.steps_accepted, 100);
    }

    #[test]
    fn level_input_overrides_source() {
        let mut sim = rc_stepper();
        sim.init().unwrap();
        // Drive the source to 0: the capacitor stays discharged.
        let result = sim
            .step(&[("V1".to_string(), ControlSignal::Level(0.0))])
            .unwrap();
        assert!(result.node_voltages["out"].abs() < 1e-9);
        assert!(result.node_voltages["in"].abs() < 1e-9);
    }

    #[test]
    fn switch_states_reported() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 10.0).unwrap();
        c.add_mosfet_switch("M1", "in", "gate", "sw", 2.0, 0.01, 1e6)
            .unwrap();
        c.add_resistor("RL", "sw", "0", 10.0).unwrap();
        let circuit = c.compile().unwrap();
        let config = TransientConfig {
            t_stop: 1e-4,
            h: 1e-6,
            use_ic: true,
            ..Default::default()
        };
        let mut sim = SteppedTransient::new(circuit, config);
        sim.init().unwrap();

        let on = sim
            .step(&[("M1".to_string(), ControlSignal::Gate(true))])
            .unwrap();
        let state = &on.component_states["M1"];
        assert_eq!(state.gate_on, Some(true));
        assert_relative_eq!(on.node_voltages["sw"], 10.0 * 10.0 / 10.01, epsilon = 1e-3);

        let off = sim
            .step(&[("M1".to_string(), ControlSignal::Gate(false))])
            .unwrap();
        assert_eq!(off.component_states["M1"].gate_on, Some(false));
        assert!(off.node_voltages["sw"] < 0.1);
    }

    #[test]
    fn cancelled_step_reports_reason() {
        let mut sim = rc_stepper();
        sim.init().unwrap();
        sim.cancel();
        assert_eq!(sim.step(&[]), Err(FailureReason::Cancelled));
    }
}
