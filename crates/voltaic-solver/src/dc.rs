//! DC operating point and DC sweep.

use indexmap::IndexMap;
use nalgebra::DVector;
use voltaic_core::MnaSystem;
use voltaic_devices::companion::IntegrationMethod;
use voltaic_devices::{AssembleCtx, CompiledCircuit, ControlSignal};

use crate::cancel::CancelToken;
use crate::error::FailureReason;
use crate::newton::{NewtonConfig, PointContext, SolverStrategy, solve_with_continuation};

/// DC analysis configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcConfig {
    pub newton: NewtonConfig,
}

/// DC operating point result.
///
/// Failure is data: `converged == false` plus a [`FailureReason`], never a
/// panic or an `Err` for numerical trouble.
#[derive(Debug, Clone)]
pub struct DcResult {
    pub converged: bool,
    pub failure: Option<FailureReason>,
    pub iterations: usize,
    pub solver_used: SolverStrategy,
    pub diagnostics: Vec<String>,
    solution: DVector<f64>,
    node_voltages: IndexMap<String, f64>,
    branch_currents: IndexMap<String, f64>,
}

impl DcResult {
    /// Voltage at a named node; ground reads 0, unknown names `None`.
    pub fn node_voltage(&self, name: &str) -> Option<f64> {
        if name == voltaic_devices::GROUND {
            return Some(0.0);
        }
        self.node_voltages.get(name).copied()
    }

    /// Branch current of a named element.
    pub fn branch_current(&self, name: &str) -> Option<f64> {
        self.branch_currents.get(name).copied()
    }

    /// The raw solution vector (node voltages then extra variables).
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    pub fn node_voltages(&self) -> &IndexMap<String, f64> {
        &self.node_voltages
    }

    pub fn branch_currents(&self) -> &IndexMap<String, f64> {
        &self.branch_currents
    }
}

fn collect_result(
    circuit: &CompiledCircuit,
    x: &DVector<f64>,
    converged: bool,
    failure: Option<FailureReason>,
    iterations: usize,
    solver_used: SolverStrategy,
    diagnostics: Vec<String>,
) -> DcResult {
    let ctx = AssembleCtx {
        t: 0.0,
        h: None,
        method: IntegrationMethod::BackwardEuler,
        x_prev: x,
        x_iter: x,
        source_scale: 1.0,
    };
    let node_voltages = circuit
        .node_names()
        .map(|(name, idx)| (name.to_string(), x[idx]))
        .collect();
    let branch_currents = circuit
        .elements()
        .iter()
        .filter_map(|e| {
            e.branch_current(x, &ctx)
                .map(|i| (e.name().to_string(), i))
        })
        .collect();
    DcResult {
        converged,
        failure,
        iterations,
        solver_used,
        diagnostics,
        solution: x.clone(),
        node_voltages,
        branch_currents,
    }
}

/// Compute the DC operating point.
///
/// Capacitors are open, inductors are (micro-resistance) shorts, waveform
/// sources sit at their held DC values, and the continuation ladder engages
/// automatically on Newton failure.
pub fn dc_analysis(circuit: &mut CompiledCircuit, config: &DcConfig) -> DcResult {
    dc_analysis_cancellable(circuit, config, &CancelToken::new())
}

/// [`dc_analysis`] with an external cancellation token.
pub fn dc_analysis_cancellable(
    circuit: &mut CompiledCircuit,
    config: &DcConfig,
    cancel: &CancelToken,
) -> DcResult {
    let size = circuit.size();
    if size == 0 {
        return collect_result(
            circuit,
            &DVector::zeros(0),
            true,
            None,
            0,
            SolverStrategy::Direct,
            Vec::new(),
        );
    }

    let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
    let x0 = DVector::zeros(size);
    let point = PointContext {
        t: 0.0,
        h: None,
        method: IntegrationMethod::BackwardEuler,
        x_prev: &x0,
    };

    match solve_with_continuation(circuit, &mut mna, &point, &x0, &config.newton, cancel) {
        Ok((x, comp, stats)) => {
            circuit.store_comp_solution(&comp.z, &comp.w);
            collect_result(
                circuit,
                &x,
                true,
                None,
                stats.iterations,
                stats.strategy,
                Vec::new(),
            )
        }
        Err(e) => {
            log::warn!("DC operating point failed: {e}");
            collect_result(
                circuit,
                &x0,
                false,
                Some(e.reason()),
                0,
                SolverStrategy::Direct,
                vec![format!("dc analysis failed: {e}")],
            )
        }
    }
}

/// DC sweep specification: one source swept over a range.
#[derive(Debug, Clone)]
pub struct DcSweepConfig {
    /// Name of the swept independent source.
    pub source: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub dc: DcConfig,
}

/// Result of a DC sweep.
#[derive(Debug, Clone)]
pub struct DcSweepResult {
    pub sweep_values: Vec<f64>,
    pub points: Vec<DcResult>,
}

impl DcSweepResult {
    /// Waveform of a node voltage over the sweep.
    pub fn node_voltage(&self, name: &str) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.node_voltage(name)).collect()
    }
}

/// Sweep a source, re-solving the operating point per value.
///
/// Each point warm-starts from the previous solution; the override on the
/// swept source is released afterwards.
pub fn dc_sweep(circuit: &mut CompiledCircuit, sweep: &DcSweepConfig) -> DcSweepResult {
    let mut values = Vec::new();
    let direction = if sweep.step >= 0.0 { 1.0 } else { -1.0 };
    let mut v = sweep.start;
    loop {
        values.push(v);
        v += sweep.step;
        if direction * v > direction * sweep.stop * (1.0 + 1e-10) + 1e-30 {
            break;
        }
        if sweep.step == 0.0 {
            break;
        }
    }

    let cancel = CancelToken::new();
    let mut points = Vec::with_capacity(values.len());
    let size = circuit.size();
    let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
    let mut x_warm = DVector::zeros(size);

    for &value in &values {
        circuit.set_control(&sweep.source, ControlSignal::Level(value));
        let point_ctx = PointContext {
            t: 0.0,
            h: None,
            method: IntegrationMethod::BackwardEuler,
            x_prev: &x_warm,
        };
        let result = match solve_with_continuation(
            circuit,
            &mut mna,
            &point_ctx,
            &x_warm,
            &sweep.dc.newton,
            &cancel,
        ) {
            Ok((x, comp, stats)) => {
                circuit.store_comp_solution(&comp.z, &comp.w);
                let r = collect_result(
                    circuit,
                    &x,
                    true,
                    None,
                    stats.iterations,
                    stats.strategy,
                    Vec::new(),
                );
                x_warm = x;
                r
            }
            Err(e) => collect_result(
                circuit,
                &x_warm,
                false,
                Some(e.reason()),
                0,
                SolverStrategy::Direct,
                vec![format!("sweep point {value} failed: {e}")],
            ),
        };
        points.push(result);
    }

    circuit.set_control(&sweep.source, ControlSignal::Release);

    DcSweepResult {
        sweep_values: values,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voltaic_devices::Circuit;

    #[test]
    fn divider_operating_point() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "n1", 1e3).unwrap();
        c.add_resistor("R2", "n1", "0", 2e3).unwrap();
        let mut circuit = c.compile().unwrap();

        let result = dc_analysis(&mut circuit, &DcConfig::default());
        assert!(result.converged);
        assert_relative_eq!(
            result.node_voltage("n1").unwrap(),
            10.0 / 3.0,
            epsilon = 1e-3
        );
        assert_relative_eq!(result.node_voltage("0").unwrap(), 0.0);
        // Source branch current: 5V across 3k total.
        assert_relative_eq!(
            result.branch_current("V1").unwrap(),
            -5.0 / 3e3,
            max_relative = 1e-6
        );
    }

    #[test]
    fn inductor_is_dc_short() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 1.0).unwrap();
        c.add_inductor("L1", "in", "out", 1e-3, None, None).unwrap();
        c.add_resistor("R1", "out", "0", 10.0).unwrap();
        let mut circuit = c.compile().unwrap();

        let result = dc_analysis(&mut circuit, &DcConfig::default());
        assert!(result.converged);
        assert_relative_eq!(result.node_voltage("out").unwrap(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(
            result.branch_current("L1").unwrap(),
            0.1,
            max_relative = 1e-6
        );
    }

    #[test]
    fn capacitor_is_dc_open() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_capacitor("C1", "out", "0", 1e-6, None).unwrap();
        let mut circuit = c.compile().unwrap();

        let result = dc_analysis(&mut circuit, &DcConfig::default());
        assert!(result.converged);
        // No DC path from "out": it floats to the source voltage.
        assert_relative_eq!(result.node_voltage("out").unwrap(), 5.0, epsilon = 1e-3);
    }

    #[test]
    fn sweep_resistive_divider() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 0.0).unwrap();
        c.add_resistor("R1", "in", "n1", 1e3).unwrap();
        c.add_resistor("R2", "n1", "0", 1e3).unwrap();
        let mut circuit = c.compile().unwrap();

        let sweep = DcSweepConfig {
            source: "V1".to_string(),
            start: 0.0,
            stop: 4.0,
            step: 1.0,
            dc: DcConfig::default(),
        };
        let result = dc_sweep(&mut circuit, &sweep);
        assert_eq!(result.sweep_values.len(), 5);
        for (i, p) in result.points.iter().enumerate() {
            assert!(p.converged);
            assert_relative_eq!(
                p.node_voltage("n1").unwrap(),
                i as f64 / 2.0,
                epsilon = 1e-6
            );
        }

        // Override released: the original DC value applies again.
        let after = dc_analysis(&mut circuit, &DcConfig::default());
        assert_relative_eq!(after.node_voltage("n1").unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn nonconvergence_is_reported_not_thrown() {
        // A lone current source into a node with nothing but Gmin cannot
        // produce a healthy solve at the default tolerances, but must still
        // come back as a result, not a panic.
        let mut c = Circuit::new();
        c.add_current_source("I1", "0", "n1", voltaic_devices::Waveform::dc(1.0))
            .unwrap();
        let mut circuit = c.compile().unwrap();

        let result = dc_analysis(&mut circuit, &DcConfig::default());
        // Gmin keeps the matrix nonsingular, so this actually converges to
        // a huge node voltage; either way the call returns a result.
        let _ = result.converged;
    }
}
