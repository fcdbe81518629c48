//! Voltaic: a time-domain circuit simulator for switched-mode power
//! electronics.
//!
//! Given a circuit of lumped elements (passives, coupled inductors,
//! transformers, independent and controlled sources, piecewise-linear
//! switching devices), Voltaic computes the DC operating point and the
//! transient response. Switches are handled as a Linear Complementarity
//! Problem, which gives exact on/off transitions without Roff
//! regularization artifacts.
//!
//! # Example
//!
//! ```
//! use voltaic::prelude::*;
//!
//! let mut circuit = Circuit::new();
//! circuit.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
//! circuit.add_resistor("R1", "in", "out", 1e3).unwrap();
//! circuit.add_resistor("R2", "out", "0", 2e3).unwrap();
//! let mut compiled = circuit.compile().unwrap();
//!
//! let op = dc_analysis(&mut compiled, &DcConfig::default());
//! assert!(op.converged);
//! assert!((op.node_voltage("out").unwrap() - 10.0 / 3.0).abs() < 1e-6);
//! ```

pub use voltaic_core as core;
pub use voltaic_devices as devices;
pub use voltaic_solver as solver;

pub use voltaic_devices::{
    Capacitor, Cccs, Ccvs, Circuit, CompiledCircuit, ControlSignal, Coupling, Diode, DiodeModel,
    Element, IdealTransformer, Inductor, IntegrationMethod, Mosfet, MosfetModel, Region, Resistor,
    SwitchState, Terminal, Transformer, Vccs, Vcvs, VoltageSource, Waveform, Winding,
    CurrentSource, GROUND,
};
pub use voltaic_solver::{
    CancelToken, ControlInputs, DcConfig, DcResult, DcSweepConfig, DcSweepResult, Edge,
    FailureReason, NewtonConfig, Signal, Stat, StepResult, SteppedTransient, TransientConfig,
    TransientResult, crossing_time, dc_analysis, dc_sweep, delay_between, statistic, transient,
    transient_cancellable, value_at,
};

/// One-stop imports for typical simulation code.
pub mod prelude {
    pub use voltaic_devices::{
        Circuit, CompiledCircuit, ControlSignal, IntegrationMethod, Waveform, Winding,
    };
    pub use voltaic_solver::{
        CancelToken, DcConfig, DcSweepConfig, FailureReason, SteppedTransient, TransientConfig,
        dc_analysis, dc_sweep, transient, transient_cancellable,
    };
}
