//! Element library and circuit compilation for Voltaic.
//!
//! This crate provides:
//! - Passive elements: R, C, L, K mutual coupling
//! - Sources: independent V/I with DC/SIN/PULSE/EXP/PWL/AC waveforms,
//!   controlled E/F/G/H sources
//! - Switching elements: Shockley and complementarity diodes, square-law
//!   and PWL-switch MOSFETs with body diode
//! - Transformers: ideal (constraint rows) and multi-winding (flattened to
//!   coupled inductors at compile time)
//! - [`circuit::Circuit`] and [`circuit::CompiledCircuit`]: the container
//!   and the index-bound form consumed by the solvers

pub mod circuit;
pub mod companion;
pub mod controlled;
pub mod coupling;
pub mod diode;
pub mod element;
pub mod error;
pub mod mosfet;
pub mod node;
pub mod passive;
pub mod source;
pub mod transformer;
pub mod waveform;

pub use circuit::{Circuit, CompiledCircuit};
pub use companion::IntegrationMethod;
pub use controlled::{Cccs, Ccvs, Vccs, Vcvs};
pub use coupling::Coupling;
pub use diode::{Diode, DiodeModel};
pub use element::{
    AssembleCtx, CompPairSpec, ControlSignal, Element, ElementState, ExtraVarKind, SwitchState,
    volt,
};
pub use error::{Error, Result};
pub use mosfet::{Mosfet, MosfetModel, Region};
pub use node::{GROUND, Terminal};
pub use passive::{Capacitor, Inductor, Resistor};
pub use source::{CurrentSource, VoltageSource};
pub use transformer::{IdealTransformer, Transformer, Winding};
pub use waveform::Waveform;
