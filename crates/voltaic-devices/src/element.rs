//! The element sum type and its assembly contract.
//!
//! Every circuit element is one variant of [`Element`]; assembly is a single
//! dispatch over the variant. Per-element mutable state (companion history,
//! complementarity solutions) lives in the concrete records, is advanced
//! only at step commit, and is snapshot/restored around rejected steps.

use nalgebra::DVector;
use voltaic_core::MnaSystem;

use crate::companion::IntegrationMethod;
use crate::controlled::{Cccs, Ccvs, Vccs, Vcvs};
use crate::coupling::Coupling;
use crate::diode::Diode;
use crate::mosfet::{Mosfet, Region};
use crate::node::Terminal;
use crate::passive::{Capacitor, Inductor, Resistor};
use crate::source::{CurrentSource, VoltageSource};
use crate::transformer::{IdealTransformer, Transformer};

/// Node voltage from a solution vector; ground reads 0.
pub fn volt(x: &DVector<f64>, idx: Option<usize>) -> f64 {
    idx.map(|i| x[i]).unwrap_or(0.0)
}

/// Everything an element may consult while stamping.
#[derive(Debug, Clone, Copy)]
pub struct AssembleCtx<'a> {
    /// Current simulation time (s).
    pub t: f64,
    /// Step size; `None` at the DC operating point.
    pub h: Option<f64>,
    pub method: IntegrationMethod,
    /// Committed solution of the previous accepted step.
    pub x_prev: &'a DVector<f64>,
    /// Current Newton iterate.
    pub x_iter: &'a DVector<f64>,
    /// Source-stepping continuation scale in [0, 1].
    pub source_scale: f64,
}

/// Semantic kind of an extra MNA unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraVarKind {
    /// A branch current (voltage sources, inductors, transformer windings).
    BranchCurrent,
    /// The output branch of a controlled voltage source.
    ControlledOutput,
}

/// One complementarity pair exposed by a switching element.
///
/// `z >= 0` is the forward current from `anode` to `cathode`;
/// `w = vf + ron·z − (V(anode) − V(cathode)) >= 0` is the blocking margin;
/// `w·z = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompPairSpec {
    pub anode: Option<usize>,
    pub cathode: Option<usize>,
    pub vf: f64,
    pub ron: f64,
}

/// External control input for one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlSignal {
    /// Override an independent source's drive value.
    Level(f64),
    /// Drive a switch gate.
    Gate(bool),
    /// Remove any previous override.
    Release,
}

/// Reported state of a switching element at a sample point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwitchState {
    pub gate_on: Option<bool>,
    pub conducting: Option<bool>,
    pub region: Option<Region>,
}

/// Snapshot of an element's committed history, for step rollback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementState {
    None,
    /// `(v_prev, i_prev)` or `(i_prev, v_prev)` pairs of reactive elements.
    Reactive(f64, f64),
    /// `(w, z)` of a complementarity element.
    Comp(f64, f64),
}

/// A compiled circuit element.
#[derive(Debug, Clone)]
pub enum Element {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    Coupling(Coupling),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Vcvs(Vcvs),
    Vccs(Vccs),
    Cccs(Cccs),
    Ccvs(Ccvs),
    Diode(Diode),
    Mosfet(Mosfet),
    IdealTransformer(IdealTransformer),
    /// Composite; flattened away before indexing.
    Transformer(Transformer),
}

impl Element {
    pub fn name(&self) -> &str {
        match self {
            Element::Resistor(e) => &e.name,
            Element::Capacitor(e) => &e.name,
            Element::Inductor(e) => &e.name,
            Element::Coupling(e) => &e.name,
            Element::VoltageSource(e) => &e.name,
            Element::CurrentSource(e) => &e.name,
            Element::Vcvs(e) => &e.name,
            Element::Vccs(e) => &e.name,
            Element::Cccs(e) => &e.name,
            Element::Ccvs(e) => &e.name,
            Element::Diode(e) => &e.name,
            Element::Mosfet(e) => &e.name,
            Element::IdealTransformer(e) => &e.name,
            Element::Transformer(e) => &e.name,
        }
    }

    /// Whether this element must be flattened before compilation.
    pub fn is_composite(&self) -> bool {
        matches!(self, Element::Transformer(_))
    }

    /// Expand a composite into primitive elements.
    pub fn flatten(&self) -> crate::error::Result<Vec<Element>> {
        match self {
            Element::Transformer(t) => t.flatten(),
            _ => Ok(vec![self.clone()]),
        }
    }

    /// Terminals, for node collection and binding.
    pub(crate) fn terminals_mut(&mut self) -> Vec<&mut Terminal> {
        match self {
            Element::Resistor(e) => vec![&mut e.a, &mut e.b],
            Element::Capacitor(e) => vec![&mut e.a, &mut e.b],
            Element::Inductor(e) => vec![&mut e.a, &mut e.b],
            Element::Coupling(_) => vec![],
            Element::VoltageSource(e) => vec![&mut e.pos, &mut e.neg],
            Element::CurrentSource(e) => vec![&mut e.a, &mut e.b],
            Element::Vcvs(e) => vec![
                &mut e.out_pos,
                &mut e.out_neg,
                &mut e.ctrl_pos,
                &mut e.ctrl_neg,
            ],
            Element::Vccs(e) => vec![
                &mut e.out_pos,
                &mut e.out_neg,
                &mut e.ctrl_pos,
                &mut e.ctrl_neg,
            ],
            Element::Cccs(e) => vec![&mut e.out_pos, &mut e.out_neg],
            Element::Ccvs(e) => vec![&mut e.out_pos, &mut e.out_neg],
            Element::Diode(e) => vec![&mut e.anode, &mut e.cathode],
            Element::Mosfet(e) => vec![&mut e.drain, &mut e.gate, &mut e.source],
            Element::IdealTransformer(e) => {
                vec![&mut e.p_pos, &mut e.p_neg, &mut e.s_pos, &mut e.s_neg]
            }
            Element::Transformer(_) => vec![],
        }
    }

    /// Declared extra-variable demand, in order.
    pub fn extra_vars(&self) -> &'static [ExtraVarKind] {
        use ExtraVarKind::*;
        match self {
            Element::Inductor(_) => &[BranchCurrent],
            Element::VoltageSource(_) => &[BranchCurrent],
            Element::Vcvs(_) => &[ControlledOutput],
            Element::Ccvs(_) => &[ControlledOutput],
            Element::IdealTransformer(_) => &[BranchCurrent, BranchCurrent],
            _ => &[],
        }
    }

    /// Store the absolute solution rows assigned to this element's extra
    /// variables (`rows.len() == self.extra_vars().len()`).
    pub(crate) fn bind_extra_vars(&mut self, rows: &[usize]) {
        match self {
            Element::Inductor(e) => e.bind_branch(rows[0]),
            Element::VoltageSource(e) => e.bind_branch(rows[0]),
            Element::Vcvs(e) => e.bind_branch(rows[0]),
            Element::Ccvs(e) => e.bind_branch(rows[0]),
            Element::IdealTransformer(e) => e.bind_branches(rows[0], rows[1]),
            _ => debug_assert!(rows.is_empty()),
        }
    }

    /// Row of this element's primary branch current, if it has one.
    ///
    /// This is what current-controlled sources reference.
    pub fn branch_row(&self) -> Option<usize> {
        match self {
            Element::Inductor(e) => e.branch_row(),
            Element::VoltageSource(e) => e.branch_row(),
            Element::Vcvs(e) => e.branch_row(),
            Element::Ccvs(e) => e.branch_row(),
            Element::IdealTransformer(e) => e.primary_row(),
            _ => None,
        }
    }

    /// Stamp this element's contribution. Strictly additive; traversal
    /// order never changes the assembled system.
    pub fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        match self {
            Element::Resistor(e) => e.assemble(mna, ctx),
            Element::Capacitor(e) => e.assemble(mna, ctx),
            Element::Inductor(e) => e.assemble(mna, ctx),
            // Couplings stamp through the compiled mutual-pair pass.
            Element::Coupling(_) => {}
            Element::VoltageSource(e) => e.assemble(mna, ctx),
            Element::CurrentSource(e) => e.assemble(mna, ctx),
            Element::Vcvs(e) => e.assemble(mna),
            Element::Vccs(e) => e.assemble(mna),
            Element::Cccs(e) => e.assemble(mna),
            Element::Ccvs(e) => e.assemble(mna),
            Element::Diode(e) => e.assemble(mna, ctx),
            Element::Mosfet(e) => e.assemble(mna, ctx),
            Element::IdealTransformer(e) => e.assemble(mna),
            Element::Transformer(_) => {
                unreachable!("composite element reached the assembler")
            }
        }
    }

    /// Whether the element's stamp depends on the Newton iterate.
    ///
    /// A switch-model MOSFET counts: without a gate override its on/off
    /// state reads `Vgs` from the iterate. The complementarity diode does
    /// not; its stamp is empty and the LCP resolves its state exactly.
    pub fn is_nonlinear(&self) -> bool {
        match self {
            Element::Diode(d) => matches!(d.model, crate::diode::DiodeModel::Shockley { .. }),
            Element::Mosfet(_) => true,
            _ => false,
        }
    }

    /// The element's complementarity pair, if it exposes one.
    pub fn comp_pair(&self) -> Option<CompPairSpec> {
        match self {
            Element::Diode(e) => e.comp_pair(),
            Element::Mosfet(e) => e.comp_pair(),
            _ => None,
        }
    }

    pub(crate) fn set_comp_solution(&mut self, z: f64, w: f64) {
        match self {
            Element::Diode(e) => e.set_comp_solution(z, w),
            Element::Mosfet(e) => e.set_comp_solution(z, w),
            _ => {}
        }
    }

    /// Initialize companion history from a solution (or element ICs).
    pub(crate) fn init_state(&mut self, x: &DVector<f64>, use_ic: bool) {
        match self {
            Element::Capacitor(e) => e.init_state(x, use_ic),
            Element::Inductor(e) => e.init_state(x, use_ic),
            _ => {}
        }
    }

    /// Advance committed history after an accepted step.
    pub(crate) fn commit(&mut self, x: &DVector<f64>, h: f64, method: IntegrationMethod) {
        match self {
            Element::Capacitor(e) => e.commit(x, h, method),
            Element::Inductor(e) => e.commit(x),
            _ => {}
        }
    }

    /// Snapshot committed history for rollback.
    pub(crate) fn state(&self) -> ElementState {
        match self {
            Element::Capacitor(e) => {
                let (v, i) = e.state();
                ElementState::Reactive(v, i)
            }
            Element::Inductor(e) => {
                let (i, v) = e.state();
                ElementState::Reactive(i, v)
            }
            Element::Diode(e) => {
                let (w, z) = e.comp_solution();
                ElementState::Comp(w, z)
            }
            Element::Mosfet(e) => {
                let (w, z) = e.comp_solution();
                ElementState::Comp(w, z)
            }
            _ => ElementState::None,
        }
    }

    /// Restore a snapshot taken by [`Element::state`].
    pub(crate) fn restore(&mut self, state: ElementState) {
        match (self, state) {
            (Element::Capacitor(e), ElementState::Reactive(v, i)) => e.restore((v, i)),
            (Element::Inductor(e), ElementState::Reactive(i, v)) => e.restore((i, v)),
            (Element::Diode(e), ElementState::Comp(w, z)) => e.set_comp_solution(z, w),
            (Element::Mosfet(e), ElementState::Comp(w, z)) => e.set_comp_solution(z, w),
            _ => {}
        }
    }

    /// Local truncation error contribution for adaptive stepping.
    pub(crate) fn lte(&self, x_new: &DVector<f64>, h: f64) -> f64 {
        match self {
            Element::Capacitor(e) => e.lte(x_new, h),
            Element::Inductor(e) => e.lte(x_new, h),
            _ => 0.0,
        }
    }

    /// Apply an external control input.
    pub(crate) fn set_control(&mut self, signal: ControlSignal) {
        match (self, signal) {
            (Element::VoltageSource(e), ControlSignal::Level(v)) => e.set_override(Some(v)),
            (Element::VoltageSource(e), ControlSignal::Release) => e.set_override(None),
            (Element::CurrentSource(e), ControlSignal::Level(v)) => e.set_override(Some(v)),
            (Element::CurrentSource(e), ControlSignal::Release) => e.set_override(None),
            (Element::Mosfet(e), ControlSignal::Gate(on)) => e.set_gate(Some(on)),
            (Element::Mosfet(e), ControlSignal::Release) => e.set_gate(None),
            _ => {}
        }
    }

    /// Branch current for result collection; post-commit for memory
    /// elements, recomputed from node voltages for the rest.
    pub fn branch_current(&self, x: &DVector<f64>, ctx: &AssembleCtx) -> Option<f64> {
        match self {
            Element::Resistor(e) => Some(e.current(x)),
            Element::Capacitor(e) => Some(e.current()),
            Element::Inductor(e) => Some(e.current()),
            Element::VoltageSource(e) => e.branch_row().map(|br| x[br]),
            Element::CurrentSource(e) => Some(e.value(ctx)),
            Element::Vcvs(e) => e.branch_row().map(|br| x[br]),
            Element::Ccvs(e) => e.branch_row().map(|br| x[br]),
            Element::Diode(e) => Some(e.current(x)),
            Element::Mosfet(e) => Some(e.current(x)),
            Element::IdealTransformer(e) => e.primary_row().map(|br| x[br]),
            _ => None,
        }
    }

    /// Switching-element state for step reporting.
    pub fn switch_state(&self, x: &DVector<f64>) -> Option<SwitchState> {
        match self {
            Element::Diode(e) => Some(SwitchState {
                gate_on: None,
                conducting: Some(e.is_conducting()),
                region: None,
            }),
            Element::Mosfet(e) => Some(SwitchState {
                gate_on: Some(e.gate_on(x)),
                conducting: Some(e.body_conducting()),
                region: e.region(x),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_var_declarations() {
        let l = Element::Inductor(
            crate::passive::Inductor::new("L1", "a", "b", 1e-3, None, None).unwrap(),
        );
        assert_eq!(l.extra_vars(), &[ExtraVarKind::BranchCurrent]);

        let r =
            Element::Resistor(crate::passive::Resistor::new("R1", "a", "b", 1.0).unwrap());
        assert!(r.extra_vars().is_empty());

        let t = Element::IdealTransformer(
            crate::transformer::IdealTransformer::new("T1", "p", "0", "s", "0", 2.0).unwrap(),
        );
        assert_eq!(t.extra_vars().len(), 2);
    }

    #[test]
    fn composite_detection() {
        let t = Element::Transformer(
            crate::transformer::Transformer::new(
                "T1",
                vec![
                    crate::transformer::Winding::new("p", "0", 1e-3, 1.0),
                    crate::transformer::Winding::new("s", "0", 1e-3, 1.0),
                ],
                vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            )
            .unwrap(),
        );
        assert!(t.is_composite());
        assert_eq!(t.flatten().unwrap().len(), 3);
    }
}
