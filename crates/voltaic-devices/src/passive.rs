//! Passive linear elements: resistor, capacitor, inductor.

use voltaic_core::MnaSystem;

use crate::companion::{
    capacitor_companion, capacitor_lte, capacitor_update, inductor_branch, inductor_lte,
};
use crate::element::{AssembleCtx, volt};
use crate::error::{Error, Result};
use crate::node::Terminal;

/// Resistance inserted for an inductor branch at DC so the short does not
/// produce a singular matrix.
const DC_SHORT_OHMS: f64 = 1e-9;

fn check_positive(element: &str, param: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::NonFiniteParameter {
            element: element.to_string(),
            param,
        });
    }
    if value <= 0.0 {
        return Err(Error::NonPositiveParameter {
            element: element.to_string(),
            param,
            value,
        });
    }
    Ok(())
}

fn check_no_self_short(element: &str, a: &Terminal, b: &Terminal) -> Result<()> {
    if a.name() == b.name() {
        return Err(Error::SelfShort {
            element: element.to_string(),
            node: a.name().to_string(),
        });
    }
    Ok(())
}

// ────────────────────── Resistor ──────────────────────

#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub a: Terminal,
    pub b: Terminal,
    pub resistance: f64,
}

impl Resistor {
    pub fn new(
        name: impl Into<String>,
        a: impl Into<Terminal>,
        b: impl Into<Terminal>,
        resistance: f64,
    ) -> Result<Self> {
        let name = name.into();
        let (a, b) = (a.into(), b.into());
        check_positive(&name, "resistance", resistance)?;
        check_no_self_short(&name, &a, &b)?;
        Ok(Self {
            name,
            a,
            b,
            resistance,
        })
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, _ctx: &AssembleCtx) {
        mna.stamp_conductance(self.a.index(), self.b.index(), 1.0 / self.resistance);
    }

    /// Current from `a` to `b`, recovered from the node voltages.
    pub fn current(&self, x: &nalgebra::DVector<f64>) -> f64 {
        (volt(x, self.a.index()) - volt(x, self.b.index())) / self.resistance
    }
}

// ────────────────────── Capacitor ──────────────────────

#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub a: Terminal,
    pub b: Terminal,
    pub capacitance: f64,
    /// Optional initial voltage (V), used when the transient starts from ICs.
    pub ic: Option<f64>,
    v_prev: f64,
    i_prev: f64,
}

impl Capacitor {
    pub fn new(
        name: impl Into<String>,
        a: impl Into<Terminal>,
        b: impl Into<Terminal>,
        capacitance: f64,
        ic: Option<f64>,
    ) -> Result<Self> {
        let name = name.into();
        let (a, b) = (a.into(), b.into());
        check_positive(&name, "capacitance", capacitance)?;
        check_no_self_short(&name, &a, &b)?;
        Ok(Self {
            name,
            a,
            b,
            capacitance,
            ic,
            v_prev: 0.0,
            i_prev: 0.0,
        })
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        // Open at DC; Gmin injection keeps otherwise-floating nodes anchored.
        let Some(h) = ctx.h else { return };
        let comp = capacitor_companion(self.capacitance, h, ctx.method, self.v_prev, self.i_prev);
        mna.stamp_conductance(self.a.index(), self.b.index(), comp.g_eq);
        // History current enters the a side.
        mna.stamp_current_source(self.b.index(), self.a.index(), comp.i_eq);
    }

    pub(crate) fn init_state(&mut self, x: &nalgebra::DVector<f64>, use_ic: bool) {
        self.v_prev = if use_ic {
            self.ic.unwrap_or(0.0)
        } else {
            volt(x, self.a.index()) - volt(x, self.b.index())
        };
        self.i_prev = 0.0;
    }

    pub(crate) fn commit(
        &mut self,
        x: &nalgebra::DVector<f64>,
        h: f64,
        method: crate::companion::IntegrationMethod,
    ) {
        let v_new = volt(x, self.a.index()) - volt(x, self.b.index());
        self.i_prev = capacitor_update(self.capacitance, h, method, v_new, self.v_prev, self.i_prev);
        self.v_prev = v_new;
    }

    pub(crate) fn state(&self) -> (f64, f64) {
        (self.v_prev, self.i_prev)
    }

    pub(crate) fn restore(&mut self, state: (f64, f64)) {
        (self.v_prev, self.i_prev) = state;
    }

    /// Estimate the local truncation error for a candidate solution.
    pub(crate) fn lte(&self, x_new: &nalgebra::DVector<f64>, h: f64) -> f64 {
        let v_new = volt(x_new, self.a.index()) - volt(x_new, self.b.index());
        capacitor_lte(self.capacitance, h, v_new, self.v_prev, self.i_prev)
    }

    /// Companion current through the capacitor after the last commit.
    pub fn current(&self) -> f64 {
        self.i_prev
    }

    pub fn voltage(&self) -> f64 {
        self.v_prev
    }
}

// ────────────────────── Inductor ──────────────────────

/// Inductor with its branch current as an extra MNA unknown.
///
/// The branch current is defined entering terminal `a`; the `dot` terminal
/// gives the winding polarity used by K couplings.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub a: Terminal,
    pub b: Terminal,
    pub inductance: f64,
    /// Optional initial current (A).
    pub ic: Option<f64>,
    /// Dotted terminal name; defaults to `a`.
    pub dot: String,
    branch: Option<usize>,
    i_prev: f64,
    v_prev: f64,
}

impl Inductor {
    pub fn new(
        name: impl Into<String>,
        a: impl Into<Terminal>,
        b: impl Into<Terminal>,
        inductance: f64,
        ic: Option<f64>,
        dot_node: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        let (a, b) = (a.into(), b.into());
        check_positive(&name, "inductance", inductance)?;
        check_no_self_short(&name, &a, &b)?;
        let dot = dot_node.unwrap_or_else(|| a.name().to_string());
        if dot != a.name() && dot != b.name() {
            return Err(Error::UnknownReference {
                element: name,
                reference: dot,
            });
        }
        Ok(Self {
            name,
            a,
            b,
            inductance,
            ic,
            dot,
            branch: None,
            i_prev: 0.0,
            v_prev: 0.0,
        })
    }

    /// Whether the dot sits on terminal `a` (the branch-current entry side).
    pub fn dot_on_a(&self) -> bool {
        self.dot == self.a.name()
    }

    pub(crate) fn bind_branch(&mut self, row: usize) {
        self.branch = Some(row);
    }

    /// Absolute solution index of the branch current.
    pub fn branch_row(&self) -> Option<usize> {
        self.branch
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        let br = self.branch.expect("inductor assembled before binding");

        // Incidence: branch current leaves a, enters b.
        if let Some(i) = self.a.index() {
            mna.add(i, br, 1.0);
            mna.add(br, i, 1.0);
        }
        if let Some(i) = self.b.index() {
            mna.add(i, br, -1.0);
            mna.add(br, i, -1.0);
        }

        match ctx.h {
            // DC: a short, padded with a tiny series resistance.
            None => {
                mna.add(br, br, -DC_SHORT_OHMS);
            }
            Some(h) => {
                let (r_eq, rhs) =
                    inductor_branch(self.inductance, h, ctx.method, self.i_prev, self.v_prev);
                mna.add(br, br, -r_eq);
                mna.add_rhs(br, rhs);
            }
        }
    }

    pub(crate) fn init_state(&mut self, x: &nalgebra::DVector<f64>, use_ic: bool) {
        self.i_prev = if use_ic {
            self.ic.unwrap_or(0.0)
        } else {
            self.branch.map(|br| x[br]).unwrap_or(0.0)
        };
        self.v_prev = volt(x, self.a.index()) - volt(x, self.b.index());
        if use_ic {
            self.v_prev = 0.0;
        }
    }

    pub(crate) fn commit(&mut self, x: &nalgebra::DVector<f64>) {
        if let Some(br) = self.branch {
            self.i_prev = x[br];
        }
        self.v_prev = volt(x, self.a.index()) - volt(x, self.b.index());
    }

    pub(crate) fn state(&self) -> (f64, f64) {
        (self.i_prev, self.v_prev)
    }

    pub(crate) fn restore(&mut self, state: (f64, f64)) {
        (self.i_prev, self.v_prev) = state;
    }

    pub(crate) fn lte(&self, x_new: &nalgebra::DVector<f64>, h: f64) -> f64 {
        let v_new = volt(x_new, self.a.index()) - volt(x_new, self.b.index());
        inductor_lte(self.inductance, h, v_new, self.v_prev)
    }

    /// Committed branch current.
    pub fn current(&self) -> f64 {
        self.i_prev
    }
}
