//! MOSFET models (NMOS conventions).
//!
//! - **SquareLaw**: level-0 quadratic law with cutoff/triode/saturation
//!   regions, Newton-linearized via `gm` and `gds`. Symmetric: a negative
//!   `Vds` iterate is handled by swapping the channel ends.
//! - **Switch**: two-state piecewise-linear channel (`Ron`/`Roff`) whose
//!   state comes from the gate (an external override, or `Vgs > Vth` at the
//!   iterate), plus a body diode exposed as its own complementarity pair.
//!   Body-diode orientation: anode at the source terminal, cathode at the
//!   drain.

use voltaic_core::MnaSystem;

use crate::diode::CONDUCTION_TOL;
use crate::element::{AssembleCtx, CompPairSpec, volt};
use crate::error::{Error, Result};
use crate::node::Terminal;

/// Default body-diode forward drop (V).
const BODY_VF: f64 = 0.7;

/// Operating region of the square-law model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Cutoff,
    Triode,
    Saturation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MosfetModel {
    /// Level-0 quadratic: `beta = kp·w/l`.
    SquareLaw { vth: f64, kp: f64, w: f64, l: f64 },
    /// Piecewise-linear switch with body diode.
    Switch {
        vth: f64,
        ron: f64,
        roff: f64,
        body_vf: f64,
        body_ron: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Mosfet {
    pub name: String,
    pub drain: Terminal,
    pub gate: Terminal,
    pub source: Terminal,
    pub model: MosfetModel,
    /// External gate drive; when set it wins over the electrical gate.
    gate_override: Option<bool>,
    z_state: f64,
    w_state: f64,
}

impl Mosfet {
    pub fn square_law(
        name: impl Into<String>,
        drain: impl Into<Terminal>,
        gate: impl Into<Terminal>,
        source: impl Into<Terminal>,
        vth: f64,
        kp: f64,
        w: f64,
        l: f64,
    ) -> Result<Self> {
        let name = name.into();
        if !vth.is_finite() {
            return Err(Error::NonFiniteParameter {
                element: name,
                param: "vth",
            });
        }
        for (param, value) in [("kp", kp), ("w", w), ("l", l)] {
            if !value.is_finite() {
                return Err(Error::NonFiniteParameter {
                    element: name,
                    param,
                });
            }
            if value <= 0.0 {
                return Err(Error::NonPositiveParameter {
                    element: name,
                    param,
                    value,
                });
            }
        }
        Ok(Self {
            name,
            drain: drain.into(),
            gate: gate.into(),
            source: source.into(),
            model: MosfetModel::SquareLaw { vth, kp, w, l },
            gate_override: None,
            z_state: 0.0,
            w_state: 0.0,
        })
    }

    /// PWL switch; the body diode inherits `ron` as its on-resistance.
    pub fn switch(
        name: impl Into<String>,
        drain: impl Into<Terminal>,
        gate: impl Into<Terminal>,
        source: impl Into<Terminal>,
        vth: f64,
        ron: f64,
        roff: f64,
    ) -> Result<Self> {
        let name = name.into();
        if !vth.is_finite() {
            return Err(Error::NonFiniteParameter {
                element: name,
                param: "vth",
            });
        }
        for (param, value) in [("ron", ron), ("roff", roff)] {
            if !value.is_finite() {
                return Err(Error::NonFiniteParameter {
                    element: name,
                    param,
                });
            }
            if value <= 0.0 {
                return Err(Error::NonPositiveParameter {
                    element: name,
                    param,
                    value,
                });
            }
        }
        Ok(Self {
            name,
            drain: drain.into(),
            gate: gate.into(),
            source: source.into(),
            model: MosfetModel::Switch {
                vth,
                ron,
                roff,
                body_vf: BODY_VF,
                body_ron: ron,
            },
            gate_override: None,
            z_state: 0.0,
            w_state: 0.0,
        })
    }

    /// Drive the gate externally (PWM controllers, stepped simulation).
    pub fn set_gate(&mut self, on: Option<bool>) {
        self.gate_override = on;
    }

    /// Effective switch state at the given iterate.
    pub fn gate_on(&self, x: &nalgebra::DVector<f64>) -> bool {
        if let Some(on) = self.gate_override {
            return on;
        }
        let vgs = volt(x, self.gate.index()) - volt(x, self.source.index());
        match self.model {
            MosfetModel::Switch { vth, .. } | MosfetModel::SquareLaw { vth, .. } => vgs > vth,
        }
    }

    fn square_law_point(
        &self,
        x: &nalgebra::DVector<f64>,
    ) -> (Region, f64, f64, f64, f64, f64, bool) {
        let MosfetModel::SquareLaw { vth, kp, w, l } = self.model else {
            unreachable!("square_law_point on switch model");
        };
        let vd = volt(x, self.drain.index());
        let vg = volt(x, self.gate.index());
        let vs = volt(x, self.source.index());

        // Operate symmetrically: with Vds < 0 the terminal playing the
        // source role swaps.
        let reversed = vd - vs < 0.0;
        let (vgs, vds) = if reversed {
            (vg - vd, vs - vd)
        } else {
            (vg - vs, vd - vs)
        };

        let beta = kp * w / l;
        let vov = vgs - vth;
        let (region, id, gm, gds) = if vov <= 0.0 {
            (Region::Cutoff, 0.0, 0.0, 0.0)
        } else if vds < vov {
            let id = beta * (vov * vds - 0.5 * vds * vds);
            (Region::Triode, id, beta * vds, beta * (vov - vds))
        } else {
            let id = 0.5 * beta * vov * vov;
            (Region::Saturation, id, beta * vov, 0.0)
        };
        (region, id, gm, gds, vgs, vds, reversed)
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        match self.model {
            MosfetModel::Switch { ron, roff, .. } => {
                let g_ds = if self.gate_on(ctx.x_iter) {
                    1.0 / ron
                } else {
                    1.0 / roff
                };
                mna.stamp_conductance(self.drain.index(), self.source.index(), g_ds);
            }
            MosfetModel::SquareLaw { .. } => {
                let (_, id, gm, gds, vgs, vds, reversed) = self.square_law_point(ctx.x_iter);
                // Channel ends in their effective roles.
                let (hi, lo) = if reversed {
                    (self.source.index(), self.drain.index())
                } else {
                    (self.drain.index(), self.source.index())
                };
                let g = self.gate.index();

                let mut add = |r: Option<usize>, c: Option<usize>, v: f64| {
                    if let (Some(r), Some(c)) = (r, c) {
                        mna.add(r, c, v);
                    }
                };

                // Linearized drain current (hi → lo):
                // id ≈ Id* + gm·(vgs − vgs*) + gds·(vds − vds*)
                add(hi, g, gm);
                add(hi, hi, gds);
                add(hi, lo, -(gm + gds));
                add(lo, g, -gm);
                add(lo, hi, -gds);
                add(lo, lo, gm + gds);

                let i_eq = id - gm * vgs - gds * vds;
                mna.stamp_current_source(hi, lo, i_eq);
            }
        }
    }

    /// Body-diode complementarity pair (switch model only).
    pub fn comp_pair(&self) -> Option<CompPairSpec> {
        match self.model {
            MosfetModel::Switch {
                body_vf, body_ron, ..
            } => Some(CompPairSpec {
                // NMOS body diode: anode at source, cathode at drain.
                anode: self.source.index(),
                cathode: self.drain.index(),
                vf: body_vf,
                ron: body_ron,
            }),
            MosfetModel::SquareLaw { .. } => None,
        }
    }

    pub(crate) fn set_comp_solution(&mut self, z: f64, w: f64) {
        self.z_state = z;
        self.w_state = w;
    }

    pub fn comp_solution(&self) -> (f64, f64) {
        (self.w_state, self.z_state)
    }

    pub fn body_conducting(&self) -> bool {
        matches!(self.model, MosfetModel::Switch { .. }) && self.z_state > CONDUCTION_TOL
    }

    pub fn region(&self, x: &nalgebra::DVector<f64>) -> Option<Region> {
        match self.model {
            MosfetModel::SquareLaw { .. } => Some(self.square_law_point(x).0),
            MosfetModel::Switch { .. } => None,
        }
    }

    /// Drain current (positive into the drain), channel plus body diode.
    pub fn current(&self, x: &nalgebra::DVector<f64>) -> f64 {
        match self.model {
            MosfetModel::Switch { ron, roff, .. } => {
                let vds = volt(x, self.drain.index()) - volt(x, self.source.index());
                let g_ds = if self.gate_on(x) { 1.0 / ron } else { 1.0 / roff };
                // Body diode carries z from source to drain.
                g_ds * vds - self.z_state
            }
            MosfetModel::SquareLaw { .. } => {
                let (_, id, .., reversed) = self.square_law_point(x);
                if reversed { -id } else { id }
            }
        }
    }
}
