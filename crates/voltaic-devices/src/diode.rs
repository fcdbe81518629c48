//! Diode models.
//!
//! Two renditions of the same device:
//!
//! - **Shockley**: the exponential law, Newton-linearized at the current
//!   iterate with voltage limiting so the stamp stays finite for any iterate.
//! - **Ideal**: piecewise-linear `(Vf, Ron)` switch exposed to the LCP
//!   sub-solver as a complementarity pair. Conduction is exact: no
//!   Roff regularization.

use voltaic_core::MnaSystem;

use crate::element::{AssembleCtx, CompPairSpec, volt};
use crate::error::{Error, Result};
use crate::node::Terminal;

/// Linearization-point clamp for the exponential (V).
const V_LIMIT: f64 = 0.8;

/// Threshold on the complementarity current deciding "conducting".
pub const CONDUCTION_TOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum DiodeModel {
    /// Exponential law `I = Is·(exp(V/(n·Vt)) − 1)`.
    Shockley { is_sat: f64, n: f64, vt: f64 },
    /// Piecewise-linear switch with forward drop and on-resistance.
    Ideal { vf: f64, ron: f64 },
}

#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub anode: Terminal,
    pub cathode: Terminal,
    pub model: DiodeModel,
    /// Complementarity solution from the last accepted solve.
    z_state: f64,
    w_state: f64,
}

impl Diode {
    pub fn ideal(
        name: impl Into<String>,
        anode: impl Into<Terminal>,
        cathode: impl Into<Terminal>,
        vf: f64,
        ron: f64,
    ) -> Result<Self> {
        let name = name.into();
        for (param, value) in [("vf", vf), ("ron", ron)] {
            if !value.is_finite() {
                return Err(Error::NonFiniteParameter {
                    element: name,
                    param,
                });
            }
            if value < 0.0 {
                return Err(Error::NonPositiveParameter {
                    element: name,
                    param,
                    value,
                });
            }
        }
        Ok(Self {
            name,
            anode: anode.into(),
            cathode: cathode.into(),
            model: DiodeModel::Ideal { vf, ron },
            z_state: 0.0,
            w_state: 0.0,
        })
    }

    pub fn shockley(
        name: impl Into<String>,
        anode: impl Into<Terminal>,
        cathode: impl Into<Terminal>,
        is_sat: f64,
        n: f64,
        vt: f64,
    ) -> Result<Self> {
        let name = name.into();
        for (param, value) in [("is", is_sat), ("n", n), ("vt", vt)] {
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
            anode: anode.into(),
            cathode: cathode.into(),
            model: DiodeModel::Shockley { is_sat, n, vt },
            z_state: 0.0,
            w_state: 0.0,
        })
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        match self.model {
            DiodeModel::Shockley { is_sat, n, vt } => {
                let v = volt(ctx.x_iter, self.anode.index())
                    - volt(ctx.x_iter, self.cathode.index());
                // Linearize at a clamped point; extrapolate linearly beyond
                // it so the stamp is finite for any iterate.
                let v_star = v.min(V_LIMIT);
                let nvt = n * vt;
                let e = (v_star / nvt).exp();
                let g = is_sat / nvt * e;
                let i_lin = is_sat * (e - 1.0) + g * (v - v_star);
                let i_eq = i_lin - g * v;

                mna.stamp_conductance(self.anode.index(), self.cathode.index(), g);
                mna.stamp_current_source(self.anode.index(), self.cathode.index(), i_eq);
            }
            // The complementarity variant contributes nothing to the base
            // system; its current enters through the LCP coupling.
            DiodeModel::Ideal { .. } => {}
        }
    }

    /// The complementarity pair for the ideal model, `None` for Shockley.
    pub fn comp_pair(&self) -> Option<CompPairSpec> {
        match self.model {
            DiodeModel::Ideal { vf, ron } => Some(CompPairSpec {
                anode: self.anode.index(),
                cathode: self.cathode.index(),
                vf,
                ron,
            }),
            DiodeModel::Shockley { .. } => None,
        }
    }

    pub(crate) fn set_comp_solution(&mut self, z: f64, w: f64) {
        self.z_state = z;
        self.w_state = w;
    }

    /// Last solved complementarity pair `(w, z)`.
    pub fn comp_solution(&self) -> (f64, f64) {
        (self.w_state, self.z_state)
    }

    pub fn is_conducting(&self) -> bool {
        match self.model {
            DiodeModel::Ideal { .. } => self.z_state > CONDUCTION_TOL,
            DiodeModel::Shockley { .. } => false,
        }
    }

    /// Device current from anode to cathode.
    pub fn current(&self, x: &nalgebra::DVector<f64>) -> f64 {
        match self.model {
            DiodeModel::Shockley { is_sat, n, vt } => {
                let v = volt(x, self.anode.index()) - volt(x, self.cathode.index());
                let v_star = v.min(V_LIMIT);
                let nvt = n * vt;
                let e = (v_star / nvt).exp();
                is_sat * (e - 1.0) + is_sat / nvt * e * (v - v_star)
            }
            DiodeModel::Ideal { .. } => self.z_state,
        }
    }
}
