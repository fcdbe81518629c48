//! Independent voltage and current sources.

use voltaic_core::MnaSystem;

use crate::element::AssembleCtx;
use crate::error::{Error, Result};
use crate::node::Terminal;
use crate::waveform::Waveform;

fn check_waveform(element: &str, w: &Waveform) -> Result<()> {
    if let Waveform::Pwl { points } = w {
        let sorted = points.windows(2).all(|p| p[0].0 < p[1].0);
        if points.is_empty() || !sorted {
            return Err(Error::InvalidPwl {
                element: element.to_string(),
            });
        }
    }
    Ok(())
}

/// Independent voltage source; carries one branch-current unknown.
///
/// The branch current is defined flowing from `pos` through the source to
/// `neg`, so a source delivering power reads a negative branch current.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub pos: Terminal,
    pub neg: Terminal,
    pub waveform: Waveform,
    /// External control override (PWM drivers, stepped simulation inputs).
    dc_override: Option<f64>,
    branch: Option<usize>,
}

impl VoltageSource {
    pub fn new(
        name: impl Into<String>,
        pos: impl Into<Terminal>,
        neg: impl Into<Terminal>,
        waveform: Waveform,
    ) -> Result<Self> {
        let name = name.into();
        check_waveform(&name, &waveform)?;
        Ok(Self {
            name,
            pos: pos.into(),
            neg: neg.into(),
            waveform,
            dc_override: None,
            branch: None,
        })
    }

    /// Constant-value convenience constructor.
    pub fn dc(
        name: impl Into<String>,
        pos: impl Into<Terminal>,
        neg: impl Into<Terminal>,
        value: f64,
    ) -> Result<Self> {
        Self::new(name, pos, neg, Waveform::dc(value))
    }

    pub(crate) fn bind_branch(&mut self, row: usize) {
        self.branch = Some(row);
    }

    pub fn branch_row(&self) -> Option<usize> {
        self.branch
    }

    /// Override the drive value until cleared; applied before the next
    /// assembly, which is how external controllers steer the circuit.
    pub fn set_override(&mut self, value: Option<f64>) {
        self.dc_override = value;
    }

    /// Drive value at the context's time, including the source-stepping
    /// scale. At the DC point the held DC value is used, never the waveform.
    pub fn value(&self, ctx: &AssembleCtx) -> f64 {
        let base = match self.dc_override {
            Some(v) => v,
            None => match ctx.h {
                None => self.waveform.dc_value(),
                Some(_) => self.waveform.value_at(ctx.t),
            },
        };
        base * ctx.source_scale
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        let br = self.branch.expect("voltage source assembled before binding");
        mna.stamp_voltage_source(self.pos.index(), self.neg.index(), br, self.value(ctx));
    }
}

/// Independent current source; RHS contribution only.
///
/// Positive current flows from `a` through the source into `b`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub a: Terminal,
    pub b: Terminal,
    pub waveform: Waveform,
    dc_override: Option<f64>,
}

impl CurrentSource {
    pub fn new(
        name: impl Into<String>,
        a: impl Into<Terminal>,
        b: impl Into<Terminal>,
        waveform: Waveform,
    ) -> Result<Self> {
        let name = name.into();
        check_waveform(&name, &waveform)?;
        Ok(Self {
            name,
            a: a.into(),
            b: b.into(),
            waveform,
            dc_override: None,
        })
    }

    pub fn dc(
        name: impl Into<String>,
        a: impl Into<Terminal>,
        b: impl Into<Terminal>,
        value: f64,
    ) -> Result<Self> {
        Self::new(name, a, b, Waveform::dc(value))
    }

    pub fn set_override(&mut self, value: Option<f64>) {
        self.dc_override = value;
    }

    pub fn value(&self, ctx: &AssembleCtx) -> f64 {
        let base = match self.dc_override {
            Some(v) => v,
            None => match ctx.h {
                None => self.waveform.dc_value(),
                Some(_) => self.waveform.value_at(ctx.t),
            },
        };
        base * ctx.source_scale
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem, ctx: &AssembleCtx) {
        mna.stamp_current_source(self.a.index(), self.b.index(), self.value(ctx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn ctx_at<'a>(
        t: f64,
        h: Option<f64>,
        x: &'a DVector<f64>,
        scale: f64,
    ) -> AssembleCtx<'a> {
        AssembleCtx {
            t,
            h,
            method: crate::companion::IntegrationMethod::BackwardEuler,
            x_prev: x,
            x_iter: x,
            source_scale: scale,
        }
    }

    #[test]
    fn dc_point_uses_held_value_not_waveform() {
        let v = VoltageSource::new("V1", "n1", "0", Waveform::sin(1.0, 10.0, 50.0)).unwrap();
        let x = DVector::zeros(1);
        // DC analysis (h = None): offset only.
        assert_relative_eq!(v.value(&ctx_at(0.0, None, &x, 1.0)), 1.0);
        // Transient at the sine quarter-period: offset + amplitude.
        assert_relative_eq!(v.value(&ctx_at(0.005, Some(1e-6), &x, 1.0)), 11.0);
    }

    #[test]
    fn source_scale_applies() {
        let v = VoltageSource::dc("V1", "n1", "0", 10.0).unwrap();
        let x = DVector::zeros(1);
        assert_relative_eq!(v.value(&ctx_at(0.0, None, &x, 0.25)), 2.5);
    }

    #[test]
    fn override_wins_over_waveform() {
        let mut v = VoltageSource::dc("V1", "n1", "0", 10.0).unwrap();
        v.set_override(Some(3.0));
        let x = DVector::zeros(1);
        assert_relative_eq!(v.value(&ctx_at(1.0, Some(1e-6), &x, 1.0)), 3.0);
    }

    #[test]
    fn pwl_must_be_sorted() {
        let w = Waveform::pwl(vec![(1.0, 0.0), (0.5, 1.0)]);
        assert!(matches!(
            CurrentSource::new("I1", "a", "b", w),
            Err(Error::InvalidPwl { .. })
        ));
    }
}
