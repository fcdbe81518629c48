//! Controlled source device models: VCVS (E), VCCS (G), CCCS (F), CCVS (H).
//!
//! Current-controlled variants reference the controlling element by name;
//! the compiler resolves that name to the controlling branch-current row,
//! which must exist (voltage sources and inductors expose one).

use voltaic_core::MnaSystem;

use crate::error::{Error, Result};
use crate::node::Terminal;

fn check_gain(element: &str, gain: f64) -> Result<()> {
    if !gain.is_finite() {
        return Err(Error::NonFiniteParameter {
            element: element.to_string(),
            param: "gain",
        });
    }
    Ok(())
}

// ────────────────────── VCVS (E element) ──────────────────────

/// Voltage-controlled voltage source.
///
/// `V(out+, out-) = gain * V(ctrl+, ctrl-)`
///
/// Requires one branch-current variable (like a voltage source).
#[derive(Debug, Clone)]
pub struct Vcvs {
    pub name: String,
    pub out_pos: Terminal,
    pub out_neg: Terminal,
    pub ctrl_pos: Terminal,
    pub ctrl_neg: Terminal,
    pub gain: f64,
    branch: Option<usize>,
}

impl Vcvs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<Terminal>,
        out_neg: impl Into<Terminal>,
        ctrl_pos: impl Into<Terminal>,
        ctrl_neg: impl Into<Terminal>,
        gain: f64,
    ) -> Result<Self> {
        let name = name.into();
        check_gain(&name, gain)?;
        Ok(Self {
            name,
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl_pos: ctrl_pos.into(),
            ctrl_neg: ctrl_neg.into(),
            gain,
            branch: None,
        })
    }

    pub(crate) fn bind_branch(&mut self, row: usize) {
        self.branch = Some(row);
    }

    pub fn branch_row(&self) -> Option<usize> {
        self.branch
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem) {
        let br = self.branch.expect("VCVS assembled before binding");

        // Branch current couples to the output nodes like a voltage source.
        if let Some(i) = self.out_pos.index() {
            mna.add(i, br, 1.0);
        }
        if let Some(i) = self.out_neg.index() {
            mna.add(i, br, -1.0);
        }

        // Branch equation: V(out+) - V(out-) - gain * (V(ctrl+) - V(ctrl-)) = 0
        if let Some(i) = self.out_pos.index() {
            mna.add(br, i, 1.0);
        }
        if let Some(i) = self.out_neg.index() {
            mna.add(br, i, -1.0);
        }
        if let Some(i) = self.ctrl_pos.index() {
            mna.add(br, i, -self.gain);
        }
        if let Some(i) = self.ctrl_neg.index() {
            mna.add(br, i, self.gain);
        }
    }
}

// ────────────────────── VCCS (G element) ──────────────────────

/// Voltage-controlled current source.
///
/// `I(out+→out-) = gm * V(ctrl+, ctrl-)`
///
/// No branch-current variable needed.
#[derive(Debug, Clone)]
pub struct Vccs {
    pub name: String,
    pub out_pos: Terminal,
    pub out_neg: Terminal,
    pub ctrl_pos: Terminal,
    pub ctrl_neg: Terminal,
    pub gm: f64,
}

impl Vccs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<Terminal>,
        out_neg: impl Into<Terminal>,
        ctrl_pos: impl Into<Terminal>,
        ctrl_neg: impl Into<Terminal>,
        gm: f64,
    ) -> Result<Self> {
        let name = name.into();
        check_gain(&name, gm)?;
        Ok(Self {
            name,
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl_pos: ctrl_pos.into(),
            ctrl_neg: ctrl_neg.into(),
            gm,
        })
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem) {
        let op = self.out_pos.index();
        let on = self.out_neg.index();
        let cp = self.ctrl_pos.index();
        let cn = self.ctrl_neg.index();

        // Current gm * V(ctrl) enters out_pos; current entering a node goes
        // to the RHS, so on the matrix side the sign is negative.
        if let Some(i) = op {
            if let Some(j) = cp {
                mna.add(i, j, -self.gm);
            }
            if let Some(j) = cn {
                mna.add(i, j, self.gm);
            }
        }
        if let Some(i) = on {
            if let Some(j) = cp {
                mna.add(i, j, self.gm);
            }
            if let Some(j) = cn {
                mna.add(i, j, -self.gm);
            }
        }
    }
}

// ────────────────────── CCCS (F element) ──────────────────────

/// Current-controlled current source.
///
/// `I(out+→out-) = gain * I(ctrl)`
#[derive(Debug, Clone)]
pub struct Cccs {
    pub name: String,
    pub out_pos: Terminal,
    pub out_neg: Terminal,
    /// Name of the element whose branch current controls this source.
    pub ctrl: String,
    pub gain: f64,
    ctrl_branch: Option<usize>,
}

impl Cccs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<Terminal>,
        out_neg: impl Into<Terminal>,
        ctrl: impl Into<String>,
        gain: f64,
    ) -> Result<Self> {
        let name = name.into();
        check_gain(&name, gain)?;
        Ok(Self {
            name,
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl: ctrl.into(),
            gain,
            ctrl_branch: None,
        })
    }

    pub(crate) fn bind_ctrl(&mut self, row: usize) {
        self.ctrl_branch = Some(row);
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem) {
        let ctrl_br = self.ctrl_branch.expect("CCCS assembled before binding");

        if let Some(i) = self.out_pos.index() {
            mna.add(i, ctrl_br, self.gain);
        }
        if let Some(i) = self.out_neg.index() {
            mna.add(i, ctrl_br, -self.gain);
        }
    }
}

// ────────────────────── CCVS (H element) ──────────────────────

/// Current-controlled voltage source.
///
/// `V(out+, out-) = gain * I(ctrl)`
///
/// Requires one branch-current variable of its own.
#[derive(Debug, Clone)]
pub struct Ccvs {
    pub name: String,
    pub out_pos: Terminal,
    pub out_neg: Terminal,
    pub ctrl: String,
    pub gain: f64,
    branch: Option<usize>,
    ctrl_branch: Option<usize>,
}

impl Ccvs {
    pub fn new(
        name: impl Into<String>,
        out_pos: impl Into<Terminal>,
        out_neg: impl Into<Terminal>,
        ctrl: impl Into<String>,
        gain: f64,
    ) -> Result<Self> {
        let name = name.into();
        check_gain(&name, gain)?;
        Ok(Self {
            name,
            out_pos: out_pos.into(),
            out_neg: out_neg.into(),
            ctrl: ctrl.into(),
            gain,
            branch: None,
            ctrl_branch: None,
        })
    }

    pub(crate) fn bind_branch(&mut self, row: usize) {
        self.branch = Some(row);
    }

    pub(crate) fn bind_ctrl(&mut self, row: usize) {
        self.ctrl_branch = Some(row);
    }

    pub fn branch_row(&self) -> Option<usize> {
        self.branch
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem) {
        let br = self.branch.expect("CCVS assembled before binding");
        let ctrl_br = self.ctrl_branch.expect("CCVS assembled before binding");

        if let Some(i) = self.out_pos.index() {
            mna.add(i, br, 1.0);
        }
        if let Some(i) = self.out_neg.index() {
            mna.add(i, br, -1.0);
        }

        // Branch equation: V(out+) - V(out-) - gain * I(ctrl) = 0
        if let Some(i) = self.out_pos.index() {
            mna.add(br, i, 1.0);
        }
        if let Some(i) = self.out_neg.index() {
            mna.add(br, i, -1.0);
        }
        mna.add(br, ctrl_br, -self.gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(name: &str, idx: usize) -> Terminal {
        let mut t = Terminal::new(name);
        t.bind(Some(idx));
        t
    }

    #[test]
    fn vcvs_stamp() {
        // E1: out=(n0,gnd), ctrl=(n1,gnd), gain=2.0, branch row 2
        let mut mna = MnaSystem::new(2, 1);
        let mut e = Vcvs::new("E1", "out", "0", "ctrl", "0", 2.0).unwrap();
        e.out_pos = bound("out", 0);
        e.ctrl_pos = bound("ctrl", 1);
        e.bind_branch(2);
        e.assemble(&mut mna);

        let m = mna.to_dense_matrix();
        assert_eq!(m[(0, 2)], 1.0);
        assert_eq!(m[(2, 0)], 1.0);
        assert_eq!(m[(2, 1)], -2.0);
    }

    #[test]
    fn vccs_stamp() {
        let mut mna = MnaSystem::new(2, 0);
        let mut g = Vccs::new("G1", "out", "0", "ctrl", "0", 0.001).unwrap();
        g.out_pos = bound("out", 0);
        g.ctrl_pos = bound("ctrl", 1);
        g.assemble(&mut mna);

        let m = mna.to_dense_matrix();
        assert!((m[(0, 1)] - (-0.001)).abs() < 1e-15);
    }

    #[test]
    fn cccs_stamp() {
        // F1: out=(n1,gnd), controlling branch at row 2, gain=3.0
        let mut mna = MnaSystem::new(2, 1);
        let mut f = Cccs::new("F1", "out", "0", "V1", 3.0).unwrap();
        f.out_pos = bound("out", 1);
        f.bind_ctrl(2);
        f.assemble(&mut mna);

        let m = mna.to_dense_matrix();
        assert_eq!(m[(1, 2)], 3.0);
    }

    #[test]
    fn ccvs_stamp() {
        // H1: out=(n1,gnd), ctrl branch row 2, own branch row 3, gain=100
        let mut mna = MnaSystem::new(2, 2);
        let mut h = Ccvs::new("H1", "out", "0", "V1", 100.0).unwrap();
        h.out_pos = bound("out", 1);
        h.bind_ctrl(2);
        h.bind_branch(3);
        h.assemble(&mut mna);

        let m = mna.to_dense_matrix();
        assert_eq!(m[(1, 3)], 1.0);
        assert_eq!(m[(3, 1)], 1.0);
        assert_eq!(m[(3, 2)], -100.0);
    }
}
