//! Ideal and multi-winding transformers.

use voltaic_core::MnaSystem;

use crate::coupling::Coupling;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::node::Terminal;
use crate::passive::Inductor;

/// Ideal two-winding transformer with turns ratio `n = Vp/Vs`.
///
/// Carries two branch-current unknowns (primary and secondary) and two
/// constraint rows, `V_p − n·V_s = 0` and `n·I_p + I_s = 0`, which makes it
/// exactly power-conserving at every instant.
#[derive(Debug, Clone)]
pub struct IdealTransformer {
    pub name: String,
    pub p_pos: Terminal,
    pub p_neg: Terminal,
    pub s_pos: Terminal,
    pub s_neg: Terminal,
    /// Turns ratio `n = Vp/Vs`.
    pub ratio: f64,
    br_p: Option<usize>,
    br_s: Option<usize>,
}

impl IdealTransformer {
    pub fn new(
        name: impl Into<String>,
        p_pos: impl Into<Terminal>,
        p_neg: impl Into<Terminal>,
        s_pos: impl Into<Terminal>,
        s_neg: impl Into<Terminal>,
        ratio: f64,
    ) -> Result<Self> {
        let name = name.into();
        if !ratio.is_finite() {
            return Err(Error::NonFiniteParameter {
                element: name,
                param: "ratio",
            });
        }
        if ratio <= 0.0 {
            return Err(Error::NonPositiveParameter {
                element: name,
                param: "ratio",
                value: ratio,
            });
        }
        Ok(Self {
            name,
            p_pos: p_pos.into(),
            p_neg: p_neg.into(),
            s_pos: s_pos.into(),
            s_neg: s_neg.into(),
            ratio,
            br_p: None,
            br_s: None,
        })
    }

    pub(crate) fn bind_branches(&mut self, row_p: usize, row_s: usize) {
        self.br_p = Some(row_p);
        self.br_s = Some(row_s);
    }

    pub fn primary_row(&self) -> Option<usize> {
        self.br_p
    }

    pub fn secondary_row(&self) -> Option<usize> {
        self.br_s
    }

    pub(crate) fn assemble(&self, mna: &mut MnaSystem) {
        let (br_p, br_s) = (
            self.br_p.expect("transformer assembled before binding"),
            self.br_s.expect("transformer assembled before binding"),
        );
        let n = self.ratio;

        // Incidence: primary current leaves p_pos, secondary leaves s_pos.
        if let Some(i) = self.p_pos.index() {
            mna.add(i, br_p, 1.0);
        }
        if let Some(i) = self.p_neg.index() {
            mna.add(i, br_p, -1.0);
        }
        if let Some(i) = self.s_pos.index() {
            mna.add(i, br_s, 1.0);
        }
        if let Some(i) = self.s_neg.index() {
            mna.add(i, br_s, -1.0);
        }

        // Constraint row br_p: V_p − n·V_s = 0
        if let Some(i) = self.p_pos.index() {
            mna.add(br_p, i, 1.0);
        }
        if let Some(i) = self.p_neg.index() {
            mna.add(br_p, i, -1.0);
        }
        if let Some(i) = self.s_pos.index() {
            mna.add(br_p, i, -n);
        }
        if let Some(i) = self.s_neg.index() {
            mna.add(br_p, i, n);
        }

        // Constraint row br_s: n·I_p + I_s = 0
        mna.add(br_s, br_p, n);
        mna.add(br_s, br_s, 1.0);
    }
}

/// One winding of a multi-winding transformer declaration.
#[derive(Debug, Clone)]
pub struct Winding {
    pub pos: Terminal,
    pub neg: Terminal,
    pub inductance: f64,
    pub turns: f64,
}

impl Winding {
    pub fn new(
        pos: impl Into<Terminal>,
        neg: impl Into<Terminal>,
        inductance: f64,
        turns: f64,
    ) -> Self {
        Self {
            pos: pos.into(),
            neg: neg.into(),
            inductance,
            turns,
        }
    }
}

/// Multi-winding transformer, declared as coupled inductors plus a coupling
/// matrix. This is a composite: the compiler flattens it to inductors and K
/// couplings before indexing, so the solver never sees it.
#[derive(Debug, Clone)]
pub struct Transformer {
    pub name: String,
    pub windings: Vec<Winding>,
    /// Symmetric coupling-coefficient matrix; only the upper triangle is
    /// read. Diagonal entries are ignored.
    pub coupling: Vec<Vec<f64>>,
}

impl Transformer {
    pub fn new(
        name: impl Into<String>,
        windings: Vec<Winding>,
        coupling: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let t = Self {
            name: name.into(),
            windings,
            coupling,
        };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.windings.len();
        if n < 2 {
            return Err(Error::TooFewWindings {
                element: self.name.clone(),
                count: n,
            });
        }
        if self.coupling.len() != n || self.coupling.iter().any(|row| row.len() != n) {
            return Err(Error::CouplingMatrixShape {
                element: self.name.clone(),
                rows: self.coupling.len(),
                cols: self.coupling.first().map(|r| r.len()).unwrap_or(0),
                expected: n,
            });
        }
        for (i, w) in self.windings.iter().enumerate() {
            for (param, value) in [("inductance", w.inductance), ("turns", w.turns)] {
                if !value.is_finite() {
                    return Err(Error::NonFiniteParameter {
                        element: format!("{}.W{}", self.name, i + 1),
                        param,
                    });
                }
                if value <= 0.0 {
                    return Err(Error::NonPositiveParameter {
                        element: format!("{}.W{}", self.name, i + 1),
                        param,
                        value,
                    });
                }
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let k = self.coupling[i][j];
                if !(k > 0.0 && k <= 1.0) {
                    return Err(Error::InvalidCoupling {
                        element: self.name.clone(),
                        value: k,
                    });
                }
            }
        }
        Ok(())
    }

    /// Expand to primitive inductors and K couplings.
    ///
    /// Every winding becomes an inductor dotted at its `pos` terminal, so
    /// the declared winding orientation carries over to the mutual signs.
    pub fn flatten(&self) -> Result<Vec<Element>> {
        self.validate()?;
        let mut out = Vec::new();
        for (i, w) in self.windings.iter().enumerate() {
            let l = Inductor::new(
                format!("{}.L{}", self.name, i + 1),
                w.pos.name(),
                w.neg.name(),
                w.inductance,
                None,
                Some(w.pos.name().to_string()),
            )?;
            out.push(Element::Inductor(l));
        }
        for i in 0..self.windings.len() {
            for j in (i + 1)..self.windings.len() {
                let k = Coupling::new(
                    format!("{}.K{}{}", self.name, i + 1, j + 1),
                    format!("{}.L{}", self.name, i + 1),
                    format!("{}.L{}", self.name, j + 1),
                    self.coupling[i][j],
                )?;
                out.push(Element::Coupling(k));
            }
        }
        Ok(out)
    }
}
