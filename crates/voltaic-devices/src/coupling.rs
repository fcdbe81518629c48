//! Mutual-inductance coupling (K element).
//!
//! A coupling names two inductors and a coefficient `0 < k <= 1`. The
//! compiler resolves it into a [`MutualPair`] carrying the branch rows of
//! the two windings, the mutual inductance `M = k*sqrt(L1*L2)`, and the
//! polarity sign derived from dot alignment: `+1` when both branch currents
//! enter at their dotted terminals (or both at the undotted ones), `-1`
//! otherwise.

use crate::error::{Error, Result};

/// User-facing coupling declaration.
#[derive(Debug, Clone)]
pub struct Coupling {
    pub name: String,
    /// Name of the first coupled inductor.
    pub l1: String,
    /// Name of the second coupled inductor.
    pub l2: String,
    /// Coupling coefficient in (0, 1].
    pub k: f64,
}

impl Coupling {
    pub fn new(
        name: impl Into<String>,
        l1: impl Into<String>,
        l2: impl Into<String>,
        k: f64,
    ) -> Result<Self> {
        let name = name.into();
        if !k.is_finite() {
            return Err(Error::NonFiniteParameter {
                element: name,
                param: "k",
            });
        }
        if k <= 0.0 || k > 1.0 {
            return Err(Error::InvalidCoupling { element: name, value: k });
        }
        Ok(Self {
            name,
            l1: l1.into(),
            l2: l2.into(),
            k,
        })
    }
}

/// A compiled coupling between two inductor windings.
#[derive(Debug, Clone, Copy)]
pub struct MutualPair {
    /// Position of the first inductor in the compiled element list.
    pub elem1: usize,
    /// Position of the second inductor in the compiled element list.
    pub elem2: usize,
    /// Branch-current rows of the two windings.
    pub branch1: usize,
    pub branch2: usize,
    /// Unsigned mutual inductance `k*sqrt(L1*L2)`.
    pub m: f64,
    /// Dot-alignment sign.
    pub sign: f64,
}

impl MutualPair {
    /// Signed mutual inductance.
    pub fn m_signed(&self) -> f64 {
        self.sign * self.m
    }
}

/// Dot-alignment sign for a pair of windings.
pub fn dot_sign(dot1_on_a: bool, dot2_on_a: bool) -> f64 {
    if dot1_on_a == dot2_on_a { 1.0 } else { -1.0 }
}
