//! Modified Nodal Analysis system container.
//!
//! The unknown vector is laid out as the non-ground node voltages `[0, N)`
//! followed by the extra variables (branch currents, controlled-source
//! outputs) `[N, N+E)`. Ground is implicit: its row and column are dropped,
//! and a `None` node index everywhere in the stamping API means ground.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// The sparse MNA matrix/RHS pair under assembly.
///
/// Elements accumulate `(row, col, value)` triplets; duplicates at the same
/// position sum. Storage is reused across iterations via [`MnaSystem::clear`],
/// which keeps the allocation and (for a well-behaved assembly order) the
/// sparsity pattern.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// Number of non-ground nodes.
    pub num_nodes: usize,
    /// Number of extra variables (branch currents etc.).
    pub num_extras: usize,
    /// Matrix entries in coordinate form.
    pub triplets: Vec<(usize, usize, f64)>,
    rhs: DVector<f64>,
    nonfinite: Option<(usize, usize)>,
}

impl MnaSystem {
    /// Create an empty system with `num_nodes` node rows and `num_extras`
    /// extra-variable rows.
    pub fn new(num_nodes: usize, num_extras: usize) -> Self {
        Self {
            num_nodes,
            num_extras,
            triplets: Vec::new(),
            rhs: DVector::zeros(num_nodes + num_extras),
            nonfinite: None,
        }
    }

    /// Total system dimension.
    pub fn size(&self) -> usize {
        self.num_nodes + self.num_extras
    }

    /// Reset matrix and RHS to zero, keeping allocations.
    pub fn clear(&mut self) {
        self.triplets.clear();
        self.rhs.fill(0.0);
        self.nonfinite = None;
    }

    /// Accumulate `value` at `(row, col)`.
    ///
    /// Non-finite values are recorded and reported by [`MnaSystem::check_finite`]
    /// after assembly; they do not panic.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.size() && col < self.size());
        if !value.is_finite() && self.nonfinite.is_none() {
            self.nonfinite = Some((row, col));
        }
        self.triplets.push((row, col, value));
    }

    /// Accumulate `value` into the RHS at `row`.
    pub fn add_rhs(&mut self, row: usize, value: f64) {
        debug_assert!(row < self.size());
        if !value.is_finite() && self.nonfinite.is_none() {
            self.nonfinite = Some((row, row));
        }
        self.rhs[row] += value;
    }

    /// Stamp a conductance `g` between two nodes (`None` = ground).
    pub fn stamp_conductance(&mut self, a: Option<usize>, b: Option<usize>, g: f64) {
        if let Some(i) = a {
            self.add(i, i, g);
        }
        if let Some(i) = b {
            self.add(i, i, g);
        }
        if let (Some(i), Some(j)) = (a, b) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp an independent current `i` flowing from node `from` to node `to`
    /// through the source (it leaves `from` and enters `to`).
    pub fn stamp_current_source(&mut self, from: Option<usize>, to: Option<usize>, i: f64) {
        if let Some(n) = from {
            self.add_rhs(n, -i);
        }
        if let Some(n) = to {
            self.add_rhs(n, i);
        }
    }

    /// Stamp an independent voltage source `v` from `pos` to `neg` using
    /// the extra-variable row `branch_row` for its current: incidence in the
    /// node rows and the constraint row `V(pos) - V(neg) = v`.
    pub fn stamp_voltage_source(
        &mut self,
        pos: Option<usize>,
        neg: Option<usize>,
        branch_row: usize,
        v: f64,
    ) {
        let br = branch_row;
        if let Some(i) = pos {
            self.add(i, br, 1.0);
            self.add(br, i, 1.0);
        }
        if let Some(i) = neg {
            self.add(i, br, -1.0);
            self.add(br, i, -1.0);
        }
        self.add_rhs(br, v);
    }

    /// Inject `gmin` on every node diagonal.
    ///
    /// Extra-variable rows are constraint rows and are left untouched.
    pub fn inject_gmin(&mut self, gmin: f64) {
        for i in 0..self.num_nodes {
            self.add(i, i, gmin);
        }
    }

    /// The right-hand-side vector.
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Report the first non-finite stamp, if any.
    pub fn check_finite(&self) -> Result<()> {
        match self.nonfinite {
            Some((row, col)) => Err(Error::NonFiniteStamp { row, col }),
            None => Ok(()),
        }
    }

    /// Materialize the dense matrix (small systems and tests).
    pub fn to_dense_matrix(&self) -> DMatrix<f64> {
        let n = self.size();
        let mut m = DMatrix::zeros(n, n);
        for &(r, c, v) in &self.triplets {
            m[(r, c)] += v;
        }
        m
    }

    /// Residual `A·x − b` evaluated from the triplet form.
    pub fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut r = -self.rhs.clone();
        for &(row, col, v) in &self.triplets {
            r[row] += v * x[col];
        }
        r
    }
}
