//! Linear system solvers.

use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// Systems with this many or more variables use the sparse solver path.
pub const SPARSE_THRESHOLD: usize = 50;

/// Solve a linear system Ax = b using dense LU decomposition.
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.nrows() != a.ncols() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: a.ncols(),
        });
    }
    if a.nrows() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: b.len(),
        });
    }

    a.clone().lu().solve(b).ok_or(Error::SingularMatrix)
}

/// Solve a sparse linear system Ax = b using sparse LU decomposition.
///
/// The matrix is constructed from triplets `(row, col, value)`. Duplicate
/// entries at the same position are summed automatically by faer.
pub fn solve_sparse(
    size: usize,
    triplets: &[(usize, usize, f64)],
    rhs: &DVector<f64>,
) -> Result<DVector<f64>> {
    if size != rhs.len() {
        return Err(Error::DimensionMismatch {
            expected: size,
            actual: rhs.len(),
        });
    }

    let faer_triplets: Vec<_> = triplets
        .iter()
        .map(|&(r, c, v)| Triplet::new(r, c, v))
        .collect();

    let sparse_mat = SparseColMat::<usize, f64>::try_new_from_triplets(size, size, &faer_triplets)
        .map_err(|_| Error::SingularMatrix)?;

    let lu = sparse_mat.sp_lu().map_err(|_| Error::SingularMatrix)?;

    let faer_rhs = Col::<f64>::from_fn(size, |i| rhs[i]);
    let faer_x = lu.solve(&faer_rhs);

    Ok(DVector::from_fn(size, |i, _| faer_x[i]))
}

/// Sparse LU solver that pins the sparsity pattern of the assembled system.
///
/// During Newton iterations and across transient timesteps the set of
/// stamped positions is constant; only the values change. This solver
/// records the triplet pattern on construction and refuses to factor a
/// system whose pattern has drifted, which would indicate an assembly bug
/// rather than a numeric failure.
#[derive(Debug, Clone)]
pub struct CachedSparseLu {
    size: usize,
    pattern: Vec<(usize, usize)>,
}

impl CachedSparseLu {
    /// Record the pattern of the given triplet stream.
    pub fn new(size: usize, triplets: &[(usize, usize, f64)]) -> Result<Self> {
        for &(r, c, _) in triplets {
            if r >= size || c >= size {
                return Err(Error::IndexOutOfBounds {
                    index: r.max(c),
                    size,
                });
            }
        }
        Ok(Self {
            size,
            pattern: triplets.iter().map(|&(r, c, _)| (r, c)).collect(),
        })
    }

    /// System dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Factor the system described by `triplets` and solve for `rhs`.
    ///
    /// Assembly is deterministic, so a pattern match is a positional
    /// comparison of the stamped coordinates.
    pub fn solve(
        &self,
        triplets: &[(usize, usize, f64)],
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        if triplets.len() != self.pattern.len()
            || triplets
                .iter()
                .zip(self.pattern.iter())
                .any(|(&(r, c, _), &(pr, pc))| r != pr || c != pc)
        {
            return Err(Error::PatternChanged);
        }
        solve_sparse(self.size, triplets, rhs)
    }
}
