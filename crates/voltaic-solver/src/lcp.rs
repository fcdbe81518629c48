//! Linear Complementarity Problem solver.
//!
//! Solves `w = M·z + q`, `w ≥ 0`, `z ≥ 0`, `w·z = 0` by Lemke's
//! complementary pivoting with a covering ray (artificial variable `z0`).
//! Switch counts in power converters are small, so the tableau is dense;
//! the expensive part of switch handling (the sensitivity solves that
//! build `M`) reuses the sparse LU of the enclosing Newton iteration.
//!
//! Ray termination (`M` not copositive along the pivot path) is reported as
//! [`LcpOutcome::Unbounded`]; the caller treats it as non-convergence and
//! retries under continuation. There is no pseudo-inverse fallback.

use nalgebra::{DMatrix, DVector};

/// Tolerances and limits for the pivoting loop.
#[derive(Debug, Clone, Copy)]
pub struct LcpConfig {
    /// Absolute complementarity tolerance on `min(w_i, z_i)`.
    pub tol: f64,
    /// Pivot-step limit; 0 means `50·n + 50`.
    pub max_iter: usize,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            tol: 1e-9,
            max_iter: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcpOutcome {
    Solved,
    /// Ray termination: no blocking variable on the entering column.
    Unbounded,
    IterationLimit,
}

#[derive(Debug, Clone)]
pub struct LcpSolution {
    pub outcome: LcpOutcome,
    pub z: Vec<f64>,
    pub w: Vec<f64>,
    pub iterations: usize,
}

/// Solve the LCP `(M, q)` by Lemke's algorithm.
pub fn solve_lcp(m: &DMatrix<f64>, q: &DVector<f64>, config: &LcpConfig) -> LcpSolution {
    let n = q.len();
    debug_assert_eq!(m.nrows(), n);
    debug_assert_eq!(m.ncols(), n);

    // Trivial solution: q ≥ 0 means everything blocks.
    if n == 0 || q.iter().all(|&qi| qi >= -config.tol) {
        return LcpSolution {
            outcome: LcpOutcome::Solved,
            z: vec![0.0; n],
            w: q.iter().map(|&qi| qi.max(0.0)).collect(),
            iterations: 0,
        };
    }

    let max_iter = if config.max_iter == 0 {
        50 * n + 50
    } else {
        config.max_iter
    };

    // Tableau for w − M·z − z0·1 = q.
    // Columns: [0, n) = w, [n, 2n) = z, 2n = z0, 2n+1 = rhs.
    let z0_col = 2 * n;
    let rhs_col = 2 * n + 1;
    let mut t = DMatrix::<f64>::zeros(n, 2 * n + 2);
    for i in 0..n {
        t[(i, i)] = 1.0;
        for j in 0..n {
            t[(i, n + j)] = -m[(i, j)];
        }
        t[(i, z0_col)] = -1.0;
        t[(i, rhs_col)] = q[i];
    }

    // Basis starts as all w.
    let mut basis: Vec<usize> = (0..n).collect();

    // First pivot: z0 enters, the most negative q row leaves.
    let mut pivot_row = (0..n)
        .min_by(|&a, &b| t[(a, rhs_col)].total_cmp(&t[(b, rhs_col)]))
        .unwrap();
    pivot(&mut t, pivot_row, z0_col);
    let mut leaving = basis[pivot_row];
    basis[pivot_row] = z0_col;

    let mut entering = complement(leaving, n);
    let mut iterations = 1;

    loop {
        if iterations > max_iter {
            return extract(&t, &basis, n, LcpOutcome::IterationLimit, iterations);
        }

        // Minimum-ratio test over rows with positive entries in the
        // entering column; the z0 row wins ties so the ray exits.
        let mut best: Option<(usize, f64)> = None;
        for i in 0..n {
            let a = t[(i, entering)];
            if a > config.tol {
                let ratio = t[(i, rhs_col)] / a;
                let better = match best {
                    None => true,
                    Some((bi, br)) => {
                        ratio < br - config.tol
                            || (ratio < br + config.tol && basis[i] == z0_col && basis[bi] != z0_col)
                    }
                };
                if better {
                    best = Some((i, ratio));
                }
            }
        }

        let Some((row, _)) = best else {
            return extract(&t, &basis, n, LcpOutcome::Unbounded, iterations);
        };

        pivot_row = row;
        pivot(&mut t, pivot_row, entering);
        leaving = basis[pivot_row];
        basis[pivot_row] = entering;
        iterations += 1;

        if leaving == z0_col {
            return extract(&t, &basis, n, LcpOutcome::Solved, iterations);
        }
        entering = complement(leaving, n);
    }
}

/// Complement of a variable: `w_i ↔ z_i`.
fn complement(var: usize, n: usize) -> usize {
    if var < n { var + n } else { var - n }
}

fn pivot(t: &mut DMatrix<f64>, row: usize, col: usize) {
    let p = t[(row, col)];
    let ncols = t.ncols();
    for j in 0..ncols {
        t[(row, j)] /= p;
    }
    for i in 0..t.nrows() {
        if i != row {
            let factor = t[(i, col)];
            if factor != 0.0 {
                for j in 0..ncols {
                    t[(i, j)] -= factor * t[(row, j)];
                }
            }
        }
    }
}

fn extract(
    t: &DMatrix<f64>,
    basis: &[usize],
    n: usize,
    outcome: LcpOutcome,
    iterations: usize,
) -> LcpSolution {
    let rhs_col = 2 * n + 1;
    let mut z = vec![0.0; n];
    let mut w = vec![0.0; n];
    for (row, &var) in basis.iter().enumerate() {
        let value = t[(row, rhs_col)].max(0.0);
        if var < n {
            w[var] = value;
        } else if var < 2 * n {
            z[var - n] = value;
        }
    }
    LcpSolution {
        outcome,
        z,
        w,
        iterations,
    }
}

/// Componentwise complementarity residual `max_i min(w_i, z_i)`.
pub fn complementarity_residual(w: &[f64], z: &[f64]) -> f64 {
    w.iter()
        .zip(z.iter())
        .map(|(&wi, &zi)| wi.min(zi).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn check_solution(m: &DMatrix<f64>, q: &DVector<f64>, sol: &LcpSolution, tol: f64) {
        assert_eq!(sol.outcome, LcpOutcome::Solved);
        for i in 0..q.len() {
            let wi = (0..q.len()).map(|j| m[(i, j)] * sol.z[j]).sum::<f64>() + q[i];
            assert!(wi >= -tol, "w[{}] = {} < 0", i, wi);
            assert!(sol.z[i] >= -tol, "z[{}] = {} < 0", i, sol.z[i]);
            assert!(
                (wi * sol.z[i]).abs() < tol.max(1e-9),
                "complementarity violated at {}: w={}, z={}",
                i,
                wi,
                sol.z[i]
            );
        }
    }

    #[test]
    fn trivial_when_q_nonnegative() {
        let m = dmatrix![2.0, 0.0; 0.0, 2.0];
        let q = dvector![1.0, 0.5];
        let sol = solve_lcp(&m, &q, &LcpConfig::default());
        assert_eq!(sol.outcome, LcpOutcome::Solved);
        assert_eq!(sol.z, vec![0.0, 0.0]);
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn scalar_conduction() {
        // One diode: M = [R+Ron], q = [Vf − Vs]. Vs = 10, Vf = 0.7,
        // R + Ron = 100.01 → z = 9.3 / 100.01
        let m = dmatrix![100.01];
        let q = dvector![-9.3];
        let sol = solve_lcp(&m, &q, &LcpConfig::default());
        assert_eq!(sol.outcome, LcpOutcome::Solved);
        assert_relative_eq!(sol.z[0], 9.3 / 100.01, max_relative = 1e-9);
        assert_relative_eq!(sol.w[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn two_by_two_p_matrix() {
        let m = dmatrix![2.0, 1.0; 1.0, 2.0];
        let q = dvector![-5.0, -6.0];
        let sol = solve_lcp(&m, &q, &LcpConfig::default());
        check_solution(&m, &q, &sol, 1e-9);
    }

    #[test]
    fn mixed_active_set() {
        // Only the second pair conducts at the solution.
        let m = dmatrix![1.0, 0.0; 0.0, 1.0];
        let q = dvector![3.0, -2.0];
        let sol = solve_lcp(&m, &q, &LcpConfig::default());
        check_solution(&m, &q, &sol, 1e-9);
        assert_relative_eq!(sol.z[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(sol.z[1], 2.0, max_relative = 1e-9);
    }

    #[test]
    fn ray_termination_reported() {
        // M with no solution along the covering ray path:
        // w = -z + q, q < 0 forces z to grow without w ever blocking.
        let m = dmatrix![-1.0];
        let q = dvector![-1.0];
        let sol = solve_lcp(&m, &q, &LcpConfig::default());
        assert_eq!(sol.outcome, LcpOutcome::Unbounded);
    }

    #[test]
    fn larger_random_p_matrix() {
        // Diagonally dominant symmetric matrices are P-matrices; Lemke must
        // process a handful of pivots and land on a complementary solution.
        let n = 6;
        let m = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                4.0
            } else {
                1.0 / ((i as f64 - j as f64).abs() + 2.0)
            }
        });
        let q = DVector::from_fn(n, |i, _| if i % 2 == 0 { -1.0 - i as f64 } else { 0.5 });
        let sol = solve_lcp(&m, &q, &LcpConfig::default());
        check_solution(&m, &q, &sol, 1e-8);
    }

    #[test]
    fn residual_helper() {
        assert_relative_eq!(
            complementarity_residual(&[0.0, 3.0], &[2.0, 0.0]),
            0.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(complementarity_residual(&[1.0, 3.0], &[2.0, 0.0]), 1.0);
    }
}
