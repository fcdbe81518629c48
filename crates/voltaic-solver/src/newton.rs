//! Damped Newton-Raphson with continuation.
//!
//! One Newton iteration assembles the linearized MNA system at the current
//! iterate and solves it; switching elements couple in through an LCP built
//! from the same factorization (one base solve plus one sensitivity solve
//! per complementarity pair). On failure the operating-point driver walks
//! the continuation ladder: Gmin stepping, then source stepping, then
//! source stepping with Gmin stepping inside each λ stage.

use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use voltaic_core::{CachedSparseLu, MnaSystem, SPARSE_THRESHOLD, solve_dense};
use voltaic_devices::companion::IntegrationMethod;
use voltaic_devices::{AssembleCtx, CompiledCircuit};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::lcp::{LcpConfig, LcpOutcome, solve_lcp};

/// Convergence thresholds for the Newton loop.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCriteria {
    /// Absolute tolerance on the update norm (V/A).
    pub abstol: f64,
    /// Relative tolerance on the update norm.
    pub reltol: f64,
    /// Residual tolerance.
    pub restol: f64,
    /// Iteration cap per solve.
    pub max_iter: usize,
    /// Damping factor in (0, 1].
    pub damping: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            abstol: 1e-9,
            reltol: 1e-6,
            restol: 1e-9,
            max_iter: 100,
            damping: 1.0,
        }
    }
}

/// Continuation parameters composed with the convergence criteria.
#[derive(Debug, Clone, Copy)]
pub struct NewtonConfig {
    pub criteria: ConvergenceCriteria,
    /// Target diagonal Gmin.
    pub gmin: f64,
    /// Starting Gmin for the stepping ladder.
    pub gmin_start: f64,
    /// Initial λ increment for source stepping.
    pub source_step: f64,
    /// Smallest λ increment before source stepping gives up.
    pub source_step_min: f64,
    pub lcp: LcpConfig,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            criteria: ConvergenceCriteria::default(),
            gmin: 1e-12,
            gmin_start: 1e-2,
            source_step: 0.1,
            source_step_min: 1e-4,
            lcp: LcpConfig::default(),
        }
    }
}

/// Which strategy produced the converged point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStrategy {
    Direct,
    GminStepping,
    SourceStepping,
    Composed,
}

/// Statistics of one converged operating point.
#[derive(Debug, Clone, Copy)]
pub struct NewtonStats {
    pub iterations: usize,
    pub strategy: SolverStrategy,
}

/// Time/discretization context of the point being solved.
#[derive(Debug, Clone, Copy)]
pub struct PointContext<'a> {
    pub t: f64,
    /// `None` at the DC operating point.
    pub h: Option<f64>,
    pub method: IntegrationMethod,
    pub x_prev: &'a DVector<f64>,
}

/// Complementarity solution carried out of a converged solve.
#[derive(Debug, Clone, Default)]
pub struct CompSolution {
    pub z: Vec<f64>,
    pub w: Vec<f64>,
}

/// Solve all right-hand sides against one factorization of the assembled
/// matrix, dense or sparse by system size.
fn solve_all(mna: &MnaSystem, rhs_list: &[DVector<f64>]) -> Result<Vec<DVector<f64>>> {
    let n = mna.size();
    if n >= SPARSE_THRESHOLD {
        let triplets: Vec<_> = mna
            .triplets
            .iter()
            .map(|&(r, c, v)| Triplet::new(r, c, v))
            .collect();
        let mat = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|_| voltaic_core::Error::SingularMatrix)?;
        let lu = mat
            .sp_lu()
            .map_err(|_| voltaic_core::Error::SingularMatrix)?;
        Ok(rhs_list
            .iter()
            .map(|rhs| {
                let col = Col::<f64>::from_fn(n, |i| rhs[i]);
                let sol = lu.solve(&col);
                DVector::from_fn(n, |i, _| sol[i])
            })
            .collect())
    } else {
        let lu = mna.to_dense_matrix().lu();
        rhs_list
            .iter()
            .map(|rhs| {
                lu.solve(rhs)
                    .ok_or(Error::Linear(voltaic_core::Error::SingularMatrix))
            })
            .collect()
    }
}

/// One linearized solve, including the complementarity coupling.
///
/// With pairs present: factor `A` once, solve the base system and one unit
/// current injection per pair, build the Schur-complement LCP
/// `M = Ron ⊕ (−CᵀY)`, `q = Vf − Cᵀx0`, pivot, and superpose.
fn solve_linearized(
    circuit: &CompiledCircuit,
    mna: &MnaSystem,
    lcp_cfg: &LcpConfig,
    cached: &mut Option<CachedSparseLu>,
) -> Result<(DVector<f64>, CompSolution)> {
    let pairs = circuit.comp_pairs();
    if pairs.is_empty() {
        // Plain path: reuse the pinned sparsity pattern across iterations.
        let n = mna.size();
        let x = if n >= SPARSE_THRESHOLD {
            if cached.is_none() {
                *cached = Some(CachedSparseLu::new(n, &mna.triplets)?);
            }
            cached.as_ref().unwrap().solve(&mna.triplets, mna.rhs())?
        } else {
            solve_dense(&mna.to_dense_matrix(), mna.rhs())?
        };
        return Ok((x, CompSolution::default()));
    }

    let n = mna.size();
    let k = pairs.len();

    let mut rhs_list = Vec::with_capacity(k + 1);
    rhs_list.push(mna.rhs().clone());
    for p in &pairs {
        // Unit forward current: leaves the anode, enters the cathode.
        let mut d = DVector::zeros(n);
        if let Some(i) = p.anode {
            d[i] = -1.0;
        }
        if let Some(i) = p.cathode {
            d[i] = 1.0;
        }
        rhs_list.push(d);
    }

    let xs = solve_all(mna, &rhs_list)?;
    let x0 = &xs[0];
    let sens = &xs[1..];

    let v_across = |x: &DVector<f64>, p: &voltaic_devices::CompPairSpec| -> f64 {
        let va = p.anode.map(|i| x[i]).unwrap_or(0.0);
        let vc = p.cathode.map(|i| x[i]).unwrap_or(0.0);
        va - vc
    };

    // w_j = vf_j + ron_j·z_j − v_j(x0 + Σ z_k·y_k)
    let q = DVector::from_fn(k, |j, _| pairs[j].vf - v_across(x0, &pairs[j]));
    let m = DMatrix::from_fn(k, k, |j, l| {
        let coupling = -v_across(&sens[l], &pairs[j]);
        if j == l { pairs[j].ron + coupling } else { coupling }
    });

    let lcp = solve_lcp(&m, &q, lcp_cfg);
    match lcp.outcome {
        LcpOutcome::Solved => {}
        LcpOutcome::Unbounded => return Err(Error::LcpUnbounded),
        LcpOutcome::IterationLimit => return Err(Error::LcpIterationLimit),
    }

    let mut x = x0.clone();
    for (l, y) in sens.iter().enumerate() {
        if lcp.z[l] != 0.0 {
            x += y * lcp.z[l];
        }
    }

    Ok((
        x,
        CompSolution {
            z: lcp.z,
            w: lcp.w,
        },
    ))
}

/// Residual of the assembled system at `x`, accounting for the switch
/// currents injected by the LCP.
fn residual_norm(mna: &MnaSystem, circuit: &CompiledCircuit, x: &DVector<f64>, comp: &CompSolution) -> f64 {
    let mut r = mna.residual(x);
    for (p, &z) in circuit.comp_pairs().iter().zip(comp.z.iter()) {
        if let Some(i) = p.anode {
            r[i] += z;
        }
        if let Some(i) = p.cathode {
            r[i] -= z;
        }
    }
    r.amax()
}

/// Newton loop for a single operating point at fixed Gmin and source scale.
pub(crate) fn solve_point(
    circuit: &CompiledCircuit,
    mna: &mut MnaSystem,
    point: &PointContext<'_>,
    x0: &DVector<f64>,
    cfg: &NewtonConfig,
    gmin: f64,
    source_scale: f64,
    cancel: &CancelToken,
) -> Result<(DVector<f64>, CompSolution, usize)> {
    let crit = &cfg.criteria;
    let mut x_iter = x0.clone();
    let mut comp = CompSolution::default();
    let mut cached: Option<CachedSparseLu> = None;
    // A linear system is solved exactly in one pass; the update criterion
    // would cost a second assembly just to observe dx = 0.
    let linear = !circuit.has_nonlinear();

    for iter in 1..=crit.max_iter {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let ctx = AssembleCtx {
            t: point.t,
            h: point.h,
            method: point.method,
            x_prev: point.x_prev,
            x_iter: &x_iter,
            source_scale,
        };
        circuit.assemble(mna, &ctx, gmin)?;

        let (x_lin, comp_new) = solve_linearized(circuit, mna, &cfg.lcp, &mut cached)?;
        comp = comp_new;

        let dx = &x_iter - &x_lin;
        let x_next = &x_iter - &(&dx * crit.damping);
        let dx_norm = dx.amax();
        let x_norm = x_next.amax();
        x_iter = x_next;

        if linear || dx_norm < crit.abstol + crit.reltol * x_norm {
            let r_norm = residual_norm(mna, circuit, &x_iter, &comp);
            if r_norm < crit.restol {
                return Ok((x_iter, comp, iter));
            }
        }
    }

    Err(Error::IterationLimit {
        limit: crit.max_iter,
    })
}

fn gmin_ladder(
    circuit: &CompiledCircuit,
    mna: &mut MnaSystem,
    point: &PointContext<'_>,
    x0: &DVector<f64>,
    cfg: &NewtonConfig,
    source_scale: f64,
    cancel: &CancelToken,
) -> Result<(DVector<f64>, CompSolution, usize)> {
    let mut x = x0.clone();
    let mut total = 0;
    let mut gmin = cfg.gmin_start;
    while gmin > cfg.gmin {
        let (xg, _, iters) = solve_point(circuit, mna, point, &x, cfg, gmin, source_scale, cancel)?;
        x = xg;
        total += iters;
        gmin /= 2.0;
    }
    let (x, comp, iters) = solve_point(circuit, mna, point, &x, cfg, cfg.gmin, source_scale, cancel)?;
    Ok((x, comp, total + iters))
}

fn source_ladder(
    circuit: &CompiledCircuit,
    mna: &mut MnaSystem,
    point: &PointContext<'_>,
    cfg: &NewtonConfig,
    gmin_inside: bool,
    cancel: &CancelToken,
) -> Result<(DVector<f64>, CompSolution, usize)> {
    // λ = 0 turns every independent source off; x = 0 is a feasible warm
    // start for that trivial system.
    let mut x = DVector::zeros(circuit.size());
    let mut comp = CompSolution::default();
    let mut total = 0;
    let mut lambda = 0.0_f64;
    let mut step = cfg.source_step;

    loop {
        let target = (lambda + step).min(1.0);
        let attempt = if gmin_inside {
            gmin_ladder(circuit, mna, point, &x, cfg, target, cancel)
        } else {
            solve_point(circuit, mna, point, &x, cfg, cfg.gmin, target, cancel)
        };
        match attempt {
            Ok((xl, cl, iters)) => {
                x = xl;
                comp = cl;
                total += iters;
                lambda = target;
                if lambda >= 1.0 {
                    return Ok((x, comp, total));
                }
                step = (step * 1.5).min(1.0 - lambda);
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(_) => {
                step /= 2.0;
                if step < cfg.source_step_min {
                    return Err(Error::ContinuationExhausted);
                }
            }
        }
    }
}

/// Solve one operating point, falling back through the continuation ladder.
pub fn solve_with_continuation(
    circuit: &CompiledCircuit,
    mna: &mut MnaSystem,
    point: &PointContext<'_>,
    x_warm: &DVector<f64>,
    cfg: &NewtonConfig,
    cancel: &CancelToken,
) -> Result<(DVector<f64>, CompSolution, NewtonStats)> {
    match solve_point(circuit, mna, point, x_warm, cfg, cfg.gmin, 1.0, cancel) {
        Ok((x, comp, iterations)) => {
            return Ok((
                x,
                comp,
                NewtonStats {
                    iterations,
                    strategy: SolverStrategy::Direct,
                },
            ));
        }
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => log::debug!("direct solve failed ({e}), starting continuation"),
    }

    match gmin_ladder(circuit, mna, point, x_warm, cfg, 1.0, cancel) {
        Ok((x, comp, iterations)) => {
            log::warn!("gmin stepping engaged at t = {}", point.t);
            return Ok((
                x,
                comp,
                NewtonStats {
                    iterations,
                    strategy: SolverStrategy::GminStepping,
                },
            ));
        }
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => log::debug!("gmin stepping failed ({e})"),
    }

    match source_ladder(circuit, mna, point, cfg, false, cancel) {
        Ok((x, comp, iterations)) => {
            log::warn!("source stepping engaged at t = {}", point.t);
            return Ok((
                x,
                comp,
                NewtonStats {
                    iterations,
                    strategy: SolverStrategy::SourceStepping,
                },
            ));
        }
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => log::debug!("source stepping failed ({e})"),
    }

    let (x, comp, iterations) = source_ladder(circuit, mna, point, cfg, true, cancel)?;
    log::warn!("composed continuation engaged at t = {}", point.t);
    Ok((
        x,
        comp,
        NewtonStats {
            iterations,
            strategy: SolverStrategy::Composed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voltaic_devices::Circuit;

    fn dc_point(x_prev: &DVector<f64>) -> PointContext<'_> {
        PointContext {
            t: 0.0,
            h: None,
            method: IntegrationMethod::BackwardEuler,
            x_prev,
        }
    }

    #[test]
    fn linear_circuit_converges_in_two_iterations() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_resistor("R2", "out", "0", 2e3).unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();

        let (x, _, stats) =
            solve_with_continuation(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, &cancel)
                .unwrap();

        let out = circuit.node_index("out").unwrap();
        assert_relative_eq!(x[out], 10.0 / 3.0, epsilon = 1e-6);
        assert_eq!(stats.strategy, SolverStrategy::Direct);
        assert!(stats.iterations <= 3);
    }

    #[test]
    fn shockley_diode_dc_point() {
        // 5V → 1k → diode to ground. V_diode settles near 0.6-0.7V.
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "d", 1e3).unwrap();
        c.add_shockley_diode("D1", "d", "0", 1e-14, 1.0, 0.02585)
            .unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();

        let (x, _, _) =
            solve_with_continuation(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, &cancel)
                .unwrap();

        let vd = x[circuit.node_index("d").unwrap()];
        assert!(vd > 0.5 && vd < 0.8, "diode voltage {} out of range", vd);

        // KCL: resistor current equals diode current.
        let ir = (5.0 - vd) / 1e3;
        let id = 1e-14 * ((vd / 0.02585).exp() - 1.0);
        assert_relative_eq!(ir, id, max_relative = 1e-3);
    }

    #[test]
    fn lcp_diode_conducts_forward() {
        // 10V source → ideal diode (Vf 0.7, Ron 0.01) → 100Ω load.
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 10.0).unwrap();
        c.add_ideal_diode("D1", "in", "out", 0.7, 0.01).unwrap();
        c.add_resistor("RL", "out", "0", 100.0).unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();

        let (x, comp, _) =
            solve_with_continuation(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, &cancel)
                .unwrap();

        let expected_i = (10.0 - 0.7) / 100.01;
        assert_relative_eq!(comp.z[0], expected_i, max_relative = 1e-6);
        let v_out = x[circuit.node_index("out").unwrap()];
        assert_relative_eq!(v_out, expected_i * 100.0, max_relative = 1e-6);
    }

    #[test]
    fn lcp_diode_blocks_reverse() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", -10.0).unwrap();
        c.add_ideal_diode("D1", "in", "out", 0.7, 0.01).unwrap();
        c.add_resistor("RL", "out", "0", 100.0).unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();

        let (x, comp, _) =
            solve_with_continuation(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, &cancel)
                .unwrap();

        assert_relative_eq!(comp.z[0], 0.0, epsilon = 1e-12);
        let v_out = x[circuit.node_index("out").unwrap()];
        assert!(v_out.abs() < 1e-6, "blocked diode must isolate the load");
    }

    #[test]
    fn gmin_ladder_matches_direct_solve() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "d", 1e3).unwrap();
        c.add_shockley_diode("D1", "d", "0", 1e-14, 1.0, 0.02585)
            .unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();

        let (x_direct, _, _) =
            solve_point(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, cfg.gmin, 1.0, &cancel)
                .unwrap();
        let (x_gmin, _, _) =
            gmin_ladder(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, 1.0, &cancel).unwrap();

        for i in 0..x_direct.len() {
            assert_relative_eq!(x_direct[i], x_gmin[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn source_ladder_matches_direct_solve() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "d", 1e3).unwrap();
        c.add_shockley_diode("D1", "d", "0", 1e-14, 1.0, 0.02585)
            .unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();

        let (x_direct, _, _) =
            solve_point(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, cfg.gmin, 1.0, &cancel)
                .unwrap();
        let (x_src, _, _) =
            source_ladder(&circuit, &mut mna, &dc_point(&x0), &cfg, false, &cancel).unwrap();
        let (x_composed, _, _) =
            source_ladder(&circuit, &mut mna, &dc_point(&x0), &cfg, true, &cancel).unwrap();

        for i in 0..x_direct.len() {
            assert_relative_eq!(x_direct[i], x_src[i], epsilon = 1e-6);
            assert_relative_eq!(x_direct[i], x_composed[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn cancellation_aborts() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "0", 1e3).unwrap();
        let circuit = c.compile().unwrap();

        let mut mna = MnaSystem::new(circuit.num_nodes(), circuit.num_extras());
        let x0 = DVector::zeros(circuit.size());
        let cfg = NewtonConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err =
            solve_with_continuation(&circuit, &mut mna, &dc_point(&x0), &x0, &cfg, &cancel)
                .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }
}
