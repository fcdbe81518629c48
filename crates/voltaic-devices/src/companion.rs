//! Companion-model generation for reactive elements.
//!
//! All time discretization lives here: given the integration method, the
//! step, and the committed history, these helpers return the equivalent
//! conductance / history source every reactive element stamps. Elements
//! supply only their constants and previous state.

/// Implicit integration rule for reactive elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMethod {
    /// First order, A-stable, dissipative. The robust default for switching
    /// circuits.
    #[default]
    BackwardEuler,
    /// Second order, A-stable, energy-conserving on LC loops; may ring at
    /// discontinuities.
    Trapezoidal,
}

/// A Norton companion: conductance in parallel with a history current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Companion {
    pub g_eq: f64,
    pub i_eq: f64,
}

/// Capacitor companion for one step.
///
/// Backward Euler: `G = C/h`, `I = G·v_prev`.
/// Trapezoidal: `G = 2C/h`, `I = G·v_prev + i_prev`.
pub fn capacitor_companion(
    c: f64,
    h: f64,
    method: IntegrationMethod,
    v_prev: f64,
    i_prev: f64,
) -> Companion {
    match method {
        IntegrationMethod::BackwardEuler => {
            let g_eq = c / h;
            Companion {
                g_eq,
                i_eq: g_eq * v_prev,
            }
        }
        IntegrationMethod::Trapezoidal => {
            let g_eq = 2.0 * c / h;
            Companion {
                g_eq,
                i_eq: g_eq * v_prev + i_prev,
            }
        }
    }
}

/// Capacitor current implied by the accepted step, used to advance history.
pub fn capacitor_update(
    c: f64,
    h: f64,
    method: IntegrationMethod,
    v_new: f64,
    v_prev: f64,
    i_prev: f64,
) -> f64 {
    match method {
        IntegrationMethod::BackwardEuler => c / h * (v_new - v_prev),
        IntegrationMethod::Trapezoidal => 2.0 * c / h * (v_new - v_prev) - i_prev,
    }
}

/// Branch-form inductor discretization.
///
/// The inductor keeps its branch current as an extra unknown; its branch row
/// reads `V(a) − V(b) − R_eq·I = rhs` with `R_eq = L/h` (BE) or `2L/h` (TR)
/// and the history on the right. Returns `(r_eq, rhs)`.
pub fn inductor_branch(
    l: f64,
    h: f64,
    method: IntegrationMethod,
    i_prev: f64,
    v_prev: f64,
) -> (f64, f64) {
    match method {
        IntegrationMethod::BackwardEuler => {
            let r_eq = l / h;
            (r_eq, -r_eq * i_prev)
        }
        IntegrationMethod::Trapezoidal => {
            let r_eq = 2.0 * l / h;
            (r_eq, -(r_eq * i_prev + v_prev))
        }
    }
}

/// Mutual-inductance cross term for a coupled pair.
///
/// Adds `−R_m·I_other` to each branch row with `R_m = M/h` (BE) or `2M/h`
/// (TR), and the matching history term `−R_m·i_other_prev` on the right.
pub fn mutual_branch(m: f64, h: f64, method: IntegrationMethod, i_other_prev: f64) -> (f64, f64) {
    let r_m = match method {
        IntegrationMethod::BackwardEuler => m / h,
        IntegrationMethod::Trapezoidal => 2.0 * m / h,
    };
    (r_m, -r_m * i_other_prev)
}

/// Milne-device local truncation error estimate for a capacitor voltage step.
pub fn capacitor_lte(c: f64, h: f64, v_new: f64, v_prev: f64, i_prev: f64) -> f64 {
    let i_trap = 2.0 * c / h * (v_new - v_prev) - i_prev;
    let i_be = c / h * (v_new - v_prev);
    (i_trap - i_be).abs() / 3.0
}

/// Milne-device local truncation error estimate for an inductor current step.
pub fn inductor_lte(l: f64, h: f64, v_new: f64, v_prev: f64) -> f64 {
    let di_trap = h / (2.0 * l) * (v_new + v_prev);
    let di_be = h / l * v_new;
    (di_trap - di_be).abs() / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn capacitor_be_matches_hand_calc() {
        // C = 1uF, h = 1us: Geq = 1.0; v_prev = 2.5 → Ieq = 2.5
        let comp = capacitor_companion(1e-6, 1e-6, IntegrationMethod::BackwardEuler, 2.5, 0.0);
        assert_relative_eq!(comp.g_eq, 1.0);
        assert_relative_eq!(comp.i_eq, 2.5);
    }

    #[test]
    fn capacitor_trap_includes_previous_current() {
        let comp = capacitor_companion(1e-6, 1e-6, IntegrationMethod::Trapezoidal, 1.0, 0.5);
        assert_relative_eq!(comp.g_eq, 2.0);
        assert_relative_eq!(comp.i_eq, 2.5);
    }

    #[test]
    fn inductor_branch_be() {
        // L = 1mH, h = 1us: Req = 1000; i_prev = 2A → rhs = -2000
        let (r_eq, rhs) = inductor_branch(1e-3, 1e-6, IntegrationMethod::BackwardEuler, 2.0, 0.0);
        assert_relative_eq!(r_eq, 1000.0);
        assert_relative_eq!(rhs, -2000.0);
    }

    #[test]
    fn inductor_branch_trap_carries_voltage_history() {
        let (r_eq, rhs) = inductor_branch(1e-3, 1e-6, IntegrationMethod::Trapezoidal, 1.0, 3.0);
        assert_relative_eq!(r_eq, 2000.0);
        assert_relative_eq!(rhs, -2003.0);
    }

    #[test]
    fn lte_vanishes_for_constant_rate() {
        // Linear voltage ramp: trapezoidal and BE currents agree.
        let c = 1e-6;
        let h = 1e-6;
        let dv = 0.1;
        let i_const = c * dv / h;
        let lte = capacitor_lte(c, h, dv, 0.0, i_const);
        assert!(lte < 1e-12, "LTE {} should vanish for a linear ramp", lte);
    }

    #[test]
    fn update_roundtrip_be() {
        // After a BE step the implied current matches Geq*(v_new - v_prev).
        let i = capacitor_update(1e-6, 1e-6, IntegrationMethod::BackwardEuler, 3.0, 2.0, 0.0);
        assert_relative_eq!(i, 1.0);
    }
}
