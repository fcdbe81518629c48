//! Time-domain source waveforms.
//!
//! Semantics follow SPICE conventions: SIN phase is in degrees, PULSE ramps
//! are linear, PWL interpolates linearly and clamps to its endpoints. The
//! transient driver evaluates [`Waveform::value_at`] only for `t > 0`; the
//! DC operating point uses [`Waveform::dc_value`], which is what makes
//! source stepping well-defined for every waveform kind.

use std::f64::consts::PI;

/// An independent-source waveform.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Constant value.
    Dc { value: f64 },
    /// `voff + va·exp(−theta·(t−td))·sin(2πf·(t−td) + phase°)`
    Sin {
        voff: f64,
        va: f64,
        freq: f64,
        td: f64,
        theta: f64,
        /// Phase in degrees.
        phase: f64,
    },
    /// Periodic trapezoidal pulse.
    Pulse {
        v1: f64,
        v2: f64,
        td: f64,
        tr: f64,
        tf: f64,
        pw: f64,
        per: f64,
    },
    /// Double-exponential rise/fall.
    Exp {
        v1: f64,
        v2: f64,
        td1: f64,
        tau1: f64,
        td2: f64,
        tau2: f64,
    },
    /// Piecewise-linear `(t, v)` points with strictly increasing times.
    Pwl { points: Vec<(f64, f64)> },
    /// Small-signal magnitude/phase; inert in DC and transient analyses.
    Ac { mag: f64, phase: f64 },
}

impl Waveform {
    /// Shorthand constructors mirroring the SPICE argument orders.
    pub fn dc(value: f64) -> Self {
        Waveform::Dc { value }
    }

    pub fn sin(voff: f64, va: f64, freq: f64) -> Self {
        Waveform::Sin {
            voff,
            va,
            freq,
            td: 0.0,
            theta: 0.0,
            phase: 0.0,
        }
    }

    pub fn sin_full(voff: f64, va: f64, freq: f64, td: f64, theta: f64, phase: f64) -> Self {
        Waveform::Sin {
            voff,
            va,
            freq,
            td,
            theta,
            phase,
        }
    }

    pub fn pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64) -> Self {
        Waveform::Pulse {
            v1,
            v2,
            td,
            tr,
            tf,
            pw,
            per,
        }
    }

    pub fn exp(v1: f64, v2: f64, td1: f64, tau1: f64, td2: f64, tau2: f64) -> Self {
        Waveform::Exp {
            v1,
            v2,
            td1,
            tau1,
            td2,
            tau2,
        }
    }

    pub fn pwl(points: Vec<(f64, f64)>) -> Self {
        Waveform::Pwl { points }
    }

    /// The value held at the DC operating point (`t = 0`).
    pub fn dc_value(&self) -> f64 {
        match self {
            Waveform::Dc { value } => *value,
            Waveform::Sin { voff, .. } => *voff,
            Waveform::Pulse { v1, .. } => *v1,
            Waveform::Exp { v1, .. } => *v1,
            Waveform::Pwl { points } => points.first().map(|&(_, v)| v).unwrap_or(0.0),
            Waveform::Ac { .. } => 0.0,
        }
    }

    /// Evaluate the waveform at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        match self {
            Waveform::Dc { value } => *value,
            Waveform::Sin {
                voff,
                va,
                freq,
                td,
                theta,
                phase,
            } => {
                let phase_rad = phase * PI / 180.0;
                if t < *td {
                    voff + va * phase_rad.sin()
                } else {
                    let dt = t - td;
                    voff + va * (-theta * dt).exp() * (2.0 * PI * freq * dt + phase_rad).sin()
                }
            }
            Waveform::Pulse {
                v1,
                v2,
                td,
                tr,
                tf,
                pw,
                per,
            } => {
                if t < *td {
                    return *v1;
                }
                let mut tc = t - td;
                if *per > 0.0 {
                    tc %= per;
                }
                if tc < *tr {
                    if *tr <= 0.0 {
                        *v2
                    } else {
                        v1 + (v2 - v1) * tc / tr
                    }
                } else if tc < tr + pw {
                    *v2
                } else if tc < tr + pw + tf {
                    if *tf <= 0.0 {
                        *v1
                    } else {
                        v2 + (v1 - v2) * (tc - tr - pw) / tf
                    }
                } else {
                    *v1
                }
            }
            Waveform::Exp {
                v1,
                v2,
                td1,
                tau1,
                td2,
                tau2,
            } => {
                let mut v = *v1;
                if t >= *td1 && *tau1 > 0.0 {
                    v += (v2 - v1) * (1.0 - (-(t - td1) / tau1).exp());
                }
                if t >= *td2 && *tau2 > 0.0 {
                    v += (v1 - v2) * (1.0 - (-(t - td2) / tau2).exp());
                }
                v
            }
            Waveform::Pwl { points } => {
                // Clamp to the endpoints outside the defined range.
                match points.first() {
                    None => 0.0,
                    Some(&(t0, v0)) if t <= t0 => v0,
                    Some(_) => {
                        let &(tn, vn) = points.last().unwrap();
                        if t >= tn {
                            return vn;
                        }
                        for w in points.windows(2) {
                            let (ta, va) = w[0];
                            let (tb, vb) = w[1];
                            if t >= ta && t <= tb {
                                let alpha = (t - ta) / (tb - ta);
                                return va + (vb - va) * alpha;
                            }
                        }
                        vn
                    }
                }
            }
            Waveform::Ac { .. } => 0.0,
        }
    }

    /// Whether a PWL waveform fully covers `[0, t_stop]`.
    ///
    /// Used by the transient driver to push a clamp warning into the result
    /// diagnostics; evaluation itself always clamps and never fails.
    pub fn covers(&self, t_stop: f64) -> bool {
        match self {
            Waveform::Pwl { points } => match (points.first(), points.last()) {
                (Some(&(t0, _)), Some(&(tn, _))) => t0 <= 0.0 && tn >= t_stop,
                _ => false,
            },
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dc_is_flat() {
        let w = Waveform::dc(5.0);
        assert_relative_eq!(w.value_at(0.0), 5.0);
        assert_relative_eq!(w.value_at(1.0), 5.0);
        assert_relative_eq!(w.dc_value(), 5.0);
    }

    #[test]
    fn sin_basic() {
        let w = Waveform::sin(1.0, 2.0, 50.0);
        // Quarter period of 50 Hz: sin peaks.
        assert_relative_eq!(w.value_at(0.005), 3.0, epsilon = 1e-9);
        assert_relative_eq!(w.value_at(0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(w.dc_value(), 1.0);
    }

    #[test]
    fn sin_damped_and_delayed() {
        let w = Waveform::sin_full(0.0, 1.0, 100.0, 0.01, 50.0, 0.0);
        // Before td the output holds the offset.
        assert_relative_eq!(w.value_at(0.005), 0.0);
        // Damping shrinks the envelope after td.
        let quarter = 0.01 + 1.0 / 400.0;
        let expected = (-50.0_f64 * (quarter - 0.01)).exp();
        assert_relative_eq!(w.value_at(quarter), expected, epsilon = 1e-9);
    }

    #[test]
    fn pulse_phases() {
        // 0→5V pulse: td=1us, tr=1us, pw=3us, tf=1us, per=10us
        let w = Waveform::pulse(0.0, 5.0, 1e-6, 1e-6, 1e-6, 3e-6, 10e-6);
        assert_relative_eq!(w.value_at(0.5e-6), 0.0);
        assert_relative_eq!(w.value_at(1.5e-6), 2.5, epsilon = 1e-9); // mid-rise
        assert_relative_eq!(w.value_at(3e-6), 5.0);
        assert_relative_eq!(w.value_at(5.5e-6), 2.5, epsilon = 1e-9); // mid-fall
        assert_relative_eq!(w.value_at(8e-6), 0.0);
        // One full period later, mid-rise again.
        assert_relative_eq!(w.value_at(11.5e-6), 2.5, epsilon = 1e-9);
    }

    #[test]
    fn pulse_zero_ramps_switch_instantly() {
        let w = Waveform::pulse(0.0, 1.0, 0.0, 0.0, 0.0, 5e-6, 10e-6);
        assert_relative_eq!(w.value_at(1e-6), 1.0);
        assert_relative_eq!(w.value_at(6e-6), 0.0);
    }

    #[test]
    fn exp_two_time_constants() {
        let w = Waveform::exp(0.0, 1.0, 0.0, 1e-3, 10e-3, 1e-3);
        // One tau into the rise.
        assert_relative_eq!(w.value_at(1e-3), 1.0 - (-1.0_f64).exp(), epsilon = 1e-9);
        // Long after the fall starts, back near v1.
        assert!(w.value_at(50e-3) < 1e-9);
    }

    #[test]
    fn pwl_interpolates_and_clamps() {
        let w = Waveform::pwl(vec![(0.0, 0.0), (1.0, 10.0), (2.0, -10.0)]);
        assert_relative_eq!(w.value_at(0.5), 5.0);
        assert_relative_eq!(w.value_at(1.5), 0.0);
        // Clamped outside the range.
        assert_relative_eq!(w.value_at(-1.0), 0.0);
        assert_relative_eq!(w.value_at(3.0), -10.0);
        assert!(!w.covers(3.0));
        assert!(w.covers(2.0));
    }

    #[test]
    fn ac_is_inert() {
        let w = Waveform::Ac {
            mag: 1.0,
            phase: 0.0,
        };
        assert_relative_eq!(w.value_at(1.0), 0.0);
        assert_relative_eq!(w.dc_value(), 0.0);
    }
}
