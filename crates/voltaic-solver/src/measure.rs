//! Waveform measurements over transient results.
//!
//! Post-processing queries against a [`TransientResult`]: statistics over a
//! time window, interpolated point values, and zero-crossing location with
//! edge selection and occurrence counting. The crossing locator is what
//! switch-timing checks (duty cycle, conduction intervals, propagation
//! delays) are built from.

use thiserror::Error;

use crate::transient::TransientResult;

/// A scalar waveform of a simulation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Voltage of a named node.
    NodeVoltage(String),
    /// Branch current of a named element.
    BranchCurrent(String),
}

impl Signal {
    pub fn v(node: impl Into<String>) -> Self {
        Signal::NodeVoltage(node.into())
    }

    pub fn i(element: impl Into<String>) -> Self {
        Signal::BranchCurrent(element.into())
    }
}

/// Statistic over a waveform window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Avg,
    Rms,
    Min,
    Max,
    PeakToPeak,
    /// Trapezoidal time integral.
    Integral,
}

/// Which threshold crossings count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rise,
    Fall,
    Either,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    #[error("unknown signal {0:?}")]
    UnknownSignal(String),
    #[error("no data points in the requested window")]
    NoData,
    #[error("crossing {occurrence} of threshold {threshold} not found")]
    CrossingNotFound { threshold: f64, occurrence: usize },
}

fn waveform(result: &TransientResult, signal: &Signal) -> Result<Vec<f64>, MeasureError> {
    match signal {
        Signal::NodeVoltage(node) => result
            .node_voltage(node)
            .ok_or_else(|| MeasureError::UnknownSignal(node.clone())),
        Signal::BranchCurrent(element) => result
            .branch_current(element)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| MeasureError::UnknownSignal(element.clone())),
    }
}

/// Evaluate a statistic over `[from, to]` (defaults to the full run).
pub fn statistic(
    result: &TransientResult,
    signal: &Signal,
    stat: Stat,
    from: Option<f64>,
    to: Option<f64>,
) -> Result<f64, MeasureError> {
    let values = waveform(result, signal)?;
    let times = result.time_points();
    let t_start = from.unwrap_or(f64::NEG_INFINITY);
    let t_end = to.unwrap_or(f64::INFINITY);

    let (wt, wv): (Vec<f64>, Vec<f64>) = times
        .iter()
        .zip(values.iter())
        .filter(|&(&t, _)| t >= t_start && t <= t_end)
        .map(|(&t, &v)| (t, v))
        .unzip();

    if wv.is_empty() {
        return Err(MeasureError::NoData);
    }

    Ok(match stat {
        Stat::Avg => wv.iter().sum::<f64>() / wv.len() as f64,
        Stat::Rms => (wv.iter().map(|v| v * v).sum::<f64>() / wv.len() as f64).sqrt(),
        Stat::Min => wv.iter().copied().fold(f64::INFINITY, f64::min),
        Stat::Max => wv.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Stat::PeakToPeak => {
            let min = wv.iter().copied().fold(f64::INFINITY, f64::min);
            let max = wv.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            max - min
        }
        Stat::Integral => {
            let mut integral = 0.0;
            for i in 0..wt.len().saturating_sub(1) {
                integral += (wt[i + 1] - wt[i]) * (wv[i] + wv[i + 1]) / 2.0;
            }
            integral
        }
    })
}

/// Interpolated signal value at a specific time.
pub fn value_at(
    result: &TransientResult,
    signal: &Signal,
    time: f64,
) -> Result<f64, MeasureError> {
    let values = waveform(result, signal)?;
    let times = result.time_points();
    if times.is_empty() {
        return Err(MeasureError::NoData);
    }
    if time <= times[0] {
        return Ok(values[0]);
    }
    if time >= *times.last().unwrap() {
        return Ok(*values.last().unwrap());
    }
    for i in 0..times.len() - 1 {
        if time >= times[i] && time <= times[i + 1] {
            let alpha = (time - times[i]) / (times[i + 1] - times[i]);
            return Ok(values[i] * (1.0 - alpha) + values[i + 1] * alpha);
        }
    }
    Err(MeasureError::NoData)
}

/// Locate the `occurrence`-th (1-based) crossing of `threshold`.
///
/// The instant is linearly interpolated between the bracketing samples.
pub fn crossing_time(
    result: &TransientResult,
    signal: &Signal,
    threshold: f64,
    edge: Edge,
    occurrence: usize,
) -> Result<f64, MeasureError> {
    let values = waveform(result, signal)?;
    let times = result.time_points();
    if values.len() < 2 {
        return Err(MeasureError::NoData);
    }

    let mut count = 0;
    for i in 0..values.len() - 1 {
        let (v0, v1) = (values[i], values[i + 1]);
        let crossed = match edge {
            Edge::Rise => v0 < threshold && v1 >= threshold,
            Edge::Fall => v0 > threshold && v1 <= threshold,
            Edge::Either => {
                (v0 < threshold && v1 >= threshold) || (v0 > threshold && v1 <= threshold)
            }
        };
        if crossed {
            count += 1;
            if count == occurrence {
                if (v1 - v0).abs() < 1e-30 {
                    return Ok(times[i]);
                }
                let alpha = (threshold - v0) / (v1 - v0);
                return Ok(times[i] + alpha * (times[i + 1] - times[i]));
            }
        }
    }

    Err(MeasureError::CrossingNotFound {
        threshold,
        occurrence,
    })
}

/// Time from one signal's crossing to another's (propagation delay).
pub fn delay_between(
    result: &TransientResult,
    trigger: (&Signal, f64, Edge),
    target: (&Signal, f64, Edge),
) -> Result<f64, MeasureError> {
    let t_trig = crossing_time(result, trigger.0, trigger.1, trigger.2, 1)?;
    let t_targ = crossing_time(result, target.0, target.1, target.2, 1)?;
    Ok(t_targ - t_trig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use nalgebra::DVector;

    /// Ramp 0..0.9 on node "a", sine-ish current on "R1".
    fn ramp_result() -> TransientResult {
        let mut names = IndexMap::new();
        names.insert("a".to_string(), 0);
        let mut r = TransientResult::new(names);
        for i in 0..10 {
            let t = i as f64 * 0.1;
            r.push_sample(
                t,
                DVector::from_vec(vec![t]),
                std::iter::once(("R1".to_string(), 1.0 - t)),
            );
        }
        r
    }

    #[test]
    fn statistics_on_a_ramp() {
        let r = ramp_result();
        let v = Signal::v("a");
        assert_relative_eq!(
            statistic(&r, &v, Stat::Max, None, None).unwrap(),
            0.9,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            statistic(&r, &v, Stat::Min, None, None).unwrap(),
            0.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            statistic(&r, &v, Stat::Avg, None, None).unwrap(),
            0.45,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            statistic(&r, &v, Stat::PeakToPeak, None, None).unwrap(),
            0.9,
            epsilon = 1e-12
        );
        // ∫ t dt over [0, 0.9] = 0.405; trapezoids on a line are exact.
        assert_relative_eq!(
            statistic(&r, &v, Stat::Integral, None, None).unwrap(),
            0.405,
            epsilon = 1e-12
        );
    }

    #[test]
    fn windowed_statistic() {
        let r = ramp_result();
        let v = Signal::v("a");
        // Samples at 0.5..0.9: average 0.7.
        assert_relative_eq!(
            statistic(&r, &v, Stat::Avg, Some(0.5), None).unwrap(),
            0.7,
            epsilon = 1e-9
        );
        assert!(matches!(
            statistic(&r, &v, Stat::Avg, Some(5.0), None),
            Err(MeasureError::NoData)
        ));
    }

    #[test]
    fn branch_current_signal() {
        let r = ramp_result();
        let i = Signal::i("R1");
        assert_relative_eq!(
            statistic(&r, &i, Stat::Max, None, None).unwrap(),
            1.0,
            epsilon = 1e-12
        );
        assert!(matches!(
            statistic(&r, &Signal::i("R9"), Stat::Max, None, None),
            Err(MeasureError::UnknownSignal(_))
        ));
    }

    #[test]
    fn crossing_with_interpolation() {
        let r = ramp_result();
        let v = Signal::v("a");
        let t = crossing_time(&r, &v, 0.45, Edge::Rise, 1).unwrap();
        assert_relative_eq!(t, 0.45, epsilon = 1e-12);
        // The ramp never falls.
        assert!(matches!(
            crossing_time(&r, &v, 0.45, Edge::Fall, 1),
            Err(MeasureError::CrossingNotFound { .. })
        ));
    }

    #[test]
    fn delay_between_signals() {
        let r = ramp_result();
        // V(a) rises through 0.2 at t=0.2; I(R1) falls through 0.5 at t=0.5.
        let d = delay_between(
            &r,
            (&Signal::v("a"), 0.2, Edge::Rise),
            (&Signal::i("R1"), 0.5, Edge::Fall),
        )
        .unwrap();
        assert_relative_eq!(d, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn value_at_interpolates() {
        let r = ramp_result();
        assert_relative_eq!(
            value_at(&r, &Signal::v("a"), 0.45).unwrap(),
            0.45,
            epsilon = 1e-12
        );
        // Clamped at the ends.
        assert_relative_eq!(
            value_at(&r, &Signal::v("a"), 5.0).unwrap(),
            0.9,
            epsilon = 1e-12
        );
    }
}
