//! Result types for transient analysis.

use indexmap::IndexMap;
use nalgebra::DVector;

use crate::error::FailureReason;

/// A single timepoint in a transient simulation result.
#[derive(Debug, Clone)]
pub struct TimePoint {
    /// Time value (s).
    pub time: f64,
    /// Solution vector at this time.
    pub solution: DVector<f64>,
}

/// Result of a transient simulation.
///
/// Samples are strictly increasing in time; rejected steps never appear.
#[derive(Debug, Clone)]
pub struct TransientResult {
    pub points: Vec<TimePoint>,
    pub converged: bool,
    pub failure: Option<FailureReason>,
    pub steps_accepted: usize,
    pub steps_rejected: usize,
    pub min_step_used: f64,
    pub max_step_used: f64,
    pub diagnostics: Vec<String>,
    node_names: IndexMap<String, usize>,
    branch_currents: IndexMap<String, Vec<f64>>,
}

impl TransientResult {
    pub(crate) fn new(node_names: IndexMap<String, usize>) -> Self {
        Self {
            points: Vec::new(),
            converged: true,
            failure: None,
            steps_accepted: 0,
            steps_rejected: 0,
            min_step_used: f64::INFINITY,
            max_step_used: 0.0,
            diagnostics: Vec::new(),
            node_names,
            branch_currents: IndexMap::new(),
        }
    }

    pub(crate) fn push_sample(
        &mut self,
        time: f64,
        solution: DVector<f64>,
        currents: impl Iterator<Item = (String, f64)>,
    ) {
        debug_assert!(
            self.points.last().map(|p| time > p.time).unwrap_or(true),
            "samples must be strictly increasing in time"
        );
        for (name, value) in currents {
            self.branch_currents
                .entry(name)
                .or_insert_with(|| Vec::with_capacity(self.points.len() + 1))
                .push(value);
        }
        self.points.push(TimePoint { time, solution });
    }

    /// All time values.
    pub fn time_points(&self) -> Vec<f64> {
        self.points.iter().map(|tp| tp.time).collect()
    }

    /// Voltage waveform of a named node; ground reads all zeros.
    pub fn node_voltage(&self, name: &str) -> Option<Vec<f64>> {
        if name == voltaic_devices::GROUND {
            return Some(vec![0.0; self.points.len()]);
        }
        let idx = *self.node_names.get(name)?;
        Some(self.points.iter().map(|tp| tp.solution[idx]).collect())
    }

    /// Branch-current waveform of a named element.
    pub fn branch_current(&self, name: &str) -> Option<&[f64]> {
        self.branch_currents.get(name).map(Vec::as_slice)
    }

    /// Names of all recorded branch currents.
    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.branch_currents.keys().map(String::as_str)
    }

    /// Interpolate the full solution at a specific time.
    ///
    /// Linear between the two nearest samples, clamped at the ends.
    pub fn interpolate_at(&self, time: f64) -> Option<DVector<f64>> {
        if self.points.is_empty() {
            return None;
        }
        if time <= self.points[0].time {
            return Some(self.points[0].solution.clone());
        }
        if time >= self.points.last()?.time {
            return Some(self.points.last()?.solution.clone());
        }
        for w in self.points.windows(2) {
            let (t0, t1) = (w[0].time, w[1].time);
            if time >= t0 && time <= t1 {
                let alpha = (time - t0) / (t1 - t0);
                return Some(&w[0].solution * (1.0 - alpha) + &w[1].solution * alpha);
            }
        }
        None
    }

    /// Interpolated node voltage at a specific time.
    pub fn voltage_at(&self, name: &str, time: f64) -> Option<f64> {
        if name == voltaic_devices::GROUND {
            return Some(0.0);
        }
        let idx = *self.node_names.get(name)?;
        self.interpolate_at(time).map(|sol| sol[idx])
    }

    /// Resample at evenly-spaced times (uniform output from adaptive runs).
    pub fn sample_at_times(&self, tstep: f64) -> Vec<TimePoint> {
        let Some(last) = self.points.last() else {
            return Vec::new();
        };
        let t_end = last.time;
        let mut out = Vec::new();
        let mut t = self.points[0].time;
        while t <= t_end + tstep * 1e-3 {
            if let Some(solution) = self.interpolate_at(t) {
                out.push(TimePoint { time: t, solution });
            }
            t += tstep;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_result() -> TransientResult {
        let mut names = IndexMap::new();
        names.insert("a".to_string(), 0);
        names.insert("b".to_string(), 1);
        let mut r = TransientResult::new(names);
        for (t, v) in [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)] {
            r.push_sample(
                t,
                DVector::from_vec(vec![v, 2.0 * v]),
                std::iter::once(("R1".to_string(), v * 10.0)),
            );
        }
        r
    }

    #[test]
    fn interpolation_midpoint_and_exact() {
        let r = sample_result();
        let mid = r.interpolate_at(0.5).unwrap();
        assert_relative_eq!(mid[0], 0.5);
        assert_relative_eq!(mid[1], 1.0);
        let exact = r.interpolate_at(1.0).unwrap();
        assert_relative_eq!(exact[0], 1.0);
        assert_relative_eq!(r.voltage_at("b", 1.5).unwrap(), 3.0);
        assert_relative_eq!(r.voltage_at("0", 1.5).unwrap(), 0.0);
    }

    #[test]
    fn resampling_is_uniform() {
        let r = sample_result();
        let sampled = r.sample_at_times(0.5);
        assert_eq!(sampled.len(), 5);
        assert_relative_eq!(sampled[1].time, 0.5);
        assert_relative_eq!(sampled[4].solution[0], 2.0);
    }

    #[test]
    fn branch_currents_tracked_per_sample() {
        let r = sample_result();
        assert_eq!(r.branch_current("R1").unwrap(), &[0.0, 10.0, 20.0]);
        assert!(r.branch_current("nope").is_none());
    }
}
