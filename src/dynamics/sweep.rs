//! Two-parameter ISI scan over (x_R, T)
//!
//! Every grid point restarts the map from the same initial state, runs it for
//! a fixed number of steps and summarizes the spike train. Points are produced
//! lazily in row-major order: x_R outer, T inner.

use super::isi::{IsiSummary, SpikeTrain};
use super::map::{KtzMap, MapParameters, MapState};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Evenly spaced values from `start` to `end` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinSpace {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl LinSpace {
    pub fn new(start: f64, end: f64, points: usize) -> Self {
        Self { start, end, points }
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.points == 0 {
            return Err(ConfigError::invalid(field, "points must be at least 1"));
        }
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(ConfigError::invalid(field, "start and end must be finite"));
        }
        Ok(())
    }

    /// Value at index `i`; a single point sits at `start`
    pub fn value(&self, i: usize) -> f64 {
        if self.points <= 1 {
            return self.start;
        }
        self.start + i as f64 * (self.end - self.start) / (self.points - 1) as f64
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.points).map(|i| self.value(i))
    }
}

/// One evaluated scan point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanPoint {
    pub x_r: f64,
    pub t: f64,
    pub isi: IsiSummary,
}

/// Scan over a rectangular (x_R, T) grid
#[derive(Debug, Clone)]
pub struct ParameterSweep {
    base: MapParameters,
    initial: MapState,
    x_r: LinSpace,
    t: LinSpace,
    steps: u64,
    transient: u64,
    threshold: f64,
}

impl ParameterSweep {
    /// Validates the ranges and every T the scan will visit
    pub fn new(
        base: MapParameters,
        initial: MapState,
        x_r: LinSpace,
        t: LinSpace,
        steps: u64,
        transient: u64,
    ) -> Result<Self, ConfigError> {
        x_r.validate("scan.x_r")?;
        t.validate("scan.t")?;
        for value in t.values() {
            base.with_scan_point(base.x_r, value).validate()?;
        }
        for value in x_r.values() {
            base.with_scan_point(value, base.t).validate()?;
        }
        Ok(Self {
            base,
            initial,
            x_r,
            t,
            steps,
            transient,
            threshold: 0.0,
        })
    }

    /// Override the spike threshold (default 0)
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn len(&self) -> usize {
        self.x_r.points * self.t.points
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn base(&self) -> &MapParameters {
        &self.base
    }

    pub fn x_r_range(&self) -> &LinSpace {
        &self.x_r
    }

    pub fn t_range(&self) -> &LinSpace {
        &self.t
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Evaluate a single grid point
    pub fn evaluate(&self, x_r: f64, t: f64) -> ScanPoint {
        // Every grid value was validated in new()
        let map = KtzMap::from_validated(self.base.with_scan_point(x_r, t));
        // The state just before the first retained step primes the detector
        let mut states = std::iter::once(self.initial)
            .chain(map.orbit(self.initial))
            .skip(self.transient as usize)
            .map(|s| s.x);
        let previous = states.next().unwrap_or(self.initial.x);
        let trace = states.take(self.steps.saturating_sub(self.transient) as usize);
        ScanPoint {
            x_r,
            t,
            isi: SpikeTrain::detect_after(previous, trace, self.threshold).summary(),
        }
    }

    /// Lazily evaluate the whole grid
    pub fn points(&self) -> impl Iterator<Item = ScanPoint> + '_ {
        self.x_r
            .values()
            .flat_map(move |x_r| self.t.values().map(move |t| self.evaluate(x_r, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MapParameters {
        MapParameters {
            k: 0.6,
            h: 0.0,
            i: 0.0,
            t: 0.25,
            d: 0.001,
            l: 0.001,
            x_r: -0.2,
        }
    }

    #[test]
    fn test_linspace_endpoints() {
        let space = LinSpace::new(0.234, 0.255, 4);
        assert_eq!(space.value(0), 0.234);
        assert!((space.value(3) - 0.255).abs() < 1e-15);
        assert_eq!(space.values().count(), 4);
        assert_eq!(LinSpace::new(1.0, 2.0, 1).value(0), 1.0);
    }

    #[test]
    fn test_sweep_row_major_order() {
        let sweep = ParameterSweep::new(
            base(),
            MapState::new(1.0, 1.0, 1.0),
            LinSpace::new(-0.199, -0.191, 2),
            LinSpace::new(0.234, 0.255, 3),
            50,
            0,
        )
        .unwrap();
        let points: Vec<ScanPoint> = sweep.points().collect();
        assert_eq!(points.len(), sweep.len());
        assert_eq!(points[0].x_r, -0.199);
        assert_eq!(points[1].x_r, -0.199);
        assert_eq!(points[3].x_r, sweep.x_r_range().value(1));
        assert_eq!(points[0].t, 0.234);
        assert_eq!(points[3].t, 0.234);
    }

    #[test]
    fn test_evaluate_matches_manual_detection() {
        let sweep = ParameterSweep::new(
            base(),
            MapState::new(1.0, 1.0, 1.0),
            LinSpace::new(-0.2, -0.2, 1),
            LinSpace::new(0.25, 0.25, 1),
            2000,
            100,
        )
        .unwrap();
        let point = sweep.evaluate(-0.2, 0.25);

        let map = KtzMap::new(base()).unwrap();
        let xs: Vec<f64> = map
            .orbit(MapState::new(1.0, 1.0, 1.0))
            .take(2000)
            .map(|s| s.x)
            .collect();
        let expected = SpikeTrain::detect_after(xs[99], xs[100..].iter().copied(), 0.0).summary();
        assert_eq!(point.isi, expected);
    }

    #[test]
    fn test_spike_on_first_step_counts() {
        // x = -0.5 jumps to u = 4.4, x' ~ 0.81 on the first step
        let initial = MapState::new(-0.5, -1.0, 1.0);
        let sweep = ParameterSweep::new(
            base(),
            initial,
            LinSpace::new(-0.2, -0.2, 1),
            LinSpace::new(0.25, 0.25, 1),
            50,
            0,
        )
        .unwrap();
        let point = sweep.evaluate(-0.2, 0.25);

        let map = KtzMap::new(base()).unwrap();
        let xs: Vec<f64> = map.orbit(initial).take(50).map(|s| s.x).collect();
        assert!(xs[0] > 0.0);
        let unprimed = SpikeTrain::detect(xs.iter().copied(), 0.0);
        assert_eq!(point.isi.spike_count, unprimed.len() as u64 + 1);
        assert_eq!(
            point.isi,
            SpikeTrain::detect_after(initial.x, xs.iter().copied(), 0.0).summary()
        );
    }

    #[test]
    fn test_zero_t_in_range_rejected() {
        let result = ParameterSweep::new(
            base(),
            MapState::new(1.0, 1.0, 1.0),
            LinSpace::new(-0.2, -0.2, 1),
            LinSpace::new(-0.1, 0.1, 3),
            10,
            0,
        );
        assert!(result.is_err());
    }
}
