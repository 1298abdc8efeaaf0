//! KTz logistic map
//!
//! One discrete time step of the three-variable KTz neuron model with the
//! logistic saturation `f(u) = u / (1 + |u|)`:
//!
//! ```text
//! u  = (x - k*y + z + H + I) / T
//! x' = f(u)
//! y' = x
//! z' = (1 - d)*z - l*(x - x_R)
//! ```
//!
//! - `x`: membrane potential (arbitrary units)
//! - `y`: recovery variable
//! - `z`: slow ionic current, drives bursting
//! - `k`, `T`: fast-dynamics control
//! - `d`: recovery time of `z` (refractory period)
//! - `l`, `x_R`: slow spike/burst dynamics (`l` damping, `x_R` burst length)
//! - `H`, `I`: membrane bias and external current

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// `|T|` below this is rejected as a configuration error
pub const MIN_TIME_SCALE: f64 = 1e-12;

/// State of the map at one time step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MapState {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True when every component is finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Fixed model parameters for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapParameters {
    /// Coupling coefficient
    pub k: f64,
    /// Membrane bias
    #[serde(rename = "H")]
    pub h: f64,
    /// External current
    #[serde(rename = "I")]
    pub i: f64,
    /// Time-scale divisor, must be non-zero
    #[serde(rename = "T")]
    pub t: f64,
    /// Decay of the slow variable
    pub d: f64,
    /// Feedback of x into the slow variable
    pub l: f64,
    /// Reference level
    pub x_r: f64,
}

impl MapParameters {
    /// Reject parameter sets that would divide by (near) zero or start from NaN
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("k", self.k),
            ("H", self.h),
            ("I", self.i),
            ("T", self.t),
            ("d", self.d),
            ("l", self.l),
            ("x_r", self.x_r),
        ];
        for (name, value) in named {
            if !value.is_finite() {
                return Err(ConfigError::Invalid {
                    field: "params",
                    reason: format!("{} must be finite, got {}", name, value),
                });
            }
        }
        if self.t.abs() < MIN_TIME_SCALE {
            return Err(ConfigError::invalid(
                "params.T",
                format!("time-scale divisor must be non-zero, got {}", self.t),
            ));
        }
        Ok(())
    }

    /// Copy with a different reference level and time scale (parameter scans)
    pub fn with_scan_point(&self, x_r: f64, t: f64) -> Self {
        Self { x_r, t, ..*self }
    }
}

/// Logistic saturation: maps the real line onto (-1, 1), smooth and monotonic
#[inline]
pub fn logistic(u: f64) -> f64 {
    u / (1.0 + u.abs())
}

/// Advance the state by exactly one step
///
/// Pure function of its inputs. No NaN or overflow guards: a degenerate
/// parameter set propagates whatever the arithmetic yields.
#[inline]
pub fn step(state: MapState, params: &MapParameters) -> MapState {
    let MapState { x, y, z } = state;
    let u = (x - params.k * y + z + params.h + params.i) / params.t;
    MapState {
        x: logistic(u),
        y: x,
        z: (1.0 - params.d) * z - params.l * (x - params.x_r),
    }
}

/// Map with validated parameters
#[derive(Debug, Clone, Copy)]
pub struct KtzMap {
    params: MapParameters,
}

impl KtzMap {
    pub fn new(params: MapParameters) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub(crate) fn from_validated(params: MapParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MapParameters {
        &self.params
    }

    #[inline]
    pub fn step(&self, state: MapState) -> MapState {
        step(state, &self.params)
    }

    /// Infinite orbit starting after the first step from `initial`
    pub fn orbit(&self, initial: MapState) -> Orbit {
        Orbit {
            params: self.params,
            state: initial,
        }
    }
}

/// Lazy orbit; each item is the state after one more step
#[derive(Debug, Clone)]
pub struct Orbit {
    params: MapParameters,
    state: MapState,
}

impl Iterator for Orbit {
    type Item = MapState;

    #[inline]
    fn next(&mut self) -> Option<MapState> {
        self.state = step(self.state, &self.params);
        Some(self.state)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
