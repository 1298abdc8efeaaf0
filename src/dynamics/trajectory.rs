//! Transient-discarding trajectory sampling and first-return maps

use super::map::{KtzMap, MapParameters, MapState};
use crate::error::{ConfigError, ExportError};
use polars::prelude::{DataFrame, IntoColumn, NamedFrom, Series};
use serde::{Deserialize, Serialize};

/// A retained state, captured after the transient window
pub type Sample = MapState;

impl MapState {
    /// Return-map coordinates `(x(t-1), x(t))` of this state
    #[inline]
    pub fn return_pair(&self) -> (f64, f64) {
        (self.y, self.x)
    }
}

/// Runs the map for `steps` steps and keeps everything after `transient`
#[derive(Debug, Clone, Copy)]
pub struct TrajectorySampler {
    map: KtzMap,
    steps: u64,
    transient: u64,
}

impl TrajectorySampler {
    /// `transient > steps` is allowed and simply retains nothing
    pub fn new(params: MapParameters, steps: u64, transient: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            map: KtzMap::new(params)?,
            steps,
            transient,
        })
    }

    /// Number of samples `run` returns
    pub fn retained(&self) -> u64 {
        self.steps.saturating_sub(self.transient)
    }

    /// Materialize all retained samples in temporal order
    pub fn run(&self, initial: MapState) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(self.retained() as usize);
        samples.extend(self.samples(initial));
        samples
    }

    /// Same sequence as `run`, produced lazily
    pub fn samples(&self, initial: MapState) -> impl Iterator<Item = Sample> {
        // u64 -> usize only overflows on 32-bit targets with > 4e9 steps
        let transient = usize::try_from(self.transient).unwrap_or(usize::MAX);
        let retained = usize::try_from(self.retained()).unwrap_or(usize::MAX);
        self.map.orbit(initial).skip(transient).take(retained)
    }
}

/// Sample `n` steps from `initial`, dropping the first `t`
pub fn run(
    initial: MapState,
    params: &MapParameters,
    n: u64,
    t: u64,
) -> Result<Vec<Sample>, ConfigError> {
    Ok(TrajectorySampler::new(*params, n, t)?.run(initial))
}

/// First-return map as two aligned coordinate sequences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnMap {
    /// x(t)
    pub x_t: Vec<f64>,
    /// x(t+1)
    pub x_next: Vec<f64>,
}

impl ReturnMap {
    /// Build from a sample stream without keeping the full triples
    pub fn collect(samples: impl IntoIterator<Item = Sample>) -> Self {
        let iter = samples.into_iter();
        let (lower, _) = iter.size_hint();
        let mut map = ReturnMap {
            x_t: Vec::with_capacity(lower),
            x_next: Vec::with_capacity(lower),
        };
        for sample in iter {
            let (x_t, x_next) = sample.return_pair();
            map.x_t.push(x_t);
            map.x_next.push(x_next);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.x_t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_t.is_empty()
    }

    /// Number of pairs containing a non-finite coordinate
    pub fn non_finite_count(&self) -> usize {
        self.x_t
            .iter()
            .zip(&self.x_next)
            .filter(|(a, b)| !a.is_finite() || !b.is_finite())
            .count()
    }

    /// Two-column frame `x_t`, `x_next` for a scatter renderer
    pub fn to_dataframe(&self) -> Result<DataFrame, ExportError> {
        let df = DataFrame::new(vec![
            Series::new("x_t".into(), self.x_t.as_slice()).into_column(),
            Series::new("x_next".into(), self.x_next.as_slice()).into_column(),
        ])?;
        Ok(df)
    }
}
