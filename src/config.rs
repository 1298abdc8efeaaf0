//! Run configuration
//!
//! All default values live in `defaults.json`, embedded at compile time. A
//! user config file is deep-merged over the defaults: it only needs the keys
//! it changes, and a key set to `null` resets an optional value.
//!
//! Everything is validated once, up front, so no computation starts on an
//! invalid configuration.

use crate::dynamics::{LinSpace, MapParameters, MapState, ParameterSweep, TrajectorySampler};
use crate::error::ConfigError;
use crate::grid::{AxisDomain, BoundsScan, FieldSelection, GridSpec};
use crate::ingest::{MalformedPolicy, ParserOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// defaults.json embedded at compile time
const DEFAULTS_JSON: &str = include_str!("../defaults.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub trajectory: TrajectoryConfig,
    pub ingest: IngestConfig,
    pub grid: GridConfig,
    pub scan: ScanConfig,
}

/// Return-map run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrajectoryConfig {
    pub initial: MapState,
    pub params: MapParameters,
    /// Total steps `n`
    pub steps: u64,
    /// Leading steps discarded, `t`
    pub transient: u64,
}

/// Results-file reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    pub header_lines: usize,
    /// Records per batch
    pub batch_size: usize,
    pub malformed: MalformedPolicy,
    /// Aggregation tasks; 1 aggregates on the reading thread
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    /// Columns (x bins)
    pub width: usize,
    /// Rows (y bins)
    pub height: usize,
    pub fields: FieldSelection,
    /// `[min, max]`; `None` derives it from the data
    pub x_range: Option<[f64; 2]>,
    pub y_range: Option<[f64; 2]>,
}

/// (x_R, T) parameter scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub x_r: LinSpace,
    pub t: LinSpace,
    pub steps: u64,
    pub transient: u64,
    /// Spike threshold on x
    pub threshold: f64,
    pub header_lines: usize,
}

impl Config {
    /// Built-in defaults
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str(DEFAULTS_JSON)?)
    }

    /// Defaults overlaid with the JSON file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_overrides(&text)
    }

    /// Defaults overlaid with a JSON document
    pub fn from_overrides(json: &str) -> Result<Self, ConfigError> {
        let mut merged: Value = serde_json::from_str(DEFAULTS_JSON)?;
        let overrides: Value = serde_json::from_str(json)?;
        if !overrides.is_object() {
            return Err(ConfigError::invalid("config", "top level must be a JSON object"));
        }
        merge_json(&mut merged, overrides);
        Self::from_value(merged)
    }

    fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trajectory.params.validate()?;
        if !self.trajectory.initial.is_finite() {
            return Err(ConfigError::invalid(
                "trajectory.initial",
                "initial state must be finite",
            ));
        }

        if self.ingest.batch_size == 0 {
            return Err(ConfigError::invalid("ingest.batch_size", "must be at least 1"));
        }
        if self.ingest.workers == 0 {
            return Err(ConfigError::invalid("ingest.workers", "must be at least 1"));
        }

        if self.grid.width == 0 {
            return Err(ConfigError::invalid("grid.width", "must be at least 1"));
        }
        if self.grid.height == 0 {
            return Err(ConfigError::invalid("grid.height", "must be at least 1"));
        }
        self.grid.fields.validate()?;
        if let Some([min, max]) = self.grid.x_range {
            AxisDomain::new(min, max, self.grid.width)?;
        }
        if let Some([min, max]) = self.grid.y_range {
            AxisDomain::new(min, max, self.grid.height)?;
        }

        // Checks both ranges and every T/x_R the scan visits
        self.sweep()?;
        Ok(())
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            header_lines: self.ingest.header_lines,
            batch_size: self.ingest.batch_size,
            policy: self.ingest.malformed,
        }
    }

    pub fn sampler(&self) -> Result<TrajectorySampler, ConfigError> {
        TrajectorySampler::new(
            self.trajectory.params,
            self.trajectory.steps,
            self.trajectory.transient,
        )
    }

    /// Scan over the configured ranges, with the trajectory parameters as base
    pub fn sweep(&self) -> Result<ParameterSweep, ConfigError> {
        let sweep = ParameterSweep::new(
            self.trajectory.params,
            self.trajectory.initial,
            self.scan.x_r,
            self.scan.t,
            self.scan.steps,
            self.scan.transient,
        )?;
        Ok(sweep.with_threshold(self.scan.threshold))
    }

    /// True when at least one grid axis must be derived from the data
    pub fn needs_bounds(&self) -> bool {
        self.grid.x_range.is_none() || self.grid.y_range.is_none()
    }

    /// Grid spec from configured ranges, falling back to `observed` per axis
    pub fn grid_spec(&self, observed: Option<&BoundsScan>) -> Result<GridSpec, ConfigError> {
        let x = resolve_axis(
            "grid.x_range",
            self.grid.x_range,
            observed.and_then(BoundsScan::x_range),
            self.grid.width,
        )?;
        let y = resolve_axis(
            "grid.y_range",
            self.grid.y_range,
            observed.and_then(BoundsScan::y_range),
            self.grid.height,
        )?;
        GridSpec::new(x, y, self.grid.fields)
    }
}

fn resolve_axis(
    field: &'static str,
    configured: Option<[f64; 2]>,
    observed: Option<(f64, f64)>,
    bins: usize,
) -> Result<AxisDomain, ConfigError> {
    match (configured, observed) {
        (Some([min, max]), _) => AxisDomain::new(min, max, bins),
        (None, Some((min, max))) => AxisDomain::covering(min, max, bins),
        (None, None) => Err(ConfigError::invalid(
            field,
            "not configured and no records to derive it from",
        )),
    }
}

/// Recursively overlay `overlay` onto `base`; non-object values replace
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
