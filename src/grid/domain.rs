//! Axis domains and bin assignment
//!
//! Bin `i` of an axis covers `[edge(i), edge(i + 1))`; the last bin also
//! includes the domain maximum. A value equal to `edge(i)` always lands in
//! bin `i`: the index computed by division is corrected against `edge()`
//! itself, so rounding in the division cannot move a boundary value.

use crate::error::ConfigError;
use crate::ingest::{RawRecord, RECORD_ARITY};
use serde::{Deserialize, Serialize};

/// Equal-width binning of one coordinate range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDomain {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
}

impl AxisDomain {
    pub fn new(min: f64, max: f64, bins: usize) -> Result<Self, ConfigError> {
        if bins == 0 {
            return Err(ConfigError::invalid("grid", "bin count must be at least 1"));
        }
        if !min.is_finite() || !max.is_finite() {
            return Err(ConfigError::invalid(
                "grid",
                format!("domain [{}, {}] must be finite", min, max),
            ));
        }
        if min >= max {
            return Err(ConfigError::invalid(
                "grid",
                format!("domain [{}, {}] is empty or inverted", min, max),
            ));
        }
        if !(max - min).is_finite() {
            return Err(ConfigError::invalid(
                "grid",
                format!("domain [{}, {}] is too wide to bin", min, max),
            ));
        }
        Ok(Self { min, max, bins })
    }

    /// Domain spanning observed `[min, max]`
    ///
    /// When every observation had the same value the range is widened by 0.5
    /// on each side so the domain is never empty.
    pub fn covering(min: f64, max: f64, bins: usize) -> Result<Self, ConfigError> {
        if min < max {
            Self::new(min, max, bins)
        } else {
            Self::new(min - 0.5, max + 0.5, bins)
        }
    }

    /// Lower edge of bin `i`; `edge(bins)` is the domain maximum
    pub fn edge(&self, i: usize) -> f64 {
        if i >= self.bins {
            return self.max;
        }
        self.min + i as f64 * (self.max - self.min) / self.bins as f64
    }

    /// Midpoint of bin `i`
    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.edge(i) + self.edge(i + 1))
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Bin index of `value`, `None` outside `[min, max]` or for NaN
    pub fn bin(&self, value: f64) -> Option<usize> {
        if !self.contains(value) {
            return None;
        }
        if value == self.max {
            return Some(self.bins - 1);
        }

        let scaled = (value - self.min) / (self.max - self.min) * self.bins as f64;
        let mut index = (scaled as usize).min(self.bins - 1);
        while index > 0 && value < self.edge(index) {
            index -= 1;
        }
        while index + 1 < self.bins && value >= self.edge(index + 1) {
            index += 1;
        }
        Some(index)
    }
}

/// Which record fields feed the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// Horizontal coordinate (columns)
    pub x: usize,
    /// Vertical coordinate (rows)
    pub y: usize,
    /// Value averaged per cell
    pub value: usize,
}

impl Default for FieldSelection {
    /// T across, x_R up, ISI period as the value
    fn default() -> Self {
        Self {
            x: 1,
            y: 0,
            value: 4,
        }
    }
}

impl FieldSelection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, index) in [("x", self.x), ("y", self.y), ("value", self.value)] {
            if index >= RECORD_ARITY {
                return Err(ConfigError::Invalid {
                    field: "grid.fields",
                    reason: format!(
                        "{} field index {} out of range (records have {} fields)",
                        name, index, RECORD_ARITY
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Shape and field mapping of an aggregation grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub x: AxisDomain,
    pub y: AxisDomain,
    pub fields: FieldSelection,
}

impl GridSpec {
    pub fn new(x: AxisDomain, y: AxisDomain, fields: FieldSelection) -> Result<Self, ConfigError> {
        fields.validate()?;
        Ok(Self { x, y, fields })
    }

    pub fn width(&self) -> usize {
        self.x.bins
    }

    pub fn height(&self) -> usize {
        self.y.bins
    }

    /// `(row, col)` of a record, `None` when outside either domain
    pub fn locate(&self, record: &RawRecord) -> Option<(usize, usize)> {
        let col = self.x.bin(record.field(self.fields.x))?;
        let row = self.y.bin(record.field(self.fields.y))?;
        Some((row, col))
    }
}

/// Running min/max of the coordinate fields, for auto-ranged grids
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsScan {
    fields: FieldSelection,
    x: Option<(f64, f64)>,
    y: Option<(f64, f64)>,
}

impl BoundsScan {
    pub fn new(fields: FieldSelection) -> Self {
        Self {
            fields,
            x: None,
            y: None,
        }
    }

    pub fn observe(&mut self, record: &RawRecord) {
        widen(&mut self.x, record.field(self.fields.x));
        widen(&mut self.y, record.field(self.fields.y));
    }

    pub fn x_range(&self) -> Option<(f64, f64)> {
        self.x
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        self.y
    }

    /// Domains covering every observed value; fails when nothing was observed
    pub fn into_spec(self, width: usize, height: usize) -> Result<GridSpec, ConfigError> {
        let (x_min, x_max) = self
            .x
            .ok_or_else(|| ConfigError::invalid("grid", "no records to derive the x range from"))?;
        let (y_min, y_max) = self
            .y
            .ok_or_else(|| ConfigError::invalid("grid", "no records to derive the y range from"))?;
        GridSpec::new(
            AxisDomain::covering(x_min, x_max, width)?,
            AxisDomain::covering(y_min, y_max, height)?,
            self.fields,
        )
    }
}

fn widen(range: &mut Option<(f64, f64)>, value: f64) {
    if !value.is_finite() {
        return;
    }
    *range = Some(match *range {
        Some((lo, hi)) => (lo.min(value), hi.max(value)),
        None => (value, value),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_boundaries() {
        let axis = AxisDomain::new(0.0, 8.0, 4).unwrap();
        assert_eq!(axis.bin(0.0), Some(0));
        assert_eq!(axis.bin(1.999), Some(0));
        assert_eq!(axis.bin(2.0), Some(1)); // lower-bin-inclusive
        assert_eq!(axis.bin(6.0), Some(3));
        assert_eq!(axis.bin(8.0), Some(3)); // max belongs to the last bin
        assert_eq!(axis.bin(-0.0), Some(0));
    }

    #[test]
    fn test_computed_edge_lands_in_upper_bin() {
        let axis = AxisDomain::new(0.234, 0.255, 7).unwrap();
        for i in 1..axis.bins {
            let edge = axis.edge(i);
            assert_eq!(axis.bin(edge), Some(i), "edge {} = {}", i, edge);
            // Largest double strictly below the (positive) edge
            let below = f64::from_bits(edge.to_bits() - 1);
            assert_eq!(axis.bin(below), Some(i - 1));
        }
    }

    #[test]
    fn test_out_of_domain() {
        let axis = AxisDomain::new(-0.199, -0.191, 10).unwrap();
        assert_eq!(axis.bin(-0.2), None);
        assert_eq!(axis.bin(-0.19), None);
        assert_eq!(axis.bin(f64::NAN), None);
        assert_eq!(axis.bin(f64::INFINITY), None);
    }

    #[test]
    fn test_invalid_domains() {
        assert!(AxisDomain::new(0.0, 1.0, 0).is_err());
        assert!(AxisDomain::new(1.0, 1.0, 5).is_err());
        assert!(AxisDomain::new(2.0, 1.0, 5).is_err());
        assert!(AxisDomain::new(0.0, f64::INFINITY, 5).is_err());
    }

    #[test]
    fn test_overflowing_width_rejected() {
        assert!(AxisDomain::new(-1e308, 1e308, 4).is_err());
        assert!(AxisDomain::new(-f64::MAX, 0.0, 4).is_ok());
        assert!(AxisDomain::covering(-1.7e308, 1.7e308, 4).is_err());
    }

    #[test]
    fn test_centers() {
        let axis = AxisDomain::new(0.0, 8.0, 4).unwrap();
        assert_eq!(axis.center(0), 1.0);
        assert_eq!(axis.center(3), 7.0);
    }

    #[test]
    fn test_field_selection_validated() {
        let fields = FieldSelection {
            x: 1,
            y: 0,
            value: 5,
        };
        assert!(fields.validate().is_err());
        assert!(FieldSelection::default().validate().is_ok());
    }

    #[test]
    fn test_locate_uses_selected_fields() {
        let spec = GridSpec::new(
            AxisDomain::new(0.0, 1.0, 2).unwrap(),
            AxisDomain::new(0.0, 1.0, 4).unwrap(),
            FieldSelection::default(),
        )
        .unwrap();
        // y = field 0, x = field 1
        let record = RawRecord::new([0.3, 0.75, 0.0, 0.0, 9.0]);
        assert_eq!(spec.locate(&record), Some((1, 1)));
        let outside = RawRecord::new([1.5, 0.75, 0.0, 0.0, 9.0]);
        assert_eq!(spec.locate(&outside), None);
    }

    #[test]
    fn test_bounds_scan() {
        let mut scan = BoundsScan::new(FieldSelection::default());
        scan.observe(&RawRecord::new([-0.199, 0.240, 0.0, 0.0, 1.0]));
        scan.observe(&RawRecord::new([-0.191, 0.234, 0.0, 0.0, 1.0]));
        scan.observe(&RawRecord::new([-0.195, 0.255, 0.0, 0.0, 1.0]));
        assert_eq!(scan.x_range(), Some((0.234, 0.255)));
        assert_eq!(scan.y_range(), Some((-0.199, -0.191)));

        let spec = scan.into_spec(800, 600).unwrap();
        assert_eq!(spec.width(), 800);
        assert_eq!(spec.height(), 600);
        assert_eq!(spec.x.bin(0.255), Some(799));
    }

    #[test]
    fn test_bounds_scan_degenerate_and_empty() {
        let mut scan = BoundsScan::new(FieldSelection::default());
        assert!(scan.into_spec(10, 10).is_err());

        scan.observe(&RawRecord::new([1.0, 2.0, 0.0, 0.0, 0.0]));
        let spec = scan.into_spec(10, 10).unwrap();
        assert_eq!((spec.x.min, spec.x.max), (1.5, 2.5));
        assert_eq!(spec.y.bin(1.0), Some(5));
    }
}
