//! Finalized grid of per-cell means
//!
//! Cells are stored row-major. Row 0 holds the lowest y bin and column 0 the
//! lowest x bin. Empty cells carry no mean, which is distinct from a mean of
//! zero.

use super::domain::AxisDomain;
use crate::error::ExportError;
use polars::prelude::{col, lit, DataFrame, IntoColumn, IntoLazy, NamedFrom, Series};
use serde::Serialize;

/// Count and mean of one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellSummary {
    pub count: u64,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSnapshot {
    pub x: AxisDomain,
    pub y: AxisDomain,
    pub cells: Vec<CellSummary>,
    /// Records that landed in a cell
    pub binned: u64,
    /// Records with a coordinate outside the domain
    pub out_of_domain: u64,
}

impl GridSnapshot {
    pub fn width(&self) -> usize {
        self.x.bins
    }

    pub fn height(&self) -> usize {
        self.y.bins
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CellSummary> {
        if row >= self.height() || col >= self.width() {
            return None;
        }
        self.cells.get(row * self.width() + col)
    }

    /// Mean of a cell, `None` when empty or out of range
    pub fn mean(&self, row: usize, col: usize) -> Option<f64> {
        self.get(row, col).and_then(|cell| cell.mean)
    }

    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|cell| cell.count > 0).count()
    }

    /// Smallest and largest cell mean, ignoring empty cells
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.cells
            .iter()
            .filter_map(|cell| cell.mean)
            .filter(|mean| !mean.is_nan())
            .fold(None, |range, mean| match range {
                None => Some((mean, mean)),
                Some((lo, hi)) => Some((f64::min(lo, mean), f64::max(hi, mean))),
            })
    }

    /// Long-format table, one row per cell: `row col x y count mean`
    ///
    /// `x` and `y` are bin centers; `mean` is null for empty cells.
    pub fn to_dataframe(&self) -> Result<DataFrame, ExportError> {
        let n = self.cells.len();
        let mut rows = Vec::with_capacity(n);
        let mut cols = Vec::with_capacity(n);
        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);
        let mut counts = Vec::with_capacity(n);
        let mut means = Vec::with_capacity(n);

        for row in 0..self.height() {
            let y = self.y.center(row);
            for col in 0..self.width() {
                let cell = &self.cells[row * self.width() + col];
                rows.push(row as u32);
                cols.push(col as u32);
                xs.push(self.x.center(col));
                ys.push(y);
                counts.push(cell.count);
                means.push(cell.mean);
            }
        }

        let df = DataFrame::new(vec![
            Series::new("row".into(), rows).into_column(),
            Series::new("col".into(), cols).into_column(),
            Series::new("x".into(), xs).into_column(),
            Series::new("y".into(), ys).into_column(),
            Series::new("count".into(), counts).into_column(),
            Series::new("mean".into(), means).into_column(),
        ])?;
        Ok(df)
    }

    /// Same table restricted to cells that received at least one record
    pub fn populated_dataframe(&self) -> Result<DataFrame, ExportError> {
        let df = self
            .to_dataframe()?
            .lazy()
            .filter(col("count").gt(lit(0u64)))
            .collect()?;
        Ok(df)
    }
}
