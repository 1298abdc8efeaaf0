//! 2D binned aggregation of scan records
//!
//! - `domain`: axis ranges, bin assignment, field selection
//! - `cell`: exact per-cell sums
//! - `aggregator`: streaming accumulation and merging of partial grids
//! - `snapshot`: finalized means and their tabular form
//! - `parallel`: tokio fan-out over a streaming parser

pub mod aggregator;
pub mod cell;
pub mod domain;
pub mod parallel;
pub mod snapshot;

pub use aggregator::GridAggregator;
pub use cell::{ExactSum, GridCell};
pub use domain::{AxisDomain, BoundsScan, FieldSelection, GridSpec};
pub use parallel::aggregate_parallel;
pub use snapshot::{CellSummary, GridSnapshot};
