//! KTz map dynamics
//!
//! - `map`: one-step recurrence and lazy orbits
//! - `trajectory`: transient-discarding sampler and first-return maps
//! - `isi`: spike detection and inter-spike-interval statistics
//! - `sweep`: (x_R, T) parameter scans of the ISI statistic

pub mod isi;
pub mod map;
pub mod sweep;
pub mod trajectory;

pub use isi::{IsiHistogram, IsiSummary, SpikeDetector, SpikeTrain};
pub use map::{logistic, step, KtzMap, MapParameters, MapState, Orbit};
pub use sweep::{LinSpace, ParameterSweep, ScanPoint};
pub use trajectory::{run, ReturnMap, Sample, TrajectorySampler};
