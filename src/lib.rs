//! KTz logistic neuron map tooling
//!
//! - `dynamics`: map iteration, trajectory sampling, ISI analysis, parameter scans
//! - `ingest`: streaming reader and writer for Fortran-formatted scan results
//! - `grid`: order-independent 2D aggregation of scan records
//! - `config`: JSON configuration with embedded defaults
//! - `pipeline`: end-to-end runs and output files
//!
//! The library logs through `tracing`; installing a subscriber is left to the
//! caller.

pub mod config;
pub mod dynamics;
pub mod error;
pub mod grid;
pub mod ingest;
pub mod memprof;
pub mod pipeline;

pub use error::{Error, Result};
