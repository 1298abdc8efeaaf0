use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration, reported before any computation starts
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation
    #[error("invalid '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Configuration file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration JSON is malformed or has the wrong shape
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Why a record line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    /// Line bytes are not UTF-8
    #[error("line is not valid UTF-8")]
    Encoding,
    /// Wrong number of whitespace-separated fields
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },
    /// Field could not be parsed as a number
    #[error("field {field} is not numeric")]
    NotNumeric { field: usize },
    /// Field parsed to NaN or an IEEE infinity
    #[error("field {field} is not finite")]
    NonFinite { field: usize },
}

/// Errors raised while streaming and aggregating a results file
#[derive(Debug, Error)]
pub enum IngestError {
    /// Reading the input failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input ended inside the fixed header
    #[error("truncated header: expected {expected} header lines, found {found}")]
    TruncatedHeader { expected: usize, found: usize },

    /// Strict mode: first line that failed normalization + parsing
    #[error("malformed record at line {line}: {reason} ({content:?})")]
    Malformed {
        line: u64,
        reason: MalformedReason,
        content: String,
    },

    /// Read was stopped between batches through a cancel token
    #[error("ingestion cancelled after {records} records")]
    Cancelled { records: u64 },

    /// Partial grids with different shapes cannot be merged
    #[error("grid shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// A parallel aggregation task panicked or was aborted
    #[error("aggregation worker failed: {0}")]
    Worker(String),
}

/// Errors raised while handing results to tabular/JSON outputs
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any error produced by this crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Type alias for Results using the crate Error
pub type Result<T> = std::result::Result<T, Error>;
