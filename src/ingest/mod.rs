//! Results-file ingestion
//!
//! - `record`: fixed-arity numeric record
//! - `normalize`: Fortran exponent / `infinity` rewriting and line parsing
//! - `parser`: bounded-memory streaming reader with an explicit malformed-line policy
//! - `writer`: scan results in the same format, for round trips and synthetic inputs

pub mod normalize;
pub mod parser;
pub mod record;
pub mod writer;

pub use normalize::{normalize_line, parse_line, INFINITY_SENTINEL};
pub use parser::{
    open, CancelToken, MalformedPolicy, ParseStats, ParserOptions, RecordBatch, Records,
    StreamingRecordParser, DEFAULT_BATCH_SIZE, DEFAULT_HEADER_LINES,
};
pub use record::{RawRecord, RECORD_ARITY};
pub use writer::{fortran_double, scan_record, ScanWriter};
