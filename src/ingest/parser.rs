//! Streaming results-file reader
//!
//! Reads a fixed header, then parses one record per line in bounded batches.
//! Only the current batch of parsed records and one line buffer are held in
//! memory, whatever the file size.
//!
//! Malformed lines are handled per `MalformedPolicy`:
//! - `Strict` (default): the first malformed line aborts the read
//! - `Lenient`: malformed lines are skipped and counted in `ParseStats`
//!
//! Blank lines are not records and are counted separately.

use super::normalize::parse_line;
use super::record::RawRecord;
use crate::error::{IngestError, MalformedReason};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header length of the observed results files
pub const DEFAULT_HEADER_LINES: usize = 24;

/// Records per batch unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 1_000_000;

/// Lenient mode logs the first few skipped lines at warn level, the rest at debug
const MALFORMED_WARN_LIMIT: u64 = 20;

const READ_BUFFER_BYTES: usize = 1 << 20;

/// What to do with a line that does not parse into a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort on the first malformed line
    #[default]
    Strict,
    /// Skip and count malformed lines
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Lines skipped unconditionally at the top of the file
    pub header_lines: usize,
    /// Records per batch; a memory knob only, never changes output
    pub batch_size: usize,
    pub policy: MalformedPolicy,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            header_lines: DEFAULT_HEADER_LINES,
            batch_size: DEFAULT_BATCH_SIZE,
            policy: MalformedPolicy::Strict,
        }
    }
}

/// Counters describing one read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// All lines consumed, header included
    pub lines_read: u64,
    pub header_lines: u64,
    pub records: u64,
    pub blank_lines: u64,
    pub malformed: u64,
    pub batches: u64,
}

/// One bounded group of consecutive records
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// 0-based batch sequence number
    pub index: u64,
    pub records: Vec<RawRecord>,
}

/// Shared flag for stopping a read between batches
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lazy, single-pass reader of a header-prefixed results file
pub struct StreamingRecordParser<R> {
    reader: R,
    source: PathBuf,
    options: ParserOptions,
    stats: ParseStats,
    cancel: Option<CancelToken>,
    line: Vec<u8>,
    header_done: bool,
    finished: bool,
}

impl StreamingRecordParser<BufReader<File>> {
    /// Open a results file; nothing beyond the file handle is read yet
    pub fn open(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        Ok(Self::from_reader(reader, options).with_source(path))
    }
}

impl<R: BufRead> StreamingRecordParser<R> {
    pub fn from_reader(reader: R, options: ParserOptions) -> Self {
        Self {
            reader,
            source: PathBuf::from("<reader>"),
            options: ParserOptions {
                // A zero batch size would never make progress
                batch_size: options.batch_size.max(1),
                ..options
            },
            stats: ParseStats::default(),
            cancel: None,
            line: Vec::new(),
            header_done: false,
            finished: false,
        }
    }

    /// Name used for the input in I/O errors
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    /// Check `token` before every batch
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn into_stats(self) -> ParseStats {
        self.stats
    }

    /// Flatten batches into a record stream
    pub fn records(self) -> Records<R> {
        Records {
            parser: self,
            current: Vec::new().into_iter(),
        }
    }

    /// Read up to `batch_size` records; `Ok(None)` once the input is exhausted
    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>, IngestError> {
        if self.finished {
            return Ok(None);
        }
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                self.finished = true;
                debug!(records = self.stats.records, "read cancelled between batches");
                return Err(IngestError::Cancelled {
                    records: self.stats.records,
                });
            }
        }
        if !self.header_done {
            self.skip_header()?;
        }

        let capacity = self.options.batch_size.min(64 * 1024);
        let mut records = Vec::with_capacity(capacity);
        while records.len() < self.options.batch_size {
            if !self.read_line()? {
                self.finished = true;
                break;
            }
            match parse_line(&self.line) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => self.stats.blank_lines += 1,
                Err(reason) => self.reject(reason)?,
            }
        }

        if records.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        self.stats.records += records.len() as u64;
        let index = self.stats.batches;
        self.stats.batches += 1;
        debug!(
            batch = index,
            records = records.len(),
            total = self.stats.records,
            "parsed batch"
        );
        Ok(Some(RecordBatch { index, records }))
    }

    fn skip_header(&mut self) -> Result<(), IngestError> {
        for skipped in 0..self.options.header_lines {
            if !self.read_line()? {
                self.finished = true;
                return Err(IngestError::TruncatedHeader {
                    expected: self.options.header_lines,
                    found: skipped,
                });
            }
        }
        self.stats.header_lines = self.options.header_lines as u64;
        self.header_done = true;
        Ok(())
    }

    /// Fill the line buffer without the line terminator; false at end of input
    fn read_line(&mut self) -> Result<bool, IngestError> {
        self.line.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|source| {
                self.finished = true;
                IngestError::Io {
                    path: self.source.clone(),
                    source,
                }
            })?;
        if read == 0 {
            return Ok(false);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        self.stats.lines_read += 1;
        Ok(true)
    }

    fn reject(&mut self, reason: MalformedReason) -> Result<(), IngestError> {
        let line = self.stats.lines_read;
        match self.options.policy {
            MalformedPolicy::Strict => {
                self.finished = true;
                Err(IngestError::Malformed {
                    line,
                    reason,
                    content: String::from_utf8_lossy(&self.line).into_owned(),
                })
            }
            MalformedPolicy::Lenient => {
                self.stats.malformed += 1;
                if self.stats.malformed <= MALFORMED_WARN_LIMIT {
                    warn!(line, %reason, "skipping malformed record");
                } else {
                    debug!(line, %reason, "skipping malformed record");
                }
                Ok(())
            }
        }
    }
}

impl<R: BufRead> Iterator for StreamingRecordParser<R> {
    type Item = Result<RecordBatch, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

/// Record-at-a-time view over a parser
pub struct Records<R> {
    parser: StreamingRecordParser<R>,
    current: std::vec::IntoIter<RawRecord>,
}

impl<R: BufRead> Records<R> {
    pub fn stats(&self) -> &ParseStats {
        self.parser.stats()
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<RawRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.next() {
                return Some(Ok(record));
            }
            match self.parser.next_batch() {
                Ok(Some(batch)) => self.current = batch.records.into_iter(),
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Open `path`, skip `header_lines`, and stream records with default batching
pub fn open(
    path: impl AsRef<Path>,
    header_lines: usize,
) -> Result<Records<BufReader<File>>, IngestError> {
    let options = ParserOptions {
        header_lines,
        ..ParserOptions::default()
    };
    Ok(StreamingRecordParser::open(path, options)?.records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    fn input(header: usize, body: &str) -> String {
        let mut text = String::new();
        for i in 0..header {
            text.push_str(&format!("# header line {}\n", i));
        }
        text.push_str(body);
        text
    }

    fn parser(text: &str, options: ParserOptions) -> StreamingRecordParser<Cursor<Vec<u8>>> {
        StreamingRecordParser::from_reader(Cursor::new(text.as_bytes().to_vec()), options)
    }

    fn options(header_lines: usize, batch_size: usize, policy: MalformedPolicy) -> ParserOptions {
        ParserOptions {
            header_lines,
            batch_size,
            policy,
        }
    }

    const BODY: &str = "\
-0.199 0.234 1 2 1.250D+02
-0.198 0.235 1 2 infinity
-0.197 0.236 1 2 7

-0.196 0.237 1 2 8.0D0
";

    #[test]
    fn test_header_skipped_and_records_in_order() {
        let text = input(24, BODY);
        let records: Vec<RawRecord> = parser(&text, ParserOptions::default())
            .records()
            .collect::<Result<_, _>>()
            .unwrap();

        let stats: Vec<f64> = records.iter().map(|r| r.statistic()).collect();
        assert_eq!(stats, vec![125.0, 1000.0, 7.0, 8.0]);
        assert_eq!(records[0].coord_a(), -0.199);
        assert_eq!(records[3].coord_b(), 0.237);
    }

    #[test]
    fn test_stats_counted() {
        let text = input(24, BODY);
        let mut p = parser(&text, options(24, 2, MalformedPolicy::Strict));
        let mut batches = 0;
        while let Some(batch) = p.next_batch().unwrap() {
            assert!(batch.records.len() <= 2);
            batches += 1;
        }
        let stats = p.stats();
        assert_eq!(batches, 2);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.records, 4);
        assert_eq!(stats.blank_lines, 1);
        assert_eq!(stats.header_lines, 24);
        assert_eq!(stats.lines_read, 29);
        assert_eq!(stats.malformed, 0);
    }

    #[test]
    fn test_batch_size_does_not_change_output() {
        let mut body = String::new();
        for i in 0..50 {
            body.push_str(&format!("{} {} 0 0 {}D-01\n", i % 7, i % 3, i));
        }
        let text = input(3, &body);
        let collect = |batch_size| -> Vec<RawRecord> {
            parser(&text, options(3, batch_size, MalformedPolicy::Strict))
                .records()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        let reference = collect(1);
        assert_eq!(reference.len(), 50);
        assert_eq!(collect(7), reference);
        assert_eq!(collect(1000), reference);
    }

    #[test]
    fn test_strict_mode_aborts_on_malformed() {
        let text = input(2, "1 2 3 4 5\n1 2 oops 4 5\n1 2 3 4 5\n");
        let mut records = parser(&text, options(2, 10, MalformedPolicy::Strict)).records();

        match records.next() {
            Some(Err(IngestError::Malformed {
                line,
                reason,
                content,
            })) => {
                assert_eq!(line, 4);
                assert_eq!(reason, MalformedReason::NotNumeric { field: 2 });
                assert_eq!(content, "1 2 oops 4 5");
            }
            other => panic!("expected malformed error, got {:?}", other),
        }
        assert!(records.next().is_none());
    }

    #[test]
    fn test_lenient_mode_skips_and_counts() {
        let text = input(2, "1 2 3 4 5\n1 2 oops 4 5\n1 2 3 4 6\n");
        let mut records = parser(&text, options(2, 10, MalformedPolicy::Lenient)).records();
        let values: Vec<f64> = records
            .by_ref()
            .map(|r| r.unwrap().statistic())
            .collect();
        assert_eq!(values, vec![5.0, 6.0]);
        assert_eq!(records.stats().malformed, 1);
        assert_eq!(records.stats().records, 2);
    }

    #[test]
    fn test_truncated_header_is_error() {
        let text = input(3, "");
        let mut p = parser(&text, options(24, 10, MalformedPolicy::Strict));
        assert!(matches!(
            p.next_batch(),
            Err(IngestError::TruncatedHeader {
                expected: 24,
                found: 3
            })
        ));
        assert!(p.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_header_only_file_is_empty_stream() {
        let text = input(24, "");
        let mut p = parser(&text, ParserOptions::default());
        assert!(p.next_batch().unwrap().is_none());
        assert_eq!(p.stats().records, 0);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let text = "h\r\n1 2 3 4 5\r\n6 7 8 9 10";
        let records: Vec<RawRecord> = parser(text, options(1, 10, MalformedPolicy::Strict))
            .records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].statistic(), 10.0);
    }

    #[test]
    fn test_cancel_between_batches() {
        let text = input(0, "1 2 3 4 5\n1 2 3 4 5\n1 2 3 4 5\n");
        let token = CancelToken::new();
        let mut p = parser(&text, options(0, 1, MalformedPolicy::Strict)).with_cancel(token.clone());

        assert_eq!(p.next_batch().unwrap().unwrap().records.len(), 1);
        token.cancel();
        assert!(matches!(
            p.next_batch(),
            Err(IngestError::Cancelled { records: 1 })
        ));
        assert!(p.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_open_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", input(24, BODY)).unwrap();
        file.flush().unwrap();

        let values: Vec<f64> = open(file.path(), 24)
            .unwrap()
            .map(|r| r.unwrap().statistic())
            .collect();
        assert_eq!(values, vec![125.0, 1000.0, 7.0, 8.0]);
    }

    #[test]
    fn test_open_missing_file() {
        let result = open("/nonexistent/ktz/results.dat", 24);
        assert!(matches!(result, Err(IngestError::Io { .. })));
    }
}
