//! Results-file writer for parameter scans
//!
//! Produces the same layout the parser consumes: a fixed number of header
//! lines, then one `x_R T spike_count mean_isi period` line per scan point.
//! Reals are written in Fortran double notation (`1.2500000000000000D+02`),
//! and a point with fewer than two spikes gets the `infinity` period token.

use super::normalize::INFINITY_SENTINEL;
use super::record::RawRecord;
use crate::dynamics::ScanPoint;
use std::io::{self, Write};

/// Format a double as `d.ddddddddddddddddD+XX` (17 significant digits)
pub fn fortran_double(value: f64) -> String {
    let formatted = format!("{:.16E}", value);
    if let Some((mantissa, exponent)) = formatted.split_once('E') {
        if let Ok(exponent) = exponent.parse::<i32>() {
            return format!("{}D{:+03}", mantissa, exponent);
        }
    }
    formatted
}

/// The record a parser yields for this point after normalization
pub fn scan_record(point: &ScanPoint) -> RawRecord {
    RawRecord::new([
        point.x_r,
        point.t,
        point.isi.spike_count as f64,
        point.isi.mean_isi,
        point.isi.period.map_or(INFINITY_SENTINEL, |p| p as f64),
    ])
}

pub struct ScanWriter<W: Write> {
    out: W,
    header_lines: usize,
    header_written: bool,
    rows: u64,
}

impl<W: Write> ScanWriter<W> {
    pub fn new(out: W, header_lines: usize) -> Self {
        Self {
            out,
            header_lines,
            header_written: false,
            rows: 0,
        }
    }

    /// Write exactly `header_lines` lines: `metadata` first, `#` padding after
    ///
    /// Metadata beyond the header size is dropped.
    pub fn write_header(&mut self, metadata: &[String]) -> io::Result<()> {
        for i in 0..self.header_lines {
            match metadata.get(i) {
                Some(line) => writeln!(self.out, "# {}", line)?,
                None => writeln!(self.out, "#")?,
            }
        }
        self.header_written = true;
        Ok(())
    }

    pub fn write_point(&mut self, point: &ScanPoint) -> io::Result<()> {
        if !self.header_written {
            self.write_header(&[])?;
        }
        let period = match point.isi.period {
            Some(p) => fortran_double(p as f64),
            None => "infinity".to_string(),
        };
        writeln!(
            self.out,
            "  {}  {}  {}  {}  {}",
            fortran_double(point.x_r),
            fortran_double(point.t),
            point.isi.spike_count,
            fortran_double(point.isi.mean_isi),
            period
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and hand back the sink
    pub fn finish(mut self) -> io::Result<W> {
        if !self.header_written {
            self.write_header(&[])?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}
