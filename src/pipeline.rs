//! End-to-end runs shared by the CLI and tests
//!
//! The pipelines:
//! 1. Return map: iterate the map, discard the transient, collect `(x_t, x_next)`
//! 2. Aggregation: optional bounds pass, then stream the results file into a grid
//! 3. Scan: sweep (x_R, T) and write a results file the aggregation can read
//!
//! Outputs are plain files for an external renderer: space-separated tables
//! and a JSON report.

use crate::config::Config;
use crate::dynamics::ReturnMap;
use crate::error::{ExportError, IngestError, Result};
use crate::grid::{aggregate_parallel, AxisDomain, BoundsScan, GridAggregator, GridSnapshot, GridSpec};
use crate::ingest::{CancelToken, ParseStats, ScanWriter, StreamingRecordParser};
use crate::memprof::Profiler;
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Grid plus the bookkeeping of the read that produced it
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub snapshot: GridSnapshot,
    pub stats: ParseStats,
    /// Stats of the bounds pass, when the domain was derived from the data
    pub bounds_stats: Option<ParseStats>,
}

/// JSON summary written next to the grid table
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub input: PathBuf,
    pub width: usize,
    pub height: usize,
    pub x: AxisDomain,
    pub y: AxisDomain,
    pub workers: usize,
    pub parse: ParseStats,
    pub binned: u64,
    pub out_of_domain: u64,
    pub populated_cells: usize,
    /// Smallest and largest cell mean
    pub value_range: Option<(f64, f64)>,
    pub elapsed_secs: f64,
}

impl AggregationReport {
    pub fn new(input: &Path, aggregation: &Aggregation, workers: usize, elapsed_secs: f64) -> Self {
        let grid = &aggregation.snapshot;
        Self {
            input: input.to_path_buf(),
            width: grid.width(),
            height: grid.height(),
            x: grid.x,
            y: grid.y,
            workers,
            parse: aggregation.stats.clone(),
            binned: grid.binned,
            out_of_domain: grid.out_of_domain,
            populated_cells: grid.populated(),
            value_range: grid.value_range(),
            elapsed_secs,
        }
    }
}

/// Iterate the configured trajectory into a first-return map
pub fn return_map(config: &Config) -> Result<ReturnMap> {
    let sampler = config.sampler()?;
    let mut profiler = Profiler::start("return-map");
    info!(
        steps = config.trajectory.steps,
        transient = config.trajectory.transient,
        retained = sampler.retained(),
        "iterating map"
    );

    let map = ReturnMap::collect(sampler.samples(config.trajectory.initial));
    profiler.checkpoint("iterate");

    let non_finite = map.non_finite_count();
    if non_finite > 0 {
        warn!(non_finite, "trajectory contains non-finite values");
    }
    Ok(map)
}

/// Min/max of the grid coordinate fields over the whole file
pub fn scan_bounds(
    config: &Config,
    input: &Path,
    cancel: Option<&CancelToken>,
) -> Result<(BoundsScan, ParseStats)> {
    let mut parser = open_parser(config, input, cancel)?;
    let mut bounds = BoundsScan::new(config.grid.fields);
    while let Some(batch) = parser.next_batch()? {
        for record in &batch.records {
            bounds.observe(record);
        }
    }
    info!(x = ?bounds.x_range(), y = ?bounds.y_range(), "derived grid bounds");
    Ok((bounds, parser.into_stats()))
}

/// Configured grid, running a bounds pass first when a range is missing
pub fn resolve_grid(
    config: &Config,
    input: &Path,
    cancel: Option<&CancelToken>,
) -> Result<(GridSpec, Option<ParseStats>)> {
    if !config.needs_bounds() {
        return Ok((config.grid_spec(None)?, None));
    }
    let (bounds, stats) = scan_bounds(config, input, cancel)?;
    Ok((config.grid_spec(Some(&bounds))?, Some(stats)))
}

/// Aggregate `input` on the calling thread
pub fn aggregate_file(
    config: &Config,
    input: &Path,
    cancel: Option<&CancelToken>,
) -> Result<Aggregation> {
    let mut profiler = Profiler::start("aggregate");
    let (spec, bounds_stats) = resolve_grid(config, input, cancel)?;
    profiler.checkpoint("bounds");

    let mut parser = open_parser(config, input, cancel)?;
    let mut aggregator = GridAggregator::new(spec);
    while let Some(batch) = parser.next_batch()? {
        aggregator.ingest_batch(&batch.records);
    }
    let stats = parser.into_stats();
    profiler.checkpoint("ingest");

    let snapshot = aggregator.finalize();
    log_aggregation(&stats, &snapshot);
    Ok(Aggregation {
        snapshot,
        stats,
        bounds_stats,
    })
}

/// Aggregate `input` with `workers` blocking tasks
///
/// Produces exactly the grid `aggregate_file` does.
pub async fn aggregate_file_parallel(
    config: &Config,
    input: &Path,
    workers: usize,
    cancel: Option<CancelToken>,
) -> Result<Aggregation> {
    let mut profiler = Profiler::start("aggregate-parallel");

    let bounds_config = config.clone();
    let bounds_input = input.to_path_buf();
    let bounds_cancel = cancel.clone();
    let (spec, bounds_stats) = tokio::task::spawn_blocking(move || {
        resolve_grid(&bounds_config, &bounds_input, bounds_cancel.as_ref())
    })
    .await
    .map_err(|e| IngestError::Worker(e.to_string()))??;
    profiler.checkpoint("bounds");

    let parser = open_parser(config, input, cancel.as_ref())?;
    let (snapshot, stats) = aggregate_parallel(parser, spec, workers).await?;
    profiler.checkpoint("ingest");

    log_aggregation(&stats, &snapshot);
    Ok(Aggregation {
        snapshot,
        stats,
        bounds_stats,
    })
}

fn open_parser(
    config: &Config,
    input: &Path,
    cancel: Option<&CancelToken>,
) -> Result<StreamingRecordParser<std::io::BufReader<File>>> {
    let parser = StreamingRecordParser::open(input, config.parser_options())?;
    Ok(match cancel {
        Some(token) => parser.with_cancel(token.clone()),
        None => parser,
    })
}

fn log_aggregation(stats: &ParseStats, grid: &GridSnapshot) {
    info!(
        records = stats.records,
        blank = stats.blank_lines,
        malformed = stats.malformed,
        binned = grid.binned,
        out_of_domain = grid.out_of_domain,
        populated = grid.populated(),
        "aggregation complete"
    );
    if stats.malformed > 0 {
        warn!(malformed = stats.malformed, "malformed lines were skipped");
    }
}

/// Run the configured scan into a results file; returns the rows written
pub fn write_scan(config: &Config, out: &Path) -> Result<u64> {
    let sweep = config.sweep()?;
    let mut profiler = Profiler::start("scan");
    info!(points = sweep.len(), steps = sweep.steps(), "running parameter scan");

    let file = create(out)?;
    let mut writer = ScanWriter::new(BufWriter::new(file), config.scan.header_lines);
    let p = sweep.base();
    let metadata = [
        "KTz map ISI scan".to_string(),
        format!("k={} H={} I={} d={} l={}", p.k, p.h, p.i, p.d, p.l),
        format!(
            "x_R from {} to {} ({} points)",
            sweep.x_r_range().start,
            sweep.x_r_range().end,
            sweep.x_r_range().points
        ),
        format!(
            "T from {} to {} ({} points)",
            sweep.t_range().start,
            sweep.t_range().end,
            sweep.t_range().points
        ),
        format!(
            "steps={} transient={} threshold={}",
            config.scan.steps, config.scan.transient, config.scan.threshold
        ),
        "columns: x_R T spike_count mean_isi period".to_string(),
    ];
    let io_err = |source| ExportError::Io {
        path: out.to_path_buf(),
        source,
    };
    writer.write_header(&metadata).map_err(io_err)?;

    let total = sweep.len() as u64;
    let report_every = (total / 10).max(1);
    for point in sweep.points() {
        writer.write_point(&point).map_err(io_err)?;
        if writer.rows() % report_every == 0 {
            info!(done = writer.rows(), total, "scan progress");
        }
    }
    let rows = writer.rows();
    writer.finish().map_err(io_err)?;
    profiler.checkpoint("scan");
    info!(rows, path = %out.display(), "scan written");
    Ok(rows)
}

/// `x_t x_next` table
pub fn write_return_map(map: &ReturnMap, out: &Path) -> Result<()> {
    let mut df = map.to_dataframe()?;
    write_table(&mut df, out)?;
    info!(rows = map.len(), path = %out.display(), "return map written");
    Ok(())
}

/// `row col x y count mean` table, one line per cell
pub fn write_grid(grid: &GridSnapshot, out: &Path) -> Result<()> {
    let mut df = grid.to_dataframe()?;
    write_table(&mut df, out)?;
    info!(cells = df.height(), path = %out.display(), "grid written");
    Ok(())
}

pub fn write_report(report: &AggregationReport, out: &Path) -> Result<()> {
    let file = create(out)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(ExportError::from)?;
    writer.flush().map_err(|source| ExportError::Io {
        path: out.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn write_table(df: &mut DataFrame, out: &Path) -> std::result::Result<(), ExportError> {
    let mut file = create(out)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b' ')
        .finish(df)?;
    Ok(())
}

fn create(path: &Path) -> std::result::Result<File, ExportError> {
    File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
