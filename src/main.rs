//! ktz-scan - KTz map return maps and ISI scan rasterization
//!
//! Usage:
//!   ktz-scan return-map --out return_map.txt
//!   ktz-scan aggregate --input scan.dat --out grid.txt --report report.json
//!   ktz-scan scan --out scan.dat
//!
//! `--config FILE` overlays a JSON file on the built-in defaults. Log level is
//! taken from `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ktz_scan::config::Config;
use ktz_scan::ingest::CancelToken;
use ktz_scan::pipeline::{self, AggregationReport};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser)]
#[command(name = "ktz-scan")]
#[command(about = "KTz neuron map trajectories and ISI scan aggregation")]
#[command(version)]
struct Cli {
    /// JSON config overlaid on the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Iterate the map and write the first-return map `x_t x_next`
    #[command(name = "return-map")]
    ReturnMap {
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Stream a scan results file into a grid of per-cell means
    Aggregate {
        /// Results file (fixed header, Fortran-formatted records)
        #[arg(short, long)]
        input: PathBuf,

        /// Grid table `row col x y count mean`
        #[arg(short, long)]
        out: PathBuf,

        /// JSON report with domains and tallies
        #[arg(long)]
        report: Option<PathBuf>,

        /// Aggregation tasks (overrides ingest.workers)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Sweep (x_R, T) and write a results file
    Scan {
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on Ctrl-C; the read stops at the next batch boundary
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "ktz-scan starting");

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::defaults().context("loading built-in defaults")?,
    };

    match cli.command {
        Commands::ReturnMap { out } => {
            let map = tokio::task::spawn_blocking(move || pipeline::return_map(&config))
                .await
                .context("return map task failed")??;
            pipeline::write_return_map(&map, &out)
                .with_context(|| format!("writing {}", out.display()))?;
        }

        Commands::Aggregate {
            input,
            out,
            report,
            workers,
        } => {
            let workers = workers.unwrap_or(config.ingest.workers);
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            let token = CancelToken::new();
            cancel_on_ctrl_c(token.clone());

            let start = Instant::now();
            let aggregation = if workers > 1 {
                pipeline::aggregate_file_parallel(&config, &input, workers, Some(token)).await
            } else {
                let config = config.clone();
                let input = input.clone();
                tokio::task::spawn_blocking(move || {
                    pipeline::aggregate_file(&config, &input, Some(&token))
                })
                .await
                .context("aggregation task failed")?
            }
            .with_context(|| format!("aggregating {}", input.display()))?;
            let elapsed = start.elapsed().as_secs_f64();

            pipeline::write_grid(&aggregation.snapshot, &out)
                .with_context(|| format!("writing {}", out.display()))?;
            if let Some(path) = report {
                let summary = AggregationReport::new(&input, &aggregation, workers, elapsed);
                pipeline::write_report(&summary, &path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            info!(elapsed_secs = elapsed, "done");
        }

        Commands::Scan { out } => {
            let rows = tokio::task::spawn_blocking(move || pipeline::write_scan(&config, &out))
                .await
                .context("scan task failed")??;
            info!(rows, "done");
        }
    }

    Ok(())
}
