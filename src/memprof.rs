//! Memory and timing checkpoints for long runs
//!
//! - Memory: RSS (Resident Set Size) from /proc/self/status, Linux only
//! - Timing: wall clock since the run started and since the last checkpoint
//!
//! Checkpoints are emitted as `tracing` events on the `ktz_scan::memprof`
//! target, so `RUST_LOG=ktz_scan::memprof=debug` shows them.

use std::fs;
use std::time::Instant;
use tracing::debug;

/// Current RSS in bytes, `None` where /proc is unavailable
pub fn rss_bytes() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    // Format: "VmRSS:    123456 kB"
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

pub fn rss_mb() -> Option<f64> {
    rss_bytes().map(|bytes| bytes as f64 / (1024.0 * 1024.0))
}

/// Tracks elapsed time and RSS change between named checkpoints
#[derive(Debug)]
pub struct Profiler {
    run: &'static str,
    start: Instant,
    section_start: Instant,
    last_rss_mb: Option<f64>,
}

impl Profiler {
    pub fn start(run: &'static str) -> Self {
        let now = Instant::now();
        let rss = rss_mb();
        debug!(run, rss_mb = rss, "profiling started");
        Self {
            run,
            start: now,
            section_start: now,
            last_rss_mb: rss,
        }
    }

    /// Log the section that just ended and start the next one
    pub fn checkpoint(&mut self, label: &str) {
        let rss = rss_mb();
        let delta_mb = match (rss, self.last_rss_mb) {
            (Some(now), Some(before)) => Some(now - before),
            _ => None,
        };
        debug!(
            run = self.run,
            section = label,
            section_secs = self.section_start.elapsed().as_secs_f64(),
            total_secs = self.start.elapsed().as_secs_f64(),
            rss_mb = rss,
            delta_mb,
            "checkpoint"
        );
        self.section_start = Instant::now();
        self.last_rss_mb = rss;
    }

    /// Seconds since `start`
    pub fn total_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_rss_readable_on_linux() {
        let rss = rss_bytes().unwrap();
        assert!(rss > 0);
    }

    #[test]
    fn test_checkpoints_advance() {
        let mut profiler = Profiler::start("test");
        profiler.checkpoint("first");
        profiler.checkpoint("second");
        assert!(profiler.total_secs() >= 0.0);
    }
}
