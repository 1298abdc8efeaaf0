//! Parallel aggregation over a streaming parser
//!
//! The parser runs on one blocking task and deals batches round-robin to
//! worker tasks. Each worker owns a private `GridAggregator`; partial grids
//! are merged in worker order once the read completes. Cell sums are exact,
//! so the result is identical to a sequential pass for any worker count.
//!
//! Channels hold one batch each, so at most `2 * workers + 1` batches are in
//! memory at once.

use super::aggregator::GridAggregator;
use super::domain::GridSpec;
use super::snapshot::GridSnapshot;
use crate::error::IngestError;
use crate::ingest::{ParseStats, RecordBatch, StreamingRecordParser};
use futures::future::try_join_all;
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info};

fn worker_failed(e: JoinError) -> IngestError {
    IngestError::Worker(e.to_string())
}

/// Aggregate every record from `parser` into `spec` using `workers` tasks
pub async fn aggregate_parallel<R>(
    mut parser: StreamingRecordParser<R>,
    spec: GridSpec,
    workers: usize,
) -> Result<(GridSnapshot, ParseStats), IngestError>
where
    R: BufRead + Send + 'static,
{
    let workers = workers.max(1);
    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);

    for worker in 0..workers {
        let (tx, mut rx) = mpsc::channel::<RecordBatch>(1);
        senders.push(tx);
        handles.push(tokio::task::spawn_blocking(move || {
            let mut aggregator = GridAggregator::new(spec);
            let mut batches = 0u64;
            while let Some(batch) = rx.blocking_recv() {
                aggregator.ingest_batch(&batch.records);
                batches += 1;
            }
            debug!(worker, batches, binned = aggregator.binned(), "worker done");
            aggregator
        }));
    }

    let reader = tokio::task::spawn_blocking(move || -> Result<ParseStats, IngestError> {
        while let Some(batch) = parser.next_batch()? {
            let target = (batch.index % senders.len() as u64) as usize;
            senders[target].blocking_send(batch).map_err(|_| {
                IngestError::Worker(format!("worker {} stopped receiving", target))
            })?;
        }
        // Dropping the senders lets every worker drain and finish
        Ok(parser.into_stats())
    });

    let stats = reader.await.map_err(worker_failed)??;

    let partials = try_join_all(handles).await.map_err(worker_failed)?;
    let mut partials = partials.into_iter();
    let mut merged = match partials.next() {
        Some(first) => first,
        None => GridAggregator::new(spec),
    };
    for partial in partials {
        merged.merge(&partial)?;
    }

    info!(
        workers,
        records = stats.records,
        binned = merged.binned(),
        out_of_domain = merged.out_of_domain(),
        "parallel aggregation complete"
    );
    Ok((merged.finalize(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{AxisDomain, FieldSelection};
    use crate::ingest::{CancelToken, MalformedPolicy, ParserOptions};
    use std::io::Cursor;

    fn spec() -> GridSpec {
        GridSpec::new(
            AxisDomain::new(0.234, 0.255, 7).unwrap(),
            AxisDomain::new(-0.199, -0.191, 5).unwrap(),
            FieldSelection::default(),
        )
        .unwrap()
    }

    fn scan_file(rows: usize) -> Vec<u8> {
        let mut text = String::new();
        for i in 0..24 {
            text.push_str(&format!("# header {}\n", i));
        }
        for i in 0..rows {
            let x_r = -0.199 + 0.008 * (i % 40) as f64 / 40.0;
            let t = 0.234 + 0.021 * (i % 36) as f64 / 36.0;
            let period = if i % 11 == 0 {
                "infinity".to_string()
            } else {
                format!("{}D-01", (i * 7919) % 1000)
            };
            text.push_str(&format!("{:e} {:e} 3 4.0D0 {}\n", x_r, t, period));
        }
        text.into_bytes()
    }

    fn parser(bytes: Vec<u8>, batch_size: usize) -> StreamingRecordParser<Cursor<Vec<u8>>> {
        StreamingRecordParser::from_reader(
            Cursor::new(bytes),
            ParserOptions {
                batch_size,
                ..ParserOptions::default()
            },
        )
    }

    fn sequential(bytes: Vec<u8>) -> GridSnapshot {
        let mut aggregator = GridAggregator::new(spec());
        for record in parser(bytes, 1000).records() {
            aggregator.ingest(&record.unwrap());
        }
        aggregator.finalize()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_equals_sequential() {
        let bytes = scan_file(2000);
        let expected = sequential(bytes.clone());
        assert_eq!(expected.binned, 2000);

        for (workers, batch_size) in [(1, 2000), (2, 17), (4, 64), (7, 1)] {
            let (grid, stats) = aggregate_parallel(parser(bytes.clone(), batch_size), spec(), workers)
                .await
                .unwrap();
            assert_eq!(grid, expected, "workers={} batch={}", workers, batch_size);
            assert_eq!(stats.records, 2000);
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let bytes = scan_file(0);
        let (grid, stats) = aggregate_parallel(parser(bytes, 10), spec(), 3).await.unwrap();
        assert_eq!(grid.populated(), 0);
        assert_eq!(stats.records, 0);
    }

    #[tokio::test]
    async fn test_strict_error_propagates() {
        let mut bytes = scan_file(50);
        bytes.extend_from_slice(b"-0.195 0.24 3 4 not-a-number\n");
        let options = ParserOptions {
            batch_size: 8,
            policy: MalformedPolicy::Strict,
            ..ParserOptions::default()
        };
        let p = StreamingRecordParser::from_reader(Cursor::new(bytes), options);
        let result = aggregate_parallel(p, spec(), 2).await;
        assert!(matches!(result, Err(IngestError::Malformed { line: 75, .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let p = parser(scan_file(100), 10).with_cancel(token);
        let result = aggregate_parallel(p, spec(), 2).await;
        assert!(matches!(result, Err(IngestError::Cancelled { records: 0 })));
    }
}
