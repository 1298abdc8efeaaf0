use super::cell::GridCell;
use super::domain::GridSpec;
use super::snapshot::{CellSummary, GridSnapshot};
use crate::error::IngestError;
use crate::ingest::RawRecord;

/// Accumulates records into a fixed grid of cells
///
/// Holds one count and one exact sum per cell; memory depends only on the
/// grid shape, never on the number of records.
#[derive(Debug, Clone)]
pub struct GridAggregator {
    spec: GridSpec,
    cells: Vec<GridCell>,
    binned: u64,
    out_of_domain: u64,
}

impl GridAggregator {
    pub fn new(spec: GridSpec) -> Self {
        let cells = vec![GridCell::default(); spec.width() * spec.height()];
        Self {
            spec,
            cells,
            binned: 0,
            out_of_domain: 0,
        }
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Add one record; returns false when it fell outside the domain
    pub fn ingest(&mut self, record: &RawRecord) -> bool {
        match self.spec.locate(record) {
            Some((row, col)) => {
                let index = row * self.spec.width() + col;
                self.cells[index].add(record.field(self.spec.fields.value));
                self.binned += 1;
                true
            }
            None => {
                self.out_of_domain += 1;
                false
            }
        }
    }

    pub fn ingest_batch(&mut self, records: &[RawRecord]) {
        for record in records {
            self.ingest(record);
        }
    }

    /// Combine a partial grid built over other records
    pub fn merge(&mut self, other: &GridAggregator) -> Result<(), IngestError> {
        let left = (self.spec.height(), self.spec.width());
        let right = (other.spec.height(), other.spec.width());
        if left != right || self.spec != other.spec {
            return Err(IngestError::ShapeMismatch { left, right });
        }
        for (mine, theirs) in self.cells.iter_mut().zip(&other.cells) {
            mine.merge(theirs);
        }
        self.binned += other.binned;
        self.out_of_domain += other.out_of_domain;
        Ok(())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        if row >= self.spec.height() || col >= self.spec.width() {
            return None;
        }
        self.cells.get(row * self.spec.width() + col)
    }

    pub fn binned(&self) -> u64 {
        self.binned
    }

    pub fn out_of_domain(&self) -> u64 {
        self.out_of_domain
    }

    /// Per-cell counts and means; the aggregator stays usable
    pub fn finalize(&self) -> GridSnapshot {
        let cells = self
            .cells
            .iter()
            .map(|cell| CellSummary {
                count: cell.count(),
                mean: cell.mean(),
            })
            .collect();
        GridSnapshot {
            x: self.spec.x,
            y: self.spec.y,
            cells,
            binned: self.binned,
            out_of_domain: self.out_of_domain,
        }
    }
}
