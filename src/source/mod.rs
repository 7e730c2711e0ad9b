//! Row-source trait and built-in sources.

use std::collections::BTreeMap;

use crate::data::HealthRecord;
use crate::errors::PipelineError;
use crate::quarter::MonthPartition;

#[cfg(feature = "parquet")]
pub mod snapshot;
pub mod synthetic;

#[cfg(feature = "parquet")]
pub use snapshot::SnapshotDirSource;
pub use synthetic::{SyntheticFleetSource, SyntheticModel};

/// Lazy row stream produced by one partition scan.
///
/// Scans are opened and drained on the thread that requested them, so the
/// iterator itself does not have to be [`Send`].
pub type RecordScan<'a> = Box<dyn Iterator<Item = Result<HealthRecord, PipelineError>> + 'a>;

/// A partitioned provider of raw telemetry rows.
///
/// Partitions must be disjoint. `scan` may be called any number of times for
/// the same partition and yields that partition's rows in unspecified order;
/// each call starts a fresh pass.
pub trait RowSource: Send + Sync {
    /// Stable identifier used in logs and error reasons.
    fn id(&self) -> &str;

    /// Distinct month partitions available, sorted ascending.
    fn partitions(&self) -> Result<Vec<MonthPartition>, PipelineError>;

    /// Start a fresh scan over one partition.
    fn scan(&self, partition: MonthPartition) -> Result<RecordScan<'_>, PipelineError>;
}

/// In-memory partition-keyed source for tests and small jobs.
#[derive(Clone, Debug)]
pub struct InMemorySource {
    id: String,
    rows: BTreeMap<MonthPartition, Vec<HealthRecord>>,
}

impl InMemorySource {
    /// Empty source with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rows: BTreeMap::new(),
        }
    }

    /// Add one row, filed under its date's month partition.
    pub fn push_row(&mut self, row: HealthRecord) {
        self.rows
            .entry(MonthPartition::from_date(row.date))
            .or_default()
            .push(row);
    }

    /// Add many rows at once.
    pub fn extend_rows(&mut self, rows: impl IntoIterator<Item = HealthRecord>) {
        for row in rows {
            self.push_row(row);
        }
    }

    /// Total rows across all partitions.
    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// True when no rows have been added.
    pub fn is_empty(&self) -> bool {
        self.rows.values().all(Vec::is_empty)
    }
}

impl RowSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn partitions(&self) -> Result<Vec<MonthPartition>, PipelineError> {
        Ok(self.rows.keys().copied().collect())
    }

    fn scan(&self, partition: MonthPartition) -> Result<RecordScan<'_>, PipelineError> {
        let rows = self.rows.get(&partition).cloned().unwrap_or_default();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}
