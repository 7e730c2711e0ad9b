use std::time::Duration;

use indexmap::IndexMap;

use crate::quarter::MonthPartition;
use crate::types::{ProducerId, RawModelName};

/// Counters one producer hands back to the pipeline when its partitions are
/// exhausted. Raw model strings that failed normalization are tallied here
/// when the run is configured to skip them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub producer: ProducerId,
    pub rows_scanned: u64,
    pub rows_filtered_out: u64,
    pub unrecognized: IndexMap<RawModelName, u64>,
    pub observations: u64,
    pub batches: u64,
    pub partition_rows: Vec<(MonthPartition, u64)>,
}

/// Whole-run accounting assembled after the aggregator finalizes.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub producers: usize,
    pub partitions: usize,
    pub rows_scanned: u64,
    pub rows_filtered_out: u64,
    pub rows_unrecognized: u64,
    pub unrecognized: IndexMap<RawModelName, u64>,
    pub observations: u64,
    pub batches: u64,
    pub models_observed: usize,
    pub models_reported: usize,
    pub elapsed: Duration,
    pub per_producer: Vec<ProducerReport>,
}

impl RunSummary {
    pub(crate) fn from_parts(
        mut per_producer: Vec<ProducerReport>,
        partitions: usize,
        models_observed: usize,
        models_reported: usize,
        elapsed: Duration,
    ) -> Self {
        per_producer.sort_by_key(|report| report.producer);
        let mut unrecognized: IndexMap<RawModelName, u64> = IndexMap::new();
        let mut rows_scanned = 0u64;
        let mut rows_filtered_out = 0u64;
        let mut observations = 0u64;
        let mut batches = 0u64;
        for report in &per_producer {
            rows_scanned += report.rows_scanned;
            rows_filtered_out += report.rows_filtered_out;
            observations += report.observations;
            batches += report.batches;
            for (raw, count) in &report.unrecognized {
                *unrecognized.entry(raw.clone()).or_insert(0) += *count;
            }
        }
        let rows_unrecognized = unrecognized.values().sum();
        Self {
            producers: per_producer.len(),
            partitions,
            rows_scanned,
            rows_filtered_out,
            rows_unrecognized,
            unrecognized,
            observations,
            batches,
            models_observed,
            models_reported,
            elapsed,
            per_producer,
        }
    }

    /// Scan throughput over the whole run.
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_scanned as f64 / secs
        } else {
            0.0
        }
    }
}

/// Aggregate skew metrics for per-producer observation counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerSkew {
    pub total: u64,
    pub producers: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub max_share: f64,
    pub min_share: f64,
    pub ratio: f64,
    pub per_producer: Vec<ProducerShare>,
}

/// Per-producer share of a run for skew inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerShare {
    pub producer: ProducerId,
    pub observations: u64,
    pub share: f64,
}

/// Compute skew metrics from per-producer reports. Round-robin month
/// assignment keeps producers roughly level on full-year snapshots; a high
/// ratio here usually means the partition list is short or lopsided.
pub fn producer_skew(reports: &[ProducerReport]) -> Option<ProducerSkew> {
    if reports.is_empty() {
        return None;
    }
    let total: u64 = reports.iter().map(|report| report.observations).sum();
    let producers = reports.len();
    let min = reports
        .iter()
        .map(|report| report.observations)
        .min()
        .expect("reports non-empty");
    let max = reports
        .iter()
        .map(|report| report.observations)
        .max()
        .expect("reports non-empty");
    let mean = total as f64 / producers as f64;
    let max_share = if total == 0 {
        0.0
    } else {
        max as f64 / total as f64
    };
    let min_share = if total == 0 {
        0.0
    } else {
        min as f64 / total as f64
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_producer: Vec<ProducerShare> = reports
        .iter()
        .map(|report| ProducerShare {
            producer: report.producer,
            observations: report.observations,
            share: if total == 0 {
                0.0
            } else {
                report.observations as f64 / total as f64
            },
        })
        .collect();
    per_producer.sort_by(|a, b| {
        b.observations
            .cmp(&a.observations)
            .then_with(|| a.producer.cmp(&b.producer))
    });
    Some(ProducerSkew {
        total,
        producers,
        min,
        max,
        mean,
        max_share,
        min_share,
        ratio,
        per_producer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(producer: ProducerId, observations: u64) -> ProducerReport {
        ProducerReport {
            producer,
            observations,
            ..ProducerReport::default()
        }
    }

    #[test]
    fn producer_skew_reports_balance() {
        let reports = vec![report(0, 2), report(1, 2)];
        let skew = producer_skew(&reports).expect("skew");
        assert_eq!(skew.total, 4);
        assert_eq!(skew.producers, 2);
        assert_eq!(skew.min, 2);
        assert_eq!(skew.max, 2);
        assert!((skew.max_share - 0.5).abs() < 1e-6);
        assert!((skew.ratio - 1.0).abs() < 1e-6);
        assert!(
            skew.per_producer
                .iter()
                .all(|entry| (entry.share - 0.5).abs() < 1e-6)
        );
    }

    #[test]
    fn producer_skew_reports_imbalance() {
        let reports = vec![report(0, 4), report(1, 2), report(2, 2)];
        let skew = producer_skew(&reports).expect("skew");
        assert_eq!(skew.total, 8);
        assert_eq!(skew.producers, 3);
        assert_eq!(skew.min, 2);
        assert_eq!(skew.max, 4);
        assert!((skew.max_share - 0.5).abs() < 1e-6);
        assert!((skew.ratio - 2.0).abs() < 1e-6);
        assert_eq!(skew.per_producer[0].producer, 0);
        assert_eq!(skew.per_producer[0].observations, 4);
    }

    #[test]
    fn summaries_merge_producer_reports_in_id_order() {
        let mut late = report(1, 10);
        late.rows_scanned = 40;
        late.unrecognized.insert("MYSTERY DISK".to_string(), 3);
        let mut early = report(0, 5);
        early.rows_scanned = 20;
        early.rows_filtered_out = 2;
        early.unrecognized.insert("MYSTERY DISK".to_string(), 1);
        early.unrecognized.insert("???".to_string(), 2);

        let summary =
            RunSummary::from_parts(vec![late, early], 6, 3, 2, Duration::from_secs(2));
        assert_eq!(summary.producers, 2);
        assert_eq!(summary.partitions, 6);
        assert_eq!(summary.rows_scanned, 60);
        assert_eq!(summary.rows_filtered_out, 2);
        assert_eq!(summary.rows_unrecognized, 6);
        assert_eq!(summary.unrecognized.get("MYSTERY DISK"), Some(&4));
        assert_eq!(summary.observations, 15);
        assert_eq!(summary.models_observed, 3);
        assert_eq!(summary.models_reported, 2);
        assert_eq!(summary.per_producer[0].producer, 0);
        assert_eq!(summary.per_producer[1].producer, 1);
        assert!((summary.rows_per_sec() - 30.0).abs() < 1e-9);
    }
}
