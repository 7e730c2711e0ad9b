//! Deterministic synthetic fleet generator.
//!
//! Produces plausible daily telemetry for a configurable model catalog
//! without any fixture files. Row content depends only on the source seed,
//! the partition, and the (model, unit, day) position, so scans are exactly
//! reproducible; demos and large-scale tests rely on that.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::HealthRecord;
use crate::errors::PipelineError;
use crate::quarter::MonthPartition;
use crate::source::{RecordScan, RowSource};

/// One synthetic model line in the generated fleet.
#[derive(Clone, Debug)]
pub struct SyntheticModel {
    /// Raw model string stamped on every generated row, pre-normalization.
    pub raw_name: String,
    /// Number of drives deployed for this model.
    pub fleet_size: usize,
    /// Probability that a given drive fails on a given day, in `0.0..=1.0`.
    pub daily_failure_rate: f64,
}

/// Deterministic pseudo-random fleet source.
///
/// A drive that draws a failure stops reporting for the rest of that month
/// (the failure row is its last observation) and returns to service the
/// following month. Serial numbers are stable across months.
pub struct SyntheticFleetSource {
    id: String,
    seed: u64,
    months: Vec<MonthPartition>,
    catalog: Vec<SyntheticModel>,
}

impl SyntheticFleetSource {
    /// Build a source over explicit months and catalog entries.
    pub fn new(
        id: impl Into<String>,
        seed: u64,
        months: Vec<MonthPartition>,
        catalog: Vec<SyntheticModel>,
    ) -> Result<Self, PipelineError> {
        for model in &catalog {
            if !(0.0..=1.0).contains(&model.daily_failure_rate) {
                return Err(PipelineError::Configuration(format!(
                    "daily_failure_rate for '{}' must be within 0.0..=1.0, got {}",
                    model.raw_name, model.daily_failure_rate
                )));
            }
        }
        let mut months = months;
        months.sort();
        months.dedup();
        Ok(Self {
            id: id.into(),
            seed,
            months,
            catalog,
        })
    }

    /// Source with a mixed-vendor catalog spanning `month_count` months from
    /// `start`. The catalog deliberately includes bare and prefixed spellings
    /// of the same HGST model so reports demonstrate identity collapsing, and
    /// one fleet small enough to be culled at common thresholds.
    pub fn with_default_catalog(
        id: impl Into<String>,
        seed: u64,
        start: MonthPartition,
        month_count: usize,
    ) -> Result<Self, PipelineError> {
        let mut months = Vec::with_capacity(month_count);
        let mut cursor = start;
        for _ in 0..month_count {
            months.push(cursor);
            cursor = cursor.succ();
        }
        let catalog = vec![
            SyntheticModel {
                raw_name: "ST12000NM0007".to_string(),
                fleet_size: 4000,
                daily_failure_rate: 0.000_20,
            },
            SyntheticModel {
                raw_name: "ST4000DM000".to_string(),
                fleet_size: 2500,
                daily_failure_rate: 0.000_35,
            },
            SyntheticModel {
                raw_name: "WUH721816ALE6L4".to_string(),
                fleet_size: 1500,
                daily_failure_rate: 0.000_10,
            },
            SyntheticModel {
                raw_name: "WDC WUH721816ALE6L4".to_string(),
                fleet_size: 1500,
                daily_failure_rate: 0.000_10,
            },
            SyntheticModel {
                raw_name: "TOSHIBA MG07ACA14TA".to_string(),
                fleet_size: 1200,
                daily_failure_rate: 0.000_15,
            },
            SyntheticModel {
                raw_name: "HGST HMS5C4040BLE640".to_string(),
                fleet_size: 300,
                daily_failure_rate: 0.000_05,
            },
        ];
        Self::new(id, seed, months, catalog)
    }

    fn partition_seed(&self, partition: MonthPartition) -> u64 {
        let month_index = (partition.year as i64 as u64) << 16 | partition.month as u64;
        self.seed ^ month_index.wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

impl RowSource for SyntheticFleetSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn partitions(&self) -> Result<Vec<MonthPartition>, PipelineError> {
        Ok(self.months.clone())
    }

    fn scan(&self, partition: MonthPartition) -> Result<RecordScan<'_>, PipelineError> {
        let day_count = partition.day_count().ok_or_else(|| {
            PipelineError::SourceInconsistent {
                source_id: self.id.clone(),
                details: format!("partition {partition} is outside the supported calendar"),
            }
        })?;
        Ok(Box::new(SyntheticScan {
            source_id: self.id.clone(),
            catalog: &self.catalog,
            partition,
            day_count,
            rng: StdRng::seed_from_u64(self.partition_seed(partition)),
            model_idx: 0,
            unit: 0,
            day: 1,
        }))
    }
}

/// Lazy walk over (model, unit, day) positions with a per-partition RNG.
struct SyntheticScan<'a> {
    source_id: String,
    catalog: &'a [SyntheticModel],
    partition: MonthPartition,
    day_count: u32,
    rng: StdRng,
    model_idx: usize,
    unit: usize,
    day: u32,
}

impl Iterator for SyntheticScan<'_> {
    type Item = Result<HealthRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let model = self.catalog.get(self.model_idx)?;
            if self.unit >= model.fleet_size {
                self.model_idx += 1;
                self.unit = 0;
                self.day = 1;
                continue;
            }
            if self.day > self.day_count {
                self.unit += 1;
                self.day = 1;
                continue;
            }

            let date = match NaiveDate::from_ymd_opt(
                self.partition.year,
                self.partition.month,
                self.day,
            ) {
                Some(date) => date,
                None => {
                    return Some(Err(PipelineError::SourceInconsistent {
                        source_id: self.source_id.clone(),
                        details: format!(
                            "day {} is invalid for partition {}",
                            self.day, self.partition
                        ),
                    }))
                }
            };
            let failed = self.rng.random_bool(model.daily_failure_rate);
            let row = HealthRecord {
                model: model.raw_name.clone(),
                date,
                serial_number: format!("SYN-{:02}-{:06}", self.model_idx, self.unit),
                failure: failed,
            };
            if failed {
                self.unit += 1;
                self.day = 1;
            } else {
                self.day += 1;
            }
            return Some(Ok(row));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;

    use super::*;

    fn month(year: i32, month: u32) -> MonthPartition {
        MonthPartition { year, month }
    }

    fn collect(source: &SyntheticFleetSource, partition: MonthPartition) -> Vec<HealthRecord> {
        source
            .scan(partition)
            .expect("scan")
            .collect::<Result<_, _>>()
            .expect("rows")
    }

    #[test]
    fn rescanning_a_partition_is_deterministic() {
        let source = SyntheticFleetSource::new(
            "syn",
            7,
            vec![month(2024, 1)],
            vec![SyntheticModel {
                raw_name: "ST4000DM000".to_string(),
                fleet_size: 5,
                daily_failure_rate: 0.2,
            }],
        )
        .expect("source");
        assert_eq!(collect(&source, month(2024, 1)), collect(&source, month(2024, 1)));
    }

    #[test]
    fn zero_rate_emits_one_row_per_unit_per_day() {
        let source = SyntheticFleetSource::new(
            "syn",
            7,
            vec![month(2024, 2)],
            vec![SyntheticModel {
                raw_name: "ST4000DM000".to_string(),
                fleet_size: 2,
                daily_failure_rate: 0.0,
            }],
        )
        .expect("source");
        let rows = collect(&source, month(2024, 2));
        assert_eq!(rows.len(), 2 * 29);
        assert!(rows.iter().all(|row| !row.failure));
    }

    #[test]
    fn certain_failure_ends_each_unit_on_day_one() {
        let source = SyntheticFleetSource::new(
            "syn",
            7,
            vec![month(2024, 1)],
            vec![SyntheticModel {
                raw_name: "ST4000DM000".to_string(),
                fleet_size: 3,
                daily_failure_rate: 1.0,
            }],
        )
        .expect("source");
        let rows = collect(&source, month(2024, 1));
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.failure && row.date.day() == 1));
    }

    #[test]
    fn serials_are_stable_across_months() {
        let source = SyntheticFleetSource::new(
            "syn",
            9,
            vec![month(2024, 1), month(2024, 2)],
            vec![SyntheticModel {
                raw_name: "ST4000DM000".to_string(),
                fleet_size: 4,
                daily_failure_rate: 0.0,
            }],
        )
        .expect("source");
        let serials = |partition| {
            let mut values: Vec<String> = collect(&source, partition)
                .into_iter()
                .map(|row| row.serial_number)
                .collect();
            values.sort();
            values.dedup();
            values
        };
        assert_eq!(serials(month(2024, 1)), serials(month(2024, 2)));
    }

    #[test]
    fn months_are_sorted_and_deduplicated() {
        let source = SyntheticFleetSource::new(
            "syn",
            1,
            vec![month(2024, 3), month(2024, 1), month(2024, 3)],
            Vec::new(),
        )
        .expect("source");
        assert_eq!(
            source.partitions().expect("partitions"),
            vec![month(2024, 1), month(2024, 3)]
        );
    }

    #[test]
    fn rejects_out_of_range_failure_rates() {
        let result = SyntheticFleetSource::new(
            "syn",
            1,
            vec![month(2024, 1)],
            vec![SyntheticModel {
                raw_name: "ST4000DM000".to_string(),
                fleet_size: 1,
                daily_failure_rate: 1.5,
            }],
        );
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }
}
