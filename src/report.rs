//! Report shaping over frozen fleet totals.
//!
//! Converts raw per-quarter tallies into cumulative annualized-failure-rate
//! series, culls models with too few distinct drives to be statistically
//! interesting, and keys the result by human-readable display name.

use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregator::FleetTotals;
use crate::constants::afr::{DAYS_PER_YEAR, PERCENT};
use crate::quarter::Quarter;
use crate::types::{DisplayName, FleetSize};

/// Annualized failure rate as a percentage.
///
/// Every series point is built from at least one observed drive-day, so zero
/// `cumulative_days` can only mean corrupted tallies; this panics rather than
/// reporting a rate from nothing.
pub fn afr_percent(cumulative_failures: u64, cumulative_days: u64) -> f64 {
    assert!(
        cumulative_days > 0,
        "AFR requires at least one drive-operating day"
    );
    (cumulative_failures as f64 / cumulative_days as f64) * DAYS_PER_YEAR * PERCENT
}

/// One point in a model's quarterly series. All counters are cumulative from
/// the model's first observed quarter through this one.
#[derive(Clone, Debug, PartialEq)]
pub struct QuarterAfr {
    /// Quarter this point closes.
    pub quarter: Quarter,
    /// Cumulative annualized failure rate, in percent.
    pub afr_percent: f64,
    /// Cumulative drive-operating days.
    pub drive_days: u64,
    /// Cumulative failures.
    pub failures: u64,
}

/// Quarterly series for one reported model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSeries {
    /// Distinct serial numbers ever observed for the model.
    pub fleet_size: FleetSize,
    /// Cumulative points in ascending quarter order.
    pub quarters: Vec<QuarterAfr>,
}

/// Final report keyed by display name, e.g. `Seagate ST4000DM000 (27,689)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AfrReport {
    /// Reported models in display-name order.
    pub models: BTreeMap<DisplayName, ModelSeries>,
}

impl AfrReport {
    /// Build the report, dropping models whose fleet is smaller than
    /// `min_fleet_size`. A fleet exactly at the threshold is retained.
    pub fn from_totals(totals: &FleetTotals, min_fleet_size: usize) -> Self {
        let mut models = BTreeMap::new();
        for (identity, tally) in &totals.models {
            let fleet_size = tally.serials.len();
            if fleet_size < min_fleet_size {
                debug!(
                    model = %identity,
                    fleet_size,
                    min_fleet_size,
                    "model culled from report"
                );
                continue;
            }
            let mut quarters = Vec::with_capacity(tally.quarters.len());
            let mut cumulative_days = 0u64;
            let mut cumulative_failures = 0u64;
            for (quarter, quarter_tally) in &tally.quarters {
                cumulative_days += quarter_tally.drive_operating_days;
                cumulative_failures += quarter_tally.drive_failures;
                quarters.push(QuarterAfr {
                    quarter: *quarter,
                    afr_percent: afr_percent(cumulative_failures, cumulative_days),
                    drive_days: cumulative_days,
                    failures: cumulative_failures,
                });
            }
            let display = format!(
                "{identity} ({})",
                format_count_with_commas(fleet_size as u64)
            );
            models.insert(
                display,
                ModelSeries {
                    fleet_size,
                    quarters,
                },
            );
        }
        Self { models }
    }
}

/// Group a count with comma separators for display labels, e.g. `27,689`.
pub fn format_count_with_commas(value: u64) -> String {
    let digits = value.to_string();
    let mut reversed = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().rev().enumerate() {
        if idx != 0 && idx % 3 == 0 {
            reversed.push(',');
        }
        reversed.push(ch);
    }
    reversed.chars().rev().collect()
}
