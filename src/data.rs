use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::quarter::Quarter;
use crate::types::{ProducerId, RawModelName, SerialNumber};

/// One raw telemetry row: one drive observed on one calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Vendor-reported model string, possibly irregularly spaced or cased.
    pub model: RawModelName,
    /// Observation day.
    pub date: NaiveDate,
    /// Stable serial number of the physical drive.
    pub serial_number: SerialNumber,
    /// True on at most the final day a failing drive is observed.
    pub failure: bool,
}

/// Closed set of canonical drive manufacturers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Manufacturer {
    /// Seagate Technology.
    Seagate,
    /// Toshiba Corporation.
    Toshiba,
    /// Western Digital, kept apart from HGST under `KeepHgstSeparate`.
    Wdc,
    /// HGST-branded models under `KeepHgstSeparate`.
    Hgst,
    /// Combined Western Digital + HGST bucket under `MergeWdcHgst`.
    WdcHgst,
}

impl Manufacturer {
    /// Canonical display token, e.g. `WDC/HGST`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Manufacturer::Seagate => "Seagate",
            Manufacturer::Toshiba => "Toshiba",
            Manufacturer::Wdc => "WDC",
            Manufacturer::Hgst => "HGST",
            Manufacturer::WdcHgst => "WDC/HGST",
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized drive-model identity.
///
/// Distinct raw strings may collapse to one identity; see the normalizer.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ModelIdentity {
    /// Canonical manufacturer bucket.
    pub manufacturer: Manufacturer,
    /// Model code without the manufacturer prefix.
    pub model: String,
}

impl ModelIdentity {
    /// Canonical `"{manufacturer} {model}"` form. Feeding this back through
    /// normalization yields the same identity.
    pub fn canonical_name(&self) -> String {
        format!("{} {}", self.manufacturer, self.model)
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.model)
    }
}

/// One filtered, normalized, quarter-bucketed observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveObservation {
    /// Normalized model identity.
    pub model: ModelIdentity,
    /// Quarter the observation day falls in.
    pub quarter: Quarter,
    /// Serial number registered for fleet counting.
    pub serial_number: SerialNumber,
    /// Whether this row reported a failure.
    pub failed: bool,
}

/// One producer's chunk of observations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationBatch {
    /// Index of the producer that emitted the chunk.
    pub producer: ProducerId,
    /// Observations in scan order within the chunk.
    pub observations: Vec<DriveObservation>,
}

/// Tagged payload for the producer → aggregator channel.
///
/// `Done` is the per-producer completion sentinel. It carries no data; the
/// aggregator counts it and never aggregates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProducerMessage {
    /// A chunk of observations from one producer.
    Batch(ObservationBatch),
    /// Completion sentinel, exactly one per producer, sent last.
    Done(ProducerId),
}
