#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Streaming fold of observation batches into per-model quarterly tallies.
pub mod aggregator;
/// Pipeline configuration types.
pub mod config;
/// Centralized constants used across producers, sources, and reporting.
pub mod constants;
/// Telemetry record, observation, and channel message types.
pub mod data;
/// Reusable example runners shared by downstream crates.
pub mod example_apps;
/// Run accounting and producer balance helpers.
pub mod metrics;
/// Model-name normalization into manufacturer identities.
pub mod normalize;
/// Top-level pipeline orchestration.
pub mod pipeline;
/// Partition-scanning producer workers.
pub mod producer;
/// Calendar quarter and month partition types.
pub mod quarter;
/// Annualized failure rate report assembly.
pub mod report;
/// Row-source trait and built-in sources.
pub mod source;
/// Shared type aliases.
pub mod types;

mod errors;

pub use aggregator::{FleetAggregator, FleetTotals, QuarterTally};
pub use config::{ManufacturerPolicy, PipelineConfig, UnrecognizedPolicy};
pub use data::{
    DriveObservation, HealthRecord, Manufacturer, ModelIdentity, ObservationBatch, ProducerMessage,
};
pub use errors::PipelineError;
pub use metrics::{ProducerReport, RunSummary};
pub use normalize::NameNormalizer;
pub use pipeline::{AfrPipeline, PipelineRun};
pub use quarter::{MonthPartition, Quarter};
pub use report::{AfrReport, ModelSeries, QuarterAfr};
#[cfg(feature = "parquet")]
pub use source::SnapshotDirSource;
pub use source::{InMemorySource, RecordScan, RowSource, SyntheticFleetSource, SyntheticModel};
pub use types::{DisplayName, FleetSize, ProducerId, RawModelName, SerialNumber, SourceId};
