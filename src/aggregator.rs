//! Single-consumer aggregation state machine.
//!
//! Exactly one aggregator instance consumes the observation channel. Because
//! producers own disjoint partitions, no tally here is ever decremented;
//! counters only grow until every producer's completion sentinel has arrived
//! and the totals freeze.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::data::{DriveObservation, ModelIdentity, ObservationBatch, ProducerMessage};
use crate::errors::PipelineError;
use crate::quarter::Quarter;
use crate::types::{ProducerId, SerialNumber};

/// Raw tallies for one model within one calendar quarter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuarterTally {
    /// Daily health rows observed, one per drive per day.
    pub drive_operating_days: u64,
    /// Rows whose failure flag was set.
    pub drive_failures: u64,
}

/// Everything tracked for a single normalized model identity.
#[derive(Clone, Debug, Default)]
pub struct ModelTally {
    /// Per-quarter tallies in ascending quarter order.
    pub quarters: BTreeMap<Quarter, QuarterTally>,
    /// Distinct serial numbers ever observed for this model.
    pub serials: HashSet<SerialNumber>,
}

/// Lifecycle of the aggregation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregatorPhase {
    /// No completion sentinels seen yet.
    Running,
    /// At least one producer finished; waiting on the rest.
    Draining,
    /// Every sentinel arrived; totals are frozen.
    Finalized,
}

/// Frozen aggregation output handed to report building.
#[derive(Clone, Debug, Default)]
pub struct FleetTotals {
    /// Per-model tallies in first-observed order.
    pub models: IndexMap<ModelIdentity, ModelTally>,
    /// Batches consumed across the run.
    pub batches: u64,
    /// Observations consumed across the run.
    pub observations: u64,
}

/// Tracks per-model tallies and producer completion.
///
/// Any message that violates the channel protocol, such as a duplicate
/// sentinel or a batch arriving after its producer claimed completion, is a
/// fatal error: it means partition ownership was broken and the totals can
/// no longer be trusted.
pub struct FleetAggregator {
    producers: usize,
    done: Vec<bool>,
    done_count: usize,
    batches: u64,
    observations: u64,
    models: IndexMap<ModelIdentity, ModelTally>,
}

impl FleetAggregator {
    /// Aggregator expecting exactly `producers` completion sentinels.
    pub fn new(producers: usize) -> Self {
        Self {
            producers,
            done: vec![false; producers],
            done_count: 0,
            batches: 0,
            observations: 0,
            models: IndexMap::new(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> AggregatorPhase {
        if self.done_count >= self.producers {
            AggregatorPhase::Finalized
        } else if self.done_count > 0 {
            AggregatorPhase::Draining
        } else {
            AggregatorPhase::Running
        }
    }

    /// Whether every producer has sent its sentinel.
    pub fn is_finalized(&self) -> bool {
        self.phase() == AggregatorPhase::Finalized
    }

    /// Number of producers that have not completed yet.
    pub fn outstanding(&self) -> usize {
        self.producers - self.done_count
    }

    /// Dispatch one channel message.
    pub fn observe_message(&mut self, message: ProducerMessage) -> Result<(), PipelineError> {
        match message {
            ProducerMessage::Batch(batch) => self.observe_batch(batch),
            ProducerMessage::Done(producer) => self.observe_done(producer),
        }
    }

    /// Fold one batch of observations into the tallies.
    pub fn observe_batch(&mut self, batch: ObservationBatch) -> Result<(), PipelineError> {
        if self.is_finalized() {
            return Err(PipelineError::Protocol(format!(
                "observation batch from producer {} arrived after finalization",
                batch.producer
            )));
        }
        match self.done.get(batch.producer) {
            Some(false) => {}
            Some(true) => {
                return Err(PipelineError::Protocol(format!(
                    "observation batch from producer {} arrived after its completion sentinel",
                    batch.producer
                )))
            }
            None => {
                return Err(PipelineError::Protocol(format!(
                    "observation batch from unknown producer {} (expected ids below {})",
                    batch.producer, self.producers
                )))
            }
        }
        self.batches += 1;
        for observation in batch.observations {
            self.observe(observation);
        }
        Ok(())
    }

    /// Record one producer's completion sentinel.
    pub fn observe_done(&mut self, producer: ProducerId) -> Result<(), PipelineError> {
        if self.is_finalized() {
            return Err(PipelineError::Protocol(format!(
                "completion sentinel from producer {producer} arrived after finalization"
            )));
        }
        match self.done.get(producer) {
            Some(false) => {}
            Some(true) => {
                return Err(PipelineError::Protocol(format!(
                    "duplicate completion sentinel from producer {producer}"
                )))
            }
            None => {
                return Err(PipelineError::Protocol(format!(
                    "completion sentinel from unknown producer {producer} (expected ids below {})",
                    self.producers
                )))
            }
        }
        self.done[producer] = true;
        self.done_count += 1;
        if self.is_finalized() {
            debug!(
                batches = self.batches,
                observations = self.observations,
                models = self.models.len(),
                "aggregation finalized"
            );
        } else {
            debug!(producer, outstanding = self.outstanding(), "producer drained");
        }
        Ok(())
    }

    fn observe(&mut self, observation: DriveObservation) {
        self.observations += 1;
        let tally = self.models.entry(observation.model).or_default();
        let quarter = tally.quarters.entry(observation.quarter).or_default();
        quarter.drive_operating_days += 1;
        if observation.failed {
            quarter.drive_failures += 1;
        }
        tally.serials.insert(observation.serial_number);
    }

    /// Freeze and hand over the totals. Fails while sentinels are missing.
    pub fn finalize(self) -> Result<FleetTotals, PipelineError> {
        if !self.is_finalized() {
            return Err(PipelineError::Protocol(format!(
                "aggregation cannot finalize with {} producer(s) still outstanding",
                self.outstanding()
            )));
        }
        Ok(FleetTotals {
            models: self.models,
            batches: self.batches,
            observations: self.observations,
        })
    }
}
