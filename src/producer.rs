//! Partition-scanning producer workers.
//!
//! Each producer owns a disjoint set of month partitions, normalizes raw rows
//! into [`DriveObservation`]s, and ships them to the aggregator over a bounded
//! channel. Producers never share partitions, so a row is observed exactly
//! once across the whole run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{PipelineConfig, UnrecognizedPolicy};
use crate::constants::channel::SEND_POLL_INTERVAL;
use crate::data::{DriveObservation, ObservationBatch, ProducerMessage};
use crate::errors::PipelineError;
use crate::metrics::ProducerReport;
use crate::normalize::NameNormalizer;
use crate::quarter::{MonthPartition, Quarter};
use crate::source::RowSource;
use crate::types::{ProducerId, RawModelName};

/// Compiled allow-list over raw model strings. An empty list admits all rows.
///
/// Each producer owns one filter; verdicts are memoized per distinct raw
/// string for the producer's lifetime, so repeated spellings skip the regex
/// scan entirely.
#[derive(Clone, Debug, Default)]
pub struct ModelFilter {
    patterns: Vec<Regex>,
    verdicts: HashMap<RawModelName, bool>,
}

impl ModelFilter {
    /// Compile configured patterns, rejecting invalid regexes up front.
    pub fn compile(patterns: &[String]) -> Result<Self, PipelineError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = Regex::new(pattern).map_err(|err| {
                PipelineError::Configuration(format!("invalid model pattern '{pattern}': {err}"))
            })?;
            compiled.push(regex);
        }
        Ok(Self {
            patterns: compiled,
            verdicts: HashMap::new(),
        })
    }

    /// Whether a raw model string passes the filter, memoizing the verdict
    /// per distinct input.
    pub fn matches(&mut self, raw_model: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        if let Some(hit) = self.verdicts.get(raw_model) {
            return *hit;
        }
        let verdict = self.patterns.iter().any(|regex| regex.is_match(raw_model));
        self.verdicts.insert(raw_model.to_string(), verdict);
        verdict
    }

    /// Distinct raw strings judged so far.
    pub fn memo_len(&self) -> usize {
        self.verdicts.len()
    }
}

/// Outcome of one bounded-channel send attempt.
#[derive(Debug)]
enum SendOutcome {
    Sent,
    Canceled,
}

/// One scanning worker. Created per thread by the pipeline; the filter and
/// normalizer caches inside are private to this producer, so no locking is
/// involved.
pub struct BatchProducer<'a> {
    id: ProducerId,
    source: &'a dyn RowSource,
    partitions: Vec<MonthPartition>,
    filter: ModelFilter,
    normalizer: NameNormalizer,
    unrecognized_policy: UnrecognizedPolicy,
    batch_size: usize,
    send_timeout: Duration,
}

impl<'a> BatchProducer<'a> {
    /// Build a producer for one partition assignment.
    pub fn new(
        id: ProducerId,
        source: &'a dyn RowSource,
        partitions: Vec<MonthPartition>,
        filter: ModelFilter,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            id,
            source,
            partitions,
            filter,
            normalizer: NameNormalizer::new(config.manufacturer_policy)?,
            unrecognized_policy: config.unrecognized_policy,
            batch_size: config.batch_size,
            send_timeout: config.send_timeout,
        })
    }

    /// Scan all assigned partitions, emitting observation batches and a final
    /// completion sentinel.
    ///
    /// Returns `Ok` with the producer's counters both on normal completion
    /// and when the run was canceled mid-scan; a canceled producer does not
    /// emit its sentinel. Errors cover source failures, rows the normalizer
    /// rejects under [`UnrecognizedPolicy::Fail`], and channel breakdown.
    pub fn run(
        mut self,
        sender: &SyncSender<ProducerMessage>,
        cancel: &AtomicBool,
    ) -> Result<ProducerReport, PipelineError> {
        let mut report = ProducerReport {
            producer: self.id,
            ..ProducerReport::default()
        };
        let mut pending: Vec<DriveObservation> = Vec::with_capacity(self.batch_size);

        let partitions = std::mem::take(&mut self.partitions);
        for partition in partitions {
            if cancel.load(Ordering::SeqCst) {
                return Ok(report);
            }
            let scan_started = Instant::now();
            let mut partition_rows = 0u64;
            for row in self.source.scan(partition)? {
                let row = row?;
                report.rows_scanned += 1;
                partition_rows += 1;

                if !self.filter.matches(&row.model) {
                    report.rows_filtered_out += 1;
                    continue;
                }
                if let Some(count) = report.unrecognized.get_mut(&row.model) {
                    *count += 1;
                    continue;
                }
                let model = match self.normalizer.normalize(&row.model) {
                    Ok(identity) => identity,
                    Err(err) => match self.unrecognized_policy {
                        UnrecognizedPolicy::Fail => return Err(err),
                        UnrecognizedPolicy::Skip => {
                            warn!(
                                producer = self.id,
                                raw_model = %row.model,
                                error = %err,
                                "skipping rows for unrecognized model"
                            );
                            report.unrecognized.insert(row.model.clone(), 1);
                            continue;
                        }
                    },
                };

                pending.push(DriveObservation {
                    model,
                    quarter: Quarter::from_date(row.date),
                    serial_number: row.serial_number,
                    failed: row.failure,
                });
                if pending.len() >= self.batch_size
                    && !self.flush(&mut pending, &mut report, sender, cancel)?
                {
                    return Ok(report);
                }
            }
            debug!(
                producer = self.id,
                partition = %partition,
                rows = partition_rows,
                scan_ms = scan_started.elapsed().as_millis(),
                "partition scan completed"
            );
            report.partition_rows.push((partition, partition_rows));
        }

        if !self.flush(&mut pending, &mut report, sender, cancel)? {
            return Ok(report);
        }
        send_message(
            sender,
            ProducerMessage::Done(self.id),
            self.send_timeout,
            cancel,
        )?;
        Ok(report)
    }

    /// Ship buffered observations. Returns `Ok(false)` when the run was
    /// canceled before the batch could be handed over.
    fn flush(
        &self,
        pending: &mut Vec<DriveObservation>,
        report: &mut ProducerReport,
        sender: &SyncSender<ProducerMessage>,
        cancel: &AtomicBool,
    ) -> Result<bool, PipelineError> {
        if pending.is_empty() {
            return Ok(true);
        }
        let batch = ObservationBatch {
            producer: self.id,
            observations: std::mem::take(pending),
        };
        let count = batch.observations.len() as u64;
        match send_message(
            sender,
            ProducerMessage::Batch(batch),
            self.send_timeout,
            cancel,
        )? {
            SendOutcome::Sent => {
                report.observations += count;
                report.batches += 1;
                Ok(true)
            }
            SendOutcome::Canceled => Ok(false),
        }
    }
}

/// Bounded send with a deadline. `SyncSender` has no native send timeout, so
/// this polls `try_send`, re-checking the cancel flag between attempts.
fn send_message(
    sender: &SyncSender<ProducerMessage>,
    message: ProducerMessage,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<SendOutcome, PipelineError> {
    let deadline = Instant::now() + timeout;
    let mut message = message;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Ok(SendOutcome::Canceled);
        }
        match sender.try_send(message) {
            Ok(()) => return Ok(SendOutcome::Sent),
            Err(TrySendError::Full(returned)) => {
                if Instant::now() >= deadline {
                    return Err(PipelineError::Protocol(format!(
                        "observation channel stayed full for {}ms; aggregator is stalled",
                        timeout.as_millis()
                    )));
                }
                message = returned;
                thread::sleep(SEND_POLL_INTERVAL);
            }
            Err(TrySendError::Disconnected(_)) => {
                if cancel.load(Ordering::SeqCst) {
                    return Ok(SendOutcome::Canceled);
                }
                return Err(PipelineError::Protocol(
                    "observation channel closed before producers finished".to_string(),
                ));
            }
        }
    }
}
