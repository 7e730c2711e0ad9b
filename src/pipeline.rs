//! End-to-end pipeline orchestration.
//!
//! `AfrPipeline::run` fans a source's month partitions out to scanning
//! producers, funnels their observation batches through one bounded channel
//! into the aggregator, and shapes the frozen totals into the final report.
//! Producer threads are scoped, so a run owns every thread it starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, sync_channel};
use std::thread;
use std::time::Instant;

use tracing::info;

use crate::aggregator::FleetAggregator;
use crate::config::PipelineConfig;
use crate::constants::channel::RECV_POLL_INTERVAL;
use crate::data::ProducerMessage;
use crate::errors::PipelineError;
use crate::metrics::{ProducerReport, RunSummary};
use crate::producer::{BatchProducer, ModelFilter};
use crate::quarter::MonthPartition;
use crate::report::AfrReport;
use crate::source::RowSource;

/// Output of one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineRun {
    /// Quarterly AFR series per reported model.
    pub report: AfrReport,
    /// Accounting for the whole run.
    pub summary: RunSummary,
}

/// Streaming quarterly annualized-failure-rate pipeline.
pub struct AfrPipeline {
    config: PipelineConfig,
}

impl AfrPipeline {
    /// Validate the configuration and build a pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The validated configuration this pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one full aggregation run over `source`.
    ///
    /// The first producer error (by producer id) wins over any later channel
    /// or protocol error; a failing producer cancels the rest of the run
    /// cooperatively. Reruns over the same source produce identical output.
    pub fn run(&self, source: &dyn RowSource) -> Result<PipelineRun, PipelineError> {
        let started = Instant::now();
        let filter = ModelFilter::compile(&self.config.model_patterns)?;
        let mut partitions = source.partitions()?;
        partitions.sort();
        partitions.dedup();
        let assignments = assign_partitions(&partitions, self.config.workers);
        let worker_count = assignments.len();

        info!(
            source_id = %source.id(),
            partitions = partitions.len(),
            workers = worker_count,
            "starting pipeline run"
        );

        let mut aggregator = FleetAggregator::new(worker_count);
        let cancel = AtomicBool::new(false);
        let (sender, receiver) = sync_channel::<ProducerMessage>(self.config.channel_capacity);
        let mut producer_results: Vec<Option<Result<ProducerReport, PipelineError>>> =
            (0..worker_count).map(|_| None).collect();

        let drain_result = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(worker_count);
            for (producer_id, assigned) in assignments.into_iter().enumerate() {
                let sender = sender.clone();
                let cancel = &cancel;
                let config = &self.config;
                let filter = filter.clone();
                handles.push((
                    producer_id,
                    scope.spawn(move || {
                        let result =
                            BatchProducer::new(producer_id, source, assigned, filter, config)
                                .and_then(|producer| producer.run(&sender, cancel));
                        if result.is_err() {
                            cancel.store(true, Ordering::SeqCst);
                        }
                        result
                    }),
                ));
            }
            drop(sender);

            let drain_result = drain(&mut aggregator, &receiver, &cancel);
            if drain_result.is_err() {
                cancel.store(true, Ordering::SeqCst);
            }

            for (producer_id, handle) in handles {
                let result = match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::Protocol(format!(
                        "producer {producer_id} thread panicked"
                    ))),
                };
                producer_results[producer_id] = Some(result);
            }
            drain_result
        });
        drop(receiver);

        let mut reports = Vec::with_capacity(worker_count);
        let mut first_error: Option<PipelineError> = None;
        for (producer_id, slot) in producer_results.into_iter().enumerate() {
            match slot {
                Some(Ok(report)) => reports.push(report),
                Some(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                None => {
                    if first_error.is_none() {
                        first_error = Some(PipelineError::Protocol(format!(
                            "producer {producer_id} never reported a result"
                        )));
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        drain_result?;

        let totals = aggregator.finalize()?;
        let models_observed = totals.models.len();
        let report = AfrReport::from_totals(&totals, self.config.min_fleet_size);
        let models_reported = report.models.len();
        let summary = RunSummary::from_parts(
            reports,
            partitions.len(),
            models_observed,
            models_reported,
            started.elapsed(),
        );
        info!(
            source_id = %source.id(),
            rows = summary.rows_scanned,
            observations = summary.observations,
            models_reported,
            elapsed_ms = summary.elapsed.as_millis(),
            "pipeline run complete"
        );
        Ok(PipelineRun { report, summary })
    }
}

/// Receive until every sentinel has arrived, polling the cancel flag so a
/// failed producer cannot leave the aggregator waiting forever.
fn drain(
    aggregator: &mut FleetAggregator,
    receiver: &Receiver<ProducerMessage>,
    cancel: &AtomicBool,
) -> Result<(), PipelineError> {
    loop {
        if aggregator.is_finalized() {
            // Nothing may trail the final sentinel.
            return match receiver.try_recv() {
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(()),
                Ok(message) => {
                    let producer = match &message {
                        ProducerMessage::Batch(batch) => batch.producer,
                        ProducerMessage::Done(producer) => *producer,
                    };
                    Err(PipelineError::Protocol(format!(
                        "message from producer {producer} arrived after finalization"
                    )))
                }
            };
        }
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }
        match receiver.recv_timeout(RECV_POLL_INTERVAL) {
            Ok(message) => aggregator.observe_message(message)?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                if cancel.load(Ordering::SeqCst) {
                    return Ok(());
                }
                return Err(PipelineError::Protocol(format!(
                    "observation channel closed with {} producer(s) outstanding",
                    aggregator.outstanding()
                )));
            }
        }
    }
}

/// Round-robin partitions over at most `workers` producers. Producers with
/// nothing to scan are never spawned.
fn assign_partitions(partitions: &[MonthPartition], workers: usize) -> Vec<Vec<MonthPartition>> {
    if partitions.is_empty() {
        return Vec::new();
    }
    let worker_count = workers.min(partitions.len());
    let mut assignments = vec![Vec::new(); worker_count];
    for (idx, partition) in partitions.iter().enumerate() {
        assignments[idx % worker_count].push(*partition);
    }
    assignments
}
