//! Sequential batch driver.
//!
//! Batches run one after another with a fixed pause between them. Inside a
//! batch every lookup is spawned at once and the results are joined back in
//! input order before reconciliation.

use crate::config::{BatchFailurePolicy, VerifyConfig};
use crate::model::{EnrichedRecord, InputEntry};
use crate::reconcile::{reconcile, Clock};
use crate::registry::{Registry, RegistryRecord};
use crate::VerifyResult;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Receiver of reconciled records.
pub trait ResultSink {
    /// Called once per batch, in batch order, including empty batches.
    fn on_batch(&mut self, records: Vec<EnrichedRecord>, processed: usize, total: usize);

    /// Called after the last batch.
    fn on_complete(&mut self, _summary: &RunSummary) {}
}

impl<F> ResultSink for F
where
    F: FnMut(Vec<EnrichedRecord>, usize, usize),
{
    fn on_batch(&mut self, records: Vec<EnrichedRecord>, processed: usize, total: usize) {
        self(records, processed, total)
    }
}

/// Keeps every record and the progress values it was handed.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<EnrichedRecord>,
    pub progress: Vec<(usize, usize)>,
    pub summary: Option<RunSummary>,
}

impl ResultSink for CollectingSink {
    fn on_batch(&mut self, records: Vec<EnrichedRecord>, processed: usize, total: usize) {
        self.records.extend(records);
        self.progress.push((processed, total));
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        self.summary = Some(summary.clone());
    }
}

/// Totals for one run, handed to billing and history collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub emitted: usize,
    pub active: usize,
    pub cancelled: usize,
    pub failed_batches: usize,
    /// Identifiers whose batch failed and whose records were not emitted.
    pub lost: Vec<String>,
}

impl RunSummary {
    fn count(&mut self, records: &[EnrichedRecord]) {
        self.emitted += records.len();
        let active = records.iter().filter(|r| r.is_active()).count();
        self.active += active;
        self.cancelled += records.len() - active;
    }
}

pub struct Scheduler {
    registry: Arc<dyn Registry>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    batch_delay: Duration,
    lookup_timeout: Duration,
    batch_retries: usize,
    failure_policy: BatchFailurePolicy,
}

impl Scheduler {
    pub fn new(registry: Arc<dyn Registry>, clock: Arc<dyn Clock>, config: &VerifyConfig) -> Self {
        Self {
            registry,
            clock,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay,
            lookup_timeout: config.lookup_timeout,
            batch_retries: config.batch_retries,
            failure_policy: config.failure_policy,
        }
    }

    async fn lookup(
        registry: Arc<dyn Registry>,
        identifier: String,
        limit: Duration,
    ) -> Option<RegistryRecord> {
        match tokio::time::timeout(limit, registry.lookup(&identifier)).await {
            Ok(found) => found,
            Err(_) => {
                log::debug!("lookup {identifier} timed out after {limit:?}");
                None
            }
        }
    }

    /// Look up and reconcile one batch; fails only if a lookup task died.
    async fn process_batch(&self, batch: &[InputEntry]) -> VerifyResult<Vec<EnrichedRecord>> {
        let handles = batch.iter().map(|entry| {
            tokio::spawn(Self::lookup(
                Arc::clone(&self.registry),
                entry.identifier.clone(),
                self.lookup_timeout,
            ))
        });
        let results = join_all(handles).await;

        let today = self.clock.today();
        let mut records = Vec::with_capacity(batch.len());
        for (entry, result) in batch.iter().zip(results) {
            records.push(reconcile(entry, result?.as_ref(), today));
        }
        Ok(records)
    }

    async fn process_with_retry(&self, batch: &[InputEntry]) -> VerifyResult<Vec<EnrichedRecord>> {
        let mut attempt = 0;
        loop {
            match self.process_batch(batch).await {
                Ok(records) => return Ok(records),
                Err(err) if attempt < self.batch_retries => {
                    attempt += 1;
                    log::warn!("batch failed ({err}), retry {attempt}/{}", self.batch_retries);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Verify `entries` batch by batch, reporting each batch to `sink`.
    ///
    /// Individual lookup failures become Cancelled records. A batch that keeps
    /// failing after its retries is handled by the configured
    /// [`BatchFailurePolicy`]; either way the run continues and `processed`
    /// advances by the batch length.
    pub async fn run<S>(&self, entries: &[InputEntry], sink: &mut S) -> RunSummary
    where
        S: ResultSink + ?Sized,
    {
        let total = entries.len();
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        for (index, batch) in entries.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let records = match self.process_with_retry(batch).await {
                Ok(records) => records,
                Err(err) => {
                    summary.failed_batches += 1;
                    let identifiers: Vec<&str> =
                        batch.iter().map(|e| e.identifier.as_str()).collect();
                    match self.failure_policy {
                        BatchFailurePolicy::Placeholder => {
                            log::warn!(
                                "batch {index} failed ({err}); placeholders for {identifiers:?}"
                            );
                            let today = self.clock.today();
                            batch
                                .iter()
                                .map(|entry| EnrichedRecord::placeholder(entry, today))
                                .collect()
                        }
                        BatchFailurePolicy::Drop => {
                            log::warn!(
                                "batch {index} failed ({err}); records lost for {identifiers:?}"
                            );
                            summary
                                .lost
                                .extend(identifiers.iter().map(|s| s.to_string()));
                            Vec::new()
                        }
                    }
                }
            };

            summary.processed += batch.len();
            summary.count(&records);
            log::info!(
                "batch {index}: {} records, {}/{} processed",
                records.len(),
                summary.processed,
                total
            );
            sink.on_batch(records, summary.processed, total);
        }

        sink.on_complete(&summary);
        summary
    }
}
