//! The reconciliation job run by the scheduler

use anyhow::{Context, Result, anyhow};
use futures::{StreamExt, stream};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::planner::{Batch, plan_batches};
use super::reconciler::reconcile_batch;
use super::terminator::terminate_unknown_hosts;
use super::{BatchOutcome, PassReport};
use crate::cloud::ProviderRegistry;
use crate::config::ReconcilerConfig;
use crate::errors::ProviderError;
use crate::hosts::{CandidateFilter, HostStore};
use crate::models::HostModel;

/// One reconciliation pass over all unconfirmed cloud hosts.
///
/// The scheduler calls [`run`](Self::run) and reads the outcome afterwards
/// through [`error`](Self::error) and [`report`](Self::report). Batch failures
/// are diagnostics in the report; `error` is only set when the pass itself
/// could not complete (candidates could not be loaded, or the deadline passed).
pub struct CloudHostReadyJob {
    id: String,
    store: Arc<dyn HostStore>,
    providers: ProviderRegistry,
    filter: CandidateFilter,
    max_concurrent_batches: usize,
    pass_timeout: Duration,
    batch_timeout: Duration,
    completed: bool,
    report: Option<PassReport>,
    error: Option<anyhow::Error>,
}

impl CloudHostReadyJob {
    pub fn new(id: &str, store: Arc<dyn HostStore>, providers: ProviderRegistry) -> Self {
        let defaults = ReconcilerConfig::default();
        Self {
            id: id.to_string(),
            store,
            providers,
            filter: CandidateFilter::default(),
            max_concurrent_batches: defaults.max_concurrent_batches,
            pass_timeout: defaults.pass_timeout(),
            batch_timeout: defaults.batch_timeout(),
            completed: false,
            report: None,
            error: None,
        }
    }

    pub fn with_config(mut self, config: &ReconcilerConfig) -> Self {
        self.max_concurrent_batches = config.max_concurrent_batches.max(1);
        self.pass_timeout = config.pass_timeout();
        self.batch_timeout = config.batch_timeout();
        self
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Fatal error of the last run, if any
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    pub fn report(&self) -> Option<&PassReport> {
        self.report.as_ref()
    }

    /// Run one pass. Never returns an error; see [`error`](Self::error).
    pub async fn run(&mut self) {
        let started = Instant::now();
        self.report = None;
        self.error = None;

        match tokio::time::timeout(self.pass_timeout, self.execute()).await {
            Ok(Ok(report)) => {
                info!(
                    "Reconciliation pass complete job_id={} hosts={} batches={} reconciled={} \
                     recovered={} failed={} provisioned={} terminated={} conflicts={} elapsed={:?}",
                    self.id,
                    report.hosts_examined,
                    report.batches_planned,
                    report.batches_reconciled,
                    report.batches_recovered,
                    report.batches_failed,
                    report.provisioned,
                    report.terminated,
                    report.conflicts,
                    started.elapsed()
                );
                for failure in &report.failures {
                    warn!(
                        "Batch failed job_id={} provider={} region={} hosts={} error={}",
                        self.id,
                        failure.provider,
                        failure.region,
                        failure.host_ids.len(),
                        failure.error
                    );
                }
                self.report = Some(report);
            }
            Ok(Err(e)) => {
                error!("Reconciliation pass failed job_id={}: {:#}", self.id, e);
                self.error = Some(e);
            }
            Err(_) => {
                // In-flight batches are dropped here and picked up again next pass
                let e = anyhow!(
                    "reconciliation pass {} exceeded its deadline of {:?}",
                    self.id,
                    self.pass_timeout
                );
                error!("{}", e);
                self.error = Some(e);
            }
        }
        self.completed = true;
    }

    async fn execute(&self) -> Result<PassReport> {
        let hosts = self
            .store
            .find_candidate_hosts(&self.filter)
            .await
            .context("Failed to load candidate hosts")?;

        let mut report = PassReport::new(&self.id);
        report.hosts_examined = hosts.len();
        if hosts.is_empty() {
            info!("No candidate hosts job_id={}", self.id);
            return Ok(report);
        }

        let batches = plan_batches(&hosts);
        report.batches_planned = batches.len();
        info!(
            "Planned reconciliation job_id={} hosts={} batches={}",
            self.id,
            hosts.len(),
            batches.len()
        );

        let candidates: HashMap<String, HostModel> =
            hosts.into_iter().map(|h| (h.id.clone(), h)).collect();
        let candidates = &candidates;

        let outcomes: Vec<BatchOutcome> = stream::iter(batches)
            .map(|batch| async move { self.process_batch(&batch, candidates).await })
            .buffer_unordered(self.max_concurrent_batches.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            report.absorb(outcome);
        }
        Ok(report)
    }

    async fn process_batch(
        &self,
        batch: &Batch,
        candidates: &HashMap<String, HostModel>,
    ) -> BatchOutcome {
        let Some(client) = self.providers.get(&batch.key.provider) else {
            return BatchOutcome::failed(
                batch,
                ProviderError::UnsupportedProvider(batch.key.provider.clone()).to_string(),
            );
        };

        let query = client.fetch_statuses(&batch.key.region, &batch.host_ids);
        let Ok(result) = tokio::time::timeout(self.batch_timeout, query).await else {
            return BatchOutcome::failed(
                batch,
                format!(
                    "provider query for {} host(s) exceeded {:?}",
                    batch.host_ids.len(),
                    self.batch_timeout
                ),
            );
        };

        match result {
            Ok(statuses) => {
                reconcile_batch(self.store.as_ref(), candidates, batch, &statuses).await
            }
            Err(err) => {
                let message = err.to_string();
                match client.unknown_instance_ids(&message) {
                    Some(unknown) if unknown.iter().any(|id| batch.contains(id)) => {
                        warn!(
                            "Provider reports unknown instances provider={} region={} ids={:?}",
                            batch.key.provider, batch.key.region, unknown
                        );
                        terminate_unknown_hosts(
                            self.store.as_ref(),
                            candidates,
                            batch,
                            &unknown,
                            "instance no longer exists at provider",
                        )
                        .await
                    }
                    Some(unknown) => {
                        debug!(
                            "Unknown instances {:?} name no host of batch provider={} region={}",
                            unknown, batch.key.provider, batch.key.region
                        );
                        BatchOutcome::failed(batch, message)
                    }
                    None => BatchOutcome::failed(batch, message),
                }
            }
        }
    }
}
