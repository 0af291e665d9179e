//! Cloud host status reconciliation
//!
//! A pass loads every non-terminal host, groups them into provider/region
//! batches, asks each provider for the state of its instances and applies the
//! lifecycle policy:
//!
//! - `starting` hosts whose instance is running move to `provisioning`
//! - `starting` hosts whose instance is terminated or failed move to `terminated`
//! - hosts the provider no longer knows about move to `terminated`
//! - everything else is left alone
//!
//! All writes are conditional on the status observed when the pass loaded the
//! host, so racing with other lifecycle jobs can only turn a write into a no-op.

pub mod job;
pub mod planner;
pub mod reconciler;
pub mod terminator;

pub use job::CloudHostReadyJob;
pub use planner::{Batch, BatchKey, plan_batches};
pub use reconciler::{next_status, reconcile_batch};
pub use terminator::{parse_unknown_instance_ids, terminate_unknown_hosts};

use log::{debug, info, warn};
use serde::Serialize;

use crate::errors::StoreError;
use crate::hosts::HostStore;
use crate::models::{HostEvent, HostModel, HostStatus};

/// A batch that could not be resolved during a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub provider: String,
    pub region: String,
    pub host_ids: Vec<String>,
    pub error: String,
}

impl BatchFailure {
    pub fn new(batch: &Batch, error: impl Into<String>) -> Self {
        Self {
            provider: batch.key.provider.clone(),
            region: batch.key.region.clone(),
            host_ids: batch.host_ids.clone(),
            error: error.into(),
        }
    }
}

/// How a batch ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchResolution {
    /// Statuses were fetched and the transition policy applied
    Reconciled,
    /// The query failed but the unknown instances could be identified
    Recovered,
    /// Nothing could be resolved; retried on the next pass
    Failed,
}

/// Writes performed for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionCounts {
    pub provisioned: usize,
    pub terminated: usize,
    /// Conditional updates that found the host already moved
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub resolution: BatchResolution,
    pub counts: TransitionCounts,
    pub failure: Option<BatchFailure>,
}

impl BatchOutcome {
    pub fn failed(batch: &Batch, error: impl Into<String>) -> Self {
        Self {
            resolution: BatchResolution::Failed,
            counts: TransitionCounts::default(),
            failure: Some(BatchFailure::new(batch, error)),
        }
    }
}

/// Aggregate result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub job_id: String,
    pub hosts_examined: usize,
    pub batches_planned: usize,
    pub batches_reconciled: usize,
    pub batches_recovered: usize,
    pub batches_failed: usize,
    pub provisioned: usize,
    pub terminated: usize,
    pub conflicts: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BatchFailure>,
}

impl PassReport {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, outcome: BatchOutcome) {
        match outcome.resolution {
            BatchResolution::Reconciled => self.batches_reconciled += 1,
            BatchResolution::Recovered => self.batches_recovered += 1,
            BatchResolution::Failed => self.batches_failed += 1,
        }
        self.provisioned += outcome.counts.provisioned;
        self.terminated += outcome.counts.terminated;
        self.conflicts += outcome.counts.conflicts;
        self.failures.extend(outcome.failure);
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Conditionally move `host` from its observed status to `new_status`.
///
/// Records an audit event when the write is applied. Returns whether it was.
pub(crate) async fn apply_transition(
    store: &dyn HostStore,
    host: &HostModel,
    new_status: HostStatus,
    reason: &str,
    counts: &mut TransitionCounts,
) -> Result<bool, StoreError> {
    let applied = store
        .conditional_update_status(&host.id, host.status, new_status)
        .await?;

    if !applied {
        debug!(
            "Host changed concurrently, skipping host_id={} expected={} new={}",
            host.id, host.status, new_status
        );
        counts.conflicts += 1;
        return Ok(false);
    }

    info!(
        "Host transitioned host_id={} provider={} from={} to={} reason=\"{}\"",
        host.id, host.provider, host.status, new_status, reason
    );
    match new_status {
        HostStatus::Provisioning => counts.provisioned += 1,
        HostStatus::Terminated => counts.terminated += 1,
        _ => {}
    }

    let event = HostEvent::new(&host.id, host.status, new_status, reason);
    if let Err(e) = store.log_event(&event).await {
        // The transition itself is committed; losing the audit row is not fatal
        warn!("Failed to record host event host_id={}: {}", host.id, e);
    }
    Ok(true)
}
