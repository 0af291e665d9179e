//! Applies the lifecycle transition policy to a batch of fetched statuses

use log::{debug, warn};
use std::collections::HashMap;

use super::planner::Batch;
use super::terminator::terminate_unknown_hosts;
use super::{BatchOutcome, BatchResolution, TransitionCounts, apply_transition};
use crate::cloud::ProviderStatus;
use crate::hosts::HostStore;
use crate::models::{HostModel, HostStatus};

/// Status a host should move to given what its provider reports.
///
/// Only `starting` hosts are moved; anything else waits for the subsystem
/// that owns its current state.
pub fn next_status(current: HostStatus, reported: ProviderStatus) -> Option<HostStatus> {
    match current {
        HostStatus::Starting if reported.is_alive() => Some(HostStatus::Provisioning),
        HostStatus::Starting if reported.is_dead() => Some(HostStatus::Terminated),
        _ => None,
    }
}

fn transition_reason(reported: ProviderStatus) -> String {
    format!("provider reports instance {}", reported)
}

/// Apply `statuses` to the hosts in `batch`.
///
/// Requested instances missing from `statuses` are unknown to the provider and
/// are terminated. A store error on one host does not stop the rest of the
/// batch; the batch is then reported as failed.
pub async fn reconcile_batch(
    store: &dyn HostStore,
    candidates: &HashMap<String, HostModel>,
    batch: &Batch,
    statuses: &HashMap<String, ProviderStatus>,
) -> BatchOutcome {
    let mut counts = TransitionCounts::default();
    let mut errors: Vec<String> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    for host_id in &batch.host_ids {
        let Some(host) = candidates.get(host_id) else {
            warn!("Planned host {} is not in the candidate set", host_id);
            continue;
        };
        let Some(&reported) = statuses.get(host_id) else {
            missing.push(host_id.clone());
            continue;
        };

        let Some(new_status) = next_status(host.status, reported) else {
            debug!(
                "No transition host_id={} status={} provider_status={}",
                host.id, host.status, reported
            );
            continue;
        };

        if let Err(e) = apply_transition(
            store,
            host,
            new_status,
            &transition_reason(reported),
            &mut counts,
        )
        .await
        {
            errors.push(format!("host {}: {}", host.id, e));
        }
    }

    let mut outcome = BatchOutcome {
        resolution: BatchResolution::Reconciled,
        counts,
        failure: None,
    };

    if !missing.is_empty() {
        warn!(
            "Provider did not return {} requested instance(s) provider={} region={}: {:?}",
            missing.len(),
            batch.key.provider,
            batch.key.region,
            missing
        );
        let terminated = terminate_unknown_hosts(
            store,
            candidates,
            batch,
            &missing,
            "instance not returned by provider",
        )
        .await;
        outcome.counts.terminated += terminated.counts.terminated;
        outcome.counts.conflicts += terminated.counts.conflicts;
        if let Some(failure) = terminated.failure {
            errors.push(failure.error);
        }
    }

    if !errors.is_empty() {
        outcome.resolution = BatchResolution::Failed;
        outcome.failure = Some(super::BatchFailure::new(batch, errors.join("; ")));
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_and_running_moves_to_provisioning() {
        assert_eq!(
            next_status(HostStatus::Starting, ProviderStatus::Running),
            Some(HostStatus::Provisioning)
        );
    }

    #[test]
    fn test_starting_and_dead_moves_to_terminated() {
        assert_eq!(
            next_status(HostStatus::Starting, ProviderStatus::Terminated),
            Some(HostStatus::Terminated)
        );
        assert_eq!(
            next_status(HostStatus::Starting, ProviderStatus::Failed),
            Some(HostStatus::Terminated)
        );
    }

    #[test]
    fn test_starting_and_pending_waits() {
        assert_eq!(
            next_status(HostStatus::Starting, ProviderStatus::Initializing),
            None
        );
        assert_eq!(next_status(HostStatus::Starting, ProviderStatus::Unknown), None);
        assert_eq!(next_status(HostStatus::Starting, ProviderStatus::Stopped), None);
    }

    #[test]
    fn test_non_starting_hosts_are_never_moved() {
        let provider_statuses = [
            ProviderStatus::Initializing,
            ProviderStatus::Running,
            ProviderStatus::Stopping,
            ProviderStatus::Stopped,
            ProviderStatus::Terminated,
            ProviderStatus::Failed,
            ProviderStatus::Unknown,
        ];
        for status in HostStatus::ALL {
            if status == HostStatus::Starting {
                continue;
            }
            for reported in provider_statuses {
                assert_eq!(next_status(status, reported), None, "{} / {}", status, reported);
            }
        }
    }
}
