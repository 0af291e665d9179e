//! Recovers unknown instance ids from provider failures and terminates them
//!
//! Providers such as EC2 fail a whole describe call when any requested
//! instance no longer exists, and only name the offending ids in the error
//! message:
//!
//! ```text
//! InvalidInstanceID.NotFound: The instance IDs 'i-1, i-2' do not exist
//! ```
//!
//! The parser below accepts exactly that shape and nothing looser. When it
//! cannot find a list the batch is left alone for the next pass.

use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::planner::Batch;
use super::{BatchFailure, BatchOutcome, BatchResolution, TransitionCounts, apply_transition};
use crate::hosts::HostStore;
use crate::models::{HostModel, HostStatus};

static UNKNOWN_INSTANCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)instance ids?\s+'([^']*)'\s+(?:(?:does|do)\s+not\s+exist|(?:was|were)\s+not\s+found)",
    )
    .expect("unknown instance pattern is valid")
});

/// Instance ids named as nonexistent in `message`, in order of appearance.
///
/// Returns `None` if the message has no recognizable id list.
pub fn parse_unknown_instance_ids(message: &str) -> Option<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    for captures in UNKNOWN_INSTANCES.captures_iter(message) {
        let Some(list) = captures.get(1) else {
            continue;
        };
        for id in list.as_str().split(',').map(str::trim) {
            if !id.is_empty() && !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
    }

    if ids.is_empty() { None } else { Some(ids) }
}

/// Terminate the hosts of `batch` named in `unknown_ids`.
///
/// Ids outside the batch are ignored: they belong to another provider/region
/// query, which is the only authority on their state. If no id names a host of
/// the batch nothing is resolved and the batch is reported as failed. The
/// expected prior status of each write is whatever the pass observed, so a
/// host that another job moved in the meantime is left to that job.
pub async fn terminate_unknown_hosts(
    store: &dyn HostStore,
    candidates: &HashMap<String, HostModel>,
    batch: &Batch,
    unknown_ids: &[String],
    reason: &str,
) -> BatchOutcome {
    let (members, foreign): (Vec<&String>, Vec<&String>) =
        unknown_ids.iter().partition(|id| batch.contains(id));
    if !foreign.is_empty() {
        debug!(
            "Ignoring unknown instances outside the batch provider={} region={}: {:?}",
            batch.key.provider, batch.key.region, foreign
        );
    }
    if members.is_empty() {
        return BatchOutcome::failed(
            batch,
            format!(
                "provider named no instance of this batch as unknown: {}",
                unknown_ids.join(", ")
            ),
        );
    }

    let mut counts = TransitionCounts::default();
    let mut errors: Vec<String> = Vec::new();

    for id in members {
        let Some(host) = candidates.get(id) else {
            warn!("Planned host {} is not in the candidate set", id);
            continue;
        };
        if host.status == HostStatus::Terminated {
            continue;
        }

        let result =
            apply_transition(store, host, HostStatus::Terminated, reason, &mut counts).await;
        if let Err(e) = result {
            warn!("Failed to terminate unknown host host_id={}: {}", id, e);
            errors.push(format!("host {}: {}", id, e));
        }
    }

    if errors.is_empty() {
        BatchOutcome {
            resolution: BatchResolution::Recovered,
            counts,
            failure: None,
        }
    } else {
        BatchOutcome {
            resolution: BatchResolution::Failed,
            counts,
            failure: Some(BatchFailure::new(batch, errors.join("; "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_wrapped_provider_error() {
        let message = "error getting host statuses for providers: error describing instances: \
                       after 10 retries, operation failed: InvalidInstanceID.NotFound: \
                       The instance IDs 'h1, h2' do not exist";
        assert_eq!(
            parse_unknown_instance_ids(message),
            Some(vec!["h1".to_string(), "h2".to_string()])
        );
    }

    #[test]
    fn test_parses_single_instance() {
        let message = "An error occurred (InvalidInstanceID.NotFound) when calling the \
                       DescribeInstances operation: The instance ID 'i-0abc123' does not exist";
        assert_eq!(
            parse_unknown_instance_ids(message),
            Some(vec!["i-0abc123".to_string()])
        );
    }

    #[test]
    fn test_parses_not_found_phrase() {
        assert_eq!(
            parse_unknown_instance_ids("instance IDs 'a,b' were not found"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_deduplicates_and_skips_empty_entries() {
        assert_eq!(
            parse_unknown_instance_ids("The instance IDs 'h1, , h1, h3' do not exist"),
            Some(vec!["h1".to_string(), "h3".to_string()])
        );
    }

    #[test]
    fn test_unrecognized_messages_yield_none() {
        for message in [
            "",
            "RequestLimitExceeded: Request limit exceeded.",
            "InvalidInstanceID.NotFound",
            "The instance IDs '' do not exist",
            "The instance IDs h1, h2 do not exist",
            "instance 'h1' is shutting down",
        ] {
            assert_eq!(parse_unknown_instance_ids(message), None, "{}", message);
        }
    }
}
