//! Host store abstraction
//!
//! The store is the only writer of committed host state. Reconciliation never
//! writes a status blindly: every write names the status it expects the host
//! to be in and is applied only when that still holds.

mod sqlite;

pub use sqlite::SqliteHostStore;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::{HostEvent, HostModel, HostStatus};

/// Selects the hosts a reconciliation pass looks at
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFilter {
    pub statuses: Vec<HostStatus>,
    /// Restrict to a single provider
    pub provider: Option<String>,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            statuses: HostStatus::non_terminal(),
            provider: None,
        }
    }
}

impl CandidateFilter {
    pub fn for_provider(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, host: &HostModel) -> bool {
        self.statuses.contains(&host.status)
            && self.provider.as_ref().is_none_or(|p| *p == host.provider)
    }
}

#[async_trait]
pub trait HostStore: Send + Sync {
    /// Hosts matching the filter, in insertion order
    async fn find_candidate_hosts(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<HostModel>, StoreError>;

    /// Set the host's status to `new_status` only if it is currently `expected`.
    ///
    /// Returns `Ok(false)` when the host was moved by someone else (or does not
    /// exist); that is not an error.
    async fn conditional_update_status(
        &self,
        host_id: &str,
        expected: HostStatus,
        new_status: HostStatus,
    ) -> Result<bool, StoreError>;

    /// Append an audit event for an applied transition
    async fn log_event(&self, event: &HostEvent) -> Result<(), StoreError>;
}
