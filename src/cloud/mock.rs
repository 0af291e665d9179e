//! In-memory status client for tests and local runs

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::common::ProviderStatus;
use super::status_client::StatusClient;
use super::PROVIDER_MOCK;
use crate::errors::ProviderError;

/// A failure to inject into `fetch_statuses`
#[derive(Debug, Clone)]
pub enum MockFailure {
    Transient(String),
    Rejected(String),
}

impl MockFailure {
    fn to_error(&self) -> ProviderError {
        match self {
            MockFailure::Transient(msg) => ProviderError::Transient(msg.clone()),
            MockFailure::Rejected(msg) => ProviderError::Rejected(msg.clone()),
        }
    }
}

/// One recorded `fetch_statuses` call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub region: String,
    pub instance_ids: Vec<String>,
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, ProviderStatus>,
    default_status: Option<ProviderStatus>,
    failure: Option<MockFailure>,
    failing_regions: HashSet<String>,
    calls: Vec<MockCall>,
}

/// Programmable provider. Instances without an explicit status report the
/// default status (running unless changed), or are left out of the result when
/// the default is cleared.
pub struct MockStatusClient {
    state: Mutex<MockState>,
}

impl Default for MockStatusClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStatusClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                default_status: Some(ProviderStatus::Running),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock cannot leave the state inconsistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_status(&self, instance_id: &str, status: ProviderStatus) {
        self.lock().instances.insert(instance_id.to_string(), status);
    }

    pub fn set_default_status(&self, status: Option<ProviderStatus>) {
        self.lock().default_status = status;
    }

    /// Fail every call with `failure`
    pub fn fail_with(&self, failure: MockFailure) {
        self.lock().failure = Some(failure);
    }

    /// Fail only calls for `region`, with the configured failure (or a
    /// generic rejection)
    pub fn fail_region(&self, region: &str) {
        self.lock().failing_regions.insert(region.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failure = None;
        state.failing_regions.clear();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl StatusClient for MockStatusClient {
    fn name(&self) -> &str {
        PROVIDER_MOCK
    }

    async fn fetch_statuses(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> Result<HashMap<String, ProviderStatus>, ProviderError> {
        let mut state = self.lock();
        state.calls.push(MockCall {
            region: region.to_string(),
            instance_ids: instance_ids.to_vec(),
        });

        let region_fails = state.failing_regions.contains(region);
        match (&state.failure, region_fails) {
            (Some(failure), true) => return Err(failure.to_error()),
            (Some(failure), false) if state.failing_regions.is_empty() => {
                return Err(failure.to_error());
            }
            (None, true) => {
                return Err(ProviderError::Rejected(format!(
                    "mock failure for region '{}'",
                    region
                )));
            }
            _ => {}
        }

        Ok(instance_ids
            .iter()
            .filter_map(|id| {
                state
                    .instances
                    .get(id)
                    .copied()
                    .or(state.default_status)
                    .map(|status| (id.clone(), status))
            })
            .collect())
    }
}
