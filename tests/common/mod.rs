#![allow(dead_code)]

use fleetkeeper::cloud::{MockStatusClient, PROVIDER_MOCK, ProviderRegistry};
use fleetkeeper::config::ReconcilerConfig;
use fleetkeeper::hosts::{HostStore, SqliteHostStore};
use fleetkeeper::models::{HostModel, HostStatus};
use fleetkeeper::reconcile::CloudHostReadyJob;
use rstest::fixture;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory host database plus a registry holding the mock provider
pub struct TestEnv {
    pub store: Arc<SqliteHostStore>,
    pub mock: Arc<MockStatusClient>,
    pub registry: ProviderRegistry,
}

impl TestEnv {
    pub async fn new(mock: Arc<MockStatusClient>) -> Self {
        let store = Arc::new(
            SqliteHostStore::in_memory()
                .await
                .expect("Failed to create in-memory host store"),
        );
        let mut registry = ProviderRegistry::new();
        registry.register(PROVIDER_MOCK, mock.clone());
        Self {
            store,
            mock,
            registry,
        }
    }

    pub async fn insert(&self, hosts: &[HostModel]) {
        for host in hosts {
            self.store
                .insert_host(host)
                .await
                .expect("Failed to insert host");
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn HostStore> {
        self.store.clone()
    }

    pub fn job(&self, id: &str) -> CloudHostReadyJob {
        CloudHostReadyJob::new(id, self.dyn_store(), self.registry.clone())
    }

    /// Run one pass with default settings and return the finished job
    pub async fn run_pass(&self, id: &str) -> CloudHostReadyJob {
        let mut job = self.job(id);
        job.run().await;
        assert!(job.is_complete());
        job
    }

    pub async fn status(&self, host_id: &str) -> HostStatus {
        self.store
            .get_host(host_id)
            .await
            .expect("Failed to read host")
            .unwrap_or_else(|| panic!("host {} not found", host_id))
            .status
    }

    pub async fn statuses(&self) -> HashMap<String, HostStatus> {
        self.store
            .list_hosts()
            .await
            .expect("Failed to list hosts")
            .into_iter()
            .map(|h| (h.id, h.status))
            .collect()
    }
}

#[fixture]
pub fn mock() -> Arc<MockStatusClient> {
    Arc::new(MockStatusClient::new())
}

/// Config with a short pass deadline for timeout tests
pub fn short_deadline_config(secs: f64) -> ReconcilerConfig {
    ReconcilerConfig {
        pass_timeout_secs: secs,
        ..Default::default()
    }
}

pub fn mock_host(id: &str, status: HostStatus) -> HostModel {
    HostModel::new(id, PROVIDER_MOCK, status)
}
