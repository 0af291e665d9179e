//! Cloud provider status clients
//!
//! Each provider exposes one capability to the reconciler: report the current
//! state of a batch of instances in one region. Clients are looked up by the
//! host's provider name through a [`ProviderRegistry`].

pub mod common;
pub mod ec2;
pub mod mock;
pub mod retry;
pub mod static_hosts;
pub mod status_client;

pub use common::ProviderStatus;
pub use ec2::Ec2CliClient;
pub use mock::MockStatusClient;
pub use static_hosts::StaticStatusClient;
pub use status_client::StatusClient;

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ProvidersConfig, RetryConfig};
use crate::errors::ProviderError;

pub const PROVIDER_EC2: &str = "ec2";
pub const PROVIDER_STATIC: &str = "static";
pub const PROVIDER_MOCK: &str = "mock";

/// Factory function to create a status client for a provider name
pub fn create_status_client(
    provider: &str,
    config: &ProvidersConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn StatusClient>, ProviderError> {
    match provider {
        PROVIDER_EC2 => Ok(Arc::new(Ec2CliClient::new(&config.ec2, retry.clone()))),
        PROVIDER_STATIC => Ok(Arc::new(StaticStatusClient)),
        PROVIDER_MOCK => Ok(Arc::new(MockStatusClient::new())),
        other => Err(ProviderError::UnsupportedProvider(other.to_string())),
    }
}

/// Status clients keyed by provider name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn StatusClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider enabled in the configuration
    pub fn from_config(config: &ProvidersConfig, retry: &RetryConfig) -> Self {
        let mut registry = Self::new();
        let mut enabled = Vec::new();
        if config.ec2.enabled {
            enabled.push(PROVIDER_EC2);
        }
        if config.static_hosts {
            enabled.push(PROVIDER_STATIC);
        }

        for provider in enabled {
            match create_status_client(provider, config, retry) {
                Ok(client) => registry.register(provider, client),
                Err(e) => warn!("Skipping provider {}: {}", provider, e),
            }
        }
        registry
    }

    pub fn register(&mut self, provider: &str, client: Arc<dyn StatusClient>) {
        debug!("Registered status client provider={}", provider);
        self.clients.insert(provider.to_string(), client);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn StatusClient>> {
        self.clients.get(provider).cloned()
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
