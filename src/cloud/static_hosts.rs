//! Status client for statically provisioned machines
//!
//! Static hosts are not managed by a cloud API; they are always considered up.

use async_trait::async_trait;
use std::collections::HashMap;

use super::common::ProviderStatus;
use super::status_client::StatusClient;
use super::PROVIDER_STATIC;
use crate::errors::ProviderError;

pub struct StaticStatusClient;

#[async_trait]
impl StatusClient for StaticStatusClient {
    fn name(&self) -> &str {
        PROVIDER_STATIC
    }

    async fn fetch_statuses(
        &self,
        _region: &str,
        instance_ids: &[String],
    ) -> Result<HashMap<String, ProviderStatus>, ProviderError> {
        Ok(instance_ids
            .iter()
            .map(|id| (id.clone(), ProviderStatus::Running))
            .collect())
    }
}
