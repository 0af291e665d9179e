//! Trait implemented by every provider status client

use async_trait::async_trait;
use std::collections::HashMap;

use super::common::ProviderStatus;
use crate::errors::ProviderError;
use crate::reconcile::terminator::parse_unknown_instance_ids;

#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    /// Current status of each instance in `region`.
    ///
    /// Instances the provider no longer knows about are either missing from the
    /// map or reported through an error whose text names them. Transient
    /// failures are retried inside the client before an error is returned.
    async fn fetch_statuses(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> Result<HashMap<String, ProviderStatus>, ProviderError>;

    /// Instance ids the provider reports as nonexistent in a failure message.
    ///
    /// Returns `None` when the message does not have the expected shape.
    fn unknown_instance_ids(&self, message: &str) -> Option<Vec<String>> {
        parse_unknown_instance_ids(message)
    }
}
