//! Error types for provider queries and host store access

use thiserror::Error;

/// Failure returned by a provider status client.
///
/// The `Display` text of every variant keeps the provider's own message intact,
/// since unknown-instance recovery parses it.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Throttling, timeouts and connection failures. Retried.
    #[error("{0}")]
    Transient(String),

    /// The provider refused the request (bad credentials, unknown instances, ...).
    #[error("{0}")]
    Rejected(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("after {attempts} attempts, operation failed: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ProviderError>,
    },

    #[error("no status client registered for provider '{0}'")]
    UnsupportedProvider(String),

    #[error("failed to run provider command: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Failure returned by a host store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid distro document for host {host_id}: {source}")]
    Distro {
        host_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid status '{status}' stored for host {host_id}")]
    InvalidStatus { host_id: String, status: String },
}
