//! Common types shared by provider status clients

use serde::{Deserialize, Serialize};

/// Instance state as reported by a cloud provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Terminated,
    Failed,
    Unknown,
}

impl ProviderStatus {
    /// The provider confirms the instance is up
    pub fn is_alive(&self) -> bool {
        matches!(self, ProviderStatus::Running)
    }

    /// The provider says the instance is gone for good
    pub fn is_dead(&self) -> bool {
        matches!(self, ProviderStatus::Terminated | ProviderStatus::Failed)
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderStatus::Initializing => "initializing",
            ProviderStatus::Running => "running",
            ProviderStatus::Stopping => "stopping",
            ProviderStatus::Stopped => "stopped",
            ProviderStatus::Terminated => "terminated",
            ProviderStatus::Failed => "failed",
            ProviderStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
