//! Host data model shared by the store and the reconciliation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a host record.
///
/// This is a closed set; the store rejects any value it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HostStatus {
    #[serde(rename = "uninitialized")]
    #[default]
    Uninitialized,
    #[serde(rename = "starting")]
    Starting,
    #[serde(rename = "provisioning")]
    Provisioning,
    #[serde(rename = "provision_failed")]
    ProvisionFailed,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "quarantined")]
    Quarantined,
    #[serde(rename = "decommissioned")]
    Decommissioned,
    #[serde(rename = "stopping")]
    Stopping,
    #[serde(rename = "stopped")]
    Stopped,
    #[serde(rename = "terminating")]
    Terminating,
    #[serde(rename = "terminated")]
    Terminated,
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Value not valid: {}", s))
    }
}

impl HostStatus {
    pub const ALL: [HostStatus; 11] = [
        HostStatus::Uninitialized,
        HostStatus::Starting,
        HostStatus::Provisioning,
        HostStatus::ProvisionFailed,
        HostStatus::Running,
        HostStatus::Quarantined,
        HostStatus::Decommissioned,
        HostStatus::Stopping,
        HostStatus::Stopped,
        HostStatus::Terminating,
        HostStatus::Terminated,
    ];

    /// Text form used for database storage
    pub fn as_str(&self) -> &'static str {
        match *self {
            HostStatus::Uninitialized => "uninitialized",
            HostStatus::Starting => "starting",
            HostStatus::Provisioning => "provisioning",
            HostStatus::ProvisionFailed => "provision_failed",
            HostStatus::Running => "running",
            HostStatus::Quarantined => "quarantined",
            HostStatus::Decommissioned => "decommissioned",
            HostStatus::Stopping => "stopping",
            HostStatus::Stopped => "stopped",
            HostStatus::Terminating => "terminating",
            HostStatus::Terminated => "terminated",
        }
    }

    /// Terminal hosts are never revisited by reconciliation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostStatus::Terminated)
    }

    /// All statuses a reconciliation pass considers
    pub fn non_terminal() -> Vec<HostStatus> {
        HostStatus::ALL
            .iter()
            .copied()
            .filter(|status| !status.is_terminal())
            .collect()
    }
}

/// The distro a host was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DistroModel {
    pub id: String,
    pub provider: String,
    /// Provider-specific settings documents. The first document carries the region.
    pub provider_settings: Vec<Map<String, Value>>,
}

impl DistroModel {
    /// Region from the provider settings, or the empty string when none is configured
    pub fn region(&self) -> &str {
        self.provider_settings
            .first()
            .and_then(|settings| settings.get("region"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// A cloud-provisioned worker host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HostModel {
    /// Host identifier; also the provider's instance id
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub status: HostStatus,
    #[serde(default)]
    pub distro: DistroModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_time: Option<DateTime<Utc>>,
}

impl HostModel {
    pub fn new(id: &str, provider: &str, status: HostStatus) -> Self {
        Self {
            id: id.to_string(),
            provider: provider.to_string(),
            status,
            distro: DistroModel {
                provider: provider.to_string(),
                ..Default::default()
            },
            termination_time: None,
        }
    }

    /// Builder-style helper that places the host in `region`
    pub fn with_region(mut self, region: &str) -> Self {
        let mut settings = Map::new();
        settings.insert("region".to_string(), Value::String(region.to_string()));
        self.distro.provider_settings = vec![settings];
        self
    }

    pub fn region(&self) -> &str {
        self.distro.region()
    }
}

/// Audit record written for every applied status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub host_id: String,
    pub timestamp: DateTime<Utc>,
    pub previous_status: HostStatus,
    pub new_status: HostStatus,
    pub reason: String,
}

impl HostEvent {
    pub fn new(
        host_id: &str,
        previous_status: HostStatus,
        new_status: HostStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            host_id: host_id.to_string(),
            timestamp: Utc::now(),
            previous_status,
            new_status,
            reason: reason.into(),
        }
    }
}
