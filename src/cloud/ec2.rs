//! EC2 status client backed by the AWS CLI

use async_trait::async_trait;
use log::{debug, trace, warn};
use std::collections::HashMap;
use tokio::process::Command;

use super::common::ProviderStatus;
use super::retry::with_retries;
use super::status_client::StatusClient;
use super::PROVIDER_EC2;
use crate::config::{Ec2Config, RetryConfig};
use crate::errors::ProviderError;

const DESCRIBE_QUERY: &str = "Reservations[].Instances[].[InstanceId,State.Name]";

/// Error fragments from the AWS CLI that are worth retrying
const TRANSIENT_MARKERS: [&str; 8] = [
    "RequestLimitExceeded",
    "Throttling",
    "ServiceUnavailable",
    "InternalError",
    "Unavailable",
    "timed out",
    "Could not connect",
    "Connection reset",
];

/// Queries instance state with `aws ec2 describe-instances`
pub struct Ec2CliClient {
    aws_bin: String,
    profile: Option<String>,
    retry: RetryConfig,
}

impl Ec2CliClient {
    pub fn new(config: &Ec2Config, retry: RetryConfig) -> Self {
        Self {
            aws_bin: config.aws_bin.clone(),
            profile: config.profile.clone(),
            retry,
        }
    }

    /// Map an EC2 instance state name to a provider status
    fn map_status(state: &str) -> ProviderStatus {
        match state {
            "pending" => ProviderStatus::Initializing,
            "running" => ProviderStatus::Running,
            "stopping" | "shutting-down" => ProviderStatus::Stopping,
            "stopped" => ProviderStatus::Stopped,
            "terminated" => ProviderStatus::Terminated,
            _ => ProviderStatus::Unknown,
        }
    }

    fn classify_failure(stderr: &str) -> ProviderError {
        let message = stderr.trim().to_string();
        if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
            ProviderError::Transient(message)
        } else {
            ProviderError::Rejected(message)
        }
    }

    fn build_args(&self, region: &str, instance_ids: &[String]) -> Vec<String> {
        let mut args: Vec<String> = [
            "ec2",
            "describe-instances",
            "--output",
            "text",
            "--query",
            DESCRIBE_QUERY,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if !region.is_empty() {
            args.push("--region".to_string());
            args.push(region.to_string());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args.push("--instance-ids".to_string());
        args.extend(instance_ids.iter().cloned());
        args
    }

    /// Parse `InstanceId<whitespace>state` lines from the CLI text output
    fn parse_output(stdout: &str) -> Result<HashMap<String, ProviderStatus>, ProviderError> {
        let mut statuses = HashMap::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(ProviderError::MalformedResponse(format!(
                    "expected 2 fields, got {}: {}",
                    fields.len(),
                    line
                )));
            }
            statuses.insert(fields[0].to_string(), Self::map_status(fields[1]));
        }
        Ok(statuses)
    }

    async fn describe_once(
        &self,
        args: &[String],
    ) -> Result<HashMap<String, ProviderStatus>, ProviderError> {
        trace!("Running command: {} {:?}", self.aws_bin, args);
        let output = Command::new(&self.aws_bin).args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::classify_failure(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("describe-instances output: [{}]", stdout);
        Self::parse_output(&stdout)
    }
}

#[async_trait]
impl StatusClient for Ec2CliClient {
    fn name(&self) -> &str {
        PROVIDER_EC2
    }

    async fn fetch_statuses(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> Result<HashMap<String, ProviderStatus>, ProviderError> {
        if instance_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let args = self.build_args(region, instance_ids);
        let statuses = with_retries(&self.retry, "describe-instances", || {
            self.describe_once(&args)
        })
        .await?;

        for (id, status) in &statuses {
            if !instance_ids.contains(id) {
                warn!("describe-instances returned unrequested instance {} ({})", id, status);
            }
        }
        debug!(
            "Fetched ec2 statuses region={} requested={} returned={}",
            region,
            instance_ids.len(),
            statuses.len()
        );
        Ok(statuses)
    }
}
