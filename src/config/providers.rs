//! Provider client configuration

use serde::{Deserialize, Serialize};

/// Which provider status clients to register, and how to reach them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub ec2: Ec2Config,

    /// Register the `static` provider for machines that are always up
    pub static_hosts: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ec2: Ec2Config::default(),
            static_hosts: true,
        }
    }
}

/// EC2 status queries go through the AWS CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2Config {
    pub enabled: bool,

    /// Path to the `aws` executable
    pub aws_bin: String,

    /// Named AWS CLI profile (`--profile`)
    pub profile: Option<String>,
}

impl Default for Ec2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            aws_bin: "aws".to_string(),
            profile: None,
        }
    }
}
