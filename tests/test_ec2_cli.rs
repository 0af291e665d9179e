//! Runs the EC2 status client against a stand-in `aws` executable
#![cfg(unix)]

use fleetkeeper::cloud::{
    Ec2CliClient, PROVIDER_EC2, ProviderRegistry, ProviderStatus, StatusClient,
};
use fleetkeeper::config::{Ec2Config, RetryConfig};
use fleetkeeper::hosts::SqliteHostStore;
use fleetkeeper::models::{HostModel, HostStatus};
use fleetkeeper::reconcile::CloudHostReadyJob;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const FAKE_AWS: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
case "$*" in
  *i-missing*)
    echo "An error occurred (InvalidInstanceID.NotFound) when calling the DescribeInstances operation: The instance IDs 'i-missing, i-gone' do not exist" >&2
    exit 254
    ;;
  *i-denied*)
    echo "An error occurred (UnauthorizedOperation) when calling the DescribeInstances operation: You are not authorized to perform this operation." >&2
    exit 254
    ;;
  *)
    printf 'i-aaa\trunning\ni-bbb\tpending\n'
    ;;
esac
"#;

fn write_fake_aws(dir: &Path) -> String {
    let path = dir.join("aws");
    fs::write(&path, FAKE_AWS).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn single_attempt() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        ..Default::default()
    }
}

fn ec2_host(id: &str, region: &str) -> HostModel {
    HostModel::new(id, PROVIDER_EC2, HostStatus::Starting).with_region(region)
}

// One test drives every scenario so the script is written once per process
#[tokio::test]
async fn test_ec2_cli_client_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let config = Ec2Config {
        enabled: true,
        aws_bin: write_fake_aws(temp_dir.path()),
        profile: Some("fleet".to_string()),
    };
    let client = Arc::new(Ec2CliClient::new(&config, single_attempt()));

    // Direct query
    let ids = vec!["i-aaa".to_string(), "i-bbb".to_string()];
    let statuses = client.fetch_statuses("us-east-1", &ids).await.unwrap();
    assert_eq!(statuses["i-aaa"], ProviderStatus::Running);
    assert_eq!(statuses["i-bbb"], ProviderStatus::Initializing);

    let calls = fs::read_to_string(temp_dir.path().join("calls.log")).unwrap();
    assert_eq!(calls.lines().count(), 1);
    assert!(calls.contains("ec2 describe-instances --output text"));
    assert!(calls.contains("--region us-east-1 --profile fleet --instance-ids i-aaa i-bbb"));

    // Rejections carry the CLI's stderr
    let err = client
        .fetch_statuses("eu-west-1", &["i-denied".to_string()])
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("UnauthorizedOperation"));

    // Full pass
    let store = Arc::new(SqliteHostStore::in_memory().await.unwrap());
    for host in [
        ec2_host("i-aaa", "us-east-1"),
        ec2_host("i-bbb", "us-east-1"),
        ec2_host("i-missing", "us-west-2"),
        ec2_host("i-gone", "us-west-2"),
        ec2_host("i-denied", "eu-west-1"),
    ] {
        store.insert_host(&host).await.unwrap();
    }

    let mut registry = ProviderRegistry::new();
    registry.register(PROVIDER_EC2, client);
    let mut job = CloudHostReadyJob::new("ec2-pass", store.clone(), registry);
    job.run().await;
    assert!(job.error().is_none());

    let status = |host: Option<HostModel>| host.unwrap().status;
    assert_eq!(
        status(store.get_host("i-aaa").await.unwrap()),
        HostStatus::Provisioning
    );
    assert_eq!(
        status(store.get_host("i-bbb").await.unwrap()),
        HostStatus::Starting
    );
    assert_eq!(
        status(store.get_host("i-missing").await.unwrap()),
        HostStatus::Terminated
    );
    assert_eq!(
        status(store.get_host("i-gone").await.unwrap()),
        HostStatus::Terminated
    );
    assert_eq!(
        status(store.get_host("i-denied").await.unwrap()),
        HostStatus::Starting
    );

    let report = job.report().unwrap();
    assert_eq!(report.batches_planned, 3);
    assert_eq!(report.batches_reconciled, 1);
    assert_eq!(report.batches_recovered, 1);
    assert_eq!(report.batches_failed, 1);
    assert_eq!(report.failures[0].region, "eu-west-1");
}
