//! Fleetkeeper: cloud host status reconciliation
//!
//! Keeps the database record of every cloud-provisioned worker host consistent
//! with the instance state reported by its cloud provider. The entry point is
//! [`reconcile::CloudHostReadyJob`], which loads unconfirmed hosts from a
//! [`hosts::HostStore`], queries each provider/region batch through a
//! [`cloud::StatusClient`] and applies lifecycle transitions with conditional
//! updates.

pub mod cloud;
pub mod config;
pub mod errors;
pub mod hosts;
pub mod models;
pub mod reconcile;

pub use cloud::{ProviderRegistry, ProviderStatus, StatusClient};
pub use config::FleetConfig;
pub use errors::{ProviderError, StoreError};
pub use hosts::{CandidateFilter, HostStore, SqliteHostStore};
pub use models::{DistroModel, HostEvent, HostModel, HostStatus};
pub use reconcile::{BatchFailure, CloudHostReadyJob, PassReport};
