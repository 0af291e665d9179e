//! Groups candidate hosts into provider/region batches

use serde::Serialize;
use std::collections::HashMap;

use crate::models::HostModel;

/// Hosts sharing a key are queried with one provider call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BatchKey {
    pub provider: String,
    /// Empty when the host's distro has no provider settings
    pub region: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub key: BatchKey,
    pub host_ids: Vec<String>,
}

impl Batch {
    pub fn contains(&self, host_id: &str) -> bool {
        self.host_ids.iter().any(|id| id == host_id)
    }
}

/// Partition `candidates` by (provider, region).
///
/// Batches appear in the order their first host appears, and host ids keep
/// their input order within a batch. Every candidate lands in exactly one batch.
pub fn plan_batches(candidates: &[HostModel]) -> Vec<Batch> {
    let mut index: HashMap<BatchKey, usize> = HashMap::new();
    let mut batches: Vec<Batch> = Vec::new();

    for host in candidates {
        let key = BatchKey {
            provider: host.provider.clone(),
            region: host.region().to_string(),
        };
        match index.get(&key) {
            Some(&i) => batches[i].host_ids.push(host.id.clone()),
            None => {
                index.insert(key.clone(), batches.len());
                batches.push(Batch {
                    key,
                    host_ids: vec![host.id.clone()],
                });
            }
        }
    }

    batches
}
