//! Metadata dissemination contract.
//!
//! Ranges publish cluster-level facts (the cluster ID, the first range's
//! descriptor, administrative configuration maps) to a gossip network the
//! core only knows through the [`Gossip`] trait. The network itself,
//! peering, anti-entropy, and expiry included, is an external collaborator.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use olivine_types::{ClusterId, RangeDescriptor};
use serde::{Deserialize, Serialize};

use crate::config::PrefixConfigMap;

/// Gossip key for the cluster ID.
///
/// The cluster ID is the sentinel that tells a node it is connected to the
/// primary gossip network rather than a partition, so it carries a finite
/// TTL and is continually re-published by the first range's leader.
pub const KEY_CLUSTER_ID: &str = "cluster-id";

/// Gossip key for the first range's descriptor.
pub const KEY_FIRST_RANGE: &str = "first-range";

/// Gossip key for the accounting configuration map.
pub const KEY_CONFIG_ACCOUNTING: &str = "config-accounting";

/// Gossip key for the permission configuration map.
pub const KEY_CONFIG_PERMISSION: &str = "config-permission";

/// Gossip key for the zone configuration map.
pub const KEY_CONFIG_ZONE: &str = "config-zone";

/// A typed value published through gossip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipInfo {
    ClusterId(ClusterId),
    FirstRange(RangeDescriptor),
    Config(PrefixConfigMap),
}

/// Error from the gossip network.
#[derive(thiserror::Error, Debug)]
#[error("gossip rejected {key}: {reason}")]
pub struct GossipError {
    pub key: String,
    pub reason: String,
}

/// The dissemination seam a range publishes through.
///
/// A `ttl` of zero means the info never expires and is re-published only
/// on change.
pub trait Gossip: Send + Sync {
    fn add_info(&self, key: &str, info: GossipInfo, ttl: Duration) -> Result<(), GossipError>;
}

/// In-memory [`Gossip`] implementation recording the latest info per key.
#[derive(Debug, Default)]
pub struct MemGossip {
    infos: Mutex<HashMap<String, (GossipInfo, Duration)>>,
}

impl MemGossip {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published info for `key`.
    pub fn info(&self, key: &str) -> Option<GossipInfo> {
        self.lock_infos().get(key).map(|(info, _)| info.clone())
    }

    /// The TTL most recently published for `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.lock_infos().get(key).map(|(_, ttl)| *ttl)
    }

    /// Number of distinct keys published.
    pub fn len(&self) -> usize {
        self.lock_infos().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_infos().is_empty()
    }

    fn lock_infos(&self) -> std::sync::MutexGuard<'_, HashMap<String, (GossipInfo, Duration)>> {
        self.infos.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Gossip for MemGossip {
    fn add_info(&self, key: &str, info: GossipInfo, ttl: Duration) -> Result<(), GossipError> {
        self.lock_infos().insert(key.to_string(), (info, ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_info_overwrites_previous_value() {
        let gossip = MemGossip::new();
        gossip
            .add_info(
                KEY_CLUSTER_ID,
                GossipInfo::ClusterId(ClusterId::from("a")),
                Duration::from_secs(30),
            )
            .unwrap();
        gossip
            .add_info(
                KEY_CLUSTER_ID,
                GossipInfo::ClusterId(ClusterId::from("b")),
                Duration::from_secs(30),
            )
            .unwrap();

        assert_eq!(gossip.len(), 1);
        assert_eq!(
            gossip.info(KEY_CLUSTER_ID),
            Some(GossipInfo::ClusterId(ClusterId::from("b")))
        );
        assert_eq!(gossip.ttl(KEY_CLUSTER_ID), Some(Duration::from_secs(30)));
    }

    #[test]
    fn unpublished_key_is_none() {
        let gossip = MemGossip::new();
        assert!(gossip.info(KEY_FIRST_RANGE).is_none());
        assert!(gossip.is_empty());
    }
}
