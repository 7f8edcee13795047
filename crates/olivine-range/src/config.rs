//! Administrative configuration tracked by key prefix.
//!
//! Accounting, permission, and zone configuration live in the replicated
//! keyspace under reserved prefixes. A range covering one of these
//! prefixes rebroadcasts the full configuration map through gossip
//! whenever a write dirties it, so every node converges on the current
//! administrative state without reading the keyspace itself.

use std::fmt::Display;

use olivine_engine::EngineError;
use olivine_types::{keys, Attributes, ClusterId, Key};
use serde::{Deserialize, Serialize};

use crate::gossip;

// ============================================================================
// Config payloads
// ============================================================================

/// Accounting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AcctConfig {
    pub cluster_id: ClusterId,
}

/// Permission configuration: read/write ACLs for a key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PermConfig {
    /// Users with read permission.
    pub read: Vec<String>,
    /// Users with write permission.
    pub write: Vec<String>,
}

impl PermConfig {
    /// Returns true if `user` may read under the configured prefix.
    pub fn can_read(&self, user: &str) -> bool {
        self.read.iter().any(|u| u == user)
    }

    /// Returns true if `user` may write under the configured prefix.
    pub fn can_write(&self, user: &str) -> bool {
        self.write.iter().any(|u| u == user)
    }
}

/// Zone configuration: replication requirements for a key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ZoneConfig {
    /// Required attributes of each replica in the zone.
    pub replica_attrs: Vec<Attributes>,
    pub range_min_bytes: u64,
    pub range_max_bytes: u64,
}

/// A decoded configuration value of any tracked kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    Accounting(AcctConfig),
    Permission(PermConfig),
    Zone(ZoneConfig),
}

// ============================================================================
// ConfigKind
// ============================================================================

/// Error loading a configuration map from the engine.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unable to decode {kind} config at key {key}: {reason}")]
    Decode {
        kind: ConfigKind,
        key: Key,
        reason: String,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The administrative configuration kinds tracked by key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKind {
    Accounting,
    Permission,
    Zone,
}

impl ConfigKind {
    /// Every tracked kind; index order matches [`ConfigKind::index`].
    pub const ALL: [ConfigKind; 3] = [
        ConfigKind::Accounting,
        ConfigKind::Permission,
        ConfigKind::Zone,
    ];

    /// The reserved key prefix holding this kind's entries.
    pub fn key_prefix(self) -> Key {
        match self {
            ConfigKind::Accounting => keys::KEY_CONFIG_ACCOUNTING_PREFIX,
            ConfigKind::Permission => keys::KEY_CONFIG_PERMISSION_PREFIX,
            ConfigKind::Zone => keys::KEY_CONFIG_ZONE_PREFIX,
        }
    }

    /// The gossip key under which this kind's map is published.
    pub fn gossip_key(self) -> &'static str {
        match self {
            ConfigKind::Accounting => gossip::KEY_CONFIG_ACCOUNTING,
            ConfigKind::Permission => gossip::KEY_CONFIG_PERMISSION,
            ConfigKind::Zone => gossip::KEY_CONFIG_ZONE,
        }
    }

    /// Dense index for per-range dirty-flag storage.
    pub fn index(self) -> usize {
        match self {
            ConfigKind::Accounting => 0,
            ConfigKind::Permission => 1,
            ConfigKind::Zone => 2,
        }
    }

    /// Decodes a stored entry of this kind.
    pub fn decode(self, key: &Key, bytes: &[u8]) -> Result<ConfigValue, ConfigError> {
        let decode_err = |err: postcard::Error| ConfigError::Decode {
            kind: self,
            key: key.clone(),
            reason: err.to_string(),
        };
        match self {
            ConfigKind::Accounting => postcard::from_bytes::<AcctConfig>(bytes)
                .map(ConfigValue::Accounting)
                .map_err(decode_err),
            ConfigKind::Permission => postcard::from_bytes::<PermConfig>(bytes)
                .map(ConfigValue::Permission)
                .map_err(decode_err),
            ConfigKind::Zone => postcard::from_bytes::<ZoneConfig>(bytes)
                .map(ConfigValue::Zone)
                .map_err(decode_err),
        }
    }
}

impl Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigKind::Accounting => write!(f, "accounting"),
            ConfigKind::Permission => write!(f, "permission"),
            ConfigKind::Zone => write!(f, "zone"),
        }
    }
}

// ============================================================================
// PrefixConfigMap
// ============================================================================

/// One configuration entry: the key prefix it governs (relative to the
/// kind's reserved prefix) and its decoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixConfig {
    pub prefix: Key,
    pub config: ConfigValue,
}

impl PrefixConfig {
    pub fn new(prefix: Key, config: ConfigValue) -> Self {
        Self { prefix, config }
    }
}

/// An ordered set of prefix-keyed configuration entries, as published
/// through gossip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PrefixConfigMap(Vec<PrefixConfig>);

impl PrefixConfigMap {
    /// Builds a map from entries, ordering them by prefix.
    pub fn new(mut configs: Vec<PrefixConfig>) -> Self {
        configs.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        Self(configs)
    }

    /// The entry whose prefix is the longest one covering `key`, if any.
    pub fn config_for_key(&self, key: &Key) -> Option<&PrefixConfig> {
        self.0
            .iter()
            .filter(|entry| key.starts_with(&entry.prefix))
            .max_by_key(|entry| entry.prefix.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrefixConfig> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
