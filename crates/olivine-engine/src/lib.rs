//! # olivine-engine: Storage engine contract for `Olivine`
//!
//! A range applies committed commands against a local storage engine. The
//! engine is deliberately narrow: ordered point reads/writes and bounded
//! scans over raw bytes. Everything higher-level (timestamps, idempotence,
//! command semantics) lives above this seam in `olivine-range`.
//!
//! The engine is shared between ranges on a store and injected at range
//! construction; implementations must be safe for concurrent use.

use bytes::Bytes;
use olivine_types::{Key, KeyValue};

mod mem;

pub use mem::MemEngine;

/// Error returned by storage engine operations.
///
/// The core propagates engine errors verbatim; it never interprets them.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Underlying I/O failure.
    #[error("engine I/O failure: {0}")]
    Io(String),
    /// The engine has been closed and can no longer serve requests.
    #[error("engine is closed")]
    Closed,
}

/// Ordered key-value storage underneath a range.
///
/// All calls are synchronous. `scan` returns entries in ascending key
/// order over the half-open interval `[start, end)`.
pub trait Engine: Send + Sync {
    /// Returns the value for `key`, or `None` if absent. Absence is not an
    /// error.
    fn get(&self, key: &Key) -> Result<Option<Bytes>, EngineError>;

    /// Sets the value for `key`, overwriting any existing value.
    fn put(&self, key: Key, value: Bytes) -> Result<(), EngineError>;

    /// Removes the entry for `key`. Clearing an absent key is a no-op.
    fn clear(&self, key: &Key) -> Result<(), EngineError>;

    /// Returns up to `max_results` entries from `[start, end)` in ascending
    /// key order. `max_results` of zero means unbounded.
    fn scan(
        &self,
        start: &Key,
        end: &Key,
        max_results: u64,
    ) -> Result<Vec<KeyValue>, EngineError>;
}
