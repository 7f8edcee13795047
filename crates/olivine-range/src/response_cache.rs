//! Response cache providing at-most-once execution for retried commands.
//!
//! Replies to mutating commands are persisted in the same storage engine
//! as user data, keyed by `(RangeId, ClientCmdId)`. Because the cache write
//! happens inside command execution, which every replica applies
//! identically from the committed log, a retried command finds its
//! original reply on whichever replica leads, across restarts and
//! leadership changes.
//!
//! A lookup for a command that is currently executing blocks until that
//! execution caches its reply, so two racing submissions of the same
//! command ID produce exactly one engine-level side effect.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use bytes::Bytes;
use olivine_engine::{Engine, EngineError};
use olivine_types::{keys, ClientCmdId, RangeId};

use crate::command::Response;

/// Outcome of a response cache lookup.
#[derive(Debug)]
pub enum CacheLookup {
    /// A prior reply exists; the caller must return it without
    /// re-executing, propagating any embedded error.
    Hit(Response),
    /// No prior reply; the caller proceeds with execution and now owns the
    /// in-flight slot for this command ID.
    Miss,
}

/// Error from persisting a reply.
///
/// Never surfaced to clients: the operation already applied, so a failed
/// cache write merely degrades idempotence for one retry window.
#[derive(thiserror::Error, Debug)]
pub enum ResponseCacheError {
    #[error("unable to encode cached reply: {0}")]
    Encode(#[from] postcard::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Durable map from client command ID to the reply it produced, scoped to
/// one range.
pub struct ResponseCache {
    range_id: RangeId,
    engine: Arc<dyn Engine>,
    /// Command IDs currently executing; lookups for these block.
    inflight: Mutex<HashSet<ClientCmdId>>,
    cached: Condvar,
}

impl ResponseCache {
    /// Creates a cache over `engine` for the given range.
    pub fn new(range_id: RangeId, engine: Arc<dyn Engine>) -> Self {
        Self {
            range_id,
            engine,
            inflight: Mutex::new(HashSet::new()),
            cached: Condvar::new(),
        }
    }

    /// Looks up the reply previously stored for `cmd_id`.
    ///
    /// Blocks while the same command ID is already executing. A stored
    /// reply that fails to decode is logged and treated as a miss rather
    /// than failing the request; replay protection is best-effort. Engine
    /// read failures are returned for the caller to log and likewise treat
    /// as a miss.
    ///
    /// On `Miss`, the command ID is marked in-flight; execution must reach
    /// [`put_response`] (or [`abort`]) to release it.
    ///
    /// [`put_response`]: ResponseCache::put_response
    /// [`abort`]: ResponseCache::abort
    pub fn get_response(&self, cmd_id: ClientCmdId) -> Result<CacheLookup, EngineError> {
        if cmd_id.is_empty() {
            return Ok(CacheLookup::Miss);
        }

        let mut inflight = self.lock_inflight();
        while inflight.contains(&cmd_id) {
            inflight = self
                .cached
                .wait(inflight)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let key = keys::response_cache_key(self.range_id, cmd_id);
        match self.engine.get(&key)? {
            Some(encoded) => match postcard::from_bytes::<Response>(&encoded) {
                Ok(response) => Ok(CacheLookup::Hit(response)),
                Err(err) => {
                    tracing::error!(
                        range = %self.range_id,
                        %cmd_id,
                        error = %err,
                        "unable to decode cached reply; treating as a cache miss"
                    );
                    inflight.insert(cmd_id);
                    Ok(CacheLookup::Miss)
                }
            },
            None => {
                inflight.insert(cmd_id);
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Persists `response` as the reply for `cmd_id` and releases the
    /// in-flight slot, waking any lookups blocked on it.
    ///
    /// A no-op for the empty (read-only) command ID.
    pub fn put_response(
        &self,
        cmd_id: ClientCmdId,
        response: &Response,
    ) -> Result<(), ResponseCacheError> {
        if cmd_id.is_empty() {
            return Ok(());
        }
        let encoded = postcard::to_allocvec(response)?;
        let key = keys::response_cache_key(self.range_id, cmd_id);
        let result = self.engine.put(key, Bytes::from(encoded));
        self.release(cmd_id);
        result.map_err(ResponseCacheError::from)
    }

    /// Releases the in-flight slot for a command that will never cache a
    /// reply (submission failed before execution).
    pub fn abort(&self, cmd_id: ClientCmdId) {
        if cmd_id.is_empty() {
            return;
        }
        self.release(cmd_id);
    }

    fn release(&self, cmd_id: ClientCmdId) {
        let mut inflight = self.lock_inflight();
        inflight.remove(&cmd_id);
        self.cached.notify_all();
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashSet<ClientCmdId>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("range_id", &self.range_id)
            .finish_non_exhaustive()
    }
}
