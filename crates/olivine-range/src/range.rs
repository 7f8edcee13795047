//! The range: a contiguous keyspace partition and its execution pipeline.
//!
//! A [`Range`] accepts client commands for the span its descriptor covers.
//! Reads are ordered through the timestamp cache and sequenced behind
//! overlapping in-flight writes; writes are forwarded past conflicting
//! reads, handed to the consensus submission queue, and applied to the
//! storage engine by a dedicated execution loop once committed. Replies to
//! mutating commands are persisted in the response cache as part of
//! execution, so retries never re-apply side effects.
//!
//! One mutex per range guards the timestamp cache, the read queue, and the
//! config dirty flags. It is held only for that bookkeeping, never across
//! the wait for overlapping writes and never across the consensus wait;
//! either would let requests on unrelated spans starve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_queue::ArrayQueue;
use olivine_engine::Engine;
use olivine_types::{keys, HlClock, Key, KeySpan, RangeDescriptor, RangeMetadata};

use crate::command::{
    AccumulateTsResponse, CmdError, ConditionalPutRequest, ConditionalPutResponse,
    ContainsRequest, ContainsResponse, DeleteRangeResponse, DeleteRequest, DeleteResponse,
    EndTransactionResponse, EnqueueMessageResponse, EnqueueUpdateResponse, GetRequest,
    GetResponse, IncrementRequest, IncrementResponse, InternalRangeLookupRequest,
    InternalRangeLookupResponse, PutRequest, PutResponse, ReapQueueResponse, Request, Response,
    ScanRequest, ScanResponse,
};
use crate::config::{ConfigError, ConfigKind, PrefixConfig, PrefixConfigMap};
use crate::gossip::{self, Gossip, GossipInfo};
use crate::read_queue::ReadQueue;
use crate::response_cache::{CacheLookup, ResponseCache};
use crate::sync::Latch;
use crate::tscache::TimestampCache;

/// TTL for the gossiped cluster ID.
///
/// The cluster ID is the sentinel key that tells a node it is connected to
/// the primary gossip network and not a partition, so it must expire and
/// be continually re-published by the first range's leader.
pub const CLUSTER_ID_GOSSIP_TTL: Duration = Duration::from_secs(30);

/// How long background loops sleep between shutdown-flag checks.
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

/// Tuning knobs for a range.
#[derive(Debug, Clone)]
pub struct RangeConfig {
    /// Capacity of the consensus submission queue.
    pub submit_queue_depth: usize,
    /// Bound on the wait for a submitted command to commit and execute.
    /// Expiry surfaces as [`CmdError::Stopped`] rather than hanging the
    /// caller forever.
    pub submit_timeout: Duration,
    /// Cadence of the metadata re-announcement loop.
    pub gossip_interval: Duration,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            submit_queue_depth: 64,
            submit_timeout: Duration::from_secs(30),
            // Re-publish well inside the cluster ID TTL.
            gossip_interval: Duration::from_secs(CLUSTER_ID_GOSSIP_TTL.as_secs() / 2),
        }
    }
}

/// An in-flight unit of work on the consensus submission queue.
///
/// Created per submitted write; the execution loop fulfills `done` with
/// the full reply once the command has been applied.
struct Cmd {
    request: Request,
    done: mpsc::SyncSender<Response>,
}

/// Bookkeeping guarded by the range lock.
struct RangeState {
    ts_cache: TimestampCache,
    read_queue: ReadQueue,
    /// Per-kind flags marking config prefixes whose gossiped view is
    /// stale. Initially all dirty so a fresh leader publishes on start.
    config_dirty: [bool; ConfigKind::ALL.len()],
}

/// A contiguous keyspace partition with writes managed through consensus.
///
/// Many ranges may exist in a store. Ranges are independent units: each
/// owns its timestamp cache, read queue, and response cache, and shares
/// the node's storage engine, clock, and gossip handle.
pub struct Range {
    meta: RangeMetadata,
    clock: Arc<HlClock>,
    engine: Arc<dyn Engine>,
    gossip: Option<Arc<dyn Gossip>>,
    resp_cache: ResponseCache,
    submit_queue: ArrayQueue<Cmd>,
    state: Mutex<RangeState>,
    leader: AtomicBool,
    stopping: AtomicBool,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    config: RangeConfig,
}

impl Range {
    /// Creates a range over `engine` for the span `meta` describes.
    ///
    /// The range starts idle; call [`start`] to launch the execution and
    /// gossip loops.
    ///
    /// [`start`]: Range::start
    pub fn new(
        meta: RangeMetadata,
        clock: Arc<HlClock>,
        engine: Arc<dyn Engine>,
        gossip: Option<Arc<dyn Gossip>>,
        config: RangeConfig,
    ) -> Arc<Self> {
        let resp_cache = ResponseCache::new(meta.range_id, Arc::clone(&engine));
        let low_water = clock.now();
        Arc::new(Self {
            meta,
            clock,
            engine,
            gossip,
            resp_cache,
            submit_queue: ArrayQueue::new(config.submit_queue_depth),
            state: Mutex::new(RangeState {
                ts_cache: TimestampCache::new(low_water),
                read_queue: ReadQueue::new(),
                config_dirty: [true; ConfigKind::ALL.len()],
            }),
            leader: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Publishes initial metadata and spawns the execution and gossip
    /// loops.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread cannot be spawned.
    pub fn start(self: &Arc<Self>) {
        self.maybe_gossip_cluster_id();
        self.maybe_gossip_first_range();
        self.maybe_gossip_configs();

        let range_id = self.meta.range_id.as_u64();
        let executor = {
            let range = Arc::clone(self);
            thread::Builder::new()
                .name(format!("olivine-range-{range_id}-exec"))
                .spawn(move || range.process_log())
                .expect("failed to spawn execution loop")
        };
        let gossiper = {
            let range = Arc::clone(self);
            thread::Builder::new()
                .name(format!("olivine-range-{range_id}-gossip"))
                .spawn(move || range.gossip_loop())
                .expect("failed to spawn gossip loop")
        };

        let mut workers = self.lock_workers();
        workers.push(executor);
        workers.push(gossiper);
    }

    /// Signals both background loops to stop and joins them. Safe to call
    /// more than once.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let handles: Vec<_> = self.lock_workers().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        // Drop any commands left in the queue; dropping their completion
        // senders unblocks submitters, which then release their in-flight
        // response-cache slots.
        while self.submit_queue.pop().is_some() {}
    }

    /// This range's cluster-wide identity.
    pub fn meta(&self) -> &RangeMetadata {
        &self.meta
    }

    /// Returns true if this range starts at the beginning of the keyspace.
    pub fn is_first_range(&self) -> bool {
        self.meta.descriptor.start_key == keys::KEY_MIN
    }

    /// Returns true if this replica currently leads the range.
    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }

    /// Updates this replica's leadership.
    ///
    /// Gaining leadership resets the timestamp cache to a fresh high-water
    /// mark: reads served under previous leaders are summarized by the
    /// floor, so no write accepted here can slip below them.
    pub fn set_leader(&self, leader: bool) {
        let was = self.leader.swap(leader, Ordering::AcqRel);
        if leader && !was {
            let now = self.clock.now();
            self.lock_state().ts_cache.clear(now);
        }
    }

    /// Returns true if this range's span contains `key`.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.meta.descriptor.contains_key(key)
    }

    /// Returns true if this range's span contains `[start, end)`.
    pub fn contains_key_span(&self, span: &KeySpan) -> bool {
        self.meta.descriptor.contains_key_span(span)
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Executes a read-only command.
    ///
    /// Records the read in the timestamp cache, then waits for overlapping
    /// writes already in flight through consensus to drain before reading
    /// the engine directly; read-only commands bypass consensus entirely.
    pub fn read_only_cmd(&self, mut request: Request) -> Result<Response, CmdError> {
        if !request.method().is_read_only() {
            return Err(CmdError::UnrecognizedCommand(format!(
                "{} is not a read-only command",
                request.method()
            )));
        }
        if request.header().timestamp.is_zero() {
            request.header_mut().timestamp = self.clock.now();
        }

        let span = request.header().span();
        let latch = Arc::new(Latch::new());
        {
            let mut state = self.lock_state();
            state.ts_cache.add(span.clone(), request.header().timestamp);
            state.read_queue.add_read(&span, &latch);
        }
        latch.wait();

        // The wait above can span an arbitrary delay, during which
        // leadership may have moved, and with it the writes we waited on
        // may have committed to the log without being applied here yet.
        // Re-verify leadership before touching the engine. Regaining
        // leadership in between is fine: the timestamp cache reset on every
        // leadership gain forces intervening writes to higher timestamps.
        if !self.is_leader() {
            return Err(CmdError::NotLeader);
        }

        self.execute_cmd(&request).into_result()
    }

    /// Executes a mutating command through consensus.
    ///
    /// Consults the response cache first so a retried command returns its
    /// original reply without re-executing. Otherwise the write's
    /// timestamp is forwarded past any conflicting read, the write is
    /// announced to the read queue, and the command is submitted to
    /// consensus; the call blocks until the execution loop applies it.
    pub fn read_write_cmd(&self, mut request: Request) -> Result<Response, CmdError> {
        if request.method().is_read_only() {
            return Err(CmdError::UnrecognizedCommand(format!(
                "{} is not a mutating command",
                request.method()
            )));
        }

        // Replay fast path. This may block if the same command is already
        // underway on another task.
        let cmd_id = request.header().cmd_id;
        match self.resp_cache.get_response(cmd_id) {
            Ok(CacheLookup::Hit(response)) => return response.into_result(),
            Ok(CacheLookup::Miss) => {}
            Err(err) => {
                // Losing the cache read degrades idempotence, not
                // correctness; proceed as though the entry expired.
                tracing::error!(
                    range = %self.meta.range_id,
                    %cmd_id,
                    error = %err,
                    "unable to read response cache; proceeding without replay protection"
                );
            }
        }

        if request.header().timestamp.is_zero() {
            request.header_mut().timestamp = self.clock.now();
        }

        let span = request.header().span();
        let write_handle = {
            let mut state = self.lock_state();
            // A mutating command must never write a key at or before the
            // most recent read of that key. Forward the write's timestamp
            // just past the maximum conflicting read; the adjusted value
            // flows into the reply when the command executes.
            let max_read = state.ts_cache.get_max(&span);
            if request.header().timestamp < max_read {
                request.header_mut().timestamp = max_read.next_logical();
            }
            // Announce the pending write before releasing the lock so no
            // later read can miss it.
            state.read_queue.add_write(span)
        };

        let result = self.enqueue_cmd(request);

        // The command is no longer in flight; release waiting reads
        // regardless of the outcome.
        self.lock_state().read_queue.remove_write(write_handle);

        result.and_then(Response::into_result)
    }

    /// Submits a command to consensus and waits for the execution loop to
    /// apply it.
    fn enqueue_cmd(&self, request: Request) -> Result<Response, CmdError> {
        let cmd_id = request.header().cmd_id;
        let (done, done_rx) = mpsc::sync_channel(1);
        let mut cmd = Cmd { request, done };

        loop {
            if self.stopping.load(Ordering::Acquire) {
                self.resp_cache.abort(cmd_id);
                return Err(CmdError::Stopped);
            }
            match self.submit_queue.push(cmd) {
                Ok(()) => break,
                Err(returned) => {
                    cmd = returned;
                    thread::yield_now();
                }
            }
        }

        match done_rx.recv_timeout(self.config.submit_timeout) {
            Ok(response) => Ok(response),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    range = %self.meta.range_id,
                    %cmd_id,
                    timeout = ?self.config.submit_timeout,
                    "command timed out awaiting consensus"
                );
                Err(CmdError::Stopped)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.resp_cache.abort(cmd_id);
                Err(CmdError::Stopped)
            }
        }
    }

    // ========================================================================
    // Background loops
    // ========================================================================

    /// Drains committed commands from the submission queue and applies
    /// them, until [`stop`] is called. The stop signal is checked before
    /// taking more work, so shutdown wins over queued commands.
    ///
    /// [`stop`]: Range::stop
    fn process_log(&self) {
        while !self.stopping.load(Ordering::Acquire) {
            match self.submit_queue.pop() {
                Some(cmd) => {
                    let response = self.execute_cmd(&cmd.request);
                    // The submitter may have timed out and gone away.
                    let _ = cmd.done.send(response);
                }
                None => thread::yield_now(),
            }
        }
    }

    /// Periodically re-announces cluster metadata and retries dirty config
    /// prefixes, until [`stop`] is called.
    ///
    /// [`stop`]: Range::stop
    fn gossip_loop(&self) {
        loop {
            let mut slept = Duration::ZERO;
            while slept < self.config.gossip_interval {
                if self.stopping.load(Ordering::Acquire) {
                    return;
                }
                thread::sleep(SHUTDOWN_POLL);
                slept += SHUTDOWN_POLL;
            }
            self.maybe_gossip_cluster_id();
            self.maybe_gossip_first_range();
            self.maybe_gossip_configs();
        }
    }

    // ========================================================================
    // Gossip
    // ========================================================================

    /// Gossips the cluster ID if this replica leads the first range.
    fn maybe_gossip_cluster_id(&self) {
        let Some(gossip) = &self.gossip else { return };
        if self.is_first_range() && self.is_leader() {
            if let Err(err) = gossip.add_info(
                gossip::KEY_CLUSTER_ID,
                GossipInfo::ClusterId(self.meta.cluster_id.clone()),
                CLUSTER_ID_GOSSIP_TTL,
            ) {
                tracing::error!(
                    cluster_id = %self.meta.cluster_id,
                    error = %err,
                    "failed to gossip cluster ID"
                );
            }
        }
    }

    /// Gossips the first range's descriptor if this replica leads it.
    fn maybe_gossip_first_range(&self) {
        let Some(gossip) = &self.gossip else { return };
        if self.is_first_range() && self.is_leader() {
            if let Err(err) = gossip.add_info(
                gossip::KEY_FIRST_RANGE,
                GossipInfo::FirstRange(self.meta.descriptor.clone()),
                Duration::ZERO,
            ) {
                tracing::error!(error = %err, "failed to gossip first range metadata");
            }
        }
    }

    /// Rebroadcasts configuration maps whose prefixes fall within this
    /// range and are marked dirty, provided this replica leads.
    ///
    /// Best-effort: a scan, decode, or publish failure is logged and
    /// leaves the prefix dirty for the next periodic pass. A stale
    /// gossiped view is preferable to failing the write that dirtied it.
    fn maybe_gossip_configs(&self) {
        let Some(gossip) = &self.gossip else { return };
        if !self.is_leader() {
            return;
        }
        for kind in ConfigKind::ALL {
            let dirty = self.lock_state().config_dirty[kind.index()];
            if !dirty || !self.contains_key(&kind.key_prefix()) {
                continue;
            }
            let config_map = match self.load_config_map(kind) {
                Ok(map) => map,
                Err(err) => {
                    tracing::error!(config = %kind, error = %err, "failed loading config map");
                    continue;
                }
            };
            if let Err(err) = gossip.add_info(
                kind.gossip_key(),
                GossipInfo::Config(config_map),
                Duration::ZERO,
            ) {
                tracing::error!(config = %kind, error = %err, "failed to gossip config map");
                continue;
            }
            self.lock_state().config_dirty[kind.index()] = false;
        }
    }

    /// Scans the entries under `kind`'s prefix and assembles the ordered
    /// configuration map to publish.
    fn load_config_map(&self, kind: ConfigKind) -> Result<PrefixConfigMap, ConfigError> {
        let prefix = kind.key_prefix();
        let kvs = self
            .engine
            .scan(&prefix, &keys::prefix_end_key(&prefix), 0)?;
        let mut configs = Vec::with_capacity(kvs.len());
        for kv in kvs {
            let config = kind.decode(&kv.key, &kv.value)?;
            let suffix = kv.key.strip_prefix(&prefix).unwrap_or_else(|| kv.key.clone());
            configs.push(PrefixConfig::new(suffix, config));
        }
        Ok(PrefixConfigMap::new(configs))
    }

    // ========================================================================
    // Command dispatch
    // ========================================================================

    /// Routes a command to its handler and applies response-cache
    /// bookkeeping.
    ///
    /// For mutating commands the reply, any embedded error included, is
    /// unconditionally persisted to the response cache. This runs as part
    /// of command execution so every replica maintains the same cached
    /// replies, keeping retries idempotent across leadership changes.
    fn execute_cmd(&self, request: &Request) -> Response {
        let mut response = match request {
            Request::Contains(args) => Response::Contains(self.contains(args)),
            Request::Get(args) => Response::Get(self.get(args)),
            Request::Put(args) => Response::Put(self.put(args)),
            Request::ConditionalPut(args) => {
                Response::ConditionalPut(self.conditional_put(args))
            }
            Request::Increment(args) => Response::Increment(self.increment(args)),
            Request::Scan(args) => Response::Scan(self.scan(args)),
            Request::Delete(args) => Response::Delete(self.delete(args)),
            Request::DeleteRange(_) => Response::DeleteRange(DeleteRangeResponse {
                header: unimplemented_header(request),
                ..DeleteRangeResponse::default()
            }),
            Request::EndTransaction(_) => Response::EndTransaction(EndTransactionResponse {
                header: unimplemented_header(request),
            }),
            Request::AccumulateTs(_) => Response::AccumulateTs(AccumulateTsResponse {
                header: unimplemented_header(request),
            }),
            Request::ReapQueue(_) => Response::ReapQueue(ReapQueueResponse {
                header: unimplemented_header(request),
                ..ReapQueueResponse::default()
            }),
            Request::EnqueueUpdate(_) => Response::EnqueueUpdate(EnqueueUpdateResponse {
                header: unimplemented_header(request),
            }),
            Request::EnqueueMessage(_) => Response::EnqueueMessage(EnqueueMessageResponse {
                header: unimplemented_header(request),
            }),
            Request::InternalRangeLookup(args) => {
                Response::InternalRangeLookup(self.internal_range_lookup(args))
            }
        };
        response.header_mut().timestamp = request.header().timestamp;

        if !request.method().is_read_only() {
            if let Err(err) = self
                .resp_cache
                .put_response(request.header().cmd_id, &response)
            {
                tracing::error!(
                    range = %self.meta.range_id,
                    cmd_id = %request.header().cmd_id,
                    method = %request.method(),
                    error = %err,
                    "unable to write reply to the response cache"
                );
            }
        }

        response
    }

    // ========================================================================
    // Operation handlers
    // ========================================================================

    /// Verifies the existence of a key.
    fn contains(&self, args: &ContainsRequest) -> ContainsResponse {
        let mut reply = ContainsResponse::default();
        match self.engine.get(&args.header.key) {
            Ok(value) => reply.exists = value.is_some(),
            Err(err) => reply.header.set_error(err.into()),
        }
        reply
    }

    /// Returns the value for a key; absence is reported as `None`.
    fn get(&self, args: &GetRequest) -> GetResponse {
        let mut reply = GetResponse::default();
        match self.engine.get(&args.header.key) {
            Ok(value) => reply.value = value,
            Err(err) => reply.header.set_error(err.into()),
        }
        reply
    }

    /// Sets the value for a key unconditionally.
    fn put(&self, args: &PutRequest) -> PutResponse {
        let mut reply = PutResponse::default();
        if let Err(err) = self.internal_put(&args.header.key, args.value.clone()) {
            reply.header.set_error(err);
        }
        reply
    }

    /// Sets the value for a key only if the expected value matches.
    ///
    /// `exp_value: None` requires the key to be absent. On mismatch the
    /// actual value is attached to the error for caller inspection.
    fn conditional_put(&self, args: &ConditionalPutRequest) -> ConditionalPutResponse {
        let mut reply = ConditionalPutResponse::default();
        let current = match self.engine.get(&args.header.key) {
            Ok(value) => value,
            Err(err) => {
                reply.header.set_error(err.into());
                return reply;
            }
        };

        match (&args.exp_value, &current) {
            (None, Some(_)) => {
                reply
                    .header
                    .set_error(CmdError::AlreadyExists(args.header.key.clone()));
                return reply;
            }
            (Some(_), None) => {
                reply
                    .header
                    .set_error(CmdError::NotFound(args.header.key.clone()));
                return reply;
            }
            (Some(expected), Some(actual)) if expected != actual => {
                reply.header.set_error(CmdError::ConditionFailed {
                    key: args.header.key.clone(),
                    actual: Some(actual.clone()),
                });
                return reply;
            }
            _ => {}
        }

        if let Err(err) = self.internal_put(&args.header.key, args.value.clone()) {
            reply.header.set_error(err);
        }
        reply
    }

    /// The guts of Put and ConditionalPut: writes the value, then marks
    /// any tracked config prefix the key falls under dirty and triggers a
    /// rebroadcast.
    fn internal_put(&self, key: &Key, value: Bytes) -> Result<(), CmdError> {
        self.engine.put(key.clone(), value)?;
        for kind in ConfigKind::ALL {
            if key.starts_with(&kind.key_prefix()) {
                self.lock_state().config_dirty[kind.index()] = true;
                self.maybe_gossip_configs();
                break;
            }
        }
        Ok(())
    }

    /// Adds a delta to the integer value at a key; an absent key counts as
    /// zero. Stored values are 8-byte little-endian signed integers.
    fn increment(&self, args: &IncrementRequest) -> IncrementResponse {
        let mut reply = IncrementResponse::default();
        let current = match self.engine.get(&args.header.key) {
            Ok(value) => value,
            Err(err) => {
                reply.header.set_error(err.into());
                return reply;
            }
        };
        let base = match current {
            None => 0,
            Some(bytes) => match decode_counter(&bytes) {
                Ok(value) => value,
                Err(err) => {
                    reply.header.set_error(err);
                    return reply;
                }
            },
        };
        let new_value = base.wrapping_add(args.increment);
        match self
            .engine
            .put(args.header.key.clone(), encode_counter(new_value))
        {
            Ok(()) => reply.new_value = new_value,
            Err(err) => reply.header.set_error(err.into()),
        }
        reply
    }

    /// Deletes a key. Deleting an absent key is not an error.
    fn delete(&self, args: &DeleteRequest) -> DeleteResponse {
        let mut reply = DeleteResponse::default();
        if let Err(err) = self.engine.clear(&args.header.key) {
            reply.header.set_error(err.into());
        }
        reply
    }

    /// Scans `[key, end_key)` up to `max_results` rows.
    fn scan(&self, args: &ScanRequest) -> ScanResponse {
        let mut reply = ScanResponse::default();
        match self
            .engine
            .scan(&args.header.key, &args.header.end_key, args.max_results)
        {
            Ok(rows) => reply.rows = rows,
            Err(err) => reply.header.set_error(err.into()),
        }
        reply
    }

    /// Looks up the metadata record covering the addressed metadata key:
    /// scans forward to the next metadata entry, validates it belongs to
    /// the same metadata level and actually covers the key, and returns
    /// the decoded descriptor plus the key at which it was found.
    fn internal_range_lookup(
        &self,
        args: &InternalRangeLookupRequest,
    ) -> InternalRangeLookupResponse {
        let mut reply = InternalRangeLookupResponse::default();
        let key = &args.header.key;

        if !key.starts_with(&keys::KEY_META_PREFIX)
            || key.len() < keys::KEY_META1_PREFIX.len()
        {
            reply
                .header
                .set_error(CmdError::InvalidKey(format!("not a metadata key: {key}")));
            return reply;
        }
        // A range ends just before its descriptor's end key.
        if *key >= self.meta.descriptor.end_key {
            reply.header.set_error(CmdError::InvalidKey(format!(
                "key {key} outside {} with end key {}",
                self.meta.range_id, self.meta.descriptor.end_key
            )));
            return reply;
        }

        // The covering descriptor is stored at the metadata key just
        // greater than the lookup key.
        let next = keys::next_key(key);
        let kvs = match self.engine.scan(&next, &keys::KEY_MAX, 1) {
            Ok(kvs) => kvs,
            Err(err) => {
                reply.header.set_error(err.into());
                return reply;
            }
        };
        let meta_prefix = Key::from(key.as_slice()[..keys::KEY_META1_PREFIX.len()].to_vec());
        let Some(found) = kvs.first() else {
            reply.header.set_error(CmdError::NotFound(key.clone()));
            return reply;
        };
        // The found entry must sit at the same metadata level.
        if !found.key.starts_with(&meta_prefix) {
            reply.header.set_error(CmdError::NotFound(key.clone()));
            return reply;
        }

        let descriptor: RangeDescriptor = match postcard::from_bytes(&found.value) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                reply.header.set_error(CmdError::InvalidValue(format!(
                    "unable to decode descriptor at {}: {err}",
                    found.key
                )));
                return reply;
            }
        };
        if *key < descriptor.start_key {
            // The looked-up key precedes the found range; we are likely
            // searching the wrong replica.
            reply.header.set_error(CmdError::NotFound(key.clone()));
            return reply;
        }

        reply.end_key = found.key.clone();
        reply.range = Some(descriptor);
        reply
    }

    // ========================================================================
    // Lock helpers
    // ========================================================================

    fn lock_state(&self) -> MutexGuard<'_, RangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<thread::JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Range")
            .field("meta", &self.meta)
            .field("leader", &self.is_leader())
            .finish_non_exhaustive()
    }
}

/// A reply header carrying the unimplemented-placeholder error for the
/// request's method.
fn unimplemented_header(request: &Request) -> crate::command::ResponseHeader {
    let mut header = crate::command::ResponseHeader::default();
    header.set_error(CmdError::Unimplemented(request.method().name().to_string()));
    header
}

/// Decodes a stored counter value.
fn decode_counter(bytes: &Bytes) -> Result<i64, CmdError> {
    let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
        CmdError::InvalidValue(format!(
            "counter value has length {}, expected 8",
            bytes.len()
        ))
    })?;
    Ok(i64::from_le_bytes(raw))
}

/// Encodes a counter value for storage.
fn encode_counter(value: i64) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}
