//! # olivine-types: Core types for `Olivine`
//!
//! This crate contains shared types used across the `Olivine` system:
//! - Keyspace types ([`Key`], [`KeySpan`], [`KeyValue`])
//! - Temporal types ([`Timestamp`], [`HlClock`])
//! - Entity IDs ([`RangeId`], [`NodeId`], [`StoreId`], [`ClusterId`])
//! - Idempotency ([`ClientCmdId`])
//! - Range addressing ([`Attributes`], [`Replica`], [`RangeDescriptor`],
//!   [`RangeMetadata`])
//! - Reserved keyspace layout ([`keys`])

use std::{
    fmt::{Debug, Display},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub mod keys;

// ============================================================================
// Key - Clone (cheap, refcounted Bytes)
// ============================================================================

/// An opaque, totally ordered key in the global keyspace.
///
/// Keys are raw byte sequences compared lexicographically. The empty key
/// sorts before every other key and doubles as the minimum of the keyspace
/// ([`keys::KEY_MIN`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Key(Bytes);

impl Key {
    /// Creates a key from raw bytes.
    pub const fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Creates a key from a static byte slice without copying.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Returns the key as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty (the keyspace minimum).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the immediate lexicographic successor of this key.
    ///
    /// The successor of `k` is `k` followed by a zero byte: no key sorts
    /// strictly between the two.
    ///
    /// # Examples
    ///
    /// ```
    /// # use olivine_types::Key;
    /// let key = Key::from_static(b"a");
    /// assert_eq!(key.next().as_slice(), b"a\x00");
    /// ```
    pub fn next(&self) -> Key {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0);
        Key::from(bytes)
    }

    /// Returns true if this key starts with the given prefix.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the suffix of this key after `prefix`, or `None` if the key
    /// does not start with `prefix`.
    pub fn strip_prefix(&self, prefix: &Key) -> Option<Key> {
        self.0
            .strip_prefix(prefix.as_slice())
            .map(|rest| Key::from(rest.to_vec()))
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({self})")
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Printable ASCII as-is, everything else as \xNN
        for &byte in self.0.iter() {
            if (0x20..0x7f).contains(&byte) {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for Key {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&'static str> for Key {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Key> for Bytes {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// KeySpan - half-open key interval
// ============================================================================

/// A half-open interval of the keyspace, `[start, end)`.
///
/// An empty `end` denotes the single-key span covering exactly `start`.
/// Overlap and containment checks normalize a point span of `k` to
/// `[k, k.next())`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySpan {
    start: Key,
    end: Key,
}

impl KeySpan {
    /// Creates a span from start and end keys.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `end` is nonempty and sorts before `start`.
    pub fn new(start: Key, end: Key) -> Self {
        debug_assert!(
            end.is_empty() || start <= end,
            "span start {start} sorts after end {end}"
        );
        Self { start, end }
    }

    /// Creates the single-key span covering exactly `key`.
    pub fn point(key: Key) -> Self {
        Self {
            start: key,
            end: Key::default(),
        }
    }

    /// The inclusive start key.
    pub fn start(&self) -> &Key {
        &self.start
    }

    /// The exclusive end key; empty for a point span.
    pub fn end(&self) -> &Key {
        &self.end
    }

    /// The effective exclusive end: `start.next()` for point spans.
    fn effective_end(&self) -> Key {
        if self.end.is_empty() {
            self.start.next()
        } else {
            self.end.clone()
        }
    }

    /// Returns true if the two spans share at least one key.
    ///
    /// Any partial overlap counts.
    pub fn overlaps(&self, other: &KeySpan) -> bool {
        self.start < other.effective_end() && other.start < self.effective_end()
    }

    /// Returns true if `key` falls within this span.
    pub fn contains_key(&self, key: &Key) -> bool {
        *key >= self.start && *key < self.effective_end()
    }

    /// Returns true if `other` falls entirely within this span.
    pub fn contains_span(&self, other: &KeySpan) -> bool {
        other.start >= self.start && other.effective_end() <= self.effective_end()
    }
}

impl Display for KeySpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.end.is_empty() {
            write!(f, "[{}]", self.start)
        } else {
            write!(f, "[{},{})", self.start, self.end)
        }
    }
}

// ============================================================================
// KeyValue - a scanned key/value pair
// ============================================================================

/// A key paired with its stored value, as returned by engine scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Key,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: Key, value: Bytes) -> Self {
        Self { key, value }
    }
}

// ============================================================================
// Timestamp - Copy (12-byte hybrid wall/logical value)
// ============================================================================

/// A hybrid logical timestamp ordering operations across the system.
///
/// The wall component is nanoseconds since the Unix epoch; the logical
/// component breaks ties between events sharing a wall reading. Ordering is
/// lexicographic over `(wall_time, logical)`, which the derived `Ord`
/// provides via field order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    /// Wall-clock component, nanoseconds since Unix epoch.
    pub wall_time: u64,
    /// Logical tie-breaking component.
    pub logical: u32,
}

impl Timestamp {
    /// The minimum timestamp; sorts before every assigned timestamp.
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    /// Creates a timestamp from wall and logical components.
    pub fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// Returns true if this is the unset/minimum timestamp.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the immediately following timestamp.
    ///
    /// Ticks the logical component only: the result sorts after `self` but
    /// before any timestamp with a later wall reading.
    pub fn next_logical(&self) -> Timestamp {
        Timestamp {
            wall_time: self.wall_time,
            logical: self.logical.saturating_add(1),
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.wall_time / 1_000_000_000;
        let nanos = self.wall_time % 1_000_000_000;
        write!(f, "{secs}.{nanos:09},{}", self.logical)
    }
}

// ============================================================================
// HlClock - shared monotonic clock source
// ============================================================================

/// A node-wide hybrid-logical clock.
///
/// All ranges on a node share one clock so that timestamps assigned to
/// requests are monotonic across the node, even when the system clock
/// stalls or steps backwards. When the physical reading does not advance,
/// the logical component ticks instead.
#[derive(Debug)]
pub struct HlClock {
    last: Mutex<Timestamp>,
}

impl HlClock {
    /// Creates a clock starting at the minimum timestamp.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Timestamp::ZERO),
        }
    }

    /// Returns a timestamp strictly greater than every previous reading.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is before the Unix epoch, or if the
    /// internal lock is poisoned.
    pub fn now(&self) -> Timestamp {
        let physical = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_nanos() as u64;
        let mut last = self.last.lock().expect("clock lock poisoned");
        let next = if physical > last.wall_time {
            Timestamp::new(physical, 0)
        } else {
            last.next_logical()
        };
        *last = next;
        next
    }
}

impl Default for HlClock {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ClientCmdId - Copy (16-byte idempotency identifier)
// ============================================================================

/// Client-assigned identifier deduplicating retried mutating requests.
///
/// Clients generate a `ClientCmdId` before the first attempt at a command
/// and reuse it on every retry. Replicas key the response cache by this ID
/// so a replayed command returns the original reply without re-executing.
///
/// The zero value is the empty ID, carried by read-only requests which are
/// never cached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ClientCmdId {
    /// Wall-clock reading at the client when the ID was minted.
    pub wall_time: u64,
    /// Random discriminator from the client's CSPRNG.
    pub random: u64,
}

impl ClientCmdId {
    /// The empty ID carried by non-idempotent (read-only) requests.
    pub const EMPTY: ClientCmdId = ClientCmdId {
        wall_time: 0,
        random: 0,
    };

    /// Creates an ID from its components.
    pub fn new(wall_time: u64, random: u64) -> Self {
        Self { wall_time, random }
    }

    /// Returns true if this is the empty (read-only) ID.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Mints a fresh ID from the current wall clock and the OS CSPRNG.
    ///
    /// # Panics
    ///
    /// Panics if the OS CSPRNG fails, which indicates a catastrophic
    /// system error (e.g., no entropy source available).
    pub fn generate() -> Self {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_nanos() as u64;
        let mut bytes = [0u8; 8];
        getrandom::fill(&mut bytes).expect("CSPRNG failure is catastrophic");
        Self {
            wall_time,
            random: u64::from_le_bytes(bytes),
        }
    }
}

impl Display for ClientCmdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}.{:x}", self.wall_time, self.random)
    }
}

// ============================================================================
// Entity IDs - All Copy (cheap integer values)
// ============================================================================

/// Unique identifier for a range within the cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RangeId(u64);

impl RangeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for RangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "range#{}", self.0)
    }
}

impl From<u64> for RangeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<RangeId> for u64 {
    fn from(id: RangeId) -> Self {
        id.0
    }
}

/// Unique identifier for a node (one process in the cluster).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Unique identifier for a store (one physical device on a node).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StoreId(u32);

impl StoreId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

impl From<u32> for StoreId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Cluster-wide identifier, assigned at bootstrap and gossiped as the
/// sentinel that tells a node it is connected to the primary network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClusterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Attributes - Clone (arbitrary topology/capability strings)
// ============================================================================

/// Arbitrary strings describing node topology, store type, and machine
/// capabilities, used to match replicas against zone requirements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Attributes(Vec<String>);

impl Attributes {
    pub fn new(attrs: Vec<String>) -> Self {
        Self(attrs)
    }

    /// Returns true if every attribute in `self` also appears in `other`.
    pub fn is_subset_of(&self, other: &Attributes) -> bool {
        self.0.iter().all(|a| other.0.contains(a))
    }

    /// Returns a sorted, de-duplicated, comma-separated rendering.
    pub fn sorted_string(&self) -> String {
        let mut attrs = self.0.clone();
        attrs.sort();
        attrs.dedup();
        attrs.join(",")
    }
}

impl From<Vec<&str>> for Attributes {
    fn from(attrs: Vec<&str>) -> Self {
        Self(attrs.into_iter().map(str::to_string).collect())
    }
}

// ============================================================================
// Replica / RangeDescriptor / RangeMetadata
// ============================================================================

/// One copy of a range: the node and store where it lives, plus the
/// combined node/store attributes used for placement decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub node_id: NodeId,
    pub store_id: StoreId,
    pub range_id: RangeId,
    pub attrs: Attributes,
}

/// The value stored in a range metadata record: an inclusive start key, an
/// exclusive end key, and the replicas holding the range.
///
/// The key interval is immutable once assigned except through explicit
/// split/merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    /// First key which may be contained by this range.
    pub start_key: Key,
    /// End of the range's possible keys; not itself contained. Belongs to
    /// the immediately subsequent range.
    pub end_key: Key,
    /// Replicas storing this range.
    pub replicas: Vec<Replica>,
}

impl RangeDescriptor {
    /// Returns true if `key` falls within `[start_key, end_key)`.
    pub fn contains_key(&self, key: &Key) -> bool {
        *key >= self.start_key && *key < self.end_key
    }

    /// Returns true if the whole span `[start, end)` falls within the
    /// range. An empty `end` is treated as the point span of `start`.
    pub fn contains_key_span(&self, span: &KeySpan) -> bool {
        let end = if span.end().is_empty() {
            span.start()
        } else {
            span.end()
        };
        *span.start() >= self.start_key && *end <= self.end_key
    }

    /// The metadata key at which this descriptor is stored as a value.
    pub fn lookup_key(&self) -> Key {
        keys::range_meta_key(&self.end_key)
    }
}

/// Identifies one range instance cluster-wide: its descriptor plus the
/// cluster ID and numeric range ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeMetadata {
    pub descriptor: RangeDescriptor,
    pub cluster_id: ClusterId,
    pub range_id: RangeId,
}
