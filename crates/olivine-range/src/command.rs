//! The range KV command set.
//!
//! Operations are a closed, tagged variant set: each method pairs a
//! strongly-typed request with a strongly-typed reply, and the dispatcher
//! is a single exhaustive match. Every request embeds a [`RequestHeader`]
//! (command ID, addressed keys, timestamp); every reply embeds a
//! [`ResponseHeader`] (embedded error, commit timestamp). Handlers attach
//! errors to the reply rather than aborting, and the range entry points
//! extract them uniformly.
//!
//! Replies are serde-serializable because the response cache persists them
//! verbatim in the storage engine.

use std::fmt::Display;

use bytes::Bytes;
use olivine_types::{ClientCmdId, Key, KeySpan, KeyValue, RangeDescriptor, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// Method
// ============================================================================

/// The operations supported by the range KV API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Existence check for a key.
    Contains,
    /// Value lookup for a key.
    Get,
    /// Unconditional overwrite of a key.
    Put,
    /// Overwrite gated on the current value matching an expectation.
    ConditionalPut,
    /// Add a delta to an integer-valued key.
    Increment,
    /// Ordered scan over a key span.
    Scan,
    /// Remove a key.
    Delete,
    /// Remove every key in a span.
    DeleteRange,
    /// Commit or abort an extant transaction.
    EndTransaction,
    /// Aggregate statistics over key spans.
    AccumulateTs,
    /// Destructively read messages from a delivery inbox.
    ReapQueue,
    /// Sideline an update for asynchronous execution.
    EnqueueUpdate,
    /// Enqueue a message for delivery to a recipient inbox.
    EnqueueMessage,
    /// Look up the range descriptor covering a metadata key.
    InternalRangeLookup,
}

impl Method {
    /// Every method, in dispatch order.
    pub const ALL: [Method; 14] = [
        Method::Contains,
        Method::Get,
        Method::Put,
        Method::ConditionalPut,
        Method::Increment,
        Method::Scan,
        Method::Delete,
        Method::DeleteRange,
        Method::EndTransaction,
        Method::AccumulateTs,
        Method::ReapQueue,
        Method::EnqueueUpdate,
        Method::EnqueueMessage,
        Method::InternalRangeLookup,
    ];

    /// Returns true if the method requires read permissions.
    pub fn needs_read_perm(self) -> bool {
        matches!(
            self,
            Method::Contains
                | Method::Get
                | Method::ConditionalPut
                | Method::Increment
                | Method::Scan
                | Method::ReapQueue
                | Method::InternalRangeLookup
        )
    }

    /// Returns true if the method requires write permissions.
    pub fn needs_write_perm(self) -> bool {
        matches!(
            self,
            Method::Put
                | Method::ConditionalPut
                | Method::Increment
                | Method::Delete
                | Method::DeleteRange
                | Method::EndTransaction
                | Method::AccumulateTs
                | Method::ReapQueue
                | Method::EnqueueUpdate
                | Method::EnqueueMessage
        )
    }

    /// Returns true if the method never mutates state.
    ///
    /// Read-only methods bypass consensus and the response cache; mutating
    /// methods are replicated and cached for idempotent retry.
    pub fn is_read_only(self) -> bool {
        !self.needs_write_perm()
    }

    /// The method's canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Method::Contains => "Contains",
            Method::Get => "Get",
            Method::Put => "Put",
            Method::ConditionalPut => "ConditionalPut",
            Method::Increment => "Increment",
            Method::Scan => "Scan",
            Method::Delete => "Delete",
            Method::DeleteRange => "DeleteRange",
            Method::EndTransaction => "EndTransaction",
            Method::AccumulateTs => "AccumulateTS",
            Method::ReapQueue => "ReapQueue",
            Method::EnqueueUpdate => "EnqueueUpdate",
            Method::EnqueueMessage => "EnqueueMessage",
            Method::InternalRangeLookup => "InternalRangeLookup",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// CmdError
// ============================================================================

/// Errors produced while executing a command.
///
/// Embedded in reply headers and persisted with them, so every variant is
/// serializable; a replayed command reproduces the original error exactly.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdError {
    /// This replica no longer leads the range; retry against the leader.
    #[error("replica is not the range leader")]
    NotLeader,

    /// The addressed key (or metadata entry) does not exist.
    #[error("key {0} not found")]
    NotFound(Key),

    /// A conditional put expected the key to be absent, but it exists.
    #[error("key {0} already exists")]
    AlreadyExists(Key),

    /// A conditional put's expectation did not match the current value,
    /// which is attached for caller inspection.
    #[error("unexpected value for key {key}")]
    ConditionFailed {
        key: Key,
        /// The value actually stored, if any.
        actual: Option<Bytes>,
    },

    /// The request reached an entry point that cannot dispatch it; always
    /// a bug in the caller.
    #[error("unrecognized command type: {0}")]
    UnrecognizedCommand(String),

    /// Opaque failure from the storage engine, propagated verbatim.
    #[error("engine error: {0}")]
    Engine(String),

    /// The addressed key is malformed for the operation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored value could not be interpreted as the operation requires.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The operation is a recognized but unimplemented placeholder.
    #[error("{0} is unimplemented")]
    Unimplemented(String),

    /// The range is shutting down, or the consensus wait expired.
    #[error("range is stopped or the command timed out awaiting consensus")]
    Stopped,
}

impl From<olivine_engine::EngineError> for CmdError {
    fn from(err: olivine_engine::EngineError) -> Self {
        CmdError::Engine(err.to_string())
    }
}

// ============================================================================
// Headers
// ============================================================================

/// Fields shared by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestHeader {
    /// Client-assigned ID deduplicating retries of mutating commands;
    /// empty on read-only requests.
    pub cmd_id: ClientCmdId,
    /// The key addressed by the command.
    pub key: Key,
    /// Exclusive end of the addressed span; empty for point commands.
    pub end_key: Key,
    /// Proposed timestamp; assigned from the node clock when unset, and
    /// forwarded past conflicting reads before submission.
    pub timestamp: Timestamp,
}

impl RequestHeader {
    /// Header for a point command addressing `key`.
    pub fn point(cmd_id: ClientCmdId, key: Key) -> Self {
        Self {
            cmd_id,
            key,
            ..Self::default()
        }
    }

    /// Header for a command spanning `[key, end_key)`.
    pub fn spanning(cmd_id: ClientCmdId, key: Key, end_key: Key) -> Self {
        Self {
            cmd_id,
            key,
            end_key,
            ..Self::default()
        }
    }

    /// The key span this request covers.
    pub fn span(&self) -> KeySpan {
        if self.end_key.is_empty() {
            KeySpan::point(self.key.clone())
        } else {
            KeySpan::new(self.key.clone(), self.end_key.clone())
        }
    }
}

/// Fields shared by every reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResponseHeader {
    /// Error produced by the handler, if any. Extracted uniformly by the
    /// range entry points.
    pub error: Option<CmdError>,
    /// The timestamp the command executed at (the request timestamp after
    /// any forwarding).
    pub timestamp: Timestamp,
}

impl ResponseHeader {
    /// Attaches `error` to the reply.
    pub fn set_error(&mut self, error: CmdError) {
        self.error = Some(error);
    }

    /// The reply's embedded outcome.
    pub fn result(&self) -> Result<(), CmdError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Request / reply pairs
// ============================================================================

/// Existence check for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContainsRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContainsResponse {
    pub header: ResponseHeader,
    pub exists: bool,
}

/// Value lookup; an absent key yields `value: None`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetResponse {
    pub header: ResponseHeader,
    pub value: Option<Bytes>,
}

/// Unconditional overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PutRequest {
    pub header: RequestHeader,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PutResponse {
    pub header: ResponseHeader,
}

/// Overwrite gated on the current value. `exp_value: None` requires the
/// key to be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConditionalPutRequest {
    pub header: RequestHeader,
    pub value: Bytes,
    pub exp_value: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConditionalPutResponse {
    pub header: ResponseHeader,
}

/// Adds `increment` to the integer value at the key; an absent key counts
/// as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IncrementRequest {
    pub header: RequestHeader,
    pub increment: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IncrementResponse {
    pub header: ResponseHeader,
    pub new_value: i64,
}

/// Removes a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeleteRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeleteRangeRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeleteResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeleteRangeResponse {
    pub header: ResponseHeader,
    pub num_deleted: u64,
}

/// Ordered scan over `[key, end_key)`, up to `max_results` rows (zero
/// means unbounded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScanRequest {
    pub header: RequestHeader,
    pub max_results: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScanResponse {
    pub header: ResponseHeader,
    pub rows: Vec<KeyValue>,
}

/// Commits or aborts an extant transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndTransactionRequest {
    pub header: RequestHeader,
    pub commit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndTransactionResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccumulateTsRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccumulateTsResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReapQueueRequest {
    pub header: RequestHeader,
    pub max_results: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReapQueueResponse {
    pub header: ResponseHeader,
    pub messages: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnqueueUpdateRequest {
    pub header: RequestHeader,
    pub update: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnqueueUpdateResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnqueueMessageRequest {
    pub header: RequestHeader,
    pub msg: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnqueueMessageResponse {
    pub header: ResponseHeader,
}

/// Looks up the range descriptor covering a metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InternalRangeLookupRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InternalRangeLookupResponse {
    pub header: ResponseHeader,
    /// The descriptor found, when the lookup succeeds.
    pub range: Option<RangeDescriptor>,
    /// The metadata key at which the descriptor was found.
    pub end_key: Key,
}

// ============================================================================
// Request / Response
// ============================================================================

/// A typed request, one variant per method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Contains(ContainsRequest),
    Get(GetRequest),
    Put(PutRequest),
    ConditionalPut(ConditionalPutRequest),
    Increment(IncrementRequest),
    Scan(ScanRequest),
    Delete(DeleteRequest),
    DeleteRange(DeleteRangeRequest),
    EndTransaction(EndTransactionRequest),
    AccumulateTs(AccumulateTsRequest),
    ReapQueue(ReapQueueRequest),
    EnqueueUpdate(EnqueueUpdateRequest),
    EnqueueMessage(EnqueueMessageRequest),
    InternalRangeLookup(InternalRangeLookupRequest),
}

impl Request {
    /// The method this request invokes.
    pub fn method(&self) -> Method {
        match self {
            Request::Contains(_) => Method::Contains,
            Request::Get(_) => Method::Get,
            Request::Put(_) => Method::Put,
            Request::ConditionalPut(_) => Method::ConditionalPut,
            Request::Increment(_) => Method::Increment,
            Request::Scan(_) => Method::Scan,
            Request::Delete(_) => Method::Delete,
            Request::DeleteRange(_) => Method::DeleteRange,
            Request::EndTransaction(_) => Method::EndTransaction,
            Request::AccumulateTs(_) => Method::AccumulateTs,
            Request::ReapQueue(_) => Method::ReapQueue,
            Request::EnqueueUpdate(_) => Method::EnqueueUpdate,
            Request::EnqueueMessage(_) => Method::EnqueueMessage,
            Request::InternalRangeLookup(_) => Method::InternalRangeLookup,
        }
    }

    /// The shared header.
    pub fn header(&self) -> &RequestHeader {
        match self {
            Request::Contains(r) => &r.header,
            Request::Get(r) => &r.header,
            Request::Put(r) => &r.header,
            Request::ConditionalPut(r) => &r.header,
            Request::Increment(r) => &r.header,
            Request::Scan(r) => &r.header,
            Request::Delete(r) => &r.header,
            Request::DeleteRange(r) => &r.header,
            Request::EndTransaction(r) => &r.header,
            Request::AccumulateTs(r) => &r.header,
            Request::ReapQueue(r) => &r.header,
            Request::EnqueueUpdate(r) => &r.header,
            Request::EnqueueMessage(r) => &r.header,
            Request::InternalRangeLookup(r) => &r.header,
        }
    }

    /// The shared header, mutably.
    pub fn header_mut(&mut self) -> &mut RequestHeader {
        match self {
            Request::Contains(r) => &mut r.header,
            Request::Get(r) => &mut r.header,
            Request::Put(r) => &mut r.header,
            Request::ConditionalPut(r) => &mut r.header,
            Request::Increment(r) => &mut r.header,
            Request::Scan(r) => &mut r.header,
            Request::Delete(r) => &mut r.header,
            Request::DeleteRange(r) => &mut r.header,
            Request::EndTransaction(r) => &mut r.header,
            Request::AccumulateTs(r) => &mut r.header,
            Request::ReapQueue(r) => &mut r.header,
            Request::EnqueueUpdate(r) => &mut r.header,
            Request::EnqueueMessage(r) => &mut r.header,
            Request::InternalRangeLookup(r) => &mut r.header,
        }
    }
}

/// A typed reply, one variant per method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Contains(ContainsResponse),
    Get(GetResponse),
    Put(PutResponse),
    ConditionalPut(ConditionalPutResponse),
    Increment(IncrementResponse),
    Scan(ScanResponse),
    Delete(DeleteResponse),
    DeleteRange(DeleteRangeResponse),
    EndTransaction(EndTransactionResponse),
    AccumulateTs(AccumulateTsResponse),
    ReapQueue(ReapQueueResponse),
    EnqueueUpdate(EnqueueUpdateResponse),
    EnqueueMessage(EnqueueMessageResponse),
    InternalRangeLookup(InternalRangeLookupResponse),
}

impl Response {
    /// The method this reply answers.
    pub fn method(&self) -> Method {
        match self {
            Response::Contains(_) => Method::Contains,
            Response::Get(_) => Method::Get,
            Response::Put(_) => Method::Put,
            Response::ConditionalPut(_) => Method::ConditionalPut,
            Response::Increment(_) => Method::Increment,
            Response::Scan(_) => Method::Scan,
            Response::Delete(_) => Method::Delete,
            Response::DeleteRange(_) => Method::DeleteRange,
            Response::EndTransaction(_) => Method::EndTransaction,
            Response::AccumulateTs(_) => Method::AccumulateTs,
            Response::ReapQueue(_) => Method::ReapQueue,
            Response::EnqueueUpdate(_) => Method::EnqueueUpdate,
            Response::EnqueueMessage(_) => Method::EnqueueMessage,
            Response::InternalRangeLookup(_) => Method::InternalRangeLookup,
        }
    }

    /// The shared header.
    pub fn header(&self) -> &ResponseHeader {
        match self {
            Response::Contains(r) => &r.header,
            Response::Get(r) => &r.header,
            Response::Put(r) => &r.header,
            Response::ConditionalPut(r) => &r.header,
            Response::Increment(r) => &r.header,
            Response::Scan(r) => &r.header,
            Response::Delete(r) => &r.header,
            Response::DeleteRange(r) => &r.header,
            Response::EndTransaction(r) => &r.header,
            Response::AccumulateTs(r) => &r.header,
            Response::ReapQueue(r) => &r.header,
            Response::EnqueueUpdate(r) => &r.header,
            Response::EnqueueMessage(r) => &r.header,
            Response::InternalRangeLookup(r) => &r.header,
        }
    }

    /// The shared header, mutably.
    pub fn header_mut(&mut self) -> &mut ResponseHeader {
        match self {
            Response::Contains(r) => &mut r.header,
            Response::Get(r) => &mut r.header,
            Response::Put(r) => &mut r.header,
            Response::ConditionalPut(r) => &mut r.header,
            Response::Increment(r) => &mut r.header,
            Response::Scan(r) => &mut r.header,
            Response::Delete(r) => &mut r.header,
            Response::DeleteRange(r) => &mut r.header,
            Response::EndTransaction(r) => &mut r.header,
            Response::AccumulateTs(r) => &mut r.header,
            Response::ReapQueue(r) => &mut r.header,
            Response::EnqueueUpdate(r) => &mut r.header,
            Response::EnqueueMessage(r) => &mut r.header,
            Response::InternalRangeLookup(r) => &mut r.header,
        }
    }

    /// Surfaces the embedded error, if any, as the call outcome.
    pub fn into_result(self) -> Result<Response, CmdError> {
        match &self.header().error {
            Some(err) => Err(err.clone()),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Method::Contains, true; "contains is read only")]
    #[test_case(Method::Get, true; "get is read only")]
    #[test_case(Method::Scan, true; "scan is read only")]
    #[test_case(Method::InternalRangeLookup, true; "range lookup is read only")]
    #[test_case(Method::Put, false; "put mutates")]
    #[test_case(Method::ConditionalPut, false; "conditional put mutates")]
    #[test_case(Method::Increment, false; "increment mutates")]
    #[test_case(Method::Delete, false; "delete mutates")]
    #[test_case(Method::ReapQueue, false; "reap queue mutates")]
    fn read_only_classification(method: Method, read_only: bool) {
        assert_eq!(method.is_read_only(), read_only);
    }

    #[test]
    fn every_method_needs_some_permission() {
        for method in Method::ALL {
            assert!(
                method.needs_read_perm() || method.needs_write_perm(),
                "{method} requires neither permission"
            );
        }
    }

    #[test]
    fn conditional_put_needs_both_permissions() {
        assert!(Method::ConditionalPut.needs_read_perm());
        assert!(Method::ConditionalPut.needs_write_perm());
    }

    #[test]
    fn request_header_span_normalizes_point_keys() {
        let point = RequestHeader::point(ClientCmdId::EMPTY, Key::from("k"));
        assert!(point.span().contains_key(&Key::from("k")));
        assert!(!point.span().contains_key(&Key::from("k\x01")));

        let spanning =
            RequestHeader::spanning(ClientCmdId::EMPTY, Key::from("a"), Key::from("c"));
        assert!(spanning.span().contains_key(&Key::from("b")));
        assert!(!spanning.span().contains_key(&Key::from("c")));
    }

    #[test]
    fn into_result_extracts_embedded_error() {
        let mut reply = GetResponse::default();
        reply.header.set_error(CmdError::NotLeader);
        let result = Response::Get(reply).into_result();
        assert_eq!(result.unwrap_err(), CmdError::NotLeader);

        let ok = Response::Get(GetResponse::default()).into_result();
        assert!(ok.is_ok());
    }

    #[test]
    fn request_and_response_methods_agree() {
        let req = Request::Put(PutRequest::default());
        let resp = Response::Put(PutResponse::default());
        assert_eq!(req.method(), resp.method());
        assert_eq!(req.method().name(), "Put");
    }

    #[test]
    fn responses_roundtrip_through_postcard() {
        let mut reply = IncrementResponse {
            header: ResponseHeader::default(),
            new_value: 42,
        };
        reply.header.timestamp = Timestamp::new(9, 1);
        reply.header.set_error(CmdError::ConditionFailed {
            key: Key::from("k"),
            actual: Some(Bytes::from_static(b"v")),
        });
        let encoded = postcard::to_allocvec(&Response::Increment(reply.clone())).unwrap();
        let decoded: Response = postcard::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, Response::Increment(reply));
    }
}
