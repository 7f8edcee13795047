//! # olivine-range: Replica-level execution core of `Olivine`
//!
//! A [`Range`] is a contiguous keyspace partition whose writes are
//! serialized through a consensus log and applied to a local storage
//! engine. This crate is the command-execution pipeline around that log:
//!
//! - [`tscache`]: highest read timestamp per key span; conflicting writes
//!   are forwarded past it
//! - [`read_queue`]: pending reads/writes over key spans; reads wait for
//!   overlapping writes to drain
//! - [`response_cache`]: durable map from client command ID to reply,
//!   giving retries at-most-once semantics across leadership changes
//! - [`command`]: the closed, typed operation set and its error taxonomy
//! - [`range`]: the aggregate tying them together under one lock, plus the
//!   execution and gossip background loops
//! - [`config`] / [`gossip`]: administrative configuration tracked by key
//!   prefix and the dissemination seam it is published through
//!
//! Consensus itself, the storage format, and the gossip network are
//! external collaborators behind narrow contracts (`olivine_engine::Engine`,
//! [`gossip::Gossip`], the submission queue).

pub mod command;
pub mod config;
pub mod gossip;
pub mod range;
pub mod read_queue;
pub mod response_cache;
pub mod sync;
pub mod tscache;


pub use command::{CmdError, Method, Request, Response};
pub use range::{Range, RangeConfig, CLUSTER_ID_GOSSIP_TTL};
