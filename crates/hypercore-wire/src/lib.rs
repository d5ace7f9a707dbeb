//! # hypercore-wire: Wire protocol for hypercore cluster RPC
//!
//! This crate defines everything that crosses the wire between nodes:
//! - The [`ClusterMessage`] envelope shared by all RPC payloads
//! - Request/response payload structs ([`VmSpawnResponse`],
//!   [`VmStopRequest`], [`NodeStateResponse`], [`ErrorResponse`])
//! - Digest fragment keys ([`FragmentKey`], [`FragmentKind`])
//! - The length-prefixed [`Frame`] codec used by the query transport
//!
//! Payloads are `postcard`-encoded; the envelope is a tagged enum whose
//! variant is the event kind. Queries travel in [`Frame`]s over TCP;
//! gossip datagrams carry bare postcard packets.

mod error;
mod fragment;
mod frame;
mod message;

pub use error::{Result, WireError};
pub use fragment::{FragmentKey, FragmentKind};
pub use frame::{FRAME_HEADER_SIZE, Frame, MAX_FRAME_SIZE};
pub use message::{
    ClusterMessage, ErrorResponse, EventKind, NodeRef, NodeStateResponse, VmSpawnResponse,
    VmStopRequest, WorkloadState,
};

/// Gossip user-event name for state digest broadcasts.
pub const STATE_BROADCAST_EVENT: &str = "hypercore_state_broadcast";

/// Query name for all cluster RPC (spawn, stop, node-state).
pub const CLUSTER_QUERY: &str = "hypercore_query";
