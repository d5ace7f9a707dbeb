//! # hypercore-gossip: The gossip bus
//!
//! Membership, best-effort user-event multicast, and query/response RPC
//! for a flat cluster:
//! - Membership and user events travel as UDP datagrams; heartbeats carry
//!   a bounded member-list sample for anti-entropy merge
//! - Queries are request/response with fan-out over TCP, one exchange per
//!   selected member, with a per-query deadline
//! - A bounded inbound queue delivers [`InboundEvent`]s to a single
//!   consumer; on overflow the oldest event is shed (the next state
//!   digest repairs any divergence)
//!
//! The bus carries opaque payloads; envelope semantics live in
//! `hypercore-wire` and the agent.

mod bus;
mod config;
mod error;
mod event;
mod member;
mod packet;
mod query;

pub use bus::GossipBus;
pub use config::GossipConfig;
pub use error::{GossipError, Result};
pub use event::{EventQueue, InboundEvent};
pub use member::{Member, MemberStatus};
pub use query::{NodeResponse, QueryHandle, QueryParams};
