//! # hypercore-agent: The cluster agent
//!
//! Orchestrates the runtime port, gossip bus, service proxy, policy
//! engine, and state digests:
//! - An event loop consuming the bus's inbound channel (queries, state
//!   broadcasts, member events)
//! - A monitor task that reconciles with the runtime every period,
//!   recomputes the state digest, and broadcasts on change
//! - A liveness task that evicts peers silent past three broadcast
//!   periods and optionally re-dispatches their workloads
//! - A latency probe that feeds the advertised telemetry beacon
//! - The coordinator side of the two-phase spawn protocol and the
//!   broadcast stop protocol
//!
//! All counters and state maps are fields of the [`Agent`]; metric
//! registration happens once at construction.

mod admission;
mod agent;
mod config;
mod error;
mod event_loop;
mod latency;
mod metrics;
mod monitor;
mod peers;
mod spawn;

pub use agent::{Agent, WorkloadHome};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use metrics::Metrics;
pub use peers::PeerRecord;
