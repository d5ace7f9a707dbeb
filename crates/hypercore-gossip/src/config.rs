//! Gossip bus configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for a [`crate::GossipBus`].
///
/// Defaults are conservative, chosen to keep the broadcast queue shallow
/// under load.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// This node's name on the bus (its identity UUID string).
    pub node_name: String,

    /// Address for both the UDP gossip socket and the TCP query listener.
    pub bind_addr: SocketAddr,

    /// Seed peers heartbeated at startup to join an existing cluster.
    pub seeds: Vec<SocketAddr>,

    /// Heartbeat cadence.
    pub gossip_interval: Duration,

    /// Failure-detection sweep cadence.
    pub probe_interval: Duration,

    /// A peer silent for `probe_interval * suspicion_multiplier` is failed.
    pub suspicion_multiplier: u32,

    /// Number of random peers heartbeated per gossip tick.
    pub fanout: usize,

    /// User-event payload cap in bytes. Never below 2 KiB.
    pub max_event_payload: usize,

    /// Inbound event queue capacity.
    pub inbound_buffer: usize,
}

impl GossipConfig {
    /// Floor for the user-event payload cap.
    pub const MIN_EVENT_PAYLOAD: usize = 2048;

    /// Creates a configuration with default tuning.
    pub fn new(node_name: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            node_name: node_name.into(),
            bind_addr,
            seeds: Vec::new(),
            gossip_interval: Duration::from_secs(2),
            probe_interval: Duration::from_secs(5),
            suspicion_multiplier: 6,
            fanout: 2,
            max_event_payload: 8192,
            inbound_buffer: 64,
        }
    }

    /// Adds seed peers.
    pub fn with_seeds(mut self, seeds: Vec<SocketAddr>) -> Self {
        self.seeds = seeds;
        self
    }

    /// How long a peer may stay silent before it is marked failed.
    pub fn suspicion_window(&self) -> Duration {
        self.probe_interval * self.suspicion_multiplier
    }

    /// The effective payload cap, clamped to the protocol floor.
    pub fn event_payload_cap(&self) -> usize {
        self.max_event_payload.max(Self::MIN_EVENT_PAYLOAD)
    }
}
