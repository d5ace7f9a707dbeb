//! # hypercore-types: Core types for the hypercore cluster agent
//!
//! This crate contains shared types used across the hypercore system:
//! - Node identity ([`NodeIdentity`])
//! - Workload descriptors ([`VmSpawnRequest`])
//! - Peer telemetry ([`Telemetry`])
//! - The reserved label key ([`SPAWN_REQUEST_LABEL`]) under which the
//!   descriptor is persisted on every workload

use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label key under which the JSON-encoded spawn descriptor is attached to
/// every workload. The value must round-trip byte-identically through the
/// runtime so recovery after restart reproduces port mappings and policy
/// context.
pub const SPAWN_REQUEST_LABEL: &str = "hypercore.spawn-request";

/// Valid host/container port range is [1, 65535].
pub const MAX_PORT: u32 = 65_535;

// ============================================================================
// Node identity
// ============================================================================

/// Identity of a node in the cluster.
///
/// The id is a process-unique UUID generated at startup. `base_url` is the
/// advertised suffix used to synthesize virtual hostnames for workloads
/// running anywhere in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Process-unique identifier, generated fresh on every start.
    pub id: Uuid,

    /// The address this node binds its gossip and RPC transports to.
    pub bind_addr: SocketAddr,

    /// Base-URL suffix for virtual hostnames (`<workload-id>.<base_url>`).
    pub base_url: String,
}

impl NodeIdentity {
    /// Creates a new identity with a fresh random id.
    pub fn generate(bind_addr: SocketAddr, base_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bind_addr,
            base_url: base_url.into(),
        }
    }

    /// The node name used on the gossip bus.
    pub fn name(&self) -> String {
        self.id.to_string()
    }

    /// Synthesizes the virtual hostname for a workload id.
    pub fn virtual_host(&self, workload_id: &str) -> String {
        format!("{workload_id}.{}", self.base_url)
    }
}

impl Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.bind_addr)
    }
}

// ============================================================================
// Workload descriptor
// ============================================================================

/// A client-submitted workload descriptor.
///
/// Immutable after admission; the coordinator echoes it verbatim into the
/// workload's labels and it is never mutated afterwards. `dry_run` is set
/// only on the admission-probe phase of the spawn protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpawnRequest {
    /// Requested CPU cores.
    pub cores: u32,

    /// Requested memory in MiB.
    pub memory_mib: u32,

    /// Image reference to boot from.
    pub image_ref: String,

    /// Exposed ports: host-port → container-port.
    #[serde(default)]
    pub ports: BTreeMap<u32, u32>,

    /// Environment, ordered `KEY=VALUE` entries.
    #[serde(default)]
    pub env: Vec<String>,

    /// Probe-phase flag; a dry-run spawn performs no work.
    #[serde(default)]
    pub dry_run: bool,
}

impl VmSpawnRequest {
    /// Returns the first port (host or container side) outside [1, 65535],
    /// or `None` when all mappings are valid.
    pub fn invalid_port(&self) -> Option<u32> {
        self.ports
            .iter()
            .flat_map(|(host, container)| [*host, *container])
            .find(|p| *p == 0 || *p > MAX_PORT)
    }

    /// Serializes the descriptor to the JSON label value.
    pub fn to_label_value(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a descriptor back out of a label value.
    pub fn from_label_value(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }
}

// ============================================================================
// Telemetry
// ============================================================================

/// Runtime telemetry a node advertises with every state digest.
///
/// All metrics are advisory: peers use the latest beacon they have seen and
/// tolerate staleness (loss of a middle digest fragment still leaves the
/// previous beacon usable).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Mean RTT observed by peers probing this node, milliseconds.
    pub latency_ms: f64,

    /// Standard deviation of the RTT samples, milliseconds.
    pub jitter_ms: f64,

    /// Fraction of probes lost, [0, 1].
    pub packet_loss: f64,

    /// Depth of the node's outbound gossip queue.
    pub queue_depth: u64,

    /// Advertised price per GB for placement scoring.
    pub price_per_gb: f64,

    /// Reputation score, larger is better.
    pub reputation: f64,

    /// Capability tags (e.g. `cuda`, `avx512`).
    #[serde(default)]
    pub capabilities: Vec<String>,
}
