//! Agent error taxonomy.

use thiserror::Error;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by agent operations.
///
/// Admission denials carry the policy's reason verbatim; peer errors on
/// a commit move the coordinator to the next candidate; a fully silent
/// fan-out becomes [`AgentError::NoResponse`].
#[derive(Debug, Error)]
pub enum AgentError {
    /// Capacity or policy denial; the reason reaches the client as-is.
    #[error("{0}")]
    AdmissionRejected(String),

    /// An ERROR envelope from a peer.
    #[error("peer error: {0}")]
    Peer(String),

    /// Query deadline expired with zero responses.
    #[error("no response received from nodes")]
    NoResponse,

    /// Local runtime create/delete failed.
    #[error("runtime failure: {0}")]
    Runtime(#[from] hypercore_runtime::RuntimeError),

    /// The workload exists nowhere in cluster state.
    #[error("workload {0} not found")]
    WorkloadNotFound(String),

    /// Envelope encode/decode failure.
    #[error("wire error: {0}")]
    Wire(#[from] hypercore_wire::WireError),

    /// Bus failure.
    #[error("gossip error: {0}")]
    Gossip(#[from] hypercore_gossip::GossipError),

    /// Proxy registration failure.
    #[error("proxy error: {0}")]
    Proxy(#[from] hypercore_proxy::ProxyError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
