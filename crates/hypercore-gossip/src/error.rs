//! Gossip bus error types.

use thiserror::Error;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, GossipError>;

/// Errors that can occur on the gossip bus.
#[derive(Debug, Error)]
pub enum GossipError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet failed to encode or decode.
    #[error("packet codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// Frame-level protocol error on the query transport.
    #[error("wire error: {0}")]
    Wire(#[from] hypercore_wire::WireError),

    /// User-event payload exceeds the configured cap.
    #[error("user-event payload of {len} bytes exceeds cap {cap}")]
    PayloadTooLarge { len: usize, cap: usize },

    /// The bus has been shut down.
    #[error("bus shut down")]
    Shutdown,
}
