//! Service proxy error types.

use thiserror::Error;

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur in the service proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Binding a host-port listener failed.
    #[error("failed to bind host port {port}: {source}")]
    BindFailed {
        port: u16,
        source: std::io::Error,
    },

    /// IO error on an accepted connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No Host header, or a Host with no dot to split a service key from.
    #[error("malformed Host header")]
    MalformedHost,

    /// No registration for the requested (service key, port).
    #[error("unknown service {key:?} on port {port}")]
    UnknownService { key: String, port: u16 },

    /// Request head exceeded the parse budget.
    #[error("request head too large")]
    HeadTooLarge,

    /// Peer closed before a full request head arrived.
    #[error("connection closed mid-head")]
    ClosedEarly,

    /// TLS configuration failed to load.
    #[error("TLS error: {0}")]
    Tls(String),
}
