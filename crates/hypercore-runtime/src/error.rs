//! Runtime port error types.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by a runtime backend.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Transient failure; the workload may exist on retry paths.
    #[error("transient runtime failure: {0}")]
    Transient(String),

    /// The image reference could not be resolved.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The runtime rejected the spec outright.
    #[error("rejected spec: {0}")]
    RejectedSpec(String),

    /// No such workload.
    #[error("workload {0} not found")]
    NotFound(String),

    /// IO error talking to the backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Io(_))
    }
}
