//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// Frame length exceeds the protocol maximum.
    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// A fragment key did not parse as `<uuid>_<kind>`.
    #[error("invalid fragment key: {0:?}")]
    InvalidFragmentKey(String),
}
