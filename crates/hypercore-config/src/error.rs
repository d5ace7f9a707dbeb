//! Configuration error types.

use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A field failed validation.
    #[error("invalid {field}: {message}")]
    Invalid { field: String, message: String },

    /// No user configuration directory available.
    #[error("no user configuration directory")]
    NoUserConfigDir,
}
