//! Common error types for hostwatch components.

use std::fmt;

/// A specialized Result type for hostwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for hostwatch operations.
///
/// Administrative mutations surface `NotFound`, `Conflict`, `InvalidIndex`
/// and `InvalidArgument` synchronously. `Persistence` is returned after the in-memory mutation has
/// already been applied; callers must not assume a rollback happened.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid check index {index} for host {host} ({len} checks)")]
    InvalidIndex { host: String, index: usize, len: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML decode error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    /// Create a new not-found error.
    pub fn not_found(msg: impl fmt::Display) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new conflict error.
    pub fn conflict(msg: impl fmt::Display) -> Self {
        Error::Conflict(msg.to_string())
    }

    /// Create a new invalid-argument error.
    pub fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    /// Create a new persistence error.
    pub fn persistence(msg: impl fmt::Display) -> Self {
        Error::Persistence(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// True for the errors an admin caller can fix by changing its request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Conflict(_)
                | Error::InvalidIndex { .. }
                | Error::InvalidArgument(_)
        )
    }
}
