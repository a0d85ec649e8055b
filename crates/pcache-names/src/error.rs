//! Error types for name operations.

use thiserror::Error;

/// Errors that can occur while resolving or publishing a name.
#[derive(Debug, Error)]
pub enum NameError {
    /// The lookup itself failed. Distinct from a name that resolves to
    /// nothing yet, which is `Ok(None)`.
    #[error("failed to resolve {name}: {reason}")]
    ResolveFailed { name: String, reason: String },

    /// The pointer update was rejected.
    #[error("failed to publish {name}: {reason}")]
    PublishFailed { name: String, reason: String },

    /// The name is not well-formed.
    #[error("invalid name: {name}: {reason}")]
    InvalidName { name: String, reason: String },
}

/// Convenience type alias for name operations.
pub type Result<T> = std::result::Result<T, NameError>;
