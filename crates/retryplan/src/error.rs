//! Error types for retry policies
//!
//! All errors are raised synchronously at the call that caused them. None of
//! them is ever retried by this crate.

use thiserror::Error;

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors produced while building or driving a [`Policy`](crate::Policy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Construction parameters or configuration are malformed.
    ///
    /// No policy value is produced when this is returned.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// A policy value broke its own invariants while being advanced.
    ///
    /// Only reachable through a corrupted value, e.g. a deserialized state
    /// carrying a non-positive growth factor.
    #[error("Invalid policy state: {0}")]
    InvalidState(String),

    /// The requested operation cannot be applied to this policy.
    #[error("Unsupported policy: {0}")]
    UnsupportedPolicy(String),
}

impl PolicyError {
    pub(crate) fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns `true` if the error was raised at construction time.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, Self::InvalidPolicy(_))
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPolicy(format!("malformed configuration: {err}"))
    }
}
