//! Domain error types
//!
//! Validation failures and invalid state transitions for domain values.
//! Errors at the port boundaries live in [`crate::ports::errors`]; this
//! module only covers values the domain itself constructs.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid member href format
    #[error("Invalid href: {0}")]
    InvalidHref(String),

    /// Invalid entity tag format
    #[error("Invalid ETag: {0}")]
    InvalidEtag(String),

    /// Invalid schedule tag format
    #[error("Invalid Schedule-Tag: {0}")]
    InvalidScheduleTag(String),

    /// Invalid account name
    #[error("Invalid account name: {0}")]
    InvalidAccountName(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A persisted sync state string could not be decoded
    #[error("Invalid sync state: {0}")]
    InvalidSyncState(String),

    /// Invalid state transition attempt on a local resource
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
