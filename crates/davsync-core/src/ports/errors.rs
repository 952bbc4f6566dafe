//! Port boundary error types
//!
//! Adapters translate their native failures into these two enums so that
//! the engine can classify every failure into hard and soft outcome
//! counters without sniffing error strings.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the local persistent store
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The store cannot be reached at all (provider gone, database locked
    /// out). Aborts the whole pass.
    #[error("Local store unavailable: {0}")]
    Unavailable(String),

    /// A storage operation failed (constraint violation, corrupt row)
    #[error("Local storage error: {0}")]
    Storage(String),

    /// The inter-process connection to the store died mid-call
    #[error("Store connection died: {0}")]
    DeadObject(String),

    /// Transient local I/O failure
    #[error("Local I/O error: {0}")]
    Io(String),
}

/// Failures surfaced by the remote protocol client
#[derive(Debug, Error, Clone)]
pub enum RemoteError {
    /// The server rejected our credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An unexpected or malformed HTTP response
    #[error("HTTP error {status}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Server-supplied reason or response excerpt
        message: String,
    },

    /// The server is temporarily overloaded or in maintenance
    #[error("Service unavailable (retry after {retry_after:?})")]
    ServiceUnavailable {
        /// Server-suggested wait before retrying, from Retry-After
        retry_after: Option<Duration>,
    },

    /// A conditional request failed: the remote copy changed under us
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The addressed member does not exist remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// The stored collection-sync token is no longer accepted
    #[error("Sync token invalid or expired")]
    InvalidSyncToken,

    /// Transient network I/O failure
    #[error("Network I/O error: {0}")]
    Io(String),
}
