//! davsync Engine - Collection synchronization
//!
//! Provides:
//! - One-pass reconciliation between a local collection and its remote
//!   counterpart ([`engine::SyncEngine`])
//! - Per-(account, service) collection set management
//!   ([`orchestrator::Syncer`])
//! - Contact group reconciliation strategies ([`groups::GroupReconciler`])
//! - Typed error aggregation for the external scheduler
//!   ([`outcome::SyncOutcome`])
//! - Concurrent-execution deduplication ([`dedup::SyncDedup`])
//!
//! ## Modules
//!
//! - [`engine`] - the reconciliation state machine
//! - [`orchestrator`] - per-account fan-out and lifecycle hooks
//! - [`groups`] - Categories / vCard-groups membership strategies
//! - [`outcome`] - hard/soft error counters and retry delay
//! - [`dedup`] - at-most-one execution per sync key

pub mod dedup;
pub mod engine;
pub mod groups;
pub mod orchestrator;
pub mod outcome;

use std::time::Duration;

use thiserror::Error;

use davsync_core::ports::{RemoteError, StoreError};

/// Errors that can occur during a synchronization pass
///
/// Every failure a pass can encounter is classified into one of these
/// variants; [`outcome::SyncOutcome::record`] maps each variant onto its
/// hard or soft counter. Nothing propagates past the pass boundary as an
/// uncaught error.
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// The server rejected our credentials (hard)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Unexpected or malformed HTTP status (hard)
    #[error("HTTP error {status}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Server-supplied reason or response excerpt
        message: String,
    },

    /// The local store cannot be reached at all (hard, aborts the pass)
    #[error("Local store unavailable: {0}")]
    ContentProvider(String),

    /// A local storage operation failed (hard)
    #[error("Local storage error: {0}")]
    LocalStorage(String),

    /// Anything we could not classify (hard)
    #[error("Unclassified sync error: {0}")]
    Unclassified(String),

    /// The inter-process connection to the store died mid-call (soft)
    #[error("Store connection died: {0}")]
    DeadObject(String),

    /// Transient local or network I/O failure (soft)
    #[error("I/O error: {0}")]
    Io(String),

    /// The server is temporarily unavailable (soft, delays the retry)
    #[error("Service unavailable (retry after {retry_after:?})")]
    ServiceUnavailable {
        /// Server-suggested wait before retrying
        retry_after: Option<Duration>,
    },

    /// A conditional upload failed: the remote copy changed under us
    /// (soft; the local change stays dirty for the next pass)
    #[error("Upload conflict: {0}")]
    PreconditionFailed(String),
}

impl SyncError {
    /// Whether this error counts as hard (surfaced to the scheduler as a
    /// failure requiring attention)
    #[must_use]
    pub const fn is_hard(&self) -> bool {
        matches!(
            self,
            SyncError::Authentication(_)
                | SyncError::Http { .. }
                | SyncError::ContentProvider(_)
                | SyncError::LocalStorage(_)
                | SyncError::Unclassified(_)
        )
    }

    /// Whether this error makes the whole collection unreachable, so the
    /// pass must stop instead of moving on to the next resource
    #[must_use]
    pub const fn aborts_pass(&self) -> bool {
        matches!(
            self,
            SyncError::Authentication(_) | SyncError::ContentProvider(_)
        )
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => SyncError::ContentProvider(msg),
            StoreError::Storage(msg) => SyncError::LocalStorage(msg),
            StoreError::DeadObject(msg) => SyncError::DeadObject(msg),
            StoreError::Io(msg) => SyncError::Io(msg),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Authentication(msg) => SyncError::Authentication(msg),
            RemoteError::Http { status, message } => SyncError::Http { status, message },
            RemoteError::ServiceUnavailable { retry_after } => {
                SyncError::ServiceUnavailable { retry_after }
            }
            RemoteError::PreconditionFailed(msg) => SyncError::PreconditionFailed(msg),
            RemoteError::NotFound(msg) => SyncError::Http {
                status: 404,
                message: msg,
            },
            // Call sites handle token expiry by falling back to a full
            // listing; reaching this conversion means nobody did.
            RemoteError::InvalidSyncToken => {
                SyncError::Unclassified("sync token rejected outside incremental listing".into())
            }
            RemoteError::Io(msg) => SyncError::Io(msg),
        }
    }
}
