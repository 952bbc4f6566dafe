//! Sync outcome aggregation
//!
//! One [`SyncOutcome`] is created fresh per reconciliation pass. It counts
//! classified errors (hard vs. soft), carries the earliest time a retry
//! makes sense, and totals the work done. The external scheduler reads it
//! to decide whether to report failure, retry with backoff, or succeed.

use chrono::{DateTime, Utc};

use crate::SyncError;

/// Typed error counters and retry hint for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    // --- hard errors ---
    /// Local store was unreachable
    pub content_provider_errors: u32,
    /// Local storage operations failed
    pub local_storage_errors: u32,
    /// Authentication failures
    pub auth_errors: u32,
    /// Unexpected/malformed HTTP responses
    pub http_errors: u32,
    /// Anything that resisted classification
    pub unclassified_errors: u32,

    // --- soft errors ---
    /// Inter-process store connection died
    pub dead_object_errors: u32,
    /// Transient I/O failures
    pub io_errors: u32,
    /// Service-unavailable responses
    pub service_unavailable_errors: u32,
    /// Upload conflicts left dirty for the next pass
    pub precondition_failures: u32,

    /// No retry should be attempted before this time
    pub delay_until: Option<DateTime<Utc>>,

    // --- work totals ---
    /// Resources uploaded (created or updated remotely)
    pub resources_uploaded: u32,
    /// Resources downloaded (created or updated locally)
    pub resources_downloaded: u32,
    /// Resources whose deletion was propagated or applied
    pub resources_deleted: u32,
}

impl SyncOutcome {
    /// Fresh outcome with all counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one classified error
    pub fn record(&mut self, err: &SyncError) {
        match err {
            SyncError::ContentProvider(_) => self.content_provider_errors += 1,
            SyncError::LocalStorage(_) => self.local_storage_errors += 1,
            SyncError::Authentication(_) => self.auth_errors += 1,
            SyncError::Http { .. } => self.http_errors += 1,
            SyncError::Unclassified(_) => self.unclassified_errors += 1,
            SyncError::DeadObject(_) => self.dead_object_errors += 1,
            SyncError::Io(_) => self.io_errors += 1,
            SyncError::ServiceUnavailable { .. } => self.service_unavailable_errors += 1,
            SyncError::PreconditionFailed(_) => self.precondition_failures += 1,
        }
    }

    /// Push `delay_until` out to at least `until`
    pub fn raise_delay(&mut self, until: DateTime<Utc>) {
        self.delay_until = Some(match self.delay_until {
            Some(existing) => existing.max(until),
            None => until,
        });
    }

    /// Whether any hard error was recorded
    #[must_use]
    pub const fn has_hard_error(&self) -> bool {
        self.content_provider_errors
            + self.local_storage_errors
            + self.auth_errors
            + self.http_errors
            + self.unclassified_errors
            > 0
    }

    /// Whether any soft error was recorded
    #[must_use]
    pub const fn has_soft_error(&self) -> bool {
        self.dead_object_errors
            + self.io_errors
            + self.service_unavailable_errors
            + self.precondition_failures
            > 0
    }

    /// Fold another outcome into this one (counter sums, max delay)
    pub fn merge(&mut self, other: SyncOutcome) {
        self.content_provider_errors += other.content_provider_errors;
        self.local_storage_errors += other.local_storage_errors;
        self.auth_errors += other.auth_errors;
        self.http_errors += other.http_errors;
        self.unclassified_errors += other.unclassified_errors;
        self.dead_object_errors += other.dead_object_errors;
        self.io_errors += other.io_errors;
        self.service_unavailable_errors += other.service_unavailable_errors;
        self.precondition_failures += other.precondition_failures;
        self.resources_uploaded += other.resources_uploaded;
        self.resources_downloaded += other.resources_downloaded;
        self.resources_deleted += other.resources_deleted;
        if let Some(until) = other.delay_until {
            self.raise_delay(until);
        }
    }
}
