//! Local store port (driven/secondary port)
//!
//! Interface to the local persistent store, scoped to exactly one local
//! collection. The store owns resource content and the record schema; the
//! engine only sees [`LocalResource`] bookkeeping plus opaque content
//! bytes handed over on download.
//!
//! ## Design Notes
//!
//! - All methods must be safe to call from the synchronization worker task.
//! - Implementations group the writes between [`begin`](ILocalStore::begin)
//!   and [`commit`](ILocalStore::commit) into a single local transaction so
//!   one step's effects never become partially visible. The default
//!   implementations are no-ops for stores with per-call atomicity.
//! - Typed [`StoreError`]s let the engine classify failures into hard and
//!   soft outcome counters.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::newtypes::{Etag, ScheduleTag};
use crate::domain::resource::{LocalResource, ResourceFlags};
use crate::domain::sync_state::SyncState;

use super::errors::StoreError;

/// Port trait for the per-collection local store
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // --- queries ---

    /// All resources modified locally and not yet uploaded, excluding
    /// resources also flagged deleted
    async fn find_dirty(&self) -> Result<Vec<LocalResource>, StoreError>;

    /// All resources deleted locally and not yet propagated
    async fn find_deleted(&self) -> Result<Vec<LocalResource>, StoreError>;

    /// Look up a resource by its remote file name
    async fn find_by_name(&self, name: &str) -> Result<Option<LocalResource>, StoreError>;

    /// All resources that carry a remote file name (the locally known
    /// member set the diff step runs against)
    async fn find_named(&self) -> Result<Vec<LocalResource>, StoreError>;

    // --- per-resource writes ---

    /// Insert a resource record together with its content
    async fn add(&self, resource: &LocalResource, content: &[u8]) -> Result<(), StoreError>;

    /// Update a resource record, replacing content when `content` is `Some`
    async fn update(
        &self,
        resource: &LocalResource,
        content: Option<&[u8]>,
    ) -> Result<(), StoreError>;

    /// Remove a resource record and its content
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Record a confirmed upload: clear the dirty flag and store the
    /// server-assigned name and tags
    async fn clear_dirty(
        &self,
        id: Uuid,
        name: &str,
        etag: Option<&Etag>,
        schedule_tag: Option<&ScheduleTag>,
    ) -> Result<(), StoreError>;

    /// Drop the dirty flag without recording an upload (read-only revert)
    async fn reset_dirty(&self, id: Uuid) -> Result<(), StoreError>;

    /// Replace the local-only flag bitmask of one resource
    async fn update_flags(&self, id: Uuid, flags: ResourceFlags) -> Result<(), StoreError>;

    // --- listing-phase bookkeeping ---

    /// Clear the remotely-present flag on every resource, in one batch
    async fn mark_all_not_present(&self) -> Result<(), StoreError>;

    /// Delete every resource that is neither dirty nor flagged remotely
    /// present; returns how many were removed
    async fn purge_absent(&self) -> Result<u32, StoreError>;

    // --- collection state ---

    /// Persist the collection's sync state and last-synced stamp
    async fn save_sync_state(
        &self,
        state: &SyncState,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Store-side finalization after a pass (e.g. recomputing derived data)
    async fn post_process(&self) -> Result<(), StoreError>;

    // --- transaction bracket ---

    /// Open a batch so following writes commit atomically
    async fn begin(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Close the batch opened by [`begin`](ILocalStore::begin)
    async fn commit(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
