//! Contact store port (group extension of the local store)
//!
//! Address book collections additionally track contact groups and group
//! membership. The group reconciliation strategies drive these operations
//! at their fixed hook points; other resource types never touch this port.
//!
//! ## Design Notes
//!
//! - Membership sets are keyed by local resource id; the store owns the
//!   mapping to whatever its schema uses.
//! - "Cached" membership is the set as of the last completed pass;
//!   "current" is what the user-facing layer has written since.
//! - Pending memberships queue assignments to contacts that did not exist
//!   locally when their group was saved; they are resolved in one batch at
//!   post-processing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::StoreError;

/// A contact group record as the store sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGroup {
    /// Stable local identifier
    pub id: Uuid,
    /// Display name (for categories, the category text itself)
    pub name: String,
}

/// Port trait for group bookkeeping on one address book collection
#[async_trait::async_trait]
pub trait IContactStore: Send + Sync {
    /// Groups deleted locally and not yet reconciled
    async fn find_deleted_groups(&self) -> Result<Vec<LocalGroup>, StoreError>;

    /// Groups modified locally and not yet reconciled
    async fn find_dirty_groups(&self) -> Result<Vec<LocalGroup>, StoreError>;

    /// Contacts currently flagged dirty (ids only)
    async fn find_dirty_contacts(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Flag every member of a group dirty so its payload is re-serialized
    async fn mark_members_dirty(&self, group: Uuid) -> Result<(), StoreError>;

    /// Remove a group record entirely
    async fn remove_group(&self, group: Uuid) -> Result<(), StoreError>;

    /// Clear a group's dirty flag
    async fn clear_group_dirty(&self, group: Uuid) -> Result<(), StoreError>;

    /// Flag a group dirty so its membership list is re-uploaded
    async fn mark_group_dirty(&self, group: Uuid) -> Result<(), StoreError>;

    /// Delete groups with no remaining members; returns how many
    async fn purge_empty_groups(&self) -> Result<u32, StoreError>;

    /// Group ids a contact belonged to as of the last completed pass
    async fn cached_memberships(&self, contact: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    /// Group ids the contact belongs to right now
    async fn current_memberships(&self, contact: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    /// Note that a downloaded group resource was saved; memberships whose
    /// contacts are not materialized yet are queued as pending
    async fn note_group_saved(&self, group: Uuid) -> Result<(), StoreError>;

    /// Resolve and apply queued membership assignments; returns how many
    async fn apply_pending_memberships(&self) -> Result<u32, StoreError>;
}
