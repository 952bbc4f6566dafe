//! Contact group reconciliation strategies
//!
//! Address books represent group membership one of two ways, and the
//! difference cuts across the whole pass:
//!
//! - **Categories**: membership is a category list inside each contact's
//!   own payload. There is no remote group resource; groups exist only as
//!   local bookkeeping derived from those lists.
//! - **vCard groups**: groups are first-class remote members with their
//!   own payload listing member UIDs, fetched and uploaded like contacts.
//!
//! [`GroupReconciler`] is the closed set of both strategies. The engine
//! calls its fixed hook points (`before_upload_dirty`,
//! `verify_before_saving`, `after_saving`, `post_process`) and never
//! branches on which variant is active. Both variants are idempotent:
//! re-running a hook with no intervening change performs no new work.

use tracing::{debug, warn};

use davsync_core::domain::{GroupMethod, LocalResource};
use davsync_core::ports::{IContactStore, MemberKind, RemoteContent};

use crate::SyncError;

/// Group reconciliation strategy for one address book collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupReconciler {
    /// Membership encoded as category lists inside contact payloads
    Categories,
    /// Groups are separate remote members
    VCardGroups,
}

impl GroupReconciler {
    /// Select the strategy configured for a collection
    #[must_use]
    pub const fn for_method(method: GroupMethod) -> Self {
        match method {
            GroupMethod::Categories => GroupReconciler::Categories,
            GroupMethod::VCardGroups => GroupReconciler::VCardGroups,
        }
    }

    /// Hook: before any upload begins
    ///
    /// Categories: a deleted group re-dirties its members (their category
    /// lists must be re-serialized without it) and disappears; a dirty
    /// group re-dirties its members and becomes clean.
    ///
    /// vCard groups: a dirty contact whose membership set changed marks
    /// every differing group dirty so its member list is re-uploaded.
    pub async fn before_upload_dirty(
        &self,
        contacts: &dyn IContactStore,
    ) -> Result<(), SyncError> {
        match self {
            GroupReconciler::Categories => {
                for group in contacts.find_deleted_groups().await? {
                    debug!(group = %group.name, "Dissolving deleted category group");
                    contacts.mark_members_dirty(group.id).await?;
                    contacts.remove_group(group.id).await?;
                }
                for group in contacts.find_dirty_groups().await? {
                    debug!(group = %group.name, "Propagating dirty category group to members");
                    contacts.mark_members_dirty(group.id).await?;
                    contacts.clear_group_dirty(group.id).await?;
                }
            }
            GroupReconciler::VCardGroups => {
                for contact in contacts.find_dirty_contacts().await? {
                    let cached = contacts.cached_memberships(contact).await?;
                    let current = contacts.current_memberships(contact).await?;
                    for group in cached.symmetric_difference(&current) {
                        debug!(%contact, %group, "Membership changed, marking group dirty");
                        contacts.mark_group_dirty(*group).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Hook: on each downloaded payload, before it is saved
    ///
    /// Categories: this representation has no real remote groups, so a
    /// payload claiming to be one is coerced into a plain contact and a
    /// diagnostic is recorded.
    pub fn verify_before_saving(&self, content: &mut RemoteContent) {
        match self {
            GroupReconciler::Categories => {
                if content.kind == MemberKind::Group {
                    warn!(
                        href = %content.href,
                        "Received group vCard in a categories address book, treating as contact"
                    );
                    content.kind = MemberKind::Resource;
                }
            }
            GroupReconciler::VCardGroups => {}
        }
    }

    /// Hook: after each downloaded resource was saved
    ///
    /// vCard groups: a saved group queues membership assignments for
    /// contacts that are not materialized locally yet.
    pub async fn after_saving(
        &self,
        contacts: &dyn IContactStore,
        resource: &LocalResource,
        kind: MemberKind,
    ) -> Result<(), SyncError> {
        match self {
            GroupReconciler::Categories => {}
            GroupReconciler::VCardGroups => {
                if kind == MemberKind::Group {
                    contacts.note_group_saved(resource.id()).await?;
                }
            }
        }
        Ok(())
    }

    /// Hook: after all contacts are materialized locally
    ///
    /// Categories: purge groups that ended up with no members.
    /// vCard groups: resolve and apply queued membership assignments.
    pub async fn post_process(&self, contacts: &dyn IContactStore) -> Result<(), SyncError> {
        match self {
            GroupReconciler::Categories => {
                let purged = contacts.purge_empty_groups().await?;
                if purged > 0 {
                    debug!(purged, "Removed empty category groups");
                }
            }
            GroupReconciler::VCardGroups => {
                let applied = contacts.apply_pending_memberships().await?;
                if applied > 0 {
                    debug!(applied, "Applied pending group memberships");
                }
            }
        }
        Ok(())
    }
}
