//! LocalResource domain entity
//!
//! One local record (event, contact, task, or file) paired with at most one
//! remote collection member. The entity carries the bookkeeping the engine
//! needs: the remote file name, the last-confirmed version tags, the
//! local-only flag bitmask, and the dirty/deleted markers.
//!
//! ## Lifecycle
//!
//! ```text
//!   user creates record          upload succeeds
//!   (dirty, no ETag) ──────────► clean, ETag set ──┐
//!        ▲                                         │ user edits: dirty
//!        │                                         │ user deletes: deleted
//!        └── download creates/overwrites ◄─────────┘
//!            (clean, ETag from server)
//! ```
//!
//! A record flagged deleted is propagated as a remote delete and then removed
//! from the store; a record confirmed absent remotely is removed without a
//! remote call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::newtypes::{Etag, ScheduleTag};

// ============================================================================
// ResourceFlags
// ============================================================================

/// Bitmask of local-only flags on a resource
///
/// These flags never leave the local store; the engine uses them for
/// bookkeeping within and across passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceFlags(u32);

impl ResourceFlags {
    /// The member was reported by the server during the most recent listing
    pub const REMOTELY_PRESENT: ResourceFlags = ResourceFlags(1);

    /// No flags set
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit value
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set in `self`
    #[must_use]
    pub const fn contains(self, other: ResourceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    #[must_use]
    pub const fn with(self, other: ResourceFlags) -> Self {
        Self(self.0 | other.0)
    }

    /// Clear the bits of `other`
    #[must_use]
    pub const fn without(self, other: ResourceFlags) -> Self {
        Self(self.0 & !other.0)
    }
}

// ============================================================================
// UploadAction
// ============================================================================

/// What the upload step must do for one resource
///
/// Encodes the invariant that a resource which is both dirty and deleted is
/// uploaded as a delete, never as an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAction {
    /// Remote DELETE with If-Match on the stored ETag
    Delete,
    /// Remote PUT with If-Match (resource existed remotely)
    Update(Etag),
    /// Remote PUT with If-None-Match (never uploaded)
    Create,
    /// Nothing to do (clean)
    None,
}

// ============================================================================
// LocalResource
// ============================================================================

/// One local record paired with at most one remote member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResource {
    /// Stable local identifier
    id: Uuid,
    /// Remote file name within the collection, `None` until first upload
    /// assigns one
    name: Option<String>,
    /// Last-confirmed entity tag, `None` if never uploaded
    etag: Option<Etag>,
    /// Last-confirmed schedule tag, if the server issues them
    schedule_tag: Option<ScheduleTag>,
    /// Local-only flag bitmask
    flags: ResourceFlags,
    /// Modified locally, not yet confirmed uploaded
    dirty: bool,
    /// Deleted locally, not yet propagated
    deleted: bool,
}

impl LocalResource {
    /// Create a record for a resource the user just created locally
    ///
    /// Starts dirty with no ETag, per the lifecycle contract.
    #[must_use]
    pub fn new_local() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            etag: None,
            schedule_tag: None,
            flags: ResourceFlags::empty(),
            dirty: true,
            deleted: false,
        }
    }

    /// Create a record for a member first seen on the server
    #[must_use]
    pub fn from_remote(name: String, etag: Option<Etag>, schedule_tag: Option<ScheduleTag>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: Some(name),
            etag,
            schedule_tag,
            flags: ResourceFlags::REMOTELY_PRESENT,
            dirty: false,
            deleted: false,
        }
    }

    // --- accessors ---

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub const fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }

    #[must_use]
    pub const fn schedule_tag(&self) -> Option<&ScheduleTag> {
        self.schedule_tag.as_ref()
    }

    #[must_use]
    pub const fn flags(&self) -> ResourceFlags {
        self.flags
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Whether the resource needs no upload work
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !self.dirty && !self.deleted
    }

    // --- transitions ---

    /// Assign the remote file name chosen for first upload
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Mark modified locally
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Mark deleted locally; the dirty flag is irrelevant from here on
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Record a confirmed upload: clears dirty and stores the new tags
    ///
    /// # Errors
    /// Returns an error if the resource is flagged deleted; a deleted
    /// resource is propagated as a delete and removed, never cleaned.
    pub fn mark_clean(
        &mut self,
        etag: Option<Etag>,
        schedule_tag: Option<ScheduleTag>,
    ) -> Result<(), DomainError> {
        if self.deleted {
            return Err(DomainError::InvalidState {
                from: "deleted".to_string(),
                to: "clean".to_string(),
            });
        }
        self.dirty = false;
        if etag.is_some() {
            self.etag = etag;
        }
        if schedule_tag.is_some() {
            self.schedule_tag = schedule_tag;
        }
        Ok(())
    }

    /// Overwrite tags after a download refreshed the local copy
    pub fn apply_download(&mut self, etag: Option<Etag>, schedule_tag: Option<ScheduleTag>) {
        self.etag = etag;
        self.schedule_tag = schedule_tag;
        self.dirty = false;
        self.flags = self.flags.with(ResourceFlags::REMOTELY_PRESENT);
    }

    /// Drop local modifications without an upload (read-only collections)
    pub fn reset_dirty(&mut self) {
        self.dirty = false;
    }

    /// Forget the remote pairing after the server deleted the member
    ///
    /// Keeps the record and its dirty flag; the next upload recreates the
    /// member instead of updating a version that no longer exists.
    pub fn detach_from_remote(&mut self) {
        self.etag = None;
        self.schedule_tag = None;
        self.flags = self.flags.without(ResourceFlags::REMOTELY_PRESENT);
    }

    /// Replace the flag bitmask
    pub fn set_flags(&mut self, flags: ResourceFlags) {
        self.flags = flags;
    }

    /// The upload step's obligation for this resource
    #[must_use]
    pub fn upload_action(&self) -> UploadAction {
        if self.deleted {
            return UploadAction::Delete;
        }
        if !self.dirty {
            return UploadAction::None;
        }
        match &self.etag {
            Some(etag) => UploadAction::Update(etag.clone()),
            None => UploadAction::Create,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
