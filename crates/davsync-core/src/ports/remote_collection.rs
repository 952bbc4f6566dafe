//! Remote collection port (driven/secondary port)
//!
//! Interface to the wire-level protocol client, resolved against exactly
//! one remote collection URL. The client owns HTTP, XML, and payload
//! serialization; the engine only sees member descriptors, opaque bodies,
//! and typed [`RemoteError`]s.
//!
//! ## Design Notes
//!
//! - Listing delivers one member per callback invocation instead of a
//!   materialized list, so memory stays bounded on large collections and
//!   the engine can cancel between items.
//! - Downloads are requested in bounded bunches (multi-get), never one
//!   request per member and never the whole collection at once.
//! - The sequence produced by a listing is finite and non-restartable; a
//!   new listing starts a new request.

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{Etag, Href, ScheduleTag};
use crate::domain::resource::LocalResource;
use crate::domain::sync_state::SyncState;

use super::errors::RemoteError;

// ============================================================================
// Listing DTOs
// ============================================================================

/// How a listed response element relates to the queried collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The collection itself (carries collection-level properties)
    Collection,
    /// An ordinary member of the collection
    Member,
}

/// What kind of payload a member holds, as far as the server declares it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    /// A plain resource (event, task, contact, file)
    Resource,
    /// A contact group payload (KIND:group / X-ADDRESSBOOKSERVER-KIND)
    Group,
}

/// One server-reported member, as delivered during a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMember {
    /// Member path
    pub href: Href,
    /// Current entity tag, if reported
    pub etag: Option<Etag>,
    /// Declared payload kind
    pub kind: MemberKind,
    /// The member was removed since the given sync token (incremental
    /// listings only; always `false` in full listings)
    pub deleted: bool,
}

/// Callback invoked once per listed member
pub type MemberCallback<'a> =
    &'a mut (dyn FnMut(RemoteMember, Relation) -> anyhow::Result<()> + Send);

// ============================================================================
// Upload / download DTOs
// ============================================================================

/// A serialized request body ready for upload
#[derive(Debug, Clone)]
pub struct UploadBody {
    /// MIME type of the payload
    pub content_type: String,
    /// Serialized payload bytes
    pub data: Vec<u8>,
}

/// Conditional header for an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `If-Match`: only overwrite the version we last saw
    IfMatch(Etag),
    /// `If-None-Match: *`: only create, never overwrite
    IfNoneMatch,
}

/// Server response to a successful upload
#[derive(Debug, Clone, Default)]
pub struct Deposited {
    /// New entity tag; servers may omit it, in which case the next listing
    /// supplies the authoritative value
    pub etag: Option<Etag>,
    /// New schedule tag, if the server issues them
    pub schedule_tag: Option<ScheduleTag>,
}

/// One downloaded member body
#[derive(Debug, Clone)]
pub struct RemoteContent {
    /// Member path
    pub href: Href,
    /// Entity tag the body corresponds to
    pub etag: Option<Etag>,
    /// Schedule tag, if issued
    pub schedule_tag: Option<ScheduleTag>,
    /// Declared payload kind
    pub kind: MemberKind,
    /// Raw payload bytes
    pub data: Vec<u8>,
}

// ============================================================================
// Port trait
// ============================================================================

/// Port trait for the wire client bound to one remote collection
#[async_trait::async_trait]
pub trait IRemoteCollection: Send + Sync {
    /// Query the collection's current change-detection token and confirm
    /// the selected sync algorithm is still supported
    ///
    /// Returns `None` when the server reports no token at all.
    async fn query_capabilities(&self) -> Result<Option<SyncState>, RemoteError>;

    /// Enumerate every member (full-listing mode)
    async fn list_all(&self, callback: MemberCallback<'_>) -> Result<(), RemoteError>;

    /// Enumerate members changed since `token` (incremental mode); returns
    /// the next sync state to persist
    async fn list_changes(
        &self,
        token: &str,
        callback: MemberCallback<'_>,
    ) -> Result<SyncState, RemoteError>;

    /// Serialize a local resource into an upload body
    async fn generate_upload(&self, resource: &LocalResource) -> Result<UploadBody, RemoteError>;

    /// Create or update one member under `name`, guarded by `precondition`
    async fn upload(
        &self,
        name: &str,
        body: UploadBody,
        precondition: Precondition,
    ) -> Result<Deposited, RemoteError>;

    /// Delete one member, guarded by `If-Match` when an ETag is given
    async fn delete(&self, name: &str, etag: Option<&Etag>) -> Result<(), RemoteError>;

    /// Fetch the bodies of up to one bunch of members
    async fn download(&self, hrefs: &[Href]) -> Result<Vec<RemoteContent>, RemoteError>;
}
