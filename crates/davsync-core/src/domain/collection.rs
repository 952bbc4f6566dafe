//! Collection entities
//!
//! [`RemoteCollectionInfo`] is the read-only descriptor of a collection as
//! registered in local configuration (URL, privileges, advertised
//! capabilities). [`LocalCollection`] is its local analogue: the record the
//! engine syncs into, carrying the persisted [`SyncState`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::CollectionId;
use super::sync_state::SyncState;

// ============================================================================
// ServiceType
// ============================================================================

/// The DAV service flavor a collection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Calendar collections (events and tasks)
    CalDav,
    /// Address book collections (contacts and contact groups)
    CardDav,
    /// Plain file collections
    WebDav,
}

impl ServiceType {
    /// File extension assigned to freshly created members, if the service
    /// has a conventional one
    #[must_use]
    pub const fn member_extension(self) -> Option<&'static str> {
        match self {
            ServiceType::CalDav => Some("ics"),
            ServiceType::CardDav => Some("vcf"),
            ServiceType::WebDav => None,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceType::CalDav => write!(f, "caldav"),
            ServiceType::CardDav => write!(f, "carddav"),
            ServiceType::WebDav => write!(f, "webdav"),
        }
    }
}

// ============================================================================
// GroupMethod
// ============================================================================

/// How contact group membership is represented for an address book
///
/// Selected once per collection in configuration; never both. Collections of
/// other service types carry no group method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMethod {
    /// Membership is a category list inside each contact's own payload;
    /// there is no separate remote group resource
    Categories,
    /// Groups are first-class remote members, fetched like contacts
    VCardGroups,
}

// ============================================================================
// RemoteCollectionInfo
// ============================================================================

/// Descriptor of a remote collection as registered in local configuration
///
/// Read-only to the engine; owned by the collection repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCollectionInfo {
    /// Shared identifier of the configured collection record
    pub id: CollectionId,
    /// Resolved collection URL
    pub url: String,
    /// Human-readable name, if the server or user supplied one
    pub display_name: Option<String>,
    /// Which service the collection belongs to
    pub service: ServiceType,
    /// The server granted no write privilege, or the user forced read-only
    pub read_only: bool,
    /// The server advertises incremental collection synchronization
    pub supports_collection_sync: bool,
    /// Group representation for address books; `None` elsewhere
    pub group_method: Option<GroupMethod>,
}

// ============================================================================
// LocalCollection
// ============================================================================

/// The local analogue of one remote collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCollection {
    /// Links to the configured remote collection record
    id: CollectionId,
    /// Local changes are reverted instead of uploaded
    read_only: bool,
    /// Last-seen remote change-detection token
    sync_state: SyncState,
    /// When the last pass persisted its sync state
    last_synced: Option<DateTime<Utc>>,
}

impl LocalCollection {
    /// Create the local record for a newly selected remote collection
    #[must_use]
    pub fn new(id: CollectionId, read_only: bool) -> Self {
        Self {
            id,
            read_only,
            sync_state: SyncState::None,
            last_synced: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> CollectionId {
        self.id
    }

    #[must_use]
    pub const fn read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub const fn sync_state(&self) -> &SyncState {
        &self.sync_state
    }

    #[must_use]
    pub const fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// Record the token obtained by a completed remote-listing phase
    pub fn update_sync_state(&mut self, state: SyncState, at: DateTime<Utc>) {
        self.sync_state = state;
        self.last_synced = Some(at);
    }

    /// Track a privilege change on the paired remote collection
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}
