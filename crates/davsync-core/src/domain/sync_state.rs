//! Persisted per-collection sync state
//!
//! The last-seen remote change-detection token, one of three kinds:
//! nothing yet, a collection tag (CTag), or a collection-sync token. The
//! kind decides which synchronization algorithm the next pass may use.
//!
//! The persisted form is a tagged JSON string; the embedded token value
//! round-trips byte-for-byte. The state is only written after a pass has
//! finished its remote-listing phase successfully.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Last-seen remote change-detection token for one local collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SyncState {
    /// No pass has completed yet
    #[default]
    None,
    /// Collection tag from the last full listing
    Ctag(String),
    /// Collection-sync token from the last incremental listing
    ///
    /// Only valid if the remote collection advertised support for
    /// incremental collection synchronization when the token was issued.
    SyncToken(String),
}

impl SyncState {
    /// Whether no token has been stored yet
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, SyncState::None)
    }

    /// The stored CTag value, if this state holds one
    #[must_use]
    pub fn as_ctag(&self) -> Option<&str> {
        match self {
            SyncState::Ctag(value) => Some(value),
            _ => None,
        }
    }

    /// The stored sync token value, if this state holds one
    #[must_use]
    pub fn as_sync_token(&self) -> Option<&str> {
        match self {
            SyncState::SyncToken(value) => Some(value),
            _ => None,
        }
    }

    /// Encode to the opaque string stored in the local collection record
    #[must_use]
    pub fn to_persisted(&self) -> String {
        // The variants are plain strings; serialization cannot fail.
        serde_json::to_string(self).expect("sync state serializes")
    }

    /// Decode from the persisted representation
    ///
    /// # Errors
    /// Returns an error if the string is not a valid tagged sync state
    pub fn from_persisted(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw)
            .map_err(|e| DomainError::InvalidSyncState(format!("{raw}: {e}")))
    }
}
