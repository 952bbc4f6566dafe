//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers and version tags that flow
//! between the engine and its collaborators. Each newtype ensures validity
//! at construction time and round-trips through serde unchanged.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Identifier types
// ============================================================================

/// Identifier of a configured collection (local record and remote pairing
/// share the same id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// Create a new random CollectionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a CollectionId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CollectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid CollectionId: {e}")))
    }
}

impl From<Uuid> for CollectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Name of a configured account, as handed to us by the credential layer
///
/// Opaque to the engine; only used for scoping, logging, and dedup keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    /// Create a new AccountName
    ///
    /// # Errors
    /// Returns an error if the name is empty or contains control characters
    pub fn new(name: String) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::InvalidAccountName(
                "Account name cannot be empty".to_string(),
            ));
        }
        if name.chars().any(char::is_control) {
            return Err(DomainError::InvalidAccountName(format!(
                "Account name contains control characters: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AccountName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}

// ============================================================================
// WebDAV member addressing
// ============================================================================

/// A member path inside a collection, e.g. "/calendars/work/1234.ics"
///
/// Hrefs are URL paths as reported by the server. They must be absolute
/// (start with `/`) and free of traversal sequences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Href(String);

impl Href {
    /// Create a new Href
    ///
    /// # Errors
    /// Returns an error if the path does not start with `/`, contains
    /// traversal sequences, or contains whitespace
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidHref(format!(
                "Href must start with '/': {path}"
            )));
        }
        if path.contains("..") {
            return Err(DomainError::InvalidHref(format!(
                "Href contains invalid traversal: {path}"
            )));
        }
        if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::InvalidHref(format!(
                "Href contains whitespace or control characters: {path}"
            )));
        }
        Ok(Self(path))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the last path segment, the member's file name
    ///
    /// Returns `None` for the collection itself ("/" or a trailing slash).
    #[must_use]
    pub fn member_name(&self) -> Option<&str> {
        match self.0.rsplit('/').next() {
            Some("") | None => None,
            Some(name) => Some(name),
        }
    }
}

impl Display for Href {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Href {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Href {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Href> for String {
    fn from(href: Href) -> Self {
        href.0
    }
}

// ============================================================================
// Version tags
// ============================================================================

/// Server-assigned entity tag for one resource
///
/// Opaque except for normalization: surrounding quotes and a weak-validator
/// prefix (`W/`) are stripped so that tags compare by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Etag(String);

impl Etag {
    /// Create a new Etag, normalizing weak prefixes and quoting
    ///
    /// # Errors
    /// Returns an error if the tag is empty after normalization
    pub fn new(raw: String) -> Result<Self, DomainError> {
        let tag = raw.strip_prefix("W/").unwrap_or(&raw);
        let tag = tag
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(tag);
        if tag.is_empty() {
            return Err(DomainError::InvalidEtag(
                "ETag cannot be empty".to_string(),
            ));
        }
        Ok(Self(tag.to_string()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the tag as a quoted HTTP header value
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Etag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Etag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Etag> for String {
    fn from(etag: Etag) -> Self {
        etag.0
    }
}

/// Server-assigned schedule tag for scheduling-aware calendar resources
///
/// Opaque; present only on servers that implement scheduling extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleTag(String);

impl ScheduleTag {
    /// Create a new ScheduleTag
    ///
    /// # Errors
    /// Returns an error if the tag is empty
    pub fn new(tag: String) -> Result<Self, DomainError> {
        if tag.is_empty() {
            return Err(DomainError::InvalidScheduleTag(
                "Schedule-Tag cannot be empty".to_string(),
            ));
        }
        Ok(Self(tag))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ScheduleTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScheduleTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ScheduleTag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ScheduleTag> for String {
    fn from(tag: ScheduleTag) -> Self {
        tag.0
    }
}

// ============================================================================
// Tests
// ============================================================================
