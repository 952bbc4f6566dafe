//! Domain entities and value types
//!
//! Pure business objects with no I/O: validated newtypes, the local
//! resource/collection entities, and the persisted sync state.

pub mod collection;
pub mod errors;
pub mod newtypes;
pub mod resource;
pub mod sync_state;

pub use collection::{GroupMethod, LocalCollection, RemoteCollectionInfo, ServiceType};
pub use errors::DomainError;
pub use newtypes::{AccountName, CollectionId, Etag, Href, ScheduleTag};
pub use resource::{LocalResource, ResourceFlags, UploadAction};
pub use sync_state::SyncState;
