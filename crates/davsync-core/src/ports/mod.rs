//! Port definitions (hexagonal architecture interfaces)
//!
//! The engine depends on these traits; their implementations live outside
//! this repository (local store, wire protocol client, collection
//! registry). The account/credential provider has no port of its own:
//! adapters arrive already authenticated.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - per-collection resource persistence
//! - [`IContactStore`] - group bookkeeping for address books
//! - [`IRemoteCollection`] - wire client bound to one collection URL
//! - [`ICollectionRepository`] - collection registry and adapter factory

pub mod collection_repository;
pub mod contact_store;
pub mod errors;
pub mod local_store;
pub mod remote_collection;

pub use collection_repository::ICollectionRepository;
pub use contact_store::{IContactStore, LocalGroup};
pub use errors::{RemoteError, StoreError};
pub use local_store::ILocalStore;
pub use remote_collection::{
    Deposited, IRemoteCollection, MemberCallback, MemberKind, Precondition, Relation,
    RemoteContent, RemoteMember, UploadBody,
};
