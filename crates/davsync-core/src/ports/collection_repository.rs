//! Collection repository port (driven/secondary port)
//!
//! The service/collection repository knows which remote collections are
//! registered (and selected for synchronization) for an account, owns the
//! local collection records, and vends the per-collection store and wire
//! client handles the engine works through.
//!
//! ## Design Notes
//!
//! - Descriptors returned here are read-only to the engine.
//! - `open_*` methods hand out adapters already bound to one collection
//!   and already authenticated; credentials never cross this boundary.

use std::sync::Arc;

use crate::domain::collection::{LocalCollection, RemoteCollectionInfo, ServiceType};
use crate::domain::newtypes::{AccountName, CollectionId};

use super::contact_store::IContactStore;
use super::errors::StoreError;
use super::local_store::ILocalStore;
use super::remote_collection::IRemoteCollection;

/// Port trait for the account's collection registry
#[async_trait::async_trait]
pub trait ICollectionRepository: Send + Sync {
    /// Remote collections registered and selected for synchronization
    async fn registered_remote_collections(
        &self,
        account: &AccountName,
        service: ServiceType,
    ) -> Result<Vec<RemoteCollectionInfo>, StoreError>;

    /// Local collections that currently exist for the account and service
    async fn local_collections(
        &self,
        account: &AccountName,
        service: ServiceType,
    ) -> Result<Vec<LocalCollection>, StoreError>;

    /// Create the local collection for a newly selected remote collection
    async fn create_local_collection(
        &self,
        account: &AccountName,
        info: &RemoteCollectionInfo,
    ) -> Result<LocalCollection, StoreError>;

    /// Remove a local collection whose remote counterpart was deselected
    /// or deleted, together with all its resources
    async fn delete_local_collection(&self, id: CollectionId) -> Result<(), StoreError>;

    /// Open the local store scoped to one collection
    async fn open_store(
        &self,
        collection: &LocalCollection,
    ) -> Result<Arc<dyn ILocalStore>, StoreError>;

    /// Open the group extension of the local store (address books only)
    async fn open_contact_store(
        &self,
        collection: &LocalCollection,
    ) -> Result<Arc<dyn IContactStore>, StoreError>;

    /// Open the wire client resolved against one remote collection URL
    async fn open_remote(
        &self,
        info: &RemoteCollectionInfo,
    ) -> Result<Arc<dyn IRemoteCollection>, StoreError>;
}
