//! Shared test fixtures: in-memory implementations of the engine's ports
//!
//! The fakes model just enough of a real store and a real DAV server to
//! drive full reconciliation passes: scripted capability responses,
//! member listings, bodies for multi-get downloads, and per-member error
//! injection for uploads and deletes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use davsync_core::config::EngineConfig;
use davsync_core::domain::{
    AccountName, CollectionId, Etag, Href, LocalCollection, LocalResource, RemoteCollectionInfo,
    ResourceFlags, ScheduleTag, ServiceType, SyncState,
};
use davsync_core::ports::{
    Deposited, ICollectionRepository, IContactStore, ILocalStore, IRemoteCollection,
    MemberCallback, MemberKind, Precondition, RemoteContent, RemoteError, RemoteMember,
    StoreError, UploadBody,
};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn account() -> AccountName {
    "test@example.com".parse().unwrap()
}

pub fn etag(value: &str) -> Etag {
    Etag::new(value.to_string()).unwrap()
}

pub fn href(collection: &str, name: &str) -> Href {
    Href::new(format!("/{collection}/{name}")).unwrap()
}

pub fn member(name: &str, etag_value: &str) -> RemoteMember {
    RemoteMember {
        href: href("col", name),
        etag: Some(etag(etag_value)),
        kind: MemberKind::Resource,
        deleted: false,
    }
}

pub fn deleted_member(name: &str) -> RemoteMember {
    RemoteMember {
        href: href("col", name),
        etag: None,
        kind: MemberKind::Resource,
        deleted: true,
    }
}

pub fn caldav_info(id: CollectionId) -> RemoteCollectionInfo {
    RemoteCollectionInfo {
        id,
        url: "https://dav.example.com/calendars/work/".to_string(),
        display_name: Some("Work".to_string()),
        service: ServiceType::CalDav,
        read_only: false,
        supports_collection_sync: false,
        group_method: None,
    }
}

// ============================================================================
// InMemoryStore
// ============================================================================

/// Local store backed by a HashMap, one instance per collection
#[derive(Default)]
pub struct InMemoryStore {
    pub resources: Mutex<HashMap<Uuid, (LocalResource, Vec<u8>)>>,
    pub saved_state: Mutex<Option<(SyncState, DateTime<Utc>)>>,
    pub state_saves: AtomicU32,
    pub post_process_calls: AtomicU32,
}

impl InMemoryStore {
    pub fn insert(&self, resource: LocalResource, body: &[u8]) {
        self.resources
            .lock()
            .unwrap()
            .insert(resource.id(), (resource, body.to_vec()));
    }

    pub fn get(&self, id: Uuid) -> Option<(LocalResource, Vec<u8>)> {
        self.resources.lock().unwrap().get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<(LocalResource, Vec<u8>)> {
        self.resources
            .lock()
            .unwrap()
            .values()
            .find(|(resource, _)| resource.name() == Some(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.resources.lock().unwrap().len()
    }

    pub fn saved_state(&self) -> Option<SyncState> {
        self.saved_state
            .lock()
            .unwrap()
            .as_ref()
            .map(|(state, _)| state.clone())
    }
}

#[async_trait::async_trait]
impl ILocalStore for InMemoryStore {
    async fn find_dirty(&self) -> Result<Vec<LocalResource>, StoreError> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .values()
            .filter(|(r, _)| r.is_dirty() && !r.is_deleted())
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn find_deleted(&self) -> Result<Vec<LocalResource>, StoreError> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .values()
            .filter(|(r, _)| r.is_deleted())
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<LocalResource>, StoreError> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .values()
            .find(|(r, _)| r.name() == Some(name))
            .map(|(r, _)| r.clone()))
    }

    async fn find_named(&self) -> Result<Vec<LocalResource>, StoreError> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .values()
            .filter(|(r, _)| r.name().is_some())
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn add(&self, resource: &LocalResource, content: &[u8]) -> Result<(), StoreError> {
        self.insert(resource.clone(), content);
        Ok(())
    }

    async fn update(
        &self,
        resource: &LocalResource,
        content: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        let mut resources = self.resources.lock().unwrap();
        let entry = resources
            .get_mut(&resource.id())
            .ok_or_else(|| StoreError::Storage(format!("unknown resource {}", resource.id())))?;
        entry.0 = resource.clone();
        if let Some(content) = content {
            entry.1 = content.to_vec();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.resources.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn clear_dirty(
        &self,
        id: Uuid,
        name: &str,
        etag: Option<&Etag>,
        schedule_tag: Option<&ScheduleTag>,
    ) -> Result<(), StoreError> {
        let mut resources = self.resources.lock().unwrap();
        let entry = resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::Storage(format!("unknown resource {id}")))?;
        entry.0.set_name(name.to_string());
        entry
            .0
            .mark_clean(etag.cloned(), schedule_tag.cloned())
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn reset_dirty(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(entry) = self.resources.lock().unwrap().get_mut(&id) {
            entry.0.reset_dirty();
        }
        Ok(())
    }

    async fn update_flags(&self, id: Uuid, flags: ResourceFlags) -> Result<(), StoreError> {
        if let Some(entry) = self.resources.lock().unwrap().get_mut(&id) {
            entry.0.set_flags(flags);
        }
        Ok(())
    }

    async fn mark_all_not_present(&self) -> Result<(), StoreError> {
        for entry in self.resources.lock().unwrap().values_mut() {
            let flags = entry.0.flags().without(ResourceFlags::REMOTELY_PRESENT);
            entry.0.set_flags(flags);
        }
        Ok(())
    }

    async fn purge_absent(&self) -> Result<u32, StoreError> {
        let mut resources = self.resources.lock().unwrap();
        let before = resources.len();
        resources.retain(|_, (r, _)| {
            r.is_dirty()
                || r.is_deleted()
                || r.flags().contains(ResourceFlags::REMOTELY_PRESENT)
        });
        Ok((before - resources.len()) as u32)
    }

    async fn save_sync_state(
        &self,
        state: &SyncState,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        *self.saved_state.lock().unwrap() = Some((state.clone(), at));
        self.state_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_process(&self) -> Result<(), StoreError> {
        self.post_process_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// FakeRemote
// ============================================================================

/// Scripted changes for one incremental listing
pub struct ChangeLog {
    pub expected_token: String,
    pub members: Vec<RemoteMember>,
    pub next: SyncState,
}

/// Scripted remote collection
#[derive(Default)]
pub struct FakeRemote {
    pub capabilities: Mutex<Option<SyncState>>,
    pub members: Mutex<Vec<RemoteMember>>,
    pub contents: Mutex<HashMap<String, RemoteContent>>,
    pub changes: Mutex<Option<ChangeLog>>,
    pub uploads: Mutex<Vec<(String, Vec<u8>, Precondition)>>,
    pub upload_errors: Mutex<HashMap<String, RemoteError>>,
    pub deletes: Mutex<Vec<(String, Option<Etag>)>>,
    pub delete_errors: Mutex<HashMap<String, RemoteError>>,
    pub capability_delay: Mutex<Option<Duration>>,
    pub capability_calls: AtomicU32,
    pub list_all_calls: AtomicU32,
    pub download_calls: AtomicU32,
    etag_counter: AtomicU32,
}

impl FakeRemote {
    pub fn with_capabilities(state: SyncState) -> Self {
        let remote = Self::default();
        *remote.capabilities.lock().unwrap() = Some(state);
        remote
    }

    pub fn add_member(&self, member: RemoteMember, body: &[u8]) {
        let name = member.href.member_name().unwrap().to_string();
        let content = RemoteContent {
            href: member.href.clone(),
            etag: member.etag.clone(),
            schedule_tag: None,
            kind: member.kind,
            data: body.to_vec(),
        };
        self.members.lock().unwrap().push(member);
        self.contents.lock().unwrap().insert(name, content);
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deletes
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl IRemoteCollection for FakeRemote {
    async fn query_capabilities(&self) -> Result<Option<SyncState>, RemoteError> {
        self.capability_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.capability_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.capabilities.lock().unwrap().clone())
    }

    async fn list_all(&self, callback: MemberCallback<'_>) -> Result<(), RemoteError> {
        self.list_all_calls.fetch_add(1, Ordering::SeqCst);
        // The collection reports itself first, like a depth-1 PROPFIND.
        callback(
            RemoteMember {
                href: Href::new("/col/".to_string()).unwrap(),
                etag: None,
                kind: MemberKind::Resource,
                deleted: false,
            },
            davsync_core::ports::Relation::Collection,
        )
        .map_err(|e| RemoteError::Io(e.to_string()))?;

        let members = self.members.lock().unwrap().clone();
        for member in members {
            callback(member, davsync_core::ports::Relation::Member)
                .map_err(|e| RemoteError::Io(e.to_string()))?;
        }
        Ok(())
    }

    async fn list_changes(
        &self,
        token: &str,
        callback: MemberCallback<'_>,
    ) -> Result<SyncState, RemoteError> {
        let changes = self.changes.lock().unwrap();
        let log = changes.as_ref().ok_or(RemoteError::InvalidSyncToken)?;
        if log.expected_token != token {
            return Err(RemoteError::InvalidSyncToken);
        }
        for member in log.members.clone() {
            callback(member, davsync_core::ports::Relation::Member)
                .map_err(|e| RemoteError::Io(e.to_string()))?;
        }
        Ok(log.next.clone())
    }

    async fn generate_upload(&self, resource: &LocalResource) -> Result<UploadBody, RemoteError> {
        Ok(UploadBody {
            content_type: "text/calendar".to_string(),
            data: format!("SERIALIZED:{}", resource.id()).into_bytes(),
        })
    }

    async fn upload(
        &self,
        name: &str,
        body: UploadBody,
        precondition: Precondition,
    ) -> Result<Deposited, RemoteError> {
        if let Some(err) = self.upload_errors.lock().unwrap().get(name) {
            return Err(err.clone());
        }
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), body.data, precondition));
        let n = self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Deposited {
            etag: Some(etag(&format!("srv-{n}"))),
            schedule_tag: None,
        })
    }

    async fn delete(&self, name: &str, etag: Option<&Etag>) -> Result<(), RemoteError> {
        if let Some(err) = self.delete_errors.lock().unwrap().get(name) {
            return Err(err.clone());
        }
        self.deletes
            .lock()
            .unwrap()
            .push((name.to_string(), etag.cloned()));
        Ok(())
    }

    async fn download(&self, hrefs: &[Href]) -> Result<Vec<RemoteContent>, RemoteError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let contents = self.contents.lock().unwrap();
        Ok(hrefs
            .iter()
            .filter_map(|href| href.member_name())
            .filter_map(|name| contents.get(name).cloned())
            .collect())
    }
}

// ============================================================================
// FakeRepository
// ============================================================================

/// Collection registry handing out shared in-memory adapters
#[derive(Default)]
pub struct FakeRepository {
    pub remotes: Mutex<Vec<RemoteCollectionInfo>>,
    pub locals: Mutex<Vec<LocalCollection>>,
    pub deleted_locals: Mutex<Vec<CollectionId>>,
    pub stores: Mutex<HashMap<CollectionId, Arc<InMemoryStore>>>,
    pub remote: Mutex<HashMap<CollectionId, Arc<FakeRemote>>>,
    pub unavailable: Mutex<bool>,
}

impl FakeRepository {
    pub fn register(&self, info: RemoteCollectionInfo, remote: Arc<FakeRemote>) {
        self.remote.lock().unwrap().insert(info.id, remote);
        self.remotes.lock().unwrap().push(info);
    }

    pub fn store_for(&self, id: CollectionId) -> Arc<InMemoryStore> {
        self.stores
            .lock()
            .unwrap()
            .entry(id)
            .or_insert_with(|| Arc::new(InMemoryStore::default()))
            .clone()
    }
}

#[async_trait::async_trait]
impl ICollectionRepository for FakeRepository {
    async fn registered_remote_collections(
        &self,
        _account: &AccountName,
        _service: ServiceType,
    ) -> Result<Vec<RemoteCollectionInfo>, StoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(StoreError::Unavailable("provider gone".to_string()));
        }
        Ok(self.remotes.lock().unwrap().clone())
    }

    async fn local_collections(
        &self,
        _account: &AccountName,
        _service: ServiceType,
    ) -> Result<Vec<LocalCollection>, StoreError> {
        Ok(self.locals.lock().unwrap().clone())
    }

    async fn create_local_collection(
        &self,
        _account: &AccountName,
        info: &RemoteCollectionInfo,
    ) -> Result<LocalCollection, StoreError> {
        let local = LocalCollection::new(info.id, info.read_only);
        self.locals.lock().unwrap().push(local.clone());
        Ok(local)
    }

    async fn delete_local_collection(&self, id: CollectionId) -> Result<(), StoreError> {
        self.locals.lock().unwrap().retain(|local| local.id() != id);
        self.deleted_locals.lock().unwrap().push(id);
        Ok(())
    }

    async fn open_store(
        &self,
        collection: &LocalCollection,
    ) -> Result<Arc<dyn ILocalStore>, StoreError> {
        Ok(self.store_for(collection.id()))
    }

    async fn open_contact_store(
        &self,
        _collection: &LocalCollection,
    ) -> Result<Arc<dyn IContactStore>, StoreError> {
        Err(StoreError::Storage(
            "no contact store in this fixture".to_string(),
        ))
    }

    async fn open_remote(
        &self,
        info: &RemoteCollectionInfo,
    ) -> Result<Arc<dyn IRemoteCollection>, StoreError> {
        self.remote
            .lock()
            .unwrap()
            .get(&info.id)
            .cloned()
            .map(|remote| remote as Arc<dyn IRemoteCollection>)
            .ok_or_else(|| StoreError::Storage(format!("no remote for {}", info.id)))
    }
}

/// Default engine config with a small download bunch size so batching is
/// observable in tests
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        download_batch_size: 2,
        ..EngineConfig::default()
    }
}
