//! Collection synchronization engine
//!
//! [`SyncEngine`] runs exactly one reconciliation pass between one local
//! collection and its paired remote collection, reporting everything that
//! happened through a [`SyncOutcome`].
//!
//! ## Pass Flow
//!
//! 1. **Prepare**: validate the resolved collection URL
//! 2. **Query capabilities**: fetch the remote change-detection token
//!    (at most once per pass)
//! 3. **Decide algorithm**: incremental collection-sync if supported and a
//!    token is stored, full listing otherwise; an unchanged CTag
//!    short-circuits straight to post-processing
//! 4. **Upload**: propagate local deletions, then local edits, guarded by
//!    conditional headers; conflicts stay dirty for the next pass
//! 5. **List + diff**: members delivered one callback at a time, compared
//!    against the locally known member set
//! 6. **Download**: changed/new members fetched in bounded bunches
//! 7. **Persist** the new sync state, then post-process
//!
//! A pass never loses a local edit: conditional uploads surface conflicts
//! as soft errors and downloads never overwrite a resource that is still
//! dirty. Errors are contained at resource granularity wherever possible;
//! only collection-unreachable conditions abort the pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use davsync_core::config::EngineConfig;
use davsync_core::domain::{
    Etag, Href, LocalCollection, LocalResource, RemoteCollectionInfo, ResourceFlags, ServiceType,
    SyncState, UploadAction,
};
use davsync_core::ports::{
    IContactStore, ILocalStore, IRemoteCollection, Precondition, Relation, RemoteContent,
    RemoteError, RemoteMember,
};

use crate::groups::GroupReconciler;
use crate::outcome::SyncOutcome;
use crate::SyncError;

// ============================================================================
// Algorithm selection
// ============================================================================

/// Which listing mode the pass runs in
#[derive(Debug, Clone, PartialEq, Eq)]
enum Algorithm {
    /// Enumerate all members, compare against the stored CTag
    Full,
    /// List only members changed since the stored sync token
    Incremental(String),
}

/// Pick the algorithm from the stored state and remote capabilities
fn choose_algorithm(stored: &SyncState, supports_collection_sync: bool) -> Algorithm {
    match stored.as_sync_token() {
        Some(token) if supports_collection_sync => Algorithm::Incremental(token.to_string()),
        _ => Algorithm::Full,
    }
}

/// Whether a full listing can be skipped: only when both sides report a
/// CTag and they are equal
fn listing_required(stored: &SyncState, remote: Option<&SyncState>) -> bool {
    match (stored.as_ctag(), remote.and_then(SyncState::as_ctag)) {
        (Some(stored_ctag), Some(remote_ctag)) => stored_ctag != remote_ctag,
        _ => true,
    }
}

/// Compare a locally cached ETag with the server-reported one
///
/// Anything unknown on either side counts as changed.
fn etags_match(local: Option<&Etag>, remote: Option<&Etag>) -> bool {
    matches!((local, remote), (Some(a), Some(b)) if a == b)
}

/// The remote file name assigned to a resource on first upload
fn assigned_member_name(resource: &LocalResource, service: ServiceType) -> String {
    match service.member_extension() {
        Some(ext) => format!("{}.{ext}", resource.id()),
        None => resource.id().to_string(),
    }
}

/// What an incremental listing produced
enum IncrementalResult {
    /// Listing and downloads finished; persist this state
    Done(SyncState),
    /// Cancellation stopped the pass before downloads finished
    Cancelled,
    /// The server no longer accepts the stored token
    TokenRejected,
}

// ============================================================================
// SyncEngine
// ============================================================================

/// One reconciliation pass for one local collection
///
/// Constructed fresh per pass; consumed by [`perform`](SyncEngine::perform).
pub struct SyncEngine {
    collection: LocalCollection,
    info: RemoteCollectionInfo,
    store: Arc<dyn ILocalStore>,
    contacts: Option<Arc<dyn IContactStore>>,
    remote: Arc<dyn IRemoteCollection>,
    groups: Option<GroupReconciler>,
    config: EngineConfig,
    cancel: CancellationToken,
    capabilities_queried: bool,
}

impl SyncEngine {
    /// Create the engine for one pass
    ///
    /// The group strategy is selected here, once, from the collection's
    /// configured group method; address books must supply a contact store.
    pub fn new(
        collection: LocalCollection,
        info: RemoteCollectionInfo,
        store: Arc<dyn ILocalStore>,
        contacts: Option<Arc<dyn IContactStore>>,
        remote: Arc<dyn IRemoteCollection>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let groups = info.group_method.map(GroupReconciler::for_method);
        debug_assert!(
            groups.is_none() || contacts.is_some(),
            "a group method requires a contact store"
        );
        Self {
            collection,
            info,
            store,
            contacts,
            remote,
            groups,
            config,
            cancel,
            capabilities_queried: false,
        }
    }

    /// Run the pass and fold every failure into the returned outcome
    #[tracing::instrument(skip_all, fields(collection = %self.collection.id()))]
    pub async fn perform(mut self) -> SyncOutcome {
        let mut outcome = SyncOutcome::new();
        match self.run(&mut outcome).await {
            Ok(()) => info!(
                uploaded = outcome.resources_uploaded,
                downloaded = outcome.resources_downloaded,
                deleted = outcome.resources_deleted,
                "Collection pass finished"
            ),
            Err(err) => {
                warn!(error = %err, "Collection pass aborted");
                self.note_delay(&err, &mut outcome);
                outcome.record(&err);
            }
        }
        outcome
    }

    async fn run(&mut self, outcome: &mut SyncOutcome) -> Result<(), SyncError> {
        self.prepare()?;

        let remote_state = self.query_capabilities().await?;
        let algorithm = choose_algorithm(
            self.collection.sync_state(),
            self.info.supports_collection_sync,
        );
        debug!(algorithm = ?algorithm, remote_state = ?remote_state, "Algorithm decided");

        if let (Some(groups), Some(contacts)) = (&self.groups, &self.contacts) {
            groups.before_upload_dirty(contacts.as_ref()).await?;
        }

        let uploaded = self.upload_pending(outcome).await?;

        let persist = if self.cancel.is_cancelled() {
            None
        } else {
            match &algorithm {
                Algorithm::Full => {
                    if uploaded.is_empty()
                        && !listing_required(self.collection.sync_state(), remote_state.as_ref())
                    {
                        debug!("Collection unchanged since last pass, skipping listing");
                        None
                    } else {
                        self.full_pass(remote_state.as_ref(), &uploaded, outcome).await?
                    }
                }
                Algorithm::Incremental(token) => {
                    match self.incremental_listing(token, outcome).await? {
                        IncrementalResult::Done(state) => Some(state),
                        IncrementalResult::Cancelled => None,
                        IncrementalResult::TokenRejected => {
                            warn!("Stored sync token rejected, falling back to full listing");
                            self.full_pass(remote_state.as_ref(), &uploaded, outcome).await?
                        }
                    }
                }
            }
        };

        if let (Some(groups), Some(contacts)) = (&self.groups, &self.contacts) {
            groups.post_process(contacts.as_ref()).await?;
        }

        if let Some(state) = persist {
            self.store.save_sync_state(&state, Utc::now()).await?;
            debug!(state = ?state, "Sync state persisted");
        }

        self.store.post_process().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    /// Validate that the collection is addressable at all
    fn prepare(&self) -> Result<(), SyncError> {
        let url = Url::parse(&self.info.url).map_err(|e| {
            SyncError::Unclassified(format!(
                "Collection {} has an unusable URL {:?}: {e}",
                self.collection.id(),
                self.info.url
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::Unclassified(format!(
                "Collection {} has a non-HTTP URL: {}",
                self.collection.id(),
                self.info.url
            )));
        }
        Ok(())
    }

    /// Fetch the remote change-detection token; callable once per pass
    async fn query_capabilities(&mut self) -> Result<Option<SyncState>, SyncError> {
        assert!(
            !self.capabilities_queried,
            "query_capabilities must be called at most once per pass"
        );
        self.capabilities_queried = true;
        Ok(self.remote.query_capabilities().await?)
    }

    /// Propagate local deletions and edits; returns the member names that
    /// were freshly uploaded (they are not deletion candidates in the diff)
    async fn upload_pending(
        &self,
        outcome: &mut SyncOutcome,
    ) -> Result<HashSet<String>, SyncError> {
        let read_only = self.collection.read_only() || self.info.read_only;
        let mut uploaded = HashSet::new();
        let mut local_deletes: Vec<Uuid> = Vec::new();
        let mut resets: Vec<Uuid> = Vec::new();
        let mut cleared: Vec<(Uuid, String, Option<Etag>, Option<davsync_core::domain::ScheduleTag>)> =
            Vec::new();

        for resource in self.store.find_deleted().await? {
            if self.cancel.is_cancelled() {
                break;
            }
            let name = match resource.name() {
                // Never uploaded, nothing to delete remotely.
                None => {
                    local_deletes.push(resource.id());
                    continue;
                }
                Some(name) => name,
            };
            if read_only {
                debug!(name, "Dropping local deletion on read-only collection");
                local_deletes.push(resource.id());
                continue;
            }
            match self.remote.delete(name, resource.etag()).await {
                // Already gone counts as successfully deleted.
                Ok(()) | Err(RemoteError::NotFound(_)) => {
                    debug!(name, "Deletion propagated");
                    local_deletes.push(resource.id());
                    outcome.resources_deleted += 1;
                }
                Err(RemoteError::PreconditionFailed(msg)) => {
                    warn!(name, "Remote member changed since deletion, retrying next pass");
                    self.note(SyncError::PreconditionFailed(msg), outcome)?;
                }
                Err(err) => self.note(err.into(), outcome)?,
            }
        }

        for resource in self.store.find_dirty().await? {
            if self.cancel.is_cancelled() {
                break;
            }
            if read_only {
                debug!(id = %resource.id(), "Reverting local edit on read-only collection");
                resets.push(resource.id());
                continue;
            }

            let mut resource = resource;
            if resource.name().is_none() {
                resource.set_name(assigned_member_name(&resource, self.info.service));
            }
            let name = match resource.name() {
                Some(name) => name.to_string(),
                None => continue,
            };

            let precondition = match resource.upload_action() {
                UploadAction::Update(etag) => Precondition::IfMatch(etag),
                UploadAction::Create => Precondition::IfNoneMatch,
                // find_dirty excludes deleted resources; a clean resource
                // cannot be returned by it either.
                UploadAction::Delete | UploadAction::None => continue,
            };

            let body = match self.remote.generate_upload(&resource).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(name = %name, error = %err, "Could not serialize resource for upload");
                    self.note(err.into(), outcome)?;
                    continue;
                }
            };

            match self.remote.upload(&name, body, precondition).await {
                Ok(deposited) => {
                    debug!(name = %name, etag = ?deposited.etag, "Upload confirmed");
                    cleared.push((
                        resource.id(),
                        name.clone(),
                        deposited.etag,
                        deposited.schedule_tag,
                    ));
                    uploaded.insert(name);
                    outcome.resources_uploaded += 1;
                }
                Err(RemoteError::PreconditionFailed(msg)) => {
                    // The local edit stays dirty; the next pass re-reads the
                    // remote state before trying again.
                    warn!(name = %name, "Upload conflict, keeping local change for next pass");
                    self.note(SyncError::PreconditionFailed(msg), outcome)?;
                }
                Err(err) => {
                    warn!(name = %name, error = %err, "Upload failed");
                    self.note(err.into(), outcome)?;
                }
            }
        }

        self.store.begin().await?;
        for id in local_deletes {
            self.store.delete(id).await?;
        }
        for id in resets {
            self.store.reset_dirty(id).await?;
        }
        for (id, name, etag, schedule_tag) in &cleared {
            self.store
                .clear_dirty(*id, name, etag.as_ref(), schedule_tag.as_ref())
                .await?;
        }
        self.store.commit().await?;

        Ok(uploaded)
    }

    /// Full listing, diff, download, and local-deletion application
    ///
    /// Returns the state to persist, or `None` when cancellation stopped
    /// the pass before the member set was fully reconciled.
    async fn full_pass(
        &self,
        remote_state: Option<&SyncState>,
        uploaded: &HashSet<String>,
        outcome: &mut SyncOutcome,
    ) -> Result<Option<SyncState>, SyncError> {
        let local_index = self.local_index().await?;
        self.store.mark_all_not_present().await?;

        let mut to_download: Vec<Href> = Vec::new();
        let mut present: Vec<Uuid> = Vec::new();
        {
            let mut on_member = |member: RemoteMember, relation: Relation| -> anyhow::Result<()> {
                if relation == Relation::Collection {
                    return Ok(());
                }
                let Some(name) = member.href.member_name() else {
                    return Ok(());
                };
                match local_index.get(name) {
                    Some(local) => {
                        present.push(local.id());
                        if local.is_dirty() || local.is_deleted() {
                            // Local changes win until they are uploaded.
                        } else if !etags_match(local.etag(), member.etag.as_ref()) {
                            to_download.push(member.href.clone());
                        }
                    }
                    None => to_download.push(member.href.clone()),
                }
                Ok(())
            };
            self.remote.list_all(&mut on_member).await?;
        }
        debug!(
            members_present = present.len(),
            to_download = to_download.len(),
            "Full listing diffed"
        );

        // Members uploaded in this pass are on the server even if the
        // listing raced ahead of them; they are never deletion candidates.
        for name in uploaded {
            if let Some(resource) = self.store.find_by_name(name).await? {
                present.push(resource.id());
            }
        }

        self.store.begin().await?;
        for id in present {
            self.store
                .update_flags(id, ResourceFlags::REMOTELY_PRESENT)
                .await?;
        }
        self.store.commit().await?;

        if !self.download_bunches(to_download, outcome).await? {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let purged = self.store.purge_absent().await?;
        if purged > 0 {
            info!(purged, "Removed resources no longer present remotely");
            outcome.resources_deleted += purged;
        }

        Ok(Some(remote_state.cloned().unwrap_or(SyncState::None)))
    }

    /// Changes-only listing against the stored sync token
    async fn incremental_listing(
        &self,
        token: &str,
        outcome: &mut SyncOutcome,
    ) -> Result<IncrementalResult, SyncError> {
        let local_index = self.local_index().await?;

        let mut to_download: Vec<Href> = Vec::new();
        let mut to_delete: Vec<Uuid> = Vec::new();
        let mut detached: Vec<LocalResource> = Vec::new();
        let mut present: Vec<Uuid> = Vec::new();

        let next_state = {
            let mut on_member = |member: RemoteMember, relation: Relation| -> anyhow::Result<()> {
                if relation == Relation::Collection {
                    return Ok(());
                }
                let Some(name) = member.href.member_name() else {
                    return Ok(());
                };
                if member.deleted {
                    if let Some(local) = local_index.get(name) {
                        if local.is_dirty() {
                            // The server dropped a member we still have
                            // edits for; keep the record and recreate the
                            // member on the next upload.
                            let mut local = local.clone();
                            local.detach_from_remote();
                            detached.push(local);
                        } else {
                            to_delete.push(local.id());
                        }
                    }
                    return Ok(());
                }
                match local_index.get(name) {
                    Some(local) => {
                        present.push(local.id());
                        if local.is_dirty() || local.is_deleted() {
                            // Local changes win until they are uploaded.
                        } else if !etags_match(local.etag(), member.etag.as_ref()) {
                            to_download.push(member.href.clone());
                        }
                    }
                    None => to_download.push(member.href.clone()),
                }
                Ok(())
            };
            match self.remote.list_changes(token, &mut on_member).await {
                Ok(state) => state,
                Err(RemoteError::InvalidSyncToken) => return Ok(IncrementalResult::TokenRejected),
                Err(err) => return Err(err.into()),
            }
        };
        debug!(
            changed = present.len(),
            deleted = to_delete.len(),
            to_download = to_download.len(),
            "Incremental listing diffed"
        );

        self.store.begin().await?;
        for id in present {
            self.store
                .update_flags(id, ResourceFlags::REMOTELY_PRESENT)
                .await?;
        }
        for id in &to_delete {
            self.store.delete(*id).await?;
        }
        for local in &detached {
            self.store.update(local, None).await?;
        }
        self.store.commit().await?;
        outcome.resources_deleted += to_delete.len() as u32;

        if self.download_bunches(to_download, outcome).await? {
            Ok(IncrementalResult::Done(next_state))
        } else {
            Ok(IncrementalResult::Cancelled)
        }
    }

    /// Fetch member bodies in bounded bunches and apply them locally
    ///
    /// Returns `false` when cancellation stopped the work midway.
    async fn download_bunches(
        &self,
        hrefs: Vec<Href>,
        outcome: &mut SyncOutcome,
    ) -> Result<bool, SyncError> {
        for bunch in hrefs.chunks(self.config.download_batch_size) {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping downloads");
                return Ok(false);
            }
            let contents = match self.remote.download(bunch).await {
                Ok(contents) => contents,
                Err(err) => {
                    warn!(bunch = bunch.len(), error = %err, "Download bunch failed");
                    self.note(err.into(), outcome)?;
                    continue;
                }
            };

            let mut cancelled = false;
            let mut abort: Option<SyncError> = None;
            self.store.begin().await?;
            for mut content in contents {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match self.save_downloaded(&mut content).await {
                    Ok(saved) => {
                        if saved {
                            outcome.resources_downloaded += 1;
                        }
                    }
                    Err(err) => {
                        warn!(href = %content.href, error = %err, "Failed to save downloaded resource");
                        if let Err(fatal) = self.note(err, outcome) {
                            abort = Some(fatal);
                            break;
                        }
                    }
                }
            }
            self.store.commit().await?;
            if let Some(err) = abort {
                return Err(err);
            }
            if cancelled {
                info!("Cancellation requested, stopping downloads");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Apply one downloaded body to the local store
    async fn save_downloaded(&self, content: &mut RemoteContent) -> Result<bool, SyncError> {
        if let Some(groups) = &self.groups {
            groups.verify_before_saving(content);
        }
        let Some(name) = content.href.member_name().map(str::to_string) else {
            return Ok(false);
        };

        let resource = match self.store.find_by_name(&name).await? {
            Some(mut resource) => {
                if resource.is_dirty() || resource.is_deleted() {
                    debug!(name = %name, "Skipping download over a pending local change");
                    return Ok(false);
                }
                resource.apply_download(content.etag.clone(), content.schedule_tag.clone());
                self.store.update(&resource, Some(&content.data)).await?;
                resource
            }
            None => {
                let resource = LocalResource::from_remote(
                    name,
                    content.etag.clone(),
                    content.schedule_tag.clone(),
                );
                self.store.add(&resource, &content.data).await?;
                resource
            }
        };

        if let (Some(groups), Some(contacts)) = (&self.groups, &self.contacts) {
            groups
                .after_saving(contacts.as_ref(), &resource, content.kind)
                .await?;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Error containment
    // ------------------------------------------------------------------

    /// Record a per-resource error; escalate when the collection is
    /// unreachable or soft failures recur pervasively
    fn note(&self, err: SyncError, outcome: &mut SyncOutcome) -> Result<(), SyncError> {
        if err.aborts_pass() {
            return Err(err);
        }
        self.note_delay(&err, outcome);
        outcome.record(&err);
        if matches!(err, SyncError::ServiceUnavailable { .. })
            && outcome.service_unavailable_errors >= self.config.service_unavailable_limit
        {
            warn!("Service unavailable keeps recurring, giving up on this collection");
            return Err(err);
        }
        Ok(())
    }

    /// Apply the retry-delay window for service-unavailable responses
    fn note_delay(&self, err: &SyncError, outcome: &mut SyncOutcome) {
        if let SyncError::ServiceUnavailable { retry_after } = err {
            let delay = self.config.clamp_retry_delay(*retry_after);
            let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| {
                chrono::Duration::seconds(self.config.retry_delay_ceiling_secs as i64)
            });
            outcome.raise_delay(Utc::now() + delay);
        }
    }

    /// The locally known member set, keyed by remote file name
    async fn local_index(&self) -> Result<HashMap<String, LocalResource>, SyncError> {
        let mut index = HashMap::new();
        for resource in self.store.find_named().await? {
            if let Some(name) = resource.name() {
                index.insert(name.to_string(), resource.clone());
            }
        }
        Ok(index)
    }
}

// ============================================================================
// Tests
// ============================================================================
