//! Collection orchestration
//!
//! [`Syncer`] is the entry point the external scheduler calls for one
//! (account, service) pair. It reconciles the set of local collections
//! against the registered remote collections, then runs one
//! [`SyncEngine`](crate::engine::SyncEngine) pass per surviving collection,
//! each on its own task so long-blocking collections don't serialize the
//! others. Outcomes are merged into a single [`SyncOutcome`] for the
//! scheduler.
//!
//! Duplicate sync requests for the same (account, service) key are
//! deduplicated: a second caller coalesces with the in-flight pass instead
//! of queueing a redundant one.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use davsync_core::config::EngineConfig;
use davsync_core::domain::{
    AccountName, CollectionId, LocalCollection, RemoteCollectionInfo, ServiceType,
};
use davsync_core::ports::{
    ICollectionRepository, IContactStore, ILocalStore, IRemoteCollection, StoreError,
};

use crate::dedup::{OnBusy, RunResult, SyncDedup, SyncKey};
use crate::engine::SyncEngine;
use crate::outcome::SyncOutcome;
use crate::SyncError;

// ============================================================================
// Lifecycle hooks
// ============================================================================

/// Type-specific setup/teardown around one orchestrator run
///
/// Implementations register content-change listeners, warm caches, or
/// similar; both methods default to no-ops.
#[async_trait::async_trait]
pub trait SyncLifecycle: Send + Sync {
    /// Called before collection reconciliation begins; an error aborts
    /// the run
    async fn before_sync(
        &self,
        account: &AccountName,
        service: ServiceType,
    ) -> Result<(), SyncError> {
        let _ = (account, service);
        Ok(())
    }

    /// Called after all collection passes finished, with the merged outcome
    async fn after_sync(
        &self,
        account: &AccountName,
        service: ServiceType,
        outcome: &SyncOutcome,
    ) {
        let _ = (account, service, outcome);
    }
}

/// Lifecycle that does nothing
pub struct NoopLifecycle;

#[async_trait::async_trait]
impl SyncLifecycle for NoopLifecycle {}

// ============================================================================
// Syncer
// ============================================================================

/// A collection pass ready to run: the local record, its descriptor, and
/// the opened adapters
struct PreparedCollection {
    local: LocalCollection,
    info: RemoteCollectionInfo,
    store: Arc<dyn ILocalStore>,
    contacts: Option<Arc<dyn IContactStore>>,
    remote: Arc<dyn IRemoteCollection>,
}

/// Orchestrates synchronization for one account and one service type
pub struct Syncer {
    account: AccountName,
    service: ServiceType,
    repository: Arc<dyn ICollectionRepository>,
    config: EngineConfig,
    dedup: SyncDedup,
    lifecycle: Arc<dyn SyncLifecycle>,
    cancel: CancellationToken,
}

impl Syncer {
    /// Create a syncer with default lifecycle, dedup state, and
    /// cancellation token
    pub fn new(
        account: AccountName,
        service: ServiceType,
        repository: Arc<dyn ICollectionRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            account,
            service,
            repository,
            config,
            dedup: SyncDedup::new(),
            lifecycle: Arc::new(NoopLifecycle),
            cancel: CancellationToken::new(),
        }
    }

    /// Install type-specific lifecycle hooks
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn SyncLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Share deduplication state with other syncers in the process
    #[must_use]
    pub fn with_dedup(mut self, dedup: SyncDedup) -> Self {
        self.dedup = dedup;
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Single entry point for the external scheduler
    ///
    /// Runs one deduplicated pass over every collection of this account
    /// and service. A concurrent duplicate request waits for the in-flight
    /// pass and returns an empty outcome, coalescing with its effects.
    #[tracing::instrument(skip(self), fields(account = %self.account, service = %self.service))]
    pub async fn on_perform_sync(&self) -> SyncOutcome {
        let key = SyncKey::new(self.account.clone(), self.service);
        match self
            .dedup
            .run_single(key, OnBusy::Wait, self.sync_pass())
            .await
        {
            RunResult::Executed(outcome) => outcome,
            RunResult::SkippedBusy => {
                info!("Sync already in flight for this account, coalescing");
                SyncOutcome::new()
            }
        }
    }

    async fn sync_pass(&self) -> SyncOutcome {
        let mut outcome = SyncOutcome::new();

        if let Err(err) = self.lifecycle.before_sync(&self.account, self.service).await {
            warn!(error = %err, "before_sync hook failed");
            outcome.record(&err);
            self.lifecycle
                .after_sync(&self.account, self.service, &outcome)
                .await;
            return outcome;
        }

        match self.prepare_collections(&mut outcome).await {
            Ok(prepared) => {
                let mut passes: JoinSet<SyncOutcome> = JoinSet::new();
                for collection in prepared {
                    let config = self.config.clone();
                    let cancel = self.cancel.child_token();
                    passes.spawn(async move {
                        SyncEngine::new(
                            collection.local,
                            collection.info,
                            collection.store,
                            collection.contacts,
                            collection.remote,
                            config,
                            cancel,
                        )
                        .perform()
                        .await
                    });
                }
                while let Some(joined) = passes.join_next().await {
                    match joined {
                        Ok(collection_outcome) => outcome.merge(collection_outcome),
                        Err(err) => {
                            let err =
                                SyncError::Unclassified(format!("collection pass panicked: {err}"));
                            warn!(error = %err, "Collection pass did not finish");
                            outcome.record(&err);
                        }
                    }
                }
            }
            // One store-unavailable condition is reported once for the
            // whole run, not per collection.
            Err(err) => {
                warn!(error = %err, "Aborting orchestrator run");
                outcome.record(&err);
            }
        }

        info!(
            uploaded = outcome.resources_uploaded,
            downloaded = outcome.resources_downloaded,
            deleted = outcome.resources_deleted,
            hard = outcome.has_hard_error(),
            soft = outcome.has_soft_error(),
            "Account sync finished"
        );
        self.lifecycle
            .after_sync(&self.account, self.service, &outcome)
            .await;
        outcome
    }

    /// Align the local collection set with the registered remote set and
    /// open the adapters for every surviving collection
    async fn prepare_collections(
        &self,
        outcome: &mut SyncOutcome,
    ) -> Result<Vec<PreparedCollection>, SyncError> {
        let remotes = self
            .repository
            .registered_remote_collections(&self.account, self.service)
            .await?;
        let locals = self
            .repository
            .local_collections(&self.account, self.service)
            .await?;

        let registered: HashSet<CollectionId> = remotes.iter().map(|info| info.id).collect();
        for local in &locals {
            if !registered.contains(&local.id()) {
                info!(collection = %local.id(), "Remote collection deselected, removing local collection");
                self.repository.delete_local_collection(local.id()).await?;
            }
        }

        let mut prepared = Vec::with_capacity(remotes.len());
        for info in remotes {
            let local = match locals.iter().find(|local| local.id() == info.id) {
                Some(local) => {
                    let mut local = local.clone();
                    local.set_read_only(info.read_only);
                    local
                }
                None => {
                    info!(collection = %info.id, "New remote collection selected, creating local collection");
                    self.repository
                        .create_local_collection(&self.account, &info)
                        .await?
                }
            };

            match self.open_adapters(&local, &info).await {
                Ok((store, contacts, remote)) => prepared.push(PreparedCollection {
                    local,
                    info,
                    store,
                    contacts,
                    remote,
                }),
                // Unavailable means no collection can be opened; bail out
                // of the whole run with a single hard error.
                Err(StoreError::Unavailable(msg)) => {
                    return Err(SyncError::ContentProvider(msg));
                }
                Err(err) => {
                    let err = SyncError::from(err);
                    warn!(collection = %info.id, error = %err, "Skipping collection");
                    outcome.record(&err);
                }
            }
        }
        debug!(collections = prepared.len(), "Collections prepared");
        Ok(prepared)
    }

    #[allow(clippy::type_complexity)]
    async fn open_adapters(
        &self,
        local: &LocalCollection,
        info: &RemoteCollectionInfo,
    ) -> Result<
        (
            Arc<dyn ILocalStore>,
            Option<Arc<dyn IContactStore>>,
            Arc<dyn IRemoteCollection>,
        ),
        StoreError,
    > {
        let store = self.repository.open_store(local).await?;
        let contacts = if info.group_method.is_some() {
            Some(self.repository.open_contact_store(local).await?)
        } else {
            None
        };
        let remote = self
            .repository
            .open_remote(info)
            .await?;
        Ok((store, contacts, remote))
    }
}
