//! Orchestrator runs over the in-memory collection registry

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use davsync_core::domain::{AccountName, CollectionId, LocalCollection, ServiceType, SyncState};
use davsync_engine::dedup::SyncDedup;
use davsync_engine::orchestrator::{SyncLifecycle, Syncer};
use davsync_engine::outcome::SyncOutcome;
use davsync_engine::SyncError;

use crate::common::{self, FakeRemote, FakeRepository};

fn syncer(repository: Arc<FakeRepository>) -> Syncer {
    common::init_logging();
    Syncer::new(
        common::account(),
        ServiceType::CalDav,
        repository,
        common::engine_config(),
    )
}

#[tokio::test]
async fn test_new_remote_collection_is_created_and_synced() {
    let repository = Arc::new(FakeRepository::default());
    let id = CollectionId::new();
    let remote = Arc::new(FakeRemote::with_capabilities(SyncState::Ctag(
        "c1".to_string(),
    )));
    remote.add_member(common::member("a.ics", "v1"), b"BODY");
    repository.register(common::caldav_info(id), Arc::clone(&remote));

    let outcome = syncer(Arc::clone(&repository)).on_perform_sync().await;

    assert!(!outcome.has_hard_error());
    assert_eq!(outcome.resources_downloaded, 1);

    // The local collection was created and its pass ran against the store.
    assert_eq!(repository.locals.lock().unwrap().len(), 1);
    let store = repository.store_for(id);
    assert!(store.get_by_name("a.ics").is_some());
    assert_eq!(store.saved_state(), Some(SyncState::Ctag("c1".to_string())));
}

#[tokio::test]
async fn test_deselected_collection_is_removed_locally() {
    let repository = Arc::new(FakeRepository::default());
    let orphan = CollectionId::new();
    repository
        .locals
        .lock()
        .unwrap()
        .push(LocalCollection::new(orphan, false));

    let kept = CollectionId::new();
    let remote = Arc::new(FakeRemote::with_capabilities(SyncState::Ctag(
        "c1".to_string(),
    )));
    repository.register(common::caldav_info(kept), Arc::clone(&remote));
    repository
        .locals
        .lock()
        .unwrap()
        .push(LocalCollection::new(kept, false));

    let outcome = syncer(Arc::clone(&repository)).on_perform_sync().await;

    assert!(!outcome.has_hard_error());
    assert_eq!(*repository.deleted_locals.lock().unwrap(), vec![orphan]);
    let locals = repository.locals.lock().unwrap();
    assert_eq!(locals.len(), 1);
    assert_eq!(locals[0].id(), kept);
}

#[tokio::test]
async fn test_store_unavailable_is_one_hard_error_for_the_whole_run() {
    let repository = Arc::new(FakeRepository::default());
    let remote = Arc::new(FakeRemote::with_capabilities(SyncState::Ctag(
        "c1".to_string(),
    )));
    repository.register(common::caldav_info(CollectionId::new()), Arc::clone(&remote));
    repository.register(common::caldav_info(CollectionId::new()), remote);
    *repository.unavailable.lock().unwrap() = true;

    let outcome = syncer(repository).on_perform_sync().await;

    assert!(outcome.has_hard_error());
    // Two registered collections, one report.
    assert_eq!(outcome.content_provider_errors, 1);
}

#[tokio::test]
async fn test_concurrent_requests_for_one_account_coalesce() {
    let repository = Arc::new(FakeRepository::default());
    let id = CollectionId::new();
    let remote = Arc::new(FakeRemote::with_capabilities(SyncState::Ctag(
        "c1".to_string(),
    )));
    *remote.capability_delay.lock().unwrap() = Some(Duration::from_millis(100));
    repository.register(common::caldav_info(id), Arc::clone(&remote));

    let syncer = Arc::new(
        syncer(Arc::clone(&repository)).with_dedup(SyncDedup::new()),
    );

    let first = {
        let syncer = Arc::clone(&syncer);
        tokio::spawn(async move { syncer.on_perform_sync().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = {
        let syncer = Arc::clone(&syncer);
        tokio::spawn(async move { syncer.on_perform_sync().await })
    };

    first.await.unwrap();
    second.await.unwrap();

    // The second request waited for the in-flight pass instead of
    // starting another one.
    assert_eq!(remote.capability_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lifecycle_hooks_wrap_the_run() {
    #[derive(Default)]
    struct CountingLifecycle {
        before: AtomicU32,
        after: AtomicU32,
    }

    #[async_trait::async_trait]
    impl SyncLifecycle for CountingLifecycle {
        async fn before_sync(
            &self,
            _account: &AccountName,
            _service: ServiceType,
        ) -> Result<(), SyncError> {
            self.before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn after_sync(
            &self,
            _account: &AccountName,
            _service: ServiceType,
            _outcome: &SyncOutcome,
        ) {
            self.after.fetch_add(1, Ordering::SeqCst);
        }
    }

    let repository = Arc::new(FakeRepository::default());
    let remote = Arc::new(FakeRemote::with_capabilities(SyncState::Ctag(
        "c1".to_string(),
    )));
    repository.register(common::caldav_info(CollectionId::new()), remote);

    let lifecycle = Arc::new(CountingLifecycle::default());
    let outcome = syncer(repository)
        .with_lifecycle(Arc::clone(&lifecycle) as Arc<dyn SyncLifecycle>)
        .on_perform_sync()
        .await;

    assert!(!outcome.has_hard_error());
    assert_eq!(lifecycle.before.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_before_sync_aborts_the_run() {
    struct RefusingLifecycle;

    #[async_trait::async_trait]
    impl SyncLifecycle for RefusingLifecycle {
        async fn before_sync(
            &self,
            _account: &AccountName,
            _service: ServiceType,
        ) -> Result<(), SyncError> {
            Err(SyncError::ContentProvider("listener setup failed".to_string()))
        }
    }

    let repository = Arc::new(FakeRepository::default());
    let remote = Arc::new(FakeRemote::with_capabilities(SyncState::Ctag(
        "c1".to_string(),
    )));
    repository.register(common::caldav_info(CollectionId::new()), Arc::clone(&remote));

    let outcome = syncer(repository)
        .with_lifecycle(Arc::new(RefusingLifecycle))
        .on_perform_sync()
        .await;

    assert!(outcome.has_hard_error());
    assert_eq!(remote.capability_calls.load(Ordering::SeqCst), 0);
}
