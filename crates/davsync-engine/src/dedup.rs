//! Execution deduplication
//!
//! [`SyncDedup`] guarantees at most one concurrent execution of a unit of
//! work per [`SyncKey`]. Later callers with the same key either wait for
//! the in-flight execution and then skip re-running, or return immediately,
//! depending on the per-call [`OnBusy`] policy. Callers with distinct keys
//! run fully independently and in parallel.
//!
//! The key → in-flight map is owned by the [`SyncDedup`] value (a cheaply
//! cloneable handle over shared state), not by a hidden global, so tests
//! can create isolated instances. Entries are removed as soon as their
//! execution finishes, including on panic or task cancellation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use davsync_core::domain::{AccountName, ServiceType};

/// Key identifying one deduplicated unit of sync work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    /// Account the work belongs to
    pub account: AccountName,
    /// Service flavor being synchronized
    pub service: ServiceType,
}

impl SyncKey {
    #[must_use]
    pub fn new(account: AccountName, service: ServiceType) -> Self {
        Self { account, service }
    }
}

impl std::fmt::Display for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.service)
    }
}

/// What to do when the key is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnBusy {
    /// Wait for the in-flight execution to finish, then skip re-running.
    /// Used for true duplicate-sync suppression: the caller coalesces
    /// with the finished execution's effects.
    Wait,
    /// Return immediately without executing. Used as a reentrancy guard
    /// against accidental nested invocation under the same key.
    Skip,
}

/// Result of a [`SyncDedup::run_single`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult<T> {
    /// This caller ran the work and produced the value
    Executed(T),
    /// Another execution held the key; this caller did not run
    SkippedBusy,
}

impl<T> RunResult<T> {
    /// Whether this caller executed the work
    #[must_use]
    pub const fn executed(&self) -> bool {
        matches!(self, RunResult::Executed(_))
    }

    /// The produced value, if this caller executed
    pub fn into_value(self) -> Option<T> {
        match self {
            RunResult::Executed(value) => Some(value),
            RunResult::SkippedBusy => None,
        }
    }
}

/// Removes the map entry when the execution ends, however it ends.
struct RunningSlot {
    map: Arc<DashMap<SyncKey, Arc<Mutex<()>>>>,
    key: SyncKey,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// At-most-one concurrent execution per key
#[derive(Debug, Clone, Default)]
pub struct SyncDedup {
    running: Arc<DashMap<SyncKey, Arc<Mutex<()>>>>,
}

impl SyncDedup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `work` unless an execution for `key` is already in flight
    ///
    /// Exactly one of any set of overlapping same-key callers executes;
    /// the others resolve according to `on_busy`. A waiting caller never
    /// re-executes after the in-flight run finishes.
    pub async fn run_single<T>(
        &self,
        key: SyncKey,
        on_busy: OnBusy,
        work: impl std::future::Future<Output = T>,
    ) -> RunResult<T> {
        // Becoming the runner (insert + try_lock) happens while the map
        // entry is pinned, so two callers can never both win the key.
        let guard = {
            let entry = self
                .running
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            entry.value().clone().try_lock_owned().ok()
        };

        match guard {
            Some(_guard) => {
                // Declared after `_guard` so it drops first: the entry is
                // gone from the map before the gate unlocks, and a caller
                // arriving in between starts a fresh entry instead of
                // winning a stale one.
                let _slot = RunningSlot {
                    map: Arc::clone(&self.running),
                    key: key.clone(),
                };
                debug!(%key, "Acquired sync slot");
                let value = work.await;
                RunResult::Executed(value)
            }
            None => match on_busy {
                OnBusy::Skip => {
                    debug!(%key, "Sync already running, skipping");
                    RunResult::SkippedBusy
                }
                OnBusy::Wait => {
                    debug!(%key, "Sync already running, waiting for it to finish");
                    let gate = self.running.get(&key).map(|entry| entry.value().clone());
                    if let Some(gate) = gate {
                        // Acquiring the gate means the in-flight run has
                        // released it; we do not re-execute.
                        let _released = gate.lock_owned().await;
                    }
                    RunResult::SkippedBusy
                }
            },
        }
    }

    /// Whether an execution for `key` is currently in flight
    #[must_use]
    pub fn is_running(&self, key: &SyncKey) -> bool {
        self.running.contains_key(key)
    }
}
