//! The task store.
//!
//! `TaskStore` owns the cached authoritative snapshot, the optimistic
//! overlay and the materialized view derived from both. Every mutation goes
//! through a method here and ends with a re-materialization, so readers
//! never observe a snapshot change without the matching view.
//!
//! `StoreHandle` shares one store between the push applier, the mutation
//! router and presentation.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use crate::domain::{OverlayKey, Task, TaskHandle, Timestamp};

use super::overlay::{OptimisticOverlay, PendingKind};
use super::reconcile::materialize;

// =============================================================================
// Fetch Status
// =============================================================================

/// State of the authoritative fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    /// No fetch has been issued yet.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The last fetch succeeded.
    Ready {
        /// When the snapshot was received.
        fetched_at: Timestamp,
    },
    /// The last fetch failed; the previous snapshot is still served.
    Stalled {
        /// Why the fetch failed.
        error: String,
    },
}

// =============================================================================
// Task Store
// =============================================================================

/// Owned snapshot, overlay and materialized view.
#[derive(Debug, Clone)]
pub struct TaskStore {
    snapshot: Vec<Task>,
    overlay: OptimisticOverlay,
    materialized: Vec<Task>,
    fetch_status: FetchStatus,
    stale: bool,
    revision: u64,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty store that has never fetched.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: Vec::new(),
            overlay: OptimisticOverlay::new(),
            materialized: Vec::new(),
            fetch_status: FetchStatus::Idle,
            stale: true,
            revision: 0,
        }
    }

    /// Creates a store seeded with `snapshot`, as if it had just been fetched.
    #[must_use]
    pub fn with_snapshot(snapshot: Vec<Task>) -> Self {
        let mut store = Self::new();
        store.replace_snapshot(snapshot);
        store
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The cached authoritative snapshot, including local edits.
    #[must_use]
    pub fn snapshot(&self) -> &[Task] {
        &self.snapshot
    }

    /// The optimistic overlay.
    #[must_use]
    pub const fn overlay(&self) -> &OptimisticOverlay {
        &self.overlay
    }

    /// The materialized view shown to presentation.
    #[must_use]
    pub fn materialized(&self) -> &[Task] {
        &self.materialized
    }

    /// State of the authoritative fetch.
    #[must_use]
    pub const fn fetch_status(&self) -> &FetchStatus {
        &self.fetch_status
    }

    /// Returns `true` if the next poll must reconfirm state.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Monotonic counter bumped on every change.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Finds a task of the materialized view by handle.
    #[must_use]
    pub fn find(&self, handle: &TaskHandle) -> Option<&Task> {
        self.materialized.iter().find(|task| &task.id == handle)
    }

    /// Finds a task of the snapshot by handle, ignoring the overlay.
    #[must_use]
    pub fn find_in_snapshot(&self, handle: &TaskHandle) -> Option<&Task> {
        self.snapshot.iter().find(|task| &task.id == handle)
    }

    // -------------------------------------------------------------------------
    // Authoritative fetch
    // -------------------------------------------------------------------------

    /// Records that a fetch was issued.
    pub fn begin_fetch(&mut self) {
        self.fetch_status = FetchStatus::Loading;
        self.revision += 1;
    }

    /// Replaces the snapshot with a fetch result. Last write wins.
    pub fn replace_snapshot(&mut self, tasks: Vec<Task>) {
        self.snapshot = tasks;
        self.fetch_status = FetchStatus::Ready {
            fetched_at: Timestamp::now(),
        };
        self.stale = false;
        self.refresh();
    }

    /// Records a failed fetch. The current snapshot keeps being served.
    pub fn fetch_failed(&mut self, error: impl Into<String>) {
        self.fetch_status = FetchStatus::Stalled {
            error: error.into(),
        };
        self.revision += 1;
    }

    /// Marks the cached fetch result as needing reconfirmation.
    pub fn invalidate(&mut self) {
        if !self.stale {
            self.stale = true;
            self.revision += 1;
        }
    }

    // -------------------------------------------------------------------------
    // Overlay
    // -------------------------------------------------------------------------

    /// Records a pending mutation and re-materializes.
    pub fn mark_pending(&mut self, key: &OverlayKey, kind: PendingKind) -> Option<PendingKind> {
        let superseded = self.overlay.mark_pending(key, kind);
        self.rematerialize();
        superseded
    }

    /// Clears a pending mutation and re-materializes.
    pub fn clear_pending(&mut self, key: &OverlayKey, kind: PendingKind) -> bool {
        let removed = self.overlay.clear_pending(key, kind);
        if removed {
            self.rematerialize();
        }
        removed
    }

    // -------------------------------------------------------------------------
    // Snapshot edits
    // -------------------------------------------------------------------------

    /// Appends `task` unless a task with the same key already exists.
    ///
    /// Returns `false` (and leaves the existing entry untouched) on a
    /// duplicate key.
    pub fn append_if_absent(&mut self, task: Task) -> bool {
        if let Some(key) = task.task_id.as_deref()
            && self.snapshot.iter().any(|existing| existing.has_task_id(key))
        {
            return false;
        }
        self.snapshot.push(task);
        self.refresh();
        true
    }

    /// Replaces the first task with the same key as `task`.
    ///
    /// Returns `false` if no task matched or `task` has no key.
    pub fn replace_by_task_id(&mut self, task: Task) -> bool {
        let Some(key) = task.task_id.clone() else {
            return false;
        };
        let Some(slot) = self
            .snapshot
            .iter_mut()
            .find(|existing| existing.has_task_id(&key))
        else {
            return false;
        };
        *slot = task;
        self.refresh();
        true
    }

    /// Removes every task carrying `key`. Returns how many were removed.
    pub fn remove_by_task_id(&mut self, key: &str) -> usize {
        let before = self.snapshot.len();
        self.snapshot.retain(|task| !task.has_task_id(key));
        let removed = before - self.snapshot.len();
        if removed > 0 {
            self.refresh();
        }
        removed
    }

    /// Applies `edit` to the snapshot task with `handle`.
    ///
    /// Returns `false` if no such task exists.
    pub fn edit<F>(&mut self, handle: &TaskHandle, edit: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        let Some(task) = self.snapshot.iter_mut().find(|task| &task.id == handle) else {
            return false;
        };
        edit(task);
        self.refresh();
        true
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn refresh(&mut self) {
        self.prune_confirmed();
        self.rematerialize();
    }

    fn rematerialize(&mut self) {
        self.materialized = materialize(&self.snapshot, &self.overlay);
        self.revision += 1;
    }

    /// Drops trash entries whose effect the snapshot already shows.
    fn prune_confirmed(&mut self) {
        for entry in self.overlay.entries() {
            let current = self
                .snapshot
                .iter()
                .find(|task| OverlayKey::of(task) == entry.key);
            let confirmed = match entry.kind {
                PendingKind::Restore => current.is_none_or(|task| !task.is_deleted()),
                PendingKind::PermanentDelete => current.is_none(),
                PendingKind::Create | PendingKind::Update | PendingKind::Delete => false,
            };
            if confirmed {
                tracing::debug!(key = %entry.key, kind = %entry.kind, "Optimistic entry confirmed");
                self.overlay.clear_pending(&entry.key, entry.kind);
            }
        }
    }
}

// =============================================================================
// Store Handle
// =============================================================================

/// Shared access to one [`TaskStore`].
///
/// Access goes through closures so a lock can never be held across an
/// `.await`. Every write publishes the new revision to subscribers.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    store: Arc<RwLock<TaskStore>>,
    revisions: Arc<watch::Sender<u64>>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new(TaskStore::new())
    }
}

impl StoreHandle {
    /// Wraps `store` for sharing.
    #[must_use]
    pub fn new(store: TaskStore) -> Self {
        let (revisions, _) = watch::channel(store.revision());
        Self {
            store: Arc::new(RwLock::new(store)),
            revisions: Arc::new(revisions),
        }
    }

    /// Runs `read` against the store.
    pub fn read<R>(&self, read: impl FnOnce(&TaskStore) -> R) -> R {
        read(&self.store.read())
    }

    /// Runs `write` against the store and publishes the resulting revision.
    pub fn write<R>(&self, write: impl FnOnce(&mut TaskStore) -> R) -> R {
        let (result, revision) = {
            let mut store = self.store.write();
            let result = write(&mut store);
            (result, store.revision())
        };
        self.revisions.send_if_modified(|current| {
            let changed = *current != revision;
            *current = revision;
            changed
        });
        result
    }

    /// Subscribes to revision changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    /// Clone of the materialized view.
    #[must_use]
    pub fn materialized(&self) -> Vec<Task> {
        self.read(|store| store.materialized().to_vec())
    }

    /// Clone of the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.read(|store| store.snapshot().to_vec())
    }
}
