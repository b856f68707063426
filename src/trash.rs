//! Trash lifecycle.
//!
//! [`TrashManager`] is what a trash screen talks to: the deleted subset
//! (optionally search-filtered), per-row busy flags, the restore / permanent
//! delete entry points, and the retention countdown.
//!
//! Busy flags are presentation state. They are held by RAII guards for the
//! duration of a call and never touch the optimistic overlay.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration;
use parking_lot::Mutex;

use crate::domain::{OverlayKey, Task, TaskHandle, Timestamp};
use crate::mutation::{EmptyTrashReport, MutationError, MutationRouter, RestoreAllReport};
use crate::state::{deleted_subset, search_deleted};

// =============================================================================
// Busy Flags
// =============================================================================

/// Clears a row's restoring flag when dropped.
struct RestoringFlag {
    restoring: Arc<Mutex<HashSet<OverlayKey>>>,
    key: OverlayKey,
}

impl Drop for RestoringFlag {
    fn drop(&mut self) {
        self.restoring.lock().remove(&self.key);
    }
}

/// Clears the emptying flag when dropped.
struct EmptyingFlag(Arc<AtomicBool>);

impl Drop for EmptyingFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Trash Manager
// =============================================================================

/// Trash view and operations over one [`MutationRouter`].
#[derive(Debug, Clone)]
pub struct TrashManager {
    router: MutationRouter,
    restoring: Arc<Mutex<HashSet<OverlayKey>>>,
    emptying: Arc<AtomicBool>,
}

impl TrashManager {
    /// Creates a manager with no busy rows.
    #[must_use]
    pub fn new(router: MutationRouter) -> Self {
        Self {
            router,
            restoring: Arc::new(Mutex::new(HashSet::new())),
            emptying: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The router behind this manager.
    #[must_use]
    pub const fn router(&self) -> &MutationRouter {
        &self.router
    }

    // -------------------------------------------------------------------------
    // View
    // -------------------------------------------------------------------------

    /// Trashed tasks of the materialized view.
    #[must_use]
    pub fn deleted(&self) -> Vec<Task> {
        self.router
            .store()
            .read(|store| deleted_subset(store.materialized()))
    }

    /// Trashed tasks matching `term`.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<Task> {
        self.router
            .store()
            .read(|store| search_deleted(store.materialized(), term))
    }

    /// Returns `true` while a restore for `key` is running.
    #[must_use]
    pub fn is_restoring(&self, key: &OverlayKey) -> bool {
        self.restoring.lock().contains(key)
    }

    /// Keys with a restore running, sorted.
    #[must_use]
    pub fn restoring(&self) -> Vec<OverlayKey> {
        let mut keys: Vec<_> = self.restoring.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns `true` while the trash is being emptied.
    #[must_use]
    pub fn is_emptying(&self) -> bool {
        self.emptying.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Retention
    // -------------------------------------------------------------------------

    /// When `task` falls out of the trash, if it is in the trash at all.
    #[must_use]
    pub fn expires_at(&self, task: &Task) -> Option<Timestamp> {
        let retention = i64::from(self.router.config().trash_retention_days);
        task.deleted_at.map(|deleted_at| deleted_at.plus_days(retention))
    }

    /// Whole days left before `task` expires, rounded up and never negative.
    #[must_use]
    pub fn days_remaining(&self, task: &Task, now: Timestamp) -> Option<i64> {
        let expires_at = self.expires_at(task)?;
        let left = *expires_at.as_datetime() - *now.as_datetime();
        if left <= Duration::zero() {
            return Some(0);
        }
        let whole = left.num_days();
        let partial = left > Duration::days(whole);
        Some(whole + i64::from(partial))
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Restores one task, flagging its row while the call runs.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::AlreadyPending`] without calling the router
    /// while the row is already restoring. Otherwise see
    /// [`MutationRouter::restore`].
    pub async fn restore(&self, id: &TaskHandle) -> Result<(), MutationError> {
        let key = OverlayKey::new(id.to_string());
        let Some(_flag) = self.flag_restoring(key.clone()) else {
            tracing::debug!(key = %key, "Restore already running");
            return Err(MutationError::AlreadyPending(key));
        };
        self.router.restore(id).await
    }

    /// Restores every trashed task, flagging all rows while the calls run.
    ///
    /// Rows already flagged by a running restore keep that call's flag.
    pub async fn restore_all(&self) -> RestoreAllReport {
        let _flags: Vec<_> = self
            .deleted()
            .iter()
            .filter_map(|task| self.flag_restoring(OverlayKey::of(task)))
            .collect();
        self.router.restore_all().await
    }

    /// Permanently deletes one task.
    ///
    /// # Errors
    ///
    /// See [`MutationRouter::permanent_delete`].
    pub async fn permanent_delete(&self, id: &TaskHandle) -> Result<(), MutationError> {
        self.router.permanent_delete(id).await
    }

    /// Empties the trash.
    ///
    /// Returns `None` without doing anything when the trash is empty or
    /// another empty-trash run has not finished.
    pub async fn empty_trash(&self) -> Option<EmptyTrashReport> {
        if self.deleted().is_empty() {
            return None;
        }
        if self.emptying.swap(true, Ordering::SeqCst) {
            tracing::debug!("Trash is already being emptied");
            return None;
        }
        let _flag = EmptyingFlag(Arc::clone(&self.emptying));
        Some(self.router.empty_trash().await)
    }

    /// Flags `key`, or returns `None` when another call already owns it.
    fn flag_restoring(&self, key: OverlayKey) -> Option<RestoringFlag> {
        if !self.restoring.lock().insert(key.clone()) {
            return None;
        }
        Some(RestoringFlag {
            restoring: Arc::clone(&self.restoring),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{
        InMemoryCanonicalBackend, InMemoryLegacyBackend, RecordingNotifier, SyncConfig,
    };
    use crate::state::{StoreHandle, TaskStore};
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    fn at(day: u32, hour: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap())
    }

    fn manager_with(tasks: Vec<Task>, held: bool) -> (TrashManager, InMemoryCanonicalBackend) {
        let mut canonical = InMemoryCanonicalBackend::with_tasks(tasks.clone());
        if held {
            canonical = canonical.held();
        }
        let router = MutationRouter::new(
            StoreHandle::new(TaskStore::with_snapshot(tasks)),
            Arc::new(canonical.clone()),
            Arc::new(InMemoryLegacyBackend::new()),
            Arc::new(RecordingNotifier::new()),
        );
        (TrashManager::new(router), canonical)
    }

    #[fixture]
    fn trashed() -> Task {
        Task::new(1, "Alpha")
            .with_task_id("T1")
            .soft_deleted(at(1, 12), "ana")
    }

    #[rstest]
    fn test_expires_after_retention(trashed: Task) {
        let (manager, _) = manager_with(vec![trashed.clone()], false);
        assert_eq!(manager.expires_at(&trashed), Some(at(31, 12)));
        assert_eq!(manager.expires_at(&Task::new(2, "active")), None);
    }

    #[rstest]
    #[case(at(1, 12), 30)]
    #[case(at(2, 0), 30)]
    #[case(at(30, 13), 1)]
    #[case(at(31, 12), 0)]
    #[case(at(31, 23), 0)]
    fn test_days_remaining(trashed: Task, #[case] now: Timestamp, #[case] expected: i64) {
        let (manager, _) = manager_with(vec![trashed.clone()], false);
        assert_eq!(manager.days_remaining(&trashed, now), Some(expected));
    }

    #[rstest]
    fn test_retention_follows_config(trashed: Task) {
        let (manager, _) = manager_with(vec![trashed.clone()], false);
        let config = SyncConfig {
            trash_retention_days: 7,
            ..SyncConfig::default()
        };
        let manager = TrashManager::new(manager.router().clone().with_config(config));
        assert_eq!(manager.expires_at(&trashed), Some(at(8, 12)));
    }

    #[rstest]
    #[tokio::test]
    async fn test_restoring_flag_spans_the_call(trashed: Task) {
        let (manager, canonical) = manager_with(vec![trashed], true);
        let key = OverlayKey::new("1");
        let id = TaskHandle::from(1);

        let call = manager.restore(&id);
        tokio::pin!(call);
        assert!(futures::poll!(call.as_mut()).is_pending());
        assert!(manager.is_restoring(&key));
        assert_eq!(manager.restoring(), vec![key.clone()]);

        canonical.release(1);
        call.await.unwrap();
        assert!(!manager.is_restoring(&key));
    }

    #[rstest]
    #[tokio::test]
    async fn test_repeat_restore_keeps_running_flag(trashed: Task) {
        let (manager, canonical) = manager_with(vec![trashed], true);
        let key = OverlayKey::new("1");
        let id = TaskHandle::from(1);

        let first = manager.restore(&id);
        tokio::pin!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());

        let second = manager.restore(&id).await;
        assert_eq!(second, Err(MutationError::AlreadyPending(key.clone())));
        assert!(manager.is_restoring(&key));

        canonical.release(1);
        first.await.unwrap();
        assert!(!manager.is_restoring(&key));
    }

    #[rstest]
    #[tokio::test]
    async fn test_restoring_flag_cleared_on_failure() {
        let (manager, _) = manager_with(Vec::new(), false);
        let result = manager.restore(&TaskHandle::from(5)).await;

        assert!(result.is_err());
        assert!(manager.restoring().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_emptying_flag_and_reentry(trashed: Task) {
        let (manager, canonical) = manager_with(vec![trashed], true);

        let call = manager.empty_trash();
        tokio::pin!(call);
        assert!(futures::poll!(call.as_mut()).is_pending());
        assert!(manager.is_emptying());

        canonical.release(1);
        let report = call.await.unwrap();
        assert!(report.is_complete());
        assert!(!manager.is_emptying());
    }

    #[rstest]
    #[tokio::test]
    async fn test_empty_trash_with_nothing_trashed() {
        let (manager, _) = manager_with(vec![Task::new(1, "active").with_task_id("T1")], false);
        assert_eq!(manager.empty_trash().await, None);
    }
}
