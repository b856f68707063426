//! In-memory backend implementations.
//!
//! These back the demo binary and the test-suite. Besides storing tasks they
//! record every call, can be told to fail specific calls, and can hold calls
//! in flight until released so optimistic state can be observed mid-call.
//!
//! # Features
//!
//! - Thread-safe with `Arc<RwLock<...>>`
//! - Per-key fail injection; a failed call leaves stored state untouched
//! - A semaphore gate that parks calls until `release` is called

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;

use crate::domain::{DEFAULT_KEY_PREFIX, Person, Task, TaskDraft, TaskHandle, TaskPatch, Timestamp};

use super::backend::{BackendError, CanonicalBackend, LegacyBackend, Notification, Notifier};

// =============================================================================
// Call Log
// =============================================================================

/// Backend call kinds, as recorded by the in-memory backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCall {
    /// Canonical `fetch_all`.
    FetchAll,
    /// Canonical `create`.
    Create,
    /// Canonical `update`.
    Update,
    /// Canonical `delete`.
    Delete,
    /// Legacy `assign`.
    LegacyAssign,
    /// Legacy `unassign`.
    LegacyUnassign,
    /// Legacy `add_collaborator`.
    LegacyAddCollaborator,
    /// Legacy `remove_collaborator`.
    LegacyRemoveCollaborator,
    /// Legacy `restore`.
    LegacyRestore,
}

/// One recorded call with the key or handle it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Which call was made.
    pub call: BackendCall,
    /// Key (canonical) or handle (legacy); empty for `fetch_all` and `create`.
    pub target: String,
}

#[derive(Debug, Default)]
struct CallLog {
    calls: Mutex<Vec<RecordedCall>>,
    failing: RwLock<HashSet<(BackendCall, String)>>,
}

impl CallLog {
    fn record(&self, call: BackendCall, target: &str) -> Result<(), BackendError> {
        self.calls.lock().push(RecordedCall {
            call,
            target: target.to_string(),
        });
        if self.failing.read().contains(&(call, target.to_string())) {
            return Err(BackendError::Injected(format!("{call:?} {target}")));
        }
        Ok(())
    }

    fn count(&self, call: BackendCall) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|recorded| recorded.call == call)
            .count()
    }

    fn count_for(&self, call: BackendCall, target: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|recorded| recorded.call == call && recorded.target == target)
            .count()
    }
}

// =============================================================================
// In-Memory Canonical Backend
// =============================================================================

/// In-memory implementation of [`CanonicalBackend`].
///
/// # Example
///
/// ```
/// use task_view_sync::infrastructure::{BackendCall, InMemoryCanonicalBackend};
///
/// let backend = InMemoryCanonicalBackend::new();
/// backend.fail_on(BackendCall::Delete, "T3");
/// assert_eq!(backend.call_count(BackendCall::Delete), 0);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCanonicalBackend {
    tasks: Arc<RwLock<Vec<Task>>>,
    next_id: Arc<AtomicI64>,
    key_prefix: char,
    log: Arc<CallLog>,
    fail_fetch: Arc<AtomicBool>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for InMemoryCanonicalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCanonicalBackend {
    /// Creates an empty backend that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Creates a backend holding `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let next_id = tasks
            .iter()
            .filter_map(|task| task.id.as_numeric())
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            tasks: Arc::new(RwLock::new(tasks)),
            next_id: Arc::new(AtomicI64::new(next_id)),
            key_prefix: DEFAULT_KEY_PREFIX,
            log: Arc::new(CallLog::default()),
            fail_fetch: Arc::new(AtomicBool::new(false)),
            gate: None,
        }
    }

    /// Returns a backend whose mutating calls wait for [`Self::release`].
    #[must_use]
    pub fn held(self) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..self
        }
    }

    /// Lets `count` held calls proceed.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Makes every future `call` targeting `key` fail.
    pub fn fail_on(&self, call: BackendCall, key: &str) {
        self.log.failing.write().insert((call, key.to_string()));
    }

    /// Makes `fetch_all` fail (or succeed again).
    pub fn set_fetch_failing(&self, failing: bool) {
        self.fail_fetch.store(failing, Ordering::SeqCst);
    }

    /// Number of recorded calls of `call`.
    #[must_use]
    pub fn call_count(&self, call: BackendCall) -> usize {
        self.log.count(call)
    }

    /// Number of recorded calls of `call` targeting `key`.
    #[must_use]
    pub fn call_count_for(&self, call: BackendCall, key: &str) -> usize {
        self.log.count_for(call, key)
    }

    /// Clone of the stored tasks.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Stores `task` directly, bypassing the call log.
    pub fn insert(&self, task: Task) {
        self.tasks.write().push(task);
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
    }
}

impl CanonicalBackend for InMemoryCanonicalBackend {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<Task>, BackendError>> {
        Box::pin(async move {
            self.log.record(BackendCall::FetchAll, "")?;
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("fetch disabled".to_string()));
            }
            Ok(self.tasks())
        })
    }

    fn create(&self, draft: TaskDraft) -> BoxFuture<'_, Result<Task, BackendError>> {
        Box::pin(async move {
            self.pass_gate().await;
            self.log.record(BackendCall::Create, "")?;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut task = Task::new(id, draft.title)
                .with_task_id(format!("{}{id}", self.key_prefix))
                .with_collaborators(draft.collaborators)
                .with_updated_at(Timestamp::now());
            task.project = draft.project;
            task.status = draft.status;
            task.assignee = draft.assignee;
            self.tasks.write().push(task.clone());
            Ok(task)
        })
    }

    fn update(&self, key: &str, patch: TaskPatch) -> BoxFuture<'_, Result<Task, BackendError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.pass_gate().await;
            self.log.record(BackendCall::Update, &key)?;
            let mut tasks = self.tasks.write();
            let slot = tasks
                .iter_mut()
                .find(|task| task.has_task_id(&key))
                .ok_or_else(|| BackendError::NotFound(key.clone()))?;
            *slot = slot
                .clone()
                .apply_patch(&patch)
                .with_updated_at(Timestamp::now());
            Ok(slot.clone())
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), BackendError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.pass_gate().await;
            self.log.record(BackendCall::Delete, &key)?;
            let mut tasks = self.tasks.write();
            let before = tasks.len();
            tasks.retain(|task| !task.has_task_id(&key));
            if tasks.len() == before {
                return Err(BackendError::NotFound(key));
            }
            Ok(())
        })
    }
}

// =============================================================================
// In-Memory Legacy Backend
// =============================================================================

/// In-memory implementation of [`LegacyBackend`].
///
/// Only records calls; legacy state is mirrored by the caller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLegacyBackend {
    log: Arc<CallLog>,
}

impl InMemoryLegacyBackend {
    /// Creates a backend that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future `call` targeting `id` fail.
    pub fn fail_on(&self, call: BackendCall, id: &TaskHandle) {
        self.log.failing.write().insert((call, id.to_string()));
    }

    /// Number of recorded calls of `call`.
    #[must_use]
    pub fn call_count(&self, call: BackendCall) -> usize {
        self.log.count(call)
    }
}

impl LegacyBackend for InMemoryLegacyBackend {
    fn assign(&self, id: &TaskHandle, _person: &Person) -> Result<(), BackendError> {
        self.log.record(BackendCall::LegacyAssign, &id.to_string())
    }

    fn unassign(&self, id: &TaskHandle) -> Result<(), BackendError> {
        self.log.record(BackendCall::LegacyUnassign, &id.to_string())
    }

    fn add_collaborator(&self, id: &TaskHandle, _person: &Person) -> Result<(), BackendError> {
        self.log
            .record(BackendCall::LegacyAddCollaborator, &id.to_string())
    }

    fn remove_collaborator(&self, id: &TaskHandle, _index: usize) -> Result<(), BackendError> {
        self.log
            .record(BackendCall::LegacyRemoveCollaborator, &id.to_string())
    }

    fn restore(&self, id: &TaskHandle) -> Result<(), BackendError> {
        self.log.record(BackendCall::LegacyRestore, &id.to_string())
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of every notification shown so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Titles of every notification shown so far.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .map(|notification| notification.title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn trashed(id: i64) -> Task {
        Task::new(id, format!("task {id}"))
            .with_task_id(format!("T{id}"))
            .soft_deleted(Timestamp::now(), "ana")
    }

    #[rstest]
    #[tokio::test]
    async fn test_canonical_update_applies_patch() {
        let backend = InMemoryCanonicalBackend::with_tasks(vec![trashed(1)]);

        let task = backend.update("T1", TaskPatch::restore()).await.unwrap();

        assert!(!task.is_deleted());
        assert!(task.updated_at.is_some());
        assert!(!backend.tasks()[0].is_deleted());
    }

    #[rstest]
    #[tokio::test]
    async fn test_canonical_update_unknown_key() {
        let backend = InMemoryCanonicalBackend::new();
        let result = backend.update("T9", TaskPatch::archive()).await;
        assert_eq!(result, Err(BackendError::NotFound("T9".to_string())));
    }

    #[rstest]
    #[tokio::test]
    async fn test_canonical_create_issues_next_key() {
        let backend = InMemoryCanonicalBackend::with_tasks(vec![trashed(4)]);

        let task = backend.create(TaskDraft::new("fresh")).await.unwrap();

        assert_eq!(task.id, TaskHandle::Numeric(5));
        assert!(task.has_task_id("T5"));
        assert_eq!(backend.tasks().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_fail_on_leaves_state_untouched() {
        let backend = InMemoryCanonicalBackend::with_tasks(vec![trashed(1)]);
        backend.fail_on(BackendCall::Delete, "T1");

        let result = backend.delete("T1").await;

        assert!(matches!(result, Err(BackendError::Injected(_))));
        assert_eq!(backend.tasks().len(), 1);
        assert_eq!(backend.call_count_for(BackendCall::Delete, "T1"), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_fetch_failure_switch() {
        let backend = InMemoryCanonicalBackend::with_tasks(vec![trashed(1)]);
        backend.set_fetch_failing(true);
        assert!(backend.fetch_all().await.is_err());

        backend.set_fetch_failing(false);
        assert_eq!(backend.fetch_all().await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_held_call_waits_for_release() {
        let backend = InMemoryCanonicalBackend::with_tasks(vec![trashed(1)]).held();
        let call = backend.delete("T1");
        tokio::pin!(call);

        assert!(futures::poll!(call.as_mut()).is_pending());
        assert_eq!(backend.call_count(BackendCall::Delete), 0);

        backend.release(1);
        assert_eq!(call.await, Ok(()));
    }

    #[rstest]
    fn test_legacy_records_and_fails() {
        let backend = InMemoryLegacyBackend::new();
        let handle = TaskHandle::from("L-1");
        backend.fail_on(BackendCall::LegacyRestore, &handle);

        assert!(backend.restore(&handle).is_err());
        assert!(backend.unassign(&handle).is_ok());
        assert_eq!(backend.call_count(BackendCall::LegacyRestore), 1);
    }

    #[rstest]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::error("Error", "boom"));
        assert_eq!(notifier.titles(), vec!["Error"]);
    }
}
