//! Mutation router.
//!
//! Every user-initiated mutation enters here. The router classifies the
//! target task, looks its route up in the [`OperationTable`], brackets the
//! backend call with overlay bookkeeping and turns the outcome into a
//! notification.
//!
//! # Overlay discipline
//!
//! - Restore and permanent delete mark the overlay before the call; success
//!   keeps the marking until the snapshot confirms it, failure clears it.
//! - Create, update, soft delete and archive bracket the call with their own
//!   pending kind, which is cleared on every exit path.
//! - At most one mutation is in flight per task. A second request for the
//!   same task returns [`MutationError::AlreadyPending`] without a call.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;

use crate::domain::{
    IdentityClassifier, OverlayKey, Person, Regime, Task, TaskDraft, TaskHandle, TaskPatch,
    Timestamp,
};
use crate::infrastructure::{
    BackendError, CanonicalBackend, LegacyBackend, Notification, NotificationAction, Notifier,
    SyncConfig,
};
use crate::state::{PendingKind, StoreHandle, deleted_subset};

use super::table::{Operation, OperationTable, Route};

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by router operations.
///
/// Backend failures have already been reported to the user (or logged) by
/// the time one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// No task with this handle is visible.
    #[error("Task not found: {0}")]
    NotFound(TaskHandle),

    /// The task's regime has no backend path for the operation.
    #[error("Operation {operation} is not supported for {regime} tasks")]
    Unsupported {
        /// Requested operation.
        operation: Operation,
        /// Regime of the target task.
        regime: Regime,
    },

    /// Another mutation for the same task has not finished yet.
    #[error("A mutation is already in flight for task {0}")]
    AlreadyPending(OverlayKey),

    /// A canonical call needs a `taskId` the task does not carry.
    #[error("Task {0} has no backend key")]
    MissingKey(TaskHandle),

    /// Restore was requested for a task that is not in the trash.
    #[error("Task {0} is not in the trash")]
    NotInTrash(TaskHandle),

    /// The backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of [`MutationRouter::empty_trash`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmptyTrashReport {
    /// Keys whose delete succeeded.
    pub deleted: Vec<OverlayKey>,
    /// Keys whose delete failed; these are visible again.
    pub failed: Vec<(OverlayKey, BackendError)>,
    /// Trashed keys left alone: legacy tasks and tasks already in flight.
    pub skipped: Vec<OverlayKey>,
}

impl EmptyTrashReport {
    /// Returns `true` if no delete failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`MutationRouter::restore_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreAllReport {
    /// Tasks restored.
    pub restored: Vec<TaskHandle>,
    /// Tasks that could not be restored, with the reason.
    pub failed: Vec<(TaskHandle, MutationError)>,
}

// =============================================================================
// In-flight Guard
// =============================================================================

type InFlightSet = Arc<Mutex<HashSet<OverlayKey>>>;

/// Removes its key from the in-flight set when dropped.
struct InFlightGuard {
    in_flight: InFlightSet,
    key: OverlayKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

// =============================================================================
// Mutation Router
// =============================================================================

/// Dispatches mutations to the backend that owns each task.
#[derive(Clone)]
pub struct MutationRouter {
    store: StoreHandle,
    canonical: Arc<dyn CanonicalBackend>,
    legacy: Arc<dyn LegacyBackend>,
    notifier: Arc<dyn Notifier>,
    classifier: IdentityClassifier,
    table: OperationTable,
    config: SyncConfig,
    in_flight: InFlightSet,
}

impl std::fmt::Debug for MutationRouter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MutationRouter")
            .field("table", &self.table)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl MutationRouter {
    /// Creates a router with the default configuration and routes.
    #[must_use]
    pub fn new(
        store: StoreHandle,
        canonical: Arc<dyn CanonicalBackend>,
        legacy: Arc<dyn LegacyBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = SyncConfig::default();
        Self {
            store,
            canonical,
            legacy,
            notifier,
            classifier: config.classifier(),
            table: OperationTable::default(),
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns a new router using `config` for classification and
    /// notification durations.
    #[must_use]
    pub fn with_config(self, config: SyncConfig) -> Self {
        Self {
            classifier: config.classifier(),
            config,
            ..self
        }
    }

    /// Returns a new router with a custom operation table.
    #[must_use]
    pub fn with_table(self, table: OperationTable) -> Self {
        Self { table, ..self }
    }

    /// The store this router writes to.
    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Regime that owns `task` under the configured key prefix.
    #[must_use]
    pub fn regime_of(&self, task: &Task) -> Regime {
        self.classifier.classify(task)
    }

    /// Returns `true` if a mutation for `key` has not finished yet.
    #[must_use]
    pub fn is_in_flight(&self, key: &OverlayKey) -> bool {
        self.in_flight.lock().contains(key)
    }

    // -------------------------------------------------------------------------
    // Trash operations
    // -------------------------------------------------------------------------

    /// Takes a trashed task out of the trash.
    ///
    /// The task disappears from the deleted subset before the backend call
    /// starts and reappears only if the call fails.
    ///
    /// # Errors
    ///
    /// - [`MutationError::NotFound`] / [`MutationError::NotInTrash`] before
    ///   any state change
    /// - [`MutationError::AlreadyPending`] if the task is busy
    /// - [`MutationError::Backend`] after rollback
    pub async fn restore(&self, id: &TaskHandle) -> Result<(), MutationError> {
        let task = self.lookup(id)?;
        if !task.is_deleted() {
            return Err(MutationError::NotInTrash(task.id));
        }
        let regime = self.regime_of(&task);
        let key = OverlayKey::of(&task);

        match self.table.route(regime, Operation::Restore) {
            Route::CanonicalUpdate => {
                let task_id = backend_key(&task)?;
                let _guard = self.begin(&key)?;
                self.mark(&key, PendingKind::Restore);

                match self.canonical.update(&task_id, TaskPatch::restore()).await {
                    Ok(_) => {
                        tracing::info!(key = %key, regime = %regime, "Task restored");
                        self.store.write(|store| store.invalidate());
                        self.notifier.notify(
                            Notification::success("Task Restored", "Task has been restored.")
                                .with_action(NotificationAction::GoToTasks)
                                .with_duration(self.config.restore_notification_duration),
                        );
                        Ok(())
                    }
                    Err(error) => {
                        tracing::error!(key = %key, regime = %regime, error = %error, "Restore failed");
                        self.rollback(&key, PendingKind::Restore);
                        self.notifier
                            .notify(Notification::error("Error", "Failed to restore task."));
                        Err(error.into())
                    }
                }
            }
            Route::Legacy => {
                let _guard = self.begin(&key)?;
                self.mark(&key, PendingKind::Restore);

                match self.legacy.restore(&task.id) {
                    Ok(()) => {
                        tracing::info!(key = %key, regime = %regime, "Task restored");
                        self.store.write(|store| store.invalidate());
                        self.notifier.notify(
                            Notification::success("Task Restored", "Legacy task has been restored.")
                                .with_action(NotificationAction::GoToTasks)
                                .with_duration(self.config.restore_notification_duration),
                        );
                        Ok(())
                    }
                    Err(error) => {
                        tracing::error!(key = %key, regime = %regime, error = %error, "Restore failed");
                        self.rollback(&key, PendingKind::Restore);
                        Err(error.into())
                    }
                }
            }
            route => Err(self.unsupported(&task, Operation::Restore, route)),
        }
    }

    /// Removes a trashed task for good.
    ///
    /// The task leaves the materialized view before the call starts. Legacy
    /// tasks are refused with a notification and no call.
    ///
    /// # Errors
    ///
    /// - [`MutationError::NotFound`] / [`MutationError::NotInTrash`]
    /// - [`MutationError::Unsupported`] for legacy tasks
    /// - [`MutationError::AlreadyPending`] if the task is busy
    /// - [`MutationError::Backend`] after rollback
    pub async fn permanent_delete(&self, id: &TaskHandle) -> Result<(), MutationError> {
        let task = self.lookup(id)?;
        if !task.is_deleted() {
            return Err(MutationError::NotInTrash(task.id));
        }
        let regime = self.regime_of(&task);
        let key = OverlayKey::of(&task);

        match self.table.route(regime, Operation::PermanentDelete) {
            Route::CanonicalDelete => {
                let task_id = backend_key(&task)?;
                let _guard = self.begin(&key)?;
                self.mark(&key, PendingKind::PermanentDelete);

                match self.canonical.delete(&task_id).await {
                    Ok(()) => {
                        tracing::info!(key = %key, "Task permanently deleted");
                        self.store.write(|store| store.invalidate());
                        self.notifier.notify(
                            Notification::success("Task permanently deleted", "")
                                .with_duration(self.config.notification_duration),
                        );
                        Ok(())
                    }
                    Err(error) => {
                        tracing::error!(key = %key, error = %error, "Permanent delete failed");
                        self.rollback(&key, PendingKind::PermanentDelete);
                        self.notifier
                            .notify(Notification::error("Error", "Could not permanently delete."));
                        Err(error.into())
                    }
                }
            }
            route => {
                self.notifier.notify(Notification::error(
                    "Legacy tasks cannot be permanently deleted.",
                    "",
                ));
                Err(self.unsupported(&task, Operation::PermanentDelete, route))
            }
        }
    }

    /// Permanently deletes every canonical task in the trash.
    ///
    /// All targets leave the view up front and their deletes run
    /// concurrently. Only the keys whose delete failed are rolled back.
    /// Legacy tasks stay in the trash untouched.
    pub async fn empty_trash(&self) -> EmptyTrashReport {
        let trashed = self.store.read(|store| deleted_subset(store.materialized()));
        let mut report = EmptyTrashReport::default();
        if trashed.is_empty() {
            return report;
        }

        let mut targets = Vec::new();
        for task in &trashed {
            let key = OverlayKey::of(task);
            let regime = self.regime_of(task);
            let route = self.table.route(regime, Operation::PermanentDelete);
            let (Route::CanonicalDelete, Some(task_id)) = (route, task.task_id.clone()) else {
                tracing::debug!(key = %key, regime = %regime, "Left in trash");
                report.skipped.push(key);
                continue;
            };
            match self.begin(&key) {
                Ok(guard) => targets.push((key, task_id, guard)),
                Err(_) => {
                    tracing::debug!(key = %key, "Busy, left in trash");
                    report.skipped.push(key);
                }
            }
        }

        self.store.write(|store| {
            for (key, _, _) in &targets {
                store.mark_pending(key, PendingKind::PermanentDelete);
            }
        });

        let outcomes = join_all(targets.iter().map(|(key, task_id, _)| async move {
            (key.clone(), self.canonical.delete(task_id).await)
        }))
        .await;

        for (key, outcome) in outcomes {
            match outcome {
                Ok(()) => report.deleted.push(key),
                Err(error) => {
                    tracing::error!(key = %key, error = %error, "Permanent delete failed");
                    report.failed.push((key, error));
                }
            }
        }

        self.store.write(|store| {
            for (key, _) in &report.failed {
                store.clear_pending(key, PendingKind::PermanentDelete);
            }
            store.invalidate();
        });
        drop(targets);

        if report.is_complete() {
            tracing::info!(count = report.deleted.len(), "Trash emptied");
            self.notifier.notify(
                Notification::success(
                    "Trash emptied",
                    format!("{} task(s) permanently deleted.", report.deleted.len()),
                )
                .with_duration(self.config.notification_duration),
            );
        } else {
            tracing::warn!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "Trash only partially emptied"
            );
            self.notifier
                .notify(Notification::error("Error", "Failed to empty trash completely."));
        }
        report
    }

    /// Restores every task in the trash, each independently.
    pub async fn restore_all(&self) -> RestoreAllReport {
        let trashed = self.store.read(|store| deleted_subset(store.materialized()));
        let outcomes = join_all(trashed.iter().map(|task| async move {
            (task.id.clone(), self.restore(&task.id).await)
        }))
        .await;

        let mut report = RestoreAllReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.restored.push(id),
                Err(error) => report.failed.push((id, error)),
            }
        }
        report
    }

    // -------------------------------------------------------------------------
    // Assignment
    // -------------------------------------------------------------------------

    /// Sets the assignee of a task.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn assign(&self, id: &TaskHandle, person: Person) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        match self.route_for(&task, Operation::Assign) {
            Route::CanonicalUpdate => {
                self.patch_canonical(&task, Operation::Assign, PendingKind::Update, TaskPatch::assign(person))
                    .await
            }
            Route::Legacy => self.mirror_legacy(
                &task,
                Operation::Assign,
                |legacy, handle| legacy.assign(handle, &person),
                |record| record.assignee = Some(person.clone()),
            ),
            route => Err(self.unsupported(&task, Operation::Assign, route)),
        }
    }

    /// Clears the assignee of a task.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn unassign(&self, id: &TaskHandle) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        match self.route_for(&task, Operation::Unassign) {
            Route::CanonicalUpdate => {
                self.patch_canonical(&task, Operation::Unassign, PendingKind::Update, TaskPatch::unassign())
                    .await
            }
            Route::Legacy => self.mirror_legacy(
                &task,
                Operation::Unassign,
                |legacy, handle| legacy.unassign(handle),
                |record| record.assignee = None,
            ),
            route => Err(self.unsupported(&task, Operation::Unassign, route)),
        }
    }

    /// Appends a collaborator to a task.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn add_collaborator(
        &self,
        id: &TaskHandle,
        person: Person,
    ) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        match self.route_for(&task, Operation::AddCollaborator) {
            Route::CanonicalUpdate => {
                let mut collaborators = task.collaborators.clone();
                collaborators.push(person);
                self.patch_canonical(
                    &task,
                    Operation::AddCollaborator,
                    PendingKind::Update,
                    TaskPatch::collaborators(collaborators),
                )
                .await
            }
            Route::Legacy => self.mirror_legacy(
                &task,
                Operation::AddCollaborator,
                |legacy, handle| legacy.add_collaborator(handle, &person),
                |record| record.collaborators.push(person.clone()),
            ),
            route => Err(self.unsupported(&task, Operation::AddCollaborator, route)),
        }
    }

    /// Removes the collaborator at `index`.
    ///
    /// An index past the end leaves the task unchanged and makes no call.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn remove_collaborator(
        &self,
        id: &TaskHandle,
        index: usize,
    ) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        if index >= task.collaborators.len() {
            tracing::debug!(id = %task.id, index, "No collaborator at index");
            return Ok(task);
        }
        match self.route_for(&task, Operation::RemoveCollaborator) {
            Route::CanonicalUpdate => {
                let mut collaborators = task.collaborators.clone();
                collaborators.remove(index);
                self.patch_canonical(
                    &task,
                    Operation::RemoveCollaborator,
                    PendingKind::Update,
                    TaskPatch::collaborators(collaborators),
                )
                .await
            }
            Route::Legacy => self.mirror_legacy(
                &task,
                Operation::RemoveCollaborator,
                |legacy, handle| legacy.remove_collaborator(handle, index),
                |record| {
                    if index < record.collaborators.len() {
                        record.collaborators.remove(index);
                    }
                },
            ),
            route => Err(self.unsupported(&task, Operation::RemoveCollaborator, route)),
        }
    }

    // -------------------------------------------------------------------------
    // Active task operations
    // -------------------------------------------------------------------------

    /// Creates a task in the canonical backend and adds it to the snapshot.
    ///
    /// # Errors
    ///
    /// [`MutationError::Backend`] if the backend refuses the draft.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, MutationError> {
        let route = self.table.ops(Regime::Canonical).create;
        if route != Route::CanonicalCreate {
            return Err(MutationError::Unsupported {
                operation: Operation::Create,
                regime: Regime::Canonical,
            });
        }
        let key = OverlayKey::draft();
        let _guard = self.begin(&key)?;
        self.mark(&key, PendingKind::Create);

        let result = self.canonical.create(draft).await;
        self.store.write(|store| {
            store.clear_pending(&key, PendingKind::Create);
            if let Ok(record) = &result {
                if !store.append_if_absent(record.clone()) {
                    tracing::debug!(key = %key, "Created task already delivered by push");
                }
                store.invalidate();
            }
        });

        match result {
            Ok(record) => {
                tracing::info!(id = %record.id, "Task created");
                Ok(record)
            }
            Err(error) => {
                tracing::error!(error = %error, "Create failed");
                self.notifier
                    .notify(Notification::error("Error", "Failed to create task."));
                Err(error.into())
            }
        }
    }

    /// Applies `patch` to a canonical task.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn update(&self, id: &TaskHandle, patch: TaskPatch) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        match self.route_for(&task, Operation::Update) {
            Route::CanonicalUpdate => {
                self.patch_canonical(&task, Operation::Update, PendingKind::Update, patch)
                    .await
            }
            route => Err(self.unsupported(&task, Operation::Update, route)),
        }
    }

    /// Moves a canonical task into the trash on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn soft_delete(
        &self,
        id: &TaskHandle,
        actor: impl Into<String>,
    ) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        match self.route_for(&task, Operation::SoftDelete) {
            Route::CanonicalUpdate => {
                let patch = TaskPatch::soft_delete(Timestamp::now(), actor);
                self.patch_canonical(&task, Operation::SoftDelete, PendingKind::Delete, patch)
                    .await
            }
            route => Err(self.unsupported(&task, Operation::SoftDelete, route)),
        }
    }

    /// Archives a canonical task.
    ///
    /// # Errors
    ///
    /// See [`MutationError`].
    pub async fn archive(&self, id: &TaskHandle) -> Result<Task, MutationError> {
        let task = self.lookup(id)?;
        match self.route_for(&task, Operation::Archive) {
            Route::CanonicalUpdate => {
                self.patch_canonical(&task, Operation::Archive, PendingKind::Update, TaskPatch::archive())
                    .await
            }
            route => Err(self.unsupported(&task, Operation::Archive, route)),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lookup(&self, id: &TaskHandle) -> Result<Task, MutationError> {
        self.store
            .read(|store| store.find(id).cloned())
            .ok_or_else(|| {
                tracing::warn!(id = %id, "Task not found");
                MutationError::NotFound(id.clone())
            })
    }

    fn route_for(&self, task: &Task, operation: Operation) -> Route {
        self.table.route(self.regime_of(task), operation)
    }

    fn begin(&self, key: &OverlayKey) -> Result<InFlightGuard, MutationError> {
        if !self.in_flight.lock().insert(key.clone()) {
            tracing::debug!(key = %key, "Mutation already in flight");
            return Err(MutationError::AlreadyPending(key.clone()));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
        })
    }

    fn mark(&self, key: &OverlayKey, kind: PendingKind) {
        let superseded = self.store.write(|store| store.mark_pending(key, kind));
        if let Some(previous) = superseded {
            tracing::debug!(key = %key, kind = %kind, superseded = %previous, "Pending entry superseded");
        }
    }

    fn rollback(&self, key: &OverlayKey, kind: PendingKind) {
        self.store.write(|store| store.clear_pending(key, kind));
        tracing::warn!(key = %key, kind = %kind, "Optimistic entry rolled back");
    }

    fn unsupported(&self, task: &Task, operation: Operation, route: Route) -> MutationError {
        let regime = self.regime_of(task);
        tracing::warn!(id = %task.id, regime = %regime, operation = %operation, ?route, "Operation refused");
        MutationError::Unsupported { operation, regime }
    }

    /// Sends `patch` to the canonical backend and writes the returned record
    /// back into the snapshot.
    async fn patch_canonical(
        &self,
        task: &Task,
        operation: Operation,
        pending: PendingKind,
        patch: TaskPatch,
    ) -> Result<Task, MutationError> {
        let task_id = backend_key(task)?;
        let key = OverlayKey::of(task);
        let _guard = self.begin(&key)?;
        self.mark(&key, pending);

        let result = self.canonical.update(&task_id, patch).await;
        self.store.write(|store| {
            store.clear_pending(&key, pending);
            if let Ok(record) = &result {
                store.replace_by_task_id(record.clone());
                store.invalidate();
            }
        });

        match result {
            Ok(record) => {
                tracing::info!(key = %key, operation = %operation, "Task updated");
                Ok(record)
            }
            Err(error) => {
                tracing::error!(key = %key, operation = %operation, error = %error, "Update failed");
                self.notifier
                    .notify(Notification::error("Error", "Failed to update task."));
                Err(error.into())
            }
        }
    }

    /// Runs a legacy call and mirrors the same edit into the snapshot.
    fn mirror_legacy<C, E>(
        &self,
        task: &Task,
        operation: Operation,
        call: C,
        edit: E,
    ) -> Result<Task, MutationError>
    where
        C: FnOnce(&dyn LegacyBackend, &TaskHandle) -> Result<(), BackendError>,
        E: FnOnce(&mut Task),
    {
        let key = OverlayKey::of(task);
        let _guard = self.begin(&key)?;

        if let Err(error) = call(self.legacy.as_ref(), &task.id) {
            tracing::error!(key = %key, operation = %operation, error = %error, "Legacy call failed");
            return Err(error.into());
        }

        let record = self.store.write(|store| {
            store.edit(&task.id, edit);
            store.find_in_snapshot(&task.id).cloned()
        });
        tracing::info!(key = %key, operation = %operation, "Legacy task updated");
        record.ok_or_else(|| MutationError::NotFound(task.id.clone()))
    }
}

fn backend_key(task: &Task) -> Result<String, MutationError> {
    task.task_id
        .clone()
        .ok_or_else(|| MutationError::MissingKey(task.id.clone()))
}
