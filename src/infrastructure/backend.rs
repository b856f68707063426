//! Backend traits.
//!
//! The two task backends and the notification sink are external
//! collaborators. This module fixes the narrow contracts the core consumes;
//! HTTP, serialization and toast rendering live behind them.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{Person, Task, TaskDraft, TaskHandle, TaskPatch};

// =============================================================================
// Backend Error
// =============================================================================

/// Errors that can occur during backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend does not know the referenced task.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The backend refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The backend could not be reached or failed internally.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Failure injected for testing purposes.
    #[error("Injected failure: {0}")]
    Injected(String),
}

// =============================================================================
// Canonical Backend
// =============================================================================

/// The canonical backend, keyed by `taskId`.
///
/// Every call is an asynchronous boundary; the returned futures borrow only
/// the backend itself.
pub trait CanonicalBackend: Send + Sync {
    /// Fetches the authoritative snapshot, including trashed tasks.
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<Task>, BackendError>>;

    /// Creates a task and returns the stored record.
    fn create(&self, draft: TaskDraft) -> BoxFuture<'_, Result<Task, BackendError>>;

    /// Applies `patch` to the task with `key` and returns the stored record.
    fn update(&self, key: &str, patch: TaskPatch) -> BoxFuture<'_, Result<Task, BackendError>>;

    /// Removes the task with `key` for good.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), BackendError>>;
}

// =============================================================================
// Legacy Backend
// =============================================================================

/// The older backend, keyed by the task handle.
///
/// Calls complete synchronously. There is no permanent-delete call.
pub trait LegacyBackend: Send + Sync {
    /// Sets the assignee.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend refuses the change.
    fn assign(&self, id: &TaskHandle, person: &Person) -> Result<(), BackendError>;

    /// Clears the assignee.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend refuses the change.
    fn unassign(&self, id: &TaskHandle) -> Result<(), BackendError>;

    /// Appends a collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend refuses the change.
    fn add_collaborator(&self, id: &TaskHandle, person: &Person) -> Result<(), BackendError>;

    /// Removes the collaborator at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend refuses the change.
    fn remove_collaborator(&self, id: &TaskHandle, index: usize) -> Result<(), BackendError>;

    /// Takes a task out of the trash.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend refuses the change.
    fn restore(&self, id: &TaskHandle) -> Result<(), BackendError>;
}

// =============================================================================
// Notifications
// =============================================================================

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Operation succeeded.
    Success,
    /// Operation failed or was refused.
    Error,
}

/// Follow-up action offered by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// Navigate to the active task list.
    GoToTasks,
}

/// A user-visible notification ("toast").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Headline.
    pub title: String,
    /// Body text, possibly empty.
    pub description: String,
    /// Optional follow-up action.
    pub action: Option<NotificationAction>,
    /// How long the notification stays visible.
    pub duration: Option<Duration>,
}

impl Notification {
    /// Creates a success notification.
    #[must_use]
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            description: description.into(),
            action: None,
            duration: None,
        }
    }

    /// Creates an error notification.
    #[must_use]
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            description: description.into(),
            action: None,
            duration: None,
        }
    }

    /// Returns a new notification offering `action`.
    #[must_use]
    pub fn with_action(self, action: NotificationAction) -> Self {
        Self {
            action: Some(action),
            ..self
        }
    }

    /// Returns a new notification with a display duration.
    #[must_use]
    pub fn with_duration(self, duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..self
        }
    }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    /// Shows `notification` to the user.
    fn notify(&self, notification: Notification);
}

/// Notifier that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => tracing::info!(
                title = %notification.title,
                description = %notification.description,
                "Notification"
            ),
            NotificationLevel::Error => tracing::warn!(
                title = %notification.title,
                description = %notification.description,
                "Notification"
            ),
        }
    }
}
