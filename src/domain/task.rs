//! Task domain model.
//!
//! This module contains the task record as it is exchanged with both
//! backends and with the push channel, plus the partial-update and creation
//! payloads used by the canonical backend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Process-local handle of a task.
///
/// Canonical records always carry a numeric handle. Legacy records may carry
/// any shape, so textual handles are kept verbatim instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskHandle {
    /// Numeric handle.
    Numeric(i64),
    /// Any non-numeric handle.
    Text(String),
}

impl TaskHandle {
    /// Returns `true` if the handle is of numeric type.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }

    /// Returns the numeric value, if any.
    #[must_use]
    pub const fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Numeric(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(value) => write!(formatter, "{value}"),
            Self::Text(value) => write!(formatter, "{value}"),
        }
    }
}

impl From<i64> for TaskHandle {
    fn from(value: i64) -> Self {
        Self::Numeric(value)
    }
}

impl From<&str> for TaskHandle {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TaskHandle {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
///
/// This provides a consistent timestamp type throughout the domain model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time as a `Timestamp`.
    ///
    /// **Note**: This reads the system clock.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns this timestamp shifted forward by `days`.
    #[must_use]
    pub fn plus_days(self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// A person that can be assigned to, or collaborate on, a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Short display name.
    pub name: String,
    /// Avatar initials or URL.
    pub avatar: String,
    /// Full name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl Person {
    /// Creates a person without a full name.
    #[must_use]
    pub fn new(name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: avatar.into(),
            full_name: None,
        }
    }

    /// Returns a new person with the given full name.
    #[must_use]
    pub fn with_full_name(self, full_name: impl Into<String>) -> Self {
        Self {
            full_name: Some(full_name.into()),
            ..self
        }
    }
}

// =============================================================================
// Task
// =============================================================================

/// The task record.
///
/// Field names follow the wire format (`taskId`, `updatedAt`, `deletedAt`,
/// ...). A task is soft-deleted when `deleted_at` is set; `archived` is an
/// independent axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Process-local handle.
    pub id: TaskHandle,
    /// Backend-issued textual key.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Title of the task.
    #[serde(default)]
    pub title: String,
    /// Project the task belongs to.
    #[serde(default)]
    pub project: Option<String>,
    /// Free-form workflow status (e.g. `todo`, `in-progress`).
    #[serde(default)]
    pub status: Option<String>,
    /// Last time the canonical backend touched this record.
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    /// Soft-delete instant.
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
    /// Who soft-deleted the task.
    #[serde(default)]
    pub deleted_by: Option<String>,
    /// Whether the task is archived.
    #[serde(default)]
    pub archived: bool,
    /// Current assignee.
    #[serde(default)]
    pub assignee: Option<Person>,
    /// Collaborators in display order.
    #[serde(default)]
    pub collaborators: Vec<Person>,
}

impl Task {
    /// Creates an active, unarchived task with the given handle and title.
    #[must_use]
    pub fn new(id: impl Into<TaskHandle>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_id: None,
            title: title.into(),
            project: None,
            status: None,
            updated_at: None,
            deleted_at: None,
            deleted_by: None,
            archived: false,
            assignee: None,
            collaborators: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Builder-style methods
    // -------------------------------------------------------------------------

    /// Returns a new task with the given backend key.
    #[must_use]
    pub fn with_task_id(self, task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..self
        }
    }

    /// Returns a new task with the given project.
    #[must_use]
    pub fn with_project(self, project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..self
        }
    }

    /// Returns a new task with the given status.
    #[must_use]
    pub fn with_status(self, status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..self
        }
    }

    /// Returns a new task with the given update instant.
    #[must_use]
    pub fn with_updated_at(self, timestamp: Timestamp) -> Self {
        Self {
            updated_at: Some(timestamp),
            ..self
        }
    }

    /// Returns a new task with the given assignee.
    #[must_use]
    pub fn with_assignee(self, person: Person) -> Self {
        Self {
            assignee: Some(person),
            ..self
        }
    }

    /// Returns a new task with the given collaborators.
    #[must_use]
    pub fn with_collaborators(self, collaborators: Vec<Person>) -> Self {
        Self {
            collaborators,
            ..self
        }
    }

    /// Returns a new task with the archived flag set.
    #[must_use]
    pub fn with_archived(self, archived: bool) -> Self {
        Self { archived, ..self }
    }

    /// Returns a new task marked as soft-deleted.
    #[must_use]
    pub fn soft_deleted(self, at: Timestamp, by: impl Into<String>) -> Self {
        Self {
            deleted_at: Some(at),
            deleted_by: Some(by.into()),
            ..self
        }
    }

    /// Returns a new task with both soft-delete markers cleared.
    #[must_use]
    pub fn with_deletion_cleared(self) -> Self {
        Self {
            deleted_at: None,
            deleted_by: None,
            ..self
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Returns `true` if the task is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `true` if the task is neither deleted nor archived.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_deleted() && !self.archived
    }

    /// Returns `true` if the task carries exactly this backend key.
    #[must_use]
    pub fn has_task_id(&self, key: &str) -> bool {
        self.task_id.as_deref() == Some(key)
    }

    /// Returns a new task with every field present in `patch` applied.
    #[must_use]
    pub fn apply_patch(self, patch: &TaskPatch) -> Self {
        let mut task = self;
        if let Some(title) = &patch.title {
            task.title.clone_from(title);
        }
        if let Some(project) = &patch.project {
            task.project.clone_from(project);
        }
        if let Some(status) = &patch.status {
            task.status.clone_from(status);
        }
        if let Some(assignee) = &patch.assignee {
            task.assignee.clone_from(assignee);
        }
        if let Some(collaborators) = &patch.collaborators {
            task.collaborators.clone_from(collaborators);
        }
        if let Some(archived) = patch.archived {
            task.archived = archived;
        }
        if let Some(deleted_at) = patch.deleted_at {
            task.deleted_at = deleted_at;
        }
        if let Some(deleted_by) = &patch.deleted_by {
            task.deleted_by.clone_from(deleted_by);
        }
        task
    }
}

// =============================================================================
// TaskPatch
// =============================================================================

/// Keeps `null` distinct from an absent field when deserializing.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update for the canonical backend.
///
/// Absent fields are left untouched. For nullable fields, `Some(None)`
/// clears the value and serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New project.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub project: Option<Option<String>>,
    /// New status.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<Option<String>>,
    /// New assignee.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee: Option<Option<Person>>,
    /// Replacement collaborator list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<Vec<Person>>,
    /// New archived flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    /// New soft-delete instant.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<Option<Timestamp>>,
    /// New soft-delete actor.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_by: Option<Option<String>>,
}

impl TaskPatch {
    /// The patch that takes a task out of the trash.
    #[must_use]
    pub fn restore() -> Self {
        Self {
            deleted_at: Some(None),
            deleted_by: Some(None),
            ..Self::default()
        }
    }

    /// The patch that moves a task into the trash.
    #[must_use]
    pub fn soft_delete(at: Timestamp, by: impl Into<String>) -> Self {
        Self {
            deleted_at: Some(Some(at)),
            deleted_by: Some(Some(by.into())),
            ..Self::default()
        }
    }

    /// The patch that archives a task.
    #[must_use]
    pub fn archive() -> Self {
        Self {
            archived: Some(true),
            ..Self::default()
        }
    }

    /// The patch that sets the assignee.
    #[must_use]
    pub fn assign(person: Person) -> Self {
        Self {
            assignee: Some(Some(person)),
            ..Self::default()
        }
    }

    /// The patch that clears the assignee.
    #[must_use]
    pub fn unassign() -> Self {
        Self {
            assignee: Some(None),
            ..Self::default()
        }
    }

    /// The patch that replaces the collaborator list.
    #[must_use]
    pub fn collaborators(collaborators: Vec<Person>) -> Self {
        Self {
            collaborators: Some(collaborators),
            ..Self::default()
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// TaskDraft
// =============================================================================

/// Payload for creating a task in the canonical backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Title of the new task.
    pub title: String,
    /// Project of the new task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Initial status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Initial assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Person>,
    /// Initial collaborators.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collaborators: Vec<Person>,
}

impl TaskDraft {
    /// Creates a draft with only a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            project: None,
            status: None,
            assignee: None,
            collaborators: Vec::new(),
        }
    }

    /// Returns a new draft with the given project.
    #[must_use]
    pub fn with_project(self, project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn deleted_task() -> Task {
        Task::new(7, "Write report")
            .with_task_id("T7")
            .soft_deleted(Timestamp::now(), "ana")
    }

    #[rstest]
    #[case(serde_json::json!(42), TaskHandle::Numeric(42))]
    #[case(serde_json::json!("legacy-9"), TaskHandle::Text("legacy-9".to_string()))]
    fn test_task_handle_deserializes_numeric_and_text(
        #[case] raw: serde_json::Value,
        #[case] expected: TaskHandle,
    ) {
        let handle: TaskHandle = serde_json::from_value(raw).unwrap();
        assert_eq!(handle, expected);
    }

    #[rstest]
    fn test_task_handle_display() {
        assert_eq!(TaskHandle::from(12).to_string(), "12");
        assert_eq!(TaskHandle::from("abc").to_string(), "abc");
    }

    #[rstest]
    fn test_task_deserializes_wire_format() {
        let raw = serde_json::json!({
            "id": 3,
            "taskId": "T3",
            "title": "Plan sprint",
            "project": "Core",
            "deletedAt": "2026-01-02T03:04:05Z",
            "deletedBy": "bo",
            "collaborators": [{"name": "Al", "avatar": "AL", "fullName": "Al Smith"}]
        });

        let task: Task = serde_json::from_value(raw).unwrap();

        assert_eq!(task.id, TaskHandle::Numeric(3));
        assert!(task.has_task_id("T3"));
        assert!(task.is_deleted());
        assert!(!task.archived);
        assert_eq!(task.collaborators[0].full_name.as_deref(), Some("Al Smith"));
    }

    #[rstest]
    fn test_task_is_active_excludes_deleted_and_archived() {
        assert!(Task::new(1, "a").is_active());
        assert!(!Task::new(1, "a").with_archived(true).is_active());
        assert!(!deleted_task().is_active());
    }

    #[rstest]
    fn test_with_deletion_cleared_clears_both_markers() {
        let task = deleted_task().with_deletion_cleared();
        assert!(task.deleted_at.is_none());
        assert!(task.deleted_by.is_none());
    }

    #[rstest]
    fn test_restore_patch_serializes_explicit_nulls() {
        let json = serde_json::to_value(TaskPatch::restore()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"deletedAt": null, "deletedBy": null})
        );
    }

    #[rstest]
    fn test_patch_deserialization_keeps_null_distinct_from_absent() {
        let patch: TaskPatch =
            serde_json::from_value(serde_json::json!({"deletedAt": null})).unwrap();
        assert_eq!(patch.deleted_at, Some(None));
        assert_eq!(patch.deleted_by, None);
    }

    #[rstest]
    fn test_apply_restore_patch() {
        let task = deleted_task().apply_patch(&TaskPatch::restore());
        assert!(!task.is_deleted());
        assert!(task.deleted_by.is_none());
        assert_eq!(task.title, "Write report");
    }

    #[rstest]
    fn test_apply_patch_leaves_absent_fields() {
        let task = Task::new(1, "a")
            .with_project("p")
            .with_assignee(Person::new("Al", "AL"));

        let patched = task.clone().apply_patch(&TaskPatch::archive());

        assert!(patched.archived);
        assert_eq!(patched.project, task.project);
        assert_eq!(patched.assignee, task.assignee);
    }

    #[rstest]
    fn test_empty_patch() {
        assert!(TaskPatch::default().is_empty());
        assert!(!TaskPatch::unassign().is_empty());
    }
}
