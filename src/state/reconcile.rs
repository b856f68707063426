//! Reconciliation of the authoritative snapshot with the optimistic overlay.
//!
//! Everything here is a pure function of its inputs, so the view can be
//! recomputed after every change and tested without timers or network.

use crate::domain::{OverlayKey, Task};

use super::overlay::{OptimisticOverlay, PendingKind};

/// Produces the materialized task list.
///
/// - restore-pending tasks appear with their soft-delete markers cleared;
/// - permanent-delete-pending tasks are left out;
/// - every other task is copied as is, in snapshot order.
#[must_use]
pub fn materialize(snapshot: &[Task], overlay: &OptimisticOverlay) -> Vec<Task> {
    if overlay.is_empty() {
        return snapshot.to_vec();
    }

    snapshot
        .iter()
        .filter_map(|task| {
            let key = OverlayKey::of(task);
            if overlay.is_pending(&key, PendingKind::PermanentDelete) {
                None
            } else if overlay.is_pending(&key, PendingKind::Restore) {
                Some(task.clone().with_deletion_cleared())
            } else {
                Some(task.clone())
            }
        })
        .collect()
}

/// Tasks of the materialized view that are in the trash.
#[must_use]
pub fn deleted_subset(materialized: &[Task]) -> Vec<Task> {
    materialized
        .iter()
        .filter(|task| task.is_deleted())
        .cloned()
        .collect()
}

/// Filters `tasks` by a case-insensitive substring of title, project or key.
///
/// A blank term returns every task.
#[must_use]
pub fn search(tasks: &[Task], term: &str) -> Vec<Task> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return tasks.to_vec();
    }
    tasks
        .iter()
        .filter(|task| matches_search(task, &needle))
        .cloned()
        .collect()
}

fn matches_search(task: &Task, needle: &str) -> bool {
    [
        Some(task.title.as_str()),
        task.project.as_deref(),
        task.task_id.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Deleted subset of the materialized view, filtered by `term`.
#[must_use]
pub fn search_deleted(materialized: &[Task], term: &str) -> Vec<Task> {
    search(&deleted_subset(materialized), term)
}

/// Tasks that are neither deleted nor archived.
#[must_use]
pub fn active(materialized: &[Task]) -> Vec<Task> {
    materialized
        .iter()
        .filter(|task| task.is_active())
        .cloned()
        .collect()
}

/// Archived tasks that are not in the trash.
#[must_use]
pub fn archived(materialized: &[Task]) -> Vec<Task> {
    materialized
        .iter()
        .filter(|task| task.archived && !task.is_deleted())
        .cloned()
        .collect()
}

/// Active tasks whose status equals `status`.
#[must_use]
pub fn by_status(materialized: &[Task], status: &str) -> Vec<Task> {
    materialized
        .iter()
        .filter(|task| task.is_active() && task.status.as_deref() == Some(status))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use rstest::{fixture, rstest};

    #[fixture]
    fn snapshot() -> Vec<Task> {
        vec![
            Task::new(1, "Alpha")
                .with_task_id("T100")
                .with_project("Apollo")
                .soft_deleted(Timestamp::now(), "ana"),
            Task::new(2, "Beta")
                .with_task_id("T200")
                .soft_deleted(Timestamp::now(), "bo"),
            Task::new(3, "Gamma").with_task_id("T300").with_status("todo"),
            Task::new(4, "Delta")
                .with_task_id("T400")
                .with_archived(true),
        ]
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.title.as_str()).collect()
    }

    #[rstest]
    fn test_materialize_without_overlay_is_identity(snapshot: Vec<Task>) {
        assert_eq!(materialize(&snapshot, &OptimisticOverlay::new()), snapshot);
    }

    #[rstest]
    fn test_restore_pending_clears_markers(snapshot: Vec<Task>) {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&OverlayKey::new("1"), PendingKind::Restore);

        let view = materialize(&snapshot, &overlay);

        assert!(!view[0].is_deleted());
        assert!(view[0].deleted_by.is_none());
        assert_eq!(titles(&deleted_subset(&view)), vec!["Beta"]);
    }

    #[rstest]
    fn test_permanent_delete_pending_excludes(snapshot: Vec<Task>) {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&OverlayKey::new("2"), PendingKind::PermanentDelete);

        let view = materialize(&snapshot, &overlay);

        assert_eq!(titles(&view), vec!["Alpha", "Gamma", "Delta"]);
    }

    #[rstest]
    fn test_other_kinds_do_not_alter_view(snapshot: Vec<Task>) {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&OverlayKey::new("3"), PendingKind::Update);
        overlay.mark_pending(&OverlayKey::new("1"), PendingKind::Delete);

        assert_eq!(materialize(&snapshot, &overlay), snapshot);
    }

    #[rstest]
    fn test_materialize_is_idempotent(snapshot: Vec<Task>) {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&OverlayKey::new("1"), PendingKind::Restore);
        overlay.mark_pending(&OverlayKey::new("2"), PendingKind::PermanentDelete);

        let once = materialize(&snapshot, &overlay);
        let twice = materialize(&once, &overlay);

        assert_eq!(once, twice);
    }

    #[rstest]
    #[case("alp", vec!["Alpha"])]
    #[case("ALP", vec!["Alpha"])]
    #[case("apollo", vec!["Alpha"])]
    #[case("t200", vec!["Beta"])]
    #[case("T", vec!["Alpha", "Beta"])]
    #[case("   ", vec!["Alpha", "Beta"])]
    #[case("zzz", vec![])]
    fn test_search_deleted(snapshot: Vec<Task>, #[case] term: &str, #[case] expected: Vec<&str>) {
        assert_eq!(titles(&search_deleted(&snapshot, term)), expected);
    }

    #[rstest]
    fn test_partitions(snapshot: Vec<Task>) {
        assert_eq!(titles(&active(&snapshot)), vec!["Gamma"]);
        assert_eq!(titles(&archived(&snapshot)), vec!["Delta"]);
        assert_eq!(titles(&by_status(&snapshot, "todo")), vec!["Gamma"]);
        assert!(by_status(&snapshot, "done").is_empty());
    }
}
