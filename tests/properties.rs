//! Property-based tests for classification and reconciliation.
//!
//! 1. **Stable classification**: classifying the same task twice gives the
//!    same regime, and canonical implies a numeric handle
//! 2. **Idempotent materialization**: `materialize(materialize(s, o), o)`
//!    equals `materialize(s, o)`
//! 3. **Order preservation**: the materialized view is a subsequence of the
//!    snapshot

use proptest::prelude::*;
use task_view_sync::domain::{OverlayKey, Regime, Task, TaskHandle, Timestamp, classify};
use task_view_sync::state::{OptimisticOverlay, PendingKind, materialize};

fn handle_strategy() -> impl Strategy<Value = TaskHandle> {
    prop_oneof![
        (0_i64..50).prop_map(TaskHandle::Numeric),
        "[a-zA-Z0-9-]{0,6}".prop_map(TaskHandle::Text),
    ]
}

fn task_strategy() -> impl Strategy<Value = Task> {
    (
        handle_strategy(),
        proptest::option::of("(T|X|t)?[0-9]{0,4}[a-z]{0,2}"),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(id, task_id, deleted, archived)| {
            let mut task = Task::new(id, "task").with_archived(archived);
            task.task_id = task_id;
            if deleted {
                task = task.soft_deleted(Timestamp::now(), "someone");
            }
            task
        })
}

fn kind_strategy() -> impl Strategy<Value = PendingKind> {
    prop_oneof![
        Just(PendingKind::Restore),
        Just(PendingKind::PermanentDelete),
        Just(PendingKind::Create),
        Just(PendingKind::Update),
        Just(PendingKind::Delete),
    ]
}

fn overlay_from(marks: &[(usize, PendingKind)], snapshot: &[Task]) -> OptimisticOverlay {
    let mut overlay = OptimisticOverlay::new();
    if snapshot.is_empty() {
        return overlay;
    }
    for (index, kind) in marks {
        let key = OverlayKey::of(&snapshot[index % snapshot.len()]);
        overlay.mark_pending(&key, *kind);
    }
    overlay
}

proptest! {
    #[test]
    fn prop_classify_is_stable(task in task_strategy()) {
        let first = classify(&task);
        prop_assert_eq!(first, classify(&task.clone()));
        if first == Regime::Canonical {
            prop_assert!(task.id.is_numeric());
            prop_assert!(task.task_id.as_deref().is_some_and(|key| key.starts_with('T')));
        }
    }

    #[test]
    fn prop_materialize_is_idempotent(
        snapshot in proptest::collection::vec(task_strategy(), 0..12),
        marks in proptest::collection::vec((any::<usize>(), kind_strategy()), 0..8),
    ) {
        let overlay = overlay_from(&marks, &snapshot);
        let once = materialize(&snapshot, &overlay);
        let twice = materialize(&once, &overlay);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_materialize_preserves_order(
        snapshot in proptest::collection::vec(task_strategy(), 0..12),
        marks in proptest::collection::vec((any::<usize>(), kind_strategy()), 0..8),
    ) {
        let overlay = overlay_from(&marks, &snapshot);
        let view = materialize(&snapshot, &overlay);

        let mut remaining = snapshot.iter();
        for task in &view {
            let found = remaining.any(|candidate| candidate.id == task.id);
            prop_assert!(found);
        }
    }
}
