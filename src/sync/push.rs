//! Push-event applier.
//!
//! Turns push messages into incremental snapshot edits. Each message is
//! applied atomically under one store write; the view is re-materialized by
//! the store and the cached fetch is marked stale afterwards.

use serde::Serialize;

use crate::domain::{PushEvent, PushEventKind, PushMessage, parse_push_message};
use crate::state::StoreHandle;

/// What applying one push message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    /// A created task was appended.
    Appended,
    /// A created task duplicated an existing key and was dropped.
    Duplicate,
    /// An updated task replaced its entry.
    Replaced,
    /// This many entries were removed.
    Removed(usize),
    /// The event referenced a key the snapshot does not hold.
    UnknownKey,
    /// The payload carried no key to match on.
    MissingKey,
    /// The event name is not recognized.
    UnknownEvent,
    /// The message could not be decoded.
    Malformed,
}

impl PushOutcome {
    /// Returns `true` if the message was a recognized, well-formed event,
    /// whether or not it changed the snapshot.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        !matches!(self, Self::UnknownEvent | Self::Malformed)
    }
}

/// Applies a decoded push event.
pub fn apply_push_event(store: &StoreHandle, event: PushEvent) -> PushOutcome {
    let PushEvent { kind, task } = event;

    let outcome = store.write(|store| {
        let outcome = match (kind, task.task_id.clone()) {
            (PushEventKind::Created, _) => {
                if store.append_if_absent(task) {
                    PushOutcome::Appended
                } else {
                    PushOutcome::Duplicate
                }
            }
            (PushEventKind::Updated | PushEventKind::Deleted, None) => PushOutcome::MissingKey,
            (PushEventKind::Updated, Some(_)) => {
                if store.replace_by_task_id(task) {
                    PushOutcome::Replaced
                } else {
                    PushOutcome::UnknownKey
                }
            }
            (PushEventKind::Deleted, Some(key)) => match store.remove_by_task_id(&key) {
                0 => PushOutcome::UnknownKey,
                removed => PushOutcome::Removed(removed),
            },
        };
        store.invalidate();
        outcome
    });

    match outcome {
        PushOutcome::Duplicate => {
            tracing::warn!(kind = %kind, "Duplicate created event ignored");
        }
        PushOutcome::MissingKey => {
            tracing::warn!(kind = %kind, "Push payload without taskId ignored");
        }
        PushOutcome::UnknownKey => {
            tracing::debug!(kind = %kind, "Push event for unknown task");
        }
        _ => tracing::debug!(kind = %kind, ?outcome, "Push event applied"),
    }
    outcome
}

/// Decodes and applies one raw push message.
///
/// Unknown event names and malformed messages are logged and ignored.
pub fn apply_raw(store: &StoreHandle, raw: &str) -> PushOutcome {
    match parse_push_message(raw) {
        Ok(PushMessage::Event(event)) => apply_push_event(store, event),
        Ok(PushMessage::Unknown { event }) => {
            tracing::warn!(event = %event, "Unknown push event ignored");
            PushOutcome::UnknownEvent
        }
        Err(error) => {
            tracing::warn!(error = %error, "Malformed push message ignored");
            PushOutcome::Malformed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use crate::state::TaskStore;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> StoreHandle {
        StoreHandle::new(TaskStore::with_snapshot(vec![
            Task::new(1, "one").with_task_id("T1"),
            Task::new(2, "two").with_task_id("T2"),
        ]))
    }

    #[rstest]
    fn test_created_appends(store: StoreHandle) {
        let outcome = apply_push_event(&store, PushEvent::created(Task::new(3, "three").with_task_id("T3")));

        assert_eq!(outcome, PushOutcome::Appended);
        assert_eq!(store.materialized().len(), 3);
        assert!(store.read(TaskStore::is_stale));
    }

    #[rstest]
    fn test_created_duplicate_keeps_existing(store: StoreHandle) {
        let outcome = apply_push_event(&store, PushEvent::created(Task::new(9, "again").with_task_id("T1")));

        assert_eq!(outcome, PushOutcome::Duplicate);
        assert_eq!(store.snapshot()[0].title, "one");
        assert_eq!(store.snapshot().len(), 2);
    }

    #[rstest]
    fn test_deleted_removes(store: StoreHandle) {
        let outcome = apply_raw(&store, r#"{"event":"deleted","data":{"taskId":"T2"}}"#);

        assert_eq!(outcome, PushOutcome::Removed(1));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[rstest]
    fn test_updated_without_key_is_ignored(store: StoreHandle) {
        let outcome = apply_push_event(&store, PushEvent::updated(Task::new(1, "renamed")));

        assert_eq!(outcome, PushOutcome::MissingKey);
        assert_eq!(store.snapshot()[0].title, "one");
    }

    #[rstest]
    #[case(r#"{"event":"renamed","data":{}}"#, PushOutcome::UnknownEvent)]
    #[case("not json", PushOutcome::Malformed)]
    #[case(r#"{"event":"created","data":{"title":"no id"}}"#, PushOutcome::Malformed)]
    fn test_ignored_messages_change_nothing(
        store: StoreHandle,
        #[case] raw: &str,
        #[case] expected: PushOutcome,
    ) {
        let before = store.snapshot();
        let outcome = apply_raw(&store, raw);

        assert_eq!(outcome, expected);
        assert!(!outcome.is_applied());
        assert_eq!(store.snapshot(), before);
        assert!(!store.read(TaskStore::is_stale));
    }
}
