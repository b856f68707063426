//! Push channel messages.
//!
//! The push channel delivers `{"event": ..., "data": ...}` JSON objects in
//! arrival order. This module turns one raw message into a typed
//! [`PushMessage`]; transport and reconnection belong to the channel owner.

use serde::Deserialize;
use thiserror::Error;

use super::task::Task;

/// Errors raised while decoding a push message.
#[derive(Debug, Error)]
pub enum PushParseError {
    /// The message is not a JSON object with `event` and `data`.
    #[error("Malformed push message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload of a known event is not a task record.
    #[error("Invalid {kind} payload: {message}")]
    InvalidPayload {
        /// Event kind whose payload failed.
        kind: PushEventKind,
        /// Decoder message.
        message: String,
    },
}

/// Remote mutation kinds carried by the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    /// A task was created remotely.
    Created,
    /// A task was updated remotely.
    Updated,
    /// A task was removed remotely.
    Deleted,
}

impl PushEventKind {
    /// Resolves an event name. The `task_` prefixed names are aliases.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "created" | "task_created" => Some(Self::Created),
            "updated" | "task_updated" => Some(Self::Updated),
            "deleted" | "task_deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for PushEventKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(formatter, "created"),
            Self::Updated => write!(formatter, "updated"),
            Self::Deleted => write!(formatter, "deleted"),
        }
    }
}

/// A typed push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// What happened.
    pub kind: PushEventKind,
    /// The task as described by the remote side.
    pub task: Task,
}

impl PushEvent {
    /// Creates a `created` event.
    #[must_use]
    pub const fn created(task: Task) -> Self {
        Self {
            kind: PushEventKind::Created,
            task,
        }
    }

    /// Creates an `updated` event.
    #[must_use]
    pub const fn updated(task: Task) -> Self {
        Self {
            kind: PushEventKind::Updated,
            task,
        }
    }

    /// Creates a `deleted` event.
    #[must_use]
    pub const fn deleted(task: Task) -> Self {
        Self {
            kind: PushEventKind::Deleted,
            task,
        }
    }
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// A recognized event.
    Event(PushEvent),
    /// An event name this client does not know.
    Unknown {
        /// The unrecognized event name.
        event: String,
    },
}

#[derive(Deserialize)]
struct RawPushMessage {
    event: String,
    data: serde_json::Value,
}

/// Deleted payloads frequently carry only the key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    #[serde(default)]
    task_id: Option<String>,
}

/// Decodes one raw push message.
///
/// # Errors
///
/// Returns [`PushParseError`] if the message is not valid JSON, lacks
/// `event`/`data`, or carries a payload that does not describe a task.
pub fn parse_push_message(raw: &str) -> Result<PushMessage, PushParseError> {
    let message: RawPushMessage = serde_json::from_str(raw)?;
    let Some(kind) = PushEventKind::from_name(&message.event) else {
        return Ok(PushMessage::Unknown {
            event: message.event,
        });
    };

    let task = match serde_json::from_value::<Task>(message.data.clone()) {
        Ok(task) => task,
        Err(error) if kind == PushEventKind::Deleted => {
            let payload: DeletedPayload = serde_json::from_value(message.data).map_err(|_| {
                PushParseError::InvalidPayload {
                    kind,
                    message: error.to_string(),
                }
            })?;
            let mut task = Task::new(String::new(), String::new());
            task.task_id = payload.task_id;
            task
        }
        Err(error) => {
            return Err(PushParseError::InvalidPayload {
                kind,
                message: error.to_string(),
            });
        }
    };

    Ok(PushMessage::Event(PushEvent { kind, task }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("created", PushEventKind::Created)]
    #[case("task_created", PushEventKind::Created)]
    #[case("updated", PushEventKind::Updated)]
    #[case("task_updated", PushEventKind::Updated)]
    #[case("deleted", PushEventKind::Deleted)]
    #[case("task_deleted", PushEventKind::Deleted)]
    fn test_event_names(#[case] name: &str, #[case] expected: PushEventKind) {
        assert_eq!(PushEventKind::from_name(name), Some(expected));
    }

    #[rstest]
    fn test_parse_created_event() {
        let raw = r#"{"event":"created","data":{"id":1,"taskId":"T1","title":"New"}}"#;

        let message = parse_push_message(raw).unwrap();

        let PushMessage::Event(event) = message else {
            panic!("expected an event");
        };
        assert_eq!(event.kind, PushEventKind::Created);
        assert!(event.task.has_task_id("T1"));
    }

    #[rstest]
    fn test_parse_deleted_event_with_key_only_payload() {
        let raw = r#"{"event":"task_deleted","data":{"taskId":"T9"}}"#;

        let PushMessage::Event(event) = parse_push_message(raw).unwrap() else {
            panic!("expected an event");
        };

        assert_eq!(event.kind, PushEventKind::Deleted);
        assert!(event.task.has_task_id("T9"));
    }

    #[rstest]
    fn test_parse_unknown_event() {
        let raw = r#"{"event":"task_starred","data":{}}"#;
        assert_eq!(
            parse_push_message(raw).unwrap(),
            PushMessage::Unknown {
                event: "task_starred".to_string()
            }
        );
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"data":{}}"#)]
    #[case(r#"{"event":"created"}"#)]
    fn test_parse_malformed(#[case] raw: &str) {
        assert!(matches!(
            parse_push_message(raw),
            Err(PushParseError::Malformed(_))
        ));
    }

    #[rstest]
    fn test_parse_updated_without_task_payload() {
        let raw = r#"{"event":"updated","data":{"title":"no id"}}"#;
        assert!(matches!(
            parse_push_message(raw),
            Err(PushParseError::InvalidPayload {
                kind: PushEventKind::Updated,
                ..
            })
        ));
    }
}
