//! Domain module for the task view.
//!
//! This module contains the task record, backend identity classification and
//! push channel messages.

pub mod event;
pub mod identity;
pub mod task;

pub use event::{PushEvent, PushEventKind, PushMessage, PushParseError, parse_push_message};
pub use identity::{DEFAULT_KEY_PREFIX, IdentityClassifier, OverlayKey, Regime, classify};
pub use task::{Person, Task, TaskDraft, TaskHandle, TaskPatch, Timestamp};
