//! # task-view-sync
//!
//! Client-side task state reconciliation with a soft-delete lifecycle.
//!
//! ## Overview
//!
//! A task view is fed from three sources at once: a periodic authoritative
//! fetch, push events describing remote mutations, and local optimistic
//! mutations that have not been confirmed yet. This crate merges them into
//! one consistent view and routes every mutation to the backend that owns
//! the task.
//!
//! - **Domain**: task records, identity regimes, push messages
//! - **State**: optimistic overlay, pure reconciler, owned task store
//! - **Sync**: push-event applier and the polling driver
//! - **Mutation**: operation table and router with rollback semantics
//! - **Trash**: deleted subset, busy flags, restore and permanent delete
//!
//! ## Example
//!
//! ```rust
//! use task_view_sync::prelude::*;
//!
//! let mut overlay = OptimisticOverlay::new();
//! let snapshot = vec![
//!     Task::new(1, "Alpha")
//!         .with_task_id("T1")
//!         .soft_deleted(Timestamp::now(), "ana"),
//! ];
//!
//! overlay.mark_pending(&OverlayKey::new("1"), PendingKind::Restore);
//! let view = materialize(&snapshot, &overlay);
//!
//! assert!(deleted_subset(&view).is_empty());
//! assert_eq!(classify(&snapshot[0]), Regime::Canonical);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod domain;
pub mod infrastructure;
pub mod mutation;
pub mod state;
pub mod sync;
pub mod trash;

/// Prelude module for convenient imports.
///
/// ```rust
/// use task_view_sync::prelude::*;
/// ```
pub mod prelude {
    pub use crate::domain::{
        IdentityClassifier, OverlayKey, Person, PushEvent, PushEventKind, Regime, Task,
        TaskDraft, TaskHandle, TaskPatch, Timestamp, classify,
    };
    pub use crate::infrastructure::{
        BackendError, CanonicalBackend, LegacyBackend, Notification, Notifier, SyncConfig,
    };
    pub use crate::mutation::{EmptyTrashReport, MutationError, MutationRouter, RestoreAllReport};
    pub use crate::state::{
        FetchStatus, OptimisticOverlay, PendingKind, StoreHandle, TaskStore, deleted_subset,
        materialize, search_deleted,
    };
    pub use crate::sync::{PushOutcome, SyncDriver};
    pub use crate::trash::TrashManager;
}
