//! Common test helpers for integration tests.
//!
//! Builds a store, both in-memory backends and a recording notifier wired
//! into a router and a trash manager.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use std::sync::Arc;

use task_view_sync::domain::{Task, Timestamp};
use task_view_sync::infrastructure::{
    InMemoryCanonicalBackend, InMemoryLegacyBackend, RecordingNotifier,
};
use task_view_sync::mutation::MutationRouter;
use task_view_sync::state::{StoreHandle, TaskStore};
use task_view_sync::trash::TrashManager;

/// Everything a test needs to drive and observe the trash.
pub struct TestContext {
    pub store: StoreHandle,
    pub canonical: InMemoryCanonicalBackend,
    pub legacy: InMemoryLegacyBackend,
    pub notifier: RecordingNotifier,
    pub router: MutationRouter,
    pub trash: TrashManager,
}

impl TestContext {
    /// Handles of the deleted subset, in view order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.trash
            .deleted()
            .iter()
            .map(|task| task.id.to_string())
            .collect()
    }

    /// Handles of the materialized view, in view order.
    pub fn visible_ids(&self) -> Vec<String> {
        self.store
            .materialized()
            .iter()
            .map(|task| task.id.to_string())
            .collect()
    }

    /// Number of pending overlay entries.
    pub fn pending(&self) -> usize {
        self.store.read(|store| store.overlay().len())
    }
}

/// Builds a context whose store and canonical backend both hold `tasks`.
///
/// Only tasks with a `taskId` are seeded into the canonical backend.
pub fn context(tasks: Vec<Task>) -> TestContext {
    build(tasks, InMemoryCanonicalBackend::with_tasks)
}

/// Like [`context`], but canonical mutations wait for `canonical.release`.
pub fn held_context(tasks: Vec<Task>) -> TestContext {
    build(tasks, |seed| InMemoryCanonicalBackend::with_tasks(seed).held())
}

fn build(tasks: Vec<Task>, backend: impl FnOnce(Vec<Task>) -> InMemoryCanonicalBackend) -> TestContext {
    let seed = tasks
        .iter()
        .filter(|task| task.task_id.is_some())
        .cloned()
        .collect();
    let canonical = backend(seed);
    let legacy = InMemoryLegacyBackend::new();
    let notifier = RecordingNotifier::new();
    let store = StoreHandle::new(TaskStore::with_snapshot(tasks));
    let router = MutationRouter::new(
        store.clone(),
        Arc::new(canonical.clone()),
        Arc::new(legacy.clone()),
        Arc::new(notifier.clone()),
    );
    let trash = TrashManager::new(router.clone());
    TestContext {
        store,
        canonical,
        legacy,
        notifier,
        router,
        trash,
    }
}

/// A trashed canonical task `T<id>`.
pub fn trashed_canonical(id: i64, title: &str) -> Task {
    Task::new(id, title)
        .with_task_id(format!("T{id}"))
        .with_updated_at(Timestamp::now())
        .soft_deleted(Timestamp::now(), "ana")
}

/// A trashed legacy task with a textual handle.
pub fn trashed_legacy(id: &str, title: &str) -> Task {
    Task::new(id, title).soft_deleted(Timestamp::now(), "bo")
}

/// An active canonical task `T<id>`.
pub fn active_canonical(id: i64, title: &str) -> Task {
    Task::new(id, title)
        .with_task_id(format!("T{id}"))
        .with_updated_at(Timestamp::now())
}
