//! Task view sync demo.
//!
//! Seeds an in-memory canonical backend, reads push messages as JSON lines
//! from stdin, and prints the resulting view and trash as JSON once stdin
//! closes.
//!
//! Lines that are not JSON are trash commands, applied once the first fetch
//! has landed:
//!
//! - `restore <id>`
//! - `purge <id>`
//! - `restore-all`
//! - `empty-trash`
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (e.g., `debug`, `task_view_sync=debug`)
//! - `TASK_SYNC_*`: see [`task_view_sync::infrastructure::config`]
//!
//! # Example
//!
//! ```text
//! echo '{"event":"task_created","data":{"id":4,"taskId":"T4","title":"Ship"}}' \
//!     | cargo run --bin task-view-sync
//! printf 'restore 3\nempty-trash\n' | cargo run --bin task-view-sync
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_view_sync::domain::{Person, Task, TaskHandle, Timestamp};
use task_view_sync::infrastructure::{
    InMemoryCanonicalBackend, InMemoryLegacyBackend, SyncConfig, TracingNotifier,
};
use task_view_sync::mutation::MutationRouter;
use task_view_sync::state::{FetchStatus, StoreHandle};
use task_view_sync::sync::{RunSummary, SyncDriver};
use task_view_sync::trash::TrashManager;

/// Capacity of the push channel between the stdin reader and the driver.
const PUSH_CHANNEL_CAPACITY: usize = 64;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    summary: RunSummary,
    fetch_status: FetchStatus,
    tasks: Vec<Task>,
    trash: Vec<Task>,
}

/// A trash command read from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Restore(TaskHandle),
    Purge(TaskHandle),
    RestoreAll,
    EmptyTrash,
}

impl Command {
    /// Parses a command line. JSON lines and unknown words are not commands.
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("restore", Some(id)) => Self::Restore(parse_handle(id)),
            ("purge", Some(id)) => Self::Purge(parse_handle(id)),
            ("restore-all", None) => Self::RestoreAll,
            ("empty-trash", None) => Self::EmptyTrash,
            _ => return None,
        };
        words.next().is_none().then_some(command)
    }

    async fn apply(self, trash: &TrashManager) {
        match self {
            Self::Restore(id) => {
                if let Err(error) = trash.restore(&id).await {
                    tracing::warn!(id = %id, %error, "Restore command failed");
                }
            }
            Self::Purge(id) => {
                if let Err(error) = trash.permanent_delete(&id).await {
                    tracing::warn!(id = %id, %error, "Purge command failed");
                }
            }
            Self::RestoreAll => {
                let report = trash.restore_all().await;
                tracing::info!(
                    restored = report.restored.len(),
                    failed = report.failed.len(),
                    "Restore-all command finished"
                );
            }
            Self::EmptyTrash => match trash.empty_trash().await {
                Some(report) => tracing::info!(
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    skipped = report.skipped.len(),
                    "Empty-trash command finished"
                ),
                None => tracing::info!("Nothing to empty"),
            },
        }
    }
}

fn parse_handle(raw: &str) -> TaskHandle {
    raw.parse::<i64>()
        .map_or_else(|_| TaskHandle::from(raw), TaskHandle::from)
}

/// Waits until the store has seen the outcome of its first fetch.
async fn first_fetch_landed(store: &StoreHandle) {
    let mut revisions = store.subscribe();
    let landed = revisions
        .wait_for(|_| {
            store.read(|store| {
                matches!(
                    store.fetch_status(),
                    FetchStatus::Ready { .. } | FetchStatus::Stalled { .. }
                )
            })
        })
        .await
        .is_ok();
    if !landed {
        tracing::warn!("Store closed before the first fetch");
    }
}

fn seed_tasks() -> Vec<Task> {
    let now = Timestamp::now();
    vec![
        Task::new(1, "Draft release notes")
            .with_task_id("T1")
            .with_project("Launch")
            .with_status("todo")
            .with_updated_at(now),
        Task::new(2, "Review onboarding flow")
            .with_task_id("T2")
            .with_project("Growth")
            .with_status("in-progress")
            .with_assignee(Person::new("Ana", "ana.png").with_full_name("Ana Ortiz"))
            .with_updated_at(now),
        Task::new(3, "Old landing page copy")
            .with_task_id("T3")
            .with_project("Launch")
            .with_updated_at(now)
            .soft_deleted(now.plus_days(-3), "Ana"),
    ]
}

fn main() {
    dotenvy::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");
    runtime.block_on(async_main());
}

async fn async_main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_view_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };
    tracing::info!(
        key_prefix = %config.key_prefix,
        poll_interval = ?config.poll_interval,
        refetch_on_push = config.refetch_on_push,
        "Configuration loaded"
    );

    let store = StoreHandle::default();
    let backend = Arc::new(InMemoryCanonicalBackend::with_tasks(seed_tasks()));
    let router = MutationRouter::new(
        store.clone(),
        backend.clone(),
        Arc::new(InMemoryLegacyBackend::new()),
        Arc::new(TracingNotifier),
    )
    .with_config(config.clone());
    let trash = TrashManager::new(router);
    let driver = SyncDriver::new(store.clone(), backend, config);

    let (sender, receiver) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
    let reader = async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match Command::parse(&line) {
                    Some(command) => {
                        first_fetch_landed(trash.router().store()).await;
                        command.apply(&trash).await;
                    }
                    None => {
                        if sender.send(line).await.is_err() {
                            break;
                        }
                    }
                },
                Ok(None) => break,
                Err(error) => {
                    tracing::error!(%error, "Failed to read stdin");
                    break;
                }
            }
        }
    };

    let ((), summary) = tokio::join!(reader, driver.run(receiver));

    let output = store.read(|store| Output {
        summary,
        fetch_status: store.fetch_status().clone(),
        tasks: store.materialized().to_vec(),
        trash: task_view_sync::state::deleted_subset(store.materialized()),
    });
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(error) => {
            tracing::error!(%error, "Failed to serialize output");
            std::process::exit(1);
        }
    }
}
