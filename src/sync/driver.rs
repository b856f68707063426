//! Sync driver.
//!
//! Polls the authoritative fetch on an interval and applies push messages in
//! arrival order. A fetch result always replaces the snapshot wholesale, so
//! between a push and the next fetch the last writer wins.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::infrastructure::{BackendError, CanonicalBackend, SyncConfig};
use crate::state::{StoreHandle, TaskStore};

use super::push::apply_raw;

/// Counters of one [`SyncDriver::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Authoritative fetches issued.
    pub fetches: usize,
    /// Fetches that failed.
    pub failed_fetches: usize,
    /// Push messages applied.
    pub pushes_applied: usize,
    /// Push messages ignored.
    pub pushes_ignored: usize,
}

/// Feeds one store from the canonical backend and the push channel.
#[derive(Clone)]
pub struct SyncDriver {
    store: StoreHandle,
    canonical: Arc<dyn CanonicalBackend>,
    config: SyncConfig,
}

impl std::fmt::Debug for SyncDriver {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncDriver {
    /// Creates a driver for `store`.
    #[must_use]
    pub fn new(store: StoreHandle, canonical: Arc<dyn CanonicalBackend>, config: SyncConfig) -> Self {
        Self {
            store,
            canonical,
            config,
        }
    }

    /// The store this driver feeds.
    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Runs one authoritative fetch and installs the result.
    ///
    /// On failure the previous snapshot keeps being served and the store
    /// reports the fetch as stalled.
    ///
    /// # Errors
    ///
    /// Returns the backend error after recording it in the store.
    pub async fn refresh(&self) -> Result<usize, BackendError> {
        self.store.write(TaskStore::begin_fetch);
        match self.canonical.fetch_all().await {
            Ok(tasks) => {
                let count = tasks.len();
                self.store.write(|store| store.replace_snapshot(tasks));
                tracing::debug!(count, "Snapshot replaced");
                Ok(count)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Authoritative fetch failed");
                self.store.write(|store| store.fetch_failed(error.to_string()));
                Err(error)
            }
        }
    }

    /// Drives the store until the push channel closes.
    ///
    /// The first fetch completes before any push message is read. Each
    /// applied push message triggers another fetch when `refetch_on_push` is
    /// set.
    pub async fn run(&self, mut messages: mpsc::Receiver<String>) -> RunSummary {
        let mut summary = RunSummary::default();
        self.fetch_counted(&mut summary).await;

        let poll_interval = self.config.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = interval.tick() => {
                    self.fetch_counted(&mut summary).await;
                }
                message = messages.recv() => {
                    let Some(raw) = message else {
                        break;
                    };
                    if apply_raw(&self.store, &raw).is_applied() {
                        summary.pushes_applied += 1;
                        if self.config.refetch_on_push {
                            self.fetch_counted(&mut summary).await;
                        }
                    } else {
                        summary.pushes_ignored += 1;
                    }
                }
            }
        }

        tracing::info!(?summary, "Push channel closed");
        summary
    }

    async fn fetch_counted(&self, summary: &mut RunSummary) {
        summary.fetches += 1;
        if self.refresh().await.is_err() {
            summary.failed_fetches += 1;
        }
    }
}
