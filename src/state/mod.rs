//! Client-side task state.
//!
//! The optimistic overlay, the pure reconciler and the store that owns the
//! snapshot and the materialized view.

pub mod overlay;
pub mod reconcile;
pub mod store;

pub use overlay::{OptimisticOverlay, PendingEntry, PendingKind};
pub use reconcile::{active, archived, by_status, deleted_subset, materialize, search, search_deleted};
pub use store::{FetchStatus, StoreHandle, TaskStore};
