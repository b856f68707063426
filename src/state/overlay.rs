//! Optimistic overlay.
//!
//! An in-memory ledger of local mutations whose backend outcome is not yet
//! known (or not yet reflected in the authoritative snapshot). It only hides
//! latency; nothing here outlives the process.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::domain::{OverlayKey, Timestamp};

/// Kind of a pending local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// Taking a task out of the trash.
    Restore,
    /// Removing a trashed task for good.
    PermanentDelete,
    /// Creating a task.
    Create,
    /// Updating a task.
    Update,
    /// Moving an active task into the trash.
    Delete,
}

impl PendingKind {
    /// The kind that a pending entry of this kind supersedes, if any.
    #[must_use]
    pub const fn opposite(self) -> Option<Self> {
        match self {
            Self::Restore => Some(Self::PermanentDelete),
            Self::PermanentDelete => Some(Self::Restore),
            Self::Create | Self::Update | Self::Delete => None,
        }
    }

    /// Returns `true` for the kinds that alter materialization.
    #[must_use]
    pub const fn suppresses(self) -> bool {
        matches!(self, Self::Restore | Self::PermanentDelete)
    }
}

impl std::fmt::Display for PendingKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Restore => "restore",
            Self::PermanentDelete => "permanent-delete",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        formatter.write_str(name)
    }
}

/// One pending entry as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEntry {
    /// Key of the affected task.
    pub key: OverlayKey,
    /// What is pending.
    pub kind: PendingKind,
    /// When the intent was recorded.
    pub marked_at: Timestamp,
}

/// Ledger of pending local mutations, keyed by task identity.
///
/// Restore and permanent-delete entries are mutually exclusive per key.
#[derive(Debug, Clone, Default)]
pub struct OptimisticOverlay {
    entries: HashMap<OverlayKey, BTreeMap<PendingKind, Timestamp>>,
}

impl OptimisticOverlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records intent for `key`, stamped with the current time.
    ///
    /// Returns the opposite kind if a pending instance of it was superseded.
    pub fn mark_pending(&mut self, key: &OverlayKey, kind: PendingKind) -> Option<PendingKind> {
        self.mark_pending_at(key, kind, Timestamp::now())
    }

    /// Records intent for `key` with an explicit timestamp.
    pub fn mark_pending_at(
        &mut self,
        key: &OverlayKey,
        kind: PendingKind,
        marked_at: Timestamp,
    ) -> Option<PendingKind> {
        let kinds = self.entries.entry(key.clone()).or_default();
        let superseded = kind
            .opposite()
            .filter(|opposite| kinds.remove(opposite).is_some());
        kinds.insert(kind, marked_at);
        superseded
    }

    /// Removes the entry for `key` and `kind`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn clear_pending(&mut self, key: &OverlayKey, kind: PendingKind) -> bool {
        let Some(kinds) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = kinds.remove(&kind).is_some();
        if kinds.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Returns `true` if `kind` is pending for `key`.
    #[must_use]
    pub fn is_pending(&self, key: &OverlayKey, kind: PendingKind) -> bool {
        self.entries
            .get(key)
            .is_some_and(|kinds| kinds.contains_key(&kind))
    }

    /// Returns `true` if a restore or permanent delete is pending for `key`.
    #[must_use]
    pub fn is_suppressed(&self, key: &OverlayKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|kinds| kinds.keys().any(|kind| kind.suppresses()))
    }

    /// Returns the pending kinds for `key` in a stable order.
    #[must_use]
    pub fn pending_kinds(&self, key: &OverlayKey) -> Vec<PendingKind> {
        self.entries
            .get(key)
            .map(|kinds| kinds.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Returns every pending entry, sorted by key then kind.
    #[must_use]
    pub fn entries(&self) -> Vec<PendingEntry> {
        let mut entries: Vec<PendingEntry> = self
            .entries
            .iter()
            .flat_map(|(key, kinds)| {
                kinds.iter().map(|(kind, marked_at)| PendingEntry {
                    key: key.clone(),
                    kind: *kind,
                    marked_at: *marked_at,
                })
            })
            .collect();
        entries.sort_by(|left, right| (&left.key, left.kind).cmp(&(&right.key, right.kind)));
        entries
    }

    /// Number of pending entries across all keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn key(value: &str) -> OverlayKey {
        OverlayKey::new(value)
    }

    #[rstest]
    fn test_mark_and_clear() {
        let mut overlay = OptimisticOverlay::new();

        assert_eq!(overlay.mark_pending(&key("1"), PendingKind::Restore), None);
        assert!(overlay.is_pending(&key("1"), PendingKind::Restore));
        assert!(overlay.is_suppressed(&key("1")));

        assert!(overlay.clear_pending(&key("1"), PendingKind::Restore));
        assert!(!overlay.clear_pending(&key("1"), PendingKind::Restore));
        assert!(overlay.is_empty());
    }

    #[rstest]
    #[case(PendingKind::Restore, PendingKind::PermanentDelete)]
    #[case(PendingKind::PermanentDelete, PendingKind::Restore)]
    fn test_trash_kinds_supersede_each_other(
        #[case] first: PendingKind,
        #[case] second: PendingKind,
    ) {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&key("1"), first);

        let superseded = overlay.mark_pending(&key("1"), second);

        assert_eq!(superseded, Some(first));
        assert_eq!(overlay.pending_kinds(&key("1")), vec![second]);
    }

    #[rstest]
    #[case(PendingKind::Create)]
    #[case(PendingKind::Update)]
    #[case(PendingKind::Delete)]
    fn test_non_trash_kinds_do_not_suppress(#[case] kind: PendingKind) {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&key("1"), kind);

        assert!(overlay.is_pending(&key("1"), kind));
        assert!(!overlay.is_suppressed(&key("1")));
    }

    #[rstest]
    fn test_kinds_coexist_per_key() {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&key("1"), PendingKind::Update);
        overlay.mark_pending(&key("1"), PendingKind::Restore);

        assert_eq!(overlay.len(), 2);
        assert_eq!(
            overlay.pending_kinds(&key("1")),
            vec![PendingKind::Restore, PendingKind::Update]
        );

        overlay.clear_pending(&key("1"), PendingKind::Update);
        assert!(overlay.is_suppressed(&key("1")));
    }

    #[rstest]
    fn test_entries_are_sorted() {
        let mut overlay = OptimisticOverlay::new();
        overlay.mark_pending(&key("b"), PendingKind::Restore);
        overlay.mark_pending(&key("a"), PendingKind::PermanentDelete);

        let keys: Vec<String> = overlay
            .entries()
            .into_iter()
            .map(|entry| entry.key.to_string())
            .collect();

        assert_eq!(keys, vec!["a", "b"]);
    }
}
