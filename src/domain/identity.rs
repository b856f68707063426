//! Backend identity regimes.
//!
//! Two backends own tasks with incompatible key spaces. Which one owns a
//! given record is decided from the record's own fields every time it is
//! needed: a record's shape can change between its optimistic and its
//! confirmed state, so the result is never stored on the task.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::task::Task;

/// Prefix letter of canonical keys unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: char = 'T';

static DEFAULT_CLASSIFIER: LazyLock<IdentityClassifier> =
    LazyLock::new(|| IdentityClassifier::new(DEFAULT_KEY_PREFIX));

/// The backend identity regime that owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Keyed by `taskId` in the canonical backend.
    Canonical,
    /// Keyed by the numeric handle in the older backend.
    Legacy,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canonical => write!(formatter, "canonical"),
            Self::Legacy => write!(formatter, "legacy"),
        }
    }
}

/// Classifies tasks for one canonical key prefix.
#[derive(Debug, Clone)]
pub struct IdentityClassifier {
    pattern: Regex,
}

impl IdentityClassifier {
    /// Builds a classifier whose canonical keys are `prefix` followed by digits.
    #[must_use]
    pub fn new(prefix: char) -> Self {
        let source = format!(r"^{}\d+", regex::escape(&prefix.to_string()));
        let pattern =
            Regex::new(&source).expect("an escaped literal followed by \\d+ is a valid pattern");
        Self { pattern }
    }

    /// Returns `true` if `key` has the canonical shape.
    #[must_use]
    pub fn is_canonical_key(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }

    /// Decides which regime owns `task`.
    ///
    /// Canonical iff the key matches the pattern and the handle is numeric.
    /// Absent fields yield [`Regime::Legacy`].
    #[must_use]
    pub fn classify(&self, task: &Task) -> Regime {
        let keyed = task
            .task_id
            .as_deref()
            .is_some_and(|key| self.is_canonical_key(key));
        if keyed && task.id.is_numeric() {
            Regime::Canonical
        } else {
            Regime::Legacy
        }
    }
}

impl Default for IdentityClassifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}

/// Classifies `task` with the default key prefix.
#[must_use]
pub fn classify(task: &Task) -> Regime {
    DEFAULT_CLASSIFIER.classify(task)
}

// =============================================================================
// Overlay keys
// =============================================================================

/// Normalized identity used to key optimistic bookkeeping.
///
/// This is the stringified handle, so numeric `7` and textual `"7"` share
/// one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayKey(String);

impl OverlayKey {
    /// Creates a key from an already-normalized string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key of `task`.
    #[must_use]
    pub fn of(task: &Task) -> Self {
        Self(task.id.to_string())
    }

    /// Returns a fresh key for a record that does not exist yet.
    #[must_use]
    pub fn draft() -> Self {
        Self(format!("draft:{}", uuid::Uuid::new_v4()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OverlayKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&Task> for OverlayKey {
    fn from(task: &Task) -> Self {
        Self::of(task)
    }
}
