//! Operation table.
//!
//! Maps each mutating operation to the backend path it takes for a given
//! [`Regime`]. The router consults this table instead of branching on the
//! regime at every call site.

use crate::domain::Regime;

/// A mutating operation the router can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Take a task out of the trash.
    Restore,
    /// Remove a trashed task for good.
    PermanentDelete,
    /// Set the assignee.
    Assign,
    /// Clear the assignee.
    Unassign,
    /// Append a collaborator.
    AddCollaborator,
    /// Remove a collaborator by position.
    RemoveCollaborator,
    /// Create a task.
    Create,
    /// Apply an arbitrary patch.
    Update,
    /// Move an active task into the trash.
    SoftDelete,
    /// Archive an active task.
    Archive,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Restore => "restore",
            Self::PermanentDelete => "permanent_delete",
            Self::Assign => "assign",
            Self::Unassign => "unassign",
            Self::AddCollaborator => "add_collaborator",
            Self::RemoveCollaborator => "remove_collaborator",
            Self::Create => "create",
            Self::Update => "update",
            Self::SoftDelete => "soft_delete",
            Self::Archive => "archive",
        };
        formatter.write_str(name)
    }
}

/// Backend path of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Canonical `create`.
    CanonicalCreate,
    /// Canonical `update` keyed by `taskId`.
    CanonicalUpdate,
    /// Canonical `delete` keyed by `taskId`.
    CanonicalDelete,
    /// The matching synchronous legacy call keyed by handle.
    Legacy,
    /// No backend supports the operation for this regime.
    Unsupported,
}

/// Routes of every operation for one regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeOps {
    /// Route of [`Operation::Restore`].
    pub restore: Route,
    /// Route of [`Operation::PermanentDelete`].
    pub permanent_delete: Route,
    /// Route shared by the four assignment operations.
    pub assignment: Route,
    /// Route of [`Operation::Create`].
    pub create: Route,
    /// Route of [`Operation::Update`], [`Operation::SoftDelete`] and
    /// [`Operation::Archive`].
    pub update: Route,
}

impl RegimeOps {
    /// Every operation through the canonical backend.
    #[must_use]
    pub const fn canonical() -> Self {
        Self {
            restore: Route::CanonicalUpdate,
            permanent_delete: Route::CanonicalDelete,
            assignment: Route::CanonicalUpdate,
            create: Route::CanonicalCreate,
            update: Route::CanonicalUpdate,
        }
    }

    /// Restore and assignment through the legacy backend; nothing else.
    #[must_use]
    pub const fn legacy() -> Self {
        Self {
            restore: Route::Legacy,
            permanent_delete: Route::Unsupported,
            assignment: Route::Legacy,
            create: Route::Unsupported,
            update: Route::Unsupported,
        }
    }

    /// Route of `operation`.
    #[must_use]
    pub const fn route(&self, operation: Operation) -> Route {
        match operation {
            Operation::Restore => self.restore,
            Operation::PermanentDelete => self.permanent_delete,
            Operation::Assign
            | Operation::Unassign
            | Operation::AddCollaborator
            | Operation::RemoveCollaborator => self.assignment,
            Operation::Create => self.create,
            Operation::Update | Operation::SoftDelete | Operation::Archive => self.update,
        }
    }
}

/// Operation routes indexed by [`Regime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTable {
    canonical: RegimeOps,
    legacy: RegimeOps,
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::new(RegimeOps::canonical(), RegimeOps::legacy())
    }
}

impl OperationTable {
    /// Creates a table from the per-regime routes.
    #[must_use]
    pub const fn new(canonical: RegimeOps, legacy: RegimeOps) -> Self {
        Self { canonical, legacy }
    }

    /// Routes of `regime`.
    #[must_use]
    pub const fn ops(&self, regime: Regime) -> &RegimeOps {
        match regime {
            Regime::Canonical => &self.canonical,
            Regime::Legacy => &self.legacy,
        }
    }

    /// Route of `operation` for `regime`.
    #[must_use]
    pub const fn route(&self, regime: Regime, operation: Operation) -> Route {
        self.ops(regime).route(operation)
    }
}
