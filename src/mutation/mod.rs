//! Mutation routing.
//!
//! The operation table and the router that dispatches user mutations to the
//! backend owning each task.

pub mod router;
pub mod table;

pub use router::{EmptyTrashReport, MutationError, MutationRouter, RestoreAllReport};
pub use table::{Operation, OperationTable, RegimeOps, Route};
