//! Feeding the store from the outside world.

pub mod driver;
pub mod push;

pub use driver::{RunSummary, SyncDriver};
pub use push::{PushOutcome, apply_push_event, apply_raw};
