//! Infrastructure layer.
//!
//! Backend and notifier contracts, their in-memory implementations, and the
//! environment-driven configuration.

pub mod backend;
pub mod config;
pub mod in_memory;

pub use backend::{
    BackendError, CanonicalBackend, LegacyBackend, Notification, NotificationAction,
    NotificationLevel, Notifier, TracingNotifier,
};
pub use config::{ConfigError, EnvParseError, SyncConfig};
pub use in_memory::{
    BackendCall, InMemoryCanonicalBackend, InMemoryLegacyBackend, RecordedCall,
    RecordingNotifier,
};
