//! Core domain logic for TaskDeck.
//! This crate is the single source of truth for the current identity's tasks.

pub mod config;
pub mod db;
pub mod identity;
pub mod insights;
pub mod logging;
pub mod model;
pub mod store;
pub mod sync;

pub use config::{BackendKind, ConfigError, SyncConfig};
pub use identity::{Identity, IdentityHub, OwnerId};
pub use insights::{TaskFilter, TaskMetrics, TaskStats};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::draft::{
    normalize_tags, validate_draft, DateInput, DraftValidationError, FieldPatch, TaskDraft,
    TaskPatch,
};
pub use model::task::{Priority, Task, TaskId, TaskStatus, Timestamp};
pub use store::{StoreError, StoreMode, TaskSnapshot, TaskStore};
pub use sync::{SyncError, SyncResult, TaskSync};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
