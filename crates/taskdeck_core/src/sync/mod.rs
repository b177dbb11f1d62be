//! Identity-scoped task synchronization.
//!
//! # Responsibility
//! - Bind the active identity to exactly one store subscription.
//! - Expose the reactive read model and the mutation API.
//! - Map store failures to caller-facing `SyncError`s.

pub mod error;
mod task_sync;

pub use error::{SyncError, SyncResult};
pub use task_sync::TaskSync;
