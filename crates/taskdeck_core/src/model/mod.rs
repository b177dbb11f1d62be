//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record and its identifiers.
//! - Define caller inputs (drafts, patches) and their normalized store forms.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Dates cross every boundary in the canonical `Timestamp` form.

pub mod draft;
pub mod task;
