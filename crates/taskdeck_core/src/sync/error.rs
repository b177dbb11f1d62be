//! Errors surfaced by the task synchronization layer.

use crate::model::task::TaskId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// A remote-mode mutation was attempted while signed out.
    StoreUnavailable,
    /// The targeted task does not exist for the current owner.
    NotFound(TaskId),
    /// A persisted local payload failed to parse.
    MalformedPersisted(String),
    /// Connectivity, permission or persistence failure in the store.
    OperationFailed(StoreError),
    /// Date text that is neither RFC 3339 nor `YYYY-MM-DD`, or millis with no
    /// calendar form.
    InvalidDate(String),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable => write!(f, "task store unavailable: no signed-in user"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::MalformedPersisted(message) => {
                write!(f, "persisted tasks are malformed: {message}")
            }
            Self::OperationFailed(err) => write!(f, "task operation failed: {err}"),
            Self::InvalidDate(value) => write!(f, "unrecognized date value `{value}`"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OperationFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::OperationFailed(other),
        }
    }
}

impl SyncError {
    /// Stable machine-readable code for presentation-layer mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable => "store_unavailable",
            Self::NotFound(_) => "not_found",
            Self::MalformedPersisted(_) => "malformed_persisted",
            Self::OperationFailed(_) => "operation_failed",
            Self::InvalidDate(_) => "invalid_date",
        }
    }
}
