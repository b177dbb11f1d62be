//! Task store capability and its implementations.
//!
//! # Responsibility
//! - Define the owner-scoped document contract the sync layer talks to.
//! - Provide a local snapshot-backed store and a SQLite document store.
//!
//! # Invariants
//! - Every call is scoped by `OwnerId`; one owner never sees another's tasks.
//! - `subscribe` delivers the full collection in the requested order on
//!   every change. Dropping the receiver unsubscribes.
//! - Unknown ids surface as `StoreError::NotFound`; callers decide whether
//!   that is fatal.

use crate::db::DbError;
use crate::identity::OwnerId;
use crate::model::draft::{NewTaskRecord, TaskChanges};
use crate::model::task::{Task, TaskId};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

pub mod document;
pub mod live;
pub mod local;
pub mod persistence;

pub use document::SqliteDocumentStore;
pub use local::LocalTaskStore;
pub use persistence::{
    JsonFilePersistence, MemoryPersistence, PersistenceError, SnapshotPersistence,
    SqlitePersistence,
};

/// Immutable view of one owner's collection, shared with readers.
pub type TaskSnapshot = Arc<Vec<Task>>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Which persistence strategy sits behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Device-local storage; the sync layer assigns ids and timestamps.
    Local,
    /// Document database; the store assigns ids and timestamps.
    Remote,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
    CreatedAt,
    DueDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering requested by a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Direction,
}

impl OrderBy {
    /// Newest first; the order the sync layer subscribes with.
    pub const CREATED_AT_DESC: OrderBy = OrderBy {
        field: OrderField::CreatedAt,
        direction: Direction::Descending,
    };

    /// Sorts tasks given in insertion order.
    ///
    /// Equal keys keep the most recently inserted task first when descending
    /// and the oldest first when ascending. Tasks without a due date sort
    /// last in both directions.
    pub fn sort(self, tasks: &mut Vec<Task>) {
        if self.direction == Direction::Descending {
            tasks.reverse();
        }
        tasks.sort_by(|left, right| self.compare(left, right));
    }

    fn compare(self, left: &Task, right: &Task) -> Ordering {
        let ordering = match self.field {
            OrderField::CreatedAt => left.created_at.cmp(&right.created_at),
            OrderField::DueDate => match (left.due_date, right.due_date) {
                (Some(l), Some(r)) => l.cmp(&r),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

/// Store-level failure.
#[derive(Debug)]
pub enum StoreError {
    NotFound(TaskId),
    Db(DbError),
    Persistence(PersistenceError),
    Serialization(String),
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::Serialization(message) => write!(f, "task serialization failed: {message}"),
            Self::Unavailable(message) => write!(f, "task store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<PersistenceError> for StoreError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// Owner-scoped task document capability.
#[async_trait]
pub trait TaskStore: Send + Sync {
    fn mode(&self) -> StoreMode;

    /// Opens a live view of `owner`'s collection.
    ///
    /// The receiver holds the current collection immediately.
    async fn subscribe(
        &self,
        owner: &OwnerId,
        order: OrderBy,
    ) -> StoreResult<watch::Receiver<TaskSnapshot>>;

    /// Persists a new task and returns its id.
    ///
    /// Local stores keep a pre-assigned `id`/`created_at`; remote stores
    /// always assign their own.
    async fn add(&self, owner: &OwnerId, record: NewTaskRecord) -> StoreResult<TaskId>;

    async fn update(&self, owner: &OwnerId, id: &TaskId, changes: TaskChanges)
        -> StoreResult<()>;

    async fn delete(&self, owner: &OwnerId, id: &TaskId) -> StoreResult<()>;
}
