//! Device-local task store over a snapshot persistence backend.
//!
//! # Responsibility
//! - Keep each owner's collection in memory, loaded lazily from persistence.
//! - Write the full serialized collection back after every mutation.
//!
//! # Invariants
//! - A corrupt or unreadable payload loads as an empty collection.
//! - A failed save leaves the in-memory collection unchanged.
//! - Live queries see every committed mutation before the call returns.

use super::live::LiveQueries;
use super::persistence::SnapshotPersistence;
use super::{OrderBy, StoreError, StoreMode, StoreResult, TaskSnapshot, TaskStore};
use crate::identity::OwnerId;
use crate::model::draft::{NewTaskRecord, TaskChanges};
use crate::model::task::{Task, TaskId, Timestamp};
use crate::sync::SyncError;
use async_trait::async_trait;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;

const SNAPSHOT_KEY_PREFIX: &str = "tasks";

/// Local store; the sync layer assigns ids and creation times.
pub struct LocalTaskStore<P: SnapshotPersistence> {
    persistence: P,
    collections: Mutex<HashMap<OwnerId, Vec<Task>>>,
    live: LiveQueries,
}

impl<P: SnapshotPersistence> LocalTaskStore<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            persistence,
            collections: Mutex::new(HashMap::new()),
            live: LiveQueries::new(),
        }
    }

    /// Persistence key for `owner`'s collection.
    pub fn snapshot_key(owner: &OwnerId) -> String {
        format!("{SNAPSHOT_KEY_PREFIX}:{owner}")
    }

    /// Reads `owner`'s persisted collection, recovering from bad payloads.
    ///
    /// Never fails: read errors and malformed payloads are logged and yield
    /// an empty collection.
    pub fn load(&self, owner: &OwnerId) -> Vec<Task> {
        let key = Self::snapshot_key(owner);
        let payload = match self.persistence.load(&key) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(err) => {
                error!(
                    "event=snapshot_load module=store status=error owner={owner} error={err}"
                );
                return Vec::new();
            }
        };

        match decode_snapshot(&payload) {
            Ok(tasks) => {
                debug!(
                    "event=snapshot_load module=store status=ok owner={owner} count={}",
                    tasks.len()
                );
                tasks
            }
            Err(err) => {
                warn!(
                    "event=snapshot_load module=store status=recovered owner={owner} bytes={} error={err}",
                    payload.len()
                );
                Vec::new()
            }
        }
    }

    /// Applies `mutate` to `owner`'s collection and commits it only if the
    /// save succeeds.
    fn commit<T>(
        &self,
        owner: &OwnerId,
        mutate: impl FnOnce(&mut Vec<Task>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut collections = self.collections.lock();
        let current = collections
            .entry(owner.clone())
            .or_insert_with(|| self.load(owner));

        let mut next = current.clone();
        let outcome = mutate(&mut next)?;
        let payload = serde_json::to_string(&next)?;
        self.persistence.save(&Self::snapshot_key(owner), &payload)?;

        *current = next;
        self.live.publish(owner, current.as_slice());
        Ok(outcome)
    }
}

/// Parses a persisted collection payload.
///
/// # Errors
/// - `SyncError::MalformedPersisted` when the payload is not a task array.
pub fn decode_snapshot(payload: &str) -> Result<Vec<Task>, SyncError> {
    serde_json::from_str(payload).map_err(|err| SyncError::MalformedPersisted(err.to_string()))
}

#[async_trait]
impl<P: SnapshotPersistence> TaskStore for LocalTaskStore<P> {
    fn mode(&self) -> StoreMode {
        StoreMode::Local
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        order: OrderBy,
    ) -> StoreResult<watch::Receiver<TaskSnapshot>> {
        let mut collections = self.collections.lock();
        let tasks = collections
            .entry(owner.clone())
            .or_insert_with(|| self.load(owner));
        Ok(self.live.subscribe(owner, order, tasks))
    }

    async fn add(&self, owner: &OwnerId, record: NewTaskRecord) -> StoreResult<TaskId> {
        let id = record.id.clone().unwrap_or_else(TaskId::generate);
        let created_at = record.created_at.unwrap_or_else(Timestamp::now);
        let task = record.into_task(id.clone(), created_at);

        self.commit(owner, |tasks| {
            tasks.push(task);
            Ok(())
        })?;
        Ok(id)
    }

    async fn update(
        &self,
        owner: &OwnerId,
        id: &TaskId,
        changes: TaskChanges,
    ) -> StoreResult<()> {
        self.commit(owner, |tasks| {
            let task = tasks
                .iter_mut()
                .find(|task| &task.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            changes.apply_to(task);
            Ok(())
        })
    }

    async fn delete(&self, owner: &OwnerId, id: &TaskId) -> StoreResult<()> {
        self.commit(owner, |tasks| {
            let before = tasks.len();
            tasks.retain(|task| &task.id != id);
            if tasks.len() == before {
                return Err(StoreError::NotFound(id.clone()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_snapshot, LocalTaskStore};
    use crate::identity::OwnerId;
    use crate::model::draft::TaskDraft;
    use crate::model::task::Priority;
    use crate::store::{MemoryPersistence, SnapshotPersistence};
    use crate::sync::SyncError;

    #[test]
    fn decode_snapshot_flags_malformed_payloads() {
        assert!(matches!(
            decode_snapshot("{not json"),
            Err(SyncError::MalformedPersisted(_))
        ));
        assert!(decode_snapshot("[]").expect("decode snapshot").is_empty());
    }

    #[test]
    fn load_recovers_from_corrupt_payload() {
        let owner = OwnerId::device();
        let persistence = MemoryPersistence::new()
            .with_entry(LocalTaskStore::<MemoryPersistence>::snapshot_key(&owner), "{not json");
        let store = LocalTaskStore::new(persistence);
        assert!(store.load(&owner).is_empty());
    }

    #[test]
    fn commit_persists_full_collection() {
        let owner = OwnerId::new("alice").expect("valid owner id");
        let store = LocalTaskStore::new(MemoryPersistence::new());
        let record = TaskDraft::new("Buy milk", Priority::Low)
            .normalize()
            .expect("normalize input");
        let task = record.into_task("t-1".into(), crate::model::task::Timestamp::now());

        store
            .commit(&owner, |tasks| {
                tasks.push(task);
                Ok(())
            })
            .expect("commit");

        let key = LocalTaskStore::<MemoryPersistence>::snapshot_key(&owner);
        let payload = store
            .persistence
            .load(&key)
            .expect("load snapshot")
            .expect("snapshot present");
        assert_eq!(decode_snapshot(&payload).expect("decode snapshot").len(), 1);
    }
}
