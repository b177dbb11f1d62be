#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskdeck_core::identity::{Identity, OwnerId};
use taskdeck_core::model::draft::{NewTaskRecord, TaskChanges};
use taskdeck_core::model::task::{Priority, Task, TaskId, TaskStatus, Timestamp};
use taskdeck_core::store::{
    MemoryPersistence, OrderBy, PersistenceError, SnapshotPersistence, StoreError, StoreMode,
    StoreResult, TaskSnapshot, TaskStore,
};
use tokio::sync::{watch, Notify};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn identity(owner: &str) -> Identity {
    Identity::new(OwnerId::new(owner).expect("valid owner id"))
}

pub fn owner(value: &str) -> OwnerId {
    OwnerId::new(value).expect("valid owner id")
}

pub fn task(id: &str, title: &str, created_at: i64) -> Task {
    Task {
        id: TaskId::from(id),
        title: title.to_string(),
        description: String::new(),
        priority: Priority::Medium,
        status: TaskStatus::Pending,
        start_date: None,
        due_date: None,
        completed_subtasks: 0,
        total_subtasks: 0,
        tags: Vec::new(),
        created_at: Timestamp::from_epoch_ms(created_at),
    }
}

pub fn ids(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|task| task.id.to_string()).collect()
}

/// Waits until the read model satisfies `predicate`.
pub async fn wait_for_tasks(
    rx: &mut watch::Receiver<TaskSnapshot>,
    predicate: impl FnMut(&TaskSnapshot) -> bool,
) -> TaskSnapshot {
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("read model did not reach the expected state")
        .expect("read model channel closed");
    snapshot.clone()
}

/// Lets spawned forwarders drain pending deliveries.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Store double whose deliveries are pushed by the test.
///
/// `add` does not publish anything, like a remote store whose snapshot
/// listener fires later.
pub struct ScriptedStore {
    mode: StoreMode,
    feeds: Mutex<HashMap<OwnerId, watch::Sender<TaskSnapshot>>>,
    gates: Mutex<HashMap<OwnerId, Arc<Notify>>>,
    fail_writes: AtomicBool,
    added: Mutex<Vec<(OwnerId, NewTaskRecord)>>,
    next_id: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(mode: StoreMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            feeds: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            added: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        })
    }

    /// Delivers `tasks` to every subscriber of `owner`.
    pub fn feed(&self, owner: &OwnerId, tasks: Vec<Task>) {
        self.sender(owner).send_replace(Arc::new(tasks));
    }

    /// Makes the next `subscribe` for `owner` wait until the gate opens.
    pub fn hold_subscribe(&self, owner: &OwnerId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(owner.clone(), Arc::clone(&gate));
        gate
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn added(&self) -> Vec<(OwnerId, NewTaskRecord)> {
        self.added.lock().clone()
    }

    pub fn subscriber_count(&self, owner: &OwnerId) -> usize {
        self.feeds
            .lock()
            .get(owner)
            .map_or(0, watch::Sender::receiver_count)
    }

    /// Waits until every subscription for `owner` has been released.
    pub async fn wait_released(&self, owner: &OwnerId) {
        tokio::time::timeout(WAIT, async {
            while self.subscriber_count(owner) > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription was not released");
    }

    fn sender(&self, owner: &OwnerId) -> watch::Sender<TaskSnapshot> {
        self.feeds
            .lock()
            .entry(owner.clone())
            .or_insert_with(|| watch::channel(Arc::new(Vec::new())).0)
            .clone()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted outage".to_string()));
        }
        Ok(())
    }

    fn current(&self, owner: &OwnerId) -> TaskSnapshot {
        self.sender(owner).borrow().clone()
    }
}

#[async_trait]
impl TaskStore for ScriptedStore {
    fn mode(&self) -> StoreMode {
        self.mode
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        _order: OrderBy,
    ) -> StoreResult<watch::Receiver<TaskSnapshot>> {
        let gate = self.gates.lock().remove(owner);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.sender(owner).subscribe())
    }

    async fn add(&self, owner: &OwnerId, record: NewTaskRecord) -> StoreResult<TaskId> {
        self.check_writable()?;
        let id = record.id.clone().unwrap_or_else(|| {
            TaskId::new(format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
        });
        self.added.lock().push((owner.clone(), record));
        Ok(id)
    }

    async fn update(
        &self,
        owner: &OwnerId,
        id: &TaskId,
        changes: TaskChanges,
    ) -> StoreResult<()> {
        self.check_writable()?;
        let mut tasks = self.current(owner).as_ref().clone();
        let task = tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        changes.apply_to(task);
        self.feed(owner, tasks);
        Ok(())
    }

    async fn delete(&self, owner: &OwnerId, id: &TaskId) -> StoreResult<()> {
        self.check_writable()?;
        let mut tasks = self.current(owner).as_ref().clone();
        let before = tasks.len();
        tasks.retain(|task| &task.id != id);
        if tasks.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.feed(owner, tasks);
        Ok(())
    }
}

/// Memory persistence whose saves can be made to fail.
#[derive(Default)]
pub struct FlakyPersistence {
    inner: MemoryPersistence,
    fail_saves: Arc<AtomicBool>,
}

impl FlakyPersistence {
    /// Flag shared with the store-owned instance; `true` fails every save.
    pub fn fail_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_saves)
    }
}

impl SnapshotPersistence for FlakyPersistence {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.inner.load(key)
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                path: key.into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.save(key, payload)
    }
}
