//! Task synchronization layer.
//!
//! # Responsibility
//! - Own the current identity's task collection and expose it as a
//!   reactive, read-only snapshot.
//! - Mediate create/update/delete against the configured store.
//! - Re-subscribe on identity change and tear down on disposal.
//!
//! # Invariants
//! - At most one store subscription is active; each one carries a
//!   generation number and a cancellation token.
//! - Deliveries from a superseded generation never reach the read model.
//! - Without an identity the read model is empty and nothing is subscribed.
//! - Session locks are never held across `.await`.

use super::error::{SyncError, SyncResult};
use crate::identity::{Identity, OwnerId};
use crate::model::draft::{TaskDraft, TaskPatch};
use crate::model::task::{TaskId, Timestamp};
use crate::store::{OrderBy, StoreError, StoreMode, TaskSnapshot, TaskStore};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Synchronization layer handed to the presentation layer.
///
/// Construct one per application session; dropping it disposes it.
pub struct TaskSync {
    inner: Arc<SyncInner>,
    identity_follower: Mutex<Option<JoinHandle<()>>>,
}

struct SyncInner {
    store: Arc<dyn TaskStore>,
    mode: StoreMode,
    snapshot_tx: watch::Sender<TaskSnapshot>,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    generation: u64,
    identity: Option<Identity>,
    active: Option<ActiveSubscription>,
}

struct ActiveSubscription {
    generation: u64,
    owner: OwnerId,
    source: watch::Receiver<TaskSnapshot>,
    cancel: CancellationToken,
}

impl TaskSync {
    /// Creates a signed-out layer over `store`.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let mode = store.mode();
        let (snapshot_tx, _rx) = watch::channel(empty_snapshot());
        Self {
            inner: Arc::new(SyncInner {
                store,
                mode,
                snapshot_tx,
                session: Mutex::new(Session::default()),
            }),
            identity_follower: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.inner.mode
    }

    /// Applies the initial identity. Same as `switch_identity`.
    pub async fn init(&self, identity: Option<Identity>) -> SyncResult<()> {
        self.switch_identity(identity).await
    }

    /// Tears down the current subscription and, when `identity` is present,
    /// subscribes to its collection ordered by `createdAt` descending.
    ///
    /// # Errors
    /// - `OperationFailed` when the store rejects the subscription; the read
    ///   model stays empty in that case.
    pub async fn switch_identity(&self, identity: Option<Identity>) -> SyncResult<()> {
        self.inner.switch_identity(identity).await
    }

    /// Applies the receiver's current identity, then keeps following changes
    /// in a background task until disposal.
    ///
    /// # Errors
    /// - Same as `switch_identity` for the initial identity.
    pub async fn bind_identity(
        &self,
        mut identities: watch::Receiver<Option<Identity>>,
    ) -> SyncResult<()> {
        let initial = identities.borrow_and_update().clone();
        let outcome = self.inner.switch_identity(initial).await;

        let inner = Arc::clone(&self.inner);
        let follower = spawn_detached("identity_follower", async move {
            while identities.changed().await.is_ok() {
                let identity = identities.borrow_and_update().clone();
                if let Err(err) = inner.switch_identity(identity).await {
                    warn!(
                        "event=sync_switch module=sync status=error source=follower error_code={} error={err}",
                        err.code()
                    );
                }
            }
        });

        if let Some(previous) = std::mem::replace(&mut *self.identity_follower.lock(), follower)
        {
            previous.abort();
        }
        outcome
    }

    /// Unsubscribes, forgets the identity and empties the read model.
    ///
    /// Idempotent.
    pub fn dispose(&self) {
        if let Some(follower) = self.identity_follower.lock().take() {
            follower.abort();
        }
        let mut session = self.inner.session.lock();
        session.generation += 1;
        session.identity = None;
        self.inner.teardown(&mut session);
    }

    /// Current identity, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.inner.session.lock().identity.clone()
    }

    /// Current tasks, newest first.
    pub fn list(&self) -> TaskSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Reactive read model; yields a new snapshot on every delivery.
    pub fn tasks(&self) -> watch::Receiver<TaskSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Creates a task from caller-supplied fields.
    ///
    /// # Contract
    /// - Missing optional fields default to `pending` / 0 subtasks.
    /// - Dates are normalized to canonical timestamps.
    /// - Local mode assigns `id`/`createdAt` here; remote stores assign their own.
    ///
    /// # Errors
    /// - `StoreUnavailable` when signed out in remote mode.
    /// - `InvalidDate` for unparsable date text.
    /// - `OperationFailed` for store failures.
    pub async fn create(&self, draft: TaskDraft) -> SyncResult<TaskId> {
        let owner = self.inner.write_owner()?;
        let mut record = draft.normalize().map_err(SyncError::InvalidDate)?;
        if self.inner.mode == StoreMode::Local {
            record.id = Some(TaskId::generate());
            record.created_at = Some(Timestamp::now());
        }

        match self.inner.store.add(&owner, record).await {
            Ok(id) => {
                info!("event=task_create module=sync status=ok owner={owner} id={id}");
                self.inner.pull_latest();
                Ok(id)
            }
            Err(err) => Err(self.inner.rejected("task_create", &owner, err)),
        }
    }

    /// Merges `patch` onto the task with `id`.
    ///
    /// # Errors
    /// - `NotFound` in remote mode when `id` is unknown. Local mode treats
    ///   an unknown id as a silent no-op.
    /// - `StoreUnavailable`, `InvalidDate`, `OperationFailed` as for `create`.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> SyncResult<()> {
        let owner = self.inner.write_owner()?;
        let changes = patch.normalize().map_err(SyncError::InvalidDate)?;

        match self.inner.store.update(&owner, id, changes).await {
            Ok(()) => {
                info!("event=task_update module=sync status=ok owner={owner} id={id}");
                self.inner.pull_latest();
                Ok(())
            }
            Err(StoreError::NotFound(_)) if self.inner.mode == StoreMode::Local => {
                debug!("event=task_update module=sync status=skipped owner={owner} id={id}");
                Ok(())
            }
            Err(err) => Err(self.inner.rejected("task_update", &owner, err)),
        }
    }

    /// Removes the task with `id`. Unknown ids are not an error.
    ///
    /// # Errors
    /// - `StoreUnavailable` when signed out in remote mode.
    /// - `OperationFailed` for store failures.
    pub async fn delete(&self, id: &TaskId) -> SyncResult<()> {
        let owner = self.inner.write_owner()?;

        match self.inner.store.delete(&owner, id).await {
            Ok(()) => {
                info!("event=task_delete module=sync status=ok owner={owner} id={id}");
                self.inner.pull_latest();
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                debug!("event=task_delete module=sync status=skipped owner={owner} id={id}");
                Ok(())
            }
            Err(err) => Err(self.inner.rejected("task_delete", &owner, err)),
        }
    }
}

impl Drop for TaskSync {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl SyncInner {
    async fn switch_identity(self: &Arc<Self>, identity: Option<Identity>) -> SyncResult<()> {
        let generation = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.identity = identity.clone();
            self.teardown(&mut session);
            session.generation
        };

        let Some(identity) = identity else {
            info!("event=sync_switch module=sync status=ok owner=none generation={generation}");
            return Ok(());
        };
        let owner = identity.owner_id;

        let source = match self.store.subscribe(&owner, OrderBy::CREATED_AT_DESC).await {
            Ok(source) => source,
            Err(err) => {
                error!(
                    "event=sync_switch module=sync status=error owner={owner} generation={generation} error={err}"
                );
                return Err(err.into());
            }
        };

        let cancel = CancellationToken::new();
        {
            let mut session = self.session.lock();
            if session.generation != generation {
                debug!(
                    "event=sync_switch module=sync status=superseded owner={owner} generation={generation}"
                );
                return Ok(());
            }
            let initial = source.borrow().clone();
            session.active = Some(ActiveSubscription {
                generation,
                owner: owner.clone(),
                source: source.clone(),
                cancel: cancel.clone(),
            });
            self.send_snapshot(initial);
        }

        let inner = Arc::clone(self);
        spawn_detached("snapshot_forwarder", async move {
            inner.forward(generation, source, cancel).await;
        });

        info!("event=sync_switch module=sync status=ok owner={owner} generation={generation}");
        Ok(())
    }

    /// Relays store deliveries until cancelled or superseded.
    async fn forward(
        &self,
        generation: u64,
        mut source: watch::Receiver<TaskSnapshot>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = source.changed() => {
                    if changed.is_err() {
                        debug!("event=snapshot_forward module=sync status=closed generation={generation}");
                        break;
                    }
                    let snapshot = source.borrow_and_update().clone();
                    if !self.publish(generation, snapshot) {
                        break;
                    }
                }
            }
        }
    }

    /// Publishes `snapshot` only if `generation` is still the active one.
    fn publish(&self, generation: u64, snapshot: TaskSnapshot) -> bool {
        let session = self.session.lock();
        let current = session
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if !current {
            debug!("event=snapshot_forward module=sync status=discarded generation={generation}");
            return false;
        }
        self.send_snapshot(snapshot);
        true
    }

    /// Re-reads the active subscription so completed local writes show up
    /// before the caller resumes.
    fn pull_latest(&self) {
        let session = self.session.lock();
        if let Some(active) = &session.active {
            let snapshot = active.source.borrow().clone();
            self.send_snapshot(snapshot);
        }
    }

    fn send_snapshot(&self, snapshot: TaskSnapshot) {
        self.snapshot_tx.send_if_modified(|current| {
            if Arc::ptr_eq(current, &snapshot) {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    /// Cancels the active subscription (if any) and empties the read model.
    fn teardown(&self, session: &mut Session) {
        if let Some(active) = session.active.take() {
            active.cancel.cancel();
            debug!(
                "event=sync_teardown module=sync status=ok owner={} generation={}",
                active.owner, active.generation
            );
        }
        self.snapshot_tx.send_if_modified(|current| {
            if current.is_empty() {
                return false;
            }
            *current = empty_snapshot();
            true
        });
    }

    fn write_owner(&self) -> SyncResult<OwnerId> {
        let session = self.session.lock();
        match (&session.identity, self.mode) {
            (Some(identity), _) => Ok(identity.owner_id.clone()),
            (None, StoreMode::Local) => Ok(OwnerId::device()),
            (None, StoreMode::Remote) => Err(SyncError::StoreUnavailable),
        }
    }

    fn rejected(&self, event: &str, owner: &OwnerId, err: StoreError) -> SyncError {
        let err = SyncError::from(err);
        error!(
            "event={event} module=sync status=error mode={} owner={owner} error_code={} error={err}",
            self.mode.as_str(),
            err.code()
        );
        err
    }
}

fn empty_snapshot() -> TaskSnapshot {
    Arc::new(Vec::new())
}

fn spawn_detached<F>(name: &'static str, future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            warn!("event=task_spawn module=sync status=skipped task={name} reason=no_runtime");
            None
        }
    }
}
