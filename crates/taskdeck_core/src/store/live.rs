//! Live query registry shared by store implementations.
//!
//! One `watch` channel exists per `(owner, order)` pair. Writers publish the
//! owner's collection in insertion order; the registry sorts per subscriber
//! order and drops channels nobody listens to anymore.

use super::{OrderBy, TaskSnapshot};
use crate::identity::OwnerId;
use crate::model::task::Task;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Default)]
pub struct LiveQueries {
    channels: Mutex<HashMap<(OwnerId, OrderBy), watch::Sender<TaskSnapshot>>>,
}

impl LiveQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or reuses) a channel primed with `tasks`.
    pub fn subscribe(
        &self,
        owner: &OwnerId,
        order: OrderBy,
        tasks: &[Task],
    ) -> watch::Receiver<TaskSnapshot> {
        let mut channels = self.channels.lock();
        let snapshot = sorted_snapshot(tasks, order);
        let key = (owner.clone(), order);
        if let Some(sender) = channels.get(&key) {
            sender.send_replace(snapshot);
            return sender.subscribe();
        }

        let (sender, receiver) = watch::channel(snapshot);
        channels.insert(key, sender);
        debug!(
            "event=live_subscribe module=store status=ok owner={owner} channels={}",
            channels.len()
        );
        receiver
    }

    /// Pushes `tasks` to every live query of `owner`.
    pub fn publish(&self, owner: &OwnerId, tasks: &[Task]) {
        let mut channels = self.channels.lock();
        channels.retain(|(key_owner, order), sender| {
            if sender.receiver_count() == 0 {
                return false;
            }
            if key_owner == owner {
                sender.send_replace(sorted_snapshot(tasks, *order));
            }
            true
        });
    }

    /// Number of channels with at least one receiver left.
    pub fn active_count(&self) -> usize {
        self.channels
            .lock()
            .values()
            .filter(|sender| sender.receiver_count() > 0)
            .count()
    }
}

fn sorted_snapshot(tasks: &[Task], order: OrderBy) -> TaskSnapshot {
    let mut sorted = tasks.to_vec();
    order.sort(&mut sorted);
    Arc::new(sorted)
}

#[cfg(test)]
mod tests {
    use super::LiveQueries;
    use crate::identity::OwnerId;
    use crate::model::task::{Priority, Task, TaskId, TaskStatus, Timestamp};
    use crate::store::OrderBy;

    fn task(id: &str, created_at: i64) -> Task {
        Task {
            id: TaskId::from(id),
            title: id.to_string(),
            description: String::new(),
            priority: Priority::Low,
            status: TaskStatus::Pending,
            start_date: None,
            due_date: None,
            completed_subtasks: 0,
            total_subtasks: 0,
            tags: Vec::new(),
            created_at: Timestamp::from_epoch_ms(created_at),
        }
    }

    #[test]
    fn publish_reaches_only_the_matching_owner() {
        let live = LiveQueries::new();
        let alice = OwnerId::new("alice").expect("valid owner id");
        let bob = OwnerId::new("bob").expect("valid owner id");
        let mut alice_rx = live.subscribe(&alice, OrderBy::CREATED_AT_DESC, &[]);
        let mut bob_rx = live.subscribe(&bob, OrderBy::CREATED_AT_DESC, &[]);

        live.publish(&alice, &[task("a1", 1), task("a2", 2)]);

        assert!(alice_rx.has_changed().expect("sender alive"));
        let ids: Vec<String> = alice_rx
            .borrow_and_update()
            .iter()
            .map(|task| task.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a2", "a1"]);
        assert!(!bob_rx.has_changed().expect("sender alive"));
        assert!(bob_rx.borrow_and_update().is_empty());
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let live = LiveQueries::new();
        let alice = OwnerId::new("alice").expect("valid owner id");
        let rx = live.subscribe(&alice, OrderBy::CREATED_AT_DESC, &[]);
        assert_eq!(live.active_count(), 1);

        drop(rx);
        live.publish(&alice, &[task("a1", 1)]);
        assert_eq!(live.active_count(), 0);
    }
}
