//! Read-only aggregates over a task snapshot.
//!
//! # Responsibility
//! - Dashboard counters, subtask progress and deadline lists.
//! - Chart series and list filtering for the presentation layer.
//!
//! # Invariants
//! - Functions are pure over `&[Task]`; none of them reorders its input.
//! - "Now" is always passed in, never read from the clock here.

use crate::model::task::{Priority, Task, TaskId, TaskStatus, Timestamp};

const UPCOMING_WINDOW_DAYS: i64 = 3;

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    /// Open tasks whose due date has passed.
    pub overdue: Vec<TaskId>,
}

impl TaskStats {
    pub fn collect(tasks: &[Task], now: Timestamp) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
            if task.is_overdue(now) {
                stats.overdue.push(task.id.clone());
            }
        }
        stats
    }
}

/// Completed vs. total subtasks over some group of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtaskProgress {
    pub completed: u64,
    pub total: u64,
}

impl SubtaskProgress {
    fn add(&mut self, task: &Task) {
        self.completed += u64::from(task.completed_subtasks);
        self.total += u64::from(task.total_subtasks);
    }

    /// Completion percentage; 0 when there are no subtasks. Not clamped.
    pub fn percent(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// Subtask progress and deadline metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMetrics {
    pub overall: SubtaskProgress,
    pub average_completion: f64,
    pub by_status: Vec<(TaskStatus, SubtaskProgress)>,
    pub by_priority: Vec<(Priority, SubtaskProgress)>,
    /// Tasks due within the next three days, excluding anything already due.
    pub upcoming: Vec<TaskId>,
}

impl TaskMetrics {
    pub fn collect(tasks: &[Task], now: Timestamp) -> Self {
        let mut overall = SubtaskProgress::default();
        let mut by_status = TaskStatus::ALL.map(|status| (status, SubtaskProgress::default()));
        let mut by_priority = Priority::ALL.map(|priority| (priority, SubtaskProgress::default()));
        let horizon = now.plus_days(UPCOMING_WINDOW_DAYS);
        let mut upcoming = Vec::new();

        for task in tasks {
            overall.add(task);
            if let Some((_, progress)) = by_status.iter_mut().find(|(s, _)| *s == task.status) {
                progress.add(task);
            }
            if let Some((_, progress)) =
                by_priority.iter_mut().find(|(p, _)| *p == task.priority)
            {
                progress.add(task);
            }
            if task.due_date.is_some_and(|due| due > now && due <= horizon) {
                upcoming.push(task.id.clone());
            }
        }

        Self {
            overall,
            average_completion: overall.percent(),
            by_status: by_status.to_vec(),
            by_priority: by_priority.to_vec(),
            upcoming,
        }
    }
}

/// Task count per status, listing only statuses that occur.
pub fn status_distribution(tasks: &[Task]) -> Vec<(TaskStatus, usize)> {
    TaskStatus::ALL
        .into_iter()
        .map(|status| (status, tasks.iter().filter(|t| t.status == status).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
}

/// Task count per priority, listing only priorities that occur.
pub fn priority_distribution(tasks: &[Task]) -> Vec<(Priority, usize)> {
    Priority::ALL
        .into_iter()
        .map(|priority| {
            let count = tasks.iter().filter(|t| t.priority == priority).count();
            (priority, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}

/// List filter; every criterion that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    /// Case-insensitive substring of title or description.
    pub text: Option<String>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|status| status != task.status) {
            return false;
        }
        if self.priority.is_some_and(|priority| priority != task.priority) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !task.has_tag(tag) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty()
                && !task.title.to_lowercase().contains(&needle)
                && !task.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    /// Matching tasks in input order.
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|task| self.matches(task)).collect()
    }
}
