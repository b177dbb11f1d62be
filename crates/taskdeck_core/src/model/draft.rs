//! Caller-side task inputs and their normalized store forms.
//!
//! # Responsibility
//! - Model create input (`TaskDraft`) and partial updates (`TaskPatch`).
//! - Normalize caller dates into canonical `Timestamp` values.
//! - Provide boundary validation for form-style callers.
//!
//! # Invariants
//! - A draft never carries `id` or `created_at`.
//! - Patch fields left at `None`/`FieldPatch::Keep` never touch stored values.
//! - `validate_draft` and `normalize_tags` are advisory; the sync layer calls
//!   neither.

use crate::model::task::{Priority, Task, TaskId, TaskStatus, Timestamp};
use chrono::{DateTime, NaiveDate, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MIN_DESCRIPTION_CHARS: usize = 5;

/// Date value as supplied by a caller, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    /// Exact instant.
    At(DateTime<Utc>),
    /// Calendar day; normalized to midnight UTC.
    Day(NaiveDate),
    /// Already canonical.
    Canonical(Timestamp),
    /// RFC 3339 or `YYYY-MM-DD` text, e.g. straight from a form field.
    Text(String),
}

impl DateInput {
    /// Converts to the canonical timestamp form.
    ///
    /// # Errors
    /// - Returns the offending text when a `Text` value does not parse.
    /// - Returns the raw millis when a `Canonical` value has no calendar form.
    pub fn normalize(&self) -> Result<Timestamp, String> {
        match self {
            Self::At(value) => Ok(Timestamp::from_datetime(*value)),
            Self::Day(day) => Ok(Timestamp::from_calendar_date(*day)),
            Self::Canonical(value) if value.to_datetime().is_none() => {
                Err(value.epoch_ms().to_string())
            }
            Self::Canonical(value) => Ok(*value),
            Self::Text(text) => Timestamp::parse(text).map_err(|_| text.clone()),
        }
    }
}

impl From<DateTime<Utc>> for DateInput {
    fn from(value: DateTime<Utc>) -> Self {
        Self::At(value)
    }
}

impl From<NaiveDate> for DateInput {
    fn from(value: NaiveDate) -> Self {
        Self::Day(value)
    }
}

impl From<Timestamp> for DateInput {
    fn from(value: Timestamp) -> Self {
        Self::Canonical(value)
    }
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Update instruction for a nullable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPatch<T> {
    /// Leave the stored value as is.
    Keep,
    /// Set the stored value to null.
    Clear,
    /// Replace the stored value.
    Set(T),
}

impl<T> Default for FieldPatch<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T> FieldPatch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    fn try_map<U, E>(&self, f: impl FnOnce(&T) -> Result<U, E>) -> Result<FieldPatch<U>, E> {
        Ok(match self {
            Self::Keep => FieldPatch::Keep,
            Self::Clear => FieldPatch::Clear,
            Self::Set(value) => FieldPatch::Set(f(value)?),
        })
    }
}

impl<T: Copy> FieldPatch<T> {
    fn apply(&self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(value) => *slot = Some(*value),
        }
    }
}

/// Create input for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// Defaults to `Pending`.
    pub status: Option<TaskStatus>,
    pub start_date: Option<DateInput>,
    pub due_date: Option<DateInput>,
    /// Defaults to 0.
    pub completed_subtasks: Option<u32>,
    /// Defaults to 0.
    pub total_subtasks: Option<u32>,
    pub tags: Vec<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            priority,
            ..Self::default()
        }
    }

    /// Applies defaults and date normalization.
    ///
    /// `id`/`created_at` stay `None`; the caller decides who assigns them.
    pub(crate) fn normalize(&self) -> Result<NewTaskRecord, String> {
        Ok(NewTaskRecord {
            id: None,
            created_at: None,
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status: self.status.unwrap_or_default(),
            start_date: self.start_date.as_ref().map(DateInput::normalize).transpose()?,
            due_date: self.due_date.as_ref().map(DateInput::normalize).transpose()?,
            completed_subtasks: self.completed_subtasks.unwrap_or(0),
            total_subtasks: self.total_subtasks.unwrap_or(0),
            tags: self.tags.clone(),
        })
    }
}

/// Partial update for one task. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub start_date: FieldPatch<DateInput>,
    pub due_date: FieldPatch<DateInput>,
    pub completed_subtasks: Option<u32>,
    pub total_subtasks: Option<u32>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    /// Patch that only moves the task to `status`.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn normalize(&self) -> Result<TaskChanges, String> {
        Ok(TaskChanges {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status: self.status,
            start_date: self.start_date.try_map(DateInput::normalize)?,
            due_date: self.due_date.try_map(DateInput::normalize)?,
            completed_subtasks: self.completed_subtasks,
            total_subtasks: self.total_subtasks,
            tags: self.tags.clone(),
        })
    }
}

/// Normalized create payload handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskRecord {
    /// Pre-assigned by the sync layer in local mode; `None` for remote stores.
    pub id: Option<TaskId>,
    /// Pre-assigned by the sync layer in local mode; `None` for remote stores.
    pub created_at: Option<Timestamp>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub start_date: Option<Timestamp>,
    pub due_date: Option<Timestamp>,
    pub completed_subtasks: u32,
    pub total_subtasks: u32,
    pub tags: Vec<String>,
}

impl NewTaskRecord {
    /// Materializes the stored task with the final identity fields.
    pub fn into_task(self, id: TaskId, created_at: Timestamp) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            status: self.status,
            start_date: self.start_date,
            due_date: self.due_date,
            completed_subtasks: self.completed_subtasks,
            total_subtasks: self.total_subtasks,
            tags: self.tags,
            created_at,
        }
    }
}

/// Normalized partial update handed to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub start_date: FieldPatch<Timestamp>,
    pub due_date: FieldPatch<Timestamp>,
    pub completed_subtasks: Option<u32>,
    pub total_subtasks: Option<u32>,
    pub tags: Option<Vec<String>>,
}

impl TaskChanges {
    /// Merges these changes onto `task`. `id` and `created_at` are untouched.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        self.start_date.apply(&mut task.start_date);
        self.due_date.apply(&mut task.due_date);
        if let Some(completed) = self.completed_subtasks {
            task.completed_subtasks = completed;
        }
        if let Some(total) = self.total_subtasks {
            task.total_subtasks = total;
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
    }
}

/// Trims tags and drops blanks and exact duplicates, keeping first-seen order.
///
/// Form-boundary helper; `create`/`update` store tags exactly as given.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() || normalized.iter().any(|seen| seen == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    normalized
}

/// Form-level validation errors for task drafts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftValidationError {
    EmptyTitle,
    DescriptionTooShort { min_chars: usize },
    InvalidDate(String),
    DueBeforeStart,
}

impl Display for DraftValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title is required"),
            Self::DescriptionTooShort { min_chars } => {
                write!(f, "description must be at least {min_chars} characters")
            }
            Self::InvalidDate(value) => write!(f, "unrecognized date value `{value}`"),
            Self::DueBeforeStart => write!(f, "due date must be after start date"),
        }
    }
}

impl Error for DraftValidationError {}

/// Boundary validation used by form-style callers before `create`.
///
/// # Errors
/// - `EmptyTitle` when the trimmed title is empty.
/// - `DescriptionTooShort` below 5 characters.
/// - `InvalidDate` for date text that does not parse.
/// - `DueBeforeStart` when both dates are set and due is not after start.
pub fn validate_draft(draft: &TaskDraft) -> Result<(), DraftValidationError> {
    if draft.title.trim().is_empty() {
        return Err(DraftValidationError::EmptyTitle);
    }
    if draft.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(DraftValidationError::DescriptionTooShort {
            min_chars: MIN_DESCRIPTION_CHARS,
        });
    }

    let start = normalize_for_validation(draft.start_date.as_ref())?;
    let due = normalize_for_validation(draft.due_date.as_ref())?;
    if let (Some(start), Some(due)) = (start, due) {
        if due <= start {
            return Err(DraftValidationError::DueBeforeStart);
        }
    }
    Ok(())
}

fn normalize_for_validation(
    value: Option<&DateInput>,
) -> Result<Option<Timestamp>, DraftValidationError> {
    value
        .map(DateInput::normalize)
        .transpose()
        .map_err(DraftValidationError::InvalidDate)
}
