//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record shared by store, sync and views.
//! - Define the canonical timestamp form used at every store boundary.
//!
//! # Invariants
//! - `id` and `created_at` never change after creation.
//! - `Timestamp` is always UTC epoch milliseconds; calendar dates map to
//!   midnight UTC so they read back as the same day in every timezone.
//! - `completed_subtasks <= total_subtasks` is NOT enforced.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque task identifier.
///
/// Remote stores assign arbitrary document ids, so this is not a `Uuid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a collision-resistant id for locally created tasks.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Created but not started.
    #[default]
    Pending,
    /// Work is in progress.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    /// Stable wire value, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
        }
    }

    /// Parses wire values; also accepts `in_progress`/`in-progress`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "inprogress" | "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Canonical timestamp form: UTC epoch milliseconds.
///
/// Serialized as an RFC 3339 string with millisecond precision, or as integer
/// millis when chrono has no calendar form for the value. Deserializes from
/// RFC 3339 text, a bare `YYYY-MM-DD` date, or integer epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_epoch_ms(epoch_ms: i64) -> Self {
        Self(epoch_ms)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn epoch_ms(self) -> i64 {
        self.0
    }

    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_millis())
    }

    /// Midnight UTC of the given calendar day.
    pub fn from_calendar_date(day: NaiveDate) -> Self {
        let midnight = day.and_time(chrono::NaiveTime::MIN);
        Self(Utc.from_utc_datetime(&midnight).timestamp_millis())
    }

    /// Returns `None` only for values outside chrono's representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    /// Calendar day in UTC.
    pub fn calendar_date(self) -> Option<NaiveDate> {
        self.to_datetime().map(|value| value.date_naive())
    }

    pub fn to_rfc3339(self) -> String {
        match self.to_datetime() {
            Some(value) => value.to_rfc3339_opts(SecondsFormat::Millis, true),
            None => self.0.to_string(),
        }
    }

    pub fn plus_days(self, days: i64) -> Self {
        Self(self.0.saturating_add(days.saturating_mul(MILLIS_PER_DAY)))
    }

    /// Parses RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]` (as UTC) or `YYYY-MM-DD`.
    pub fn parse(text: &str) -> Result<Self, TimestampParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TimestampParseError(text.to_string()));
        }
        if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(value.timestamp_millis()));
        }
        if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self(Utc.from_utc_datetime(&value).timestamp_millis()));
        }
        if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::from_calendar_date(day));
        }
        Err(TimestampParseError(text.to_string()))
    }
}

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Millis outside chrono's range fall back to the integer form the
        // visitor reads back.
        match self.to_datetime() {
            Some(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            None => serializer.serialize_i64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("an RFC 3339 string, a YYYY-MM-DD date or epoch milliseconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Timestamp, E> {
        Timestamp::parse(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Timestamp, E> {
        Ok(Timestamp(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Timestamp, E> {
        i64::try_from(value)
            .map(Timestamp)
            .map_err(|_| E::custom(format!("epoch millis out of range: {value}")))
    }
}

/// Date text that is neither RFC 3339 nor `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParseError(pub String);

impl Display for TimestampParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized date value `{}`", self.0)
    }
}

impl Error for TimestampParseError {}

/// Canonical task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub completed_subtasks: u32,
    #[serde(default)]
    pub total_subtasks: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Timestamp,
}

impl Task {
    /// Whether the due date has passed and the task is still open.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status != TaskStatus::Completed && self.due_date.is_some_and(|due| due < now)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let needle = tag.trim();
        self.tags.iter().any(|value| value.eq_ignore_ascii_case(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::{Priority, Task, TaskId, TaskStatus, Timestamp};
    use chrono::NaiveDate;

    fn sample_task() -> Task {
        Task {
            id: TaskId::from("t-1"),
            title: "Buy milk".to_string(),
            description: "two litres".to_string(),
            priority: Priority::Low,
            status: TaskStatus::InProgress,
            start_date: Some(Timestamp::parse("2026-10-01").expect("parse timestamp")),
            due_date: None,
            completed_subtasks: 1,
            total_subtasks: 3,
            tags: vec!["home".to_string()],
            created_at: Timestamp::from_epoch_ms(1_700_000_000_000),
        }
    }

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let json = serde_json::to_value(sample_task()).expect("serialize");
        assert_eq!(json["status"], "inProgress");
        assert_eq!(json["priority"], "low");
        assert_eq!(json["completedSubtasks"], 1);
        assert_eq!(json["startDate"], "2026-10-01T00:00:00.000Z");
        assert!(json["dueDate"].is_null());
    }

    #[test]
    fn deserializes_legacy_numeric_and_date_only_timestamps() {
        let task: Task = serde_json::from_str(
            r#"{"id":"a","title":"x","createdAt":1700000000000,"dueDate":"2026-12-24"}"#,
        )
        .expect("deserialize");
        assert_eq!(task.created_at.epoch_ms(), 1_700_000_000_000);
        assert_eq!(
            task.due_date.and_then(|due| due.calendar_date()),
            NaiveDate::from_ymd_opt(2026, 12, 24)
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.total_subtasks, 0);
    }

    #[test]
    fn calendar_date_survives_offset_timestamps() {
        let ts = Timestamp::parse("2026-03-05T23:30:00-08:00").expect("parse timestamp");
        assert_eq!(ts.calendar_date(), NaiveDate::from_ymd_opt(2026, 3, 6));

        let day = NaiveDate::from_ymd_opt(2026, 3, 5).expect("valid calendar date");
        assert_eq!(Timestamp::from_calendar_date(day).calendar_date(), Some(day));
    }

    #[test]
    fn unrepresentable_millis_serialize_as_integers_and_read_back() {
        let mut task = sample_task();
        task.due_date = Some(Timestamp::from_epoch_ms(i64::MAX));
        task.start_date = Some(Timestamp::from_epoch_ms(i64::MIN));

        let json = serde_json::to_string(&task).expect("serialize task");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["dueDate"], i64::MAX);

        let back: Task = serde_json::from_str(&json).expect("read back task");
        assert_eq!(back, task);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Timestamp::parse("next tuesday").is_err());
        assert!(Timestamp::parse("   ").is_err());
    }

    #[test]
    fn status_parse_accepts_variants() {
        assert_eq!(TaskStatus::parse("inProgress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("done"), None);
        assert_eq!(Priority::parse(" HIGH "), Some(Priority::High));
    }

    #[test]
    fn overdue_ignores_completed_tasks() {
        let mut task = sample_task();
        task.due_date = Some(Timestamp::from_epoch_ms(10));
        assert!(task.is_overdue(Timestamp::from_epoch_ms(20)));
        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(Timestamp::from_epoch_ms(20)));
    }
}
