//! SQLite-backed task document store.
//!
//! # Responsibility
//! - Act as the remote document database behind the store capability.
//! - Assign document ids and creation times server-side.
//! - Convert store-native epoch-millis columns to canonical timestamps.
//!
//! # Invariants
//! - Every statement is scoped by `owner_id`.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Live queries are refreshed after every successful write.

use super::live::LiveQueries;
use super::{OrderBy, StoreError, StoreMode, StoreResult, TaskSnapshot, TaskStore};
use crate::identity::OwnerId;
use crate::model::draft::{FieldPatch, NewTaskRecord, TaskChanges};
use crate::model::task::{Priority, Task, TaskId, TaskStatus, Timestamp};
use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tokio::sync::watch;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    priority,
    status,
    start_date,
    due_date,
    completed_subtasks,
    total_subtasks,
    tags,
    created_at
FROM task_documents";

/// Document store with server-assigned ids and timestamps.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    live: LiveQueries,
}

impl SqliteDocumentStore {
    /// Takes ownership of a connection returned by `open_db*`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            live: LiveQueries::new(),
        }
    }

    /// Lists `owner`'s documents in insertion order.
    pub fn list_owner(&self, owner: &OwnerId) -> StoreResult<Vec<Task>> {
        let conn = self.conn.lock();
        query_owner(&conn, owner)
    }

    /// Reloads `owner`'s collection and pushes it to live queries.
    fn refresh(&self, conn: &Connection, owner: &OwnerId) -> StoreResult<()> {
        let tasks = query_owner(conn, owner)?;
        self.live.publish(owner, &tasks);
        Ok(())
    }
}

fn query_owner(conn: &Connection, owner: &OwnerId) -> StoreResult<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL}
         WHERE owner_id = ?1
         ORDER BY seq ASC;"
    ))?;
    let mut rows = stmt.query([owner.as_str()])?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

#[async_trait]
impl TaskStore for SqliteDocumentStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Remote
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        order: OrderBy,
    ) -> StoreResult<watch::Receiver<TaskSnapshot>> {
        let conn = self.conn.lock();
        let tasks = query_owner(&conn, owner)?;
        Ok(self.live.subscribe(owner, order, &tasks))
    }

    async fn add(&self, owner: &OwnerId, record: NewTaskRecord) -> StoreResult<TaskId> {
        let id = TaskId::generate();
        let created_at = Timestamp::now();
        let tags = serde_json::to_string(&record.tags)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO task_documents (
                id,
                owner_id,
                title,
                description,
                priority,
                status,
                start_date,
                due_date,
                completed_subtasks,
                total_subtasks,
                tags,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12);",
            params![
                id.as_str(),
                owner.as_str(),
                record.title.as_str(),
                record.description.as_str(),
                record.priority.as_str(),
                record.status.as_str(),
                record.start_date.map(Timestamp::epoch_ms),
                record.due_date.map(Timestamp::epoch_ms),
                record.completed_subtasks,
                record.total_subtasks,
                tags,
                created_at.epoch_ms(),
            ],
        )?;
        info!("event=document_add module=store status=ok owner={owner} id={id}");

        self.refresh(&conn, owner)?;
        Ok(id)
    }

    async fn update(
        &self,
        owner: &OwnerId,
        id: &TaskId,
        changes: TaskChanges,
    ) -> StoreResult<()> {
        let mut assignments: Vec<&'static str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(title) = changes.title {
            assignments.push("title = ?");
            bind_values.push(Value::Text(title));
        }
        if let Some(description) = changes.description {
            assignments.push("description = ?");
            bind_values.push(Value::Text(description));
        }
        if let Some(priority) = changes.priority {
            assignments.push("priority = ?");
            bind_values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(status) = changes.status {
            assignments.push("status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        push_date_patch(&mut assignments, &mut bind_values, "start_date = ?", changes.start_date);
        push_date_patch(&mut assignments, &mut bind_values, "due_date = ?", changes.due_date);
        if let Some(completed) = changes.completed_subtasks {
            assignments.push("completed_subtasks = ?");
            bind_values.push(Value::Integer(i64::from(completed)));
        }
        if let Some(total) = changes.total_subtasks {
            assignments.push("total_subtasks = ?");
            bind_values.push(Value::Integer(i64::from(total)));
        }
        if let Some(tags) = changes.tags {
            assignments.push("tags = ?");
            bind_values.push(Value::Text(serde_json::to_string(&tags)?));
        }
        assignments.push("updated_at = (strftime('%s', 'now') * 1000)");

        let sql = format!(
            "UPDATE task_documents SET {} WHERE owner_id = ? AND id = ?;",
            assignments.join(", ")
        );
        bind_values.push(Value::Text(owner.as_str().to_string()));
        bind_values.push(Value::Text(id.as_str().to_string()));

        let conn = self.conn.lock();
        let changed = conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        self.refresh(&conn, owner)
    }

    async fn delete(&self, owner: &OwnerId, id: &TaskId) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM task_documents WHERE owner_id = ?1 AND id = ?2;",
            params![owner.as_str(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        self.refresh(&conn, owner)
    }
}

fn push_date_patch(
    assignments: &mut Vec<&'static str>,
    bind_values: &mut Vec<Value>,
    assignment: &'static str,
    patch: FieldPatch<Timestamp>,
) {
    match patch {
        FieldPatch::Keep => {}
        FieldPatch::Clear => {
            assignments.push(assignment);
            bind_values.push(Value::Null);
        }
        FieldPatch::Set(value) => {
            assignments.push(assignment);
            bind_values.push(Value::Integer(value.epoch_ms()));
        }
    }
}

fn parse_task_row(row: &Row<'_>) -> StoreResult<Task> {
    let id: String = row.get("id")?;

    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        StoreError::Serialization(format!(
            "invalid priority `{priority_text}` in task_documents.priority"
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        StoreError::Serialization(format!(
            "invalid status `{status_text}` in task_documents.status"
        ))
    })?;

    let tags_text: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_text).map_err(|err| {
        StoreError::Serialization(format!("invalid tags in task_documents.tags: {err}"))
    })?;

    Ok(Task {
        id: TaskId::new(id),
        title: row.get("title")?,
        description: row.get("description")?,
        priority,
        status,
        start_date: row
            .get::<_, Option<i64>>("start_date")?
            .map(Timestamp::from_epoch_ms),
        due_date: row
            .get::<_, Option<i64>>("due_date")?
            .map(Timestamp::from_epoch_ms),
        completed_subtasks: row.get("completed_subtasks")?,
        total_subtasks: row.get("total_subtasks")?,
        tags,
        created_at: Timestamp::from_epoch_ms(row.get("created_at")?),
    })
}
