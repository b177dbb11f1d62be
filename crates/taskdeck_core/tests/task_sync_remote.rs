mod common;

use chrono::NaiveDate;
use common::{identity, ids, owner, task, ScriptedStore};
use std::sync::Arc;
use taskdeck_core::db::open_db_in_memory;
use taskdeck_core::model::draft::{DateInput, TaskDraft, TaskPatch};
use taskdeck_core::model::task::{Priority, TaskId, TaskStatus};
use taskdeck_core::store::{SqliteDocumentStore, StoreMode};
use taskdeck_core::sync::{SyncError, TaskSync};

fn document_sync() -> TaskSync {
    let store = SqliteDocumentStore::new(open_db_in_memory().expect("open in-memory db"));
    TaskSync::new(Arc::new(store))
}

#[tokio::test]
async fn signed_out_mutations_report_store_unavailable() {
    let sync = document_sync();
    sync.init(None).await.expect("init identity");
    assert_eq!(sync.mode(), StoreMode::Remote);

    let err = sync
        .create(TaskDraft::new("Buy milk", Priority::Low))
        .await
        .expect_err("create task must fail");
    assert!(matches!(err, SyncError::StoreUnavailable));
    assert_eq!(err.code(), "store_unavailable");

    let err = sync
        .update(&TaskId::from("x"), TaskPatch::status(TaskStatus::Completed))
        .await
        .expect_err("update task must fail");
    assert!(matches!(err, SyncError::StoreUnavailable));
    assert!(matches!(
        sync.delete(&TaskId::from("x")).await,
        Err(SyncError::StoreUnavailable)
    ));
}

#[tokio::test]
async fn store_assigns_id_and_created_at() {
    let sync = document_sync();
    sync.init(Some(identity("alice"))).await.expect("init identity");

    let draft = TaskDraft {
        start_date: Some(DateInput::Text("2024-03-01".to_string())),
        due_date: Some(DateInput::Text("2024-03-04T09:30:00Z".to_string())),
        ..TaskDraft::new("Buy milk", Priority::Low)
    };
    let id = sync.create(draft).await.expect("create task");

    let mut rx = sync.tasks();
    let tasks = common::wait_for_tasks(&mut rx, |tasks| !tasks.is_empty()).await;
    assert_eq!(ids(&tasks), vec![id.to_string()]);
    let task = &tasks[0];
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!((task.completed_subtasks, task.total_subtasks), (0, 0));
    assert!(task.created_at.epoch_ms() > 0);
    assert_eq!(
        task.start_date.and_then(|d| d.calendar_date()),
        NaiveDate::from_ymd_opt(2024, 3, 1)
    );
    assert_eq!(
        task.due_date.and_then(|d| d.calendar_date()),
        NaiveDate::from_ymd_opt(2024, 3, 4)
    );
}

#[tokio::test]
async fn remote_update_of_unknown_id_is_not_found() {
    let sync = document_sync();
    sync.init(Some(identity("alice"))).await.expect("init identity");

    let err = sync
        .update(&TaskId::from("missing"), TaskPatch::status(TaskStatus::Completed))
        .await
        .expect_err("update task must fail");
    assert!(matches!(err, SyncError::NotFound(ref id) if id.as_str() == "missing"));
}

#[tokio::test]
async fn remote_delete_is_idempotent() {
    let sync = document_sync();
    sync.init(Some(identity("alice"))).await.expect("init identity");
    let id = sync.create(TaskDraft::new("gone", Priority::Low)).await.expect("create task");

    sync.delete(&id).await.expect("delete task");
    sync.delete(&id).await.expect("delete task");
    assert!(sync.list().is_empty());
}

#[tokio::test]
async fn update_merges_onto_the_stored_document() {
    let sync = document_sync();
    sync.init(Some(identity("alice"))).await.expect("init identity");
    let draft = TaskDraft {
        description: "two litres".to_string(),
        total_subtasks: Some(2),
        ..TaskDraft::new("Buy milk", Priority::Low)
    };
    let id = sync.create(draft).await.expect("create task");
    let before = sync.list()[0].clone();

    let patch = TaskPatch {
        status: Some(TaskStatus::Completed),
        completed_subtasks: Some(2),
        ..TaskPatch::default()
    };
    sync.update(&id, patch).await.expect("update task");

    let mut rx = sync.tasks();
    let after = common::wait_for_tasks(&mut rx, |tasks| {
        tasks.first().is_some_and(|t| t.status == TaskStatus::Completed)
    })
    .await;
    let mut expected = before;
    expected.status = TaskStatus::Completed;
    expected.completed_subtasks = 2;
    assert_eq!(after[0], expected);
}

#[tokio::test]
async fn store_failures_surface_as_operation_failed() {
    let store = ScriptedStore::new(StoreMode::Remote);
    let sync = TaskSync::new(store.clone());
    sync.init(Some(identity("alice"))).await.expect("init identity");

    store.set_fail_writes(true);
    let err = sync
        .create(TaskDraft::new("offline", Priority::Low))
        .await
        .expect_err("create task must fail");
    assert!(matches!(err, SyncError::OperationFailed(_)));
    assert_eq!(err.code(), "operation_failed");
    assert!(store.added().is_empty());
}

#[tokio::test]
async fn remote_create_waits_for_the_store_delivery() {
    let store = ScriptedStore::new(StoreMode::Remote);
    let sync = TaskSync::new(store.clone());
    sync.init(Some(identity("alice"))).await.expect("init identity");

    let id = sync.create(TaskDraft::new("later", Priority::Low)).await.expect("create task");
    let (record_owner, record) = store.added().remove(0);
    assert_eq!(record_owner, owner("alice"));
    assert_eq!(record.id, None);
    assert_eq!(record.created_at, None);
    assert!(sync.list().is_empty());

    store.feed(&owner("alice"), vec![task(id.as_str(), "later", 10)]);
    let mut rx = sync.tasks();
    let tasks = common::wait_for_tasks(&mut rx, |tasks| tasks.len() == 1).await;
    assert_eq!(tasks[0].id, id);
}
