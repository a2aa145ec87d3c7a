// ABOUTME: Integration tests for pausing and resuming extract refresh tasks
// ABOUTME: Covers snapshot-before-delete, partial failures, schedule checks and idempotence

mod common;

use std::sync::Arc;

use common::{diamond_site, orchestrator, Call, FailingStore, FakeServer, StickyStore};
use extract_pause::engine::{
    BatchStatus, JsonFileSnapshotStore, MemorySnapshotStore, OperationKind, PauseError,
    PauseOptions, SnapshotStore, TaskOperationError,
};
use extract_pause::model::{Entity, EntityKind, EntityRef, ScheduleState};
use tempfile::tempdir;

fn sales() -> EntityRef {
    EntityRef::by_name(EntityKind::Workbook, "Sales")
}

#[tokio::test]
async fn test_pause_then_resume_restores_bindings() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());
    let before = server.bindings();

    let report = orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::Success);
    assert_eq!(report.snapshots.len(), 4);
    assert_eq!(report.batch.summary.succeeded, 4);
    assert_eq!(store.len().await, 4);

    // only the unrelated datasource keeps its task
    let remaining = server.tasks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id.as_deref(), Some("t-hr"));

    let resumed = orchestrator.resume_root(&sales()).await.unwrap();

    assert_eq!(resumed.status(), BatchStatus::Success);
    assert!(resumed.retained.is_empty());
    assert!(store.is_empty().await);
    assert_eq!(server.bindings(), before);
}

#[tokio::test]
async fn test_snapshots_are_stored_before_any_delete() {
    let server = diamond_site();
    let orchestrator = orchestrator(&server, Arc::new(FailingStore));

    let err = orchestrator
        .pause(&sales(), PauseOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PauseError::Store(_)));
    assert!(server.destructive_calls().is_empty());
    assert_eq!(server.tasks().len(), 5);
}

#[tokio::test]
async fn test_listing_failure_aborts_before_deleting() {
    let server = diamond_site();
    server.fail_task_listing();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    let err = orchestrator
        .pause(&sales(), PauseOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PauseError::Client(_)));
    assert!(server.destructive_calls().is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_pause_without_tasks_is_empty() {
    let server = Arc::new(FakeServer::new());
    server.add_datasource("ds-idle", "Idle");
    let orchestrator = orchestrator(&server, Arc::new(MemorySnapshotStore::new()));

    let report = orchestrator
        .pause(
            &EntityRef::by_id(EntityKind::Datasource, "ds-idle"),
            PauseOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.status(), BatchStatus::Empty);
    assert!(report.snapshots.is_empty());
    assert!(server.destructive_calls().is_empty());
}

#[tokio::test]
async fn test_pausing_twice_is_idempotent() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    let second = orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();

    assert_eq!(second.status(), BatchStatus::Empty);
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn test_partial_delete_failure_keeps_successes_resumable() {
    let server = Arc::new(FakeServer::new());
    let orders = server.add_datasource("ds-orders", "Orders");
    server.add_schedule("s1", "Early", ScheduleState::Active);
    server.add_schedule("s2", "Midday", ScheduleState::Active);
    server.add_schedule("s3", "Late", ScheduleState::Active);
    server.add_task("t1", &orders, "s1");
    server.add_task("t2", &orders, "s2");
    server.add_task("t3", &orders, "s3");
    server.fail_delete("t2");

    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());
    let root = EntityRef::by_id(EntityKind::Datasource, "ds-orders");

    let report = orchestrator.pause(&root, PauseOptions::default()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert_eq!(report.batch.summary.succeeded, 2);
    assert_eq!(report.batch.summary.failed, 1);

    let failure = report.batch.failures().next().unwrap();
    assert_eq!(failure.operation, OperationKind::Delete);
    match &failure.error {
        Some(TaskOperationError::DeleteFailed { task_id, .. }) => assert_eq!(task_id, "t2"),
        other => panic!("expected delete failure, got {:?}", other),
    }

    // the failed task is still live, so only two snapshots remain on record
    assert_eq!(report.snapshots.len(), 2);
    assert_eq!(store.len().await, 2);
    assert_eq!(server.tasks().len(), 1);

    let resumed = orchestrator.resume_root(&root).await.unwrap();
    assert_eq!(resumed.status(), BatchStatus::Success);
    assert_eq!(resumed.batch.summary.succeeded, 2);

    let schedules: Vec<String> = server.bindings().into_iter().map(|b| b.1).collect();
    assert_eq!(schedules, vec!["s1", "s2", "s3"]);
}

#[tokio::test]
async fn test_task_without_id_is_reported() {
    let server = Arc::new(FakeServer::new());
    let orders = server.add_datasource("ds-orders", "Orders");
    server.add_schedule("s1", "Early", ScheduleState::Active);
    server.add_task("t1", &orders, "s1");
    server.add_task_without_id(&orders, "s1");

    let orchestrator = orchestrator(&server, Arc::new(MemorySnapshotStore::new()));
    let report = orchestrator
        .pause(
            &EntityRef::by_id(EntityKind::Datasource, "ds-orders"),
            PauseOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert!(report
        .batch
        .failures()
        .any(|o| matches!(o.error, Some(TaskOperationError::MissingTaskId { .. }))));
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    let report = orchestrator
        .pause(
            &sales(),
            PauseOptions {
                include_upstream: true,
                dry_run: true,
            },
        )
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.snapshots.len(), 4);
    assert_eq!(report.status(), BatchStatus::Empty);
    assert!(server.destructive_calls().is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_pause_without_upstream_only_touches_workbook() {
    let server = diamond_site();
    let orchestrator = orchestrator(&server, Arc::new(MemorySnapshotStore::new()));

    let report = orchestrator
        .pause(
            &sales(),
            PauseOptions {
                include_upstream: false,
                dry_run: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(
        server.destructive_calls(),
        vec![Call::DeleteTask("t-wb".to_string())]
    );
}

#[tokio::test]
async fn test_empty_resume_makes_no_calls() {
    let server = diamond_site();
    let orchestrator = orchestrator(&server, Arc::new(MemorySnapshotStore::new()));

    let report = orchestrator.resume(Vec::new()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::Empty);
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn test_resume_with_missing_schedule_retains_snapshot() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    server.remove_schedule("hourly");
    server.clear_calls();

    let report = orchestrator.resume_root(&sales()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert_eq!(report.retained.len(), 1);
    assert_eq!(report.retained[0].owner.id, "ds-orders");
    assert!(report.batch.failures().any(|o| matches!(
        &o.error,
        Some(TaskOperationError::ScheduleMissing { schedule_id, .. }) if schedule_id == "hourly"
    )));

    // no create was attempted against the missing schedule
    assert!(!server.calls().iter().any(|c| matches!(
        c,
        Call::CreateTask { schedule_id, .. } if schedule_id == "hourly"
    )));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_resume_with_suspended_schedule_is_distinct() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    server.force_schedule_state("nightly", ScheduleState::Suspended);

    let report = orchestrator.resume_root(&sales()).await.unwrap();

    assert_eq!(report.retained.len(), 3);
    assert!(report.batch.failures().all(|o| matches!(
        o.error,
        Some(TaskOperationError::ScheduleSuspended { .. })
    )));

    // once the schedule is back the retained snapshots resume cleanly
    server.force_schedule_state("nightly", ScheduleState::Active);
    let retry = orchestrator.resume_root(&sales()).await.unwrap();
    assert_eq!(retry.status(), BatchStatus::Success);
    assert_eq!(retry.batch.summary.succeeded, 3);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_create_failure_is_collected() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    server.fail_create_for("ds-base");

    let report = orchestrator.resume_root(&sales()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert_eq!(report.batch.summary.succeeded, 3);
    assert_eq!(report.retained.len(), 1);
    assert!(matches!(
        report.batch.failures().next().and_then(|o| o.error.clone()),
        Some(TaskOperationError::CreateFailed { .. })
    ));
}

#[tokio::test]
async fn test_schedule_lookup_happens_once_per_schedule() {
    let server = diamond_site();
    let orchestrator = orchestrator(&server, Arc::new(MemorySnapshotStore::new()));

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    server.clear_calls();
    orchestrator.resume_root(&sales()).await.unwrap();

    let lookups = server
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::GetSchedule(_)))
        .count();
    assert_eq!(lookups, 2);
}

#[tokio::test]
async fn test_resume_reports_snapshots_the_store_kept() {
    let server = diamond_site();
    let store = Arc::new(StickyStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    let report = orchestrator.resume_root(&sales()).await.unwrap();

    // the creates went through, so the report must survive the failed cleanup
    assert_eq!(report.status(), BatchStatus::Success);
    assert_eq!(report.batch.summary.succeeded, 4);
    assert_eq!(server.tasks().len(), 5);
    assert!(!report.store_is_consistent());
    assert_eq!(report.unremoved_snapshot_ids.len(), 4);
    assert_eq!(store.len().await, 4);

    let created: Vec<String> = report
        .batch
        .outcomes
        .iter()
        .filter_map(|o| o.snapshot_id.clone())
        .collect();
    for snapshot_id in &report.unremoved_snapshot_ids {
        assert!(created.contains(snapshot_id));
    }

    // a retry finds the tasks already live and does not recreate them
    server.clear_calls();
    let retry = orchestrator.resume_root(&sales()).await.unwrap();
    assert_eq!(retry.status(), BatchStatus::Success);
    assert_eq!(retry.batch.summary.succeeded, 4);
    assert!(server.destructive_calls().is_empty());
    assert_eq!(server.tasks().len(), 5);
}

#[tokio::test]
async fn test_resume_skips_bindings_already_live() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    let base = Entity::datasource("ds-base", "Warehouse Base");
    server.add_task("t-base-manual", &base, "nightly");
    server.clear_calls();

    let report = orchestrator.resume_root(&sales()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::Success);
    assert_eq!(report.batch.summary.succeeded, 4);
    assert!(!server.calls().iter().any(|c| matches!(
        c,
        Call::CreateTask { owner_id, .. } if owner_id == "ds-base"
    )));
    assert!(report.batch.outcomes.iter().any(|o| o.owner.id == "ds-base"
        && o.task_id.as_deref() == Some("t-base-manual")));
    assert_eq!(server.tasks().len(), 5);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_resume_listing_failure_aborts_before_creating() {
    let server = diamond_site();
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    server.fail_task_listing();
    server.clear_calls();

    let err = orchestrator.resume_root(&sales()).await.unwrap_err();

    assert!(matches!(err, PauseError::Client(_)));
    assert!(server.destructive_calls().is_empty());
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn test_pause_reports_stale_snapshots_of_failed_deletes() {
    let server = diamond_site();
    server.fail_delete("t-base");
    let store = Arc::new(StickyStore::new());
    let orchestrator = orchestrator(&server, store.clone());

    let report = orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert_eq!(report.snapshots.len(), 3);
    assert!(!report.store_is_consistent());
    assert_eq!(report.stale_snapshot_ids.len(), 1);
    assert_eq!(store.len().await, 4);

    let failed = report.batch.failures().next().unwrap();
    assert_eq!(failed.task_id.as_deref(), Some("t-base"));

    let stale = store.load_all().await.unwrap();
    let stale = stale
        .iter()
        .find(|s| s.snapshot_id == report.stale_snapshot_ids[0])
        .unwrap();
    assert_eq!(stale.owner.id, "ds-base");
}

#[tokio::test]
async fn test_clean_runs_leave_the_store_consistent() {
    let server = diamond_site();
    let orchestrator = orchestrator(&server, Arc::new(MemorySnapshotStore::new()));

    let paused = orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    let resumed = orchestrator.resume_root(&sales()).await.unwrap();

    assert!(paused.store_is_consistent());
    assert!(resumed.store_is_consistent());
}

#[tokio::test]
async fn test_file_store_carries_pause_into_later_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paused.json");
    let server = diamond_site();
    let before = server.bindings();

    {
        let store = Arc::new(JsonFileSnapshotStore::new(&path));
        let orchestrator = orchestrator(&server, store);
        orchestrator.pause(&sales(), PauseOptions::default()).await.unwrap();
    }

    let store = Arc::new(JsonFileSnapshotStore::new(&path));
    assert_eq!(store.load_all().await.unwrap().len(), 4);

    let orchestrator = orchestrator(&server, store.clone());
    let report = orchestrator.resume_root(&sales()).await.unwrap();

    assert_eq!(report.status(), BatchStatus::Success);
    assert!(store.load_all().await.unwrap().is_empty());
    assert_eq!(server.bindings(), before);
}
