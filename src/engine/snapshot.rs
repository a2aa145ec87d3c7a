// ABOUTME: Paused-task snapshots and the stores that keep them between pause and resume
// ABOUTME: Provides an in-memory store and a JSON file ledger for resuming in a later run

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::error::StoreError;
use crate::model::{Entity, EntityRef, ExtractRefreshTask, ScheduleBinding, TaskOwner, TriggerParams};

/// Everything needed to recreate one deleted extract refresh task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PausedTaskSnapshot {
    pub snapshot_id: String,
    /// Entity the pause was invoked on; upstream datasource snapshots point at
    /// the workbook that pulled them in
    pub root: EntityRef,
    pub owner: TaskOwner,
    pub schedule: ScheduleBinding,
    pub trigger: TriggerParams,
    pub original_task_id: Option<String>,
    pub paused_at: DateTime<Utc>,
}

impl PausedTaskSnapshot {
    pub fn capture(root: &Entity, task: &ExtractRefreshTask) -> Self {
        Self {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            root: root.as_ref_by_id(),
            owner: task.owner.clone(),
            schedule: task.schedule.clone(),
            trigger: task.trigger.clone(),
            original_task_id: task.id.clone(),
            paused_at: Utc::now(),
        }
    }

    pub fn belongs_to_root(&self, root: &Entity) -> bool {
        self.root == root.as_ref_by_id()
    }

    /// The task definition this snapshot recreates, without a server id
    pub fn to_task(&self) -> ExtractRefreshTask {
        ExtractRefreshTask::new(
            None,
            self.owner.clone(),
            self.schedule.clone(),
            self.trigger.clone(),
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable home for snapshots between a pause and its resume
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Add snapshots, ignoring any whose snapshot id is already stored
    async fn save_all(&self, snapshots: &[PausedTaskSnapshot]) -> StoreResult<()>;

    async fn load_all(&self) -> StoreResult<Vec<PausedTaskSnapshot>>;

    async fn load_for_root(&self, root: &Entity) -> StoreResult<Vec<PausedTaskSnapshot>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|s| s.belongs_to_root(root))
            .collect())
    }

    async fn remove(&self, snapshot_ids: &[String]) -> StoreResult<()>;
}

fn merge_into(existing: &mut Vec<PausedTaskSnapshot>, incoming: &[PausedTaskSnapshot]) {
    let known: HashSet<String> = existing.iter().map(|s| s.snapshot_id.clone()).collect();
    existing.extend(
        incoming
            .iter()
            .filter(|s| !known.contains(&s.snapshot_id))
            .cloned(),
    );
}

fn remove_from(existing: &mut Vec<PausedTaskSnapshot>, snapshot_ids: &[String]) {
    let doomed: HashSet<&String> = snapshot_ids.iter().collect();
    existing.retain(|s| !doomed.contains(&s.snapshot_id));
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<PausedTaskSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_all(&self, snapshots: &[PausedTaskSnapshot]) -> StoreResult<()> {
        let mut stored = self.snapshots.write().await;
        merge_into(&mut stored, snapshots);
        Ok(())
    }

    async fn load_all(&self) -> StoreResult<Vec<PausedTaskSnapshot>> {
        Ok(self.snapshots.read().await.clone())
    }

    async fn remove(&self, snapshot_ids: &[String]) -> StoreResult<()> {
        let mut stored = self.snapshots.write().await;
        remove_from(&mut stored, snapshot_ids);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotLedger {
    #[serde(default)]
    paused_tasks: Vec<PausedTaskSnapshot>,
}

/// Snapshot ledger kept as a single JSON document on disk
#[derive(Debug)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_ledger(&self) -> StoreResult<SnapshotLedger> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(SnapshotLedger::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SnapshotLedger::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_ledger(&self, ledger: &SnapshotLedger) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(ledger)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(
            "Wrote {} paused task snapshots to {}",
            ledger.paused_tasks.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save_all(&self, snapshots: &[PausedTaskSnapshot]) -> StoreResult<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut ledger = self.read_ledger().await?;
        merge_into(&mut ledger.paused_tasks, snapshots);
        self.write_ledger(&ledger).await
    }

    async fn load_all(&self) -> StoreResult<Vec<PausedTaskSnapshot>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_ledger().await?.paused_tasks)
    }

    async fn remove(&self, snapshot_ids: &[String]) -> StoreResult<()> {
        if snapshot_ids.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut ledger = self.read_ledger().await?;
        remove_from(&mut ledger.paused_tasks, snapshot_ids);
        self.write_ledger(&ledger).await
    }
}
