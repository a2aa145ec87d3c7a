// ABOUTME: Per-task outcomes and batch reports for pause and resume runs
// ABOUTME: Aggregates every attempted delete/create so callers can retry exactly the failures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::TaskOperationError;
use super::snapshot::PausedTaskSnapshot;
use crate::model::{Entity, TaskOwner};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationKind {
    Delete,
    Create,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub operation: OperationKind,
    pub owner: TaskOwner,
    pub schedule_id: String,
    /// Deleted task id for pauses, newly assigned id for resumes
    pub task_id: Option<String>,
    pub snapshot_id: Option<String>,
    pub status: OperationStatus,
    pub error: Option<TaskOperationError>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchStatus {
    /// Nothing needed doing; no calls were attempted
    Empty,
    Success,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_operations: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// Outcomes of one batch of independent task calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub status: BatchStatus,
    pub outcomes: Vec<TaskOutcome>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseReport {
    pub root: Entity,
    pub targets: Vec<Entity>,
    pub dry_run: bool,
    /// Snapshots of tasks that were actually deleted
    pub snapshots: Vec<PausedTaskSnapshot>,
    /// Snapshots left in the store although their task is still live
    #[serde(default)]
    pub stale_snapshot_ids: Vec<String>,
    pub batch: BatchResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeReport {
    /// Snapshots whose task could not be recreated; still in the store
    pub retained: Vec<PausedTaskSnapshot>,
    /// Snapshots whose task was recreated but which could not be dropped
    /// from the store
    #[serde(default)]
    pub unremoved_snapshot_ids: Vec<String>,
    pub batch: BatchResult,
}

impl TaskOutcome {
    pub fn succeeded(
        operation: OperationKind,
        owner: TaskOwner,
        schedule_id: String,
        task_id: Option<String>,
        snapshot_id: Option<String>,
    ) -> Self {
        Self {
            operation,
            owner,
            schedule_id,
            task_id,
            snapshot_id,
            status: OperationStatus::Success,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        operation: OperationKind,
        owner: TaskOwner,
        schedule_id: String,
        task_id: Option<String>,
        snapshot_id: Option<String>,
        error: TaskOperationError,
    ) -> Self {
        Self {
            operation,
            owner,
            schedule_id,
            task_id,
            snapshot_id,
            status: OperationStatus::Failed,
            error: Some(error),
            finished_at: Utc::now(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

impl BatchResult {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            status: BatchStatus::Empty,
            outcomes: Vec::new(),
            summary: BatchSummary::default(),
        }
    }

    pub fn add_outcome(&mut self, outcome: TaskOutcome) {
        self.outcomes.push(outcome);
        self.update_summary();
    }

    pub fn mark_completed(&mut self) {
        self.end_time = Some(Utc::now());
        self.duration = Some(
            (Utc::now() - self.start_time)
                .to_std()
                .unwrap_or(Duration::ZERO),
        );
        self.update_status();
        self.update_summary();
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_successful())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        matches!(self.status, BatchStatus::Success | BatchStatus::Empty)
    }

    fn update_status(&mut self) {
        let has_failed = self.outcomes.iter().any(|o| !o.is_successful());
        let has_success = self.outcomes.iter().any(|o| o.is_successful());

        self.status = match (has_failed, has_success) {
            (false, false) => BatchStatus::Empty,
            (false, true) => BatchStatus::Success,
            (true, false) => BatchStatus::Failed,
            (true, true) => BatchStatus::PartialSuccess,
        };
    }

    fn update_summary(&mut self) {
        let total = self.outcomes.len();
        let succeeded = self.outcomes.iter().filter(|o| o.is_successful()).count();

        let success_rate = if total > 0 {
            (succeeded as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        self.summary = BatchSummary {
            total_operations: total,
            succeeded,
            failed: total - succeeded,
            success_rate,
        };
    }
}

impl PauseReport {
    pub fn status(&self) -> BatchStatus {
        self.batch.status
    }

    pub fn store_is_consistent(&self) -> bool {
        self.stale_snapshot_ids.is_empty()
    }
}

impl ResumeReport {
    pub fn status(&self) -> BatchStatus {
        self.batch.status
    }

    pub fn store_is_consistent(&self) -> bool {
        self.unremoved_snapshot_ids.is_empty()
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Empty => write!(f, "empty"),
            BatchStatus::Success => write!(f, "success"),
            BatchStatus::PartialSuccess => write!(f, "partial_success"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Create => write!(f, "create"),
        }
    }
}
