// ABOUTME: Error types for dependency resolution and pause/resume batches
// ABOUTME: Separates batch-aborting errors from per-task failures collected in reports

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;
use crate::model::{Entity, EntityKind, TaskOwner};

/// Errors that abort a whole pause, resume or schedule operation before any
/// destructive call is issued.
#[derive(Error, Debug)]
pub enum PauseError {
    #[error("No {kind} matches {reference}")]
    NotFound { kind: String, reference: String },

    #[error("Multiple {kind}s match the name '{name}'; use the luid instead: {}", .candidates.join(", "))]
    AmbiguousName {
        kind: String,
        name: String,
        candidates: Vec<String>,
    },

    #[error("Upstream dependency query failed: {message}")]
    UpstreamQuery { message: String },

    #[error("API error: {0}")]
    Client(#[from] ClientError),

    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a single delete or create call. Collected per task; never
/// aborts the batch it belongs to.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOperationError {
    #[error("Failed to delete task {task_id} for {owner}: {message}")]
    DeleteFailed {
        task_id: String,
        owner: TaskOwner,
        message: String,
    },

    #[error("Failed to create task for {owner} on schedule {schedule_id}: {message}")]
    CreateFailed {
        owner: TaskOwner,
        schedule_id: String,
        message: String,
    },

    #[error("Task for {owner} has no task id and cannot be deleted")]
    MissingTaskId { owner: TaskOwner },

    #[error("Schedule {schedule_id} for {owner} no longer exists")]
    ScheduleMissing {
        schedule_id: String,
        owner: TaskOwner,
    },

    #[error("Schedule {schedule_id} for {owner} is suspended")]
    ScheduleSuspended {
        schedule_id: String,
        owner: TaskOwner,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PauseError {
    pub fn not_found(kind: impl ToString, reference: impl ToString) -> Self {
        PauseError::NotFound {
            kind: kind.to_string(),
            reference: reference.to_string(),
        }
    }

    pub fn ambiguous(kind: impl ToString, name: &str, candidates: Vec<String>) -> Self {
        PauseError::AmbiguousName {
            kind: kind.to_string(),
            name: name.to_string(),
            candidates,
        }
    }

    pub fn ambiguous_entities(kind: EntityKind, name: &str, entities: &[Entity]) -> Self {
        Self::ambiguous(kind, name, entities.iter().map(describe_entity).collect())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        PauseError::UpstreamQuery {
            message: message.into(),
        }
    }
}

fn describe_entity(entity: &Entity) -> String {
    match &entity.project {
        Some(project) => format!("{} [project: {}, luid: {}]", entity.name, project, entity.id),
        None => format!("{} [luid: {}]", entity.name, entity.id),
    }
}

pub type Result<T> = std::result::Result<T, PauseError>;
