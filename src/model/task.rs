// ABOUTME: Extract refresh task definitions as listed by the server
// ABOUTME: Captures the owner, schedule binding and trigger parameters needed to recreate a task

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RefreshType {
    #[default]
    FullRefresh,
    IncrementalRefresh,
}

/// The workbook or datasource a task refreshes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskOwner {
    pub kind: EntityKind,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScheduleBinding {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Task-type-specific parameters carried across a pause
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct TriggerParams {
    #[serde(default)]
    pub refresh_type: RefreshType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractRefreshTask {
    /// Assigned by the server; absent until the task has been created
    pub id: Option<String>,
    pub owner: TaskOwner,
    pub schedule: ScheduleBinding,
    #[serde(default)]
    pub trigger: TriggerParams,
}

impl TaskOwner {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn is(&self, entity: &Entity) -> bool {
        self.kind == entity.kind && self.id == entity.id
    }
}

impl From<&Entity> for TaskOwner {
    fn from(entity: &Entity) -> Self {
        Self::new(entity.kind, entity.id.clone())
    }
}

impl ScheduleBinding {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

impl ExtractRefreshTask {
    pub fn new(
        id: Option<String>,
        owner: TaskOwner,
        schedule: ScheduleBinding,
        trigger: TriggerParams,
    ) -> Self {
        Self {
            id,
            owner,
            schedule,
            trigger,
        }
    }

    pub fn is_owned_by(&self, entity: &Entity) -> bool {
        self.owner.is(entity)
    }

    /// The (schedule, owner) pair a pause/resume cycle must preserve
    pub fn binding_key(&self) -> (String, TaskOwner) {
        (self.schedule.id.clone(), self.owner.clone())
    }
}

impl fmt::Display for RefreshType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshType::FullRefresh => write!(f, "FullRefresh"),
            RefreshType::IncrementalRefresh => write!(f, "IncrementalRefresh"),
        }
    }
}

impl std::str::FromStr for RefreshType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FullRefresh" | "full" => Ok(RefreshType::FullRefresh),
            "IncrementalRefresh" | "incremental" => Ok(RefreshType::IncrementalRefresh),
            other => Err(format!("unknown refresh type '{}'", other)),
        }
    }
}

impl fmt::Display for TaskOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
