// ABOUTME: Server-level schedules and their active/suspended state
// ABOUTME: Schedules are toggled as a whole and never carry task definitions

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScheduleState {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub state: ScheduleState,
    #[serde(default)]
    pub frequency: Option<String>,
    /// "Extract", "Subscription", "Flow", ...
    #[serde(default)]
    pub schedule_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRef {
    Id(String),
    Name(String),
}

impl Schedule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: ScheduleState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
            frequency: None,
            schedule_type: Some("Extract".to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ScheduleState::Active
    }

    pub fn is_extract_schedule(&self) -> bool {
        match &self.schedule_type {
            Some(schedule_type) => schedule_type.eq_ignore_ascii_case("extract"),
            None => true,
        }
    }
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleState::Active => "Active",
            ScheduleState::Suspended => "Suspended",
        }
    }
}

impl std::str::FromStr for ScheduleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(ScheduleState::Active),
            "Suspended" => Ok(ScheduleState::Suspended),
            other => Err(format!("unknown schedule state '{}'", other)),
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ScheduleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleRef::Id(id) => write!(f, "schedule luid '{}'", id),
            ScheduleRef::Name(name) => write!(f, "schedule named '{}'", name),
        }
    }
}
