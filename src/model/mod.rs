// ABOUTME: Domain model for Tableau content, extract refresh tasks and schedules
// ABOUTME: Exports the entity, task and schedule types shared by the engine and client

pub mod entity;
pub mod schedule;
pub mod task;

pub use entity::{Entity, EntityKind, EntityRef};
pub use schedule::{Schedule, ScheduleRef, ScheduleState};
pub use task::{ExtractRefreshTask, RefreshType, ScheduleBinding, TaskOwner, TriggerParams};
