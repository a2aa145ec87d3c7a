// ABOUTME: API client boundary between the pause engine and the Tableau server
// ABOUTME: Defines the capability trait the engine calls and exports the REST implementation

pub mod error;
pub mod metadata;
pub mod rest;

use async_trait::async_trait;

pub use error::{ClientError, Result};
pub use metadata::{DependencyGraphPayload, GraphEdge, GraphNode, GraphNodeType};
pub use rest::{ConnectionSettings, RestClient};

use crate::model::{
    Entity, EntityKind, ExtractRefreshTask, Schedule, ScheduleState, TaskOwner, TriggerParams,
};

/// Everything the engine needs from the server.
///
/// Implementations own transport, authentication and wire formats. The engine
/// never retries a call; a failed call is reported as-is.
#[async_trait]
pub trait TableauApi: Send + Sync {
    /// Upstream dependency graph for one workbook, from a single query
    async fn query_dependency_graph(&self, workbook_id: &str) -> Result<DependencyGraphPayload>;

    /// All entities of `kind` whose name is exactly `name`
    async fn find_entities_by_name(&self, kind: EntityKind, name: &str) -> Result<Vec<Entity>>;

    async fn get_entity_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>>;

    /// Extract refresh tasks for an entity. May include tasks of other owners;
    /// callers filter by owner.
    async fn list_extract_refresh_tasks(&self, entity: &Entity) -> Result<Vec<ExtractRefreshTask>>;

    async fn delete_extract_refresh_task(&self, task_id: &str) -> Result<()>;

    /// Create a task binding `owner` to `schedule_id`; returns the new task id
    async fn create_extract_refresh_task(
        &self,
        owner: &TaskOwner,
        schedule_id: &str,
        trigger: &TriggerParams,
    ) -> Result<String>;

    async fn list_schedules(&self) -> Result<Vec<Schedule>>;

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>>;

    async fn set_schedule_state(&self, schedule_id: &str, state: ScheduleState) -> Result<Schedule>;
}
