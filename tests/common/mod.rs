// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides an in-memory Tableau server fake with programmable failures and a call log

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use extract_pause::client::{
    ClientError, DependencyGraphPayload, GraphNode, GraphNodeType, Result, TableauApi,
};
use extract_pause::engine::{
    MemorySnapshotStore, PauseOrchestrator, PausedTaskSnapshot, SnapshotStore, StoreError,
};
use extract_pause::engine::snapshot::StoreResult;
use extract_pause::model::{
    Entity, EntityKind, ExtractRefreshTask, RefreshType, Schedule, ScheduleBinding, ScheduleState,
    TaskOwner, TriggerParams,
};

/// Every call the engine made, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    QueryGraph(String),
    FindByName(EntityKind, String),
    GetById(EntityKind, String),
    ListTasks(String),
    DeleteTask(String),
    CreateTask { owner_id: String, schedule_id: String },
    ListSchedules,
    GetSchedule(String),
    SetScheduleState(String, ScheduleState),
}

impl Call {
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Call::DeleteTask(_) | Call::CreateTask { .. } | Call::SetScheduleState(..)
        )
    }
}

#[derive(Default)]
struct ServerState {
    entities: Vec<Entity>,
    tasks: Vec<ExtractRefreshTask>,
    schedules: Vec<Schedule>,
    graphs: HashMap<String, DependencyGraphPayload>,
    failing_deletes: HashSet<String>,
    failing_creates: HashSet<String>,
    graph_failure: Option<String>,
    listing_failure: bool,
    next_task_id: u64,
    calls: Vec<Call>,
}

/// In-memory stand-in for a Tableau site.
///
/// Name lookups match case-insensitively and task listings return every task
/// on the site, like the real server; the engine has to filter both.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn add_workbook(&self, id: &str, name: &str) -> Entity {
        let entity = Entity::workbook(id, name);
        self.state().entities.push(entity.clone());
        entity
    }

    pub fn add_datasource(&self, id: &str, name: &str) -> Entity {
        let entity = Entity::datasource(id, name);
        self.state().entities.push(entity.clone());
        entity
    }

    pub fn add_entity(&self, entity: Entity) {
        self.state().entities.push(entity);
    }

    pub fn add_schedule(&self, id: &str, name: &str, state: ScheduleState) {
        self.state().schedules.push(Schedule::new(id, name, state));
    }

    pub fn add_schedule_of_type(&self, id: &str, name: &str, schedule_type: &str) {
        let mut schedule = Schedule::new(id, name, ScheduleState::Active);
        schedule.schedule_type = Some(schedule_type.to_string());
        self.state().schedules.push(schedule);
    }

    pub fn remove_schedule(&self, id: &str) {
        self.state().schedules.retain(|s| s.id != id);
    }

    pub fn force_schedule_state(&self, id: &str, state: ScheduleState) {
        for schedule in self.state().schedules.iter_mut().filter(|s| s.id == id) {
            schedule.state = state;
        }
    }

    pub fn add_task(&self, task_id: &str, owner: &Entity, schedule_id: &str) {
        self.add_task_with(task_id, owner, schedule_id, RefreshType::FullRefresh);
    }

    pub fn add_task_with(
        &self,
        task_id: &str,
        owner: &Entity,
        schedule_id: &str,
        refresh_type: RefreshType,
    ) {
        let task = ExtractRefreshTask::new(
            Some(task_id.to_string()),
            TaskOwner::from(owner),
            ScheduleBinding::new(schedule_id),
            TriggerParams {
                refresh_type,
                ..TriggerParams::default()
            },
        );
        self.state().tasks.push(task);
    }

    pub fn add_task_without_id(&self, owner: &Entity, schedule_id: &str) {
        let task = ExtractRefreshTask::new(
            None,
            TaskOwner::from(owner),
            ScheduleBinding::new(schedule_id),
            TriggerParams::default(),
        );
        self.state().tasks.push(task);
    }

    pub fn set_graph(&self, workbook_id: &str, payload: DependencyGraphPayload) {
        self.state().graphs.insert(workbook_id.to_string(), payload);
    }

    pub fn fail_delete(&self, task_id: &str) {
        self.state().failing_deletes.insert(task_id.to_string());
    }

    pub fn fail_create_for(&self, owner_id: &str) {
        self.state().failing_creates.insert(owner_id.to_string());
    }

    pub fn fail_graph_query(&self, message: &str) {
        self.state().graph_failure = Some(message.to_string());
    }

    pub fn fail_task_listing(&self) {
        self.state().listing_failure = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn destructive_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_destructive).collect()
    }

    pub fn graph_queries(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::QueryGraph(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn tasks(&self) -> Vec<ExtractRefreshTask> {
        self.state().tasks.clone()
    }

    pub fn schedule(&self, id: &str) -> Option<Schedule> {
        self.state().schedules.iter().find(|s| s.id == id).cloned()
    }

    /// Live `(owner, schedule, refresh type)` bindings, sorted, ignoring task ids
    pub fn bindings(&self) -> Vec<(TaskOwner, String, RefreshType)> {
        let mut bindings: Vec<_> = self
            .state()
            .tasks
            .iter()
            .map(|t| (t.owner.clone(), t.schedule.id.clone(), t.trigger.refresh_type))
            .collect();
        bindings.sort_by(|a, b| (&a.0.id, &a.1).cmp(&(&b.0.id, &b.1)));
        bindings
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }
}

fn status_error(status: u16, body: &str) -> ClientError {
    ClientError::Status {
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl TableauApi for FakeServer {
    async fn query_dependency_graph(&self, workbook_id: &str) -> Result<DependencyGraphPayload> {
        self.record(Call::QueryGraph(workbook_id.to_string()));
        let state = self.state();

        if let Some(message) = &state.graph_failure {
            return Err(ClientError::InvalidResponse(message.clone()));
        }

        match state.graphs.get(workbook_id) {
            Some(payload) => Ok(payload.clone()),
            None => {
                let mut payload = DependencyGraphPayload::new();
                if let Some(workbook) = state
                    .entities
                    .iter()
                    .find(|e| e.is_workbook() && e.id == workbook_id)
                {
                    payload.add_node(GraphNode::new(
                        &workbook.id,
                        &workbook.name,
                        GraphNodeType::Workbook,
                    ));
                }
                Ok(payload)
            }
        }
    }

    async fn find_entities_by_name(&self, kind: EntityKind, name: &str) -> Result<Vec<Entity>> {
        self.record(Call::FindByName(kind, name.to_string()));
        Ok(self
            .state()
            .entities
            .iter()
            .filter(|e| e.kind == kind && e.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    async fn get_entity_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        self.record(Call::GetById(kind, id.to_string()));
        Ok(self
            .state()
            .entities
            .iter()
            .find(|e| e.kind == kind && e.id == id)
            .cloned())
    }

    async fn list_extract_refresh_tasks(&self, entity: &Entity) -> Result<Vec<ExtractRefreshTask>> {
        self.record(Call::ListTasks(entity.id.clone()));
        let state = self.state();
        if state.listing_failure {
            return Err(status_error(503, "task listing unavailable"));
        }
        Ok(state.tasks.clone())
    }

    async fn delete_extract_refresh_task(&self, task_id: &str) -> Result<()> {
        self.record(Call::DeleteTask(task_id.to_string()));
        let mut state = self.state();

        if state.failing_deletes.contains(task_id) {
            return Err(status_error(500, "internal error deleting task"));
        }

        let before = state.tasks.len();
        state.tasks.retain(|t| t.id.as_deref() != Some(task_id));
        if state.tasks.len() == before {
            return Err(status_error(404, "task not found"));
        }
        Ok(())
    }

    async fn create_extract_refresh_task(
        &self,
        owner: &TaskOwner,
        schedule_id: &str,
        trigger: &TriggerParams,
    ) -> Result<String> {
        self.record(Call::CreateTask {
            owner_id: owner.id.clone(),
            schedule_id: schedule_id.to_string(),
        });
        let mut state = self.state();

        if state.failing_creates.contains(&owner.id) {
            return Err(status_error(500, "internal error creating task"));
        }
        if !state.schedules.iter().any(|s| s.id == schedule_id) {
            return Err(status_error(404, "schedule not found"));
        }

        state.next_task_id += 1;
        let task_id = format!("recreated-{}", state.next_task_id);
        state.tasks.push(ExtractRefreshTask::new(
            Some(task_id.clone()),
            owner.clone(),
            ScheduleBinding::new(schedule_id),
            trigger.clone(),
        ));
        Ok(task_id)
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        self.record(Call::ListSchedules);
        Ok(self.state().schedules.clone())
    }

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        self.record(Call::GetSchedule(schedule_id.to_string()));
        Ok(self.schedule(schedule_id))
    }

    async fn set_schedule_state(&self, schedule_id: &str, state: ScheduleState) -> Result<Schedule> {
        self.record(Call::SetScheduleState(schedule_id.to_string(), state));
        let mut server = self.state();
        let schedule = server
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| status_error(404, "schedule not found"))?;
        schedule.state = state;
        Ok(schedule.clone())
    }
}

/// Store that refuses every write
pub struct FailingStore;

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn save_all(&self, _snapshots: &[PausedTaskSnapshot]) -> StoreResult<()> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "snapshot file is read-only",
        )))
    }

    async fn load_all(&self) -> StoreResult<Vec<PausedTaskSnapshot>> {
        Ok(Vec::new())
    }

    async fn remove(&self, _snapshot_ids: &[String]) -> StoreResult<()> {
        Ok(())
    }
}

/// Store that saves and loads normally but cannot remove anything
#[derive(Default)]
pub struct StickyStore {
    inner: MemorySnapshotStore,
}

impl StickyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl SnapshotStore for StickyStore {
    async fn save_all(&self, snapshots: &[PausedTaskSnapshot]) -> StoreResult<()> {
        self.inner.save_all(snapshots).await
    }

    async fn load_all(&self) -> StoreResult<Vec<PausedTaskSnapshot>> {
        self.inner.load_all().await
    }

    async fn remove(&self, _snapshot_ids: &[String]) -> StoreResult<()> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "snapshot file became read-only",
        )))
    }
}

pub fn orchestrator(server: &Arc<FakeServer>, store: Arc<dyn SnapshotStore>) -> PauseOrchestrator {
    let api: Arc<dyn TableauApi> = server.clone();
    PauseOrchestrator::new(api, store).with_max_concurrent(2)
}

/// Workbook "Sales" drawing from two published datasources that share a base:
///
/// wb-sales -> emb-1 -> ds-orders -> ds-base
/// wb-sales -> ds-customers -> ds-base
pub fn diamond_site() -> Arc<FakeServer> {
    let server = Arc::new(FakeServer::new());
    let workbook = server.add_workbook("wb-sales", "Sales");
    let orders = server.add_datasource("ds-orders", "Orders");
    let customers = server.add_datasource("ds-customers", "Customers");
    let base = server.add_datasource("ds-base", "Warehouse Base");
    let unrelated = server.add_datasource("ds-hr", "HR");

    let mut payload = DependencyGraphPayload::new();
    payload.add_node(GraphNode::new("wb-sales", "Sales", GraphNodeType::Workbook));
    payload.add_node(GraphNode::new("emb-1", "Sales (embedded)", GraphNodeType::EmbeddedDatasource));
    payload.add_node(GraphNode::new("ds-orders", "Orders", GraphNodeType::PublishedDatasource));
    payload.add_node(GraphNode::new("ds-customers", "Customers", GraphNodeType::PublishedDatasource));
    payload.add_node(GraphNode::new("ds-base", "Warehouse Base", GraphNodeType::PublishedDatasource));
    payload.add_edge("wb-sales", "emb-1");
    payload.add_edge("emb-1", "ds-orders");
    payload.add_edge("wb-sales", "ds-customers");
    payload.add_edge("ds-orders", "ds-base");
    payload.add_edge("ds-customers", "ds-base");
    server.set_graph("wb-sales", payload);

    server.add_schedule("nightly", "Nightly", ScheduleState::Active);
    server.add_schedule("hourly", "Hourly", ScheduleState::Active);

    server.add_task("t-wb", &workbook, "nightly");
    server.add_task_with("t-orders", &orders, "hourly", RefreshType::IncrementalRefresh);
    server.add_task("t-customers", &customers, "nightly");
    server.add_task("t-base", &base, "nightly");
    server.add_task("t-hr", &unrelated, "nightly");

    server
}
