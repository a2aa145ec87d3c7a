// ABOUTME: Pause/resume orchestrator that snapshots, deletes and recreates extract refresh tasks
// ABOUTME: Runs per-task calls concurrently under a semaphore and collects every outcome

use futures::future::join_all;
use futures::Future;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use super::error::{Result, TaskOperationError};
use super::inventory::TaskInventory;
use super::resolver::MetadataResolver;
use super::result::{BatchResult, OperationKind, PauseReport, ResumeReport, TaskOutcome};
use super::snapshot::{PausedTaskSnapshot, SnapshotStore};
use crate::client::TableauApi;
use crate::model::{Entity, EntityRef, Schedule, TaskOwner};

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct PauseOptions {
    /// Also pause published datasources upstream of a workbook
    pub include_upstream: bool,
    /// Resolve and snapshot, but neither store nor delete anything
    pub dry_run: bool,
}

impl Default for PauseOptions {
    fn default() -> Self {
        Self {
            include_upstream: true,
            dry_run: false,
        }
    }
}

pub struct PauseOrchestrator {
    api: Arc<dyn TableauApi>,
    store: Arc<dyn SnapshotStore>,
    resolver: MetadataResolver,
    inventory: TaskInventory,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

/// Result of looking up a snapshot's schedule before recreating its task
enum ScheduleCheck {
    Active,
    Missing,
    Suspended,
    LookupFailed(String),
}

impl PauseOrchestrator {
    pub fn new(api: Arc<dyn TableauApi>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            resolver: MetadataResolver::new(Arc::clone(&api)),
            inventory: TaskInventory::new(Arc::clone(&api)),
            api,
            store,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
        }
    }

    /// Bound the number of delete/create calls in flight at once
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        self.max_concurrent = max_concurrent;
        self.semaphore = Arc::new(Semaphore::new(max_concurrent));
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    pub fn inventory(&self) -> &TaskInventory {
        &self.inventory
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Pause every extract refresh task of an entity and, for a workbook, of
    /// its upstream published datasources.
    ///
    /// Resolution and listing errors abort before anything is deleted. So does
    /// a store that refuses the snapshots. Individual delete failures are
    /// collected in the report.
    #[instrument(skip(self), fields(root = %root_ref))]
    pub async fn pause(&self, root_ref: &EntityRef, options: PauseOptions) -> Result<PauseReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let resolution = self.resolver.resolve(root_ref, options.include_upstream).await?;
        let listed = self.inventory.list_for(&resolution.targets).await?;

        info!(
            "Pausing {} task(s) across {} target(s) for {}",
            listed.len(),
            resolution.targets.len(),
            resolution.root
        );

        let mut batch = BatchResult::new(run_id);
        let mut deletable = Vec::new();

        for (_, task) in &listed {
            match &task.id {
                Some(task_id) => deletable.push((
                    task_id.clone(),
                    PausedTaskSnapshot::capture(&resolution.root, task),
                )),
                None => {
                    warn!("Task for {} has no id; it cannot be paused", task.owner);
                    batch.add_outcome(TaskOutcome::failed(
                        OperationKind::Delete,
                        task.owner.clone(),
                        task.schedule.id.clone(),
                        None,
                        None,
                        TaskOperationError::MissingTaskId {
                            owner: task.owner.clone(),
                        },
                    ));
                }
            }
        }

        if options.dry_run {
            info!("Dry run: {} task(s) would be deleted", deletable.len());
            batch.mark_completed();
            return Ok(PauseReport {
                root: resolution.root,
                targets: resolution.targets,
                dry_run: true,
                snapshots: deletable.into_iter().map(|(_, snapshot)| snapshot).collect(),
                stale_snapshot_ids: Vec::new(),
                batch,
            });
        }

        let snapshots: Vec<PausedTaskSnapshot> =
            deletable.iter().map(|(_, snapshot)| snapshot.clone()).collect();
        self.store.save_all(&snapshots).await?;
        debug!("Stored {} snapshot(s) before deleting", snapshots.len());

        let outcomes = self
            .run_bounded(deletable, |(task_id, snapshot)| {
                let api = Arc::clone(&self.api);
                async move { delete_task(api.as_ref(), task_id, snapshot).await }
            })
            .await;

        let mut paused = Vec::new();
        let mut still_live = Vec::new();
        for (outcome, snapshot) in outcomes {
            if outcome.is_successful() {
                paused.push(snapshot);
            } else {
                still_live.push(snapshot.snapshot_id);
            }
            batch.add_outcome(outcome);
        }

        let stale_snapshot_ids = self
            .remove_or_report(still_live, "tasks that failed to delete")
            .await;

        batch.mark_completed();
        info!(
            "Pause of {} finished: {} ({} deleted, {} failed)",
            resolution.root, batch.status, batch.summary.succeeded, batch.summary.failed
        );

        Ok(PauseReport {
            root: resolution.root,
            targets: resolution.targets,
            dry_run: false,
            snapshots: paused,
            stale_snapshot_ids,
            batch,
        })
    }

    /// Recreate tasks from snapshots. Consumed snapshots leave the store;
    /// snapshots whose task could not be recreated stay and are returned.
    ///
    /// A snapshot whose (schedule, owner) binding is already live is consumed
    /// without a create. A listing error aborts before anything is created.
    #[instrument(skip(self, snapshots), fields(count = snapshots.len()))]
    pub async fn resume(&self, snapshots: Vec<PausedTaskSnapshot>) -> Result<ResumeReport> {
        let mut batch = BatchResult::new(uuid::Uuid::new_v4().to_string());

        if snapshots.is_empty() {
            info!("Nothing to resume");
            batch.mark_completed();
            return Ok(ResumeReport {
                retained: Vec::new(),
                unremoved_snapshot_ids: Vec::new(),
                batch,
            });
        }

        let live = self.live_bindings(&snapshots).await?;
        let (already_live, pending): (Vec<_>, Vec<_>) = snapshots
            .into_iter()
            .partition(|s| live.contains_key(&(s.schedule.id.clone(), s.owner.clone())));

        let mut consumed = Vec::new();
        for snapshot in already_live {
            let task_id = live
                .get(&(snapshot.schedule.id.clone(), snapshot.owner.clone()))
                .cloned()
                .flatten();
            info!(
                "Task for {} on schedule {} is already live, not recreating it",
                snapshot.owner, snapshot.schedule.id
            );
            batch.add_outcome(TaskOutcome::succeeded(
                OperationKind::Create,
                snapshot.owner,
                snapshot.schedule.id,
                task_id,
                Some(snapshot.snapshot_id.clone()),
            ));
            consumed.push(snapshot.snapshot_id);
        }

        let checks = self.check_schedules(&pending).await;

        let outcomes = self
            .run_bounded(pending, |snapshot| {
                let api = Arc::clone(&self.api);
                let check = checks.get(&snapshot.schedule.id);
                let precheck = match check {
                    Some(ScheduleCheck::Active) => None,
                    Some(ScheduleCheck::Missing) | None => {
                        Some(TaskOperationError::ScheduleMissing {
                            schedule_id: snapshot.schedule.id.clone(),
                            owner: snapshot.owner.clone(),
                        })
                    }
                    Some(ScheduleCheck::Suspended) => Some(TaskOperationError::ScheduleSuspended {
                        schedule_id: snapshot.schedule.id.clone(),
                        owner: snapshot.owner.clone(),
                    }),
                    Some(ScheduleCheck::LookupFailed(message)) => {
                        Some(TaskOperationError::CreateFailed {
                            owner: snapshot.owner.clone(),
                            schedule_id: snapshot.schedule.id.clone(),
                            message: format!("schedule lookup failed: {}", message),
                        })
                    }
                };
                async move {
                    match precheck {
                        Some(err) => {
                            warn!("Not recreating task for {}: {}", snapshot.owner, err);
                            let outcome = TaskOutcome::failed(
                                OperationKind::Create,
                                snapshot.owner.clone(),
                                snapshot.schedule.id.clone(),
                                None,
                                Some(snapshot.snapshot_id.clone()),
                                err,
                            );
                            (outcome, snapshot)
                        }
                        None => create_task(api.as_ref(), snapshot).await,
                    }
                }
            })
            .await;

        let mut retained = Vec::new();
        for (outcome, snapshot) in outcomes {
            if outcome.is_successful() {
                consumed.push(snapshot.snapshot_id);
            } else {
                retained.push(snapshot);
            }
            batch.add_outcome(outcome);
        }

        let recreated = consumed.len();
        let unremoved_snapshot_ids = self.remove_or_report(consumed, "recreated tasks").await;
        batch.mark_completed();

        info!(
            "Resume finished: {} ({} recreated, {} retained)",
            batch.status,
            recreated,
            retained.len()
        );

        Ok(ResumeReport {
            retained,
            unremoved_snapshot_ids,
            batch,
        })
    }

    /// Resume every snapshot recorded for a root entity
    #[instrument(skip(self), fields(root = %root_ref))]
    pub async fn resume_root(&self, root_ref: &EntityRef) -> Result<ResumeReport> {
        let root = self.resolver.lookup(root_ref).await?;
        let snapshots = self.store.load_for_root(&root).await?;
        debug!("Found {} snapshot(s) for {}", snapshots.len(), root);
        self.resume(snapshots).await
    }

    /// Task ids keyed by the (schedule, owner) bindings already on the server
    /// for the snapshots' owners. A snapshot left behind by an earlier resume
    /// matches one of these and must not be recreated.
    async fn live_bindings(
        &self,
        snapshots: &[PausedTaskSnapshot],
    ) -> Result<HashMap<(String, TaskOwner), Option<String>>> {
        let owners: IndexSet<TaskOwner> = snapshots.iter().map(|s| s.owner.clone()).collect();

        let listings = self
            .run_bounded(owners.into_iter().collect(), |owner: TaskOwner| {
                let entity = Entity::new(owner.kind, owner.id, "");
                async move { self.inventory.list_tasks(&entity).await }
            })
            .await;

        let mut live = HashMap::new();
        for listing in listings {
            for task in listing? {
                live.insert(task.binding_key(), task.id);
            }
        }
        Ok(live)
    }

    /// One lookup per distinct schedule, shared by every snapshot bound to it
    async fn check_schedules(&self, snapshots: &[PausedTaskSnapshot]) -> HashMap<String, ScheduleCheck> {
        let schedule_ids: IndexSet<String> = snapshots
            .iter()
            .map(|s| s.schedule.id.clone())
            .collect();

        let lookups = self
            .run_bounded(schedule_ids.into_iter().collect(), |schedule_id: String| {
                let api = Arc::clone(&self.api);
                async move {
                    let check = match api.get_schedule(&schedule_id).await {
                        Ok(Some(schedule)) => classify(&schedule),
                        Ok(None) => ScheduleCheck::Missing,
                        Err(e) => ScheduleCheck::LookupFailed(e.to_string()),
                    };
                    (schedule_id, check)
                }
            })
            .await;

        lookups.into_iter().collect()
    }

    /// Drop snapshots from the store after the server calls are done. Returns
    /// the ids that are still in the store if removal fails.
    async fn remove_or_report(&self, snapshot_ids: Vec<String>, describe: &str) -> Vec<String> {
        if snapshot_ids.is_empty() {
            return Vec::new();
        }

        match self.store.remove(&snapshot_ids).await {
            Ok(()) => Vec::new(),
            Err(e) => {
                error!(
                    "Could not drop {} snapshot(s) of {} from the store: {}; prune snapshot ids [{}] before the next resume",
                    snapshot_ids.len(),
                    describe,
                    e,
                    snapshot_ids.join(", ")
                );
                snapshot_ids
            }
        }
    }

    async fn run_bounded<T, R, F, Fut>(&self, items: Vec<T>, op: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let futures = items.into_iter().map(|item| {
            let semaphore = Arc::clone(&self.semaphore);
            let call = op(item);
            async move {
                let _permit = semaphore.acquire().await.ok();
                call.await
            }
        });

        join_all(futures).await
    }
}

fn classify(schedule: &Schedule) -> ScheduleCheck {
    if schedule.is_active() {
        ScheduleCheck::Active
    } else {
        ScheduleCheck::Suspended
    }
}

async fn delete_task(
    api: &dyn TableauApi,
    task_id: String,
    snapshot: PausedTaskSnapshot,
) -> (TaskOutcome, PausedTaskSnapshot) {
    let owner: TaskOwner = snapshot.owner.clone();
    let schedule_id = snapshot.schedule.id.clone();

    let outcome = match api.delete_extract_refresh_task(&task_id).await {
        Ok(()) => {
            debug!("Deleted task {} for {}", task_id, owner);
            TaskOutcome::succeeded(
                OperationKind::Delete,
                owner,
                schedule_id,
                Some(task_id),
                Some(snapshot.snapshot_id.clone()),
            )
        }
        Err(e) => {
            error!("Failed to delete task {} for {}: {}", task_id, owner, e);
            TaskOutcome::failed(
                OperationKind::Delete,
                owner.clone(),
                schedule_id,
                Some(task_id.clone()),
                None,
                TaskOperationError::DeleteFailed {
                    task_id,
                    owner,
                    message: e.to_string(),
                },
            )
        }
    };

    (outcome, snapshot)
}

async fn create_task(
    api: &dyn TableauApi,
    snapshot: PausedTaskSnapshot,
) -> (TaskOutcome, PausedTaskSnapshot) {
    let schedule_id = snapshot.schedule.id.clone();

    let outcome = match api
        .create_extract_refresh_task(&snapshot.owner, &schedule_id, &snapshot.trigger)
        .await
    {
        Ok(task_id) => {
            debug!(
                "Recreated task {} for {} on schedule {}",
                task_id, snapshot.owner, schedule_id
            );
            TaskOutcome::succeeded(
                OperationKind::Create,
                snapshot.owner.clone(),
                schedule_id,
                Some(task_id),
                Some(snapshot.snapshot_id.clone()),
            )
        }
        Err(e) => {
            error!(
                "Failed to recreate task for {} on schedule {}: {}",
                snapshot.owner, schedule_id, e
            );
            TaskOutcome::failed(
                OperationKind::Create,
                snapshot.owner.clone(),
                schedule_id.clone(),
                None,
                Some(snapshot.snapshot_id.clone()),
                TaskOperationError::CreateFailed {
                    owner: snapshot.owner.clone(),
                    schedule_id,
                    message: e.to_string(),
                },
            )
        }
    };

    (outcome, snapshot)
}
