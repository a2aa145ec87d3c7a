// ABOUTME: Task inventory mapping resolved entities to their extract refresh tasks
// ABOUTME: Filters listings down to tasks the entity owns and drops duplicate task ids

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::error::Result;
use crate::client::TableauApi;
use crate::model::{Entity, ExtractRefreshTask};

pub struct TaskInventory {
    api: Arc<dyn TableauApi>,
}

impl TaskInventory {
    pub fn new(api: Arc<dyn TableauApi>) -> Self {
        Self { api }
    }

    /// Tasks owned directly by `entity`. An entity without scheduled refreshes
    /// yields an empty list.
    pub async fn list_tasks(&self, entity: &Entity) -> Result<Vec<ExtractRefreshTask>> {
        let listed = self.api.list_extract_refresh_tasks(entity).await?;
        let listed_count = listed.len();

        let mut seen_ids = HashSet::new();
        let tasks: Vec<ExtractRefreshTask> = listed
            .into_iter()
            .filter(|task| task.is_owned_by(entity))
            .filter(|task| match &task.id {
                Some(id) => seen_ids.insert(id.clone()),
                None => true,
            })
            .collect();

        debug!(
            "{} owns {} of {} listed extract refresh task(s)",
            entity,
            tasks.len(),
            listed_count
        );

        Ok(tasks)
    }

    /// Tasks for every target, in target order. Each task appears once even if
    /// two targets report it.
    pub async fn list_for(&self, targets: &[Entity]) -> Result<Vec<(Entity, ExtractRefreshTask)>> {
        let mut seen_ids = HashSet::new();
        let mut all = Vec::new();

        for target in targets {
            for task in self.list_tasks(target).await? {
                let fresh = match &task.id {
                    Some(id) => seen_ids.insert(id.clone()),
                    None => true,
                };
                if fresh {
                    all.push((target.clone(), task));
                }
            }
        }

        Ok(all)
    }
}
