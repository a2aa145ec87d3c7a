// ABOUTME: Schedule controller that suspends or activates one whole schedule
// ABOUTME: Resolves schedules by id or exact name and never touches task definitions

use std::sync::Arc;
use tracing::{info, instrument};

use super::error::{PauseError, Result};
use crate::client::TableauApi;
use crate::model::{Schedule, ScheduleRef, ScheduleState};

pub struct ScheduleController {
    api: Arc<dyn TableauApi>,
}

impl ScheduleController {
    pub fn new(api: Arc<dyn TableauApi>) -> Self {
        Self { api }
    }

    /// Find a schedule by id, or by exact, case-sensitive name among extract
    /// schedules
    pub async fn lookup(&self, schedule_ref: &ScheduleRef) -> Result<Schedule> {
        match schedule_ref {
            ScheduleRef::Id(id) => self
                .api
                .get_schedule(id)
                .await?
                .ok_or_else(|| PauseError::not_found("schedule", schedule_ref)),
            ScheduleRef::Name(name) => {
                let mut matches: Vec<Schedule> = self
                    .api
                    .list_schedules()
                    .await?
                    .into_iter()
                    .filter(|s| s.is_extract_schedule() && s.name == *name)
                    .collect();

                if matches.len() > 1 {
                    let candidates = matches
                        .iter()
                        .map(|s| format!("{} [id: {}, {}]", s.name, s.id, s.state))
                        .collect();
                    return Err(PauseError::ambiguous("schedule", name, candidates));
                }

                matches
                    .pop()
                    .ok_or_else(|| PauseError::not_found("schedule", schedule_ref))
            }
        }
    }

    #[instrument(skip(self), fields(schedule = %schedule_ref))]
    pub async fn suspend(&self, schedule_ref: &ScheduleRef) -> Result<Schedule> {
        self.set_state(schedule_ref, ScheduleState::Suspended).await
    }

    #[instrument(skip(self), fields(schedule = %schedule_ref))]
    pub async fn activate(&self, schedule_ref: &ScheduleRef) -> Result<Schedule> {
        self.set_state(schedule_ref, ScheduleState::Active).await
    }

    async fn set_state(&self, schedule_ref: &ScheduleRef, state: ScheduleState) -> Result<Schedule> {
        let schedule_id = match schedule_ref {
            ScheduleRef::Id(id) => id.clone(),
            ScheduleRef::Name(_) => self.lookup(schedule_ref).await?.id,
        };

        let updated = self.api.set_schedule_state(&schedule_id, state).await?;
        info!(
            "Schedule '{}' ({}) is now {}",
            updated.name, updated.id, updated.state
        );
        Ok(updated)
    }
}
