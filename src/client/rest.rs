// ABOUTME: reqwest-based TableauApi implementation for the REST and Metadata APIs
// ABOUTME: Handles personal access token sign-in, pagination and JSON request/response mapping

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::{ClientError, Result};
use super::metadata::{parse_upstream_response, upstream_datasources_query, DependencyGraphPayload};
use super::TableauApi;
use crate::model::{
    Entity, EntityKind, ExtractRefreshTask, RefreshType, Schedule, ScheduleBinding, ScheduleState,
    TaskOwner, TriggerParams,
};

const AUTH_HEADER: &str = "X-Tableau-Auth";
const PAGE_SIZE: usize = 100;

/// Connection details for one Tableau site
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub server_url: String,
    pub api_version: String,
    pub site_url: String,
    pub token_name: String,
    pub token_secret: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    site_id: String,
}

pub struct RestClient {
    http: Client,
    settings: ConnectionSettings,
    session: RwLock<Option<Session>>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("server_url", &self.settings.server_url)
            .field("site_url", &self.settings.site_url)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(ClientError::Configuration(
                "server url is not set".to_string(),
            ));
        }
        if self.token_name.is_empty() || self.token_secret.is_empty() {
            return Err(ClientError::Configuration(
                "personal access token name and secret are required".to_string(),
            ));
        }
        Ok(())
    }

    fn api_base(&self) -> String {
        format!(
            "{}/api/{}",
            self.server_url.trim_end_matches('/'),
            self.api_version
        )
    }

    fn metadata_url(&self) -> String {
        format!("{}/api/metadata/graphql", self.server_url.trim_end_matches('/'))
    }
}

impl RestClient {
    pub fn new(settings: ConnectionSettings) -> Result<Self> {
        settings.validate()?;

        let http = Client::builder().timeout(settings.request_timeout).build()?;

        Ok(Self {
            http,
            settings,
            session: RwLock::new(None),
        })
    }

    /// Sign in with the configured personal access token
    pub async fn sign_in(&self) -> Result<()> {
        let url = format!("{}/auth/signin", self.settings.api_base());
        let body = json!({
            "credentials": {
                "personalAccessTokenName": self.settings.token_name,
                "personalAccessTokenSecret": self.settings.token_secret,
                "site": { "contentUrl": self.settings.site_url }
            }
        });

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!("sign-in returned {}: {}", status, text)));
        }

        let signed_in: SignInResponse = response.json().await?;
        info!(
            "Signed in to {} (site: {})",
            self.settings.server_url, self.settings.site_url
        );

        *self.session.write().await = Some(Session {
            token: signed_in.credentials.token,
            site_id: signed_in.credentials.site.id,
        });

        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            let url = format!("{}/auth/signout", self.settings.api_base());
            let response = self
                .http
                .post(&url)
                .header(AUTH_HEADER, &session.token)
                .send()
                .await?;
            Self::check_status(response).await?;
            debug!("Signed out of {}", self.settings.server_url);
        }
        Ok(())
    }

    async fn session(&self) -> Result<Session> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }
        self.sign_in().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| ClientError::Auth("no session after sign-in".to_string()))
    }

    fn request(&self, method: Method, url: &str, session: &Session) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_HEADER, &session.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn site_url(&self, session: &Session, path: &str) -> String {
        format!(
            "{}/sites/{}/{}",
            self.settings.api_base(),
            session.site_id,
            path
        )
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = Self::check_status(request.send().await?).await?;
        let value = response.json::<serde_json::Value>().await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Walk every page of a paginated listing endpoint
    async fn get_all_pages<P, T>(
        &self,
        url: &str,
        session: &Session,
        filter: Option<String>,
        items: fn(P) -> Vec<T>,
    ) -> Result<Vec<T>>
    where
        P: DeserializeOwned + Paginated,
    {
        let mut collected = Vec::new();
        let mut page_number = 1usize;

        loop {
            let mut request = self.request(Method::GET, url, session).query(&[
                ("pageSize", PAGE_SIZE.to_string()),
                ("pageNumber", page_number.to_string()),
            ]);
            if let Some(ref filter) = filter {
                request = request.query(&[("filter", filter)]);
            }

            let page: P = self.send_json(request).await?;
            let total = page.pagination().total_available;
            let mut page_items = items(page);
            let fetched = page_items.len();
            collected.append(&mut page_items);

            if fetched == 0 || collected.len() >= total {
                break;
            }
            page_number += 1;
        }

        Ok(collected)
    }

    fn collection_path(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Workbook => "workbooks",
            EntityKind::Datasource => "datasources",
        }
    }
}

#[async_trait]
impl TableauApi for RestClient {
    async fn query_dependency_graph(&self, workbook_id: &str) -> Result<DependencyGraphPayload> {
        let session = self.session().await?;
        let body = json!({
            "query": upstream_datasources_query(),
            "variables": { "luid": workbook_id }
        });

        debug!("Querying upstream datasources for workbook {}", workbook_id);
        let request = self
            .request(Method::POST, &self.settings.metadata_url(), &session)
            .json(&body);
        let value: serde_json::Value = self.send_json(request).await?;

        parse_upstream_response(value)
    }

    async fn find_entities_by_name(&self, kind: EntityKind, name: &str) -> Result<Vec<Entity>> {
        let session = self.session().await?;
        let url = self.site_url(&session, Self::collection_path(kind));
        let filter = Some(format!("name:eq:{}", name));

        let items = match kind {
            EntityKind::Workbook => {
                self.get_all_pages(&url, &session, filter, |p: WorkbooksPage| {
                    p.workbooks.workbook
                })
                .await?
            }
            EntityKind::Datasource => {
                self.get_all_pages(&url, &session, filter, |p: DatasourcesPage| {
                    p.datasources.datasource
                })
                .await?
            }
        };

        // The server-side filter is case-insensitive; names must match exactly.
        Ok(items
            .into_iter()
            .filter(|item| item.name == name)
            .map(|item| item.into_entity(kind))
            .collect())
    }

    async fn get_entity_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let session = self.session().await?;
        let url = self.site_url(&session, &format!("{}/{}", Self::collection_path(kind), id));
        let request = self.request(Method::GET, &url, &session);

        let result = match kind {
            EntityKind::Workbook => self
                .send_json::<WorkbookEnvelope>(request)
                .await
                .map(|e| e.workbook),
            EntityKind::Datasource => self
                .send_json::<DatasourceEnvelope>(request)
                .await
                .map(|e| e.datasource),
        };

        match result {
            Ok(item) => Ok(Some(item.into_entity(kind))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_extract_refresh_tasks(&self, entity: &Entity) -> Result<Vec<ExtractRefreshTask>> {
        let session = self.session().await?;
        let url = self.site_url(&session, "tasks/extractRefreshes");
        let response: TasksEnvelope = self
            .send_json(self.request(Method::GET, &url, &session))
            .await?;

        let raw_tasks = response
            .tasks
            .map(|t| t.task)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|wrapper| wrapper.extract_refresh);
        let tasks = tasks_owned_by(raw_tasks, entity)?;

        debug!("Found {} extract refresh tasks for {}", tasks.len(), entity);
        Ok(tasks)
    }

    async fn delete_extract_refresh_task(&self, task_id: &str) -> Result<()> {
        let session = self.session().await?;
        let url = self.site_url(&session, &format!("tasks/extractRefreshes/{}", task_id));
        let response = self
            .request(Method::DELETE, &url, &session)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn create_extract_refresh_task(
        &self,
        owner: &TaskOwner,
        schedule_id: &str,
        trigger: &TriggerParams,
    ) -> Result<String> {
        let session = self.session().await?;
        let (path, body) = match owner.kind {
            EntityKind::Workbook => (
                "workbooks",
                json!({ "task": { "extractRefresh": { "workbook": { "id": owner.id } } } }),
            ),
            EntityKind::Datasource => (
                "datasources",
                json!({ "task": { "extractRefresh": { "datasource": { "id": owner.id } } } }),
            ),
        };

        if trigger.refresh_type != RefreshType::FullRefresh {
            warn!(
                "Schedule binding for {} cannot carry refresh type {}; the server default applies",
                owner, trigger.refresh_type
            );
        }

        let url = self.site_url(&session, &format!("schedules/{}/{}", schedule_id, path));
        let created: CreatedTaskEnvelope = self
            .send_json(self.request(Method::PUT, &url, &session).json(&body))
            .await?;

        created
            .task
            .extract_refresh
            .id
            .ok_or_else(|| ClientError::InvalidResponse("created task has no id".to_string()))
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let session = self.session().await?;
        let url = format!("{}/schedules", self.settings.api_base());
        let raw = self
            .get_all_pages(&url, &session, None, |p: SchedulesPage| {
                p.schedules.schedule
            })
            .await?;

        raw.into_iter().map(RawSchedule::into_schedule).collect()
    }

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>> {
        let session = self.session().await?;
        let url = format!("{}/schedules/{}", self.settings.api_base(), schedule_id);

        match self
            .send_json::<ScheduleEnvelope>(self.request(Method::GET, &url, &session))
            .await
        {
            Ok(envelope) => envelope.schedule.into_schedule().map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_schedule_state(&self, schedule_id: &str, state: ScheduleState) -> Result<Schedule> {
        let session = self.session().await?;
        let url = format!("{}/schedules/{}", self.settings.api_base(), schedule_id);
        let body = json!({ "schedule": { "state": state.as_str() } });

        let envelope: ScheduleEnvelope = self
            .send_json(self.request(Method::PUT, &url, &session).json(&body))
            .await?;
        envelope.schedule.into_schedule()
    }
}

// Wire types. The REST API reports counts and priorities as strings.

#[derive(Debug, Deserialize)]
struct SignInResponse {
    credentials: SignInCredentials,
}

#[derive(Debug, Deserialize)]
struct SignInCredentials {
    token: String,
    site: SiteRef,
}

#[derive(Debug, Deserialize)]
struct SiteRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(deserialize_with = "count_from_any")]
    total_available: usize,
}

trait Paginated {
    fn pagination(&self) -> &Pagination;
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    id: String,
    name: String,
    project: Option<NamedRef>,
}

impl ContentItem {
    fn into_entity(self, kind: EntityKind) -> Entity {
        let mut entity = Entity::new(kind, self.id, self.name);
        entity.project = self.project.and_then(|p| p.name);
        entity
    }
}

#[derive(Debug, Deserialize, Default)]
struct WorkbookList {
    #[serde(default)]
    workbook: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct WorkbooksPage {
    pagination: Pagination,
    #[serde(default)]
    workbooks: WorkbookList,
}

#[derive(Debug, Deserialize, Default)]
struct DatasourceList {
    #[serde(default)]
    datasource: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct DatasourcesPage {
    pagination: Pagination,
    #[serde(default)]
    datasources: DatasourceList,
}

#[derive(Debug, Deserialize)]
struct WorkbookEnvelope {
    workbook: ContentItem,
}

#[derive(Debug, Deserialize)]
struct DatasourceEnvelope {
    datasource: ContentItem,
}

#[derive(Debug, Deserialize)]
struct TasksEnvelope {
    tasks: Option<TaskList>,
}

#[derive(Debug, Deserialize)]
struct TaskList {
    #[serde(default)]
    task: Vec<TaskWrapper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskWrapper {
    extract_refresh: Option<RawExtractRefresh>,
}

#[derive(Debug, Deserialize)]
struct RawExtractRefresh {
    id: Option<String>,
    #[serde(default, deserialize_with = "optional_priority_from_any")]
    priority: Option<u32>,
    #[serde(rename = "type")]
    refresh_type: Option<String>,
    schedule: Option<RawSchedule>,
    workbook: Option<IdRef>,
    datasource: Option<IdRef>,
}

/// Keep the tasks refreshing `entity`. A task with no owner cannot belong to
/// it and is logged and passed over; an owned task without a schedule cannot
/// be snapshotted and fails the listing.
fn tasks_owned_by(
    raw_tasks: impl IntoIterator<Item = RawExtractRefresh>,
    entity: &Entity,
) -> Result<Vec<ExtractRefreshTask>> {
    let mut tasks = Vec::new();
    for raw in raw_tasks {
        match raw.owner() {
            Some(owner) if owner.is(entity) => tasks.push(raw.into_task(owner)?),
            Some(_) => {}
            None => warn!(
                "Extract refresh task {} names neither a workbook nor a datasource",
                raw.id.as_deref().unwrap_or("without id")
            ),
        }
    }
    Ok(tasks)
}

impl RawExtractRefresh {
    fn owner(&self) -> Option<TaskOwner> {
        match (&self.workbook, &self.datasource) {
            (Some(wb), _) => Some(TaskOwner::new(EntityKind::Workbook, wb.id.clone())),
            (None, Some(ds)) => Some(TaskOwner::new(EntityKind::Datasource, ds.id.clone())),
            (None, None) => None,
        }
    }

    fn into_task(self, owner: TaskOwner) -> Result<ExtractRefreshTask> {
        let schedule = self.schedule.ok_or_else(|| {
            ClientError::InvalidResponse(format!(
                "Extract refresh task {} for {} has no schedule",
                self.id.as_deref().unwrap_or("without id"),
                owner
            ))
        })?;
        let trigger = TriggerParams {
            refresh_type: self
                .refresh_type
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or_default(),
            priority: self.priority,
            frequency: schedule.frequency.clone(),
        };
        let binding = match schedule.name {
            Some(name) => ScheduleBinding::named(schedule.id, name),
            None => ScheduleBinding::new(schedule.id),
        };

        Ok(ExtractRefreshTask::new(self.id, owner, binding, trigger))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    id: String,
    name: Option<String>,
    state: Option<String>,
    frequency: Option<String>,
    #[serde(rename = "type")]
    schedule_type: Option<String>,
}

impl RawSchedule {
    fn into_schedule(self) -> Result<Schedule> {
        let state = self
            .state
            .as_deref()
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!("schedule {} has no state", self.id))
            })?
            .parse::<ScheduleState>()
            .map_err(ClientError::InvalidResponse)?;

        Ok(Schedule {
            id: self.id,
            name: self.name.unwrap_or_default(),
            state,
            frequency: self.frequency,
            schedule_type: self.schedule_type,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct ScheduleList {
    #[serde(default)]
    schedule: Vec<RawSchedule>,
}

#[derive(Debug, Deserialize)]
struct SchedulesPage {
    pagination: Pagination,
    #[serde(default)]
    schedules: ScheduleList,
}

#[derive(Debug, Deserialize)]
struct ScheduleEnvelope {
    schedule: RawSchedule,
}

#[derive(Debug, Deserialize)]
struct CreatedTaskEnvelope {
    task: CreatedTask,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedTask {
    extract_refresh: CreatedExtractRefresh,
}

#[derive(Debug, Deserialize)]
struct CreatedExtractRefresh {
    id: Option<String>,
}

impl Paginated for WorkbooksPage {
    fn pagination(&self) -> &Pagination {
        &self.pagination
    }
}

impl Paginated for DatasourcesPage {
    fn pagination(&self) -> &Pagination {
        &self.pagination
    }
}

impl Paginated for SchedulesPage {
    fn pagination(&self) -> &Pagination {
        &self.pagination
    }
}

fn count_from_any<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| serde::de::Error::custom("count is not a positive integer")),
        serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected a count, found {}",
            other
        ))),
    }
}

fn optional_priority_from_any<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let priority = count_from_any(deserializer)?;
    u32::try_from(priority)
        .map(Some)
        .map_err(|_| serde::de::Error::custom(format!("priority {} is out of range", priority)))
}
