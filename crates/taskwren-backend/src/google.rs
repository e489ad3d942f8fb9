//! Google Calendar v3 / Google Tasks v1 client.
//!
//! Credential acquisition is out of scope: the client is handed an
//! already-obtained bearer token. Rate-limited and transient failures are
//! retried here with a bounded fixed backoff; everything else surfaces as a
//! typed [`BackendError`] for the dispatch loop to fold into conversation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Backend, BackendError, CalendarEvent, EventDraft, EventPatch, EventStart, EventWindow,
    TaskDraft, TaskItem, TaskPatch,
};

const RETRY_BACKOFF_MS: &[u64] = &[250, 1_000, 2_500];
const ERROR_BODY_LIMIT: usize = 300;

fn retry_backoff_ms(attempt: u32) -> u64 {
    let idx = (attempt as usize).min(RETRY_BACKOFF_MS.len() - 1);
    RETRY_BACKOFF_MS[idx]
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_tasklist_id() -> String {
    "@default".to_string()
}

fn default_calendar_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_tasks_base() -> String {
    "https://tasks.googleapis.com/tasks/v1".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub access_token: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_tasklist_id")]
    pub tasklist_id: String,
    #[serde(default = "default_calendar_base")]
    pub calendar_base_url: String,
    #[serde(default = "default_tasks_base")]
    pub tasks_base_url: String,
    /// IANA zone attached to timed events on creation/update.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl GoogleConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            calendar_id: default_calendar_id(),
            tasklist_id: default_tasklist_id(),
            calendar_base_url: default_calendar_base(),
            tasks_base_url: default_tasks_base(),
            timezone: default_timezone(),
        }
    }
}

pub struct GoogleBackend {
    client: reqwest::Client,
    config: GoogleConfig,
    max_retries: u32,
}

impl GoogleBackend {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
            max_retries: 2,
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.config.calendar_base_url.trim_end_matches('/'),
            self.config.calendar_id
        )
    }

    fn event_url(&self, id: &str) -> String {
        format!("{}/{id}", self.events_url())
    }

    fn tasks_url(&self) -> String {
        format!(
            "{}/lists/{}/tasks",
            self.config.tasks_base_url.trim_end_matches('/'),
            self.config.tasklist_id
        )
    }

    fn task_url(&self, id: &str) -> String {
        format!("{}/{id}", self.tasks_url())
    }

    async fn execute<F>(&self, make: F) -> Result<reqwest::Response, BackendError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let result = make()
                .bearer_auth(&self.config.access_token)
                .send()
                .await;

            let err = match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    BackendError::from_status(status, truncate(&body))
                }
                Err(e) if e.is_timeout() => {
                    BackendError::Transient("backend request timed out".to_string())
                }
                Err(e) => BackendError::Transient(e.to_string()),
            };

            if err.is_retryable() && attempt < self.max_retries {
                let backoff = retry_backoff_ms(attempt);
                tracing::warn!(attempt, backoff_ms = backoff, error = %err, "retrying backend call");
                tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                attempt += 1;
                continue;
            }
            return Err(err);
        }
    }

    fn event_body(&self, draft: &EventDraft) -> ApiEvent {
        let (start, end) = match draft.time {
            Some(time) => {
                let start = draft.date.and_time(time);
                let end = start + Duration::hours(draft.duration_hours.max(1));
                (
                    ApiEventTime::timed(start.format("%Y-%m-%dT%H:%M:%S").to_string(), &self.config.timezone),
                    ApiEventTime::timed(end.format("%Y-%m-%dT%H:%M:%S").to_string(), &self.config.timezone),
                )
            }
            None => (
                ApiEventTime::all_day(draft.date),
                ApiEventTime::all_day(draft.date + Duration::days(1)),
            ),
        };
        ApiEvent {
            id: None,
            summary: Some(draft.summary.clone()),
            start: Some(start),
            end: Some(end),
            location: empty_to_none(&draft.location),
            description: empty_to_none(&draft.description),
        }
    }
}

#[async_trait]
impl Backend for GoogleBackend {
    async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, BackendError> {
        let body = self.event_body(&draft);
        let url = self.events_url();
        let resp = self
            .execute(|| self.client.post(&url).json(&body))
            .await?;
        let event: ApiEvent = decode(resp).await?;
        event.try_into()
    }

    async fn list_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, BackendError> {
        let url = self.events_url();
        let time_min = window.from.to_rfc3339();
        let time_max = window.to.to_rfc3339();
        let resp = self
            .execute(|| {
                self.client.get(&url).query(&[
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", "50"),
                ])
            })
            .await?;
        let list: ApiEventList = decode(resp).await?;
        list.items.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent, BackendError> {
        if patch.is_empty() {
            return Err(BackendError::Invalid("empty event update".to_string()));
        }
        if patch.time.is_some() && patch.date.is_none() {
            return Err(BackendError::Invalid(
                "a new time requires a date as well".to_string(),
            ));
        }
        let (start, end) = match (patch.date, patch.time) {
            (Some(date), Some(time)) => {
                let start = date.and_time(time);
                let end = start + Duration::hours(1);
                (
                    Some(ApiEventTime::timed(
                        start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                        &self.config.timezone,
                    )),
                    Some(ApiEventTime::timed(
                        end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                        &self.config.timezone,
                    )),
                )
            }
            (Some(date), None) => (
                Some(ApiEventTime::all_day(date)),
                Some(ApiEventTime::all_day(date + Duration::days(1))),
            ),
            (None, _) => (None, None),
        };
        let body = ApiEvent {
            id: None,
            summary: patch.summary.clone(),
            start,
            end,
            location: patch.location.clone(),
            description: patch.description.clone(),
        };
        let url = self.event_url(id);
        let resp = self
            .execute(|| self.client.patch(&url).json(&body))
            .await?;
        let event: ApiEvent = decode(resp).await?;
        event.try_into()
    }

    async fn delete_event(&self, id: &str) -> Result<(), BackendError> {
        let url = self.event_url(id);
        self.execute(|| self.client.delete(&url)).await?;
        Ok(())
    }

    async fn create_task(&self, draft: TaskDraft) -> Result<TaskItem, BackendError> {
        let body = ApiTask {
            id: None,
            title: Some(draft.title.clone()),
            notes: empty_to_none(&draft.notes),
            due: draft.due.map(due_to_rfc3339),
            status: None,
        };
        let url = self.tasks_url();
        let resp = self
            .execute(|| self.client.post(&url).json(&body))
            .await?;
        let task: ApiTask = decode(resp).await?;
        Ok(task.into())
    }

    async fn list_tasks(&self) -> Result<Vec<TaskItem>, BackendError> {
        let url = self.tasks_url();
        let resp = self
            .execute(|| {
                self.client
                    .get(&url)
                    .query(&[("showCompleted", "false"), ("maxResults", "100")])
            })
            .await?;
        let list: ApiTaskList = decode(resp).await?;
        Ok(list.items.into_iter().map(Into::into).collect())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<TaskItem, BackendError> {
        if patch.is_empty() {
            return Err(BackendError::Invalid("empty task update".to_string()));
        }
        let body = ApiTask {
            id: None,
            title: patch.title.clone(),
            notes: patch.notes.clone(),
            due: patch.due.map(due_to_rfc3339),
            status: None,
        };
        let url = self.task_url(id);
        let resp = self
            .execute(|| self.client.patch(&url).json(&body))
            .await?;
        let task: ApiTask = decode(resp).await?;
        Ok(task.into())
    }

    async fn complete_task(&self, id: &str) -> Result<TaskItem, BackendError> {
        let body = ApiTask {
            id: None,
            title: None,
            notes: None,
            due: None,
            status: Some("completed".to_string()),
        };
        let url = self.task_url(id);
        let resp = self
            .execute(|| self.client.patch(&url).json(&body))
            .await?;
        let task: ApiTask = decode(resp).await?;
        Ok(task.into())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
    resp.json()
        .await
        .map_err(|e| BackendError::Invalid(format!("unexpected response body: {e}")))
}

fn truncate(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &body[..cut])
    }
}

fn empty_to_none(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Google Tasks `due` convention: RFC 3339 at UTC midnight.
fn due_to_rfc3339(date: NaiveDate) -> String {
    format!("{date}T00:00:00.000Z")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ApiEventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl ApiEventTime {
    fn timed(date_time: String, zone: &str) -> Self {
        Self {
            date_time: Some(date_time),
            date: None,
            time_zone: Some(zone.to_string()),
        }
    }

    fn all_day(date: NaiveDate) -> Self {
        Self {
            date_time: None,
            date: Some(date.to_string()),
            time_zone: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ApiEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<ApiEventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<ApiEventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl TryFrom<ApiEvent> for CalendarEvent {
    type Error = BackendError;

    fn try_from(event: ApiEvent) -> Result<Self, BackendError> {
        let start_raw = event
            .start
            .ok_or_else(|| BackendError::Invalid("event without start".to_string()))?;
        let start = if let Some(ref dt) = start_raw.date_time {
            let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(dt)
                .map_err(|e| BackendError::Invalid(format!("bad event dateTime '{dt}': {e}")))?
                .with_timezone(&Utc);
            EventStart::At { instant: parsed }
        } else if let Some(ref d) = start_raw.date {
            let parsed = d
                .parse::<NaiveDate>()
                .map_err(|e| BackendError::Invalid(format!("bad event date '{d}': {e}")))?;
            EventStart::AllDay { date: parsed }
        } else {
            return Err(BackendError::Invalid("event start without date".to_string()));
        };

        Ok(CalendarEvent {
            id: event.id.unwrap_or_default(),
            summary: event.summary.unwrap_or_else(|| "No title".to_string()),
            start,
            location: event.location.unwrap_or_default(),
            description: event.description.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiEventList {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ApiTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

impl From<ApiTask> for TaskItem {
    fn from(task: ApiTask) -> Self {
        let due = task
            .due
            .as_deref()
            .and_then(|raw| raw.get(..10))
            .and_then(|d| d.parse::<NaiveDate>().ok());
        TaskItem {
            id: task.id.unwrap_or_default(),
            title: task.title.unwrap_or_else(|| "Untitled".to_string()),
            notes: task.notes.unwrap_or_default(),
            due,
            completed: task.status.as_deref() == Some("completed"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiTaskList {
    #[serde(default)]
    items: Vec<ApiTask>,
}
