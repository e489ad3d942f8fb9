//! Calendar tools exposed to the model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use taskwren_backend::{Backend, BackendError, EventDraft, EventPatch, EventWindow};

use crate::tool::{ParamKind, ParamSpec, ToolHandler, ToolSpec, ValidatedCall};

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, BackendError> {
    serde_json::to_value(value).map_err(|e| BackendError::Invalid(e.to_string()))
}

pub struct ListEventsTool {
    backend: Arc<dyn Backend>,
}

impl ListEventsTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for ListEventsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_events".into(),
            description: "Get calendar events for the next N days. Use when the user asks \
                          about their schedule, upcoming events, or what they have planned."
                .into(),
            params: vec![ParamSpec::optional(
                "days_ahead",
                ParamKind::Integer,
                "Number of days to look ahead (1-31)",
            )
            .with_default(json!(7))],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let days = call.int_arg("days_ahead")?;
        if !(1..=31).contains(&days) {
            return Err(BackendError::Invalid(
                "days_ahead must be between 1 and 31".into(),
            ));
        }
        let events = self
            .backend
            .list_events(EventWindow::days_ahead(Utc::now(), days))
            .await?;
        Ok(json!({"count": events.len(), "events": to_json(&events)?}))
    }
}

pub struct CreateEventTool {
    backend: Arc<dyn Backend>,
}

impl CreateEventTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for CreateEventTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_event".into(),
            description: "Create a new calendar event. Use for scheduling meetings, \
                          appointments and reminders."
                .into(),
            params: vec![
                ParamSpec::required("title", ParamKind::String, "Event title"),
                ParamSpec::required("date", ParamKind::Date, "Event date in YYYY-MM-DD format"),
                ParamSpec::optional(
                    "time",
                    ParamKind::Time,
                    "Start time in HH:MM 24-hour format. Omit for an all-day event.",
                ),
                ParamSpec::optional(
                    "duration_hours",
                    ParamKind::Integer,
                    "Event duration in hours (1-24)",
                )
                .with_default(json!(1)),
                ParamSpec::optional("location", ParamKind::String, "Event location")
                    .with_default(json!("")),
                ParamSpec::optional("description", ParamKind::String, "Event description")
                    .with_default(json!("")),
            ],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let title = call.str_arg("title")?;
        if title.trim().is_empty() {
            return Err(BackendError::Invalid("title must not be empty".into()));
        }
        let duration_hours = call.int_arg("duration_hours")?;
        if !(1..=24).contains(&duration_hours) {
            return Err(BackendError::Invalid(
                "duration_hours must be between 1 and 24".into(),
            ));
        }
        let event = self
            .backend
            .create_event(EventDraft {
                summary: title.to_string(),
                date: call.date_arg("date")?,
                time: call.opt_time_arg("time"),
                duration_hours,
                location: call.opt_str_arg("location").unwrap_or_default().to_string(),
                description: call
                    .opt_str_arg("description")
                    .unwrap_or_default()
                    .to_string(),
            })
            .await?;
        Ok(json!({"created": to_json(&event)?}))
    }
}

pub struct UpdateEventTool {
    backend: Arc<dyn Backend>,
}

impl UpdateEventTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for UpdateEventTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "update_event".into(),
            description: "Edit an existing calendar event. Call list_events first to get the \
                          event_id. When changing the time, pass the date as well."
                .into(),
            params: vec![
                ParamSpec::required(
                    "event_id",
                    ParamKind::String,
                    "Id of the event to edit (from list_events)",
                ),
                ParamSpec::optional("title", ParamKind::String, "New title"),
                ParamSpec::optional("date", ParamKind::Date, "New date in YYYY-MM-DD format"),
                ParamSpec::optional("time", ParamKind::Time, "New time in HH:MM 24-hour format"),
                ParamSpec::optional("location", ParamKind::String, "New location"),
                ParamSpec::optional("description", ParamKind::String, "New description"),
            ],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let event = self
            .backend
            .update_event(
                call.str_arg("event_id")?,
                EventPatch {
                    summary: call.opt_str_arg("title").map(str::to_string),
                    date: call.opt_date_arg("date"),
                    time: call.opt_time_arg("time"),
                    location: call.opt_str_arg("location").map(str::to_string),
                    description: call.opt_str_arg("description").map(str::to_string),
                },
            )
            .await?;
        Ok(json!({"updated": to_json(&event)?}))
    }
}

pub struct DeleteEventTool {
    backend: Arc<dyn Backend>,
}

impl DeleteEventTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for DeleteEventTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delete_event".into(),
            description: "Delete a calendar event. Call list_events first to get the event_id."
                .into(),
            params: vec![ParamSpec::required(
                "event_id",
                ParamKind::String,
                "Id of the event to delete (from list_events)",
            )],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let id = call.str_arg("event_id")?;
        self.backend.delete_event(id).await?;
        Ok(json!({"deleted": id}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolCall, ToolRegistry};
    use taskwren_backend::InMemoryBackend;

    fn registry_with_backend() -> (ToolRegistry, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(ListEventsTool::new(backend.clone())))
            .unwrap();
        registry
            .register(Arc::new(CreateEventTool::new(backend.clone())))
            .unwrap();
        registry
            .register(Arc::new(DeleteEventTool::new(backend.clone())))
            .unwrap();
        (registry, backend)
    }

    fn call(tool: &str, arguments: Value) -> ToolCall {
        ToolCall {
            tool: tool.into(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn create_then_delete_round_trip() {
        let (registry, backend) = registry_with_backend();

        let validated = registry
            .validate(&call(
                "create_event",
                json!({"title": "Dentist", "date": "2030-06-03", "time": "09:00"}),
            ))
            .unwrap();
        let created = registry.execute(&validated).await.unwrap();
        let id = created["created"]["id"].as_str().unwrap().to_string();
        assert_eq!(backend.event_count().await, 1);

        let validated = registry
            .validate(&call("delete_event", json!({"event_id": id})))
            .unwrap();
        let deleted = registry.execute(&validated).await.unwrap();
        assert!(deleted["deleted"].is_string());
        assert_eq!(backend.event_count().await, 0);
    }

    #[tokio::test]
    async fn duration_out_of_range_is_invalid() {
        let (registry, _backend) = registry_with_backend();
        let validated = registry
            .validate(&call(
                "create_event",
                json!({"title": "Marathon", "date": "2030-06-03", "duration_hours": 48}),
            ))
            .unwrap();
        let err = registry.execute(&validated).await.unwrap_err();
        assert!(matches!(err, BackendError::Invalid(_)));
    }

    #[tokio::test]
    async fn days_ahead_range_enforced() {
        let (registry, _backend) = registry_with_backend();
        let validated = registry
            .validate(&call("list_events", json!({"days_ahead": 0})))
            .unwrap();
        let err = registry.execute(&validated).await.unwrap_err();
        assert!(matches!(err, BackendError::Invalid(_)));
    }
}
