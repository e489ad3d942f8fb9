//! Task tools exposed to the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use taskwren_backend::{Backend, BackendError, TaskDraft, TaskPatch};

use crate::tool::{ParamKind, ParamSpec, ToolHandler, ToolSpec, ValidatedCall};

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, BackendError> {
    serde_json::to_value(value).map_err(|e| BackendError::Invalid(e.to_string()))
}

pub struct ListTasksTool {
    backend: Arc<dyn Backend>,
}

impl ListTasksTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for ListTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_tasks".into(),
            description: "Get all incomplete tasks. Use when the user asks about their tasks, \
                          todos, or what they need to do."
                .into(),
            params: vec![],
        }
    }

    async fn execute(&self, _call: &ValidatedCall) -> Result<Value, BackendError> {
        let tasks = self.backend.list_tasks().await?;
        Ok(json!({"count": tasks.len(), "tasks": to_json(&tasks)?}))
    }
}

pub struct CreateTaskTool {
    backend: Arc<dyn Backend>,
}

impl CreateTaskTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for CreateTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_task".into(),
            description: "Add a new task or todo.".into(),
            params: vec![
                ParamSpec::required(
                    "title",
                    ParamKind::String,
                    "The task title - be specific and actionable",
                ),
                ParamSpec::optional("notes", ParamKind::String, "Additional notes or details")
                    .with_default(json!("")),
                ParamSpec::optional(
                    "due_date",
                    ParamKind::Date,
                    "Due date in YYYY-MM-DD format",
                ),
            ],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let title = call.str_arg("title")?;
        if title.trim().is_empty() {
            return Err(BackendError::Invalid("title must not be empty".into()));
        }
        let task = self
            .backend
            .create_task(TaskDraft {
                title: title.to_string(),
                notes: call.opt_str_arg("notes").unwrap_or_default().to_string(),
                due: call.opt_date_arg("due_date"),
            })
            .await?;
        Ok(json!({"created": to_json(&task)?}))
    }
}

pub struct UpdateTaskTool {
    backend: Arc<dyn Backend>,
}

impl UpdateTaskTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for UpdateTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "update_task".into(),
            description: "Edit an existing task. Call list_tasks first to get the task_id."
                .into(),
            params: vec![
                ParamSpec::required(
                    "task_id",
                    ParamKind::String,
                    "Id of the task to edit (from list_tasks)",
                ),
                ParamSpec::optional("title", ParamKind::String, "New title"),
                ParamSpec::optional("notes", ParamKind::String, "New notes"),
                ParamSpec::optional(
                    "due_date",
                    ParamKind::Date,
                    "New due date in YYYY-MM-DD format",
                ),
            ],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let task = self
            .backend
            .update_task(
                call.str_arg("task_id")?,
                TaskPatch {
                    title: call.opt_str_arg("title").map(str::to_string),
                    notes: call.opt_str_arg("notes").map(str::to_string),
                    due: call.opt_date_arg("due_date"),
                },
            )
            .await?;
        Ok(json!({"updated": to_json(&task)?}))
    }
}

pub struct CompleteTaskTool {
    backend: Arc<dyn Backend>,
}

impl CompleteTaskTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for CompleteTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "complete_task".into(),
            description: "Mark a task as complete. Call list_tasks first to get the task_id."
                .into(),
            params: vec![ParamSpec::required(
                "task_id",
                ParamKind::String,
                "Id of the task to complete (from list_tasks)",
            )],
        }
    }

    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        let task = self.backend.complete_task(call.str_arg("task_id")?).await?;
        Ok(json!({"completed": to_json(&task)?}))
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
            .register(Arc::new(ListTasksTool::new(backend.clone())))
            .unwrap();
        registry
            .register(Arc::new(CreateTaskTool::new(backend.clone())))
            .unwrap();
        registry
            .register(Arc::new(CompleteTaskTool::new(backend.clone())))
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
    async fn create_list_complete_flow() {
        let (registry, _backend) = registry_with_backend();

        let validated = registry
            .validate(&call(
                "create_task",
                json!({"title": "buy groceries", "due_date": "2030-07-01"}),
            ))
            .unwrap();
        let created = registry.execute(&validated).await.unwrap();
        let id = created["created"]["id"].as_str().unwrap().to_string();

        let validated = registry.validate(&call("list_tasks", json!({}))).unwrap();
        let listed = registry.execute(&validated).await.unwrap();
        assert_eq!(listed["count"], 1);

        let validated = registry
            .validate(&call("complete_task", json!({"task_id": id})))
            .unwrap();
        let completed = registry.execute(&validated).await.unwrap();
        assert_eq!(completed["completed"]["completed"], true);

        let validated = registry.validate(&call("list_tasks", json!({}))).unwrap();
        let listed = registry.execute(&validated).await.unwrap();
        assert_eq!(listed["count"], 0);
    }

    #[tokio::test]
    async fn completing_missing_task_surfaces_not_found() {
        let (registry, _backend) = registry_with_backend();
        let validated = registry
            .validate(&call("complete_task", json!({"task_id": "ghost"})))
            .unwrap();
        let err = registry.execute(&validated).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_title_rejected() {
        let (registry, _backend) = registry_with_backend();
        let validated = registry
            .validate(&call("create_task", json!({"title": "   "})))
            .unwrap();
        let err = registry.execute(&validated).await.unwrap_err();
        assert!(matches!(err, BackendError::Invalid(_)));
    }
}
