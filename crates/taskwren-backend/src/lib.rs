//! Calendar/tasks backend collaborator.
//!
//! The dispatch loop sees exactly eight capabilities, each returning a
//! structured record or a typed failure. Rate-limited and transient failures
//! may be retried here, inside the collaborator; the dispatch loop never
//! retries a backend call.

pub mod google;
pub mod memory;
mod records;

pub use google::{GoogleBackend, GoogleConfig};
pub use memory::InMemoryBackend;
pub use records::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transient backend failure: {0}")]
    Transient(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl BackendError {
    /// Stable machine-readable kind, used in tool-result turns.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::NotFound(_) => "not_found",
            BackendError::PermissionDenied(_) => "permission_denied",
            BackendError::RateLimited(_) => "rate_limited",
            BackendError::Transient(_) => "transient",
            BackendError::Invalid(_) => "invalid",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimited(_) | BackendError::Transient(_)
        )
    }

    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            404 | 410 => BackendError::NotFound(message),
            401 | 403 => BackendError::PermissionDenied(message),
            429 => BackendError::RateLimited(message),
            400 | 422 => BackendError::Invalid(message),
            500..=599 => BackendError::Transient(message),
            code => BackendError::Transient(format!("unexpected status {code}: {message}")),
        }
    }
}

/// The capability set exposed to the tool layer and the proactive scheduler.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, BackendError>;
    async fn list_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, BackendError>;
    async fn update_event(&self, id: &str, patch: EventPatch)
        -> Result<CalendarEvent, BackendError>;
    async fn delete_event(&self, id: &str) -> Result<(), BackendError>;
    async fn create_task(&self, draft: TaskDraft) -> Result<TaskItem, BackendError>;
    async fn list_tasks(&self) -> Result<Vec<TaskItem>, BackendError>;
    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<TaskItem, BackendError>;
    async fn complete_task(&self, id: &str) -> Result<TaskItem, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            BackendError::from_status(404, "gone".into()),
            BackendError::NotFound("gone".into())
        );
        assert_eq!(
            BackendError::from_status(403, "no scope".into()),
            BackendError::PermissionDenied("no scope".into())
        );
        assert_eq!(
            BackendError::from_status(429, "quota".into()),
            BackendError::RateLimited("quota".into())
        );
        assert_eq!(
            BackendError::from_status(400, "bad field".into()),
            BackendError::Invalid("bad field".into())
        );
        assert!(matches!(
            BackendError::from_status(502, "bad gateway".into()),
            BackendError::Transient(_)
        ));
    }

    #[test]
    fn retryable_kinds() {
        assert!(BackendError::RateLimited("q".into()).is_retryable());
        assert!(BackendError::Transient("t".into()).is_retryable());
        assert!(!BackendError::NotFound("n".into()).is_retryable());
        assert!(!BackendError::PermissionDenied("p".into()).is_retryable());
        assert!(!BackendError::Invalid("i".into()).is_retryable());
    }

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(BackendError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(BackendError::RateLimited("x".into()).kind(), "rate_limited");
    }
}
