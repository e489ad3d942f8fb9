//! In-memory backend double for tests and offline runs.
//!
//! Behaves like the Google client at the trait boundary, including the error
//! taxonomy: failures can be queued with [`InMemoryBackend::fail_next`] to
//! exercise the dispatch loop's failure folding.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use tokio::sync::Mutex;

use crate::{
    Backend, BackendError, CalendarEvent, EventDraft, EventPatch, EventStart, EventWindow,
    TaskDraft, TaskItem, TaskPatch,
};

#[derive(Default)]
struct State {
    events: Vec<CalendarEvent>,
    tasks: Vec<TaskItem>,
    next_id: u64,
    fail_next: VecDeque<BackendError>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn take_failure(&mut self) -> Result<(), BackendError> {
        match self.fail_next.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure to be returned by the next backend call.
    pub async fn fail_next(&self, err: BackendError) {
        self.state.lock().await.fail_next.push_back(err);
    }

    pub async fn seed_event(&self, summary: &str, start: EventStart) -> String {
        let mut state = self.state.lock().await;
        let id = state.next_id("evt");
        state.events.push(CalendarEvent {
            id: id.clone(),
            summary: summary.to_string(),
            start,
            location: String::new(),
            description: String::new(),
        });
        id
    }

    pub async fn seed_task(&self, title: &str, due: Option<chrono::NaiveDate>) -> String {
        let mut state = self.state.lock().await;
        let id = state.next_id("task");
        state.tasks.push(TaskItem {
            id: id.clone(),
            title: title.to_string(),
            notes: String::new(),
            due,
            completed: false,
        });
        id
    }

    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let start = match draft.time {
            Some(time) => EventStart::At {
                instant: draft.date.and_time(time).and_utc(),
            },
            None => EventStart::AllDay { date: draft.date },
        };
        let event = CalendarEvent {
            id: state.next_id("evt"),
            summary: draft.summary,
            start,
            location: draft.location,
            description: draft.description,
        };
        state.events.push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let mut events: Vec<CalendarEvent> = state
            .events
            .iter()
            .filter(|e| match e.start {
                EventStart::At { instant } => window.contains(instant),
                EventStart::AllDay { date } => {
                    let day_start = date.and_time(NaiveTime::MIN).and_utc();
                    day_start < window.to && day_start + Duration::days(1) > window.from
                }
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| {
            e.start
                .instant()
                .unwrap_or_else(|| e.start.date().and_time(NaiveTime::MIN).and_utc())
        });
        Ok(events)
    }

    async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        if patch.is_empty() {
            return Err(BackendError::Invalid("empty event update".to_string()));
        }
        if patch.time.is_some() && patch.date.is_none() {
            return Err(BackendError::Invalid(
                "a new time requires a date as well".to_string(),
            ));
        }
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("event {id}")))?;
        if let Some(summary) = patch.summary {
            event.summary = summary;
        }
        if let Some(date) = patch.date {
            event.start = match patch.time {
                Some(time) => EventStart::At {
                    instant: date.and_time(time).and_utc(),
                },
                None => EventStart::AllDay { date },
            };
        }
        if let Some(location) = patch.location {
            event.location = location;
        }
        if let Some(description) = patch.description {
            event.description = description;
        }
        Ok(event.clone())
    }

    async fn delete_event(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let before = state.events.len();
        state.events.retain(|e| e.id != id);
        if state.events.len() == before {
            return Err(BackendError::NotFound(format!("event {id}")));
        }
        Ok(())
    }

    async fn create_task(&self, draft: TaskDraft) -> Result<TaskItem, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let task = TaskItem {
            id: state.next_id("task"),
            title: draft.title,
            notes: draft.notes,
            due: draft.due,
            completed: false,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn list_tasks(&self) -> Result<Vec<TaskItem>, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| !t.completed)
            .cloned()
            .collect())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<TaskItem, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        if patch.is_empty() {
            return Err(BackendError::Invalid("empty task update".to_string()));
        }
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("task {id}")))?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(notes) = patch.notes {
            task.notes = notes;
        }
        if let Some(due) = patch.due {
            task.due = Some(due);
        }
        Ok(task.clone())
    }

    async fn complete_task(&self, id: &str) -> Result<TaskItem, BackendError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("task {id}")))?;
        task.completed = true;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn event_crud_roundtrip() {
        let backend = InMemoryBackend::new();
        let created = backend
            .create_event(EventDraft {
                summary: "Dentist".into(),
                date: date(2025, 6, 3),
                time: Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
                duration_hours: 1,
                location: "Clinic".into(),
                description: String::new(),
            })
            .await
            .unwrap();

        let updated = backend
            .update_event(
                &created.id,
                EventPatch {
                    summary: Some("Dentist (moved)".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.summary, "Dentist (moved)");

        backend.delete_event(&created.id).await.unwrap();
        assert_eq!(backend.event_count().await, 0);
        assert!(matches!(
            backend.delete_event(&created.id).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_events_filters_by_window() {
        let backend = InMemoryBackend::new();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        backend
            .seed_event(
                "inside",
                EventStart::At {
                    instant: now + Duration::hours(2),
                },
            )
            .await;
        backend
            .seed_event(
                "outside",
                EventStart::At {
                    instant: now + Duration::days(10),
                },
            )
            .await;
        backend
            .seed_event("all day today", EventStart::AllDay { date: now.date_naive() })
            .await;

        let listed = backend
            .list_events(EventWindow::days_ahead(now, 7))
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|e| e.summary.as_str()).collect();
        assert!(names.contains(&"inside"));
        assert!(names.contains(&"all day today"));
        assert!(!names.contains(&"outside"));
    }

    #[tokio::test]
    async fn completed_tasks_drop_out_of_listing() {
        let backend = InMemoryBackend::new();
        let id = backend.seed_task("buy groceries", None).await;
        assert_eq!(backend.list_tasks().await.unwrap().len(), 1);

        let done = backend.complete_task(&id).await.unwrap();
        assert!(done.completed);
        assert!(backend.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_failure_fires_once() {
        let backend = InMemoryBackend::new();
        backend
            .fail_next(BackendError::RateLimited("quota".into()))
            .await;

        let err = backend.list_tasks().await.unwrap_err();
        assert!(matches!(err, BackendError::RateLimited(_)));
        assert!(backend.list_tasks().await.is_ok());
    }

    #[tokio::test]
    async fn time_without_date_rejected() {
        let backend = InMemoryBackend::new();
        let id = backend
            .seed_event("standup", EventStart::AllDay { date: date(2025, 6, 3) })
            .await;
        let err = backend
            .update_event(
                &id,
                EventPatch {
                    time: Some(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Invalid(_)));
    }
}
