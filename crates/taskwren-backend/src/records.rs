use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Start of a calendar event: all-day entries carry only a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStart {
    AllDay { date: NaiveDate },
    At { instant: DateTime<Utc> },
}

impl EventStart {
    pub fn date(&self) -> NaiveDate {
        match self {
            EventStart::AllDay { date } => *date,
            EventStart::At { instant } => instant.date_naive(),
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            EventStart::AllDay { .. } => None,
            EventStart::At { instant } => Some(*instant),
        }
    }
}

impl std::fmt::Display for EventStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStart::AllDay { date } => write!(f, "{date} (all day)"),
            EventStart::At { instant } => write!(f, "{}", instant.format("%Y-%m-%d %H:%M")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: EventStart,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    pub date: NaiveDate,
    /// None makes the event all-day.
    pub time: Option<NaiveTime>,
    pub duration_hours: i64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.location.is_none()
            && self.description.is_none()
    }
}

/// Half-open listing window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl EventWindow {
    pub fn days_ahead(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            from: now,
            to: now + Duration::days(days),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant < self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub notes: String,
    pub due: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.notes.is_none() && self.due.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_window_contains_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let window = EventWindow::days_ahead(now, 7);
        assert!(window.contains(now));
        assert!(window.contains(now + Duration::days(6)));
        assert!(!window.contains(now + Duration::days(7)));
        assert!(!window.contains(now - Duration::seconds(1)));
    }

    #[test]
    fn event_start_date_and_instant() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let all_day = EventStart::AllDay { date };
        assert_eq!(all_day.date(), date);
        assert!(all_day.instant().is_none());

        let at = Utc.with_ymd_and_hms(2025, 6, 3, 9, 30, 0).unwrap();
        let timed = EventStart::At { instant: at };
        assert_eq!(timed.date(), date);
        assert_eq!(timed.instant(), Some(at));
    }

    #[test]
    fn patch_emptiness() {
        assert!(EventPatch::default().is_empty());
        assert!(TaskPatch::default().is_empty());
        let patch = EventPatch {
            summary: Some("new".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
