//! Notification rules.
//!
//! Each rule is a predicate over one user's backend snapshot paired with a
//! message template. Rules are stateless; idempotency lives in the store as
//! (user, kind, reference, date) markers keyed off the notices they emit.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use taskwren_backend::{CalendarEvent, TaskItem};

use crate::store::UserPrefs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    EventReminder,
    OverdueNudge,
    DailyBriefing,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::EventReminder => "event_reminder",
            NoticeKind::OverdueNudge => "overdue_nudge",
            NoticeKind::DailyBriefing => "daily_briefing",
        }
    }
}

/// A notice a rule wants delivered. `reference` + `date` form the dedupe key
/// together with the kind (empty reference for per-day notices).
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub reference: String,
    pub date: NaiveDate,
    pub text: String,
}

/// Read-only backend state for one evaluation pass.
pub struct Snapshot {
    pub now: DateTime<Utc>,
    pub events: Vec<CalendarEvent>,
    pub tasks: Vec<TaskItem>,
}

pub trait NotificationRule: Send + Sync {
    fn kind(&self) -> NoticeKind;
    fn enabled_for(&self, prefs: &UserPrefs) -> bool;
    fn evaluate(&self, prefs: &UserPrefs, snapshot: &Snapshot) -> Vec<Notice>;
}

fn user_zone(prefs: &UserPrefs) -> Tz {
    prefs.timezone.parse().unwrap_or_else(|_| {
        tracing::debug!(user = %prefs.user, timezone = %prefs.timezone, "unknown timezone, using UTC");
        chrono_tz::UTC
    })
}

fn local_date(prefs: &UserPrefs, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&user_zone(prefs)).date_naive()
}

const LIST_LIMIT: usize = 5;

/// Upcoming timed events, `lead ± tolerance` minutes before start.
pub struct EventReminderRule {
    pub lead_minutes: i64,
    pub window_before: i64,
    pub window_after: i64,
}

impl NotificationRule for EventReminderRule {
    fn kind(&self) -> NoticeKind {
        NoticeKind::EventReminder
    }

    fn enabled_for(&self, prefs: &UserPrefs) -> bool {
        prefs.reminders_enabled
    }

    fn evaluate(&self, prefs: &UserPrefs, snapshot: &Snapshot) -> Vec<Notice> {
        let zone = user_zone(prefs);
        let mut notices = Vec::new();
        for event in &snapshot.events {
            // All-day events carry no start instant to remind against.
            let Some(instant) = event.start.instant() else {
                continue;
            };
            let minutes_until = (instant - snapshot.now).num_minutes();
            let window = (self.lead_minutes - self.window_before)
                ..=(self.lead_minutes + self.window_after);
            if !window.contains(&minutes_until) {
                continue;
            }
            let local = instant.with_timezone(&zone);
            let location_line = if event.location.is_empty() {
                String::new()
            } else {
                format!("\nLocation: {}", event.location)
            };
            notices.push(Notice {
                kind: self.kind(),
                reference: event.id.clone(),
                date: local_date(prefs, snapshot.now),
                text: format!(
                    "Reminder: {}\nStarts in ~{} minutes ({}){}",
                    event.summary,
                    minutes_until,
                    local.format("%H:%M"),
                    location_line
                ),
            });
        }
        notices
    }
}

/// Tasks due strictly before today, nudged at most once per day.
pub struct OverdueNudgeRule;

impl NotificationRule for OverdueNudgeRule {
    fn kind(&self) -> NoticeKind {
        NoticeKind::OverdueNudge
    }

    fn enabled_for(&self, prefs: &UserPrefs) -> bool {
        prefs.nudges_enabled
    }

    fn evaluate(&self, prefs: &UserPrefs, snapshot: &Snapshot) -> Vec<Notice> {
        let today = local_date(prefs, snapshot.now);
        let overdue: Vec<&TaskItem> = snapshot
            .tasks
            .iter()
            .filter(|t| !t.completed && t.due.map(|due| due < today).unwrap_or(false))
            .collect();
        if overdue.is_empty() {
            return Vec::new();
        }

        let mut lines: Vec<String> = overdue
            .iter()
            .take(LIST_LIMIT)
            .map(|t| format!("  - {}", t.title))
            .collect();
        if overdue.len() > LIST_LIMIT {
            lines.push(format!("  ... and {} more", overdue.len() - LIST_LIMIT));
        }

        vec![Notice {
            kind: self.kind(),
            reference: String::new(),
            date: today,
            text: format!(
                "Task reminder\n\nYou have {} overdue task(s):\n{}",
                overdue.len(),
                lines.join("\n")
            ),
        }]
    }
}

/// Morning summary of today's events and pending tasks, fired once per day
/// after the user's configured briefing time.
pub struct DailyBriefingRule;

impl NotificationRule for DailyBriefingRule {
    fn kind(&self) -> NoticeKind {
        NoticeKind::DailyBriefing
    }

    fn enabled_for(&self, prefs: &UserPrefs) -> bool {
        prefs.briefing_enabled
    }

    fn evaluate(&self, prefs: &UserPrefs, snapshot: &Snapshot) -> Vec<Notice> {
        let zone = user_zone(prefs);
        let local_now = snapshot.now.with_timezone(&zone);
        if local_now.time() < prefs.briefing_time {
            return Vec::new();
        }
        let today = local_now.date_naive();

        let todays_events: Vec<&CalendarEvent> = snapshot
            .events
            .iter()
            .filter(|e| match e.start.instant() {
                Some(instant) => instant.with_timezone(&zone).date_naive() == today,
                None => e.start.date() == today,
            })
            .collect();

        let events_section = if todays_events.is_empty() {
            "No events scheduled for today.".to_string()
        } else {
            todays_events
                .iter()
                .map(|e| format_event_line(e, &zone))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let pending: Vec<&TaskItem> = snapshot.tasks.iter().filter(|t| !t.completed).collect();
        let tasks_section = if pending.is_empty() {
            "No pending tasks.".to_string()
        } else {
            let mut lines: Vec<String> = pending
                .iter()
                .take(LIST_LIMIT)
                .map(|t| format_task_line(t))
                .collect();
            if pending.len() > LIST_LIMIT {
                lines.push(format!("  ... and {} more", pending.len() - LIST_LIMIT));
            }
            lines.join("\n")
        };

        vec![Notice {
            kind: self.kind(),
            reference: String::new(),
            date: today,
            text: format!(
                "Good morning!\n\nToday's events ({}):\n{}\n\nPending tasks ({}):\n{}",
                todays_events.len(),
                events_section,
                pending.len(),
                tasks_section
            ),
        }]
    }
}

fn format_event_line(event: &CalendarEvent, zone: &Tz) -> String {
    let location = if event.location.is_empty() {
        String::new()
    } else {
        format!(" @ {}", event.location)
    };
    match event.start.instant() {
        Some(instant) => format!(
            "  {} - {}{}",
            instant.with_timezone(zone).format("%H:%M"),
            event.summary,
            location
        ),
        None => format!("  (All day) {}{}", event.summary, location),
    }
}

fn format_task_line(task: &TaskItem) -> String {
    match task.due {
        Some(due) => format!("  - {} (due {})", task.title, due.format("%b %d")),
        None => format!("  - {}", task.title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone};
    use taskwren_backend::EventStart;
    use taskwren_schema::UserId;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn prefs() -> UserPrefs {
        UserPrefs {
            user: UserId(1),
            timezone: "UTC".into(),
            briefing_enabled: true,
            briefing_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            reminders_enabled: true,
            nudges_enabled: true,
        }
    }

    fn timed_event(id: &str, summary: &str, at: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            summary: summary.into(),
            start: EventStart::At { instant: at },
            location: String::new(),
            description: String::new(),
        }
    }

    fn task(title: &str, due: Option<NaiveDate>) -> TaskItem {
        TaskItem {
            id: "t".into(),
            title: title.into(),
            notes: String::new(),
            due,
            completed: false,
        }
    }

    fn reminder_rule() -> EventReminderRule {
        EventReminderRule {
            lead_minutes: 30,
            window_before: 2,
            window_after: 3,
        }
    }

    #[test]
    fn reminder_fires_inside_window_only() {
        let now = utc(2025, 6, 3, 9, 0);
        let snapshot = Snapshot {
            now,
            events: vec![
                timed_event("in", "Standup", now + Duration::minutes(31)),
                timed_event("early", "Lunch", now + Duration::minutes(90)),
                timed_event("late", "Started", now - Duration::minutes(5)),
            ],
            tasks: vec![],
        };
        let notices = reminder_rule().evaluate(&prefs(), &snapshot);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reference, "in");
        assert!(notices[0].text.contains("Standup"));
        assert!(notices[0].text.contains("31 minutes"));
    }

    #[test]
    fn reminder_skips_all_day_events() {
        let now = utc(2025, 6, 3, 9, 0);
        let snapshot = Snapshot {
            now,
            events: vec![CalendarEvent {
                id: "ad".into(),
                summary: "Holiday".into(),
                start: EventStart::AllDay {
                    date: now.date_naive(),
                },
                location: String::new(),
                description: String::new(),
            }],
            tasks: vec![],
        };
        assert!(reminder_rule().evaluate(&prefs(), &snapshot).is_empty());
    }

    #[test]
    fn reminder_respects_pref_toggle() {
        let mut prefs = prefs();
        prefs.reminders_enabled = false;
        assert!(!reminder_rule().enabled_for(&prefs));
    }

    #[test]
    fn overdue_nudge_lists_capped_titles() {
        let now = utc(2025, 6, 3, 9, 0);
        let yesterday = now.date_naive() - Duration::days(1);
        let tasks: Vec<TaskItem> = (0..7)
            .map(|i| task(&format!("task {i}"), Some(yesterday)))
            .collect();
        let snapshot = Snapshot {
            now,
            events: vec![],
            tasks,
        };
        let notices = OverdueNudgeRule.evaluate(&prefs(), &snapshot);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.contains("7 overdue"));
        assert!(notices[0].text.contains("... and 2 more"));
        assert_eq!(notices[0].reference, "");
    }

    #[test]
    fn due_today_is_not_overdue() {
        let now = utc(2025, 6, 3, 9, 0);
        let snapshot = Snapshot {
            now,
            events: vec![],
            tasks: vec![task("today", Some(now.date_naive())), task("undated", None)],
        };
        assert!(OverdueNudgeRule.evaluate(&prefs(), &snapshot).is_empty());
    }

    #[test]
    fn briefing_waits_for_configured_time() {
        let snapshot = Snapshot {
            now: utc(2025, 6, 3, 6, 0),
            events: vec![],
            tasks: vec![],
        };
        assert!(DailyBriefingRule.evaluate(&prefs(), &snapshot).is_empty());

        let snapshot = Snapshot {
            now: utc(2025, 6, 3, 8, 30),
            events: vec![],
            tasks: vec![],
        };
        let notices = DailyBriefingRule.evaluate(&prefs(), &snapshot);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.contains("No events scheduled"));
        assert!(notices[0].text.contains("No pending tasks"));
    }

    #[test]
    fn briefing_renders_events_and_tasks() {
        let now = utc(2025, 6, 3, 9, 0);
        let mut event = timed_event("e", "Standup", utc(2025, 6, 3, 10, 30));
        event.location = "Office".into();
        let snapshot = Snapshot {
            now,
            events: vec![event],
            tasks: vec![task("buy groceries", Some(now.date_naive()))],
        };
        let notices = DailyBriefingRule.evaluate(&prefs(), &snapshot);
        let text = &notices[0].text;
        assert!(text.contains("10:30 - Standup @ Office"));
        assert!(text.contains("buy groceries (due Jun 03)"));
    }

    #[test]
    fn briefing_respects_user_timezone() {
        let mut prefs = prefs();
        prefs.timezone = "Asia/Jerusalem".into();
        // 06:30 UTC is 09:30 in Jerusalem (summer), past the 08:00 briefing.
        let snapshot = Snapshot {
            now: utc(2025, 6, 3, 6, 30),
            events: vec![],
            tasks: vec![],
        };
        assert_eq!(DailyBriefingRule.evaluate(&prefs, &snapshot).len(), 1);
    }
}
