//! Proactive scheduler.
//!
//! A timer-driven evaluator that scans backend state per user against the
//! notification rules and injects system-originated turns through the same
//! per-user serialized path the dispatch loop uses. A busy session defers a
//! notice to the next tick instead of forcing delivery mid-turn; the
//! idempotency marker is only written on the tick that actually delivers.

pub mod config;
pub mod rules;
pub mod store;

pub use config::*;
pub use rules::*;
pub use store::*;

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use taskwren_backend::{Backend, EventWindow};
use taskwren_bus::{BusPublisher, EventBus, Topic};
use taskwren_core::{SessionGate, SessionStore, Turn};
use taskwren_schema::BusMessage;
use tokio::sync::Mutex;

pub struct ProactiveScheduler {
    backend: Arc<dyn Backend>,
    store: Arc<PrefsStore>,
    sessions: Arc<SessionStore>,
    gate: SessionGate,
    bus: BusPublisher,
    rules: Vec<Box<dyn NotificationRule>>,
    config: ProactiveConfig,
    last_cleanup: Mutex<Option<NaiveDate>>,
}

impl ProactiveScheduler {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<PrefsStore>,
        sessions: Arc<SessionStore>,
        gate: SessionGate,
        bus: BusPublisher,
        config: ProactiveConfig,
    ) -> Self {
        let rules = default_rules(&config);
        Self {
            backend,
            store,
            sessions,
            gate,
            bus,
            rules,
            config,
            last_cleanup: Mutex::new(None),
        }
    }

    /// Replace the rule set (tests and custom deployments).
    pub fn with_rules(mut self, rules: Vec<Box<dyn NotificationRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Tick forever. Intended to be spawned as its own task.
    pub async fn run(&self) {
        if !self.config.enabled {
            tracing::info!("proactive scheduler disabled");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_secs(self.config.startup_delay_secs)).await;
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.tick_secs.max(1)));
        loop {
            ticker.tick().await;
            self.tick().await;
            self.maybe_cleanup().await;
        }
    }

    /// One evaluation pass over every known user. A failure for one user is
    /// logged and never aborts the pass for the others.
    pub async fn tick(&self) {
        let users = match self.store.users().await {
            Ok(users) => users,
            Err(err) => {
                tracing::warn!(error = %err, "could not list users, skipping tick");
                return;
            }
        };

        for prefs in users {
            match self.evaluate_user(&prefs).await {
                Ok(delivered) if delivered > 0 => {
                    tracing::info!(user = %prefs.user, delivered, "proactive notices delivered");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(user = %prefs.user, error = %err, "proactive evaluation failed");
                }
            }
        }
    }

    async fn evaluate_user(&self, prefs: &UserPrefs) -> Result<usize> {
        let active: Vec<&dyn NotificationRule> = self
            .rules
            .iter()
            .filter(|rule| rule.enabled_for(prefs))
            .map(|rule| rule.as_ref())
            .collect();
        if active.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let snapshot = Snapshot {
            now,
            events: self
                .backend
                .list_events(EventWindow::days_ahead(now, 1))
                .await?,
            tasks: self.backend.list_tasks().await?,
        };

        let mut delivered = 0usize;
        for rule in active {
            for notice in rule.evaluate(prefs, &snapshot) {
                if self
                    .store
                    .was_sent(prefs.user, notice.kind, &notice.reference, notice.date)
                    .await?
                {
                    continue;
                }

                // Gate first, marker second: a deferred notice must re-fire
                // on the next tick.
                let Some(_guard) = self.gate.try_acquire(prefs.user).await else {
                    tracing::debug!(
                        user = %prefs.user,
                        kind = notice.kind.as_str(),
                        "session busy, deferring notice to next tick"
                    );
                    continue;
                };

                self.store
                    .mark_sent(prefs.user, notice.kind, &notice.reference, notice.date)
                    .await?;
                self.sessions
                    .append(prefs.user, Turn::proactive(&notice.text))
                    .await;
                let _ = self
                    .bus
                    .publish(BusMessage::NoticeReady {
                        user: prefs.user,
                        text: notice.text.clone(),
                    })
                    .await;
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn maybe_cleanup(&self) {
        let today = Utc::now().date_naive();
        let mut last = self.last_cleanup.lock().await;
        if *last == Some(today) {
            return;
        }
        *last = Some(today);
        match self.store.cleanup_old_notices(self.config.cleanup_days).await {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "purged old sent-notice records");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "sent-notice cleanup failed"),
        }
    }
}

fn default_rules(config: &ProactiveConfig) -> Vec<Box<dyn NotificationRule>> {
    vec![
        Box::new(EventReminderRule {
            lead_minutes: config.reminder_lead_minutes,
            window_before: config.reminder_window_before_minutes,
            window_after: config.reminder_window_after_minutes,
        }),
        Box::new(OverdueNudgeRule),
        Box::new(DailyBriefingRule),
    ]
}

/// Register users with default preferences the first time they write in.
/// Listens on the bus so the gateway stays decoupled from the prefs store.
pub fn spawn_user_registration(
    store: Arc<PrefsStore>,
    bus: Arc<EventBus>,
    default_timezone: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = bus.subscribe(Topic::InboundReceived).await;
        while let Some(msg) = rx.recv().await {
            let BusMessage::InboundReceived { inbound } = msg else {
                continue;
            };
            if let Err(err) = store.ensure_user(inbound.user, &default_timezone).await {
                tracing::warn!(user = %inbound.user, error = %err, "failed to register user");
            }
        }
    })
}
