//! Per-user bounded conversation history.
//!
//! Eviction runs oldest-first, skips proactive turns while anything else can
//! go, and never removes the most recent successful tool-result turn, so the
//! model keeps its last concrete fact even under aggressive trimming.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taskwren_schema::UserId;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    ToolResult { ok: bool },
    Proactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text)
    }

    pub fn tool_result(text: impl Into<String>, ok: bool) -> Self {
        Self::new(TurnRole::ToolResult { ok }, text)
    }

    pub fn proactive(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Proactive, text)
    }

    pub fn is_successful_tool_result(&self) -> bool {
        matches!(self.role, TurnRole::ToolResult { ok: true })
    }
}

#[derive(Debug, Default)]
struct Session {
    turns: VecDeque<Turn>,
    last_active: Option<DateTime<Utc>>,
}

impl Session {
    fn append(&mut self, turn: Turn, cap: usize) {
        self.turns.push_back(turn);
        self.last_active = Some(Utc::now());
        while self.turns.len() > cap {
            let Some(victim) = self.pick_victim() else {
                break;
            };
            self.turns.remove(victim);
        }
    }

    /// Index of the oldest evictable turn. Skips the most recent successful
    /// tool result; prefers non-proactive turns while any remain.
    fn pick_victim(&self) -> Option<usize> {
        let protected = self
            .turns
            .iter()
            .rposition(|t| t.is_successful_tool_result());

        let candidate = |skip_proactive: bool| {
            self.turns
                .iter()
                .enumerate()
                .position(|(idx, t)| {
                    Some(idx) != protected
                        && (!skip_proactive || t.role != TurnRole::Proactive)
                })
        };
        candidate(true).or_else(|| candidate(false))
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    cap: usize,
}

impl SessionStore {
    pub fn new(cap: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            cap: cap.max(1),
        }
    }

    pub async fn append(&self, user: UserId, turn: Turn) {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(user).or_default().append(turn, self.cap);
    }

    pub async fn history(&self, user: UserId) -> Vec<Turn> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&user)
            .map(|s| s.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn turn_count(&self, user: UserId) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.get(&user).map(|s| s.turns.len()).unwrap_or(0)
    }

    pub async fn known_users(&self) -> Vec<UserId> {
        let sessions = self.sessions.lock().await;
        let mut users: Vec<UserId> = sessions.keys().copied().collect();
        users.sort();
        users
    }

    /// Drop the user's history. Returns whether a session existed.
    pub async fn reset(&self, user: UserId) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&user).is_some()
    }

    /// Advisory expiry: drop sessions idle for longer than `ttl`.
    pub async fn purge_idle(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active.map(|at| at >= cutoff).unwrap_or(false));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(1);

    #[tokio::test]
    async fn cap_holds_after_every_append() {
        let store = SessionStore::new(5);
        for i in 0..20 {
            store.append(USER, Turn::user(format!("msg {i}"))).await;
            assert!(store.turn_count(USER).await <= 5);
        }
    }

    #[tokio::test]
    async fn eviction_is_fifo() {
        let store = SessionStore::new(3);
        for i in 0..5 {
            store.append(USER, Turn::user(format!("msg {i}"))).await;
        }
        let texts: Vec<_> = store
            .history(USER)
            .await
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn latest_successful_tool_result_survives_eviction() {
        let store = SessionStore::new(3);
        store.append(USER, Turn::user("list my tasks")).await;
        store
            .append(USER, Turn::tool_result("{\"tasks\": []}", true))
            .await;
        for i in 0..10 {
            store.append(USER, Turn::user(format!("chatter {i}"))).await;
        }
        let history = store.history(USER).await;
        assert!(history.iter().any(|t| t.is_successful_tool_result()));
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn newer_tool_result_releases_older_one() {
        let store = SessionStore::new(4);
        store.append(USER, Turn::tool_result("old result", true)).await;
        store.append(USER, Turn::user("more")).await;
        store.append(USER, Turn::tool_result("new result", true)).await;
        for i in 0..6 {
            store.append(USER, Turn::user(format!("chatter {i}"))).await;
        }
        let history = store.history(USER).await;
        let kept: Vec<_> = history
            .iter()
            .filter(|t| t.is_successful_tool_result())
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(kept, vec!["new result"]);
    }

    #[tokio::test]
    async fn failed_tool_results_are_not_protected() {
        let store = SessionStore::new(2);
        store.append(USER, Turn::tool_result("rate limited", false)).await;
        store.append(USER, Turn::user("a")).await;
        store.append(USER, Turn::user("b")).await;
        let history = store.history(USER).await;
        assert!(!history.iter().any(|t| t.text == "rate limited"));
    }

    #[tokio::test]
    async fn proactive_turns_evicted_last() {
        let store = SessionStore::new(2);
        store.append(USER, Turn::proactive("reminder: standup")).await;
        store.append(USER, Turn::user("a")).await;
        store.append(USER, Turn::user("b")).await;
        let history = store.history(USER).await;
        assert!(history.iter().any(|t| t.role == TurnRole::Proactive));
    }

    #[tokio::test]
    async fn reset_and_known_users() {
        let store = SessionStore::new(5);
        store.append(UserId(2), Turn::user("hi")).await;
        store.append(UserId(1), Turn::user("hi")).await;
        assert_eq!(store.known_users().await, vec![UserId(1), UserId(2)]);
        assert!(store.reset(UserId(1)).await);
        assert!(!store.reset(UserId(1)).await);
        assert_eq!(store.known_users().await, vec![UserId(2)]);
    }

    #[tokio::test]
    async fn purge_idle_removes_stale_sessions() {
        let store = SessionStore::new(5);
        store.append(USER, Turn::user("hi")).await;
        assert_eq!(store.purge_idle(Duration::seconds(3600)).await, 0);
        assert_eq!(store.purge_idle(Duration::seconds(-1)).await, 1);
        assert_eq!(store.turn_count(USER).await, 0);
    }
}
