//! Preference and sent-notice store on SQLite.
//!
//! Two tables: per-user notification preferences, and the idempotency
//! records that keep a fired notice from firing again. The UNIQUE key on
//! (user, kind, reference, date) is the marker contract: `mark_sent` is a
//! no-op when the record already exists.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection};
use taskwren_schema::UserId;
use tokio::sync::Mutex;

use crate::rules::NoticeKind;

#[derive(Debug, Clone, PartialEq)]
pub struct UserPrefs {
    pub user: UserId,
    pub timezone: String,
    pub briefing_enabled: bool,
    pub briefing_time: NaiveTime,
    pub reminders_enabled: bool,
    pub nudges_enabled: bool,
}

pub struct PrefsStore {
    conn: Arc<Mutex<Connection>>,
}

impl PrefsStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the user with default preferences if absent, then return the
    /// current row.
    pub async fn ensure_user(&self, user: UserId, default_tz: &str) -> Result<UserPrefs> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO users (user_id, timezone) VALUES (?1, ?2)",
            params![user.0, default_tz],
        )?;
        query_user(&conn, user)?.context("user row vanished after insert")
    }

    pub async fn user_prefs(&self, user: UserId) -> Result<Option<UserPrefs>> {
        let conn = self.conn.lock().await;
        query_user(&conn, user)
    }

    pub async fn users(&self) -> Result<Vec<UserPrefs>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT user_id, timezone, briefing_enabled, briefing_time,
                    reminders_enabled, nudges_enabled
             FROM users ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], row_to_prefs)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub async fn set_briefing(
        &self,
        user: UserId,
        enabled: bool,
        time: NaiveTime,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET briefing_enabled = ?2, briefing_time = ?3 WHERE user_id = ?1",
            params![user.0, enabled as i64, time.format("%H:%M").to_string()],
        )?;
        Ok(())
    }

    pub async fn set_reminders(&self, user: UserId, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET reminders_enabled = ?2 WHERE user_id = ?1",
            params![user.0, enabled as i64],
        )?;
        Ok(())
    }

    pub async fn set_nudges(&self, user: UserId, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET nudges_enabled = ?2 WHERE user_id = ?1",
            params![user.0, enabled as i64],
        )?;
        Ok(())
    }

    pub async fn was_sent(
        &self,
        user: UserId,
        kind: NoticeKind,
        reference: &str,
        date: NaiveDate,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT 1 FROM sent_notices
             WHERE user_id = ?1 AND kind = ?2 AND reference_id = ?3 AND reference_date = ?4",
        )?;
        let found = stmt.exists(params![
            user.0,
            kind.as_str(),
            reference,
            date.to_string()
        ])?;
        Ok(found)
    }

    pub async fn mark_sent(
        &self,
        user: UserId,
        kind: NoticeKind,
        reference: &str,
        date: NaiveDate,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO sent_notices (user_id, kind, reference_id, reference_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![user.0, kind.as_str(), reference, date.to_string()],
        )?;
        Ok(())
    }

    /// Remove one marker so the matching rule may fire again.
    pub async fn clear_marker(
        &self,
        user: UserId,
        kind: NoticeKind,
        reference: &str,
        date: NaiveDate,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM sent_notices
             WHERE user_id = ?1 AND kind = ?2 AND reference_id = ?3 AND reference_date = ?4",
            params![user.0, kind.as_str(), reference, date.to_string()],
        )?;
        Ok(())
    }

    /// Purge sent-notice records older than `days`. Returns rows removed.
    pub async fn cleanup_old_notices(&self, days: i64) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM sent_notices WHERE sent_at < datetime('now', ?1)",
            params![format!("-{days} days")],
        )?;
        Ok(removed)
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            briefing_enabled INTEGER NOT NULL DEFAULT 0,
            briefing_time TEXT NOT NULL DEFAULT '08:00',
            reminders_enabled INTEGER NOT NULL DEFAULT 1,
            nudges_enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS sent_notices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            reference_id TEXT NOT NULL DEFAULT '',
            reference_date TEXT NOT NULL,
            sent_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, kind, reference_id, reference_date)
        );

        CREATE INDEX IF NOT EXISTS idx_sent_notices_lookup
        ON sent_notices(user_id, kind, reference_id, reference_date);
        "#,
    )?;
    Ok(())
}

fn query_user(conn: &Connection, user: UserId) -> Result<Option<UserPrefs>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, timezone, briefing_enabled, briefing_time,
                reminders_enabled, nudges_enabled
         FROM users WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query_map(params![user.0], row_to_prefs)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

fn row_to_prefs(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserPrefs> {
    let time_raw: String = row.get(3)?;
    let briefing_time = NaiveTime::parse_from_str(&time_raw, "%H:%M").unwrap_or(NaiveTime::MIN);
    Ok(UserPrefs {
        user: UserId(row.get(0)?),
        timezone: row.get(1)?,
        briefing_enabled: row.get::<_, i64>(2)? != 0,
        briefing_time,
        reminders_enabled: row.get::<_, i64>(4)? != 0,
        nudges_enabled: row.get::<_, i64>(5)? != 0,
    })
}
