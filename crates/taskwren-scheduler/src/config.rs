use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    300
}

fn default_startup_delay_secs() -> u64 {
    10
}

fn default_reminder_lead_minutes() -> i64 {
    30
}

fn default_window_before_minutes() -> i64 {
    2
}

fn default_window_after_minutes() -> i64 {
    3
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskwren.db")
}

fn default_cleanup_days() -> i64 {
    7
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Evaluation interval.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Grace period after startup before the first tick.
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    /// How long before an event its reminder fires.
    #[serde(default = "default_reminder_lead_minutes")]
    pub reminder_lead_minutes: i64,
    /// Tolerance around the lead time, so a tick landing slightly off the
    /// mark still catches the event.
    #[serde(default = "default_window_before_minutes")]
    pub reminder_window_before_minutes: i64,
    #[serde(default = "default_window_after_minutes")]
    pub reminder_window_after_minutes: i64,
    /// Preference/dedupe store location.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Sent-notice records older than this are purged daily.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: i64,
    /// Timezone assigned to users on first contact.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_secs: default_tick_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            reminder_lead_minutes: default_reminder_lead_minutes(),
            reminder_window_before_minutes: default_window_before_minutes(),
            reminder_window_after_minutes: default_window_after_minutes(),
            db_path: default_db_path(),
            cleanup_days: default_cleanup_days(),
            default_timezone: default_timezone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_cadence() {
        let cfg: ProactiveConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.tick_secs, 300);
        assert_eq!(cfg.reminder_lead_minutes, 30);
        assert_eq!(cfg.cleanup_days, 7);
    }

    #[test]
    fn overrides_apply() {
        let cfg: ProactiveConfig =
            serde_yaml::from_str("tick_secs: 60\nreminder_lead_minutes: 10\n").unwrap();
        assert_eq!(cfg.tick_secs, 60);
        assert_eq!(cfg.reminder_lead_minutes, 10);
        assert_eq!(cfg.startup_delay_secs, 10);
    }
}
