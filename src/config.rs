//! Application-level configuration loading: sweep cadence, scheduling limits and
//! notification settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TURNSTILE_CONFIG_PATH";

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_SCHEDULE_LEAD_HOURS: i64 = 24;
const DEFAULT_CONFLICT_ATTEMPTS: u32 = 3;
const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TURN_MESSAGE: &str = "Queue: {title}. It's your turn now. Good luck!";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Placeholder replaced by the queue title in message templates.
const TITLE_PLACEHOLDER: &str = "{title}";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    sweep_interval: Duration,
    schedule_lead: time::Duration,
    conflict_attempts: u32,
    notification_timeout: Duration,
    turn_message: String,
    telegram_api_base: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        sweep_interval_secs = app_config.sweep_interval.as_secs(),
                        conflict_attempts = app_config.conflict_attempts,
                        "loaded queue settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// How often the background sweep reconciles open queues.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// How far after "now" a new queue may be scheduled to open.
    pub fn schedule_lead(&self) -> time::Duration {
        self.schedule_lead
    }

    /// Attempts made for one operation when storage reports a uniqueness conflict.
    pub fn conflict_attempts(&self) -> u32 {
        self.conflict_attempts
    }

    /// Upper bound for a single notification delivery.
    pub fn notification_timeout(&self) -> Duration {
        self.notification_timeout
    }

    /// Base URL of the Telegram Bot API.
    pub fn telegram_api_base(&self) -> &str {
        &self.telegram_api_base
    }

    /// Text sent to a participant whose turn has started.
    pub fn turn_message(&self, queue_title: &str) -> String {
        self.turn_message.replace(TITLE_PLACEHOLDER, queue_title)
    }

    /// Override the sweep period.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Override the number of attempts per step; at least one.
    pub fn with_conflict_attempts(mut self, attempts: u32) -> Self {
        self.conflict_attempts = attempts.max(1);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            schedule_lead: time::Duration::hours(DEFAULT_SCHEDULE_LEAD_HOURS),
            conflict_attempts: DEFAULT_CONFLICT_ATTEMPTS,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            turn_message: DEFAULT_TURN_MESSAGE.to_owned(),
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    sweep_interval_secs: Option<u64>,
    schedule_lead_hours: Option<i64>,
    conflict_attempts: Option<u32>,
    notification_timeout_secs: Option<u64>,
    turn_message: Option<String>,
    telegram_api_base: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            sweep_interval: positive_secs("sweep_interval_secs", value.sweep_interval_secs)
                .unwrap_or(defaults.sweep_interval),
            schedule_lead: match value.schedule_lead_hours {
                Some(hours) if hours >= 0 => time::Duration::hours(hours),
                Some(hours) => {
                    warn!(hours, "negative schedule_lead_hours ignored");
                    defaults.schedule_lead
                }
                None => defaults.schedule_lead,
            },
            conflict_attempts: value
                .conflict_attempts
                .map(|attempts| attempts.max(1))
                .unwrap_or(defaults.conflict_attempts),
            notification_timeout: positive_secs(
                "notification_timeout_secs",
                value.notification_timeout_secs,
            )
            .unwrap_or(defaults.notification_timeout),
            turn_message: value
                .turn_message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or(defaults.turn_message),
            telegram_api_base: value
                .telegram_api_base
                .map(|base| base.trim_end_matches('/').to_owned())
                .filter(|base| !base.is_empty())
                .unwrap_or(defaults.telegram_api_base),
        }
    }
}

fn positive_secs(field: &'static str, value: Option<u64>) -> Option<Duration> {
    match value {
        Some(0) => {
            warn!(field, "zero duration ignored");
            None
        }
        other => other.map(Duration::from_secs),
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"sweep_interval_secs": 5, "conflict_attempts": 0}"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.conflict_attempts(), 1);
        assert_eq!(config.schedule_lead(), time::Duration::hours(24));
        assert_eq!(config.telegram_api_base(), "https://api.telegram.org");
    }

    #[test]
    fn zero_durations_fall_back() {
        let raw: RawConfig = serde_json::from_str(r#"{"sweep_interval_secs": 0}"#).unwrap();
        assert_eq!(AppConfig::from(raw).sweep_interval(), DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn turn_message_substitutes_title() {
        let config = AppConfig::default();
        assert_eq!(
            config.turn_message("Lab 3"),
            "Queue: Lab 3. It's your turn now. Good luck!"
        );

        let raw: RawConfig =
            serde_json::from_str(r#"{"turn_message": "{title}: you're up"}"#).unwrap();
        assert_eq!(AppConfig::from(raw).turn_message("Lab 3"), "Lab 3: you're up");
    }
}
