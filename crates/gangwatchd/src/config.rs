//! Configuration management for gangwatchd.
//!
//! Loads settings from /etc/gangwatch/config.toml or uses defaults.

use anyhow::{Context, Result};
use chrono::Weekday;
use gangwatch_shared::boundary::{DEFAULT_RESET_HOUR, DEFAULT_TIMEZONE};
use gangwatch_shared::standings::DEFAULT_SIGNIFICANT_XP;
use gangwatch_shared::task::{DEFAULT_DAY_END_HOUR, DEFAULT_DAY_START_HOUR, DEFAULT_TASK_REWARD};
use gangwatch_shared::{BoundaryClock, ExactRewardDetector, TrackerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/gangwatch/config.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/gangwatch/config.toml";

/// Environment variable that overrides the API token
pub const TOKEN_ENV: &str = "GANGWATCH_API_TOKEN";

/// Upstream scoreboard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Scoreboard endpoint returning `{ "tops": [...] }`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token, if the endpoint requires one
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_url() -> String {
    "https://app.diamondrp.ir/api/tops/gangs".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("gangwatch/{}", gangwatch_shared::VERSION)
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Trigger cadence and window boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Periodic cycle interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// IANA zone the resets are evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Local hour every window rolls over
    #[serde(default = "default_reset_hour")]
    pub reset_hour: u32,

    /// Weekday the weekly window rolls over (e.g. "monday")
    #[serde(default = "default_reset_weekday")]
    pub weekly_reset_weekday: String,

    /// Apply resets for boundaries that passed while the daemon was down
    #[serde(default = "default_true")]
    pub catch_up_missed: bool,

    /// Consecutive failed cycles before backing off
    #[serde(default = "default_max_errors")]
    pub max_consecutive_errors: u32,

    /// Back-off pause in seconds
    #[serde(default = "default_backoff")]
    pub error_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    15
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_reset_hour() -> u32 {
    DEFAULT_RESET_HOUR
}

fn default_reset_weekday() -> String {
    "monday".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_errors() -> u32 {
    5
}

fn default_backoff() -> u64 {
    60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timezone: default_timezone(),
            reset_hour: default_reset_hour(),
            weekly_reset_weekday: default_reset_weekday(),
            catch_up_missed: default_true(),
            max_consecutive_errors: default_max_errors(),
            error_backoff_secs: default_backoff(),
        }
    }
}

/// Task detection heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Exact XP jump that counts as a completed task
    #[serde(default = "default_reward")]
    pub reward: u64,

    #[serde(default = "default_day_start")]
    pub day_start_hour: u32,

    #[serde(default = "default_day_end")]
    pub day_end_hour: u32,
}

fn default_reward() -> u64 {
    DEFAULT_TASK_REWARD
}

fn default_day_start() -> u32 {
    DEFAULT_DAY_START_HOUR
}

fn default_day_end() -> u32 {
    DEFAULT_DAY_END_HOUR
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            reward: default_reward(),
            day_start_hour: default_day_start(),
            day_end_hour: default_day_end(),
        }
    }
}

/// Change surfacing thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_significant_xp")]
    pub significant_xp: u64,
}

fn default_significant_xp() -> u64 {
    DEFAULT_SIGNIFICANT_XP
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            significant_xp: default_significant_xp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/gangwatch")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load config from standard paths, falling back to defaults
    pub fn load() -> Self {
        let mut config = Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            });
        config.apply_env();
        config
    }

    /// Load config from an explicit path; a missing file is an error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.apply_env();
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save default config to path (for init)
    pub fn save_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.source.api_token = Some(token);
            }
        }
    }

    /// Boundary clock for the configured zone, reset hour and weekday
    pub fn boundary_clock(&self) -> std::result::Result<BoundaryClock, TrackerError> {
        let weekday: Weekday = self.schedule.weekly_reset_weekday.parse().map_err(|_| {
            TrackerError::Config(format!(
                "invalid weekly_reset_weekday '{}'",
                self.schedule.weekly_reset_weekday
            ))
        })?;
        if self.schedule.reset_hour > 23 {
            return Err(TrackerError::Config(format!(
                "reset_hour {} is out of range",
                self.schedule.reset_hour
            )));
        }

        Ok(BoundaryClock::from_zone_name(&self.schedule.timezone)?
            .with_reset_hour(self.schedule.reset_hour)
            .with_reset_weekday(weekday))
    }

    /// Task detector built from the `[tasks]` section
    pub fn task_detector(&self) -> ExactRewardDetector {
        ExactRewardDetector {
            reward: self.tasks.reward,
            day_start_hour: self.tasks.day_start_hour,
            day_end_hour: self.tasks.day_end_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.schedule.poll_interval_secs, 15);
        assert_eq!(config.schedule.reset_hour, 7);
        assert_eq!(config.tasks.reward, 500);
        assert_eq!(config.source.timeout_secs, 10);
        assert!(config.boundary_clock().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [schedule]
            timezone = "Europe/Berlin"
            weekly_reset_weekday = "sunday"

            [tasks]
            reward = 750
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.poll_interval_secs, 15);
        assert_eq!(config.tasks.reward, 750);
        assert_eq!(config.tasks.day_end_hour, 18);
        let clock = config.boundary_clock().unwrap();
        assert_eq!(clock.reset_weekday(), Weekday::Sun);
        assert_eq!(config.task_detector().reward, 750);
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let mut config = Config::default();
        config.schedule.timezone = "Nowhere/Special".to_string();
        assert!(matches!(
            config.boundary_clock(),
            Err(TrackerError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_save_and_load_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::save_default(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.schedule.timezone, DEFAULT_TIMEZONE);
        assert_eq!(loaded.storage.data_dir, PathBuf::from("/var/lib/gangwatch"));
    }
}
