use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "bdayd.db".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Rolling look-ahead window, in days. Raise for cold starts that need
    /// to back-fill further out.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
    /// Grace period after a missed trigger during which delivery still
    /// happens instead of being dropped.
    #[serde(default = "default_catch_up_window_hours")]
    pub catch_up_window_hours: i64,
    /// Local hour of the daily rebuild.
    #[serde(default = "default_daily_refresh_hour")]
    pub daily_refresh_hour: u32,
    /// How long delivery records are kept before cleanup.
    #[serde(default = "default_dedup_retention_days")]
    pub dedup_retention_days: i64,
    /// Offset used for the daily-refresh clock.
    #[serde(default)]
    pub default_tz_offset: i32,
    /// Sends per pacing bucket during catch-up bursts.
    #[serde(default = "default_send_burst")]
    pub send_burst: usize,
    /// Pause between pacing buckets.
    #[serde(default = "default_send_pause_secs")]
    pub send_pause_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            catch_up_window_hours: default_catch_up_window_hours(),
            daily_refresh_hour: default_daily_refresh_hour(),
            dedup_retention_days: default_dedup_retention_days(),
            default_tz_offset: 0,
            send_burst: default_send_burst(),
            send_pause_secs: default_send_pause_secs(),
        }
    }
}

fn default_horizon_days() -> i64 {
    7
}
fn default_catch_up_window_hours() -> i64 {
    12
}
fn default_daily_refresh_hour() -> u32 {
    3
}
fn default_dedup_retention_days() -> i64 {
    400
}
fn default_send_burst() -> usize {
    20
}
fn default_send_pause_secs() -> u64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_hard_stop_grace_secs")]
    pub hard_stop_grace_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            hard_stop_grace_secs: default_hard_stop_grace_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_hard_stop_grace_secs() -> u64 {
    2
}
