use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ForeError, Result};
use crate::types::TimeOfDay;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_ADVANCE_SECS: u64 = 60;
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 600; // ten default ticks
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const SUBSCRIBER_BUFFER: usize = 64;
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Top-level config (fore.toml + FORE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeConfig {
    pub app: AppConfig,
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub slots: SlotsConfig,
    pub events: EventsConfig,
    pub media: MediaConfig,
    pub notifications: NotificationsConfig,
    pub platforms: PlatformsConfig,
}

/// Deployment mode. Only `Production` sends real e-mail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Development,
    Testing,
    Production,
}

impl AppMode {
    pub fn is_production(&self) -> bool {
        matches!(self, AppMode::Production)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: AppMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, `/api/posts/*` and `/api/slots/*` require `Authorization: Bearer <token>`.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Due-job poller and publishing pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poller ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Forward slack: posts due within this many seconds are picked up early.
    #[serde(default = "default_advance_secs")]
    pub advance_secs: u64,
    /// Maximum publishes in flight at once. 1 means sequential.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    /// A `posting` claim older than this is reported as stuck.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            advance_secs: DEFAULT_ADVANCE_SECS,
            max_concurrency: default_max_concurrency(),
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            notify_timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

/// Time-slot allocator preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsConfig {
    /// IANA zone used for calendar-day boundaries, e.g. `"America/New_York"` or `"UTC"`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Preferred daily slots in priority order (morning, noon, evening).
    #[serde(default = "default_preferred_slots")]
    pub preferred: Vec<TimeOfDay>,
}

impl SlotsConfig {
    pub fn zone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ForeError::InvalidTimeZone(self.timezone.clone()))
    }
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            preferred: default_preferred_slots(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Per-subscriber queue depth; a subscriber that falls this far behind is dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: HEARTBEAT_INTERVAL_SECS,
            subscriber_buffer: SUBSCRIBER_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory that post `media` filenames are resolved against.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// SMTP settings. Used only in production mode; otherwise notifications are logged.
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "bool_true")]
    pub starttls: bool,
    pub sender: String,
    pub recipient: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    /// Platform names served by the dry-run adapter (no network, synthetic ids).
    pub dry_run: Vec<String>,
    /// HTTP webhook adapters. Registered after dry-run ones, so they win on a name clash.
    pub webhook: Vec<WebhookPlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPlatformConfig {
    /// Platform name matched against `Post::platform`.
    pub name: String,
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// When set, the body is signed with HMAC-SHA256 in `X-Fore-Signature-256`.
    pub signing_secret: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}
fn default_advance_secs() -> u64 {
    DEFAULT_ADVANCE_SECS
}
fn default_max_concurrency() -> usize {
    1
}
fn default_adapter_timeout_secs() -> u64 {
    DEFAULT_ADAPTER_TIMEOUT_SECS
}
fn default_notify_timeout_secs() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}
fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_heartbeat_secs() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}
fn default_subscriber_buffer() -> usize {
    SUBSCRIBER_BUFFER
}
fn default_smtp_port() -> u16 {
    587
}

/// Morning, noon, evening.
pub fn default_preferred_slots() -> Vec<TimeOfDay> {
    vec![
        TimeOfDay { hour: 9, minute: 0 },
        TimeOfDay { hour: 12, minute: 0 },
        TimeOfDay { hour: 17, minute: 0 },
    ]
}

fn fore_home() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.fore", home)
}
fn default_db_path() -> String {
    format!("{}/fore.db", fore_home())
}
fn default_upload_dir() -> String {
    format!("{}/uploads", fore_home())
}

impl ForeConfig {
    /// Load config from a TOML file with FORE_* env var overrides.
    ///
    /// Nested keys use a double underscore: `FORE_SCHEDULER__INTERVAL_SECS=30`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        if !std::path::Path::new(&path).exists() {
            tracing::warn!(path = %path, "config file not found, using defaults and environment");
        }

        Self::figment(&path)
            .extract()
            .map_err(|e| ForeError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FORE_").split("__"))
    }
}

fn default_config_path() -> String {
    format!("{}/fore.toml", fore_home())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ForeConfig::default();
        assert_eq!(cfg.app.mode, AppMode::Development);
        assert_eq!(cfg.scheduler.interval_secs, 60);
        assert_eq!(cfg.scheduler.max_concurrency, 1);
        assert_eq!(cfg.slots.preferred.len(), 3);
        assert!(cfg.slots.zone().is_ok());
    }

    #[test]
    fn bad_timezone_is_reported() {
        let slots = SlotsConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..SlotsConfig::default()
        };
        assert!(matches!(slots.zone(), Err(ForeError::InvalidTimeZone(_))));
    }

    #[test]
    fn toml_and_env_are_merged() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "fore.toml",
                r#"
                [app]
                mode = "production"

                [scheduler]
                interval_secs = 15

                [slots]
                timezone = "UTC"
                preferred = ["07:00", "11:00", "18:00"]

                [[platforms.webhook]]
                name = "x"
                endpoint = "https://example.invalid/publish"
                "#,
            )?;
            jail.set_env("FORE_SCHEDULER__ADVANCE_SECS", "5");

            let cfg = ForeConfig::load(Some("fore.toml")).expect("config should load");
            assert!(cfg.app.mode.is_production());
            assert_eq!(cfg.scheduler.interval_secs, 15);
            assert_eq!(cfg.scheduler.advance_secs, 5);
            assert_eq!(cfg.slots.preferred[2], TimeOfDay { hour: 18, minute: 0 });
            assert_eq!(cfg.platforms.webhook[0].name, "x");
            // untouched sections keep their defaults
            assert_eq!(cfg.events.heartbeat_secs, HEARTBEAT_INTERVAL_SECS);
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let cfg = ForeConfig::load(Some("does-not-exist.toml")).expect("defaults");
            assert_eq!(cfg.gateway.port, DEFAULT_PORT);
            Ok(())
        });
    }
}
