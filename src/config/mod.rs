use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub clock: ClockSyncConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the hosted project, e.g. `https://xyz.example.co`.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub api_key: String,
    /// Privileged key used by the import tool. Never needed by contest views.
    pub service_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            service_key: None,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClockSyncConfig {
    pub resync_interval_secs: u64,
    pub initial_attempts: u32,
    pub retry_delay_ms: u64,
    pub drift_threshold_ms: i64,
    pub max_plausible_offset_hours: i64,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 5 * 60,
            initial_attempts: 3,
            retry_delay_ms: 500,
            drift_threshold_ms: 1000,
            max_plausible_offset_hours: 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub inactivity_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { inactivity_minutes: 20 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub max_failed_attempts: u32,
    pub lockout_minutes: i64,
    pub inactivity_minutes: i64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 15,
            inactivity_minutes: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimerConfig {
    pub tick_ms: u64,
    pub default_problem_seconds: i64,
    pub default_round_minutes: i64,
    /// Write `timer_active=false` back when a client sees the round end.
    /// Off by default: a client with a fast clock would end the round for everyone.
    pub auto_stop_on_expiry: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            default_problem_seconds: 600,
            default_round_minutes: 60,
            auto_stop_on_expiry: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    pub hidden_grace_secs: u64,
    /// 0 disables polling.
    pub poll_fallback_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            hidden_grace_secs: 30,
            poll_fallback_secs: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    pub display_window_secs: i64,
    pub sweep_interval_secs: u64,
    pub fetch_limit: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            display_window_secs: 120,
            sweep_interval_secs: 10,
            fetch_limit: 5,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("backend.url", "http://localhost:54321")?
            .set_default("backend.api_key", "")?
            .set_default("backend.request_timeout_secs", 10)?
            .set_default("clock.resync_interval_secs", 300)?
            .set_default("clock.initial_attempts", 3)?
            .set_default("clock.retry_delay_ms", 500)?
            .set_default("clock.drift_threshold_ms", 1000)?
            .set_default("clock.max_plausible_offset_hours", 24)?
            .set_default("session.inactivity_minutes", 20)?
            .set_default("admin.max_failed_attempts", 5)?
            .set_default("admin.lockout_minutes", 15)?
            .set_default("admin.inactivity_minutes", 20)?
            .set_default("timer.tick_ms", 1000)?
            .set_default("timer.default_problem_seconds", 600)?
            .set_default("timer.default_round_minutes", 60)?
            .set_default("timer.auto_stop_on_expiry", false)?
            .set_default("live.hidden_grace_secs", 30)?
            .set_default("live.poll_fallback_secs", 0)?
            .set_default("broadcast.display_window_secs", 120)?
            .set_default("broadcast.sweep_interval_secs", 10)?
            .set_default("broadcast.fetch_limit", 5)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with CODEVERSE__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("CODEVERSE").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}
