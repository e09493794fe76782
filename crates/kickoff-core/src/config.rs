use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Defaults mirror what the live-update service negotiates with browser clients.
pub const DEFAULT_URL: &str = "ws://localhost:8080/ws/websocket";
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 4_000; // each direction
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_EVENT_HISTORY: usize = 50;
pub const DEFAULT_CHAT_HISTORY: usize = 100;
pub const DEFAULT_NOTIFICATION_HISTORY: usize = 50;
pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;

/// Top-level config (kickoff.toml + KICKOFF_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KickoffConfig {
    #[serde(default)]
    pub live: LiveConfig,
}

/// Live-update client settings.
///
/// Every field has a default, so an empty `[live]` table (or no file at all)
/// yields a client that talks to a local development server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// WebSocket URL of the STOMP endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Optional bearer token, sent as an `Authorization` header on CONNECT.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// First reconnect delay; doubles on every consecutive failure.
    #[serde(default = "default_base_delay")]
    pub reconnect_base_delay_ms: u64,
    /// Consecutive failures tolerated before the client gives up (Failed).
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_event_history")]
    pub event_history: usize,
    #[serde(default = "default_chat_history")]
    pub chat_history: usize,
    #[serde(default = "default_notification_history")]
    pub notification_history: usize,
    /// Outbound messages kept while disconnected; the oldest is dropped past this.
    #[serde(default = "default_queue_cap")]
    pub outbound_queue_cap: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            auth_token: None,
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            event_history: DEFAULT_EVENT_HISTORY,
            chat_history: DEFAULT_CHAT_HISTORY,
            notification_history: DEFAULT_NOTIFICATION_HISTORY,
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
        }
    }
}

impl LiveConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}
fn default_base_delay() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_heartbeat() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_event_history() -> usize {
    DEFAULT_EVENT_HISTORY
}
fn default_chat_history() -> usize {
    DEFAULT_CHAT_HISTORY
}
fn default_notification_history() -> usize {
    DEFAULT_NOTIFICATION_HISTORY
}
fn default_queue_cap() -> usize {
    DEFAULT_OUTBOUND_QUEUE_CAP
}

impl KickoffConfig {
    /// Load config from a TOML file with KICKOFF_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.kickoff/kickoff.toml
    ///
    /// A missing file is not an error; env overrides and defaults still apply.
    /// Nested keys use a double underscore: `KICKOFF_LIVE__URL=ws://…`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: KickoffConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("KICKOFF_").split("__"))
            .extract()
            .map_err(|e| crate::error::KickoffError::Config(e.to_string()))?;

        tracing::debug!(path = %path, url = %config.live.url, "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kickoff/kickoff.toml", home)
}
