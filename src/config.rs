use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stomp::HeartBeat;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
}

/// STOMP broker carrying the status topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// WebSocket endpoint of the broker
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Topic carrying status events
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Outgoing heart-beat interval offered to the broker (0 disables)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_outgoing_ms: u64,
    /// Incoming heart-beat interval requested from the broker (0 disables)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_incoming_ms: u64,
    /// Optional STOMP login header
    #[serde(default)]
    pub login: Option<String>,
    /// Optional STOMP passcode header
    #[serde(default)]
    pub passcode: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            topic: default_topic(),
            heartbeat_outgoing_ms: default_heartbeat_ms(),
            heartbeat_incoming_ms: default_heartbeat_ms(),
            login: None,
            passcode: None,
        }
    }
}

impl BrokerConfig {
    pub fn heartbeat(&self) -> HeartBeat {
        HeartBeat::new(self.heartbeat_outgoing_ms, self.heartbeat_incoming_ms)
    }

    /// Extra CONNECT headers
    pub fn connect_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(login) = &self.login {
            headers.push(("login".to_string(), login.clone()));
        }
        if let Some(passcode) = &self.passcode {
            headers.push(("passcode".to_string(), passcode.clone()));
        }
        headers
    }
}

fn default_broker_url() -> String {
    "ws://localhost:8080/ws/websocket".to_string()
}

fn default_topic() -> String {
    crate::channel::STATUS_TOPIC.to_string()
}

fn default_heartbeat_ms() -> u64 {
    10000
}

/// Consulting-periods REST service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the certification endpoint (POST)
    #[serde(default = "default_certify_path")]
    pub certify_path: String,
    /// Path of the code list endpoint (GET)
    #[serde(default = "default_codes_path")]
    pub codes_path: String,
    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            certify_path: default_certify_path(),
            codes_path: default_codes_path(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_certify_path() -> String {
    "/consulting-periods/cert".to_string()
}

fn default_codes_path() -> String {
    "/consulting-periods/codigo".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Screen behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Status shown after a period edit while the form is valid
    #[serde(default = "default_in_progress")]
    pub in_progress_status: String,
    /// Notification shown when the certification request fails
    #[serde(default = "default_unavailable")]
    pub service_unavailable_message: String,
    /// Only accept the first day of a month as period
    #[serde(default = "default_true")]
    pub first_day_only: bool,
    /// How often the screen loop polls for events
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long one-shot commands wait for the status push
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            in_progress_status: default_in_progress(),
            service_unavailable_message: default_unavailable(),
            first_day_only: true,
            poll_interval_ms: default_poll_interval(),
            wait_timeout_secs: default_wait_timeout(),
        }
    }
}

impl ScreenConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

fn default_in_progress() -> String {
    "En curso".to_string()
}

fn default_unavailable() -> String {
    "Service unavailable".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    100
}

fn default_wait_timeout() -> u64 {
    300
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "periodcert", "Periodcert")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, using defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
