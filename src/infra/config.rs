//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! `GARAGE_WATCH_SOURCE_URL` and `GARAGE_WATCH_ENTITY_ID` override the
//! `[source]` values after the file is loaded.

use crate::domain::types::StateVocabulary;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

pub const ENV_SOURCE_URL: &str = "GARAGE_WATCH_SOURCE_URL";
pub const ENV_ENTITY_ID: &str = "GARAGE_WATCH_ENTITY_ID";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// SSE endpoint of the state source
    pub url: String,
    #[serde(default = "default_entity_id")]
    pub entity_id: String,
    /// Upper bound for one connection cycle
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
    #[serde(default)]
    pub vocabulary: StateVocabulary,
}

fn default_entity_id() -> String {
    "cover-door".to_string()
}

fn default_cycle_timeout_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// A cycle shorter than this counts as a quick failure
    #[serde(default = "default_quick_failure_window_secs")]
    pub quick_failure_window_secs: u64,
    /// Cooldown kicks in once consecutive quick failures exceed this
    #[serde(default = "default_max_quick_failures")]
    pub max_quick_failures: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_quick_failure_window_secs() -> u64 {
    60
}

fn default_max_quick_failures() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    60
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            quick_failure_window_secs: default_quick_failure_window_secs(),
            max_quick_failures: default_max_quick_failures(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Output channel capacity; full channel drops new events
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { channel_capacity: default_channel_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub open_url: Option<String>,
    #[serde(default)]
    pub close_url: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_webhook_timeout_ms() -> u64 {
    60_000
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self { open_url: None, close_url: None, timeout_ms: default_webhook_timeout_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionsConfig {
    /// How long an action waits for the door to reach its target state
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

fn default_wait_timeout_secs() -> u64 {
    30
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self { wait_timeout_secs: default_wait_timeout_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Metrics log interval (0 to disable)
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    source_url: String,
    entity_id: String,
    cycle_timeout_secs: u64,
    vocabulary: StateVocabulary,
    quick_failure_window_secs: u64,
    max_quick_failures: u32,
    cooldown_secs: u64,
    channel_capacity: usize,
    webhook_open_url: Option<String>,
    webhook_close_url: Option<String>,
    webhook_timeout_ms: u64,
    wait_timeout_secs: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: "http://localhost:8080/events".to_string(),
            entity_id: default_entity_id(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            vocabulary: StateVocabulary::Strict,
            quick_failure_window_secs: default_quick_failure_window_secs(),
            max_quick_failures: default_max_quick_failures(),
            cooldown_secs: default_cooldown_secs(),
            channel_capacity: default_channel_capacity(),
            webhook_open_url: None,
            webhook_close_url: None,
            webhook_timeout_ms: default_webhook_timeout_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            metrics_interval_secs: default_metrics_interval_secs(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_file = path.display().to_string();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)?;

        if toml_config.events.channel_capacity == 0 {
            anyhow::bail!("events.channel_capacity must be at least 1");
        }

        Ok(Self {
            source_url: toml_config.source.url,
            entity_id: toml_config.source.entity_id,
            cycle_timeout_secs: toml_config.source.cycle_timeout_secs,
            vocabulary: toml_config.source.vocabulary,
            quick_failure_window_secs: toml_config.supervisor.quick_failure_window_secs,
            max_quick_failures: toml_config.supervisor.max_quick_failures,
            cooldown_secs: toml_config.supervisor.cooldown_secs,
            channel_capacity: toml_config.events.channel_capacity,
            webhook_open_url: toml_config.webhooks.open_url.filter(|u| !u.is_empty()),
            webhook_close_url: toml_config.webhooks.close_url.filter(|u| !u.is_empty()),
            webhook_timeout_ms: toml_config.webhooks.timeout_ms,
            wait_timeout_secs: toml_config.actions.wait_timeout_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: "inline".to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply environment overrides through a lookup function
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SOURCE_URL).filter(|v| !v.is_empty()) {
            self.source_url = url;
        }
        if let Some(entity) = lookup(ENV_ENTITY_ID).filter(|v| !v.is_empty()) {
            self.entity_id = entity;
        }
        self
    }

    // Getters for all config fields
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn cycle_timeout_secs(&self) -> u64 {
        self.cycle_timeout_secs
    }

    pub fn vocabulary(&self) -> StateVocabulary {
        self.vocabulary
    }

    pub fn quick_failure_window_secs(&self) -> u64 {
        self.quick_failure_window_secs
    }

    pub fn max_quick_failures(&self) -> u32 {
        self.max_quick_failures
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_secs
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn webhook_open_url(&self) -> Option<&str> {
        self.webhook_open_url.as_deref()
    }

    pub fn webhook_close_url(&self) -> Option<&str> {
        self.webhook_close_url.as_deref()
    }

    pub fn webhook_timeout_ms(&self) -> u64 {
        self.webhook_timeout_ms
    }

    pub fn wait_timeout_secs(&self) -> u64 {
        self.wait_timeout_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set webhook URLs
    #[cfg(test)]
    pub fn with_webhooks(mut self, open_url: Option<&str>, close_url: Option<&str>) -> Self {
        self.webhook_open_url = open_url.map(str::to_string);
        self.webhook_close_url = close_url.map(str::to_string);
        self
    }

    /// Builder method for tests to shorten action waits
    #[cfg(test)]
    pub fn with_wait_timeout_secs(mut self, secs: u64) -> Self {
        self.wait_timeout_secs = secs;
        self
    }
}
