//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{Actor, Role, SubjectId};
use crate::services::registry::ZoneSpec;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique deployment identifier (e.g., "goa-north", "shimla")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "geoguard".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_http_bind_address(), port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Drop a subject's status after this long without a sample
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
    /// Bound of the location sample ingestion channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_status_ttl_secs() -> u64 {
    3600
}

fn default_channel_capacity() -> usize {
    4096
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: default_status_ttl_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum seconds between accepted panic alerts per subject
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
}

fn default_rate_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_secs: default_rate_window_secs() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    /// Enable outbound push notifications on alerts
    #[serde(default)]
    pub enabled: bool,
    /// Push gateway endpoint for emergency notifications
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_notify_timeout_ms() -> u64 {
    2000
}

/// One bearer token entry in [[auth.tokens]]
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub role: String,
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Safe zones seeded into the registry at startup
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    http_bind_address: String,
    http_port: u16,
    status_ttl_secs: u64,
    channel_capacity: usize,
    rate_window_secs: u64,
    notify_enabled: bool,
    notify_url: String,
    notify_timeout_ms: u64,
    auth_tokens: HashMap<String, Actor>,
    metrics_interval_secs: u64,
    seed_zones: Vec<ZoneSpec>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "geoguard".to_string(),
            http_bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            status_ttl_secs: 3600,
            channel_capacity: 4096,
            rate_window_secs: 60,
            notify_enabled: false,
            notify_url: String::new(),
            notify_timeout_ms: 2000,
            auth_tokens: HashMap::new(),
            metrics_interval_secs: 10,
            seed_zones: Vec::new(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine the config file path: an explicit CLI argument wins, then
    /// the CONFIG_FILE environment variable, then the default
    pub fn resolve_config_path(cli: Option<&str>) -> String {
        if let Some(path) = cli {
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

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // Entries with an unknown role are dropped rather than failing startup
        let mut auth_tokens = HashMap::new();
        for entry in toml_config.auth.tokens {
            if let Ok(role) = entry.role.parse::<Role>() {
                auth_tokens.insert(entry.token, Actor { id: SubjectId(entry.subject), role });
            } else {
                eprintln!("Warning: unknown role '{}' for token entry, skipping", entry.role);
            }
        }

        Ok(Self {
            site_id: toml_config.site.id,
            http_bind_address: toml_config.http.bind_address,
            http_port: toml_config.http.port,
            status_ttl_secs: toml_config.monitor.status_ttl_secs,
            channel_capacity: toml_config.monitor.channel_capacity,
            rate_window_secs: toml_config.rate_limit.window_secs,
            notify_enabled: toml_config.notify.enabled,
            notify_url: toml_config.notify.url,
            notify_timeout_ms: toml_config.notify.timeout_ms,
            auth_tokens,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            seed_zones: toml_config.zones,
            config_file: path.display().to_string(),
        })
    }

    /// Load from a known path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn http_bind_address(&self) -> &str {
        &self.http_bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn status_ttl_secs(&self) -> u64 {
        self.status_ttl_secs
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn rate_window_secs(&self) -> u64 {
        self.rate_window_secs
    }

    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled
    }

    pub fn notify_url(&self) -> &str {
        &self.notify_url
    }

    pub fn notify_timeout_ms(&self) -> u64 {
        self.notify_timeout_ms
    }

    pub fn auth_tokens(&self) -> &HashMap<String, Actor> {
        &self.auth_tokens
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn seed_zones(&self) -> &[ZoneSpec] {
        &self.seed_zones
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the rate window
    #[cfg(test)]
    pub fn with_rate_window_secs(mut self, secs: u64) -> Self {
        self.rate_window_secs = secs;
        self
    }
}
