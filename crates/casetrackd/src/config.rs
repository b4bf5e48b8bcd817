//! Configuration for casetrackd.
//!
//! Loads settings from a TOML file (path in `CASETRACKD_CONFIG`, falling
//! back to /etc/casetrack/config.toml) or uses defaults, then applies
//! environment overrides for the handful of settings deployments set
//! per-instance.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CASETRACKD_CONFIG";

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/casetrack/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origins the dashboard may call us from.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file path.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "/var/lib/casetrack/casetrack.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Webhook endpoint of the automation platform.
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,

    /// Template for the human-facing run tracking URL. `{run_id}` is
    /// replaced with the identifier the platform returns.
    #[serde(default = "default_run_url_template")]
    pub run_url_template: String,

    /// Outbound call timeout in seconds. The webhook can be slow; intake
    /// waits at most this long before giving up on the forward.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_url() -> String {
    "https://workflows.platform.happyrobot.ai/hooks/8w6vk54dcqbg".to_string()
}

fn default_run_url_template() -> String {
    "https://v2.platform.happyrobot.ai/naturgy-v2/workflow/8w6vk54dcqbg/runs?run_id={run_id}"
        .to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            webhook_url: default_webhook_url(),
            run_url_template: default_run_url_template(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret the dashboard presents. Unset means auth endpoints
    /// answer with a server-configuration error.
    #[serde(default)]
    pub dashboard_password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration: file if present, defaults otherwise, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(Path::new(&path));
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            self.server.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Ok(origins) = std::env::var("CORS_ORIGIN") {
            self.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            self.store.path = path;
        }
        if let Ok(url) = std::env::var("AUTOMATION_WEBHOOK_URL") {
            self.gateway.webhook_url = url;
        }
        if let Ok(password) = std::env::var("DASHBOARD_PASSWORD") {
            self.auth.dashboard_password = Some(password);
        }
    }
}
