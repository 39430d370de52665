//! Application configuration management.
//!
//! Configuration is read from `~/.config/authrelay/config.json` (missing file
//! means defaults), then overridden by `AUTHRELAY_*` environment variables.
//! Nothing session-related is ever written here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::gateway::{
    DEFAULT_API_URL, DEFAULT_CURRENT_USER_PATH, DEFAULT_REFRESH_PATH, DEFAULT_REFRESH_TIMEOUT_SECS,
};
use crate::api::GatewayConfig;
use crate::transport::http::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Application name used for the config directory path
const APP_NAME: &str = "authrelay";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the user is sent when the session can't be renewed
const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub refresh_path: String,
    pub current_user_path: String,
    pub login_path: String,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    /// `name=value` cookie to seed the session jar with
    pub session_cookie: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            current_user_path: DEFAULT_CURRENT_USER_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            session_cookie: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `AUTHRELAY_*` overrides looked up through `lookup`.
    ///
    /// Unparseable timeouts are ignored rather than failing startup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AUTHRELAY_API_URL") {
            self.api_url = url;
        }
        if let Some(path) = lookup("AUTHRELAY_REFRESH_PATH") {
            self.refresh_path = path;
        }
        if let Some(path) = lookup("AUTHRELAY_LOGIN_PATH") {
            self.login_path = path;
        }
        if let Some(cookie) = lookup("AUTHRELAY_SESSION_COOKIE") {
            self.session_cookie = Some(cookie);
        }
        if let Some(secs) = lookup("AUTHRELAY_REFRESH_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.refresh_timeout_secs = secs;
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), self.login_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            api_url: self.api_url.clone(),
            refresh_path: self.refresh_path.clone(),
            current_user_path: self.current_user_path.clone(),
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
        }
    }
}
