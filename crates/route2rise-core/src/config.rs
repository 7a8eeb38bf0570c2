//! Application configuration management.
//!
//! This module handles loading and saving the client configuration:
//! backend address, auth endpoint paths, timeouts, and which credential
//! store to use.
//!
//! Configuration is stored at `~/.config/route2rise/config.json`. The
//! backend address can be overridden with `ROUTE2RISE_API_BASE_URL`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "route2rise";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Credential file name in cache directory
const CREDENTIAL_FILE: &str = "credential.json";

/// Environment variable overriding the backend address
pub const API_BASE_URL_ENV: &str = "ROUTE2RISE_API_BASE_URL";

/// Local development backend
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

const DEFAULT_VERIFY_PATH: &str = "/auth/verify";
const DEFAULT_LOGIN_PATH: &str = "/auth/login";
const DEFAULT_HEALTH_PATH: &str = "/health";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How often the credential store is polled for changes made elsewhere.
const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

/// Where the bearer credential is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub verify_path: String,
    pub login_path: String,
    pub health_path: String,
    pub request_timeout_secs: u64,
    pub watch_interval_ms: u64,
    pub store: StoreKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            verify_path: DEFAULT_VERIFY_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
            store: StoreKind::default(),
        }
    }
}

impl Config {
    /// Load the config file (defaults when missing), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        Ok(Self::load_file()?.with_env_overrides())
    }

    /// The config file alone, without environment overrides. This is what
    /// [`Config::save`] should be given back.
    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        debug!(path = %path.display(), "Config loaded");
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    /// Apply `ROUTE2RISE_API_BASE_URL` when it is set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            debug!("Backend address taken from environment");
            self.api_base_url = Some(url);
        }
        self
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Path of the credential file used by [`StoreKind::File`].
    pub fn credential_path(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(CREDENTIAL_FILE))
    }

    /// Backend address, trimmed, or the local development default.
    pub fn api_base_url(&self) -> String {
        resolve_base_url(self.api_base_url.as_deref())
    }
}

/// Trim a configured backend address, falling back to the default when the
/// value is missing or blank. A trailing slash is dropped so paths join
/// without doubling it.
pub fn resolve_base_url(configured: Option<&str>) -> String {
    let trimmed = configured.map(str::trim).unwrap_or_default();
    let url = if trimmed.is_empty() {
        DEFAULT_API_BASE_URL
    } else {
        trimmed
    };
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base_url_defaults() {
        assert_eq!(resolve_base_url(None), DEFAULT_API_BASE_URL);
        assert_eq!(resolve_base_url(Some("")), DEFAULT_API_BASE_URL);
        assert_eq!(resolve_base_url(Some("   \n")), DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_resolve_base_url_trims() {
        assert_eq!(
            resolve_base_url(Some("  https://api.route2rise.in \n")),
            "https://api.route2rise.in"
        );
        assert_eq!(
            resolve_base_url(Some("https://api.route2rise.in/")),
            "https://api.route2rise.in"
        );
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "http://10.0.0.5:8000", "store": "memory"}"#)
                .expect("partial config should parse");
        assert_eq!(config.api_base_url.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.verify_path, DEFAULT_VERIFY_PATH);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let from_file = Config {
            api_base_url: Some("http://file.example:8000".to_string()),
            ..Config::default()
        };
        from_file.save_to(&path).unwrap();

        // Only this test touches the variable.
        std::env::remove_var(API_BASE_URL_ENV);
        let config = Config::load_from(&path).unwrap().with_env_overrides();
        assert_eq!(config.api_base_url(), "http://file.example:8000");

        std::env::set_var(API_BASE_URL_ENV, "  https://api.route2rise.in/ \n");
        let config = Config::load_from(&path).unwrap().with_env_overrides();
        assert_eq!(config.api_base_url(), "https://api.route2rise.in");

        std::env::set_var(API_BASE_URL_ENV, "   ");
        let config = Config::load_from(&path).unwrap().with_env_overrides();
        assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);

        std::env::remove_var(API_BASE_URL_ENV);
        let missing = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(missing.api_base_url(), DEFAULT_API_BASE_URL);
    }
}
