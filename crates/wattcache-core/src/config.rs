//! Application configuration management.
//!
//! Configuration is stored at `~/.config/wattcache/config.json`. Every
//! section falls back to its defaults, so a partial file only overrides the
//! keys it names. The same values drive construction of the cache, session
//! store, rate limiter, authenticator and client; nothing is global.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::api::ApiClient;
use crate::auth::authenticator::{parse_origin, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use crate::auth::login::default_selectors;
use crate::auth::session::SESSION_EXPIRY_SECS;
use crate::auth::{AuthOptions, Authenticator, Credential, SessionProvider, SessionStore};
use crate::cache::manager::{DEFAULT_CLEANUP_TTL_SECS, DEFAULT_TTL_SECS};
use crate::cache::CacheManager;
use crate::rate_limit::{RateLimiter, DEFAULT_MIN_INTERVAL_SECS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "wattcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Turns on the file log layer
pub const LOGGING_ENV: &str = "ZWIFT_API_CLIENT_ENABLE_ROOT_LOGGING";

/// Overrides `api.base_url`
pub const BASE_URL_ENV: &str = "ZWIFTPOWER_BASE_URL";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Minimum spacing between requests
    pub rate_limit_secs: f64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: REQUEST_TIMEOUT_SECS,
            rate_limit_secs: DEFAULT_MIN_INTERVAL_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: Option<PathBuf>,
    pub default_ttl_secs: u64,
    pub cleanup_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            default_ttl_secs: DEFAULT_TTL_SECS,
            cleanup_ttl_secs: DEFAULT_CLEANUP_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_expiry_secs: i64,
    pub probe_timeout_secs: u64,
    pub oauth_selectors: Vec<String>,
    pub session_directory: Option<PathBuf>,
    /// Email used for the last successful login, to look up the keychain
    pub last_identity: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiry_secs: SESSION_EXPIRY_SECS,
            probe_timeout_secs: 10,
            oauth_selectors: default_selectors(),
            session_directory: None,
            last_identity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a rolling log file in addition to stderr
    pub enabled: bool,
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// `1`, `true` or `yes`, in any case
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Problems with the current values, one message each. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = parse_origin(&self.api.base_url) {
            errors.push(format!("api.base_url is not a valid URL: {}", e));
        }
        if self.api.timeout_secs == 0 {
            errors.push("api.timeout_secs must be positive".to_string());
        }
        if !self.api.rate_limit_secs.is_finite() || self.api.rate_limit_secs < 0.0 {
            errors.push("api.rate_limit_secs must be zero or positive".to_string());
        }
        if self.cache.default_ttl_secs == 0 {
            errors.push("cache.default_ttl_secs must be positive".to_string());
        }
        if self.cache.cleanup_ttl_secs == 0 {
            errors.push("cache.cleanup_ttl_secs must be positive".to_string());
        }
        if self.auth.session_expiry_secs <= 0 {
            errors.push("auth.session_expiry_secs must be positive".to_string());
        } else if chrono::Duration::try_seconds(self.auth.session_expiry_secs).is_none() {
            errors.push("auth.session_expiry_secs is too large".to_string());
        }
        if self.auth.probe_timeout_secs == 0 {
            errors.push("auth.probe_timeout_secs must be positive".to_string());
        }
        if self.auth.oauth_selectors.is_empty() {
            errors.push("auth.oauth_selectors must not be empty".to_string());
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            ));
        }

        errors
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(value) = var(LOGGING_ENV) {
            self.logging.enabled = is_truthy(&value);
        }
        if let Some(url) = var(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
    }

    fn data_root() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        match self.cache.directory {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(Self::data_root()?.join("responses")),
        }
    }

    pub fn session_dir(&self) -> Result<PathBuf> {
        match self.auth.session_directory {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(Self::data_root()?.join("sessions")),
        }
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        match self.logging.directory {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(Self::data_root()?.join("logs")),
        }
    }

    pub fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            base_url: self.api.base_url.clone(),
            user_agent: self.api.user_agent.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            probe_timeout: Duration::from_secs(self.auth.probe_timeout_secs),
            session_expiry: self.session_expiry(),
            oauth_selectors: self.auth.oauth_selectors.clone(),
            ..AuthOptions::default()
        }
    }

    /// Session lifetime, falling back to six hours when out of range
    pub fn session_expiry(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.auth.session_expiry_secs)
            .filter(|expiry| *expiry > chrono::Duration::zero())
            .unwrap_or_else(|| chrono::Duration::seconds(SESSION_EXPIRY_SECS))
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        let interval = Duration::try_from_secs_f64(self.api.rate_limit_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_MIN_INTERVAL_SECS));
        RateLimiter::new(interval)
    }

    pub fn cache_manager(&self) -> Result<CacheManager> {
        CacheManager::new(self.cache_dir()?)
    }

    pub fn authenticator(&self, credential: Option<Credential>) -> Result<Authenticator> {
        let store = SessionStore::new(self.session_dir()?);
        Ok(Authenticator::new(credential, store, self.auth_options()))
    }

    pub fn api_client(&self, sessions: Arc<dyn SessionProvider>) -> Result<ApiClient> {
        Ok(ApiClient::new(
            &self.api.base_url,
            sessions,
            self.cache_manager()?,
            self.rate_limiter(),
        )?
        .with_timeout(Duration::from_secs(self.api.timeout_secs))
        .with_caching(self.cache.enabled))
    }
}
