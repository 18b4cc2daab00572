//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HOMEBOX_URL=homebox.lan:7745                                       │
//! │     HOMEBOX_TOKEN=...                                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/homebox-sync/homebox.toml (Linux)                        │
//! │     ~/Library/Application Support/io.homebox.sync/homebox.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     30 min polling, 30 s cycle timeout, hourly token refresh           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # homebox.toml
//! [server]
//! url = "homebox.lan:7745"
//! use_https = false
//!
//! [auth]
//! method = "login"   # token | login
//! username = "me@example.com"
//! password = "hunter2"
//!
//! [sync]
//! update_interval_secs = 1800
//! cycle_timeout_secs = 30
//! token_refresh_interval_secs = 3600
//! ```

use std::path::PathBuf;
use std::time::Duration;

use homebox_core::API_PREFIX;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::Credentials;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Auth Method
// =============================================================================

/// How the agent authenticates against Homebox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// A long-lived API token pasted by the user. Cannot be renewed by login.
    #[default]
    Token,

    /// Username and password; tokens are obtained and renewed by login.
    Login,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Token => write!(f, "token"),
            AuthMethod::Login => write!(f, "login"),
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "token" | "api_token" => Ok(AuthMethod::Token),
            "login" | "password" => Ok(AuthMethod::Login),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown auth method: '{}'. Valid options: token, login",
                other
            ))),
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Where the Homebox server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host with optional port and path, or a full `http(s)://` URL.
    #[serde(default)]
    pub url: String,

    /// Scheme to use when `url` has none.
    #[serde(default = "default_true")]
    pub use_https: bool,

    /// Per-request timeout applied by the HTTP client (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            url: String::new(),
            use_https: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Auth Configuration
// =============================================================================

/// Credentials as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,

    /// API token for `method = "token"`. May be given with or without a
    /// `Bearer ` prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Login email for `method = "login"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Timing of the background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between reconciliation cycles (seconds).
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Hard deadline for one reconciliation cycle (seconds).
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Interval between proactive token refreshes (seconds).
    #[serde(default = "default_token_refresh_interval")]
    pub token_refresh_interval_secs: u64,
}

fn default_update_interval() -> u64 {
    30 * 60
}
fn default_cycle_timeout() -> u64 {
    30
}
fn default_token_refresh_interval() -> u64 {
    60 * 60
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            update_interval_secs: default_update_interval(),
            cycle_timeout_secs: default_cycle_timeout(),
            token_refresh_interval_secs: default_token_refresh_interval(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeboxConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl HomeboxConfig {
    /// Creates a config for a server and static token, everything else
    /// defaulted.
    pub fn with_token(url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.server.url = url.into();
        config.auth.method = AuthMethod::Token;
        config.auth.token = Some(token.into());
        config
    }

    /// Creates a config for a server and login credentials.
    pub fn with_login(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut config = Self::default();
        config.server.url = url.into();
        config.auth.method = AuthMethod::Login;
        config.auth.username = Some(username.into());
        config.auth.password = Some(password.into());
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (homebox.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading Homebox config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document without applying overrides or validation.
    pub fn from_toml(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.server.url.trim().is_empty() {
            return Err(SyncError::InvalidConfig("server.url is required".into()));
        }
        self.api_base_url()?;

        match self.auth.method {
            AuthMethod::Token => {
                if is_blank(&self.auth.token) {
                    return Err(SyncError::InvalidConfig(
                        "auth.token is required when auth.method = \"token\"".into(),
                    ));
                }
            }
            AuthMethod::Login => {
                if is_blank(&self.auth.username) || is_blank(&self.auth.password) {
                    return Err(SyncError::InvalidConfig(
                        "auth.username and auth.password are required when auth.method = \"login\"".into(),
                    ));
                }
            }
        }

        if self.sync.update_interval_secs == 0
            || self.sync.cycle_timeout_secs == 0
            || self.sync.token_refresh_interval_secs == 0
        {
            return Err(SyncError::InvalidConfig(
                "sync intervals must be greater than 0".into(),
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HOMEBOX_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.server.url = url;
        }

        if let Some(flag) = lookup("HOMEBOX_USE_HTTPS") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.server.use_https = true,
                "0" | "false" | "no" => self.server.use_https = false,
                _ => warn!(value = %flag, "Ignoring unrecognized HOMEBOX_USE_HTTPS"),
            }
        }

        if let Some(method) = lookup("HOMEBOX_AUTH_METHOD") {
            match method.parse() {
                Ok(parsed) => self.auth.method = parsed,
                Err(e) => warn!(error = %e, "Ignoring HOMEBOX_AUTH_METHOD"),
            }
        }

        if let Some(token) = lookup("HOMEBOX_TOKEN") {
            self.auth.token = Some(token);
        }

        if let Some(username) = lookup("HOMEBOX_USERNAME") {
            self.auth.username = Some(username);
        }

        if let Some(password) = lookup("HOMEBOX_PASSWORD") {
            self.auth.password = Some(password);
        }

        if let Some(secs) = lookup("HOMEBOX_UPDATE_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                debug!(secs, "Overriding update interval from environment");
                self.sync.update_interval_secs = secs;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "homebox", "sync")
            .map(|dirs| dirs.config_dir().join("homebox.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Base URL of the REST API, e.g. `https://homebox.lan/api/v1`.
    ///
    /// An explicit scheme in `server.url` wins over `use_https`.
    pub fn api_base_url(&self) -> SyncResult<String> {
        let raw = self.server.url.trim().trim_end_matches('/');
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            let scheme = if self.server.use_https { "https" } else { "http" };
            format!("{}://{}", scheme, raw)
        };

        let parsed = Url::parse(&with_scheme)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Server URL must use http or https, got: {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(SyncError::InvalidUrl(format!("Server URL has no host: {}", raw)));
        }

        let base = parsed.as_str().trim_end_matches('/').to_string();
        if base.ends_with(API_PREFIX) {
            Ok(base)
        } else {
            Ok(format!("{}{}", base, API_PREFIX))
        }
    }

    /// The credentials the authenticator starts with.
    pub fn credentials(&self) -> Credentials {
        match self.auth.method {
            AuthMethod::Token => Credentials::Token(self.auth.token.clone().unwrap_or_default()),
            AuthMethod::Login => Credentials::Login {
                username: self.auth.username.clone().unwrap_or_default(),
                password: self.auth.password.clone().unwrap_or_default(),
                token: self.auth.token.clone(),
            },
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.sync.update_interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.cycle_timeout_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.sync.token_refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}
