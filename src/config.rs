//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const API_URL_ENV: &str = "PORTAL_API_URL";
pub const SESSION_FILE_ENV: &str = "PORTAL_SESSION_FILE";
pub const REQUEST_TIMEOUT_ENV: &str = "PORTAL_REQUEST_TIMEOUT_SECS";
pub const CONNECT_TIMEOUT_ENV: &str = "PORTAL_CONNECT_TIMEOUT_SECS";

const SESSION_DIR_NAME: &str = "portal";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("no config directory available; set {SESSION_FILE_ENV}")]
    MissingConfigDir,
}

/// Optional transport timeouts. `None` keeps the HTTP client's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request: Option<Duration>,
    pub connect: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    /// Base URL every API path is appended to, without a trailing slash.
    pub api_url: String,
    /// File backing the persisted token/profile pair.
    pub session_file: PathBuf,
    pub timeouts: HttpTimeouts,
}

impl PortalConfig {
    /// Build config from environment variables.
    ///
    /// - `PORTAL_API_URL`: default `http://localhost:5000/api`
    /// - `PORTAL_SESSION_FILE`: default `<config dir>/portal/session.json`
    /// - `PORTAL_REQUEST_TIMEOUT_SECS`, `PORTAL_CONNECT_TIMEOUT_SECS`: unset by default
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is malformed or no session file
    /// location can be determined.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let session_file = match std::env::var(SESSION_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => default_session_file()?,
        };
        let timeouts = HttpTimeouts {
            request: env_secs(REQUEST_TIMEOUT_ENV),
            connect: env_secs(CONNECT_TIMEOUT_ENV),
        };
        Self::new(&api_url, session_file, timeouts)
    }

    /// Build config from explicit values, normalizing the API URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiUrl`] unless `api_url` is an absolute
    /// `http` or `https` URL.
    pub fn new(api_url: &str, session_file: PathBuf, timeouts: HttpTimeouts) -> Result<Self, ConfigError> {
        let api_url = normalize_api_url(api_url)?;
        Ok(Self { api_url, session_file, timeouts })
    }
}

/// Default location of the session file inside the user's config directory.
///
/// # Errors
///
/// Returns [`ConfigError::MissingConfigDir`] when the platform has no config directory.
pub fn default_session_file() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(SESSION_DIR_NAME).join(SESSION_FILE_NAME))
        .ok_or(ConfigError::MissingConfigDir)
}

fn normalize_api_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidApiUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidApiUrl {
            url: raw.to_owned(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.to_owned())
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
