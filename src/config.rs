//! Client configuration parsed from environment variables.

use std::time::Duration;

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HOUSEHOLD_STALE_SECS: u64 = 600;
pub const DEFAULT_QUERY_RETRY: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeouts: Timeouts,
    /// Staleness window for household-scoped queries.
    pub household_stale_secs: u64,
    /// Retry attempts for retryable query failures.
    pub query_retry: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_owned(),
            timeouts: Timeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            household_stale_secs: DEFAULT_HOUSEHOLD_STALE_SECS,
            query_retry: DEFAULT_QUERY_RETRY,
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `HOMEKEEP_API_URL`: API base URL, default `http://localhost:3000/api`
    /// - `HOMEKEEP_REQUEST_TIMEOUT_SECS`: default 30
    /// - `HOMEKEEP_CONNECT_TIMEOUT_SECS`: default 10
    /// - `HOMEKEEP_HOUSEHOLD_STALE_SECS`: default 600
    /// - `HOMEKEEP_QUERY_RETRY`: default 3
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an `http(s)://` URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("HOMEKEEP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        Ok(Self {
            base_url: normalize_base_url(&base_url)?,
            timeouts: Timeouts {
                request_secs: env_parse("HOMEKEEP_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("HOMEKEEP_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            household_stale_secs: env_parse("HOMEKEEP_HOUSEHOLD_STALE_SECS", DEFAULT_HOUSEHOLD_STALE_SECS),
            query_retry: env_parse("HOMEKEEP_QUERY_RETRY", DEFAULT_QUERY_RETRY),
        })
    }

    /// Replace the base URL, validating it the same way as `from_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an `http(s)://` URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(base_url)?;
        Ok(self)
    }

    #[must_use]
    pub fn household_stale_time(&self) -> Duration {
        Duration::from_secs(self.household_stale_secs)
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"));
    match host {
        Some(rest) if !rest.is_empty() => Ok(trimmed.to_owned()),
        _ => Err(ConfigError::InvalidBaseUrl(raw.to_owned())),
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
