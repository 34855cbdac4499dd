//! Session configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::RetryPolicy;
use crate::errors::ConfigError;

fn default_base_url() -> String {
    "https://api.zoom.us/v2".to_string()
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_verify_ssl() -> bool {
    true
}

fn default_page_size() -> u32 {
    2000
}

/// Connection settings for one API account.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL every endpoint path is joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// OAuth bearer token.
    #[serde(default)]
    pub access_token: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Whether TLS certificates are verified.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// `page_size` sent with every list request.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Rate-limit retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: String::new(),
            timeout_seconds: default_timeout_seconds(),
            verify_ssl: default_verify_ssl(),
            page_size: default_page_size(),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("verify_ssl", &self.verify_ssl)
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl SessionConfig {
    /// Creates a config for the given account.
    #[must_use]
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets TLS verification.
    #[must_use]
    pub fn with_verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// Sets the list page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Request timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_timeout_seconds()))
    }

    /// Loads the config from `BULKOPS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or a number does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the config through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or a number does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = lookup("BULKOPS_ACCESS_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("BULKOPS_ACCESS_TOKEN".to_string()))?;

        let mut config = Self {
            access_token,
            ..Self::default()
        };

        if let Some(base_url) = lookup("BULKOPS_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(value) = lookup("BULKOPS_TIMEOUT_SECONDS") {
            config.timeout_seconds = parse_value("BULKOPS_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = lookup("BULKOPS_PAGE_SIZE") {
            config.page_size = parse_value("BULKOPS_PAGE_SIZE", &value)?;
        }
        if let Some(value) = lookup("BULKOPS_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_value("BULKOPS_MAX_ATTEMPTS", &value)?;
        }

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, value))
}
