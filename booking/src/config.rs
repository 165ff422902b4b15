//! Booking workflow configuration.
//!
//! Values are provided by the host application, or read from `AZUREA_*`
//! environment variables with [`FlowConfig::from_env`].

use crate::constants::{DEFAULT_PENDING_DRAFT_TTL_SECS, DEFAULT_RESEND_COOLDOWN_SECS, MAX_DAILY_BOOKINGS};
use chrono::Duration;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("Failed to parse {var}: {value:?}")]
    Parse {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Hotel server connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL of the hotel server (no trailing slash).
    ///
    /// Default: `http://localhost:8000`
    pub base_url: String,

    /// Per-request timeout.
    ///
    /// Default: 30 seconds
    pub request_timeout: std::time::Duration,
}

impl ApiConfig {
    /// Create API configuration for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: std::time::Duration::from_secs(30),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Join `path` onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}

/// Workflow policy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Server connection.
    pub api: ApiConfig,

    /// Time before an OTP may be re-sent.
    ///
    /// Default: 120 seconds
    pub resend_cooldown: Duration,

    /// Bookings a guest may make per day.
    ///
    /// Default: 3
    pub max_daily_bookings: u32,

    /// How long a persisted draft stays resumable across the registration reload.
    ///
    /// Default: 30 minutes
    pub pending_draft_ttl: Duration,

    /// File backing durable storage.
    ///
    /// Default: `azurea-storage.json` in the working directory
    pub storage_path: PathBuf,
}

impl FlowConfig {
    /// Set the API configuration.
    #[must_use]
    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// Set the resend cooldown.
    #[must_use]
    pub const fn with_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    /// Set the daily booking maximum.
    #[must_use]
    pub const fn with_max_daily_bookings(mut self, max: u32) -> Self {
        self.max_daily_bookings = max;
        self
    }

    /// Set the pending draft time-to-live.
    #[must_use]
    pub const fn with_pending_draft_ttl(mut self, ttl: Duration) -> Self {
        self.pending_draft_ttl = ttl;
        self
    }

    /// Set the durable storage file.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Load configuration from `AZUREA_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("AZUREA_API_URL") {
            config.api = ApiConfig::new(url).with_request_timeout(config.api.request_timeout);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AZUREA_REQUEST_TIMEOUT_SECS")? {
            config.api.request_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(cooldown) = seconds_var(&lookup, "AZUREA_RESEND_COOLDOWN_SECS")? {
            config.resend_cooldown = cooldown;
        }
        if let Some(max) = parse_var::<u32, _>(&lookup, "AZUREA_MAX_DAILY_BOOKINGS")? {
            config.max_daily_bookings = max;
        }
        if let Some(ttl) = seconds_var(&lookup, "AZUREA_PENDING_DRAFT_TTL_SECS")? {
            config.pending_draft_ttl = ttl;
        }
        if let Some(path) = lookup("AZUREA_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for non-positive durations or a zero maximum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resend_cooldown <= Duration::zero() {
            return Err(ConfigError::Validation("resend cooldown must be positive".into()));
        }
        if self.pending_draft_ttl <= Duration::zero() {
            return Err(ConfigError::Validation("pending draft TTL must be positive".into()));
        }
        if self.max_daily_bookings == 0 {
            return Err(ConfigError::Validation("max daily bookings must be at least 1".into()));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "API URL must be http(s): {}",
                self.api.base_url
            )));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Parse { var, value })
        })
        .transpose()
}

fn seconds_var<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    parse_var::<i64, _>(lookup, var)?
        .map(|secs| {
            Duration::try_seconds(secs)
                .ok_or_else(|| ConfigError::Validation(format!("{var} is out of range: {secs}")))
        })
        .transpose()
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            resend_cooldown: Duration::seconds(DEFAULT_RESEND_COOLDOWN_SECS),
            max_daily_bookings: MAX_DAILY_BOOKINGS,
            pending_draft_ttl: Duration::seconds(DEFAULT_PENDING_DRAFT_TTL_SECS),
            storage_path: PathBuf::from("azurea-storage.json"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> = vars.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.resend_cooldown, Duration::seconds(120));
        assert_eq!(config.max_daily_bookings, 3);
        assert_eq!(config.pending_draft_ttl, Duration::minutes(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = FlowConfig::from_lookup(lookup(&[
            ("AZUREA_API_URL", "https://hotel.example.com/"),
            ("AZUREA_RESEND_COOLDOWN_SECS", "60"),
            ("AZUREA_MAX_DAILY_BOOKINGS", "5"),
            ("AZUREA_REQUEST_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();

        assert_eq!(config.api.url("/api/auth/user"), "https://hotel.example.com/api/auth/user");
        assert_eq!(config.api.request_timeout, std::time::Duration::from_secs(10));
        assert_eq!(config.resend_cooldown, Duration::seconds(60));
        assert_eq!(config.max_daily_bookings, 5);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let error = FlowConfig::from_lookup(lookup(&[("AZUREA_MAX_DAILY_BOOKINGS", "three")])).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { var: "AZUREA_MAX_DAILY_BOOKINGS", .. }));

        let error = FlowConfig::from_lookup(lookup(&[("AZUREA_MAX_DAILY_BOOKINGS", "0")])).unwrap_err();
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_lookup_rejects_out_of_range_durations() {
        for var in ["AZUREA_RESEND_COOLDOWN_SECS", "AZUREA_PENDING_DRAFT_TTL_SECS"] {
            let error = FlowConfig::from_lookup(lookup(&[(var, "9223372036854775807")])).unwrap_err();
            assert!(matches!(error, ConfigError::Validation(ref message) if message.contains(var)));
        }
    }
}
