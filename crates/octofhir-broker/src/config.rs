//! Broker configuration.
//!
//! Durations are written in humantime form (`"10s"`, `"12h"`) when loaded
//! from TOML or environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised when validating a [`BrokerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field has a value outside its allowed range.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The outbound HTTP client could not be built.
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Runtime settings shared by discovery and token exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Timeout applied to every outbound provider request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long discovery documents and key sets stay fresh.
    #[serde(with = "humantime_serde")]
    pub discovery_ttl: Duration,

    /// Minimum interval between key-miss refreshes for one issuer.
    #[serde(with = "humantime_serde")]
    pub refresh_cooldown: Duration,

    /// Tolerance applied to `exp` and `nbf` checks.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Maximum accepted size of a provider response body in bytes.
    pub max_response_size: usize,

    /// Accept plain `http://` provider URLs.
    /// Local development only.
    pub allow_http: bool,

    /// Redirect URI sent with `authorization_code` grants when the request
    /// does not carry one.
    pub callback_url: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            discovery_ttl: Duration::from_secs(12 * 3600),
            refresh_cooldown: Duration::from_secs(60),
            clock_skew: Duration::from_secs(60),
            max_response_size: 1024 * 1024,
            allow_http: false,
            callback_url: None,
        }
    }
}

impl BrokerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outbound request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the discovery and key set TTL.
    #[must_use]
    pub fn with_discovery_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_ttl = ttl;
        self
    }

    /// Sets the key-miss refresh cool-down.
    #[must_use]
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Allows plain HTTP provider URLs.
    ///
    /// # Warning
    ///
    /// Only for local development and tests.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Sets the default redirect URI for authorization code exchanges.
    #[must_use]
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Checks that all values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be > 0".to_string(),
            ));
        }
        if self.discovery_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "discovery_ttl must be > 0".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_response_size must be > 0".to_string(),
            ));
        }
        if self.clock_skew > Duration::from_secs(600) {
            return Err(ConfigError::InvalidValue(
                "clock_skew must not exceed 10m".to_string(),
            ));
        }
        if let Some(url) = &self.callback_url
            && url::Url::parse(url).is_err()
        {
            return Err(ConfigError::InvalidValue(format!(
                "callback_url is not a valid URL: {url}"
            )));
        }
        Ok(())
    }
}
