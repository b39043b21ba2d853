//! Configuration structures for datastream.
//!
//! This module provides configuration types for every component:
//!
//! - [`TrustPolicy`] - which `data_source` values are accepted
//! - [`WatchConfig`] - change detection (debounce window, polling)
//! - [`ServerConfig`] - bind address, served root, endpoint path
//! - [`RetryConfig`] - client reconnect backoff
//! - [`Config`] - root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a config file only needs the fields it changes.

use std::net::SocketAddr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::source::TrustPolicy;

/// Configuration for the source watcher.
///
/// # Examples
///
/// ```
/// use ds_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.debounce_ms, 100);
/// assert!(config.poll_interval_ms.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window in milliseconds.
    ///
    /// Writes to a source within this window collapse into one snapshot.
    pub debounce_ms: u64,

    /// Poll interval in milliseconds.
    ///
    /// `None` uses native OS notifications. `Some` switches to a polling
    /// backend, which also works on network mounts and in containers where
    /// notifications are unreliable.
    pub poll_interval_ms: Option<u64>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            poll_interval_ms: None,
        }
    }
}

impl WatchConfig {
    /// Returns the debounce window.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the poll interval, if polling is enabled.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

/// Configuration for the stream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: SocketAddr,

    /// Directory that `data_source` values are resolved against.
    pub root: Utf8PathBuf,

    /// Path of the stream endpoint.
    pub endpoint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5173)),
            root: Utf8PathBuf::from("."),
            endpoint: "/api/data-stream".to_owned(),
        }
    }
}

/// Reconnect policy for stream subscribers.
///
/// The delay before reconnect attempt `n` (zero-based) is
/// `base_interval_ms * 2^n`; after `max_attempts` failed reconnects the
/// subscriber gives up.
///
/// # Examples
///
/// ```
/// use ds_core::RetryConfig;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.base_interval_ms, 5000);
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first reconnect, in milliseconds.
    pub base_interval_ms: u64,

    /// Maximum number of consecutive reconnect attempts.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 5000,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    /// Returns the base interval.
    #[must_use]
    pub const fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
}

/// Root configuration for datastream.
///
/// # Examples
///
/// ```
/// use ds_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"retry": {"max_attempts": 2}}"#).unwrap();
/// assert_eq!(config.retry.max_attempts, 2);
/// assert_eq!(config.watch.debounce_ms, 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Accepted data sources.
    pub trust: TrustPolicy,

    /// Source watcher configuration.
    pub watch: WatchConfig,

    /// Server configuration.
    pub server: ServerConfig,

    /// Client reconnect configuration.
    pub retry: RetryConfig,
}

impl Config {
    /// Loads a JSON configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first bad option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trust.trusted_dir.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid_option(
                "trust.trusted_dir",
                "must name a directory",
            ));
        }
        if !self.trust.extension.starts_with('.') || self.trust.extension.len() < 2 {
            return Err(ConfigError::invalid_option(
                "trust.extension",
                "must start with '.' followed by a name",
            ));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::invalid_option(
                "watch.debounce_ms",
                "must be greater than zero",
            ));
        }
        if self.watch.poll_interval_ms == Some(0) {
            return Err(ConfigError::invalid_option(
                "watch.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if !self.server.endpoint.starts_with('/') {
            return Err(ConfigError::invalid_option(
                "server.endpoint",
                "must start with '/'",
            ));
        }
        if self.retry.base_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "retry.base_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
