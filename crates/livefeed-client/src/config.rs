//! Client configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file
//! - Environment variables (`LIVEFEED_WS_*`)
//! - Command line arguments (binary only)

use anyhow::{bail, Context, Result};
use livefeed_core::{Backoff, ReconnectPolicy};
use livefeed_protocol::codec::MAX_FRAME_SIZE;
use livefeed_transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the endpoint host.
pub const ENV_HOST: &str = "LIVEFEED_WS_HOST";
/// Environment variable overriding the endpoint port.
pub const ENV_PORT: &str = "LIVEFEED_WS_PORT";
/// Environment variable selecting `wss`.
pub const ENV_SECURE: &str = "LIVEFEED_WS_SECURE";

/// Channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Where the feed is served.
    #[serde(default)]
    pub endpoint: Endpoint,

    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Delay growth between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Reconnect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before each attempt in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Delay growth.
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Ceiling for exponential growth in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Open timeout in milliseconds. A timed-out open counts as a failure.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Inbound frames above this size are dropped.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus listener.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_max_attempts() -> u32 {
    livefeed_core::reconnect::DEFAULT_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_message_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: BackoffKind::Fixed,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl ReconnectConfig {
    /// Build the policy these settings describe.
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
        };
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.delay_ms),
            backoff,
        }
    }
}

impl TransportConfig {
    /// Open timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ChannelConfig {
    /// Load configuration from the first default path that exists, then
    /// apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override has an invalid value.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "livefeed.toml",
            "/etc/livefeed/livefeed.toml",
            "~/.config/livefeed/livefeed.toml",
        ];

        let mut config = Self::default();
        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                config = Self::from_file(expanded.as_ref())?;
                break;
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ChannelConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Apply `LIVEFEED_WS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            self.endpoint.host = host;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.is_empty()) {
            self.endpoint.port = port
                .parse()
                .with_context(|| format!("{ENV_PORT} is not a valid port: {port:?}"))?;
        }
        if let Some(secure) = lookup(ENV_SECURE).filter(|s| !s.is_empty()) {
            self.endpoint.secure = parse_flag(&secure)
                .with_context(|| format!("{ENV_SECURE} is not a boolean: {secure:?}"))?;
        }
        self.validate()
    }

    /// Check values that would make the channel unusable.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        if self.transport.max_message_size == 0 {
            bail!("transport.max_message_size must be positive");
        }
        if self.transport.connect_timeout_ms == 0 {
            bail!("transport.connect_timeout_ms must be positive");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected true or false"),
    }
}
