//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;
use super::validation::{ValidationError, validate};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// IRC server and bridge identity.
    pub irc: IrcConfig,
    /// Relay behaviour.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Delays and timeouts.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Prometheus metrics HTTP port. Unset or 0 disables the endpoint.
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// IRC server and bridge identity.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Server hostname (e.g., "irc.libera.chat").
    pub host: String,
    /// Server port (default: 6667).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect with TLS.
    #[serde(default)]
    pub tls: bool,
    /// Nick of the observer connection (default: "DC-Bridge").
    #[serde(default = "default_nick")]
    pub nick: String,
}

/// Relay behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Upload endpoint for attachments and long messages. Empty disables uploads.
    #[serde(default = "default_uploads_url")]
    pub uploads_url: String,
    /// Longest text sent in one PRIVMSG (default: 450 characters).
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Longest quoted excerpt in a reply prefix (default: 40 characters).
    #[serde(default = "default_quote_len")]
    pub quote_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            uploads_url: default_uploads_url(),
            max_message_len: default_max_message_len(),
            quote_len: default_quote_len(),
        }
    }
}

impl BridgeConfig {
    /// The upload endpoint, if uploads are enabled.
    pub fn uploads_endpoint(&self) -> Option<&str> {
        let url = self.uploads_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Delays and timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Wait before the first IRC connection, to avoid server throttling (default: 10).
    #[serde(default = "default_startup_delay")]
    pub startup_delay: u64,
    /// Fixed delay between reconnect attempts (default: 15).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
    /// Delay before restarting a crashed observer worker (default: 5).
    #[serde(default = "default_restart_delay")]
    pub restart_delay: u64,
    /// Spacing between JOINs on one connection (default: 2).
    #[serde(default = "default_join_delay")]
    pub join_delay: u64,
    /// Spacing between initial puppet connects at startup (default: 2).
    #[serde(default = "default_puppet_stagger")]
    pub puppet_stagger: u64,
    /// How long a topic query waits for the server (default: 5).
    #[serde(default = "default_topic_timeout")]
    pub topic_timeout: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_delay: default_startup_delay(),
            reconnect_delay: default_reconnect_delay(),
            restart_delay: default_restart_delay(),
            join_delay: default_join_delay(),
            puppet_stagger: default_puppet_stagger(),
            topic_timeout: default_topic_timeout(),
        }
    }
}

impl TimingConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay)
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_secs(self.join_delay)
    }

    pub fn puppet_stagger(&self) -> Duration {
        Duration::from_secs(self.puppet_stagger)
    }

    pub fn topic_timeout(&self) -> Duration {
        Duration::from_secs(self.topic_timeout)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (":memory:" for a throwaway database).
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}
