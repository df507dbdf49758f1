//! Configuration for the RSVP ledger service.

use crate::roster::RosterPolicy;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Attendee roster configuration
    #[serde(default)]
    pub roster: RosterConfig,

    /// Ledger storage configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Registration retry configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    /// Path to the roster file (one digest per line)
    #[serde(default = "default_roster_path")]
    pub path: PathBuf,

    /// When the roster file is re-read. With `startup` the binary reloads it
    /// on SIGHUP.
    #[serde(default)]
    pub policy: RosterPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding encrypted ledger files
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Enable persistence (if false, ledgers are in-memory only)
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Passphrase the ledger encryption key is derived from
    #[serde(default)]
    pub passphrase: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Attempts per registration when the store reports a conflict
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (multiplied by the attempt number)
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Global requests per minute
    #[serde(default = "default_global_rpm")]
    pub global_per_minute: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

// Default implementations
impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: default_roster_path(),
            policy: RosterPolicy::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            persist: true,
            passphrase: None,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_minute: default_global_rpm(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// Default value functions
fn default_roster_path() -> PathBuf {
    PathBuf::from("/data/attendees.txt")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/data/ledgers")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(25)
}

fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_global_rpm() -> u32 {
    120
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at request time.
    pub fn validate(&self) -> Result<()> {
        if self.store.persist && self.store.passphrase.is_none() {
            anyhow::bail!("STORE__PASSPHRASE is required when STORE__PERSIST is enabled");
        }
        if self.ledger.max_attempts == 0 {
            anyhow::bail!("LEDGER__MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}
