//! Client configuration.
//!
//! Loaded from a TOML file. Every knob except the ledger address has a
//! default; `validate` enforces the polling and retry bounds after parsing.

use std::path::Path;
use std::time::Duration;

use folio_core::{Address, IdError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ReadRetryPolicy;

/// Minimum portfolio poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Maximum portfolio poll interval in seconds.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;

/// Minimum confirmation poll cadence in milliseconds.
pub const MIN_CONFIRMATION_POLL_MS: u64 = 100;

/// Maximum confirmation poll cadence in milliseconds.
pub const MAX_CONFIRMATION_POLL_MS: u64 = 10_000;

/// Maximum read-retry attempt budget.
pub const MAX_READ_RETRY_ATTEMPTS: u32 = 10;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The ledger address is malformed.
    #[error("invalid ledger address: {0}")]
    Address(#[from] IdError),

    /// A field is outside its allowed bounds.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Address of the ledger contract grants are issued to. Required.
    pub ledger_address: String,

    /// Portfolio watcher poll interval in seconds (1..=60).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Confirmation poll cadence in milliseconds (100..=10_000).
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    /// Total attempts for an idempotent read (1..=10).
    #[serde(default = "default_read_retry_attempts")]
    pub read_retry_attempts: u32,

    /// Delay between read-retry attempts in milliseconds.
    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,
}

const fn default_poll_interval_secs() -> u64 {
    3
}

const fn default_confirmation_poll_ms() -> u64 {
    1_000
}

const fn default_read_retry_attempts() -> u32 {
    3
}

const fn default_read_retry_delay_ms() -> u64 {
    250
}

impl ClientConfig {
    /// Builds a configuration with defaults for everything but the address.
    #[must_use]
    pub fn with_ledger_address(ledger_address: impl Into<String>) -> Self {
        Self {
            ledger_address: ledger_address.into(),
            poll_interval_secs: default_poll_interval_secs(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
            read_retry_attempts: default_read_retry_attempts(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
        }
    }

    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a field is out of bounds.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks every field against its bounds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the offending field, or
    /// `ConfigError::Address` for a malformed ledger address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Address::new(self.ledger_address.as_str())?;
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_secs) {
            return Err(ConfigError::Validation(format!(
                "poll_interval_secs must be in {MIN_POLL_INTERVAL_SECS}..={MAX_POLL_INTERVAL_SECS}, got {}",
                self.poll_interval_secs
            )));
        }
        if !(MIN_CONFIRMATION_POLL_MS..=MAX_CONFIRMATION_POLL_MS)
            .contains(&self.confirmation_poll_ms)
        {
            return Err(ConfigError::Validation(format!(
                "confirmation_poll_ms must be in {MIN_CONFIRMATION_POLL_MS}..={MAX_CONFIRMATION_POLL_MS}, got {}",
                self.confirmation_poll_ms
            )));
        }
        if self.read_retry_attempts == 0 || self.read_retry_attempts > MAX_READ_RETRY_ATTEMPTS {
            return Err(ConfigError::Validation(format!(
                "read_retry_attempts must be in 1..={MAX_READ_RETRY_ATTEMPTS}, got {}",
                self.read_retry_attempts
            )));
        }
        Ok(())
    }

    /// The validated ledger address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Address` if the configured value is malformed.
    pub fn ledger_address(&self) -> Result<Address, ConfigError> {
        Ok(Address::new(self.ledger_address.as_str())?)
    }

    /// The portfolio poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// The confirmation poll cadence as a [`Duration`].
    #[must_use]
    pub const fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    /// The read-retry policy described by this configuration.
    #[must_use]
    pub fn read_retry(&self) -> ReadRetryPolicy {
        ReadRetryPolicy::new(
            self.read_retry_attempts,
            Duration::from_millis(self.read_retry_delay_ms),
        )
    }
}
