//! Runtime configuration.
//!
//! Settings are read from `TASK_SYNC_*` environment variables. Missing
//! variables fall back to defaults; present but malformed ones are errors.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TASK_SYNC_KEY_PREFIX` | `T` |
//! | `TASK_SYNC_POLL_INTERVAL_MS` | `30000` |
//! | `TASK_SYNC_TRASH_RETENTION_DAYS` | `30` |
//! | `TASK_SYNC_REFETCH_ON_PUSH` | `true` |
//! | `TASK_SYNC_NOTIFICATION_MS` | `3000` |
//! | `TASK_SYNC_RESTORE_NOTIFICATION_MS` | `3500` |

use std::time::Duration;

use thiserror::Error;

use crate::domain::{DEFAULT_KEY_PREFIX, IdentityClassifier};

// =============================================================================
// Sync Config
// =============================================================================

/// Configuration of the synchronization core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// First character of canonical keys.
    pub key_prefix: char,
    /// Interval between authoritative fetches.
    pub poll_interval: Duration,
    /// Days a trashed task is kept before it expires.
    pub trash_retention_days: u32,
    /// Whether an applied push event triggers an immediate fetch.
    pub refetch_on_push: bool,
    /// Display duration of ordinary notifications.
    pub notification_duration: Duration,
    /// Display duration of the restore notification.
    pub restore_notification_duration: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX,
            poll_interval: Duration::from_secs(30),
            trash_retention_days: 30,
            refetch_on_push: true,
            notification_duration: Duration::from_millis(3000),
            restore_notification_duration: Duration::from_millis(3500),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable contains an invalid value, or if the
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is malformed, or if the configuration
    /// fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            key_prefix: parse_char(&lookup, "TASK_SYNC_KEY_PREFIX", defaults.key_prefix)?,
            poll_interval: Duration::from_millis(parse_u64(
                &lookup,
                "TASK_SYNC_POLL_INTERVAL_MS",
                30_000,
            )?),
            trash_retention_days: parse_u32(
                &lookup,
                "TASK_SYNC_TRASH_RETENTION_DAYS",
                defaults.trash_retention_days,
            )?,
            refetch_on_push: parse_bool(
                &lookup,
                "TASK_SYNC_REFETCH_ON_PUSH",
                defaults.refetch_on_push,
            )?,
            notification_duration: Duration::from_millis(parse_u64(
                &lookup,
                "TASK_SYNC_NOTIFICATION_MS",
                3000,
            )?),
            restore_notification_duration: Duration::from_millis(parse_u64(
                &lookup,
                "TASK_SYNC_RESTORE_NOTIFICATION_MS",
                3500,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `poll_interval` is zero
    /// - `trash_retention_days` is zero
    /// - `key_prefix` is a digit or whitespace
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.trash_retention_days == 0 {
            return Err(ConfigError::ZeroRetention);
        }
        if self.key_prefix.is_ascii_digit() || self.key_prefix.is_whitespace() {
            return Err(ConfigError::InvalidKeyPrefix(self.key_prefix));
        }
        Ok(())
    }

    /// Returns a new configuration with the given key prefix.
    #[must_use]
    pub const fn with_key_prefix(self, key_prefix: char) -> Self {
        Self { key_prefix, ..self }
    }

    /// Returns a new configuration with the given poll interval.
    #[must_use]
    pub const fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    /// Returns a new configuration with push-triggered fetches switched.
    #[must_use]
    pub const fn with_refetch_on_push(self, refetch_on_push: bool) -> Self {
        Self {
            refetch_on_push,
            ..self
        }
    }

    /// Classifier for the configured key prefix.
    #[must_use]
    pub fn classifier(&self) -> IdentityClassifier {
        IdentityClassifier::new(self.key_prefix)
    }
}

// =============================================================================
// Environment Variable Parsing
// =============================================================================

/// Error type for environment variable parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvParseError {
    /// Invalid integer value.
    #[error("Invalid integer value for {name}: {message} (got '{value}')")]
    InvalidInteger {
        /// Variable name.
        name: String,
        /// Error message.
        message: String,
        /// Actual value.
        value: String,
    },

    /// Invalid boolean value.
    #[error("Invalid boolean value for {name} (got '{value}')")]
    InvalidBool {
        /// Variable name.
        name: String,
        /// Actual value.
        value: String,
    },

    /// Value is not exactly one character.
    #[error("Expected a single character for {name} (got '{value}')")]
    InvalidChar {
        /// Variable name.
        name: String,
        /// Actual value.
        value: String,
    },
}

fn parse_integer<F, T>(lookup: &F, name: &str, default: T) -> Result<T, EnvParseError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| EnvParseError::InvalidInteger {
                name: name.to_string(),
                message: e.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

fn parse_u64<F>(lookup: &F, name: &str, default: u64) -> Result<u64, EnvParseError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_integer(lookup, name, default)
}

fn parse_u32<F>(lookup: &F, name: &str, default: u32) -> Result<u32, EnvParseError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_integer(lookup, name, default)
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool, EnvParseError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EnvParseError::InvalidBool {
            name: name.to_string(),
            value,
        }),
    }
}

fn parse_char<F>(lookup: &F, name: &str, default: char) -> Result<char, EnvParseError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(character), None) => Ok(character),
        _ => Err(EnvParseError::InvalidChar {
            name: name.to_string(),
            value,
        }),
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment parsing error.
    #[error("Environment parsing error: {0}")]
    EnvParseError(#[from] EnvParseError),

    /// Poll interval is zero.
    #[error("Invalid poll interval: must be greater than 0")]
    ZeroPollInterval,

    /// Trash retention is zero.
    #[error("Invalid trash retention: must be at least 1 day")]
    ZeroRetention,

    /// Key prefix cannot start a canonical key.
    #[error("Invalid key prefix: '{0}'")]
    InvalidKeyPrefix(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[rstest]
    fn test_defaults_when_nothing_set() {
        let config = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.restore_notification_duration, Duration::from_millis(3500));
    }

    #[rstest]
    fn test_values_are_read() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("TASK_SYNC_KEY_PREFIX", "K"),
            ("TASK_SYNC_POLL_INTERVAL_MS", "250"),
            ("TASK_SYNC_TRASH_RETENTION_DAYS", "7"),
            ("TASK_SYNC_REFETCH_ON_PUSH", "off"),
        ]))
        .unwrap();

        assert_eq!(config.key_prefix, 'K');
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.trash_retention_days, 7);
        assert!(!config.refetch_on_push);
    }

    #[rstest]
    #[case("TASK_SYNC_POLL_INTERVAL_MS", "soon")]
    #[case("TASK_SYNC_TRASH_RETENTION_DAYS", "-1")]
    #[case("TASK_SYNC_REFETCH_ON_PUSH", "maybe")]
    #[case("TASK_SYNC_KEY_PREFIX", "TK")]
    fn test_malformed_value_is_error(#[case] name: &str, #[case] value: &str) {
        let result = SyncConfig::from_lookup(lookup_from(&[(name, value)]));
        assert!(matches!(result, Err(ConfigError::EnvParseError(_))));
    }

    #[rstest]
    #[case("TASK_SYNC_POLL_INTERVAL_MS", "0", ConfigError::ZeroPollInterval)]
    #[case("TASK_SYNC_TRASH_RETENTION_DAYS", "0", ConfigError::ZeroRetention)]
    #[case("TASK_SYNC_KEY_PREFIX", "7", ConfigError::InvalidKeyPrefix('7'))]
    fn test_validation(#[case] name: &str, #[case] value: &str, #[case] expected: ConfigError) {
        assert_eq!(
            SyncConfig::from_lookup(lookup_from(&[(name, value)])),
            Err(expected)
        );
    }

    #[rstest]
    fn test_classifier_uses_prefix() {
        let classifier = SyncConfig::default().with_key_prefix('K').classifier();
        assert!(classifier.is_canonical_key("K12"));
        assert!(!classifier.is_canonical_key("T12"));
    }
}
