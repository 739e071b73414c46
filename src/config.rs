//! Configuration for the resilience core.
//!
//! Loaded from a TOML file with `SITECRAFT__`-prefixed environment variable
//! overrides. Every field has a default, so an empty file is valid.

use ::config::{Config, ConfigError as SourceError, Environment as EnvSource, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::ReportingConfig;
use crate::logging::LoggingConfig;
use crate::retry::{ChannelPolicy, RetryConfig, RetryPolicyRegistry};
use crate::telemetry::BatcherConfig;
use crate::translate::{Environment, TranslatorConfig};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration file path is invalid.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// The file or environment could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] SourceError),

    /// A TOML string could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// `[retry.channels.<name>]`: a partial override for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub retryable_error_codes: Option<Vec<String>>,
}

impl ChannelSection {
    pub fn to_policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay_ms.map(Duration::from_millis),
            max_delay: self.max_delay_ms.map(Duration::from_millis),
            retryable_error_codes: self
                .retryable_error_codes
                .as_ref()
                .map(|codes| codes.iter().cloned().collect()),
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Empty means every failure is retried.
    pub retryable_error_codes: Vec<String>,
    /// Channels that always get a single attempt, on top of the built-in ones.
    pub blacklist: Vec<String>,
    /// Start from the built-in channel table.
    pub builtin_channels: bool,
    pub channels: BTreeMap<String, ChannelSection>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            retryable_error_codes: Vec::new(),
            blacklist: Vec::new(),
            builtin_channels: true,
            channels: BTreeMap::new(),
        }
    }
}

impl RetrySection {
    pub fn defaults(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_retryable_codes(self.retryable_error_codes.iter().cloned())
    }

    /// Builds the policy registry: built-in table (if enabled), then the
    /// configured channel overrides and blacklist.
    pub fn to_registry(&self) -> RetryPolicyRegistry {
        let mut registry = if self.builtin_channels {
            RetryPolicyRegistry::builtin(self.defaults())
        } else {
            RetryPolicyRegistry::new(self.defaults())
        };
        for (channel, section) in &self.channels {
            registry.set_policy(channel.clone(), section.to_policy());
        }
        for channel in &self.blacklist {
            registry.add_to_blacklist(channel.clone());
        }
        registry
    }
}

/// `[telemetry]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    pub enabled: bool,
    pub sampling_rate: f64,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_field_length: usize,
    pub config_ttl_ms: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
            batch_size: 10,
            flush_interval_ms: 30_000,
            max_field_length: 10_000,
            config_ttl_ms: 60_000,
        }
    }
}

impl TelemetrySection {
    pub fn to_batcher_config(&self) -> BatcherConfig {
        BatcherConfig::new()
            .with_enabled(self.enabled)
            .with_sampling_rate(self.sampling_rate)
            .with_batch_size(self.batch_size)
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
            .with_max_field_length(self.max_field_length)
            .with_config_ttl(Duration::from_millis(self.config_ttl_ms))
    }
}

/// `[translator]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSection {
    pub environment: Environment,
    pub max_message_length: usize,
}

impl Default for TranslatorSection {
    fn default() -> Self {
        let defaults = TranslatorConfig::default();
        Self {
            environment: defaults.environment,
            max_message_length: defaults.max_message_length,
        }
    }
}

impl TranslatorSection {
    pub fn to_translator_config(&self) -> TranslatorConfig {
        TranslatorConfig {
            environment: self.environment,
            max_message_length: self.max_message_length,
        }
    }
}

/// `[reporting]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSection {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub breadcrumb_capacity: usize,
    pub history_capacity: usize,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
            breadcrumb_capacity: 50,
            history_capacity: 100,
        }
    }
}

impl ReportingSection {
    pub fn to_reporting_config(&self) -> ReportingConfig {
        ReportingConfig {
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            breadcrumb_capacity: self.breadcrumb_capacity,
            history_capacity: self.history_capacity,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub retry: RetrySection,
    pub telemetry: TelemetrySection,
    pub translator: TranslatorSection,
    pub reporting: ReportingSection,
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Environment variables override file values using the format
    /// `SITECRAFT__<SECTION>__<KEY>`, e.g. `SITECRAFT__RETRY__MAX_ATTEMPTS=5`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not valid UTF-8, the file does not
    /// exist, or its contents cannot be parsed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sitecraft::config::CoreConfig;
    ///
    /// let config = CoreConfig::load("sitecraft.toml")?;
    /// let policies = config.retry.to_registry();
    /// # Ok::<(), sitecraft::config::ConfigError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::with_name(path_str))
            .add_source(
                EnvSource::with_prefix("SITECRAFT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parses configuration from TOML text, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
