//! Retry policies per named operation.
//!
//! A [`RetryPolicyRegistry`] holds the default [`RetryConfig`], a table of
//! partial per-channel overrides and a blacklist of channels that must never
//! be retried. Lookups are pure.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use crate::error::StructuredError;

/// Configuration for retry behavior with exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, counting the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
    /// Codes worth retrying. Empty means every failure is retried.
    pub retryable_error_codes: BTreeSet<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            retryable_error_codes: BTreeSet::new(),
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with the specified parameters.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            retryable_error_codes: BTreeSet::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_error_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Number of attempts actually made; a zero limit still runs once.
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculates the delay after a failed attempt using exponential backoff.
    ///
    /// The delay is calculated as: base_delay * 2^(attempt - 1), capped at max_delay.
    ///
    /// # Arguments
    /// * `attempt` - The attempt that just failed (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base_delay.min(self.max_delay);
        }

        let exponent = (attempt - 1).min(31); // Prevent overflow
        let multiplier = 1u64 << exponent;
        let base_millis = self.base_delay.as_millis() as u64;
        let delay_millis = base_millis.saturating_mul(multiplier);

        Duration::from_millis(delay_millis.min(self.max_delay.as_millis() as u64))
    }

    /// Whether `error` qualifies for another attempt under the code filter.
    pub fn allows_retry_of(&self, error: &StructuredError) -> bool {
        if self.retryable_error_codes.is_empty() {
            return true;
        }
        error
            .chain()
            .any(|err| self.retryable_error_codes.contains(err.code()))
    }
}

/// A partial override of [`RetryConfig`] for one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelPolicy {
    pub max_attempts: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub retryable_error_codes: Option<BTreeSet<String>>,
}

impl ChannelPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn retryable_error_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_error_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Applies this override on top of `base`; fields set here win.
    pub fn apply(&self, base: &RetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay: self.base_delay.unwrap_or(base.base_delay),
            max_delay: self.max_delay.unwrap_or(base.max_delay),
            retryable_error_codes: self
                .retryable_error_codes
                .clone()
                .unwrap_or_else(|| base.retryable_error_codes.clone()),
        }
    }
}

/// Channels that read data and can be retried safely.
const READ_CHANNELS: &[&str] = &[
    "get-website-schema",
    "get-website-files",
    "read-website-file",
    "get-website-config",
];

/// Channels with side effects that must never be repeated automatically.
const NON_IDEMPOTENT_CHANNELS: &[&str] = &[
    "build-website",
    "save-website-file",
    "delete-website",
    "create-website",
    "deploy-website",
];

/// Resolves the effective retry configuration for named operations.
#[derive(Clone, Debug, Default)]
pub struct RetryPolicyRegistry {
    defaults: RetryConfig,
    channels: HashMap<String, ChannelPolicy>,
    blacklist: HashSet<String>,
}

impl RetryPolicyRegistry {
    /// Creates a registry with `defaults` and no overrides.
    pub fn new(defaults: RetryConfig) -> Self {
        Self {
            defaults,
            channels: HashMap::new(),
            blacklist: HashSet::new(),
        }
    }

    /// Creates a registry with the application's built-in channel table.
    pub fn with_defaults() -> Self {
        Self::builtin(RetryConfig::default())
    }

    /// The built-in channel table on top of `defaults`.
    pub fn builtin(defaults: RetryConfig) -> Self {
        let mut registry = Self::new(defaults);
        for channel in READ_CHANNELS {
            registry.set_policy(*channel, ChannelPolicy::new().max_attempts(3));
        }
        registry.set_policy(
            "check-dns",
            ChannelPolicy::new()
                .max_attempts(5)
                .base_delay(Duration::from_secs(2)),
        );
        for channel in NON_IDEMPOTENT_CHANNELS {
            registry.add_to_blacklist(*channel);
        }
        registry
    }

    /// The default configuration used for channels without an override.
    pub fn defaults(&self) -> &RetryConfig {
        &self.defaults
    }

    /// Sets (or replaces) the override for `channel`.
    pub fn set_policy(&mut self, channel: impl Into<String>, policy: ChannelPolicy) {
        self.channels.insert(channel.into(), policy);
    }

    /// Forces `channel` to a single attempt regardless of any override.
    pub fn add_to_blacklist(&mut self, channel: impl Into<String>) {
        self.blacklist.insert(channel.into());
    }

    /// Merges the defaults with the channel's override, if any.
    pub fn resolve(&self, channel: &str) -> RetryConfig {
        match self.channels.get(channel) {
            Some(policy) => policy.apply(&self.defaults),
            None => self.defaults.clone(),
        }
    }

    /// Exact-match blacklist lookup.
    pub fn is_blacklisted(&self, channel: &str) -> bool {
        self.blacklist.contains(channel)
    }

    /// The configuration actually used for `channel`: resolved, then
    /// clamped to one attempt when blacklisted.
    pub fn effective(&self, channel: &str) -> RetryConfig {
        let config = self.resolve(channel);
        if self.is_blacklisted(channel) {
            config.with_max_attempts(1)
        } else {
            config
        }
    }

    /// Names of all blacklisted channels, sorted.
    pub fn blacklisted_channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blacklist.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
