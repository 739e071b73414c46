//! Logging setup.
//!
//! Diagnostics go to stderr so stdout stays reserved for command output
//! (JSON in particular). The level comes from the `[logging]` section of
//! [`CoreConfig`](crate::config::CoreConfig), raised by `-v` flags, and
//! `RUST_LOG` overrides both. Every best-effort path in the core (telemetry
//! flushes, handlers, remote reports) falls back to these logs.

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Verbosity, ordered from silent to most verbose.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// This level made `steps` levels more verbose, saturating at trace.
    pub fn raised(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 6] = [
            LogLevel::Off,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let index = ORDER.iter().position(|level| *level == self).unwrap_or(0);
        ORDER[(index + steps as usize).min(ORDER.len() - 1)]
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Prefix lines with a timestamp.
    pub timestamps: bool,
    /// Prefix lines with the module path.
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            timestamps: false,
            target: true,
        }
    }
}

impl LoggingConfig {
    /// Raises the configured level once per `-v`.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.level = self.level.raised(verbosity);
        self
    }

    fn filter(&self) -> EnvFilter {
        match std::env::var("RUST_LOG") {
            Ok(_) => EnvFilter::from_default_env(),
            Err(_) => EnvFilter::new(self.level.as_directive()),
        }
    }
}

/// Installs the global stderr subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use sitecraft::config::CoreConfig;
/// use sitecraft::logging::init_logging;
///
/// let config = CoreConfig::default();
/// init_logging(&config.logging.clone().with_verbosity(1)).ok();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let subscriber = fmt()
        .with_env_filter(config.filter())
        .with_writer(std::io::stderr)
        .with_target(config.target);

    if config.timestamps {
        subscriber.finish().try_init()
    } else {
        subscriber.without_time().finish().try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_configured_level() {
        assert_eq!(LogLevel::Warn.raised(1), LogLevel::Info);
        assert_eq!(LogLevel::Info.raised(2), LogLevel::Trace);
        assert_eq!(LogLevel::Debug.raised(9), LogLevel::Trace);
        assert_eq!(LogLevel::Off.raised(0), LogLevel::Off);

        let config = LoggingConfig {
            level: LogLevel::Error,
            ..LoggingConfig::default()
        };
        assert_eq!(config.with_verbosity(1).level, LogLevel::Warn);
    }

    #[test]
    fn test_level_names() {
        let parsed: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(parsed, LogLevel::Debug);
        assert_eq!(parsed.as_directive(), "debug");
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
