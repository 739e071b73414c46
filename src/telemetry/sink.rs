//! The telemetry sink contract and its cached configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::TelemetryPayload;

/// Errors a telemetry sink can report.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The sink could not be reached.
    #[error("telemetry sink unavailable: {0}")]
    Unavailable(String),

    /// The sink refused the payload.
    #[error("telemetry sink rejected payload: {0}")]
    Rejected(String),
}

/// Result type for telemetry sink operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Remote-side telemetry settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub enabled: bool,
}

/// Destination for telemetry payloads.
///
/// All calls are made from background tasks; none of them sits on an
/// invocation's critical path.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Fetches the remote settings. Callers cache the answer.
    async fn get_config(&self) -> TelemetryResult<SinkConfig>;

    /// Reports a single event.
    async fn report_event(&self, payload: TelemetryPayload) -> TelemetryResult<()>;

    /// Reports several events at once, oldest first.
    async fn report_batch(&self, events: Vec<TelemetryPayload>) -> TelemetryResult<()>;
}

/// A sink that writes payloads to the local log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn get_config(&self) -> TelemetryResult<SinkConfig> {
        Ok(SinkConfig { enabled: true })
    }

    async fn report_event(&self, payload: TelemetryPayload) -> TelemetryResult<()> {
        info!(
            channel = %payload.channel,
            kind = ?payload.kind,
            attempt = payload.attempt,
            total_attempts = payload.total_attempts,
            "retry telemetry"
        );
        Ok(())
    }

    async fn report_batch(&self, events: Vec<TelemetryPayload>) -> TelemetryResult<()> {
        for payload in events {
            self.report_event(payload).await?;
        }
        Ok(())
    }
}

/// Caches [`SinkConfig`] for a fixed time-to-live.
///
/// A failed fetch counts as "disabled" and is cached like a successful one,
/// so an unreachable sink is not asked again on every flush.
#[derive(Debug)]
pub struct CachedSinkConfig {
    ttl: Duration,
    cached: Mutex<Option<(Instant, SinkConfig)>>,
}

impl CachedSinkConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Whether the sink currently accepts telemetry.
    pub async fn enabled(&self, sink: &dyn TelemetrySink) -> bool {
        let mut cached = self.cached.lock().await;
        if let Some((fetched_at, config)) = *cached {
            if fetched_at.elapsed() < self.ttl {
                return config.enabled;
            }
        }

        let config = match sink.get_config().await {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "failed to fetch telemetry config, treating as disabled");
                SinkConfig { enabled: false }
            }
        };
        debug!(enabled = config.enabled, "refreshed telemetry config");
        *cached = Some((Instant::now(), config));
        config.enabled
    }

    /// Drops the cached value so the next check refetches.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct CountingSink {
        fetches: AtomicU32,
        enabled: AtomicBool,
        fail: bool,
    }

    impl CountingSink {
        fn new(enabled: bool, fail: bool) -> Self {
            Self {
                fetches: AtomicU32::new(0),
                enabled: AtomicBool::new(enabled),
                fail,
            }
        }
    }

    #[async_trait]
    impl TelemetrySink for CountingSink {
        async fn get_config(&self) -> TelemetryResult<SinkConfig> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TelemetryError::Unavailable("offline".to_string()));
            }
            Ok(SinkConfig {
                enabled: self.enabled.load(Ordering::SeqCst),
            })
        }

        async fn report_event(&self, _payload: TelemetryPayload) -> TelemetryResult<()> {
            Ok(())
        }

        async fn report_batch(&self, _events: Vec<TelemetryPayload>) -> TelemetryResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_is_cached_within_ttl() {
        let sink = CountingSink::new(true, false);
        let cache = CachedSinkConfig::new(Duration::from_secs(60));

        assert!(cache.enabled(&sink).await);
        sink.enabled.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.enabled(&sink).await);
        assert_eq!(sink.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_refetched_after_ttl() {
        let sink = CountingSink::new(true, false);
        let cache = CachedSinkConfig::new(Duration::from_secs(60));

        assert!(cache.enabled(&sink).await);
        sink.enabled.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cache.enabled(&sink).await);
        assert_eq!(sink.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_counts_as_disabled_and_is_cached() {
        let sink = CountingSink::new(true, true);
        let cache = CachedSinkConfig::new(Duration::from_secs(60));

        assert!(!cache.enabled(&sink).await);
        assert!(!cache.enabled(&sink).await);
        assert_eq!(sink.fetches.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        assert!(!cache.enabled(&sink).await);
        assert_eq!(sink.fetches.load(Ordering::SeqCst), 2);
    }
}
