//! Best-effort remote error reporting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::breadcrumbs::Breadcrumb;
use crate::error::SerializedError;

/// Errors from a remote reporter.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The backend could not be reached.
    #[error("report backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the report.
    #[error("report rejected: {0}")]
    Rejected(String),
}

/// Result type for remote reporting.
pub type ReportResult<T> = Result<T, ReportError>;

/// Settings for the dispatcher's buffers and its reporting loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportingConfig {
    /// Attempts per report, counting the first.
    pub max_attempts: u32,
    /// Base of the linear backoff between attempts.
    pub retry_delay: Duration,
    pub breadcrumb_capacity: usize,
    pub history_capacity: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            breadcrumb_capacity: 50,
            history_capacity: 100,
        }
    }
}

impl ReportingConfig {
    /// Delay after failed attempt `attempt` (1-based): `attempt * retry_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

/// What gets sent to the remote backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error: SerializedError,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub context: BTreeMap<String, Value>,
    pub reported_at: DateTime<Utc>,
}

/// Remote error collection backend.
#[async_trait]
pub trait RemoteReporter: Send + Sync {
    async fn report(&self, report: &ErrorReport) -> ReportResult<()>;
}

/// Sends `report`, retrying with linear backoff. Returns whether it was
/// delivered; exhaustion is logged and swallowed.
pub async fn report_with_retry(
    reporter: &dyn RemoteReporter,
    report: &ErrorReport,
    config: &ReportingConfig,
) -> bool {
    let max_attempts = config.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match reporter.report(report).await {
            Ok(()) => {
                debug!(attempt, code = %report.error.code, "error report delivered");
                return true;
            }
            Err(err) if attempt < max_attempts => {
                let delay = config.delay_after(attempt);
                debug!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "error report failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(attempts = attempt, error = %err, "giving up on error report");
            }
        }
    }
    false
}
