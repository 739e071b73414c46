//! Retry telemetry: events, the sink contract and the sampling batcher.
//!
//! The orchestrator emits a [`TelemetryEvent`] for every scheduled retry and
//! for the final outcome of a retried invocation. Emission is synchronous and
//! cheap; the [`TelemetryBatcher`] samples events, queues them and ships
//! batches to a [`TelemetrySink`] in the background.

pub mod batcher;
pub mod sink;
pub mod stringify;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::StructuredError;

pub use batcher::{BatcherConfig, BatcherStats, TelemetryBatcher};
pub use sink::{CachedSinkConfig, SinkConfig, TelemetryError, TelemetrySink, TracingSink};
pub use stringify::{safe_stringify, truncate_field, TRUNCATION_MARKER};

/// What a telemetry event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEventKind {
    /// An attempt failed and another one is scheduled.
    Retry,
    /// The invocation succeeded after at least one retry.
    Success,
    /// The last attempt failed.
    Failure,
}

/// One retry-related occurrence for a channel.
#[derive(Clone, Debug)]
pub struct TelemetryEvent {
    pub kind: TelemetryEventKind,
    pub channel: String,
    /// The attempt this event refers to (1-based).
    pub attempt: u32,
    /// The attempt limit in force.
    pub total_attempts: u32,
    /// Delay before the next attempt (retry events only).
    pub delay: Option<Duration>,
    pub error: Option<StructuredError>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Wall time from the first attempt (outcome events only).
    pub total_duration: Option<Duration>,
    /// Optional auxiliary payload.
    pub extra: Option<Value>,
}

impl TelemetryEvent {
    pub fn retry(
        channel: impl Into<String>,
        attempt: u32,
        total_attempts: u32,
        delay: Duration,
        error: StructuredError,
    ) -> Self {
        Self {
            kind: TelemetryEventKind::Retry,
            channel: channel.into(),
            attempt,
            total_attempts,
            delay: Some(delay),
            error: Some(error),
            timestamp: Utc::now(),
            success: false,
            total_duration: None,
            extra: None,
        }
    }

    pub fn success(
        channel: impl Into<String>,
        attempts: u32,
        total_attempts: u32,
        total_duration: Duration,
    ) -> Self {
        Self {
            kind: TelemetryEventKind::Success,
            channel: channel.into(),
            attempt: attempts,
            total_attempts,
            delay: None,
            error: None,
            timestamp: Utc::now(),
            success: true,
            total_duration: Some(total_duration),
            extra: None,
        }
    }

    pub fn failure(
        channel: impl Into<String>,
        attempts: u32,
        total_attempts: u32,
        error: StructuredError,
        total_duration: Duration,
    ) -> Self {
        Self {
            kind: TelemetryEventKind::Failure,
            channel: channel.into(),
            attempt: attempts,
            total_attempts,
            delay: None,
            error: Some(error),
            timestamp: Utc::now(),
            success: false,
            total_duration: Some(total_duration),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Flattens the event into its wire payload, truncating every text
    /// field to `max_field_length` characters.
    pub fn to_payload(&self, max_field_length: usize) -> TelemetryPayload {
        TelemetryPayload {
            kind: self.kind,
            channel: truncate_field(&self.channel, max_field_length),
            attempt: self.attempt,
            total_attempts: self.total_attempts,
            delay_ms: self.delay.map(|d| d.as_millis() as u64),
            error_code: self
                .error
                .as_ref()
                .map(|e| truncate_field(e.code(), max_field_length)),
            error: self
                .error
                .as_ref()
                .map(|e| truncate_field(&safe_stringify(&e.to_serialized()), max_field_length)),
            timestamp: self.timestamp,
            success: self.success,
            total_duration_ms: self.total_duration.map(|d| d.as_millis() as u64),
            extra: self
                .extra
                .as_ref()
                .map(|extra| truncate_field(&safe_stringify(extra), max_field_length)),
        }
    }
}

/// The flattened form of a [`TelemetryEvent`] handed to a sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub kind: TelemetryEventKind,
    pub channel: String,
    pub attempt: u32,
    pub total_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// The serialized error as JSON text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

/// Receiver of telemetry events. Implementations must not block.
pub trait TelemetryEmitter: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetryEmitter for NoopTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, StructuredError};
    use serde_json::json;

    #[test]
    fn test_retry_event_fields() {
        let err = StructuredError::new("refused", "ECONNREFUSED", ErrorCategory::Network);
        let event = TelemetryEvent::retry("get-website-schema", 1, 3, Duration::from_secs(1), err);
        assert_eq!(event.kind, TelemetryEventKind::Retry);
        assert!(!event.success);
        assert_eq!(event.delay, Some(Duration::from_secs(1)));
        assert!(event.total_duration.is_none());
    }

    #[test]
    fn test_payload_truncates_text_fields() {
        let err = StructuredError::new("x".repeat(500), "ECONNREFUSED", ErrorCategory::Network);
        let event = TelemetryEvent::failure("c".repeat(50), 3, 3, err, Duration::from_millis(1500))
            .with_extra(json!({"blob": "y".repeat(500)}));

        let payload = event.to_payload(20);
        assert_eq!(payload.channel, format!("{}{}", "c".repeat(20), TRUNCATION_MARKER));
        assert!(payload.error.as_deref().unwrap().ends_with(TRUNCATION_MARKER));
        assert!(payload.extra.as_deref().unwrap().ends_with(TRUNCATION_MARKER));
        assert_eq!(payload.error_code.as_deref(), Some("ECONNREFUSED"));
        assert_eq!(payload.total_duration_ms, Some(1500));
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let event = TelemetryEvent::success("get-website-files", 2, 3, Duration::from_millis(10));
        let json = serde_json::to_value(event.to_payload(10_000)).unwrap();
        assert_eq!(json["kind"], "success");
        assert_eq!(json["totalAttempts"], 3);
        assert_eq!(json["totalDurationMs"], 10);
        assert!(json.get("error").is_none());
    }
}
