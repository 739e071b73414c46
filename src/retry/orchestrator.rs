//! Bounded, cancellable retries for named operations.
//!
//! Each invocation walks the states `ATTEMPT -> {SUCCESS | WAIT | FAIL}` and
//! `WAIT -> {ATTEMPT | ABORTED}`. Failures are wrapped into a
//! [`StructuredError`] exactly once per attempt; intermediate failures are
//! only visible through telemetry, the last one is returned to the caller.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::{RetryConfig, RetryPolicyRegistry};
use crate::dispatch::ErrorRegistry;
use crate::error::{RawError, StructuredError};
use crate::telemetry::{NoopTelemetry, TelemetryEmitter, TelemetryEvent};

/// How a retried invocation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Success(T),
    /// The last permitted attempt failed, or the failure was not retryable.
    Failure(StructuredError),
    /// Cancelled while waiting between attempts. Not a user-facing failure.
    Aborted {
        channel: String,
        /// Attempts made before the cancellation.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RetryOutcome::Aborted { .. })
    }

    /// Converts to a `Result`, mapping an abort to `None`.
    pub fn into_result(self) -> Option<Result<T, StructuredError>> {
        match self {
            RetryOutcome::Success(value) => Some(Ok(value)),
            RetryOutcome::Failure(err) => Some(Err(err)),
            RetryOutcome::Aborted { .. } => None,
        }
    }

    /// The success value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            RetryOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The terminal error, if any.
    pub fn err(self) -> Option<StructuredError> {
        match self {
            RetryOutcome::Failure(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs operations under the retry policy of their channel.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct InvocationRetryOrchestrator {
    policies: Arc<RetryPolicyRegistry>,
    telemetry: Arc<dyn TelemetryEmitter>,
    registry: Option<Arc<ErrorRegistry>>,
}

impl InvocationRetryOrchestrator {
    /// Creates an orchestrator that discards telemetry and dispatches nothing.
    pub fn new(policies: Arc<RetryPolicyRegistry>) -> Self {
        Self {
            policies,
            telemetry: Arc::new(NoopTelemetry),
            registry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryEmitter>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Terminal failures are captured by `registry`, and raw failures are
    /// wrapped with its current context.
    pub fn with_registry(mut self, registry: Arc<ErrorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn policies(&self) -> &RetryPolicyRegistry {
        &self.policies
    }

    /// Runs `operation` for `channel` under the channel's effective policy.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(
        &self,
        channel: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> RetryOutcome<T>
    where
        E: Into<RawError>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let config = self.policies.resolve(channel);
        self.execute_with_config(channel, config, cancel, operation)
            .await
    }

    /// Runs `operation` with an explicit configuration.
    ///
    /// The blacklist still applies: a blacklisted channel gets one attempt.
    pub async fn execute_with_config<T, E, F, Fut>(
        &self,
        channel: &str,
        mut config: RetryConfig,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        E: Into<RawError>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.policies.is_blacklisted(channel) {
            debug!(channel, "channel is blacklisted, single attempt only");
            config.max_attempts = 1;
        }
        let max_attempts = config.attempt_limit();
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(channel, attempts = attempt, "operation succeeded after retry");
                        self.emit(TelemetryEvent::success(
                            channel,
                            attempt,
                            max_attempts,
                            started.elapsed(),
                        ));
                    }
                    return RetryOutcome::Success(value);
                }
                Err(raw) => self.classify(channel, attempt, raw.into()),
            };

            if attempt >= max_attempts || !config.allows_retry_of(&error) {
                warn!(
                    channel,
                    attempt,
                    code = error.code(),
                    "operation failed, giving up"
                );
                self.emit(TelemetryEvent::failure(
                    channel,
                    attempt,
                    max_attempts,
                    error.clone(),
                    started.elapsed(),
                ));
                self.capture(&error);
                return RetryOutcome::Failure(error);
            }

            let delay = next_delay(&config, attempt, &error);
            debug!(
                channel,
                attempt,
                code = error.code(),
                delay_ms = delay.as_millis() as u64,
                "attempt failed, scheduling retry"
            );
            self.emit(TelemetryEvent::retry(
                channel,
                attempt,
                max_attempts,
                delay,
                error,
            ));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(channel, attempts = attempt, "retry aborted");
                    return RetryOutcome::Aborted {
                        channel: channel.to_string(),
                        attempts: attempt,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    /// Wraps `operation` so every call runs under this orchestrator.
    pub fn resilient<F>(&self, channel: impl Into<String>, operation: F) -> ResilientOperation<F> {
        ResilientOperation {
            orchestrator: self.clone(),
            channel: channel.into(),
            operation,
        }
    }

    fn classify(&self, channel: &str, attempt: u32, raw: RawError) -> StructuredError {
        let error = match &self.registry {
            Some(registry) => registry.wrap(raw),
            None => raw.into_structured(),
        };
        error
            .with_default_operation(channel)
            .with_retry_count(attempt - 1)
    }

    fn emit(&self, event: TelemetryEvent) {
        let telemetry = Arc::clone(&self.telemetry);
        if catch_unwind(AssertUnwindSafe(move || telemetry.emit(event))).is_err() {
            warn!("telemetry emitter panicked, event dropped");
        }
    }

    fn capture(&self, error: &StructuredError) {
        if let Some(registry) = &self.registry {
            registry.capture_in_background(error.clone());
        }
    }
}

/// The error's own suggestion wins, clamped to the policy cap; otherwise
/// exponential backoff from the policy.
fn next_delay(config: &RetryConfig, attempt: u32, error: &StructuredError) -> Duration {
    match error.retry_delay() {
        Some(suggested) => suggested.min(config.max_delay),
        None => config.backoff_delay(attempt),
    }
}

/// An operation bound to a channel and an orchestrator.
///
/// # Example
///
/// ```ignore
/// let load = orchestrator.resilient("get-website-schema", |_attempt| async {
///     transport.invoke("get-website-schema", &[]).await
/// });
/// let outcome = load.call(&CancellationToken::new()).await;
/// ```
pub struct ResilientOperation<F> {
    orchestrator: InvocationRetryOrchestrator,
    channel: String,
    operation: F,
}

impl<F> ResilientOperation<F> {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Runs the wrapped operation with retries.
    pub async fn call<T, E, Fut>(&self, cancel: &CancellationToken) -> RetryOutcome<T>
    where
        E: Into<RawError>,
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.orchestrator
            .execute(&self.channel, cancel, |attempt| (self.operation)(attempt))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{network_error, validation_error, NativeError};
    use crate::telemetry::TelemetryEventKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTelemetry {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingTelemetry {
        fn kinds(&self) -> Vec<TelemetryEventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    impl TelemetryEmitter for RecordingTelemetry {
        fn emit(&self, event: TelemetryEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct PanickingTelemetry;

    impl TelemetryEmitter for PanickingTelemetry {
        fn emit(&self, _event: TelemetryEvent) {
            panic!("emitter exploded");
        }
    }

    fn orchestrator(telemetry: Arc<dyn TelemetryEmitter>) -> InvocationRetryOrchestrator {
        InvocationRetryOrchestrator::new(Arc::new(RetryPolicyRegistry::with_defaults()))
            .with_telemetry(telemetry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_emits_nothing() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let outcome = orchestrator(telemetry.clone())
            .execute("get-website-files", &CancellationToken::new(), |_| async {
                Ok::<_, StructuredError>(42)
            })
            .await;

        assert_eq!(outcome.ok(), Some(42));
        assert!(telemetry.kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let calls = AtomicU32::new(0);

        let outcome = orchestrator(telemetry.clone())
            .execute("get-website-schema", &CancellationToken::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(NativeError::new("connect ECONNREFUSED 127.0.0.1:9000"))
                    } else {
                        Ok("schema")
                    }
                }
            })
            .await;

        assert_eq!(outcome.ok(), Some("schema"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            telemetry.kinds(),
            vec![
                TelemetryEventKind::Retry,
                TelemetryEventKind::Retry,
                TelemetryEventKind::Success
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_delays_follow_retry_count() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let _ = orchestrator(telemetry.clone())
            .execute("get-website-schema", &CancellationToken::new(), |_| async {
                Err::<(), _>(network_error("refused", "ECONNREFUSED"))
            })
            .await;

        let delays: Vec<_> = telemetry
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.delay)
            .collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_backoff_when_error_has_no_delay() {
        let config = RetryConfig::new(4, Duration::from_millis(100), Duration::from_millis(250));
        let telemetry = Arc::new(RecordingTelemetry::default());
        let _ = orchestrator(telemetry.clone())
            .execute_with_config("custom", config, &CancellationToken::new(), |_| async {
                Err::<(), _>(validation_error("bad", "name"))
            })
            .await;

        let delays: Vec<_> = telemetry
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.delay)
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_filter_fails_fast() {
        let config = RetryConfig::default().with_retryable_codes(["ETIMEDOUT"]);
        let calls = AtomicU32::new(0);
        let outcome = orchestrator(Arc::new(NoopTelemetry))
            .execute_with_config("custom", config, &CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(NativeError::new("missing").with_code("ENOENT")) }
            })
            .await;

        assert_eq!(outcome.err().map(|e| e.code().to_string()), Some("ENOENT".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_aborts() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let token = cancel.clone();

        let outcome = orchestrator(Arc::new(NoopTelemetry))
            .execute("get-website-schema", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                token.cancel();
                async { Err::<(), _>(network_error("down", "ECONNRESET")) }
            })
            .await;

        assert!(outcome.is_aborted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match outcome {
            RetryOutcome::Aborted { channel, attempts } => {
                assert_eq!(channel, "get-website-schema");
                assert_eq!(attempts, 1);
            }
            other => panic!("expected abort, got {:?}", other.is_success()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_emitter_does_not_change_result() {
        let outcome = orchestrator(Arc::new(PanickingTelemetry))
            .execute("get-website-schema", &CancellationToken::new(), |attempt| async move {
                if attempt == 1 {
                    Err(network_error("refused", "ECONNREFUSED"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(outcome.ok(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_carries_operation_and_retry_count() {
        let outcome = orchestrator(Arc::new(NoopTelemetry))
            .execute("get-website-config", &CancellationToken::new(), |_| async {
                Err::<(), _>("plain string failure")
            })
            .await;

        let err = outcome.err().unwrap();
        assert_eq!(err.code(), crate::error::NON_ERROR_VALUE_CODE);
        assert_eq!(err.metadata().operation.as_deref(), Some("get-website-config"));
        assert_eq!(err.retry_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilient_operation_reuses_policy() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = orchestrator(Arc::new(NoopTelemetry)).resilient("build-website", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(network_error("refused", "ECONNREFUSED")) }
        });

        assert_eq!(op.channel(), "build-website");
        assert!(op.call(&CancellationToken::new()).await.err().is_some());
        assert!(op.call(&CancellationToken::new()).await.err().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
