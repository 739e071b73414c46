//! Sampling, batching telemetry reporter.
//!
//! Events are admitted with probability `sampling_rate`, queued, and shipped
//! to the sink either the moment the queue reaches `batch_size` or on a fixed
//! interval timer. Shipping always happens on a background task; a failing
//! sink is logged and otherwise ignored.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::sink::{CachedSinkConfig, TelemetrySink};
use super::{TelemetryEmitter, TelemetryEvent, TelemetryPayload};

/// Configuration for the telemetry batcher.
#[derive(Debug, Clone, PartialEq)]
pub struct BatcherConfig {
    /// Whether telemetry is collected at all.
    pub enabled: bool,
    /// Probability in `[0, 1]` that an event is kept.
    pub sampling_rate: f64,
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Interval of the background flush timer.
    pub flush_interval: Duration,
    /// Cap for every text field of a flushed payload.
    pub max_field_length: usize,
    /// How long the sink's `get_config` answer is trusted.
    pub config_ttl: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            max_field_length: 10_000,
            config_ttl: Duration::from_secs(60),
        }
    }
}

impl BatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sampling rate, clamped to `[0, 1]`.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    /// Sets the batch size; zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_field_length(mut self, max: usize) -> Self {
        self.max_field_length = max;
        self
    }

    pub fn with_config_ttl(mut self, ttl: Duration) -> Self {
        self.config_ttl = ttl;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Counters describing what the batcher has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Events that passed sampling and were queued.
    pub admitted: u64,
    /// Events rejected by sampling or dropped because telemetry was off.
    pub dropped: u64,
    /// Events the sink accepted.
    pub flushed: u64,
    /// Events lost to sink errors.
    pub failed: u64,
}

struct BatcherInner {
    config: BatcherConfig,
    sink: Arc<dyn TelemetrySink>,
    sink_config: CachedSinkConfig,
    queue: Mutex<VecDeque<TelemetryEvent>>,
    rng: Mutex<StdRng>,
    admitted: AtomicU64,
    dropped: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
}

impl BatcherInner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<TelemetryEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain(&self, limit: usize) -> Vec<TelemetryEvent> {
        let mut queue = self.queue();
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    async fn send(&self, batch: Vec<TelemetryEvent>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len() as u64;

        if !self.sink_config.enabled(self.sink.as_ref()).await {
            debug!(count, "telemetry disabled by sink, discarding batch");
            self.dropped.fetch_add(count, Ordering::Relaxed);
            return;
        }

        let mut payloads: Vec<TelemetryPayload> = batch
            .iter()
            .map(|event| event.to_payload(self.config.max_field_length))
            .collect();

        let result = if payloads.len() == 1 {
            match payloads.pop() {
                Some(payload) => self.sink.report_event(payload).await,
                None => Ok(()),
            }
        } else {
            self.sink.report_batch(payloads).await
        };

        match result {
            Ok(()) => {
                self.flushed.fetch_add(count, Ordering::Relaxed);
                debug!(count, "flushed telemetry batch");
            }
            Err(err) => {
                self.failed.fetch_add(count, Ordering::Relaxed);
                warn!(error = %err, count, "telemetry flush failed");
            }
        }
    }
}

/// Sampling, batching telemetry reporter.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use sitecraft::telemetry::{BatcherConfig, TelemetryBatcher, TracingSink};
///
/// let batcher = TelemetryBatcher::new(BatcherConfig::default(), Arc::new(TracingSink));
/// batcher.start();
/// // hand `batcher` to the orchestrator as its TelemetryEmitter
/// batcher.flush().await;
/// batcher.stop();
/// ```
pub struct TelemetryBatcher {
    inner: Arc<BatcherInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryBatcher {
    /// Creates a batcher with an entropy-seeded sampler.
    pub fn new(config: BatcherConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        Self::with_rng(config, sink, StdRng::from_entropy())
    }

    /// Creates a batcher with a caller-provided sampler, e.g. a seeded one.
    pub fn with_rng(config: BatcherConfig, sink: Arc<dyn TelemetrySink>, rng: StdRng) -> Self {
        let sink_config = CachedSinkConfig::new(config.config_ttl);
        Self {
            inner: Arc::new(BatcherInner {
                config,
                sink,
                sink_config,
                queue: Mutex::new(VecDeque::new()),
                rng: Mutex::new(rng),
                admitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                flushed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    /// Draws once against the sampling rate.
    ///
    /// A rate of 0 never admits and a rate of 1 always admits, without
    /// consulting the random source.
    pub fn sample(&self) -> bool {
        let rate = self.inner.config.sampling_rate;
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen::<f64>() < rate
    }

    /// Samples and queues `event`. Returns whether it was admitted.
    ///
    /// When the queue reaches `batch_size` the oldest `batch_size` events
    /// are shipped on a background task.
    pub fn record(&self, event: TelemetryEvent) -> bool {
        if !self.inner.config.enabled || !self.sample() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);

        let full_batch = {
            let mut queue = self.inner.queue();
            queue.push_back(event);
            if queue.len() >= self.inner.config.batch_size {
                let size = self.inner.config.batch_size;
                Some(queue.drain(..size).collect::<Vec<_>>())
            } else {
                None
            }
        };

        if let Some(batch) = full_batch {
            self.dispatch(batch);
        }
        true
    }

    fn dispatch(&self, batch: Vec<TelemetryEvent>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move { inner.send(batch).await });
            }
            Err(_) => {
                warn!(count = batch.len(), "no async runtime, discarding telemetry batch");
                self.inner
                    .failed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
        }
    }

    /// Ships everything currently queued and waits for the sink.
    ///
    /// Returns the number of events taken off the queue.
    pub async fn flush(&self) -> usize {
        let batch = self.inner.drain(usize::MAX);
        let count = batch.len();
        self.inner.send(batch).await;
        count
    }

    /// Number of events waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner.queue().len()
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            admitted: self.inner.admitted.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            flushed: self.inner.flushed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Starts the interval flush timer. Calling it again restarts the timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let interval = self.inner.config.flush_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let batch = inner.drain(usize::MAX);
                inner.send(batch).await;
            }
        });

        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the interval flush timer. Queued events stay queued.
    pub fn stop(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}

impl Drop for TelemetryBatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl TelemetryEmitter for TelemetryBatcher {
    fn emit(&self, event: TelemetryEvent) {
        self.record(event);
    }
}
