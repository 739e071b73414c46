//! The error registry: handlers, scoped context, breadcrumbs and history.
//!
//! One registry is constructed by the application and shared through an
//! `Arc`. All state sits behind short-lived `std::sync::Mutex` locks that are
//! never held across an `.await`; poisoned locks are recovered.

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::breadcrumbs::{Breadcrumb, BreadcrumbLevel, RingBuffer};
use super::handler::{ErrorHandler, HandlerError, HandlerId, HandlerKey};
use super::reporter::{report_with_retry, ErrorReport, RemoteReporter, ReportingConfig};
use crate::error::{RawError, StructuredError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct RegisteredHandler {
    id: HandlerId,
    key: HandlerKey,
    handler: Arc<dyn ErrorHandler>,
}

struct ContextFrame {
    id: u64,
    values: BTreeMap<String, Value>,
}

/// Counts from one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Handlers that completed successfully.
    pub handled: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Central handler registry and error sink.
pub struct ErrorRegistry {
    config: ReportingConfig,
    handlers: Mutex<Vec<RegisteredHandler>>,
    context: Mutex<Vec<ContextFrame>>,
    breadcrumbs: Mutex<RingBuffer<Breadcrumb>>,
    history: Mutex<RingBuffer<StructuredError>>,
    reporter: Option<Arc<dyn RemoteReporter>>,
    next_id: AtomicU64,
}

impl Default for ErrorRegistry {
    fn default() -> Self {
        Self::new(ReportingConfig::default())
    }
}

impl ErrorRegistry {
    pub fn new(config: ReportingConfig) -> Self {
        Self {
            breadcrumbs: Mutex::new(RingBuffer::new(config.breadcrumb_capacity)),
            history: Mutex::new(RingBuffer::new(config.history_capacity)),
            config,
            handlers: Mutex::new(Vec::new()),
            context: Mutex::new(Vec::new()),
            reporter: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Captured errors are also sent to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn RemoteReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ---- Handlers ----

    /// Registers `handler` for errors named `key`, or for all errors with `*`.
    pub fn register_handler(
        &self,
        key: impl Into<HandlerKey>,
        handler: Arc<dyn ErrorHandler>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id());
        let key = key.into();
        debug!(handler = %key, "registering error handler");
        lock(&self.handlers).push(RegisteredHandler { id, key, handler });
        id
    }

    /// Removes a registration. Returns whether it existed.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|registered| registered.id != id);
        handlers.len() != before
    }

    /// Removes every handler registered under `key`. Returns how many.
    pub fn unregister_key(&self, key: &HandlerKey) -> usize {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|registered| &registered.key != key);
        before - handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Runs every matching handler: those registered for the error's name
    /// first, then wildcard handlers, each in registration order.
    ///
    /// A failing or panicking handler is logged and does not stop the rest.
    pub async fn dispatch(&self, error: &StructuredError) -> DispatchSummary {
        let ordered: Vec<(HandlerKey, Arc<dyn ErrorHandler>)> = {
            let handlers = lock(&self.handlers);
            let named = handlers
                .iter()
                .filter(|h| matches!(&h.key, HandlerKey::Name(name) if name == error.name()));
            let wildcard = handlers.iter().filter(|h| h.key == HandlerKey::Wildcard);
            named
                .chain(wildcard)
                .map(|h| (h.key.clone(), Arc::clone(&h.handler)))
                .collect()
        };

        let mut summary = DispatchSummary::default();
        for (key, handler) in ordered {
            let result = AssertUnwindSafe(handler.handle(error))
                .catch_unwind()
                .await
                .unwrap_or(Err(HandlerError::Panicked));
            match result {
                Ok(()) => summary.handled += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(handler = %key, code = error.code(), error = %err, "error handler failed");
                }
            }
        }
        summary
    }

    // ---- Context ----

    /// Pushes a context frame; it stays until the guard is dropped.
    pub fn scope<I, K>(&self, values: I) -> ContextGuard<'_>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let id = self.push_context(values);
        ContextGuard { registry: self, id }
    }

    /// Pushes a context frame and returns its id for [`pop_context`](Self::pop_context).
    pub fn push_context<I, K>(&self, values: I) -> u64
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let id = self.next_id();
        let values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        lock(&self.context).push(ContextFrame { id, values });
        id
    }

    /// Removes the frame `id`, wherever it sits in the stack.
    pub fn pop_context(&self, id: u64) -> Option<BTreeMap<String, Value>> {
        let mut stack = lock(&self.context);
        let index = stack.iter().rposition(|frame| frame.id == id)?;
        Some(stack.remove(index).values)
    }

    /// All frames merged; inner frames win.
    pub fn current_context(&self) -> BTreeMap<String, Value> {
        let stack = lock(&self.context);
        let mut merged = BTreeMap::new();
        for frame in stack.iter() {
            merged.extend(frame.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Wraps `raw` into a structured error and merges the current context.
    ///
    /// Keys the error already carries are kept. Wrapping a structured error
    /// never changes its code, category or severity.
    pub fn wrap(&self, raw: impl Into<RawError>) -> StructuredError {
        let error = raw.into().into_structured();
        let scoped = self.current_context();
        if scoped.is_empty() {
            return error;
        }
        let missing: Vec<(String, Value)> = scoped
            .into_iter()
            .filter(|(key, _)| !error.metadata().context.contains_key(key))
            .collect();
        error.with_context_map(missing)
    }

    // ---- Breadcrumbs and history ----

    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        lock(&self.breadcrumbs).push(breadcrumb);
    }

    /// Breadcrumbs, oldest first.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        lock(&self.breadcrumbs).snapshot()
    }

    pub fn clear_breadcrumbs(&self) {
        lock(&self.breadcrumbs).clear();
    }

    /// Captured errors, oldest first.
    pub fn recent_errors(&self) -> Vec<StructuredError> {
        lock(&self.history).snapshot()
    }

    // ---- Capture ----

    /// Records `error`, runs the handlers and, with a reporter configured,
    /// reports it remotely. Never fails.
    pub async fn capture(&self, error: StructuredError) -> DispatchSummary {
        lock(&self.history).push(error.clone());

        let summary = self.dispatch(&error).await;

        if let Some(reporter) = &self.reporter {
            let report = ErrorReport {
                error: error.to_serialized(),
                breadcrumbs: self.breadcrumbs(),
                context: self.current_context(),
                reported_at: Utc::now(),
            };
            report_with_retry(reporter.as_ref(), &report, &self.config).await;
        }

        self.add_breadcrumb(
            Breadcrumb::new(BreadcrumbLevel::Error, error.message(), "error")
                .with_data(serde_json::json!({ "code": error.code() })),
        );
        summary
    }

    /// Spawns [`capture`](Self::capture) on the current runtime without
    /// waiting for it. Outside a runtime the error is only recorded.
    pub fn capture_in_background(self: &Arc<Self>, error: StructuredError) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let registry = Arc::clone(self);
                handle.spawn(async move {
                    registry.capture(error).await;
                });
            }
            Err(_) => {
                warn!(code = error.code(), "no async runtime, error recorded without dispatch");
                lock(&self.history).push(error);
            }
        }
    }
}

/// Pops its context frame when dropped.
#[must_use = "the context is removed as soon as the guard is dropped"]
pub struct ContextGuard<'a> {
    registry: &'a ErrorRegistry,
    id: u64,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.registry.pop_context(self.id);
    }
}
