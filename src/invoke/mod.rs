//! The invocation boundary: named operations with positional arguments.
//!
//! [`ResilientInvoker`] is what display layers call. It runs the transport
//! under the retry orchestrator and hands back either a value, a translated
//! [`FriendlyError`], or `Aborted`, which must not be shown as a failure.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dispatch::{Breadcrumb, BreadcrumbLevel, ErrorRegistry};
use crate::error::{ErrorCategory, RawError, Severity, StructuredError};
use crate::retry::{InvocationRetryOrchestrator, RetryOutcome};
use crate::translate::{ErrorTranslator, FriendlyError, TranslateOptions};

/// Code for a channel nobody handles.
pub const HANDLER_MISSING_CODE: &str = "IPC_HANDLER_MISSING";

/// Carries one invocation to whatever executes it.
#[async_trait]
pub trait InvocationTransport: Send + Sync {
    async fn invoke(&self, channel: &str, args: &[Value]) -> Result<Value, RawError>;
}

type RouteFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, RawError>> + Send + Sync;

/// An in-process transport dispatching on the channel name.
#[derive(Default)]
pub struct ChannelRouter {
    routes: HashMap<String, Box<RouteFn>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `channel` to `handler`, replacing any previous route.
    pub fn route<F, Fut>(mut self, channel: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RawError>> + Send + 'static,
    {
        self.routes
            .insert(channel.into(), Box::new(move |args| handler(args).boxed()));
        self
    }

    pub fn has_route(&self, channel: &str) -> bool {
        self.routes.contains_key(channel)
    }
}

#[async_trait]
impl InvocationTransport for ChannelRouter {
    async fn invoke(&self, channel: &str, args: &[Value]) -> Result<Value, RawError> {
        match self.routes.get(channel) {
            Some(route) => route(args.to_vec()).await,
            None => Err(StructuredError::builder(
                format!("No handler registered for '{}'", channel),
                HANDLER_MISSING_CODE,
                ErrorCategory::Ipc,
            )
            .severity(Severity::High)
            .operation(channel)
            .build()
            .into()),
        }
    }
}

/// Result of a resilient invocation.
#[derive(Debug)]
pub enum InvokeOutcome {
    Success(Value),
    Failure(Box<FriendlyError>),
    /// Cancelled between attempts. Callers ignore it.
    Aborted,
}

impl InvokeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvokeOutcome::Success(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, InvokeOutcome::Aborted)
    }

    /// The friendly error to display, if any.
    pub fn failure(&self) -> Option<&FriendlyError> {
        match self {
            InvokeOutcome::Failure(friendly) => Some(friendly),
            _ => None,
        }
    }
}

/// Transport + retries + translation + dispatch, composed.
pub struct ResilientInvoker {
    transport: Arc<dyn InvocationTransport>,
    orchestrator: InvocationRetryOrchestrator,
    translator: Arc<ErrorTranslator>,
    registry: Option<Arc<ErrorRegistry>>,
}

impl ResilientInvoker {
    pub fn new(
        transport: Arc<dyn InvocationTransport>,
        orchestrator: InvocationRetryOrchestrator,
        translator: Arc<ErrorTranslator>,
    ) -> Self {
        Self {
            transport,
            orchestrator,
            translator,
            registry: None,
        }
    }

    /// Invocations leave breadcrumbs in `registry`.
    pub fn with_registry(mut self, registry: Arc<ErrorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Invokes `channel` with `args` under the channel's retry policy.
    pub async fn invoke(
        &self,
        channel: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> InvokeOutcome {
        if let Some(registry) = &self.registry {
            registry.add_breadcrumb(
                Breadcrumb::new(BreadcrumbLevel::Info, format!("invoke {}", channel), "ipc")
                    .with_data(json!({ "args": args.len() })),
            );
        }

        let transport = Arc::clone(&self.transport);
        let outcome = self
            .orchestrator
            .execute(channel, cancel, |attempt| {
                let transport = Arc::clone(&transport);
                async move {
                    debug!(channel, attempt, "invoking");
                    transport.invoke(channel, args).await
                }
            })
            .await;

        match outcome {
            RetryOutcome::Success(value) => InvokeOutcome::Success(value),
            RetryOutcome::Failure(error) => {
                let max_retries = self.orchestrator.policies().effective(channel).attempt_limit() - 1;
                let options = TranslateOptions::new()
                    .channel(channel)
                    .retries(error.retry_count(), max_retries);
                InvokeOutcome::Failure(Box::new(self.translator.translate(&error, &options)))
            }
            RetryOutcome::Aborted { .. } => InvokeOutcome::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::retry::RetryPolicyRegistry;
    use crate::translate::TranslatorConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn invoker(router: ChannelRouter) -> ResilientInvoker {
        ResilientInvoker::new(
            Arc::new(router),
            InvocationRetryOrchestrator::new(Arc::new(RetryPolicyRegistry::with_defaults())),
            Arc::new(ErrorTranslator::new(TranslatorConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_router_passes_args() {
        let router = ChannelRouter::new().route("echo", |args| async move { Ok(Value::Array(args)) });
        let outcome = invoker(router)
            .invoke("echo", &[json!(1), json!("two")], &CancellationToken::new())
            .await;
        match outcome {
            InvokeOutcome::Success(value) => assert_eq!(value, json!([1, "two"])),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_route_is_translated() {
        let outcome = invoker(ChannelRouter::new())
            .invoke("get-website-config", &[], &CancellationToken::new())
            .await;
        let friendly = outcome.failure().unwrap();
        assert_eq!(friendly.error_code, HANDLER_MISSING_CODE);
        assert_eq!(friendly.title, "Feature Unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_translated_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let router = ChannelRouter::new().route("read-website-file", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(NativeError::new("ENOENT: /home/bob/site/index.md").into()) }
        });

        let outcome = invoker(router)
            .invoke("read-website-file", &[], &CancellationToken::new())
            .await;
        let friendly = outcome.failure().unwrap();
        assert_eq!(friendly.title, "File Not Found");
        assert!(friendly.message.contains("index.md"));
        assert!(!friendly.message.contains("bob"));
        assert_eq!(friendly.context.channel.as_deref(), Some("read-website-file"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_yields_aborted() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let router = ChannelRouter::new().route("get-website-files", move |_| {
            token.cancel();
            async { Err(NativeError::new("ECONNRESET: socket hang up").into()) }
        });

        let outcome = invoker(router).invoke("get-website-files", &[], &cancel).await;
        assert!(outcome.is_aborted());
        assert!(outcome.failure().is_none());
    }
}
