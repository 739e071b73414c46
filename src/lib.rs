//! Sitecraft - resilient invocation and error-handling core
//!
//! Structured errors, per-channel retry policies with a cancellable retry
//! orchestrator, sanitized user-facing error translation, sampled telemetry
//! batching and a central error registry.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitecraft::retry::{InvocationRetryOrchestrator, RetryPolicyRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let orchestrator =
//!     InvocationRetryOrchestrator::new(Arc::new(RetryPolicyRegistry::with_defaults()));
//! let outcome = orchestrator
//!     .execute("get-website-schema", &CancellationToken::new(), |_attempt| async {
//!         Ok::<_, sitecraft::error::StructuredError>("schema")
//!     })
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod invoke;
pub mod logging;
pub mod retry;
pub mod telemetry;
pub mod translate;
