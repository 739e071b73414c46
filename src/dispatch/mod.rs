//! Error registry and dispatcher.
//!
//! Handlers keyed by error name or `*`, a scoped context stack applied when
//! raw failures are wrapped, a breadcrumb trail, a bounded history of
//! captured errors, and best-effort remote reporting.

pub mod breadcrumbs;
pub mod handler;
pub mod registry;
pub mod reporter;

pub use breadcrumbs::{Breadcrumb, BreadcrumbLevel, RingBuffer};
pub use handler::{ErrorHandler, HandlerError, HandlerId, HandlerKey, HandlerResult};
pub use registry::{ContextGuard, DispatchSummary, ErrorRegistry};
pub use reporter::{
    report_with_retry, ErrorReport, RemoteReporter, ReportError, ReportResult, ReportingConfig,
};
