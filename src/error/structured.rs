//! The structured error value at the center of the taxonomy.
//!
//! A [`StructuredError`] carries a stable machine code, a category, a severity
//! and metadata. Values are immutable once built: every `with_*` method returns
//! a new error and leaves the original untouched, and the construction
//! timestamp is never changed after the builder runs.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{ErrorCategory, Severity};

/// Exponent cap for category-driven exponential backoff (2^5 s = 32 s).
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Fixed retry delay for file system errors.
const FILE_SYSTEM_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Contextual metadata attached to a structured error.
#[derive(Clone, Debug)]
pub struct ErrorMetadata {
    timestamp: DateTime<Utc>,
    /// Name of the operation (channel) that produced the error.
    pub operation: Option<String>,
    /// Identifier of the resource involved, e.g. a file path or website id.
    pub resource: Option<String>,
    /// Free-form context values.
    pub context: BTreeMap<String, Value>,
    /// How many retries had happened when the error was observed.
    pub retry_count: u32,
    /// Errors aggregated under this one (e.g. per-step failures of a batch).
    pub inner_errors: Vec<StructuredError>,
}

impl ErrorMetadata {
    fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            operation: None,
            resource: None,
            context: BTreeMap::new(),
            retry_count: 0,
            inner_errors: Vec::new(),
        }
    }

    /// When the owning error was constructed.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// The cause of a structured error.
#[derive(Clone, Debug)]
pub enum Cause {
    /// A prior structured error; serialized recursively.
    Structured(Box<StructuredError>),
    /// A native error; kept for `source()` but omitted from serialization.
    Native(Arc<dyn std::error::Error + Send + Sync>),
}

impl Cause {
    /// The structured error behind this cause, if any.
    pub fn as_structured(&self) -> Option<&StructuredError> {
        match self {
            Cause::Structured(err) => Some(err),
            Cause::Native(_) => None,
        }
    }
}

/// What to look for when walking an error's cause chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind<'a> {
    /// Match a machine code, e.g. `ENOENT`.
    Code(&'a str),
    /// Match a category.
    Category(ErrorCategory),
    /// Match a type name, e.g. `NetworkError`.
    Name(&'a str),
}

/// A structured, serializable error with category, severity and metadata.
#[derive(Clone, Debug)]
pub struct StructuredError {
    name: String,
    message: String,
    code: String,
    category: ErrorCategory,
    severity: Severity,
    metadata: ErrorMetadata,
    cause: Option<Cause>,
    stack: Option<String>,
}

impl StructuredError {
    /// Creates an error with the category's default severity.
    pub fn new(
        message: impl Into<String>,
        code: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self::builder(message, code, category).build()
    }

    /// Starts building an error.
    pub fn builder(
        message: impl Into<String>,
        code: impl Into<String>,
        category: ErrorCategory,
    ) -> StructuredErrorBuilder {
        StructuredErrorBuilder::new(message, code, category)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn metadata(&self) -> &ErrorMetadata {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }

    pub fn retry_count(&self) -> u32 {
        self.metadata.retry_count
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Returns a copy with `key = value` merged into the context.
    pub fn with_context(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.metadata.context.insert(key.into(), value.into());
        next
    }

    /// Returns a copy with every entry of `context` merged in; new values win.
    pub fn with_context_map<I, K>(&self, context: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut next = self.clone();
        for (key, value) in context {
            next.metadata.context.insert(key.into(), value);
        }
        next
    }

    /// Returns a copy with the retry count replaced.
    pub fn with_retry_count(&self, retry_count: u32) -> Self {
        let mut next = self.clone();
        next.metadata.retry_count = retry_count;
        next
    }

    /// Returns a copy with the operation set, unless one is already recorded.
    pub fn with_default_operation(&self, operation: &str) -> Self {
        let mut next = self.clone();
        if next.metadata.operation.is_none() {
            next.metadata.operation = Some(operation.to_string());
        }
        next
    }

    /// Returns a copy with the resource replaced.
    pub fn with_resource(&self, resource: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.metadata.resource = Some(resource.into());
        next
    }

    /// Whether the error can be recovered from automatically.
    ///
    /// Critical errors never are. Network, external service and validation
    /// errors always are. System and configuration errors are unless high
    /// severity; everything else only at low or medium severity.
    pub fn is_recoverable(&self) -> bool {
        if self.severity == Severity::Critical {
            return false;
        }
        match self.category {
            ErrorCategory::Network | ErrorCategory::ExternalService => true,
            ErrorCategory::Validation => true,
            ErrorCategory::System | ErrorCategory::Configuration => self.severity != Severity::High,
            _ => self.severity <= Severity::Medium,
        }
    }

    /// The delay this error suggests before the next retry, if any.
    ///
    /// `None` means either "do not retry" (unrecoverable) or "use the policy
    /// default"; callers check [`is_recoverable`](Self::is_recoverable) to
    /// tell them apart.
    pub fn retry_delay(&self) -> Option<Duration> {
        if !self.is_recoverable() {
            return None;
        }
        match self.category {
            ErrorCategory::Network | ErrorCategory::ExternalService => {
                let exponent = self.metadata.retry_count.min(MAX_BACKOFF_EXPONENT);
                Some(Duration::from_millis((1u64 << exponent) * 1000))
            }
            ErrorCategory::FileSystem => Some(FILE_SYSTEM_RETRY_DELAY),
            _ => None,
        }
    }

    /// Iterates this error followed by every structured cause beneath it.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    /// Whether this error or any structured cause matches `kind`.
    pub fn matches(&self, kind: ErrorKind<'_>) -> bool {
        self.chain().any(|err| match kind {
            ErrorKind::Code(code) => err.code == code,
            ErrorKind::Category(category) => err.category == category,
            ErrorKind::Name(name) => err.name == name,
        })
    }

    /// The deepest structured error in the cause chain (`self` if none).
    pub fn root_cause(&self) -> &StructuredError {
        let mut root = self;
        for err in self.chain() {
            root = err;
        }
        root
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StructuredError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(Cause::Structured(err)) => Some(err.as_ref()),
            Some(Cause::Native(err)) => Some(err.as_ref()),
            None => None,
        }
    }
}

/// Iterator over an error and its structured causes.
pub struct Chain<'a> {
    next: Option<&'a StructuredError>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a StructuredError;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.cause.as_ref().and_then(Cause::as_structured);
        Some(current)
    }
}

/// Builder for [`StructuredError`].
#[derive(Debug)]
pub struct StructuredErrorBuilder {
    name: Option<String>,
    message: String,
    code: String,
    category: ErrorCategory,
    severity: Option<Severity>,
    timestamp: Option<DateTime<Utc>>,
    operation: Option<String>,
    resource: Option<String>,
    context: BTreeMap<String, Value>,
    retry_count: u32,
    inner_errors: Vec<StructuredError>,
    cause: Option<Cause>,
    stack: Option<String>,
    capture_stack: bool,
}

impl StructuredErrorBuilder {
    fn new(message: impl Into<String>, code: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            name: None,
            message: message.into(),
            code: code.into(),
            category,
            severity: None,
            timestamp: None,
            operation: None,
            resource: None,
            context: BTreeMap::new(),
            retry_count: 0,
            inner_errors: Vec::new(),
            cause: None,
            stack: None,
            capture_stack: true,
        }
    }

    /// Overrides the type name (defaults to the category's type name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn inner_error(mut self, error: StructuredError) -> Self {
        self.inner_errors.push(error);
        self
    }

    /// Sets a structured cause. The new error owns it exclusively.
    pub fn cause(mut self, cause: StructuredError) -> Self {
        self.cause = Some(Cause::Structured(Box::new(cause)));
        self
    }

    /// Sets a native cause.
    pub fn native_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Cause::Native(Arc::new(cause)));
        self
    }

    pub(crate) fn cause_value(mut self, cause: Option<Cause>) -> Self {
        self.cause = cause;
        self
    }

    /// Uses an existing stack trace instead of capturing one.
    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Sets the stack exactly as given, without capturing a fresh one.
    pub(crate) fn stack_value(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self.capture_stack = false;
        self
    }

    /// Restores a timestamp recorded elsewhere, e.g. when decoding the wire format.
    pub(crate) fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> StructuredError {
        let mut metadata = ErrorMetadata::at(self.timestamp.unwrap_or_else(Utc::now));
        metadata.operation = self.operation;
        metadata.resource = self.resource;
        metadata.context = self.context;
        metadata.retry_count = self.retry_count;
        metadata.inner_errors = self.inner_errors;

        StructuredError {
            name: self
                .name
                .unwrap_or_else(|| self.category.type_name().to_string()),
            message: self.message,
            code: self.code,
            category: self.category,
            severity: self
                .severity
                .unwrap_or_else(|| self.category.default_severity()),
            metadata,
            cause: self.cause,
            stack: if self.capture_stack {
                self.stack.or_else(capture_stack)
            } else {
                self.stack
            },
        }
    }
}

fn capture_stack() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}
