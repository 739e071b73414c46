//! Raw failures and their one-time wrapping into structured errors.
//!
//! An operation can fail with three shapes of value: an already-structured
//! error, a native error (message plus an optional errno-style code), or an
//! arbitrary non-error value. [`RawError`] names those shapes explicitly and
//! [`RawError::into_structured`] wraps each of them exactly once.

use serde_json::Value;
use std::fmt;
use std::io;
use std::sync::Arc;

use super::{ErrorCategory, SerializedError, Severity, StructuredError};

/// Code given to native errors with no recognisable code.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Code given to failures that were not errors at all.
pub const NON_ERROR_VALUE_CODE: &str = "NON_ERROR_VALUE";

/// Code given to payloads that could not be decoded.
pub const INVALID_PAYLOAD_CODE: &str = "INVALID_PAYLOAD";

/// Known errno-style codes and the category each one implies.
const KNOWN_CODES: &[(&str, ErrorCategory)] = &[
    ("ENOENT", ErrorCategory::FileSystem),
    ("EACCES", ErrorCategory::FileSystem),
    ("EPERM", ErrorCategory::FileSystem),
    ("EEXIST", ErrorCategory::FileSystem),
    ("ENOSPC", ErrorCategory::FileSystem),
    ("EISDIR", ErrorCategory::FileSystem),
    ("ENOTDIR", ErrorCategory::FileSystem),
    ("ENOTEMPTY", ErrorCategory::FileSystem),
    ("EMFILE", ErrorCategory::FileSystem),
    ("EBUSY", ErrorCategory::FileSystem),
    ("EROFS", ErrorCategory::FileSystem),
    ("ECONNREFUSED", ErrorCategory::Network),
    ("ECONNRESET", ErrorCategory::Network),
    ("ECONNABORTED", ErrorCategory::Network),
    ("ETIMEDOUT", ErrorCategory::Network),
    ("ENOTFOUND", ErrorCategory::Network),
    ("EAI_AGAIN", ErrorCategory::Network),
    ("EPIPE", ErrorCategory::Network),
    ("EHOSTUNREACH", ErrorCategory::Network),
    ("ENETUNREACH", ErrorCategory::Network),
    ("EADDRINUSE", ErrorCategory::Server),
    (INVALID_PAYLOAD_CODE, ErrorCategory::Ipc),
];

/// Returns the category implied by an errno-style code, if it is a known one.
pub fn category_for_code(code: &str) -> Option<ErrorCategory> {
    KNOWN_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, category)| *category)
}

/// Finds the first known errno-style code mentioned in a message,
/// e.g. `ENOENT` in `"ENOENT: no such file or directory"`.
pub fn infer_code(message: &str) -> Option<&'static str> {
    message
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .find_map(|token| {
            KNOWN_CODES
                .iter()
                .find(|(known, _)| *known == token)
                .map(|(known, _)| *known)
        })
}

/// A native (unstructured) error: a message, maybe a code, maybe a stack.
#[derive(Clone)]
pub struct NativeError {
    /// Type name reported by the failing side, e.g. `Error` or `TypeError`.
    pub name: String,
    pub message: String,
    pub code: Option<String>,
    pub stack: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            code: None,
            stack: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Keeps the originating Rust error so it stays reachable via `source()`.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// The explicit code, or one inferred from the message.
    pub fn effective_code(&self) -> Option<String> {
        self.code
            .clone()
            .or_else(|| infer_code(&self.message).map(str::to_string))
    }
}

impl fmt::Debug for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeError")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("code", &self.code)
            .finish()
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for NativeError {}

/// Any value an operation can fail with.
#[derive(Clone, Debug)]
pub enum RawError {
    /// Already structured; wrapping only merges context.
    Structured(StructuredError),
    /// A native error.
    Native(NativeError),
    /// Something that was not an error at all.
    Value(Value),
}

impl RawError {
    /// Decodes a value received across a process boundary.
    ///
    /// Values that validate against the wire schema become structured errors;
    /// objects with a string `message` become native errors; anything else is
    /// kept as a non-error value.
    pub fn from_wire(value: Value) -> Self {
        if let Ok(record) = SerializedError::validate(&value) {
            return RawError::Structured(StructuredError::from_serialized(record));
        }

        if let Some(object) = value.as_object() {
            if let Some(message) = object.get("message").and_then(Value::as_str) {
                let mut native = NativeError::new(message);
                if let Some(name) = object.get("name").and_then(Value::as_str) {
                    native = native.with_name(name);
                }
                if let Some(code) = object.get("code").and_then(Value::as_str) {
                    native = native.with_code(code);
                }
                if let Some(stack) = object.get("stack").and_then(Value::as_str) {
                    native = native.with_stack(stack);
                }
                return RawError::Native(native);
            }
        }

        RawError::Value(value)
    }

    /// A human-readable message for any shape.
    pub fn message(&self) -> String {
        match self {
            RawError::Structured(err) => err.message().to_string(),
            RawError::Native(err) => err.message.clone(),
            RawError::Value(Value::String(s)) => s.clone(),
            RawError::Value(other) => other.to_string(),
        }
    }

    /// The machine code carried or implied by this failure, if any.
    pub fn code(&self) -> Option<String> {
        match self {
            RawError::Structured(err) => Some(err.code().to_string()),
            RawError::Native(err) => err.effective_code(),
            RawError::Value(_) => None,
        }
    }

    /// Wraps this failure into a structured error.
    ///
    /// Structured errors pass through untouched, so wrapping twice never nests.
    pub fn into_structured(self) -> StructuredError {
        match self {
            RawError::Structured(err) => err,
            RawError::Native(native) => wrap_native(native),
            RawError::Value(value) => {
                let message = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                StructuredError::builder(message, NON_ERROR_VALUE_CODE, ErrorCategory::System)
                    .severity(Severity::Medium)
                    .context("thrownValue", value)
                    .build()
            }
        }
    }
}

fn wrap_native(native: NativeError) -> StructuredError {
    let code = native.effective_code();
    let (code, category) = match code {
        Some(code) => {
            let category = category_for_code(&code).unwrap_or(ErrorCategory::System);
            (code, category)
        }
        None => (UNKNOWN_ERROR_CODE.to_string(), ErrorCategory::System),
    };

    let mut builder = StructuredError::builder(native.message, code, category)
        .context("nativeName", native.name);
    if let Some(stack) = native.stack {
        builder = builder.stack(stack);
    }
    if let Some(source) = native.source {
        builder = builder.cause_value(Some(super::Cause::Native(source)));
    }
    builder.build()
}

impl From<StructuredError> for RawError {
    fn from(err: StructuredError) -> Self {
        RawError::Structured(err)
    }
}

impl From<NativeError> for RawError {
    fn from(err: NativeError) -> Self {
        RawError::Native(err)
    }
}

impl From<io::Error> for RawError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => Some("ENOENT"),
            io::ErrorKind::PermissionDenied => Some("EACCES"),
            io::ErrorKind::AlreadyExists => Some("EEXIST"),
            io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
            io::ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
            io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
            io::ErrorKind::AddrInUse => Some("EADDRINUSE"),
            io::ErrorKind::BrokenPipe => Some("EPIPE"),
            _ => None,
        };
        let mut native = NativeError::new(err.to_string()).with_name("IoError");
        if let Some(code) = code {
            native = native.with_code(code);
        }
        RawError::Native(native.with_source(err))
    }
}

impl From<serde_json::Error> for RawError {
    fn from(err: serde_json::Error) -> Self {
        RawError::Native(
            NativeError::new(err.to_string())
                .with_name("SyntaxError")
                .with_code(INVALID_PAYLOAD_CODE)
                .with_source(err),
        )
    }
}

impl From<String> for RawError {
    fn from(value: String) -> Self {
        RawError::Value(Value::String(value))
    }
}

impl From<&str> for RawError {
    fn from(value: &str) -> Self {
        RawError::Value(Value::String(value.to_string()))
    }
}

impl From<Value> for RawError {
    fn from(value: Value) -> Self {
        RawError::from_wire(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_code_from_message() {
        assert_eq!(infer_code("ENOENT: no such file or directory"), Some("ENOENT"));
        assert_eq!(infer_code("connect ECONNREFUSED 127.0.0.1:4000"), Some("ECONNREFUSED"));
        assert_eq!(infer_code("getaddrinfo EAI_AGAIN example.com"), Some("EAI_AGAIN"));
        assert_eq!(infer_code("something odd happened"), None);
        assert_eq!(infer_code("XENOENTX"), None);
    }

    #[test]
    fn test_native_wrap_uses_code_category() {
        let err = RawError::from(NativeError::new("ENOENT: /home/bob/site/index.md")).into_structured();
        assert_eq!(err.code(), "ENOENT");
        assert_eq!(err.category(), ErrorCategory::FileSystem);
        assert_eq!(err.message(), "ENOENT: /home/bob/site/index.md");
        assert_eq!(err.metadata().context.get("nativeName"), Some(&json!("Error")));
    }

    #[test]
    fn test_native_without_code_is_unknown_system_error() {
        let err = RawError::from(NativeError::new("kaboom")).into_structured();
        assert_eq!(err.code(), UNKNOWN_ERROR_CODE);
        assert_eq!(err.category(), ErrorCategory::System);
        assert_eq!(err.severity(), Severity::High);
    }

    #[test]
    fn test_native_with_unknown_code_keeps_code() {
        let err = RawError::from(NativeError::new("bad arg").with_code("ERR_INVALID_ARG_TYPE"))
            .into_structured();
        assert_eq!(err.code(), "ERR_INVALID_ARG_TYPE");
        assert_eq!(err.category(), ErrorCategory::System);
    }

    #[test]
    fn test_non_error_value_is_wrapped() {
        let err = RawError::from(json!({"status": 500})).into_structured();
        assert_eq!(err.code(), NON_ERROR_VALUE_CODE);
        assert_eq!(err.category(), ErrorCategory::System);
        assert_eq!(err.message(), "{\"status\":500}");

        let err = RawError::from("plain string").into_structured();
        assert_eq!(err.message(), "plain string");
    }

    #[test]
    fn test_structured_wrap_is_identity() {
        let original = StructuredError::new("refused", "ECONNREFUSED", ErrorCategory::Network);
        let once = RawError::from(original.clone()).into_structured();
        let twice = RawError::from(once.clone()).into_structured();

        assert_eq!(twice.code(), original.code());
        assert_eq!(twice.category(), original.category());
        assert_eq!(twice.severity(), original.severity());
        assert!(twice.cause().is_none());
    }

    #[test]
    fn test_io_error_maps_kind_to_code() {
        let io = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = RawError::from(io).into_structured();
        assert_eq!(err.code(), "ECONNREFUSED");
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_from_wire_validates_structured_records() {
        let structured = json!({
            "name": "DnsError", "message": "lookup failed", "code": "DNS_LOOKUP_FAILED",
            "category": "DNS", "severity": "LOW", "metadata": {"retryCount": 1}
        });
        match RawError::from_wire(structured) {
            RawError::Structured(err) => {
                assert_eq!(err.category(), ErrorCategory::Dns);
                assert_eq!(err.retry_count(), 1);
            }
            other => panic!("expected structured, got {:?}", other),
        }

        // Has code/category but fails the schema: treated as native, not structured.
        let lookalike = json!({"message": "refused", "code": "ECONNREFUSED", "category": "NETWORK"});
        match RawError::from_wire(lookalike) {
            RawError::Native(native) => assert_eq!(native.code.as_deref(), Some("ECONNREFUSED")),
            other => panic!("expected native, got {:?}", other),
        }

        assert!(matches!(RawError::from_wire(json!(42)), RawError::Value(_)));
    }
}
