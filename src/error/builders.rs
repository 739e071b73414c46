//! Constructors for the common error shapes of the application.
//!
//! Each function returns a plain [`StructuredError`] with the right category,
//! a stable code and the metadata callers usually have at hand.

use super::{ErrorCategory, Severity, StructuredError};

pub fn system_error(message: impl Into<String>, code: impl Into<String>) -> StructuredError {
    StructuredError::new(message, code, ErrorCategory::System)
}

pub fn network_error(message: impl Into<String>, code: impl Into<String>) -> StructuredError {
    StructuredError::new(message, code, ErrorCategory::Network)
}

/// A file system error about `path`. The path is recorded as the resource.
pub fn file_system_error(
    message: impl Into<String>,
    code: impl Into<String>,
    path: impl Into<String>,
) -> StructuredError {
    StructuredError::builder(message, code, ErrorCategory::FileSystem)
        .resource(path)
        .build()
}

/// A validation error about a single input field.
pub fn validation_error(message: impl Into<String>, field: impl Into<String>) -> StructuredError {
    StructuredError::builder(message, "VALIDATION_ERROR", ErrorCategory::Validation)
        .context("field", field.into())
        .build()
}

pub fn configuration_error(
    message: impl Into<String>,
    key: impl Into<String>,
) -> StructuredError {
    StructuredError::builder(message, "CONFIGURATION_ERROR", ErrorCategory::Configuration)
        .context("configKey", key.into())
        .build()
}

pub fn business_logic_error(
    message: impl Into<String>,
    code: impl Into<String>,
) -> StructuredError {
    StructuredError::new(message, code, ErrorCategory::BusinessLogic)
}

pub fn external_service_error(
    message: impl Into<String>,
    service: impl Into<String>,
) -> StructuredError {
    StructuredError::builder(message, "EXTERNAL_SERVICE_ERROR", ErrorCategory::ExternalService)
        .context("service", service.into())
        .build()
}

/// A website error; `website_id` becomes the resource.
pub fn website_error(
    message: impl Into<String>,
    code: impl Into<String>,
    website_id: impl Into<String>,
) -> StructuredError {
    StructuredError::builder(message, code, ErrorCategory::Website)
        .resource(website_id)
        .build()
}

pub fn website_not_found(website_id: impl Into<String>) -> StructuredError {
    let website_id = website_id.into();
    StructuredError::builder(
        format!("Website {} does not exist", website_id),
        "WEBSITE_NOT_FOUND",
        ErrorCategory::Website,
    )
    .severity(Severity::Medium)
    .resource(website_id)
    .build()
}

/// A preview server error on `port`.
pub fn server_error(message: impl Into<String>, code: impl Into<String>, port: u16) -> StructuredError {
    StructuredError::builder(message, code, ErrorCategory::Server)
        .context("port", port)
        .build()
}

pub fn dns_error(message: impl Into<String>, domain: impl Into<String>) -> StructuredError {
    let domain = domain.into();
    StructuredError::builder(message, "DNS_RESOLUTION_FAILED", ErrorCategory::Dns)
        .resource(domain.clone())
        .context("domain", domain)
        .build()
}

pub fn certificate_error(message: impl Into<String>, domain: impl Into<String>) -> StructuredError {
    StructuredError::builder(message, "CERTIFICATE_INVALID", ErrorCategory::Certificate)
        .resource(domain)
        .build()
}

/// A multi-step operation failure. `step_errors` are kept as inner errors.
pub fn atomic_operation_error(
    message: impl Into<String>,
    operation: impl Into<String>,
    rolled_back: bool,
    step_errors: Vec<StructuredError>,
) -> StructuredError {
    let mut builder = StructuredError::builder(
        message,
        "ATOMIC_OPERATION_FAILED",
        ErrorCategory::AtomicOperation,
    )
    .operation(operation)
    .context("rolledBack", rolled_back);
    if !rolled_back {
        builder = builder.severity(Severity::Critical);
    }
    for step in step_errors {
        builder = builder.inner_error(step);
    }
    builder.build()
}
