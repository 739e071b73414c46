//! Structured error taxonomy.
//!
//! This module provides the structured error model shared by every other
//! subsystem: categories and severities, the [`StructuredError`] value with its
//! metadata and cause chain, wrapping of raw failures, the JSON wire schema,
//! and constructors for the application's common error shapes.

pub mod builders;
pub mod category;
pub mod raw;
pub mod structured;
pub mod wire;

// Re-export main types for convenient access
pub use builders::*;
pub use category::{ErrorCategory, Severity};
pub use raw::{
    category_for_code, infer_code, NativeError, RawError, INVALID_PAYLOAD_CODE,
    NON_ERROR_VALUE_CODE, UNKNOWN_ERROR_CODE,
};
pub use structured::{
    Cause, Chain, ErrorKind, ErrorMetadata, StructuredError, StructuredErrorBuilder,
};
pub use wire::{SchemaError, SerializedError, SerializedMetadata};
