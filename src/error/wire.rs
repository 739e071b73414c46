//! Serialized error wire format.
//!
//! Errors crossing a process boundary travel as JSON records of the shape
//! `{name, message, code, category, severity, metadata, cause?, stack?}`.
//! Both sides validate that shape structurally instead of guessing from
//! whichever fields happen to be present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{Cause, ErrorCategory, Severity, StructuredError};

/// Errors produced when a JSON value does not follow the wire schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The value is not a JSON object.
    #[error("serialized error must be a JSON object")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but has the wrong type or an unknown value.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The value passed the structural checks but could not be decoded.
    #[error("malformed serialized error: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Wire representation of [`ErrorMetadata`](super::ErrorMetadata).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedMetadata {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_errors: Vec<SerializedError>,
}

/// Wire representation of a [`StructuredError`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    pub code: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub metadata: SerializedMetadata,
    /// Present only when the cause is itself a structured error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializedError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedError {
    /// Validates `value` against the wire schema and decodes it.
    pub fn validate(value: &Value) -> Result<Self, SchemaError> {
        let object = value.as_object().ok_or(SchemaError::NotAnObject)?;

        for field in ["name", "message", "code"] {
            match object.get(field) {
                Some(Value::String(_)) => {}
                Some(_) => return Err(invalid(field, "expected a string")),
                None => return Err(SchemaError::MissingField(field)),
            }
        }

        let category = object
            .get("category")
            .ok_or(SchemaError::MissingField("category"))?;
        category
            .as_str()
            .ok_or_else(|| invalid("category", "expected a string"))?
            .parse::<ErrorCategory>()
            .map_err(|reason| invalid("category", reason))?;

        let severity = object
            .get("severity")
            .ok_or(SchemaError::MissingField("severity"))?;
        severity
            .as_str()
            .ok_or_else(|| invalid("severity", "expected a string"))?
            .parse::<Severity>()
            .map_err(|reason| invalid("severity", reason))?;

        match object.get("metadata") {
            Some(Value::Object(_)) => {}
            Some(_) => return Err(invalid("metadata", "expected an object")),
            None => return Err(SchemaError::MissingField("metadata")),
        }

        if let Some(cause) = object.get("cause") {
            if !cause.is_null() {
                Self::validate(cause).map_err(|err| invalid("cause", err.to_string()))?;
            }
        }

        Ok(serde_json::from_value(value.clone())?)
    }

    /// Encodes this record as JSON.
    pub fn to_json(&self) -> Value {
        // Every field is a plain string, number, map or nested record.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidField {
        field,
        reason: reason.into(),
    }
}

impl StructuredError {
    /// Converts this error to its wire record.
    ///
    /// Structured causes are serialized recursively; native causes are omitted.
    pub fn to_serialized(&self) -> SerializedError {
        let metadata = self.metadata();
        SerializedError {
            name: self.name().to_string(),
            message: self.message().to_string(),
            code: self.code().to_string(),
            category: self.category(),
            severity: self.severity(),
            metadata: SerializedMetadata {
                timestamp: metadata.timestamp(),
                operation: metadata.operation.clone(),
                resource: metadata.resource.clone(),
                context: metadata.context.clone(),
                retry_count: metadata.retry_count,
                inner_errors: metadata
                    .inner_errors
                    .iter()
                    .map(StructuredError::to_serialized)
                    .collect(),
            },
            cause: self
                .cause()
                .and_then(Cause::as_structured)
                .map(|cause| Box::new(cause.to_serialized())),
            stack: self.stack().map(str::to_string),
        }
    }

    /// Rebuilds an error from its wire record, keeping the recorded timestamp.
    pub fn from_serialized(record: SerializedError) -> Self {
        let SerializedError {
            name,
            message,
            code,
            category,
            severity,
            metadata,
            cause,
            stack,
        } = record;

        let mut builder = StructuredError::builder(message, code, category)
            .name(name)
            .severity(severity)
            .timestamp(metadata.timestamp)
            .retry_count(metadata.retry_count)
            .cause_value(cause.map(|c| Cause::Structured(Box::new(Self::from_serialized(*c)))));

        if let Some(operation) = metadata.operation {
            builder = builder.operation(operation);
        }
        if let Some(resource) = metadata.resource {
            builder = builder.resource(resource);
        }
        for (key, value) in metadata.context {
            builder = builder.context(key, value);
        }
        for inner in metadata.inner_errors {
            builder = builder.inner_error(Self::from_serialized(inner));
        }
        // An absent stack stays absent; the receiving side must not invent one.
        builder.stack_value(stack).build()
    }

    /// Encodes this error as a wire JSON value.
    pub fn to_json(&self) -> Value {
        self.to_serialized().to_json()
    }

    /// Validates and decodes a wire JSON value.
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        SerializedError::validate(value).map(Self::from_serialized)
    }
}
