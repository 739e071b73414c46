//! Error handler contract.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::error::StructuredError;

/// A handler failed to process an error.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler panicked")]
    Panicked,
}

/// Result type for error handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// What a handler is registered for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    /// Errors whose name matches exactly, e.g. `NetworkError`.
    Name(String),
    /// Every error. Written `*`.
    Wildcard,
}

impl HandlerKey {
    pub fn parse(key: &str) -> Self {
        if key == "*" {
            HandlerKey::Wildcard
        } else {
            HandlerKey::Name(key.to_string())
        }
    }
}

impl From<&str> for HandlerKey {
    fn from(key: &str) -> Self {
        HandlerKey::parse(key)
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKey::Name(name) => write!(f, "{}", name),
            HandlerKey::Wildcard => write!(f, "*"),
        }
    }
}

/// Identifies a registration so it can be removed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

/// Reacts to captured errors.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: &StructuredError) -> HandlerResult<()>;
}
