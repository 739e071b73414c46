//! Error categories and severities for the structured error taxonomy.
//!
//! Every structured error carries exactly one category and one severity. The
//! category decides the recovery strategy, the severity decides how loudly the
//! error is surfaced and whether it can be recovered from at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The primary category of a structured error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Process-level or runtime failures.
    System,
    /// Connectivity failures (refused, reset, timed out, unresolved host).
    Network,
    /// Local file access failures.
    FileSystem,
    /// Invalid user or caller input.
    Validation,
    /// Broken or missing configuration.
    Configuration,
    /// A rule of the application was violated.
    BusinessLogic,
    /// A third-party service misbehaved.
    ExternalService,
    /// Website project management failures.
    Website,
    /// Preview server failures.
    Server,
    /// Domain name resolution failures.
    Dns,
    /// TLS certificate failures.
    Certificate,
    /// A multi-step operation failed and was rolled back.
    AtomicOperation,
    /// The invocation boundary itself failed (missing handler, bad payload).
    Ipc,
}

impl ErrorCategory {
    /// All known categories, in declaration order.
    pub const ALL: [ErrorCategory; 13] = [
        ErrorCategory::System,
        ErrorCategory::Network,
        ErrorCategory::FileSystem,
        ErrorCategory::Validation,
        ErrorCategory::Configuration,
        ErrorCategory::BusinessLogic,
        ErrorCategory::ExternalService,
        ErrorCategory::Website,
        ErrorCategory::Server,
        ErrorCategory::Dns,
        ErrorCategory::Certificate,
        ErrorCategory::AtomicOperation,
        ErrorCategory::Ipc,
    ];

    /// The severity an error of this category gets when none is given.
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorCategory::System
            | ErrorCategory::Server
            | ErrorCategory::Certificate
            | ErrorCategory::AtomicOperation => Severity::High,
            _ => Severity::Medium,
        }
    }

    /// The wire name, e.g. `FILE_SYSTEM`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::System => "SYSTEM",
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::FileSystem => "FILE_SYSTEM",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Configuration => "CONFIGURATION",
            ErrorCategory::BusinessLogic => "BUSINESS_LOGIC",
            ErrorCategory::ExternalService => "EXTERNAL_SERVICE",
            ErrorCategory::Website => "WEBSITE",
            ErrorCategory::Server => "SERVER",
            ErrorCategory::Dns => "DNS",
            ErrorCategory::Certificate => "CERTIFICATE",
            ErrorCategory::AtomicOperation => "ATOMIC_OPERATION",
            ErrorCategory::Ipc => "IPC",
        }
    }

    /// The default type name of errors in this category, e.g. `NetworkError`.
    pub fn type_name(self) -> &'static str {
        match self {
            ErrorCategory::System => "SystemError",
            ErrorCategory::Network => "NetworkError",
            ErrorCategory::FileSystem => "FileSystemError",
            ErrorCategory::Validation => "ValidationError",
            ErrorCategory::Configuration => "ConfigurationError",
            ErrorCategory::BusinessLogic => "BusinessLogicError",
            ErrorCategory::ExternalService => "ExternalServiceError",
            ErrorCategory::Website => "WebsiteError",
            ErrorCategory::Server => "ServerError",
            ErrorCategory::Dns => "DnsError",
            ErrorCategory::Certificate => "CertificateError",
            ErrorCategory::AtomicOperation => "AtomicOperationError",
            ErrorCategory::Ipc => "IpcError",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown error category: {}", s))
    }
}

/// How serious an error is. Ordered from least to most severe.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// The wire name, e.g. `HIGH`.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}
