//! Ordered message patterns for errors without a known code.
//!
//! Rules are tried in order and the first match wins, so specific rules
//! (an exact errno name) must come before generic ones ("connection").

use regex::Regex;

/// A regex that maps a matching message to a catalog key.
#[derive(Debug)]
pub struct PatternRule {
    regex: Regex,
    key: String,
    description: String,
}

impl PatternRule {
    /// Creates a new rule.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn new(pattern: &str, key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
            key: key.into(),
            description: description.into(),
        }
    }

    /// Creates a rule from a pre-compiled regex.
    pub fn with_regex(regex: Regex, key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            regex,
            key: key.into(),
            description: description.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Classifies messages against an ordered list of [`PatternRule`]s.
#[derive(Debug)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Creates a matcher with the built-in rules.
    pub fn new() -> Self {
        Self {
            rules: Self::default_rules(),
        }
    }

    pub fn with_rules(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// The key of the first rule matching `message`.
    pub fn classify(&self, message: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(message))
            .map(PatternRule::key)
    }

    fn default_rules() -> Vec<PatternRule> {
        vec![
            // Exact errno names and their usual phrasing
            PatternRule::new(
                r"(?i)\beconnrefused\b|connection\s+refused",
                "ECONNREFUSED",
                "Connection refused",
            ),
            PatternRule::new(
                r"(?i)\beconnreset\b|connection\s+(was\s+)?reset|socket\s+hang\s+up",
                "ECONNRESET",
                "Connection reset",
            ),
            PatternRule::new(
                r"(?i)\betimedout\b|\btimed?\s*out\b",
                "ETIMEDOUT",
                "Operation timed out",
            ),
            PatternRule::new(
                r"(?i)\benotfound\b|getaddrinfo",
                "ENOTFOUND",
                "Host lookup failed",
            ),
            PatternRule::new(
                r"(?i)\beaddrinuse\b|address\s+already\s+in\s+use|port\s+\d+\s+is\s+(already\s+)?in\s+use",
                "EADDRINUSE",
                "Port already in use",
            ),
            PatternRule::new(
                r"(?i)\benoent\b|no\s+such\s+file|file\s+not\s+found",
                "ENOENT",
                "Missing file",
            ),
            PatternRule::new(
                r"(?i)\beacces\b|\beperm\b|permission\s+denied|operation\s+not\s+permitted",
                "EACCES",
                "Permission denied",
            ),
            PatternRule::new(
                r"(?i)\beexist\b|already\s+exists",
                "EEXIST",
                "File already exists",
            ),
            PatternRule::new(
                r"(?i)\benospc\b|no\s+space\s+left",
                "ENOSPC",
                "Disk full",
            ),
            // Domain phrasing
            PatternRule::new(
                r"(?i)certificate|\bssl\b|\btls\b",
                "CERTIFICATE_INVALID",
                "Certificate problem",
            ),
            PatternRule::new(
                r"(?i)\bdns\b|resolve\s+domain",
                "DNS_RESOLUTION_FAILED",
                "DNS resolution failure",
            ),
            PatternRule::new(
                r"(?i)website\s+\S*\s*(not\s+found|does\s+not\s+exist)",
                "WEBSITE_NOT_FOUND",
                "Unknown website",
            ),
            PatternRule::new(
                r"(?i)build\s+failed|failed\s+to\s+build",
                "WEBSITE_BUILD_FAILED",
                "Site build failure",
            ),
            PatternRule::new(
                r"(?i)no\s+handler\s+(registered|found)",
                "IPC_HANDLER_MISSING",
                "Missing invocation handler",
            ),
            PatternRule::new(
                r"(?i)schema",
                "SCHEMA_PARSE_ERROR",
                "Schema problem",
            ),
            PatternRule::new(
                r"(?i)\b(invalid|validation|required)\b",
                "VALIDATION_ERROR",
                "Invalid input",
            ),
            PatternRule::new(
                r"(?i)\bconfig(uration)?\b",
                "CONFIGURATION_ERROR",
                "Configuration problem",
            ),
            // Generic network phrasing last
            PatternRule::new(
                r"(?i)network|connection|socket|fetch\s+failed",
                "NETWORK_ERROR",
                "Generic network failure",
            ),
        ]
    }
}
