//! The catalog of user-facing message templates, keyed by error code.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorCategory, Severity};

/// Catalog key used when nothing else matches.
pub const UNKNOWN_KEY: &str = "UNKNOWN";

/// Values a template can draw on when rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateContext {
    pub channel: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    /// Base name of the file involved, if one could be determined.
    pub filename: Option<String>,
    pub retry_count: u32,
    pub max_retries: Option<u32>,
    /// Context entries carried by the structured error.
    pub details: BTreeMap<String, Value>,
}

impl TemplateContext {
    /// A context entry as text, if present and a string or number.
    pub fn detail(&self, key: &str) -> Option<String> {
        match self.details.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn file_label(&self) -> String {
        match &self.filename {
            Some(name) => format!("\"{}\"", name),
            None => "the requested file".to_string(),
        }
    }
}

type RenderFn = dyn Fn(&TemplateContext) -> String + Send + Sync;

/// A message or suggestion: fixed text or a function of the context.
#[derive(Clone)]
pub enum TemplateText {
    Literal(String),
    Render(Arc<RenderFn>),
}

impl TemplateText {
    pub fn literal(text: impl Into<String>) -> Self {
        TemplateText::Literal(text.into())
    }

    pub fn render_with<F>(render: F) -> Self
    where
        F: Fn(&TemplateContext) -> String + Send + Sync + 'static,
    {
        TemplateText::Render(Arc::new(render))
    }

    /// Produces the text. Render functions may panic; callers isolate them.
    pub fn render(&self, context: &TemplateContext) -> String {
        match self {
            TemplateText::Literal(text) => text.clone(),
            TemplateText::Render(render) => render(context),
        }
    }
}

impl fmt::Debug for TemplateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateText::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            TemplateText::Render(_) => f.write_str("Render(..)"),
        }
    }
}

/// One catalog entry.
#[derive(Clone, Debug)]
pub struct ErrorMessageTemplate {
    pub title: String,
    pub message: TemplateText,
    pub suggestion: Option<TemplateText>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub is_retryable: bool,
    pub is_dismissible: bool,
}

impl ErrorMessageTemplate {
    /// A dismissible, non-retryable template with a literal message.
    pub fn new(
        title: impl Into<String>,
        message: TemplateText,
        category: ErrorCategory,
        severity: Severity,
    ) -> Self {
        Self {
            title: title.into(),
            message,
            suggestion: None,
            category,
            severity,
            is_retryable: false,
            is_dismissible: true,
        }
    }

    pub fn suggestion(mut self, suggestion: TemplateText) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.is_retryable = retryable;
        self
    }

    pub fn dismissible(mut self, dismissible: bool) -> Self {
        self.is_dismissible = dismissible;
        self
    }
}

/// Read-only lookup from code to template.
#[derive(Clone, Debug)]
pub struct MessageCatalog {
    templates: HashMap<String, ErrorMessageTemplate>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MessageCatalog {
    /// An empty catalog apart from the [`UNKNOWN_KEY`] entry.
    pub fn empty() -> Self {
        let mut templates = HashMap::new();
        templates.insert(UNKNOWN_KEY.to_string(), unknown_template());
        Self { templates }
    }

    /// Adds or replaces the template for `code`.
    pub fn with_template(mut self, code: impl Into<String>, template: ErrorMessageTemplate) -> Self {
        self.templates.insert(code.into(), template);
        self
    }

    pub fn get(&self, code: &str) -> Option<&ErrorMessageTemplate> {
        self.templates.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.templates.contains_key(code)
    }

    /// The fallback template. Always present.
    pub fn unknown(&self) -> ErrorMessageTemplate {
        self.templates
            .get(UNKNOWN_KEY)
            .cloned()
            .unwrap_or_else(unknown_template)
    }

    /// All codes, sorted.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// The application's built-in catalog.
    pub fn builtin() -> Self {
        use ErrorCategory::*;
        use Severity::*;
        use TemplateText as T;

        Self::empty()
            // File system
            .with_template(
                "ENOENT",
                ErrorMessageTemplate::new(
                    "File Not Found",
                    T::render_with(|ctx| format!("{} could not be found.", capitalize(&ctx.file_label()))),
                    FileSystem,
                    Medium,
                )
                .suggestion(T::literal("Check that the file exists and has not been moved or renamed.")),
            )
            .with_template(
                "EACCES",
                ErrorMessageTemplate::new(
                    "Permission Denied",
                    T::render_with(|ctx| format!("You don't have permission to access {}.", ctx.file_label())),
                    FileSystem,
                    High,
                )
                .suggestion(T::literal("Check the file permissions or choose a different location.")),
            )
            .with_template(
                "EEXIST",
                ErrorMessageTemplate::new(
                    "File Already Exists",
                    T::render_with(|ctx| format!("{} already exists.", capitalize(&ctx.file_label()))),
                    FileSystem,
                    Low,
                )
                .suggestion(T::literal("Choose a different name or remove the existing file first.")),
            )
            .with_template(
                "ENOSPC",
                ErrorMessageTemplate::new(
                    "Disk Full",
                    T::literal("There is not enough disk space to complete this operation."),
                    FileSystem,
                    High,
                )
                .suggestion(T::literal("Free up some disk space and try again."))
                .retryable(true),
            )
            // Network
            .with_template(
                "ECONNREFUSED",
                ErrorMessageTemplate::new(
                    "Connection Refused",
                    T::render_with(|ctx| match ctx.detail("service") {
                        Some(service) => format!("Could not connect to {}.", service),
                        None => "Could not connect to the server.".to_string(),
                    }),
                    Network,
                    Medium,
                )
                .suggestion(T::literal("Make sure the server is running, then try again."))
                .retryable(true),
            )
            .with_template(
                "ETIMEDOUT",
                ErrorMessageTemplate::new(
                    "Request Timed Out",
                    T::literal("The operation took too long to respond."),
                    Network,
                    Medium,
                )
                .suggestion(T::render_with(|ctx| match ctx.max_retries {
                    Some(max) if max > 0 && ctx.retry_count >= max => {
                        format!("Retried {} times without success. Check your connection.", max)
                    }
                    _ => "Check your internet connection and try again.".to_string(),
                }))
                .retryable(true),
            )
            .with_template(
                "ENOTFOUND",
                ErrorMessageTemplate::new(
                    "Host Not Found",
                    T::literal("The server address could not be found."),
                    Network,
                    Medium,
                )
                .suggestion(T::literal("Check the address and your internet connection."))
                .retryable(true),
            )
            .with_template(
                "ECONNRESET",
                ErrorMessageTemplate::new(
                    "Connection Lost",
                    T::literal("The connection was interrupted."),
                    Network,
                    Medium,
                )
                .suggestion(T::literal("Try again in a moment."))
                .retryable(true),
            )
            .with_template(
                "NETWORK_ERROR",
                ErrorMessageTemplate::new(
                    "Network Error",
                    T::literal("A network problem prevented the operation from completing."),
                    Network,
                    Medium,
                )
                .suggestion(T::literal("Check your internet connection and try again."))
                .retryable(true),
            )
            // Input and configuration
            .with_template(
                "VALIDATION_ERROR",
                ErrorMessageTemplate::new(
                    "Invalid Input",
                    T::render_with(|ctx| match ctx.detail("field") {
                        Some(field) => format!("The value for \"{}\" is not valid.", field),
                        None => "Some of the information entered is not valid.".to_string(),
                    }),
                    Validation,
                    Low,
                )
                .suggestion(T::literal("Review the highlighted fields and try again.")),
            )
            .with_template(
                "CONFIGURATION_ERROR",
                ErrorMessageTemplate::new(
                    "Configuration Problem",
                    T::render_with(|ctx| match ctx.detail("configKey") {
                        Some(key) => format!("The setting \"{}\" is missing or invalid.", key),
                        None => "The application settings are missing or invalid.".to_string(),
                    }),
                    Configuration,
                    Medium,
                )
                .suggestion(T::literal("Review your settings or restore the defaults.")),
            )
            // Websites
            .with_template(
                "WEBSITE_NOT_FOUND",
                ErrorMessageTemplate::new(
                    "Website Not Found",
                    T::literal("The website could not be found. It may have been moved or deleted."),
                    Website,
                    Medium,
                )
                .suggestion(T::literal("Choose another website from the list or create a new one.")),
            )
            .with_template(
                "WEBSITE_BUILD_FAILED",
                ErrorMessageTemplate::new(
                    "Build Failed",
                    T::literal("The website could not be built."),
                    Website,
                    High,
                )
                .suggestion(T::literal("Check the build output for errors in your content or theme."))
                .retryable(true),
            )
            .with_template(
                "SCHEMA_PARSE_ERROR",
                ErrorMessageTemplate::new(
                    "Invalid Website Schema",
                    T::literal("The website's schema could not be read."),
                    Website,
                    Medium,
                )
                .suggestion(T::literal("Check the schema file for syntax errors.")),
            )
            // Server and infrastructure
            .with_template(
                "EADDRINUSE",
                ErrorMessageTemplate::new(
                    "Port In Use",
                    T::render_with(|ctx| match ctx.detail("port") {
                        Some(port) => format!("Port {} is already in use by another program.", port),
                        None => "The preview server port is already in use.".to_string(),
                    }),
                    Server,
                    High,
                )
                .suggestion(T::literal("Close the other program or pick a different port."))
                .retryable(true),
            )
            .with_template(
                "DNS_RESOLUTION_FAILED",
                ErrorMessageTemplate::new(
                    "Domain Lookup Failed",
                    T::render_with(|ctx| match ctx.detail("domain") {
                        Some(domain) => format!("The domain \"{}\" could not be resolved.", domain),
                        None => "The domain could not be resolved.".to_string(),
                    }),
                    Dns,
                    Medium,
                )
                .suggestion(T::literal("DNS changes can take a while to propagate. Try again later."))
                .retryable(true),
            )
            .with_template(
                "CERTIFICATE_INVALID",
                ErrorMessageTemplate::new(
                    "Certificate Problem",
                    T::literal("The security certificate is invalid or has expired."),
                    Certificate,
                    High,
                )
                .suggestion(T::literal("Renew the certificate or check the domain settings.")),
            )
            .with_template(
                "ATOMIC_OPERATION_FAILED",
                ErrorMessageTemplate::new(
                    "Operation Incomplete",
                    T::render_with(|ctx| match ctx.detail("rolledBack").as_deref() {
                        Some("true") => {
                            "The operation failed and all changes were undone.".to_string()
                        }
                        _ => "The operation failed part-way through.".to_string(),
                    }),
                    AtomicOperation,
                    High,
                )
                .suggestion(T::literal("Review recent changes before trying again."))
                .dismissible(false),
            )
            .with_template(
                "IPC_HANDLER_MISSING",
                ErrorMessageTemplate::new(
                    "Feature Unavailable",
                    T::literal("This feature is not available right now."),
                    Ipc,
                    High,
                )
                .suggestion(T::literal("Restart the application and try again.")),
            )
    }
}

fn unknown_template() -> ErrorMessageTemplate {
    ErrorMessageTemplate::new(
        "Something Went Wrong",
        TemplateText::literal("An unexpected error occurred."),
        ErrorCategory::System,
        Severity::Medium,
    )
    .suggestion(TemplateText::literal(
        "Try again. If the problem continues, restart the application.",
    ))
    .retryable(true)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_has_expected_codes() {
        let catalog = MessageCatalog::builtin();
        for code in [
            "ENOENT",
            "EACCES",
            "ECONNREFUSED",
            "ETIMEDOUT",
            "VALIDATION_ERROR",
            "WEBSITE_NOT_FOUND",
            "EADDRINUSE",
            "DNS_RESOLUTION_FAILED",
            UNKNOWN_KEY,
        ] {
            assert!(catalog.contains(code), "missing {}", code);
        }
        assert_eq!(catalog.get("ENOENT").unwrap().title, "File Not Found");
    }

    #[test]
    fn test_render_uses_filename() {
        let catalog = MessageCatalog::builtin();
        let ctx = TemplateContext {
            filename: Some("index.md".to_string()),
            ..Default::default()
        };
        let message = catalog.get("ENOENT").unwrap().message.render(&ctx);
        assert_eq!(message, "\"index.md\" could not be found.");

        let message = catalog.get("ENOENT").unwrap().message.render(&TemplateContext::default());
        assert_eq!(message, "The requested file could not be found.");
    }

    #[test]
    fn test_render_uses_details() {
        let catalog = MessageCatalog::builtin();
        let mut ctx = TemplateContext::default();
        ctx.details.insert("port".to_string(), json!(4000));
        let message = catalog.get("EADDRINUSE").unwrap().message.render(&ctx);
        assert!(message.contains("4000"));
    }

    #[test]
    fn test_timeout_suggestion_mentions_exhausted_retries() {
        let catalog = MessageCatalog::builtin();
        let ctx = TemplateContext {
            retry_count: 3,
            max_retries: Some(3),
            ..Default::default()
        };
        let suggestion = catalog.get("ETIMEDOUT").unwrap().suggestion.as_ref().unwrap();
        assert!(suggestion.render(&ctx).starts_with("Retried 3 times"));
    }

    #[test]
    fn test_custom_template_overrides() {
        let catalog = MessageCatalog::builtin().with_template(
            "ENOENT",
            ErrorMessageTemplate::new(
                "Missing",
                TemplateText::literal("gone"),
                ErrorCategory::FileSystem,
                Severity::Low,
            ),
        );
        assert_eq!(catalog.get("ENOENT").unwrap().title, "Missing");
        assert_eq!(catalog.unknown().title, "Something Went Wrong");
    }
}
