//! Turns any error into a [`FriendlyError`] a user can be shown.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use tracing::{debug, warn};

use super::catalog::{ErrorMessageTemplate, MessageCatalog, TemplateContext, UNKNOWN_KEY};
use super::patterns::PatternMatcher;
use super::sanitize::{first_file_name, Sanitizer, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::error::{ErrorCategory, RawError, Severity, StructuredError};

/// Shown when a template fails to render.
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred while describing this problem.";

/// Where the application runs; decides whether stacks are shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Translator settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatorConfig {
    pub environment: Environment,
    /// Cap for user-facing messages; technical messages get twice this.
    pub max_message_length: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Caller-supplied context for one translation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    pub channel: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    /// Overrides the default of showing details only for unknown errors.
    pub show_details: Option<bool>,
}

impl TranslateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
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

    pub fn retries(mut self, retry_count: u32, max_retries: u32) -> Self {
        self.retry_count = Some(retry_count);
        self.max_retries = Some(max_retries);
        self
    }

    pub fn show_details(mut self, show: bool) -> Self {
        self.show_details = Some(show);
        self
    }
}

/// Where the failure happened, as shown alongside a friendly error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub retry_count: u32,
}

/// The sanitized, user-facing rendering of an error.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyError {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub technical_message: String,
    pub error_code: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub is_retryable: bool,
    pub is_dismissible: bool,
    pub show_details: bool,
    pub context: FriendlyContext,
    /// The translated error, for logging only. Never displayed.
    #[serde(skip)]
    pub original: StructuredError,
}

/// Classifies errors and renders catalog templates for them.
#[derive(Debug, Default)]
pub struct ErrorTranslator {
    catalog: MessageCatalog,
    patterns: PatternMatcher,
    sanitizer: Sanitizer,
    environment: Environment,
}

impl ErrorTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self {
            catalog: MessageCatalog::builtin(),
            patterns: PatternMatcher::new(),
            sanitizer: Sanitizer::new(config.max_message_length),
            environment: config.environment,
        }
    }

    pub fn with_catalog(mut self, catalog: MessageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_patterns(mut self, patterns: PatternMatcher) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    /// The catalog key for `error`.
    ///
    /// A code present in the catalog wins, checked down the cause chain.
    /// Otherwise messages are matched against the ordered patterns. Falls
    /// back to [`UNKNOWN_KEY`].
    pub fn classify(&self, error: &StructuredError) -> String {
        if let Some(err) = error.chain().find(|err| self.catalog.contains(err.code())) {
            return err.code().to_string();
        }
        error
            .chain()
            .find_map(|err| self.patterns.classify(err.message()))
            .filter(|key| self.catalog.contains(key))
            .unwrap_or(UNKNOWN_KEY)
            .to_string()
    }

    /// Translates any raw failure.
    pub fn translate_raw(&self, raw: RawError, options: &TranslateOptions) -> FriendlyError {
        self.translate(&raw.into_structured(), options)
    }

    /// Translates a structured error. Never panics on template failures.
    pub fn translate(&self, error: &StructuredError, options: &TranslateOptions) -> FriendlyError {
        let key = self.classify(error);
        let is_unknown = key == UNKNOWN_KEY;
        let template = match self.catalog.get(&key) {
            Some(template) => template.clone(),
            None => self.catalog.unknown(),
        };
        debug!(code = error.code(), key = %key, "translating error");

        let context = self.template_context(error, options);
        let (message, suggestion) = render(&template, &context);

        let (category, severity) = if is_unknown {
            (error.category(), error.severity())
        } else {
            (template.category, template.severity)
        };

        FriendlyError {
            title: template.title.clone(),
            message: self.sanitizer.sanitize_message(&message),
            suggestion: suggestion.map(|s| self.sanitizer.sanitize_message(&s)),
            technical_message: self.technical_message(error),
            error_code: error.code().to_string(),
            category,
            severity,
            is_retryable: template.is_retryable,
            is_dismissible: template.is_dismissible,
            show_details: options.show_details.unwrap_or(is_unknown),
            context: FriendlyContext {
                channel: options.channel.clone(),
                operation: context.operation.clone(),
                resource: context
                    .resource
                    .as_deref()
                    .map(|r| self.sanitizer.sanitize_message(r)),
                retry_count: context.retry_count,
            },
            original: error.clone(),
        }
    }

    fn template_context(&self, error: &StructuredError, options: &TranslateOptions) -> TemplateContext {
        let metadata = error.metadata();
        let resource = options.resource.clone().or_else(|| metadata.resource.clone());
        let filename = resource
            .as_deref()
            .and_then(first_file_name)
            .or_else(|| error.chain().find_map(|err| first_file_name(err.message())));

        TemplateContext {
            channel: options.channel.clone(),
            operation: options.operation.clone().or_else(|| metadata.operation.clone()),
            resource,
            filename,
            retry_count: options.retry_count.unwrap_or(metadata.retry_count),
            max_retries: options.max_retries,
            details: metadata.context.clone(),
        }
    }

    fn technical_message(&self, error: &StructuredError) -> String {
        let mut text = format!("[{}] {}", error.code(), error.message());
        if self.environment == Environment::Development {
            if let Some(stack) = error.stack() {
                text.push('\n');
                text.push_str(stack);
            }
        }
        self.sanitizer.sanitize_technical(&text)
    }
}

fn render(template: &ErrorMessageTemplate, context: &TemplateContext) -> (String, Option<String>) {
    let rendered = catch_unwind(AssertUnwindSafe(|| {
        let message = template.message.render(context);
        let suggestion = template.suggestion.as_ref().map(|s| s.render(context));
        (message, suggestion)
    }));
    match rendered {
        Ok(rendered) => rendered,
        Err(_) => {
            warn!(title = %template.title, "message template panicked, using fallback");
            (FALLBACK_MESSAGE.to_string(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        file_system_error, network_error, validation_error, ErrorCategory, NativeError,
    };
    use crate::translate::catalog::TemplateText;

    fn translator() -> ErrorTranslator {
        ErrorTranslator::new(TranslatorConfig::default())
    }

    #[test]
    fn test_direct_code_lookup() {
        let err = validation_error("Title is required", "title");
        let friendly = translator().translate(&err, &TranslateOptions::new());
        assert_eq!(friendly.title, "Invalid Input");
        assert_eq!(friendly.message, "The value for \"title\" is not valid.");
        assert!(!friendly.show_details);
    }

    #[test]
    fn test_pattern_fallback() {
        let err = StructuredError::new(
            "upstream said: connection refused",
            "UPSTREAM_FAILURE",
            ErrorCategory::ExternalService,
        );
        let t = translator();
        assert_eq!(t.classify(&err), "ECONNREFUSED");
        assert!(t.translate(&err, &TranslateOptions::new()).is_retryable);
    }

    #[test]
    fn test_code_found_in_cause_chain() {
        let cause = file_system_error("missing", "ENOENT", "/srv/site/about.md");
        let err = StructuredError::builder("load failed", "PAGE_LOAD", ErrorCategory::Website)
            .cause(cause)
            .build();
        assert_eq!(translator().classify(&err), "ENOENT");
    }

    #[test]
    fn test_unknown_shows_details_by_default() {
        let err = StructuredError::new("the flux capacitor overheated", "FLUX", ErrorCategory::System);
        let friendly = translator().translate(&err, &TranslateOptions::new());
        assert_eq!(friendly.title, "Something Went Wrong");
        assert!(friendly.show_details);
        assert_eq!(friendly.category, ErrorCategory::System);

        let hidden = translator().translate(&err, &TranslateOptions::new().show_details(false));
        assert!(!hidden.show_details);
    }

    #[test]
    fn test_panicking_template_falls_back() {
        let catalog = MessageCatalog::builtin().with_template(
            "EXPLODES",
            ErrorMessageTemplate::new(
                "Boom",
                TemplateText::render_with(|_| panic!("template bug")),
                ErrorCategory::System,
                Severity::Low,
            ),
        );
        let t = translator().with_catalog(catalog);
        let err = StructuredError::new("x", "EXPLODES", ErrorCategory::System);
        let friendly = t.translate(&err, &TranslateOptions::new());
        assert_eq!(friendly.title, "Boom");
        assert_eq!(friendly.message, FALLBACK_MESSAGE);
    }

    #[test]
    fn test_stack_only_in_development() {
        let err = StructuredError::builder("boom", "FLUX", ErrorCategory::System)
            .stack("at render (/Users/dana/app/src/main.rs:10)")
            .build();

        let prod = translator().translate(&err, &TranslateOptions::new());
        assert_eq!(prod.technical_message, "[FLUX] boom");

        let dev = ErrorTranslator::new(TranslatorConfig {
            environment: Environment::Development,
            ..Default::default()
        })
        .translate(&err, &TranslateOptions::new());
        assert!(dev.technical_message.contains("main.rs"));
        assert!(!dev.technical_message.contains("dana"));
    }

    #[test]
    fn test_context_from_options_and_metadata() {
        let err = network_error("timed out", "ETIMEDOUT").with_retry_count(2);
        let friendly = translator().translate(
            &err,
            &TranslateOptions::new().channel("get-website-files").operation("load files"),
        );
        assert_eq!(friendly.context.channel.as_deref(), Some("get-website-files"));
        assert_eq!(friendly.context.operation.as_deref(), Some("load files"));
        assert_eq!(friendly.context.retry_count, 2);
    }

    #[test]
    fn test_native_error_translated() {
        let raw = NativeError::new("EACCES: permission denied, open '/home/erin/site/a.md'");
        let friendly = translator().translate_raw(raw.into(), &TranslateOptions::new());
        assert_eq!(friendly.title, "Permission Denied");
        assert!(friendly.message.contains("a.md"));
        assert!(!friendly.technical_message.contains("erin"));
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
    }
}
