//! Integration tests for user-facing error translation.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use sitecraft::error::{ErrorCategory, NativeError, RawError, Severity, StructuredError};
use sitecraft::invoke::{ChannelRouter, InvokeOutcome, ResilientInvoker};
use sitecraft::retry::{InvocationRetryOrchestrator, RetryPolicyRegistry};
use sitecraft::translate::{
    Environment, ErrorTranslator, TranslateOptions, TranslatorConfig, REDACTED,
};

fn translator() -> ErrorTranslator {
    ErrorTranslator::new(TranslatorConfig::default())
}

// ============================================================================
// Sanitization Tests
// ============================================================================

#[test]
fn test_home_path_never_reaches_the_user() {
    let raw = RawError::Native(NativeError::new(
        "ENOENT: no such file or directory, open '/home/bob/site/index.md'",
    ));
    let friendly = translator().translate_raw(raw, &TranslateOptions::new());

    assert_eq!(friendly.error_code, "ENOENT");
    assert_eq!(friendly.title, "File Not Found");
    assert!(friendly.message.contains("index.md"));
    assert!(!friendly.message.contains("/home/bob"));
    assert!(!friendly.technical_message.contains("/home/bob"));
}

#[test]
fn test_mac_home_path_reduced_to_file_name() {
    let error = StructuredError::new(
        "EACCES: permission denied, open '/Users/alice/secret/file.txt'",
        "EACCES",
        ErrorCategory::FileSystem,
    );
    let friendly = translator().translate(&error, &TranslateOptions::new().show_details(true));

    assert_eq!(friendly.title, "Permission Denied");
    assert!(friendly.technical_message.contains("file.txt"));
    assert!(!friendly.technical_message.contains("alice"));
    assert!(!friendly.technical_message.contains("secret/"));
    assert!(friendly.show_details);
}

#[test]
fn test_secrets_redacted_from_technical_message() {
    let error = StructuredError::new(
        "publish failed: token=ghp_abc123 rejected",
        "PUBLISH_FAILED",
        ErrorCategory::ExternalService,
    );
    let friendly = translator().translate(&error, &TranslateOptions::new());

    assert!(!friendly.technical_message.contains("ghp_abc123"));
    assert!(friendly.technical_message.contains(REDACTED));
}

#[test]
fn test_long_messages_truncated() {
    let error = StructuredError::new("z".repeat(5000), "ODD_FAILURE", ErrorCategory::System);
    let friendly = ErrorTranslator::new(TranslatorConfig {
        environment: Environment::Production,
        max_message_length: 120,
    })
    .translate(&error, &TranslateOptions::new());

    assert!(friendly.technical_message.chars().count() <= 240);
    assert!(friendly.technical_message.ends_with("..."));
}

// ============================================================================
// Classification Tests
// ============================================================================

#[test]
fn test_specific_code_wins_over_generic_network_pattern() {
    let error = StructuredError::new(
        "network error: connect ECONNREFUSED 127.0.0.1:4000",
        "REQUEST_FAILED",
        ErrorCategory::Network,
    );
    let friendly = translator().translate(&error, &TranslateOptions::new());

    assert_eq!(friendly.title, "Connection Refused");
    assert!(friendly.is_retryable);
    assert_eq!(friendly.error_code, "REQUEST_FAILED");
}

#[test]
fn test_unknown_error_keeps_its_category_and_shows_details() {
    let error = StructuredError::builder("gremlins", "GREMLINS", ErrorCategory::BusinessLogic)
        .severity(Severity::Low)
        .build();
    let friendly = translator().translate(&error, &TranslateOptions::new());

    assert_eq!(friendly.title, "Something Went Wrong");
    assert_eq!(friendly.category, ErrorCategory::BusinessLogic);
    assert_eq!(friendly.severity, Severity::Low);
    assert!(friendly.show_details);
    assert!(friendly.technical_message.starts_with("[GREMLINS] gremlins"));
}

#[test]
fn test_stack_only_in_development() {
    let raw = || {
        RawError::Native(NativeError::new("boom").with_stack("at render (/srv/app/page.js:10:3)"))
    };

    let production = translator().translate_raw(raw(), &TranslateOptions::new());
    assert!(!production.technical_message.contains("render"));

    let development = ErrorTranslator::new(TranslatorConfig {
        environment: Environment::Development,
        ..TranslatorConfig::default()
    })
    .translate_raw(raw(), &TranslateOptions::new());
    assert!(development.technical_message.contains("at render"));
}

#[test]
fn test_friendly_json_uses_camel_case() {
    let error = StructuredError::new("refused", "ECONNREFUSED", ErrorCategory::Network);
    let friendly = translator().translate(&error, &TranslateOptions::new().channel("get-website-schema"));
    let value: Value = serde_json::to_value(&friendly).unwrap();

    assert_eq!(value["errorCode"], json!("ECONNREFUSED"));
    assert_eq!(value["isRetryable"], json!(true));
    assert_eq!(value["context"]["channel"], json!("get-website-schema"));
    assert!(value.get("original").is_none());
}

// ============================================================================
// End-to-end Invocation Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_invocation_is_translated_and_sanitized() {
    let router = ChannelRouter::new().route("read-website-file", |_args| async {
        Err(RawError::Native(NativeError::new(
            "ENOENT: no such file or directory, open '/home/bob/site/index.md'",
        )))
    });
    let invoker = ResilientInvoker::new(
        Arc::new(router),
        InvocationRetryOrchestrator::new(Arc::new(RetryPolicyRegistry::with_defaults())),
        Arc::new(translator()),
    );

    let outcome = invoker
        .invoke("read-website-file", &[json!("index.md")], &CancellationToken::new())
        .await;

    let friendly = match outcome {
        InvokeOutcome::Failure(friendly) => friendly,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(friendly.title, "File Not Found");
    assert_eq!(friendly.context.channel.as_deref(), Some("read-website-file"));
    assert_eq!(friendly.context.retry_count, 2);
    assert!(!friendly.message.contains("/home/bob"));
}
