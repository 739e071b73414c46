//! Error-to-user-message translation.
//!
//! Classification is two-phase: a code found in the [`MessageCatalog`] is
//! used directly, otherwise the message is matched against ordered
//! [`PatternRule`]s. The chosen template is rendered and every user-visible
//! string passes through the [`Sanitizer`].

pub mod catalog;
pub mod patterns;
pub mod sanitize;
pub mod translator;

pub use catalog::{ErrorMessageTemplate, MessageCatalog, TemplateContext, TemplateText, UNKNOWN_KEY};
pub use patterns::{PatternMatcher, PatternRule};
pub use sanitize::{truncate, Sanitizer, ELLIPSIS, REDACTED};
pub use translator::{
    Environment, ErrorTranslator, FriendlyContext, FriendlyError, TranslateOptions,
    TranslatorConfig, FALLBACK_MESSAGE,
};
