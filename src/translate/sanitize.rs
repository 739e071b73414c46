//! Scrubbing of text before it reaches a user.
//!
//! Paths under a user's home or temp directory are cut down to their base
//! name, `key=value` secrets are redacted, and text is truncated.

use regex::{Captures, Regex};

/// Appended to truncated user-facing text.
pub const ELLIPSIS: &str = "...";

/// Replacement for redacted secret values.
pub const REDACTED: &str = "[REDACTED]";

/// Default cap for user-facing messages, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;

/// Removes user paths and secrets from text and bounds its length.
#[derive(Debug)]
pub struct Sanitizer {
    max_message_length: usize,
    home_path: Regex,
    temp_path: Regex,
    windows_home_path: Regex,
    secret: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LENGTH)
    }
}

impl Sanitizer {
    /// Creates a sanitizer truncating messages to `max_message_length`
    /// characters and technical text to twice that.
    ///
    /// # Panics
    /// Panics if a built-in regex pattern is invalid.
    pub fn new(max_message_length: usize) -> Self {
        Self {
            max_message_length,
            home_path: Regex::new(r#"(?:/Users|/home)/[^\s'"`,;()\[\]<>]+"#)
                .expect("Invalid regex pattern"),
            temp_path: Regex::new(r#"(?:/private)?/var/folders/[^\s'"`,;()\[\]<>]+"#)
                .expect("Invalid regex pattern"),
            windows_home_path: Regex::new(r#"(?i)[a-z]:\\Users\\[^\s'"`,;()\[\]<>]+"#)
                .expect("Invalid regex pattern"),
            secret: Regex::new(
                r#"(?i)\b([\w-]*(?:token|password|passwd|pwd|api[_-]?key|secret|auth)[\w-]*)(\s*[=:]\s*)(?:bearer\s+)?("[^"]*"|'[^']*'|[^\s&,;]+)"#,
            )
            .expect("Invalid regex pattern"),
        }
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    pub fn max_technical_length(&self) -> usize {
        self.max_message_length.saturating_mul(2)
    }

    /// Reduces user-home and temp paths to their base name.
    pub fn strip_paths(&self, text: &str) -> String {
        let text = self
            .temp_path
            .replace_all(text, |caps: &Captures| reduce_path(&caps[0], 0));
        let text = self
            .home_path
            .replace_all(&text, |caps: &Captures| reduce_path(&caps[0], 2));
        self.windows_home_path
            .replace_all(&text, |caps: &Captures| reduce_path(&caps[0], 3))
            .into_owned()
    }

    /// Replaces the value of every `key=value` secret with [`REDACTED`].
    pub fn redact_secrets(&self, text: &str) -> String {
        self.secret
            .replace_all(text, |caps: &Captures| {
                format!("{}{}{}", &caps[1], &caps[2], REDACTED)
            })
            .into_owned()
    }

    /// Paths and secrets removed, length untouched.
    pub fn scrub(&self, text: &str) -> String {
        self.strip_paths(&self.redact_secrets(text))
    }

    /// Scrubbed and truncated to the message limit.
    pub fn sanitize_message(&self, text: &str) -> String {
        truncate(&self.scrub(text), self.max_message_length)
    }

    /// Scrubbed and truncated to the technical limit.
    pub fn sanitize_technical(&self, text: &str) -> String {
        truncate(&self.scrub(text), self.max_technical_length())
    }
}

/// Cuts `text` to at most `max_chars` characters, ending in [`ELLIPSIS`]
/// when anything was dropped and the limit leaves room for it.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Base name of a path, or `~` when the path stops at the home directory
/// itself (`prefix_segments` counts the segments up to and including it).
fn reduce_path(path: &str, prefix_segments: usize) -> String {
    let trimmed = path.trim_end_matches(['.', ':']);
    let trailing = &path[trimmed.len()..];
    let segments: Vec<&str> = trimmed
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();

    let reduced = match segments.last() {
        Some(last) if segments.len() > prefix_segments => (*last).to_string(),
        _ => "~".to_string(),
    };
    format!("{}{}", reduced, trailing)
}

/// The base name of the first path-like token in `text`.
pub fn first_file_name(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '`' | ',' | ';' | '(' | ')'))
        .filter(|token| token.contains('/') || token.contains('\\'))
        .find_map(|token| {
            token
                .trim_end_matches(['.', ':'])
                .rsplit(['/', '\\'])
                .find(|segment| !segment.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_home_paths_reduced() {
        let s = Sanitizer::default();
        let out = s.strip_paths("cannot open /Users/alice/secret/file.txt now");
        assert_eq!(out, "cannot open file.txt now");
        let out = s.strip_paths("ENOENT: /home/bob/site/index.md");
        assert_eq!(out, "ENOENT: index.md");
    }

    #[test]
    fn test_bare_home_dir_hidden() {
        let s = Sanitizer::default();
        assert_eq!(s.strip_paths("in /home/bob."), "in ~.");
    }

    #[test]
    fn test_temp_and_windows_paths_reduced() {
        let s = Sanitizer::default();
        assert_eq!(
            s.strip_paths("wrote /private/var/folders/xy/T/build-123/out.html"),
            "wrote out.html"
        );
        assert_eq!(
            s.strip_paths(r"open C:\Users\carol\Sites\blog\config.toml failed"),
            "open config.toml failed"
        );
    }

    #[test]
    fn test_other_paths_untouched() {
        let s = Sanitizer::default();
        assert_eq!(s.strip_paths("/etc/hosts missing"), "/etc/hosts missing");
    }

    #[test]
    fn test_secrets_redacted() {
        let s = Sanitizer::default();
        assert_eq!(
            s.redact_secrets("request failed token=abc123&page=2"),
            "request failed token=[REDACTED]&page=2"
        );
        assert_eq!(
            s.redact_secrets("password: \"hunter 2\" rejected"),
            "password: [REDACTED] rejected"
        );
        assert_eq!(
            s.redact_secrets("Authorization: Bearer eyJhbGci.payload"),
            "Authorization: [REDACTED]"
        );
        assert_eq!(s.redact_secrets("API_KEY=sk-live-9"), "API_KEY=[REDACTED]");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        let out = truncate(&"x".repeat(600), 500);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_tiny_limits_never_exceeded() {
        assert_eq!(truncate("hello world", 3), "hel");
        assert_eq!(truncate("hello world", 0), "");
        assert_eq!(truncate("hello world", 4), "h...");
        assert_eq!(Sanitizer::new(2).sanitize_message("hello world"), "he");
    }

    #[test]
    fn test_technical_limit_is_double() {
        let s = Sanitizer::new(100);
        assert_eq!(s.sanitize_technical(&"y".repeat(1000)).chars().count(), 200);
        assert_eq!(s.sanitize_message(&"y".repeat(1000)).chars().count(), 100);
    }

    #[test]
    fn test_first_file_name() {
        assert_eq!(
            first_file_name("ENOENT: no such file, open '/home/bob/site/index.md'").as_deref(),
            Some("index.md")
        );
        assert_eq!(first_file_name("nothing here"), None);
    }
}
