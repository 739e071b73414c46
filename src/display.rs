//! Terminal rendering of friendly errors.
//!
//! Renders `{title, message, suggestion}` and, when the error asks for it,
//! the technical details below them.

use owo_colors::{OwoColorize, Rgb};

use crate::error::Severity;
use crate::translate::FriendlyError;

/// Color palette for error output.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    /// Critical and high severity - red (239, 68, 68)
    pub error: Rgb,
    /// Medium severity - yellow (234, 179, 8)
    pub warning: Rgb,
    /// Low severity - blue (59, 130, 246)
    pub info: Rgb,
    /// Suggestions - green (34, 197, 94)
    pub suggestion: Rgb,
    /// Details and codes - gray (107, 114, 128)
    pub muted: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            error: Rgb(239, 68, 68),
            warning: Rgb(234, 179, 8),
            info: Rgb(59, 130, 246),
            suggestion: Rgb(34, 197, 94),
            muted: Rgb(107, 114, 128),
        }
    }
}

impl Theme {
    pub fn for_severity(&self, severity: Severity) -> Rgb {
        match severity {
            Severity::Critical | Severity::High => self.error,
            Severity::Medium => self.warning,
            Severity::Low => self.info,
        }
    }
}

/// Renders friendly errors as terminal text.
#[derive(Debug, Clone, Default)]
pub struct FriendlyRenderer {
    theme: Theme,
    use_color: bool,
}

impl FriendlyRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, enabled: bool) -> Self {
        self.use_color = enabled;
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn render(&self, friendly: &FriendlyError) -> String {
        let mut out = String::new();
        let code = format!("[{}]", friendly.error_code);

        if self.use_color {
            let color = self.theme.for_severity(friendly.severity);
            out.push_str(&format!(
                "{} {}\n",
                friendly.title.color(color).bold(),
                code.color(self.theme.muted)
            ));
        } else {
            out.push_str(&format!("{} {}\n", friendly.title, code));
        }
        out.push_str(&friendly.message);
        out.push('\n');

        if let Some(suggestion) = &friendly.suggestion {
            if self.use_color {
                out.push_str(&format!("{}\n", suggestion.color(self.theme.suggestion)));
            } else {
                out.push_str(&format!("{}\n", suggestion));
            }
        }

        let mut actions = Vec::new();
        if friendly.is_retryable {
            actions.push("retry");
        }
        if friendly.is_dismissible {
            actions.push("dismiss");
        }
        if !actions.is_empty() {
            out.push_str(&format!("Actions: {}\n", actions.join(", ")));
        }

        if friendly.show_details {
            out.push('\n');
            for line in friendly.technical_message.lines() {
                if self.use_color {
                    out.push_str(&format!("  {}\n", line.color(self.theme.muted)));
                } else {
                    out.push_str(&format!("  {}\n", line));
                }
            }
        }
        out
    }
}
