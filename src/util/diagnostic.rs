//! User-friendly diagnostic messages.
//!
//! Every user error is printed prefixed with the name of the invoking tool,
//! followed by any supporting detail and suggested fixes.

use std::fmt;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Name of the tool reporting the diagnostic
    pub program: Option<String>,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            program: None,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    /// Prefix the message with the name of the reporting tool.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        // An error reported by a tool reads "<tool>: <message>", anything
        // else keeps its severity.
        let prefix = match (&self.program, self.severity) {
            (Some(program), Severity::Error) => program.clone(),
            (Some(program), severity) => format!("{}: {}", program, severity),
            (None, severity) => severity.to_string(),
        };

        if color {
            let code = match self.severity {
                Severity::Error => "\x1b[1;31m",
                Severity::Warning => "\x1b[1;33m",
            };
            output.push_str(&format!("{}{}\x1b[0m: {}\n", code, prefix, self.message));
        } else {
            output.push_str(&format!("{}: {}\n", prefix, self.message));
        }

        for ctx in &self.context {
            output.push_str(&format!("  → {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("unknown enabled bindings 'QtFoo'")
            .with_program("sip-build")
            .with_context("the project defines the bindings QtCore, QtGui")
            .with_suggestion("Remove 'QtFoo' from `enable`");

        let output = diag.format(false);
        assert!(output.starts_with("sip-build: unknown enabled bindings 'QtFoo'"));
        assert!(output.contains("QtCore, QtGui"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Remove 'QtFoo'"));
    }

    #[test]
    fn test_warning_keeps_severity() {
        let diag = Diagnostic::warning("build directory kept").with_program("sip-wheel");
        assert!(diag
            .format(false)
            .starts_with("sip-wheel: warning: build directory kept"));
    }
}
