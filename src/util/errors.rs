//! User-facing error taxonomy.
//!
//! Anything that is a [`UserError`] is reported as a short message (plus
//! optional detail) and the process exits with code 1. Every other error is
//! treated as an internal error of the tool itself.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// An error caused by the user's configuration or environment.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum UserError {
    #[error("'{name}' is not a valid option in the [{section}] section")]
    #[diagnostic(code(sipbuild::config::unknown_option))]
    UnknownOption { name: String, section: String },

    #[error("{}: must be defined", qualified(.name, .section))]
    #[diagnostic(code(sipbuild::config::undefined_option))]
    UndefinedOption {
        name: String,
        section: Option<String>,
    },

    #[error("{}: {message}", qualified(.name, .section))]
    #[diagnostic(code(sipbuild::config::invalid_option))]
    InvalidOption {
        name: String,
        section: Option<String>,
        message: String,
        detail: Option<String>,
    },

    #[error("'{0}' is not a valid ABI version")]
    #[diagnostic(code(sipbuild::abi::invalid))]
    InvalidAbiVersion(String),

    #[error("'{0}' is not a supported ABI version")]
    #[diagnostic(code(sipbuild::abi::unsupported))]
    UnsupportedAbiVersion(String),

    #[error("'{0}' is not a supported ABI major version")]
    #[diagnostic(code(sipbuild::abi::unsupported_major))]
    UnsupportedAbiMajorVersion(String),

    #[error("unknown enabled bindings '{0}'")]
    #[diagnostic(code(sipbuild::bindings::unknown_enabled))]
    UnknownEnabledBindings(String),

    #[error("unknown disabled bindings '{0}'")]
    #[diagnostic(code(sipbuild::bindings::unknown_disabled))]
    UnknownDisabledBindings(String),

    #[error("'{command}' failed returning {}", exit_code(.code))]
    #[diagnostic(code(sipbuild::process::failed))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("{text}")]
    Message { text: String, detail: Option<String> },
}

fn qualified(name: &str, section: &Option<String>) -> String {
    match section {
        Some(section) => format!("'{}.{}'", section, name),
        None => format!("'{}'", name),
    }
}

fn exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "a signal".to_string())
}

impl UserError {
    /// A plain user error.
    pub fn new(text: impl Into<String>) -> Self {
        UserError::Message {
            text: text.into(),
            detail: None,
        }
    }

    /// A plain user error with supporting detail.
    pub fn with_detail(text: impl Into<String>, detail: impl Into<String>) -> Self {
        UserError::Message {
            text: text.into(),
            detail: Some(detail.into()),
        }
    }

    /// An error about the value of a particular option.
    pub fn option(
        name: impl Into<String>,
        section: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        UserError::InvalidOption {
            name: name.into(),
            section: section.map(str::to_string),
            message: message.into(),
            detail: None,
        }
    }

    /// The optional detail that accompanies the message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            UserError::InvalidOption { detail, .. } | UserError::Message { detail, .. } => {
                detail.as_deref()
            }
            _ => None,
        }
    }

    /// Convert to a diagnostic for terminal output.
    pub fn to_diagnostic(&self, program: &str) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string()).with_program(program);

        if let Some(detail) = self.detail() {
            diag = diag.with_context(detail);
        }

        match self {
            UserError::UnknownOption { section, .. } => {
                diag = diag.with_suggestion(format!(
                    "Check the spelling of the key in the [{}] section of pyproject.toml",
                    section
                ));
            }
            UserError::UnknownEnabledBindings(_) | UserError::UnknownDisabledBindings(_) => {
                diag = diag.with_suggestion(
                    "Use the `name` of a [[tool.sip.bindings]] section of pyproject.toml",
                );
            }
            UserError::CommandFailed { .. } => {
                diag = diag.with_suggestion(
                    "Run again with --verbose to see the commands being run",
                );
            }
            UserError::UnsupportedAbiVersion(_) | UserError::UnsupportedAbiMajorVersion(_) => {
                diag = diag.with_suggestion(
                    "Change `abi-version` in [tool.sip.project] to an installed ABI version",
                );
            }
            _ => {}
        }

        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_error_is_qualified_by_section() {
        let err = UserError::option(
            "sip-module",
            Some("tool.sip.project"),
            "must be defined when the project contains multiple sets of bindings",
        );
        assert_eq!(
            err.to_string(),
            "'tool.sip.project.sip-module': must be defined when the project contains multiple sets of bindings"
        );
    }

    #[test]
    fn test_undefined_option_without_section() {
        let err = UserError::UndefinedOption {
            name: "name".to_string(),
            section: None,
        };
        assert_eq!(err.to_string(), "'name': must be defined");
    }

    #[test]
    fn test_command_failed_message() {
        let err = UserError::CommandFailed {
            command: "cc -c foo.c".to_string(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "'cc -c foo.c' failed returning 2");

        let err = UserError::CommandFailed {
            command: "cc".to_string(),
            code: None,
        };
        assert!(err.to_string().ends_with("returning a signal"));
    }

    #[test]
    fn test_detail_is_rendered_as_context() {
        let err = UserError::with_detail("unable to read pyproject.toml", "permission denied");
        let output = err.to_diagnostic("sip-build").format(false);
        assert!(output.starts_with("sip-build: unable to read pyproject.toml"));
        assert!(output.contains("permission denied"));
    }
}
