//! Gateway error types with caller-safe messages
//!
//! Every caller-facing operation returns one of these kinds. The `Display`
//! text of most variants is shown to the caller after reverse substitution;
//! `SecurityViolation` never is.

use std::path::Path;
use thiserror::Error;

/// Why the template validator refused a command template.
///
/// The messages are part of the caller contract and must not be reworded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The template contains `..`
    #[error("Command contains path traversal attempt ('..')")]
    PathTraversal,

    /// The template contains `/` or `\`
    #[error("Command contains direct path separator ('{0}')")]
    PathSeparator(char),

    /// A token looks like `name.ext`
    #[error("Command contains potential direct filename ('{0}')")]
    DirectFilename(String),
}

impl Rejection {
    /// Short reason, without the offending text
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::PathTraversal => "path traversal attempt",
            Rejection::PathSeparator(_) => "direct path separator",
            Rejection::DirectFilename(_) => "potential direct filename",
        }
    }
}

/// Errors surfaced by the reference registry and the execution gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Blank names, malformed extensions, malformed template syntax
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A placeholder or lookup named an id the registry does not hold
    #[error("Reference '{id}' not found.")]
    UnknownReference { id: String },

    /// The validator found a raw path construct in the template
    #[error(transparent)]
    RejectedTemplate(#[from] Rejection),

    /// Filesystem or subprocess I/O failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A defense-in-depth invariant broke. Never caused by a well-formed caller.
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl GatewayError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GatewayError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn unknown(id: impl Into<String>) -> Self {
        GatewayError::UnknownReference { id: id.into() }
    }

    /// Text that may be handed back to the caller (before sanitization).
    ///
    /// Security violations collapse to a generic message; their detail only
    /// goes to the operator log.
    pub fn caller_message(&self) -> String {
        match self {
            GatewayError::SecurityViolation(_) => {
                "Internal error: the request could not be completed".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Log security-critical errors
    pub fn log_if_security_critical(&self) {
        if let GatewayError::SecurityViolation(detail) = self {
            tracing::error!(target: "security", "SECURITY VIOLATION: {}", detail);
        }
    }
}

/// Build the violation raised when an allocated path escapes its root
pub(crate) fn escaped_root(root: &Path, attempted: &Path) -> GatewayError {
    GatewayError::SecurityViolation(format!(
        "allocated path {} resolved outside target root {}",
        attempted.display(),
        root.display()
    ))
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages_are_stable() {
        assert_eq!(
            Rejection::PathTraversal.to_string(),
            "Command contains path traversal attempt ('..')"
        );
        assert_eq!(
            Rejection::PathSeparator('/').to_string(),
            "Command contains direct path separator ('/')"
        );
        assert_eq!(
            Rejection::DirectFilename("output.mp4".into()).to_string(),
            "Command contains potential direct filename ('output.mp4')"
        );
    }

    #[test]
    fn test_security_violation_is_hidden_from_caller() {
        let err = GatewayError::SecurityViolation("/srv/out/../etc".into());
        assert!(!err.caller_message().contains("/srv"));
    }

    #[test]
    fn test_rejected_template_is_transparent() {
        let err: GatewayError = Rejection::PathTraversal.into();
        assert_eq!(err.caller_message(), "Command contains path traversal attempt ('..')");
    }
}
