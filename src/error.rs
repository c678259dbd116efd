use thiserror::Error;

use crate::span::Span;

/// Result type for classc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the compiler core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed declaration or accessor shape
    #[error("Syntax error at {span}: {message}")]
    Syntax { message: String, span: Span },

    /// Generic binding or field type inconsistency
    #[error("Type mismatch at {span}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Duplicate key '{key}'")]
    DuplicateKey { key: String },

    #[error("Unresolved name '{name}' at {span}")]
    Unresolved { name: String, span: Span },

    #[error("Invalid class hierarchy at {span}: {message}")]
    Hierarchy { message: String, span: Span },

    #[error("Compilation stalled; {} declaration(s) cannot advance: {}", pending.len(), pending.join(", "))]
    Stalled { pending: Vec<String> },

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    pub fn unresolved(name: impl Into<String>, span: Span) -> Self {
        Self::Unresolved {
            name: name.into(),
            span,
        }
    }

    /// Create a hierarchy error
    pub fn hierarchy(message: impl Into<String>, span: Span) -> Self {
        Self::Hierarchy {
            message: message.into(),
            span,
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create an internal error; these indicate a bug in an earlier pass
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is a user-facing compilation error
    /// rather than an I/O, encoding or internal failure.
    pub fn is_compilation_error(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::TypeMismatch { .. }
                | Self::DuplicateKey { .. }
                | Self::Unresolved { .. }
                | Self::Hierarchy { .. }
        )
    }

    /// Source span of the error, when it has one
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax { span, .. }
            | Self::TypeMismatch { span, .. }
            | Self::Unresolved { span, .. }
            | Self::Hierarchy { span, .. } => Some(*span),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_error_umbrella() {
        assert!(Error::syntax("bad accessor", Span::default()).is_compilation_error());
        assert!(Error::type_mismatch("int", "string", Span::default()).is_compilation_error());
        assert!(Error::duplicate_key("x").is_compilation_error());
        assert!(!Error::internal("oops").is_compilation_error());
        assert!(!Error::encoding("short blob").is_compilation_error());
    }

    #[test]
    fn test_stalled_message_lists_pending() {
        let err = Error::Stalled {
            pending: vec!["class A".to_string(), "fn A.f".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 declaration(s)"));
        assert!(msg.contains("class A, fn A.f"));
    }
}
