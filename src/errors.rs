//! Error taxonomy.
//!
//! Callers need to match on a closed error *kind*, so this is a
//! `thiserror`-derived enum rather than the plain `String`/`CodeGenError`
//! values a smaller pipeline might propagate (grounded on the diagnostic
//! enums in `jade-codes-syster-base`, which takes the same approach for a
//! semantic-analysis pipeline).

use std::fmt;

use crate::ast::SourceLocation;

/// A message plus the source position it was raised at (absent for errors
/// raised before the first line of the program exists, e.g. I/O failures).
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub loc: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, loc: SourceLocation) -> Self {
        Diagnostic {
            message: message.into(),
            loc: Some(loc),
        }
    }

    pub fn without_location(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            loc: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("lexical error: {0}")]
    Lexical(Diagnostic),
    #[error("syntax error: {0}")]
    Syntax(Diagnostic),
    #[error("name error: {0}")]
    Name(Diagnostic),
    #[error("type error: {0}")]
    Type(Diagnostic),
    #[error("control flow error: {0}")]
    ControlFlow(Diagnostic),
    #[error("class error: {0}")]
    Class(Diagnostic),
    #[error("resource error: {0}")]
    Resource(Diagnostic),
}

impl CompileError {
    pub fn name(message: impl Into<String>, loc: SourceLocation) -> Self {
        CompileError::Name(Diagnostic::new(message, loc))
    }

    pub fn ty(message: impl Into<String>, loc: SourceLocation) -> Self {
        CompileError::Type(Diagnostic::new(message, loc))
    }

    pub fn control_flow(message: impl Into<String>, loc: SourceLocation) -> Self {
        CompileError::ControlFlow(Diagnostic::new(message, loc))
    }

    pub fn class(message: impl Into<String>, loc: SourceLocation) -> Self {
        CompileError::Class(Diagnostic::new(message, loc))
    }

    pub fn resource(message: impl Into<String>) -> Self {
        CompileError::Resource(Diagnostic::without_location(message))
    }

    pub fn syntax(message: impl Into<String>, loc: SourceLocation) -> Self {
        CompileError::Syntax(Diagnostic::new(message, loc))
    }

    pub fn lexical(message: impl Into<String>, loc: SourceLocation) -> Self {
        CompileError::Lexical(Diagnostic::new(message, loc))
    }

    /// The stable kind name used for `--help`-adjacent tooling and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Lexical(_) => "LexicalError",
            CompileError::Syntax(_) => "SyntaxError",
            CompileError::Name(_) => "NameError",
            CompileError::Type(_) => "TypeError",
            CompileError::ControlFlow(_) => "ControlFlowError",
            CompileError::Class(_) => "ClassError",
            CompileError::Resource(_) => "ResourceError",
        }
    }
}

/// Result of a phase that batches every error it finds in one pass
/// (the semantic analyzer) rather than stopping at the first.
pub type BatchResult<T> = Result<T, Vec<CompileError>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_returns_a_stable_name_per_variant() {
        let loc = SourceLocation::new(1, 1);
        assert_eq!(CompileError::name("x", loc).kind(), "NameError");
        assert_eq!(CompileError::ty("x", loc).kind(), "TypeError");
        assert_eq!(CompileError::control_flow("x", loc).kind(), "ControlFlowError");
        assert_eq!(CompileError::class("x", loc).kind(), "ClassError");
        assert_eq!(CompileError::resource("x").kind(), "ResourceError");
    }

    #[test]
    fn display_includes_location_when_present() {
        let loc = SourceLocation::new(3, 7);
        let e = CompileError::ty("bad assignment", loc);
        assert!(e.to_string().contains("3:7"));
    }
}
