//! Error types for lexing, parsing, and evaluation
//!
//! All failures surface as values of the sealed [`TexprError`] family. Every
//! error carries a human-readable message, an optional byte offset into the
//! original source, and an optional "did you mean" suggestion. Suggestions
//! are computed on the error path only.

use std::fmt;

/// Top-level error family returned by every fallible entry point.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TexprError {
    /// The scanner rejected the input.
    Lexical(LexicalError),
    /// The parser rejected the token stream.
    Syntax(SyntaxError),
    /// The evaluator rejected the AST or the environment.
    Evaluation(EvaluationError),
}

impl TexprError {
    /// Byte offset into the original source, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            TexprError::Lexical(e) => Some(e.offset),
            TexprError::Syntax(e) => e.offset,
            TexprError::Evaluation(e) => e.offset,
        }
    }

    /// The attached suggestion, when one was computed.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            TexprError::Lexical(e) => e.suggestion.as_deref(),
            TexprError::Syntax(e) => e.suggestion.as_deref(),
            TexprError::Evaluation(e) => e.suggestion.as_deref(),
        }
    }
}

impl fmt::Display for TexprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TexprError::Lexical(e) => e.fmt(f),
            TexprError::Syntax(e) => e.fmt(f),
            TexprError::Evaluation(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for TexprError {}

impl From<LexicalError> for TexprError {
    fn from(e: LexicalError) -> Self {
        TexprError::Lexical(e)
    }
}

impl From<SyntaxError> for TexprError {
    fn from(e: SyntaxError) -> Self {
        TexprError::Syntax(e)
    }
}

impl From<EvaluationError> for TexprError {
    fn from(e: EvaluationError) -> Self {
        TexprError::Evaluation(e)
    }
}

// =============================================================================
// LEXICAL
// =============================================================================

/// What kind of lexical failure occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LexicalErrorKind {
    /// A backslash command not present in the command table.
    UnknownCommand(String),
    /// A character outside the accepted input surface.
    InvalidCharacter(char),
    /// A numeric literal with a second decimal point or a dangling exponent.
    MalformedNumber(String),
    /// `\text{` without a closing brace.
    UnterminatedText,
}

/// Scanner error with position and optional suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalError {
    /// Failure category.
    pub kind: LexicalErrorKind,
    /// Byte offset of the offending character or command.
    pub offset: usize,
    /// "did you mean" hint against the command table, when close enough.
    pub suggestion: Option<String>,
}

impl LexicalError {
    pub(crate) fn new(kind: LexicalErrorKind, offset: usize) -> Self {
        LexicalError {
            kind,
            offset,
            suggestion: None,
        }
    }

    pub(crate) fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

impl fmt::Display for LexicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexicalErrorKind::UnknownCommand(name) => {
                write!(f, "unknown command '\\{}' at byte {}", name, self.offset)?;
            }
            LexicalErrorKind::InvalidCharacter(c) => {
                write!(f, "invalid character '{}' at byte {}", c, self.offset)?;
            }
            LexicalErrorKind::MalformedNumber(s) => {
                write!(f, "malformed number '{}' at byte {}", s, self.offset)?;
            }
            LexicalErrorKind::UnterminatedText => {
                write!(
                    f,
                    "unterminated \\text{{...}} starting at byte {}",
                    self.offset
                )?;
            }
        }
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", s)?;
        }
        Ok(())
    }
}

impl std::error::Error for LexicalError {}

// =============================================================================
// SYNTAX
// =============================================================================

/// Parser error with message, position, and optional suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// What went wrong, in parser terms.
    pub message: String,
    /// Byte offset of the token that triggered the failure.
    pub offset: Option<usize>,
    /// Recovery hint for common mistakes (unbalanced braces, missing `dx`, ...).
    pub suggestion: Option<String>,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, offset: Option<usize>) -> Self {
        SyntaxError {
            message: message.into(),
            offset,
            suggestion: None,
        }
    }

    pub(crate) fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error: {}", self.message)?;
        if let Some(at) = self.offset {
            write!(f, " at byte {}", at)?;
        }
        if let Some(s) = &self.suggestion {
            write!(f, " ({})", s)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyntaxError {}

// =============================================================================
// EVALUATION
// =============================================================================

/// What kind of evaluation failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvalErrorKind {
    /// A variable was neither bound nor a built-in constant.
    UndefinedVariable,
    /// Division that has no IEEE answer (singular matrix, zero vector norm).
    DivisionByZero,
    /// An argument outside a function's domain.
    DomainError,
    /// An operand of the wrong result variant.
    TypeMismatch,
    /// The recursion-depth ceiling was exceeded.
    RecursionLimit,
    /// The sum/product iteration ceiling was exceeded.
    IterationLimit,
    /// Vector or matrix shapes do not line up.
    DimensionMismatch,
    /// `factorial(n)` with `n > 170`.
    FactorialOverflow,
    /// `fibonacci(n)` with `n >= 1477`.
    FibonacciOverflow,
    /// The operation only has a symbolic answer (unbounded integral).
    SymbolicOnly,
    /// A node or operand combination the evaluator does not handle.
    Unsupported,
}

impl EvalErrorKind {
    fn label(self) -> &'static str {
        match self {
            EvalErrorKind::UndefinedVariable => "undefined variable",
            EvalErrorKind::DivisionByZero => "division by zero",
            EvalErrorKind::DomainError => "domain error",
            EvalErrorKind::TypeMismatch => "type mismatch",
            EvalErrorKind::RecursionLimit => "recursion limit exceeded",
            EvalErrorKind::IterationLimit => "iteration limit exceeded",
            EvalErrorKind::DimensionMismatch => "dimension mismatch",
            EvalErrorKind::FactorialOverflow => "factorial overflow",
            EvalErrorKind::FibonacciOverflow => "fibonacci overflow",
            EvalErrorKind::SymbolicOnly => "no numeric answer",
            EvalErrorKind::Unsupported => "unsupported operation",
        }
    }
}

/// Evaluator error with kind, message, position, and optional suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    /// Failure category.
    pub kind: EvalErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Byte offset, when the failing node kept one.
    pub offset: Option<usize>,
    /// "did you mean" hint, for undefined variables and functions.
    pub suggestion: Option<String>,
}

impl EvaluationError {
    pub(crate) fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        EvaluationError {
            kind,
            message: message.into(),
            offset: None,
            suggestion: None,
        }
    }

    pub(crate) fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)?;
        if let Some(at) = self.offset {
            write!(f, " at byte {}", at)?;
        }
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", s)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvaluationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_display_includes_suggestion() {
        let err = LexicalError::new(LexicalErrorKind::UnknownCommand("sine".into()), 3)
            .with_suggestion(Some("sin".into()));
        let text = err.to_string();
        assert!(text.contains("\\sine"));
        assert!(text.contains("did you mean 'sin'"));
    }

    #[test]
    fn syntax_display_carries_offset() {
        let err = SyntaxError::new("expected '}'", Some(7)).with_suggestion("add a closing brace");
        assert_eq!(
            err.to_string(),
            "syntax error: expected '}' at byte 7 (add a closing brace)"
        );
    }

    #[test]
    fn family_offset_accessor() {
        let err: TexprError =
            EvaluationError::new(EvalErrorKind::TypeMismatch, "boolean + matrix").into();
        assert_eq!(err.offset(), None);
        assert!(err.to_string().starts_with("type mismatch"));
    }
}
