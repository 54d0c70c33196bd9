//! Error types for expression extraction, parsing, and evaluation
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//! Lexical and parse errors carry the character offset at which they were
//! detected so spec validation can report exact positions; evaluation
//! failures are tagged with the source of the expression that failed.

use thiserror::Error;

/// Convenience result type using [`ExpressionError`]
pub type Result<T> = std::result::Result<T, ExpressionError>;

/// Errors produced by the expression facade
///
/// # Error Categories
///
/// - **Extraction**: `Unterminated`
/// - **Parsing**: `Lexical`, `UnterminatedString`, `InvalidNumber`, `Parse`
/// - **Evaluation**: `Evaluation`
/// - **Facade**: `UnknownDialect`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// A character the lexer does not recognize
    ///
    /// Reported at parse time with the offset of the offending character
    /// inside the expression body.
    #[error("illegal character {ch:?} at position {pos}")]
    Lexical {
        /// The offending character
        ch: char,
        /// Byte offset of the character within the expression
        pos: usize,
    },

    /// A string literal without a closing quote
    #[error("unterminated string literal at position {pos}")]
    UnterminatedString {
        /// Byte offset of the opening quote
        pos: usize,
    },

    /// A numeric literal that cannot be represented
    #[error("invalid number {text:?} at position {pos}")]
    InvalidNumber {
        /// The literal text as written
        text: String,
        /// Byte offset of the literal
        pos: usize,
    },

    /// The token stream does not form a valid expression
    ///
    /// `found` is the lexeme of the unexpected token, or `"end of
    /// expression"` when the input stopped short.
    #[error("unexpected {found:?} at position {pos} in expression {expression:?}")]
    Parse {
        /// Lexeme of the unexpected token
        found: String,
        /// Byte offset of the token within the expression
        pos: usize,
        /// The full expression being parsed
        expression: String,
    },

    /// An expression block opener without a matching closer
    #[error("unterminated expression block at offset {pos}")]
    Unterminated {
        /// Byte offset of the opening delimiter within the surrounding text
        pos: usize,
    },

    /// An expression parsed but failed at evaluation time
    ///
    /// Carries the expression source (with delimiters) so a failed guard
    /// can be traced back to the workflow definition.
    #[error("evaluation of {expression:?} failed: {message}")]
    Evaluation {
        /// The expression source, including delimiters
        expression: String,
        /// Description of the failure
        message: String,
    },

    /// The requested dialect is not registered with the facade
    #[error("unknown expression dialect {0:?}")]
    UnknownDialect(String),
}

impl ExpressionError {
    /// Create an evaluation error tagged with the expression source
    pub fn evaluation(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// The character offset this error points at, when it has one
    ///
    /// Extraction, lexical, and parse errors carry an offset; evaluation
    /// and dialect-lookup errors do not.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Lexical { pos, .. }
            | Self::UnterminatedString { pos }
            | Self::InvalidNumber { pos, .. }
            | Self::Parse { pos, .. }
            | Self::Unterminated { pos } => Some(*pos),
            Self::Evaluation { .. } | Self::UnknownDialect(_) => None,
        }
    }
}
