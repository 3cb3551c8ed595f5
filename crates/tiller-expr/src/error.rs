//! Error types for expression parsing.

use thiserror::Error;

/// Errors produced while lexing or parsing an expression source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExprError {
    /// An unexpected character in the source.
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedCharacter { found: char, offset: usize },

    /// A string literal without a closing quote.
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    /// A numeric literal that did not parse.
    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    /// The parser met a token it cannot use here.
    #[error("unexpected token '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    /// The source ended mid-expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// An assignment source without a `=` at the top level.
    #[error("expected an assignment of the form 'field = expression'")]
    ExpectedAssignment,
}
