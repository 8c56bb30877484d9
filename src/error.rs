//! Diagnostics shared by the lexer and parser, and the crate-level error.
//!
//! Lexical and syntax problems are reported as [`ParseError`] records with a
//! stable [`ErrorCode`]. A single `parse` call can report several of them,
//! collected in [`ParseErrors`].

use std::fmt;

use thiserror::Error;

use crate::{ast::Position, compiler::CompileError, vm::VmError};

/// Stable error codes for lexical and syntax errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Lexical
    InvalidCharacter,
    UnterminatedString,
    InvalidNumber,
    InvalidEscape,

    // Syntax
    UnexpectedToken,
    UnexpectedEof,
    ExpectedToken,
    UnclosedParen,
    UnclosedBracket,
    UnclosedBrace,
    TrailingComma,
    EmptyElement,
    InvalidProperty,
    InvalidCallTarget,
    InvalidObjectKey,
    EmptyPipe,
    EmptyPipeWithAlias,
    AliasInSubexpression,
    DuplicateAlias,
    InvalidAlias,
    PipeInSubexpression,
    FeatureDisabled,
    MaxDepthExceeded,
    EmptyExpression,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidCharacter => "invalid-character",
            ErrorCode::UnterminatedString => "unterminated-string",
            ErrorCode::InvalidNumber => "invalid-number",
            ErrorCode::InvalidEscape => "invalid-escape",
            ErrorCode::UnexpectedToken => "unexpected-token",
            ErrorCode::UnexpectedEof => "unexpected-eof",
            ErrorCode::ExpectedToken => "expected-token",
            ErrorCode::UnclosedParen => "unclosed-paren",
            ErrorCode::UnclosedBracket => "unclosed-bracket",
            ErrorCode::UnclosedBrace => "unclosed-brace",
            ErrorCode::TrailingComma => "trailing-comma",
            ErrorCode::EmptyElement => "empty-element",
            ErrorCode::InvalidProperty => "invalid-property",
            ErrorCode::InvalidCallTarget => "invalid-call-target",
            ErrorCode::InvalidObjectKey => "invalid-object-key",
            ErrorCode::EmptyPipe => "empty-pipe",
            ErrorCode::EmptyPipeWithAlias => "empty-pipe-with-alias",
            ErrorCode::AliasInSubexpression => "alias-in-subexpression",
            ErrorCode::DuplicateAlias => "duplicate-alias",
            ErrorCode::InvalidAlias => "invalid-alias",
            ErrorCode::PipeInSubexpression => "pipe-in-subexpression",
            ErrorCode::FeatureDisabled => "feature-disabled",
            ErrorCode::MaxDepthExceeded => "max-depth-exceeded",
            ErrorCode::EmptyExpression => "empty-expression",
        }
    }

    /// Lexical errors stop tokenization of the input.
    pub fn is_lexical(self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidCharacter
                | ErrorCode::UnterminatedString
                | ErrorCode::InvalidNumber
                | ErrorCode::InvalidEscape
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lexical or syntax error with its source position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code} at {line}:{column}: {message}")]
pub struct ParseError {
    pub code: ErrorCode,
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Offending token text, when there is one
    pub token: Option<String>,
    /// What the parser was looking for
    pub expected: Option<String>,
}

impl ParseError {
    pub fn new(code: ErrorCode, message: impl Into<String>, position: Position) -> Self {
        ParseError {
            code,
            message: message.into(),
            line: position.line,
            column: position.column,
            token: None,
            expected: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// Every error reported by one `parse` call, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors(pub Vec<ParseError>);

impl ParseErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ParseError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.0.iter().any(|e| e.code == code)
    }

    pub fn first(&self) -> Option<&ParseError> {
        self.0.first()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no parse errors"),
            [single] => write!(f, "{}", single),
            many => {
                write!(f, "{} parse errors:", many.len())?;
                for error in many {
                    write!(f, "\n  {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ParseErrors {}

impl From<ParseError> for ParseErrors {
    fn from(error: ParseError) -> Self {
        ParseErrors(vec![error])
    }
}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Any failure of the parse → compile → run pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseErrors),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] VmError),
}
