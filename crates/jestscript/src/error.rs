//! Error taxonomy for the interpreter: one flat enum of error kinds with a
//! `thiserror`-backed wrapper that carries an optional source position. Control
//! signals (`return`, `break`, `continue`) are deliberately NOT part of this type --
//! they are ordinary values threaded through statement execution, see
//! [`crate::evaluator::Signal`].

use std::fmt;

use strum::Display as StrumDisplay;

use crate::ast::Pos;

/// Every error kind named in the language's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
pub enum ErrorKind {
    // --- syntax / lex ---
    UnexpectedCharacter,
    UnterminatedString,
    InvalidNumber,
    ExpectedRoot,
    UnexpectedToken,
    UnexpectedEof,

    // --- semantic ---
    UndefinedVariable,
    NotAssignable,
    InvalidBreak,
    InvalidContinue,
    InvalidReturn,
    InvalidIdk,
    NotIndexable,
    NotCallable,
    DeleteNonPrimitive,
    DeletedValueUsed,
    MaybeToNumber,
    NotANumber,
    InfiniteWhenLoop,
    RecursionLimit,
    UnknownClass,
    UnknownFunction,
    ArgumentBaseNotIdentifier,
    PatternMismatch,
    InvalidDeleteOperand,
}

/// An interpreter error, optionally positioned at a byte offset in the source.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JestError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
}

impl JestError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), pos: None }
    }

    #[must_use]
    pub fn at(kind: ErrorKind, message: impl Into<String>, pos: Pos) -> Self {
        Self { kind, message: message.into(), pos: Some(pos) }
    }

    #[must_use]
    pub fn with_pos(mut self, pos: Pos) -> Self {
        self.pos.get_or_insert(pos);
        self
    }
}

/// Renders the way the REPL/CLI reports an error to the user: message, then
/// `at offset <n>` when a position is known.
impl fmt::Display for ErrorLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.message)?;
        if let Some(pos) = self.0.pos {
            write!(f, " (at offset {})", pos.0)?;
        }
        Ok(())
    }
}

/// Wrapper used only to give `JestError` a user-facing `Display` distinct from its
/// `thiserror`-derived debug-oriented one.
pub struct ErrorLocation<'a>(pub &'a JestError);

pub type JestResult<T> = Result<T, JestError>;
