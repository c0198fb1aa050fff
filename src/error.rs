//! Error types for the document engine.

use std::collections::TryReserveError;
use std::fmt;

/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for document operations.
///
/// Boundary conditions (backspace at the start of a line, undo with an empty
/// history, ...) are not errors; those calls report `false`/`None` instead.
#[derive(Debug)]
pub enum Error {
    /// Growing a line, an undo payload, the line array or a wrap table failed.
    OutOfMemory(TryReserveError),
    /// A search pattern could not be compiled.
    InvalidPattern(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory(e) => write!(f, "out of memory: {e}"),
            Self::InvalidPattern(s) => write!(f, "invalid search pattern: {s}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OutOfMemory(e) => Some(e),
            Self::InvalidPattern(_) => None,
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Self::OutOfMemory(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Self::InvalidPattern(e.to_string())
    }
}
