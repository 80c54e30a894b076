//! Storage error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// Category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StoreErrorKind {
    /// The requested row does not exist.
    #[display("not found")]
    NotFound,
    /// A compare-and-set update lost against a newer write.
    #[display("version conflict")]
    Conflict,
    /// A stored value could not be decoded.
    #[display("corrupt record")]
    Corrupt,
    /// The backend itself failed (connection, query, worker thread).
    #[display("backend failure")]
    Backend,
}

/// Storage error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error ({}): {} at {}:{}", kind, message, file, line)]
pub struct StoreError {
    /// Failure category.
    pub kind: StoreErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for a backend failure.
    #[track_caller]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Backend, message)
    }
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::new(StoreErrorKind::NotFound, "Row not found"),
            other => Self::backend(format!("Diesel error: {}", other)),
        }
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::backend(format!("Connection error: {}", err))
    }
}

impl From<othello_rules::CodecError> for StoreError {
    #[track_caller]
    fn from(err: othello_rules::CodecError) -> Self {
        Self::new(StoreErrorKind::Corrupt, err.to_string())
    }
}
