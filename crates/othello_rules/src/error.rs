//! Error types for the rules engine and board codec.

use crate::coord::Coord;
use derive_more::{Display, Error};

/// Reason a move was rejected by the rules engine.
///
/// Rejected moves never change the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum IllegalMove {
    /// Row or column outside `0..8`.
    #[display("Coordinate ({row}, {col}) is off the board")]
    InvalidCoordinate {
        /// Requested row.
        row: i32,
        /// Requested column.
        col: i32,
    },

    /// The target cell already holds a piece.
    #[display("Cell {_0} is already occupied")]
    CellOccupied(#[error(not(source))] Coord),

    /// No direction brackets an opponent run.
    #[display("Placing at {_0} captures nothing")]
    NoCaptureAvailable(#[error(not(source))] Coord),
}

/// Failure to parse the persisted board or turn encoding.
#[derive(Debug, Clone, Display, Error)]
#[display("Codec error: {} at {}:{}", message, file, line)]
pub struct CodecError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl CodecError {
    /// Creates a new codec error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
