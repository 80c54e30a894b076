//! Core domain types for Othello.

use serde::{Deserialize, Serialize};

/// Piece color. Black always moves first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Color {
    /// Black pieces.
    Black,
    /// White pieces.
    White,
}

impl Color {
    /// Returns the other color.
    pub fn opponent(self) -> Self {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

/// A single cell of the 8×8 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    /// No piece.
    #[default]
    Empty,
    /// Occupied by a black piece.
    Black,
    /// Occupied by a white piece.
    White,
}

impl Cell {
    /// Returns the color of the piece in this cell, if any.
    pub fn color(self) -> Option<Color> {
        match self {
            Cell::Empty => None,
            Cell::Black => Some(Color::Black),
            Cell::White => Some(Color::White),
        }
    }

    /// Checks if the cell holds no piece.
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

impl From<Color> for Cell {
    fn from(color: Color) -> Self {
        match color {
            Color::Black => Cell::Black,
            Color::White => Cell::White,
        }
    }
}

/// Result of comparing piece counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Winner {
    /// Black holds strictly more pieces.
    Black,
    /// White holds strictly more pieces.
    White,
    /// Equal counts.
    Draw,
}

impl From<Color> for Winner {
    fn from(color: Color) -> Self {
        match color {
            Color::Black => Winner::Black,
            Color::White => Winner::White,
        }
    }
}

/// Opaque identifier of a participant (host or guest).
///
/// The rules never interpret it; it only records which participant is
/// currently assigned to Black.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ParticipantId(i32);

impl ParticipantId {
    /// Wraps a raw participant id.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn get(self) -> i32 {
        self.0
    }
}
