//! Grid coordinates and compass directions.

use crate::error::IllegalMove;
use serde::{Deserialize, Serialize};

/// Side length of the board.
pub const BOARD_SIZE: usize = 8;

/// Number of cells on the board.
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// A validated cell coordinate, row and column both in `0..8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display("({row}, {col})")]
pub struct Coord {
    row: usize,
    col: usize,
}

impl Coord {
    /// Validates a raw (row, col) pair.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalMove::InvalidCoordinate`] if either component is
    /// outside `0..8`.
    pub fn new(row: i32, col: i32) -> Result<Self, IllegalMove> {
        match (usize::try_from(row), usize::try_from(col)) {
            (Ok(r), Ok(c)) if r < BOARD_SIZE && c < BOARD_SIZE => Ok(Self { row: r, col: c }),
            _ => Err(IllegalMove::InvalidCoordinate { row, col }),
        }
    }

    /// Builds a coordinate from a row-major cell index.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < CELL_COUNT).then(|| Self {
            row: index / BOARD_SIZE,
            col: index % BOARD_SIZE,
        })
    }

    /// Row-major cell index (`row * 8 + col`).
    pub fn index(self) -> usize {
        self.row * BOARD_SIZE + self.col
    }

    /// Row component.
    pub fn row(self) -> usize {
        self.row
    }

    /// Column component.
    pub fn col(self) -> usize {
        self.col
    }

    /// Moves one step in `dir`, or `None` when that leaves the board.
    pub fn step(self, dir: Direction) -> Option<Self> {
        let (dr, dc) = dir.delta();
        let row = self.row.checked_add_signed(dr)?;
        let col = self.col.checked_add_signed(dc)?;
        (row < BOARD_SIZE && col < BOARD_SIZE).then_some(Self { row, col })
    }

    /// Iterates over all 64 coordinates in row-major order.
    pub fn all() -> impl Iterator<Item = Coord> {
        (0..CELL_COUNT).filter_map(Coord::from_index)
    }
}

/// One of the eight compass directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Up-left.
    NorthWest,
    /// Up.
    North,
    /// Up-right.
    NorthEast,
    /// Left.
    West,
    /// Right.
    East,
    /// Down-left.
    SouthWest,
    /// Down.
    South,
    /// Down-right.
    SouthEast,
}

impl Direction {
    /// All eight directions.
    pub const ALL: [Direction; 8] = [
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
        Direction::West,
        Direction::East,
        Direction::SouthWest,
        Direction::South,
        Direction::SouthEast,
    ];

    /// (row, col) offset for a single step.
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::NorthWest => (-1, -1),
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
            Direction::West => (0, -1),
            Direction::East => (0, 1),
            Direction::SouthWest => (1, -1),
            Direction::South => (1, 0),
            Direction::SouthEast => (1, 1),
        }
    }
}
