//! Immutable board state: grid, turn, and Black's participant.

use crate::coord::{BOARD_SIZE, CELL_COUNT, Coord};
use crate::types::{Cell, Color, ParticipantId, Winner};
use tracing::instrument;

/// One game's grid, whose turn it is, and which participant plays Black.
///
/// Values are never edited in place by the rules; every transition builds
/// a new `BoardState`, which is what makes wholesale replacement safe to
/// propagate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardState {
    cells: [Cell; CELL_COUNT],
    turn: Color,
    black_player: ParticipantId,
}

impl BoardState {
    /// Starting position: (3,3) and (4,4) Black, (3,4) and (4,3) White,
    /// Black to move.
    #[instrument]
    pub fn initial(black_player: ParticipantId) -> Self {
        let mut cells = [Cell::Empty; CELL_COUNT];
        cells[3 * BOARD_SIZE + 3] = Cell::Black;
        cells[3 * BOARD_SIZE + 4] = Cell::White;
        cells[4 * BOARD_SIZE + 3] = Cell::White;
        cells[4 * BOARD_SIZE + 4] = Cell::Black;
        Self {
            cells,
            turn: Color::Black,
            black_player,
        }
    }

    /// Assembles a state from raw parts (e.g. decoded from storage).
    pub fn from_parts(cells: [Cell; CELL_COUNT], turn: Color, black_player: ParticipantId) -> Self {
        Self {
            cells,
            turn,
            black_player,
        }
    }

    /// All 64 cells in row-major order.
    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    /// Cell at the given coordinate.
    pub fn cell(&self, at: Coord) -> Cell {
        self.cells[at.index()]
    }

    /// Color whose move is next.
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Participant currently assigned to Black.
    pub fn black_player(&self) -> ParticipantId {
        self.black_player
    }

    /// Number of cells holding `color`.
    pub fn score_of(&self, color: Color) -> usize {
        let target = Cell::from(color);
        self.cells.iter().filter(|c| **c == target).count()
    }

    /// Number of non-empty cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// True iff every cell is occupied. This is the only end condition.
    pub fn is_terminal(&self) -> bool {
        self.occupied() == CELL_COUNT
    }

    /// Strictly higher piece count wins; equal counts draw.
    ///
    /// Meaningful on any board, though callers normally ask only once
    /// [`is_terminal`](Self::is_terminal) holds.
    pub fn winner(&self) -> Winner {
        let black = self.score_of(Color::Black);
        let white = self.score_of(Color::White);
        match black.cmp(&white) {
            std::cmp::Ordering::Greater => Winner::Black,
            std::cmp::Ordering::Less => Winner::White,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }

    pub(crate) fn with_cells(&self, cells: [Cell; CELL_COUNT]) -> Self {
        Self {
            cells,
            turn: self.turn,
            black_player: self.black_player,
        }
    }

    pub(crate) fn with_turn(&self, turn: Color) -> Self {
        Self {
            cells: self.cells,
            turn,
            black_player: self.black_player,
        }
    }
}

impl std::fmt::Display for BoardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  0 1 2 3 4 5 6 7")?;
        for row in 0..BOARD_SIZE {
            write!(f, "{row}")?;
            for col in 0..BOARD_SIZE {
                let symbol = match self.cells[row * BOARD_SIZE + col] {
                    Cell::Empty => '.',
                    Cell::Black => 'B',
                    Cell::White => 'W',
                };
                write!(f, " {symbol}")?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "turn: {} | black: {} | white: {}",
            self.turn,
            self.score_of(Color::Black),
            self.score_of(Color::White)
        )
    }
}
