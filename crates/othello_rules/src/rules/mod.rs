//! Othello rules.
//!
//! Pure functions over [`BoardState`]: nothing here performs I/O or mutates
//! its input. Each transition returns a fresh state.

pub mod capture;
pub mod turn;

pub use capture::{apply_move, captures, legal_move, legal_moves};
pub use turn::{has_any_move, next_turn};

use crate::board::BoardState;
use crate::coord::Coord;
use crate::error::IllegalMove;
use crate::types::Color;
use tracing::{debug, instrument};

/// A completed move: the resulting state plus what happened on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// State after captures and turn passing.
    pub state: BoardState,
    /// Color that made the move.
    pub mover: Color,
    /// Where the piece was placed.
    pub placed: Coord,
    /// Opponent pieces turned to the mover's color.
    pub flipped: Vec<Coord>,
    /// True when the opponent had no reply and the mover keeps the turn.
    pub opponent_passed: bool,
}

/// Applies a move for the color to move and then decides whose turn is next.
///
/// # Errors
///
/// Returns [`IllegalMove`] if the move is off the board, onto an occupied
/// cell, or captures nothing. The input state is untouched either way.
#[instrument(skip(state), fields(turn = %state.turn()))]
pub fn play(state: &BoardState, row: i32, col: i32) -> Result<MoveOutcome, IllegalMove> {
    let placed = Coord::new(row, col)?;
    let mover = state.turn();
    let flipped = captures(state, placed)?;
    let applied = capture::place(state, placed, &flipped);
    let state = next_turn(&applied);
    let opponent_passed = state.turn() == mover;
    debug!(
        flipped = flipped.len(),
        opponent_passed,
        next = %state.turn(),
        "Move played"
    );
    Ok(MoveOutcome {
        state,
        mover,
        placed,
        flipped,
        opponent_passed,
    })
}
