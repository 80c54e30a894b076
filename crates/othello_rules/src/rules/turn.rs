//! Turn passing.

use super::capture::captures_any;
use crate::board::BoardState;
use crate::coord::Coord;
use crate::types::Color;
use tracing::{debug, instrument};

/// True if `color` has at least one legal placement anywhere on the board.
pub fn has_any_move(state: &BoardState, color: Color) -> bool {
    Coord::all().any(|at| captures_any(state, at, color))
}

/// Decides who moves after the color in `state.turn()` has just played.
///
/// The turn passes to the opponent when the opponent has a legal move.
/// Otherwise it stays with the mover. There is no second check: if the
/// mover is stuck too, the turn still stays put, and only a full board
/// ends the game.
#[instrument(skip(state), fields(mover = %state.turn()))]
pub fn next_turn(state: &BoardState) -> BoardState {
    let mover = state.turn();
    let opponent = mover.opponent();
    if has_any_move(state, opponent) {
        state.with_turn(opponent)
    } else {
        debug!(skipped = %opponent, "Opponent has no legal move, turn stays");
        state.with_turn(mover)
    }
}
