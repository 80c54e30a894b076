//! Legality and capture logic.

use crate::board::BoardState;
use crate::coord::{Coord, Direction};
use crate::error::IllegalMove;
use crate::types::{Cell, Color};
use tracing::{debug, instrument};

/// Opponent cells bracketed along one ray from `from`, or nothing.
///
/// Walks outward over a contiguous run of `mover`'s opponent and returns the
/// run only if it is closed by a `mover` piece before an empty cell or the
/// board edge.
pub(crate) fn ray(state: &BoardState, from: Coord, dir: Direction, mover: Color) -> Vec<Coord> {
    let opponent = Cell::from(mover.opponent());
    let own = Cell::from(mover);
    let mut run = Vec::new();
    let mut cursor = from.step(dir);
    while let Some(at) = cursor {
        let cell = state.cell(at);
        if cell == opponent {
            run.push(at);
            cursor = at.step(dir);
        } else if cell == own {
            return run;
        } else {
            break;
        }
    }
    Vec::new()
}

/// True if `mover` placing at `at` would bracket at least one opponent piece.
pub(crate) fn captures_any(state: &BoardState, at: Coord, mover: Color) -> bool {
    state.cell(at).is_empty()
        && Direction::ALL
            .iter()
            .any(|dir| !ray(state, at, *dir, mover).is_empty())
}

/// Every opponent piece the color to move would flip by playing at `at`.
///
/// # Errors
///
/// Returns [`IllegalMove::CellOccupied`] for a non-empty target and
/// [`IllegalMove::NoCaptureAvailable`] when no direction qualifies.
pub fn captures(state: &BoardState, at: Coord) -> Result<Vec<Coord>, IllegalMove> {
    if !state.cell(at).is_empty() {
        return Err(IllegalMove::CellOccupied(at));
    }
    let mover = state.turn();
    let flips: Vec<Coord> = Direction::ALL
        .iter()
        .flat_map(|dir| ray(state, at, *dir, mover))
        .collect();
    if flips.is_empty() {
        Err(IllegalMove::NoCaptureAvailable(at))
    } else {
        Ok(flips)
    }
}

/// Checks whether the color to move may play at (row, col).
#[instrument(skip(state), fields(turn = %state.turn()))]
pub fn legal_move(state: &BoardState, row: i32, col: i32) -> bool {
    match Coord::new(row, col) {
        Ok(at) => captures_any(state, at, state.turn()),
        Err(_) => false,
    }
}

/// All cells the color to move may play, in row-major order.
#[instrument(skip(state), fields(turn = %state.turn()))]
pub fn legal_moves(state: &BoardState) -> Vec<Coord> {
    let mover = state.turn();
    Coord::all()
        .filter(|at| captures_any(state, *at, mover))
        .collect()
}

/// Places the mover's piece and flips every bracketed run.
///
/// The turn is left with the mover; see [`next_turn`](super::next_turn).
///
/// # Errors
///
/// Returns [`IllegalMove`] when the coordinate is off the board, the cell
/// is occupied, or nothing would be captured.
#[instrument(skip(state), fields(turn = %state.turn()))]
pub fn apply_move(state: &BoardState, row: i32, col: i32) -> Result<BoardState, IllegalMove> {
    let at = Coord::new(row, col)?;
    let flips = captures(state, at)?;
    debug!(flipped = flips.len(), "Applying move");
    Ok(place(state, at, &flips))
}

pub(crate) fn place(state: &BoardState, at: Coord, flips: &[Coord]) -> BoardState {
    let own = Cell::from(state.turn());
    let mut cells = *state.cells();
    for flip in flips {
        cells[flip.index()] = own;
    }
    cells[at.index()] = own;
    state.with_cells(cells)
}
