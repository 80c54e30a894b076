//! Compact text encoding used for storage and the wire.
//!
//! The board is a 64-character string in row-major order, one character
//! per cell: `'0'` empty, `'1'` black, `'2'` white. The turn uses the same
//! digits (`"1"` or `"2"`).

use crate::board::BoardState;
use crate::coord::CELL_COUNT;
use crate::error::CodecError;
use crate::types::{Cell, Color, ParticipantId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A [`BoardState`] in its persisted text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBoard {
    /// 64-character cell string.
    pub cells: String,
    /// `"1"` (Black) or `"2"` (White).
    pub turn: String,
    /// Participant assigned to Black.
    pub black_player_id: ParticipantId,
}

impl From<&BoardState> for EncodedBoard {
    fn from(state: &BoardState) -> Self {
        Self {
            cells: encode_cells(state.cells()),
            turn: encode_turn(state.turn()).to_string(),
            black_player_id: state.black_player(),
        }
    }
}

impl TryFrom<&EncodedBoard> for BoardState {
    type Error = CodecError;

    fn try_from(encoded: &EncodedBoard) -> Result<Self, Self::Error> {
        Ok(BoardState::from_parts(
            decode_cells(&encoded.cells)?,
            decode_turn(&encoded.turn)?,
            encoded.black_player_id,
        ))
    }
}

fn cell_char(cell: Cell) -> char {
    match cell {
        Cell::Empty => '0',
        Cell::Black => '1',
        Cell::White => '2',
    }
}

/// Encodes the grid as 64 digits.
pub fn encode_cells(cells: &[Cell; CELL_COUNT]) -> String {
    cells.iter().copied().map(cell_char).collect()
}

/// Parses a 64-digit grid.
///
/// # Errors
///
/// Returns [`CodecError`] if the string is not exactly 64 characters of
/// `0`, `1` or `2`.
#[instrument(skip(text), fields(len = text.len()))]
pub fn decode_cells(text: &str) -> Result<[Cell; CELL_COUNT], CodecError> {
    let mut cells = [Cell::Empty; CELL_COUNT];
    let mut count = 0;
    for (i, ch) in text.chars().enumerate() {
        let cell = match ch {
            '0' => Cell::Empty,
            '1' => Cell::Black,
            '2' => Cell::White,
            other => {
                return Err(CodecError::new(format!(
                    "Invalid cell character '{}' at index {}",
                    other, i
                )));
            }
        };
        if i >= CELL_COUNT {
            return Err(CodecError::new(format!(
                "Board has more than {} cells",
                CELL_COUNT
            )));
        }
        cells[i] = cell;
        count += 1;
    }
    if count != CELL_COUNT {
        return Err(CodecError::new(format!(
            "Board has {} cells, expected {}",
            count, CELL_COUNT
        )));
    }
    Ok(cells)
}

/// Encodes a color as `"1"` or `"2"`.
pub fn encode_turn(color: Color) -> &'static str {
    match color {
        Color::Black => "1",
        Color::White => "2",
    }
}

/// Parses `"1"` or `"2"` into a color.
///
/// # Errors
///
/// Returns [`CodecError`] for any other input.
pub fn decode_turn(text: &str) -> Result<Color, CodecError> {
    match text {
        "1" => Ok(Color::Black),
        "2" => Ok(Color::White),
        other => Err(CodecError::new(format!("Invalid turn '{}'", other))),
    }
}
