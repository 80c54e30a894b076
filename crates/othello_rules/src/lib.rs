//! Pure Othello game logic.
//!
//! Board state, legal-move detection, capture application, turn passing and
//! the compact text encoding used for storage and the wire. Nothing in this
//! crate performs I/O; every transition returns a new [`BoardState`].
//!
//! # Example
//!
//! ```
//! use othello_rules::{BoardState, Color, ParticipantId, play};
//!
//! let board = BoardState::initial(ParticipantId::new(1));
//! let outcome = play(&board, 2, 4)?;
//! assert_eq!(outcome.flipped.len(), 1);
//! assert_eq!(outcome.state.turn(), Color::White);
//! # Ok::<(), othello_rules::IllegalMove>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod board;
mod codec;
mod coord;
mod error;
mod invariants;
mod rules;
mod types;

pub use board::BoardState;
pub use codec::{EncodedBoard, decode_cells, decode_turn, encode_cells, encode_turn};
pub use coord::{BOARD_SIZE, CELL_COUNT, Coord, Direction};
pub use error::{CodecError, IllegalMove};
pub use invariants::{
    AssignmentUnchanged, CapturesChangeSides, CapturesSomething, InvariantSet, InvariantViolation,
    MoveInvariants, OnePiecePlaced, TransitionInvariant,
};
pub use rules::{
    MoveOutcome, apply_move, captures, has_any_move, legal_move, legal_moves, next_turn, play,
};
pub use types::{Cell, Color, ParticipantId, Winner};
