//! Full-state message carried between participants.

use othello_rules::{BoardState, CodecError, EncodedBoard, ParticipantId};
use serde::{Deserialize, Serialize};

use crate::session::{GameId, GameSession};

/// Complete state of one game as sent over the wire.
///
/// Receivers replace their local state wholesale. `version` is additive:
/// messages without it parse with version 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Game the state belongs to.
    pub session_id: GameId,
    /// 64-character board encoding.
    pub cells: String,
    /// `"1"` (Black) or `"2"` (White).
    pub turn: String,
    /// Participant assigned to Black.
    pub black_player_id: ParticipantId,
    /// Move-sequence number of this state.
    #[serde(default)]
    pub version: u64,
}

impl SyncMessage {
    /// Encodes `state` for `session_id` at `version`.
    pub fn new(session_id: GameId, state: &BoardState, version: u64) -> Self {
        let EncodedBoard {
            cells,
            turn,
            black_player_id,
        } = EncodedBoard::from(state);
        Self {
            session_id,
            cells,
            turn,
            black_player_id,
            version,
        }
    }

    /// Snapshot of a session's current state.
    pub fn from_session(session: &GameSession) -> Self {
        Self::new(*session.id(), session.state(), *session.version())
    }

    /// Decodes the carried board.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the cells or turn are malformed.
    pub fn board_state(&self) -> Result<BoardState, CodecError> {
        BoardState::try_from(&EncodedBoard {
            cells: self.cells.clone(),
            turn: self.turn.clone(),
            black_player_id: self.black_player_id,
        })
    }

    /// True if both messages describe the same board, ignoring version.
    pub fn same_board(&self, other: &SyncMessage) -> bool {
        self.session_id == other.session_id
            && self.cells == other.cells
            && self.turn == other.turn
            && self.black_player_id == other.black_player_id
    }
}
