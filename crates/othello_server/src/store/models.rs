//! Database models and their mapping to domain types.

use chrono::{NaiveDateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use othello_rules::{BoardState, EncodedBoard, ParticipantId};
use tracing::instrument;

use crate::store::{StoreError, StoreErrorKind, schema};

/// User row. Only the id matters to the game core; the name is for display.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters, new)]
#[diesel(table_name = schema::users)]
pub struct User {
    id: i32,
    name: String,
    created_at: NaiveDateTime,
}

/// Insertable user.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    name: String,
}

/// Persisted game row.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters, new)]
#[diesel(table_name = schema::games)]
pub struct GameRecord {
    id: i32,
    host_id: i32,
    guest_id: Option<i32>,
    black_player_id: i32,
    current_turn: String,
    board: String,
    version: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl GameRecord {
    /// Decodes the stored board, turn and Black assignment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] with kind `Corrupt` if the board or turn
    /// strings are malformed.
    #[instrument(skip(self), fields(game_id = self.id))]
    pub fn board_state(&self) -> Result<BoardState, StoreError> {
        let encoded = EncodedBoard {
            cells: self.board.clone(),
            turn: self.current_turn.clone(),
            black_player_id: ParticipantId::new(self.black_player_id),
        };
        Ok(BoardState::try_from(&encoded)?)
    }

    /// Move-sequence number as stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] with kind `Corrupt` for a negative version.
    pub fn sequence(&self) -> Result<u64, StoreError> {
        u64::try_from(self.version).map_err(|_| {
            StoreError::new(
                StoreErrorKind::Corrupt,
                format!("Negative version {} on game {}", self.version, self.id),
            )
        })
    }

    /// Host as a participant id.
    pub fn host(&self) -> ParticipantId {
        ParticipantId::new(self.host_id)
    }

    /// Guest as a participant id, if one has joined.
    pub fn guest(&self) -> Option<ParticipantId> {
        self.guest_id.map(ParticipantId::new)
    }
}

/// Insertable game row.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::games)]
pub struct NewGame {
    host_id: i32,
    black_player_id: i32,
    current_turn: String,
    board: String,
    version: i64,
}

impl NewGame {
    /// Builds the row for a fresh game hosted by `host`.
    #[instrument(skip(initial))]
    pub fn new(host: ParticipantId, initial: &BoardState) -> Self {
        let encoded = EncodedBoard::from(initial);
        Self {
            host_id: host.get(),
            black_player_id: encoded.black_player_id.get(),
            current_turn: encoded.turn,
            board: encoded.cells,
            version: 0,
        }
    }
}

/// Changeset written after every committed move or rematch.
#[derive(Debug, Clone, PartialEq, Eq, AsChangeset, Getters)]
#[diesel(table_name = schema::games)]
pub struct GameUpdate {
    black_player_id: i32,
    current_turn: String,
    board: String,
    version: i64,
    updated_at: NaiveDateTime,
}

impl GameUpdate {
    /// Encodes `state` as the row's new contents at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the version does not fit the column.
    #[instrument(skip(state))]
    pub fn from_state(state: &BoardState, version: u64) -> Result<Self, StoreError> {
        let encoded = EncodedBoard::from(state);
        let version = i64::try_from(version).map_err(|_| {
            StoreError::new(StoreErrorKind::Corrupt, format!("Version {} overflows", version))
        })?;
        Ok(Self {
            black_player_id: encoded.black_player_id.get(),
            current_turn: encoded.turn,
            board: encoded.cells,
            version,
            updated_at: Utc::now().naive_utc(),
        })
    }
}
