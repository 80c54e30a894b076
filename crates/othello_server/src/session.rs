//! A single game between a host and an optional guest.

use derive_getters::Getters;
use othello_rules::{
    BoardState, Color, InvariantSet, MoveInvariants, MoveOutcome, ParticipantId, play,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::GameError;
use crate::store::{GameRecord, StoreError};

/// Stable game identifier, equal to the persisted row id.
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
pub struct GameId(i32);

impl GameId {
    /// Wraps a raw id.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn get(self) -> i32 {
        self.0
    }
}

/// Which slot a participant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    /// Created the game.
    Host,
    /// Joined later.
    Guest,
}

/// Result of a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    /// The host opened its own game; nothing changes.
    Host,
    /// The guest was already seated; nothing changes.
    AlreadySeated,
    /// The participant took the empty guest slot.
    Seated,
}

/// Authoritative state of one game.
///
/// Mutations go through [`submit_move`](Self::submit_move),
/// [`rematch`](Self::rematch) and [`join`](Self::join). Each has a
/// non-mutating `plan_*` counterpart so a caller can persist the result
/// before committing it.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct GameSession {
    /// Game id.
    id: GameId,
    /// Participant who created the game.
    host: ParticipantId,
    /// Participant who joined, if any.
    guest: Option<ParticipantId>,
    /// Current board.
    state: BoardState,
    /// Move-sequence number, bumped on every committed replacement.
    version: u64,
}

impl GameSession {
    /// Creates a session at the starting position with the host as Black.
    #[instrument]
    pub fn new(id: GameId, host: ParticipantId) -> Self {
        info!(game_id = %id, host = %host, "Creating new game session");
        Self {
            id,
            host,
            guest: None,
            state: BoardState::initial(host),
            version: 0,
        }
    }

    /// Re-derives a session from its persisted row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the row cannot be decoded.
    #[instrument(skip(record), fields(game_id = record.id()))]
    pub fn from_record(record: &GameRecord) -> Result<Self, StoreError> {
        let session = Self {
            id: GameId::new(*record.id()),
            host: record.host(),
            guest: record.guest(),
            state: record.board_state()?,
            version: record.sequence()?,
        };
        debug!(version = session.version, "Session loaded from record");
        Ok(session)
    }

    /// Slot held by `participant`, if any.
    pub fn seat_of(&self, participant: ParticipantId) -> Option<Seat> {
        if participant == self.host {
            Some(Seat::Host)
        } else if Some(participant) == self.guest {
            Some(Seat::Guest)
        } else {
            None
        }
    }

    /// Fails unless `participant` is host or guest.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ParticipantNotAuthorized`] for strangers.
    pub fn authorize(&self, participant: ParticipantId) -> Result<Seat, GameError> {
        self.seat_of(participant).ok_or_else(|| {
            warn!(game_id = %self.id, participant = %participant, "Unknown participant");
            GameError::ParticipantNotAuthorized(participant)
        })
    }

    /// Participant playing `color`, if that seat is filled.
    pub fn participant_for(&self, color: Color) -> Option<ParticipantId> {
        let black = self.state.black_player();
        match color {
            Color::Black => Some(black),
            Color::White if black == self.host => self.guest,
            Color::White => Some(self.host),
        }
    }

    /// Color played by `participant`, if any.
    pub fn color_of(&self, participant: ParticipantId) -> Option<Color> {
        [Color::Black, Color::White]
            .into_iter()
            .find(|color| self.participant_for(*color) == Some(participant))
    }

    /// Decides what joining would do without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameFull`] if a different guest is seated.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn plan_join(&self, participant: ParticipantId) -> Result<JoinOutcome, GameError> {
        if participant == self.host {
            return Ok(JoinOutcome::Host);
        }
        match self.guest {
            None => Ok(JoinOutcome::Seated),
            Some(guest) if guest == participant => Ok(JoinOutcome::AlreadySeated),
            Some(_) => {
                warn!(participant = %participant, "Guest slot already taken");
                Err(GameError::GameFull(self.id))
            }
        }
    }

    /// Seats `participant` as guest if the slot is free.
    ///
    /// Idempotent for the guest already seated and a no-op for the host.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::GameFull`] if a different guest is seated.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn join(&mut self, participant: ParticipantId) -> Result<JoinOutcome, GameError> {
        let outcome = self.plan_join(participant)?;
        if outcome == JoinOutcome::Seated {
            info!(guest = %participant, "Guest seated");
            self.guest = Some(participant);
        }
        Ok(outcome)
    }

    /// Validates and computes a move without committing it.
    ///
    /// # Errors
    ///
    /// - [`GameError::ParticipantNotAuthorized`] for strangers
    /// - [`GameError::NotYourTurn`] when the color to move maps elsewhere
    /// - [`GameError::IllegalMove`] when the rules reject the cell
    #[instrument(skip(self), fields(game_id = %self.id, version = self.version))]
    pub fn plan_move(
        &self,
        participant: ParticipantId,
        row: i32,
        col: i32,
    ) -> Result<MoveOutcome, GameError> {
        self.authorize(participant)?;
        let turn = self.state.turn();
        if self.participant_for(turn) != Some(participant) {
            warn!(participant = %participant, turn = %turn, "Move out of turn");
            return Err(GameError::NotYourTurn { participant, turn });
        }
        let outcome = play(&self.state, row, col).map_err(|e| {
            warn!(participant = %participant, row, col, error = %e, "Illegal move");
            GameError::from(e)
        })?;
        MoveInvariants::check_all(&self.state, &outcome.state).map_err(|violations| {
            let description = violations
                .iter()
                .map(|v| v.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            GameError::InvariantViolation(description)
        })?;
        Ok(outcome)
    }

    /// Computes the rematch board without committing it.
    ///
    /// The participant who was White becomes Black. With no guest seated,
    /// the host stays Black.
    ///
    /// # Errors
    ///
    /// - [`GameError::ParticipantNotAuthorized`] for strangers
    /// - [`GameError::GameNotOver`] unless the board is full
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn plan_rematch(&self, requester: ParticipantId) -> Result<BoardState, GameError> {
        self.authorize(requester)?;
        if !self.state.is_terminal() {
            warn!(requester = %requester, "Rematch requested mid-game");
            return Err(GameError::GameNotOver);
        }
        let black = self
            .participant_for(Color::White)
            .unwrap_or_else(|| self.state.black_player());
        Ok(BoardState::initial(black))
    }

    /// Replaces the board wholesale and bumps the version.
    #[instrument(skip(self, state), fields(game_id = %self.id))]
    pub fn commit(&mut self, state: BoardState) -> u64 {
        self.state = state;
        self.version += 1;
        info!(
            version = self.version,
            turn = %self.state.turn(),
            occupied = self.state.occupied(),
            "State committed"
        );
        self.version
    }

    /// Validates, applies and commits a move, returning the new state.
    ///
    /// # Errors
    ///
    /// See [`plan_move`](Self::plan_move). Rejected moves leave the session
    /// untouched.
    pub fn submit_move(
        &mut self,
        participant: ParticipantId,
        row: i32,
        col: i32,
    ) -> Result<BoardState, GameError> {
        let outcome = self.plan_move(participant, row, col)?;
        self.commit(outcome.state);
        Ok(self.state.clone())
    }

    /// Resets to the starting position with the color assignment swapped.
    ///
    /// # Errors
    ///
    /// See [`plan_rematch`](Self::plan_rematch).
    pub fn rematch(&mut self, requester: ParticipantId) -> Result<BoardState, GameError> {
        let state = self.plan_rematch(requester)?;
        self.commit(state);
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: ParticipantId = ParticipantId::new(1);
    const GUEST: ParticipantId = ParticipantId::new(2);

    fn seated() -> GameSession {
        let mut session = GameSession::new(GameId::new(10), HOST);
        session.join(GUEST).expect("Guest joins");
        session
    }

    #[test]
    fn test_colors_follow_black_assignment() {
        let session = seated();
        assert_eq!(session.color_of(HOST), Some(Color::Black));
        assert_eq!(session.color_of(GUEST), Some(Color::White));
        assert_eq!(session.color_of(ParticipantId::new(3)), None);
    }

    #[test]
    fn test_white_unassigned_before_guest() {
        let session = GameSession::new(GameId::new(10), HOST);
        assert_eq!(session.participant_for(Color::White), None);
    }

    #[test]
    fn test_commit_bumps_version() {
        let mut session = seated();
        session.submit_move(HOST, 2, 4).expect("Legal move");
        assert_eq!(*session.version(), 1);
        assert_eq!(session.state().turn(), Color::White);
    }
}
