//! Errors surfaced by sessions and the session registry.

use derive_more::{Display, Error};
use othello_rules::{Color, IllegalMove, ParticipantId};

use crate::session::GameId;
use crate::store::StoreError;
use crate::sync::SyncError;

/// Every way a client-facing game operation can fail.
///
/// All variants are scoped to a single operation; none leaves the session
/// half-updated.
#[derive(Debug, Clone, Display, Error)]
pub enum GameError {
    /// The rules engine rejected the move.
    #[display("Illegal move: {_0}")]
    IllegalMove(#[error(source)] IllegalMove),

    /// The color to move belongs to someone else.
    #[display("Not your turn: {turn} is to move and belongs to another participant")]
    NotYourTurn {
        /// Participant who tried to move.
        participant: ParticipantId,
        /// Color whose turn it is.
        turn: Color,
    },

    /// A different guest already holds the guest slot.
    #[display("Game {_0} already has two participants")]
    GameFull(#[error(not(source))] GameId),

    /// No game with this id exists.
    #[display("Game {_0} not found")]
    GameNotFound(#[error(not(source))] GameId),

    /// No user row exists for this participant id.
    #[display("Unknown user {_0}")]
    UnknownParticipant(#[error(not(source))] ParticipantId),

    /// The participant is neither host nor guest.
    #[display("Participant {_0} is not part of this game")]
    ParticipantNotAuthorized(#[error(not(source))] ParticipantId),

    /// The caller computed its move against an older state.
    #[display("Stale state: expected version {expected}, current is {actual}")]
    StaleVersion {
        /// Version the caller believed current.
        expected: u64,
        /// Actual current version.
        actual: u64,
    },

    /// Rematch requested before the board is full.
    #[display("Game is not over yet")]
    GameNotOver,

    /// A replicated write is not a single legal move from the current state.
    #[display("Rejected write: {_0}")]
    RejectedWrite(#[error(not(source))] String),

    /// A computed transition broke a move invariant.
    #[display("Invariant violation: {_0}")]
    InvariantViolation(#[error(not(source))] String),

    /// Storage failed; the authoritative state was not replaced.
    #[display("Storage failure: {_0}")]
    Store(#[error(source)] StoreError),

    /// The state was committed but could not be propagated.
    #[display("Propagation failure: {_0}")]
    Propagation(#[error(source)] SyncError),
}

impl From<IllegalMove> for GameError {
    fn from(err: IllegalMove) -> Self {
        Self::IllegalMove(err)
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<SyncError> for GameError {
    fn from(err: SyncError) -> Self {
        Self::Propagation(err)
    }
}
