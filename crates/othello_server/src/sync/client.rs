//! Participant-side view of a game fed by a sync subscription.

use derive_getters::Getters;
use othello_rules::{
    BoardState, CodecError, Color, Coord, ParticipantId, Winner, legal_move, legal_moves,
};
use tracing::{debug, instrument, warn};

use super::SyncMessage;
use crate::session::GameId;

/// What [`ClientView::apply`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state was replaced.
    Replaced,
    /// The message carried the state already held.
    Unchanged,
    /// The message belongs to another game.
    IgnoredOtherSession,
    /// The message is older than the local state.
    IgnoredStale,
}

/// Why a local move was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum GateRejection {
    /// The color to move is not ours.
    #[display("Not your turn")]
    NotYourTurn,
    /// A previous submission has not been answered yet.
    #[display("A move is already pending")]
    Pending,
    /// The rules reject this cell.
    #[display("Illegal move at ({_0}, {_1})")]
    Illegal(i32, i32),
}

/// Whether the game is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// Board not full; `Color` is to move.
    InProgress(Color),
    /// Board full.
    Finished(Winner),
}

/// One participant's local copy of a game.
///
/// Messages replace the state wholesale. Versioned messages older than the
/// held state are dropped; unversioned ones (version 0) always replace.
///
/// Sync messages only name the Black player, so the view also needs to know
/// the opponent (see [`with_opponent`](Self::with_opponent)) to recognize
/// when `me` plays White.
#[derive(Debug, Clone, Getters)]
pub struct ClientView {
    /// Game followed by this view.
    session_id: GameId,
    /// Participant owning this view.
    me: ParticipantId,
    /// The other seated participant, once known.
    opponent: Option<ParticipantId>,
    /// Last accepted state.
    state: BoardState,
    /// Version of the last accepted state.
    version: u64,
    /// Version the outstanding submission was computed against.
    #[getter(skip)]
    pending: Option<u64>,
}

impl ClientView {
    /// Builds a view from an initial snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the snapshot does not decode.
    #[instrument(skip(snapshot), fields(game_id = %snapshot.session_id))]
    pub fn new(me: ParticipantId, snapshot: &SyncMessage) -> Result<Self, CodecError> {
        Ok(Self {
            session_id: snapshot.session_id,
            me,
            opponent: None,
            state: snapshot.board_state()?,
            version: snapshot.version,
            pending: None,
        })
    }

    /// Folds an incoming message into the view.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a message for this game does not decode;
    /// the view is left unchanged.
    #[instrument(
        skip(self, message),
        fields(game_id = %self.session_id, me = %self.me, version = message.version)
    )]
    pub fn apply(&mut self, message: &SyncMessage) -> Result<ApplyOutcome, CodecError> {
        if message.session_id != self.session_id {
            return Ok(ApplyOutcome::IgnoredOtherSession);
        }
        if message.version != 0 && message.version < self.version {
            debug!(held = self.version, "Dropping stale state");
            return Ok(ApplyOutcome::IgnoredStale);
        }
        let state = message.board_state()?;
        if state == self.state && message.version == self.version {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.state = state;
        self.version = message.version;
        if self.pending.take().is_some() {
            debug!("Pending submission settled");
        }
        Ok(ApplyOutcome::Replaced)
    }

    /// Records the other participant of the game.
    pub fn with_opponent(mut self, opponent: ParticipantId) -> Self {
        self.opponent = Some(opponent);
        self
    }

    /// Color this participant plays, or `None` if `me` holds neither seat
    /// as far as this view knows.
    pub fn my_color(&self) -> Option<Color> {
        let black = self.state.black_player();
        if black == self.me {
            Some(Color::Black)
        } else if self.opponent == Some(black) {
            Some(Color::White)
        } else {
            None
        }
    }

    /// True when the color to move is ours.
    pub fn is_turn(&self) -> bool {
        self.my_color() == Some(self.state.turn())
    }

    /// True while a submission awaits its echo or a rejection.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Piece count for `color`.
    pub fn score(&self, color: Color) -> usize {
        self.state.score_of(color)
    }

    /// Running or finished, with the winner once finished.
    pub fn standing(&self) -> Standing {
        if self.state.is_terminal() {
            Standing::Finished(self.state.winner())
        } else {
            Standing::InProgress(self.state.turn())
        }
    }

    /// Cells that are clickable right now.
    pub fn playable(&self) -> Vec<Coord> {
        if self.is_turn() && !self.is_pending() {
            legal_moves(&self.state)
        } else {
            Vec::new()
        }
    }

    /// Checks the local gate and marks a submission outstanding.
    ///
    /// Returns the version to send as the expected version.
    ///
    /// # Errors
    ///
    /// Returns [`GateRejection`] when the move must not be sent.
    #[instrument(skip(self), fields(game_id = %self.session_id, me = %self.me))]
    pub fn begin_move(&mut self, row: i32, col: i32) -> Result<u64, GateRejection> {
        if self.pending.is_some() {
            return Err(GateRejection::Pending);
        }
        if !self.is_turn() {
            return Err(GateRejection::NotYourTurn);
        }
        if !legal_move(&self.state, row, col) {
            warn!(row, col, "Locally illegal move");
            return Err(GateRejection::Illegal(row, col));
        }
        self.pending = Some(self.version);
        Ok(self.version)
    }

    /// Clears the pending gate after the server rejected the submission.
    pub fn reject(&mut self) {
        self.pending = None;
    }
}
