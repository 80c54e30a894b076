//! Session registry: the single writer for every live game.
//!
//! Each game is held behind its own async mutex. The lock is held from
//! validation through the persistence round trip and the broadcast, so
//! writes to one game are strictly serialized and published in version
//! order. A new state is committed in memory only after the store accepted
//! it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use othello_rules::{BoardState, ParticipantId, legal_moves, play};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::GameError;
use crate::session::{GameId, GameSession, JoinOutcome};
use crate::store::{GameStore, GameUpdate, StoreError, StoreErrorKind, User};
use crate::sync::{DocUpdate, Subscription, SyncChannel, SyncMessage};

type SessionHandle = Arc<Mutex<GameSession>>;

/// Owns the in-memory sessions and coordinates store and sync.
#[derive(Debug)]
pub struct SessionRegistry {
    store: Arc<dyn GameStore>,
    sync: Arc<dyn SyncChannel>,
    sessions: StdMutex<HashMap<GameId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry over the given collaborators.
    #[instrument(skip_all, fields(mode = %sync.mode()))]
    pub fn new(store: Arc<dyn GameStore>, sync: Arc<dyn SyncChannel>) -> Self {
        info!("Creating session registry");
        Self {
            store,
            sync,
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    /// Storage collaborator.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Propagation collaborator.
    pub fn sync(&self) -> &Arc<dyn SyncChannel> {
        &self.sync
    }

    /// Runs a blocking store call on the blocking pool.
    async fn blocking<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GameStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || call(store.as_ref()))
            .await
            .map_err(|e| StoreError::backend(format!("Store worker failed: {}", e)))?
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<GameId, SessionHandle>> {
        // A poisoned map only means a panic elsewhere; the map itself stays valid.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops the cached session so the next call reloads it from storage.
    #[instrument(skip(self))]
    pub fn evict(&self, id: GameId) {
        if self.sessions().remove(&id).is_some() {
            debug!(game_id = %id, "Session evicted");
        }
    }

    /// Number of sessions currently cached.
    pub fn cached(&self) -> usize {
        self.sessions().len()
    }

    /// Returns the cached handle, loading the session from storage if needed.
    async fn handle(&self, id: GameId) -> Result<SessionHandle, GameError> {
        if let Some(handle) = self.sessions().get(&id) {
            return Ok(Arc::clone(handle));
        }
        let record = self
            .blocking(move |store| store.get_game(id.get()))
            .await?
            .ok_or(GameError::GameNotFound(id))?;
        let session = GameSession::from_record(&record)?;
        debug!(game_id = %id, version = session.version(), "Session loaded");
        // Another caller may have loaded it meanwhile; keep the first.
        let handle = self
            .sessions()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone();
        Ok(handle)
    }

    /// Registers a new user.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Store`] if the user cannot be written.
    #[instrument(skip(self))]
    pub async fn create_user(&self, name: String) -> Result<User, GameError> {
        let user = self.blocking(move |store| store.create_user(&name)).await?;
        info!(user_id = user.id(), "User created");
        Ok(user)
    }

    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Store`] if the lookup fails.
    pub async fn user(&self, id: ParticipantId) -> Result<Option<User>, GameError> {
        Ok(self.blocking(move |store| store.get_user(id.get())).await?)
    }

    /// Fails unless a user row exists for `participant`.
    async fn require_user(&self, participant: ParticipantId) -> Result<User, GameError> {
        self.user(participant).await?.ok_or_else(|| {
            warn!(participant = %participant, "No such user");
            GameError::UnknownParticipant(participant)
        })
    }

    /// Creates a game hosted (and opened as Black) by `host`.
    ///
    /// # Errors
    ///
    /// - [`GameError::UnknownParticipant`] if `host` never signed up
    /// - [`GameError::Store`] if the game cannot be written
    #[instrument(skip(self), fields(host = %host))]
    pub async fn create_game(&self, host: ParticipantId) -> Result<GameId, GameError> {
        self.require_user(host).await?;
        let initial = BoardState::initial(host);
        let record = self
            .blocking(move |store| store.create_game(host, &initial))
            .await?;
        let session = GameSession::from_record(&record)?;
        let id = *session.id();
        self.sessions().insert(id, Arc::new(Mutex::new(session)));
        info!(game_id = %id, "Game created");
        Ok(id)
    }

    /// Seats `participant` as guest of `id`.
    ///
    /// # Errors
    ///
    /// - [`GameError::UnknownParticipant`] if `participant` never signed up
    /// - [`GameError::GameNotFound`] for unknown games
    /// - [`GameError::GameFull`] if another guest holds the slot
    /// - [`GameError::Store`] if storage fails
    #[instrument(skip(self), fields(game_id = %id, participant = %participant))]
    pub async fn join_game(
        &self,
        id: GameId,
        participant: ParticipantId,
    ) -> Result<JoinOutcome, GameError> {
        self.require_user(participant).await?;
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        let outcome = session.plan_join(participant)?;
        if outcome != JoinOutcome::Seated {
            return Ok(outcome);
        }
        if let Err(e) = self
            .blocking(move |store| store.set_guest(id.get(), participant))
            .await
        {
            return Err(match e.kind {
                StoreErrorKind::Conflict => {
                    self.evict(id);
                    GameError::GameFull(id)
                }
                _ => self.reconcile(id, e),
            });
        }
        session.join(participant)
    }

    /// Validates, persists, commits and broadcasts a move.
    ///
    /// With `expected_version` set, the move is rejected unless it was
    /// computed against the current version.
    ///
    /// # Errors
    ///
    /// - [`GameError::StaleVersion`] for out-of-date submissions
    /// - any rejection from [`GameSession::plan_move`]
    /// - [`GameError::Store`] if the write failed; nothing was committed
    /// - [`GameError::Propagation`] if the committed state was not broadcast
    #[instrument(skip(self), fields(game_id = %id, participant = %participant))]
    pub async fn submit_move(
        &self,
        id: GameId,
        participant: ParticipantId,
        row: i32,
        col: i32,
        expected_version: Option<u64>,
    ) -> Result<SyncMessage, GameError> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        check_version(&session, expected_version)?;
        let outcome = session.plan_move(participant, row, col)?;
        debug!(
            flipped = outcome.flipped.len(),
            opponent_passed = outcome.opponent_passed,
            "Move planned"
        );
        self.persist_and_publish(&mut session, outcome.state).await
    }

    /// Accepts a full-state write made on a peer replica, as a move.
    ///
    /// The write must carry every field, sit at exactly the next version and
    /// equal the board one legal move by `participant` would produce. It is
    /// then persisted and published like any other move, so the document
    /// only ever holds committed states.
    ///
    /// # Errors
    ///
    /// - [`GameError::RejectedWrite`] for partial writes, writes for another
    ///   game, or boards no single legal move produces
    /// - [`GameError::StaleVersion`] unless the write targets the next version
    /// - any rejection from [`GameSession::plan_move`]
    /// - [`GameError::Store`] / [`GameError::Propagation`] as for moves
    #[instrument(skip(self, update), fields(game_id = %id, participant = %participant))]
    pub async fn submit_peer_write(
        &self,
        id: GameId,
        participant: ParticipantId,
        update: &DocUpdate,
    ) -> Result<SyncMessage, GameError> {
        if update.session_id != id {
            return Err(GameError::RejectedWrite(format!(
                "Write targets game {}",
                update.session_id
            )));
        }
        let proposal = update
            .proposal()
            .ok_or_else(|| GameError::RejectedWrite("Write does not carry every field".into()))?;
        let proposed = proposal
            .board_state()
            .map_err(|e| GameError::RejectedWrite(e.to_string()))?;

        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        let current = *session.version();
        if proposal.version != current + 1 {
            warn!(proposed = proposal.version, current, "Peer write off version");
            return Err(GameError::StaleVersion {
                expected: proposal.version.saturating_sub(1),
                actual: current,
            });
        }
        let placed = legal_moves(session.state()).into_iter().find(|at| {
            play(session.state(), at.row() as i32, at.col() as i32)
                .is_ok_and(|outcome| outcome.state == proposed)
        });
        let Some(at) = placed else {
            warn!("Peer write is not a legal successor");
            return Err(GameError::RejectedWrite(
                "Board is not one legal move from the current state".into(),
            ));
        };
        let outcome = session.plan_move(participant, at.row() as i32, at.col() as i32)?;
        debug!(row = at.row(), col = at.col(), "Peer write accepted as move");
        self.persist_and_publish(&mut session, outcome.state).await
    }

    /// Resets a finished game with the color assignment swapped.
    ///
    /// # Errors
    ///
    /// - [`GameError::GameNotOver`] unless the board is full
    /// - [`GameError::ParticipantNotAuthorized`] for strangers
    /// - [`GameError::Store`] / [`GameError::Propagation`] as for moves
    #[instrument(skip(self), fields(game_id = %id, requester = %requester))]
    pub async fn rematch(
        &self,
        id: GameId,
        requester: ParticipantId,
    ) -> Result<SyncMessage, GameError> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        let state = session.plan_rematch(requester)?;
        info!(black = %state.black_player(), "Rematch planned");
        self.persist_and_publish(&mut session, state).await
    }

    /// Current state of a game, readable by its host and guest only.
    ///
    /// # Errors
    ///
    /// - [`GameError::GameNotFound`] for unknown games
    /// - [`GameError::ParticipantNotAuthorized`] for strangers
    #[instrument(skip(self), fields(game_id = %id, participant = %participant))]
    pub async fn snapshot(
        &self,
        id: GameId,
        participant: ParticipantId,
    ) -> Result<SyncMessage, GameError> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        session.authorize(participant)?;
        Ok(SyncMessage::from_session(&session))
    }

    /// Session details (host, guest, version) for a participant.
    ///
    /// # Errors
    ///
    /// As for [`snapshot`](Self::snapshot).
    pub async fn session(
        &self,
        id: GameId,
        participant: ParticipantId,
    ) -> Result<GameSession, GameError> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        session.authorize(participant)?;
        Ok(session.clone())
    }

    /// Subscribes to live updates and returns the state they start from.
    ///
    /// The session lock is held while subscribing, so no update can fall
    /// between the snapshot and the first received message.
    ///
    /// # Errors
    ///
    /// As for [`snapshot`](Self::snapshot), plus [`GameError::Propagation`]
    /// if the channel refuses the subscription.
    #[instrument(skip(self), fields(game_id = %id, participant = %participant))]
    pub async fn subscribe(
        &self,
        id: GameId,
        participant: ParticipantId,
    ) -> Result<(SyncMessage, Subscription), GameError> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        session.authorize(participant)?;
        let subscription = self.sync.subscribe(id).await?;
        debug!("Participant subscribed");
        Ok((SyncMessage::from_session(&session), subscription))
    }

    /// Ends a subscription.
    #[instrument(skip(self, subscription), fields(game_id = %subscription.session()))]
    pub async fn unsubscribe(&self, subscription: Subscription) {
        self.sync.unsubscribe(subscription).await;
        debug!("Participant unsubscribed");
    }

    /// Writes `state` at the next version, then commits and broadcasts it.
    async fn persist_and_publish(
        &self,
        session: &mut GameSession,
        state: BoardState,
    ) -> Result<SyncMessage, GameError> {
        let id = *session.id();
        let current = *session.version();
        let update = GameUpdate::from_state(&state, current + 1)?;
        let expected = i64::try_from(current).map_err(|_| {
            StoreError::new(
                StoreErrorKind::Corrupt,
                format!("Version {} overflows", current),
            )
        })?;
        if let Err(e) = self
            .blocking(move |store| store.update_game(id.get(), &update, expected))
            .await
        {
            return Err(self.reconcile(id, e));
        }
        session.commit(state);
        let message = SyncMessage::from_session(session);
        if let Err(e) = self.sync.publish(message.clone()).await {
            warn!(
                game_id = %id,
                version = message.version,
                error = %e,
                "Committed state not propagated"
            );
            return Err(GameError::Propagation(e));
        }
        Ok(message)
    }

    /// Maps a store failure to the caller-facing error.
    ///
    /// A conflict means the row moved under us, so the cached session is
    /// dropped and the next call re-derives it from storage.
    fn reconcile(&self, id: GameId, err: StoreError) -> GameError {
        match err.kind {
            StoreErrorKind::NotFound => {
                self.evict(id);
                GameError::GameNotFound(id)
            }
            StoreErrorKind::Conflict => {
                warn!(game_id = %id, error = %err, "Storage conflict, evicting cached session");
                self.evict(id);
                GameError::Store(err)
            }
            _ => {
                warn!(game_id = %id, error = %err, "Storage failure, state not committed");
                GameError::Store(err)
            }
        }
    }
}

fn check_version(session: &GameSession, expected: Option<u64>) -> Result<(), GameError> {
    match expected {
        Some(expected) if expected != *session.version() => {
            warn!(
                game_id = %session.id(),
                expected,
                actual = session.version(),
                "Stale submission"
            );
            Err(GameError::StaleVersion {
                expected,
                actual: *session.version(),
            })
        }
        _ => Ok(()),
    }
}
