//! In-process game store for tests and `:memory:` runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use othello_rules::{BoardState, ParticipantId};
use tracing::{debug, info, instrument, warn};

use crate::store::{GameRecord, GameStore, GameUpdate, NewGame, StoreError, StoreErrorKind, User};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    games: BTreeMap<i32, GameRecord>,
    next_user: i32,
    next_game: i32,
}

/// Game store holding every row in memory. Same semantics as the SQLite
/// store, including compare-and-set updates.
#[derive(Debug, Default)]
pub struct MemoryGameStore {
    tables: Mutex<Tables>,
}

impl MemoryGameStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory game store");
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::backend("Memory store lock poisoned"))
    }
}

impl GameStore for MemoryGameStore {
    #[instrument(skip(self))]
    fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        tables.next_user += 1;
        let id = tables.next_user;
        let user = User::new(id, name.to_string(), Utc::now().naive_utc());
        tables.users.insert(id, user.clone());
        info!(user_id = id, "User created");
        Ok(user)
    }

    #[instrument(skip(self))]
    fn get_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    #[instrument(skip(self, initial), fields(host = %host))]
    fn create_game(
        &self,
        host: ParticipantId,
        initial: &BoardState,
    ) -> Result<GameRecord, StoreError> {
        let row = NewGame::new(host, initial);
        let mut tables = self.lock()?;
        tables.next_game += 1;
        let id = tables.next_game;
        let now = Utc::now().naive_utc();
        let record = GameRecord::new(
            id,
            *row.host_id(),
            None,
            *row.black_player_id(),
            row.current_turn().clone(),
            row.board().clone(),
            *row.version(),
            now,
            now,
        );
        tables.games.insert(id, record.clone());
        info!(game_id = id, "Game created");
        Ok(record)
    }

    #[instrument(skip(self))]
    fn get_game(&self, id: i32) -> Result<Option<GameRecord>, StoreError> {
        Ok(self.lock()?.games.get(&id).cloned())
    }

    #[instrument(skip(self), fields(guest = %guest))]
    fn set_guest(&self, id: i32, guest: ParticipantId) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let record = tables.games.get(&id).cloned().ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, format!("Game {} not found", id))
        })?;
        match record.guest() {
            Some(existing) if existing != guest => {
                warn!(game_id = id, "Guest slot already taken");
                Err(StoreError::new(
                    StoreErrorKind::Conflict,
                    format!("Game {} already has a different guest", id),
                ))
            }
            _ => {
                let seated = GameRecord::new(
                    *record.id(),
                    *record.host_id(),
                    Some(guest.get()),
                    *record.black_player_id(),
                    record.current_turn().clone(),
                    record.board().clone(),
                    *record.version(),
                    *record.created_at(),
                    Utc::now().naive_utc(),
                );
                tables.games.insert(id, seated);
                info!(game_id = id, "Guest seated");
                Ok(())
            }
        }
    }

    #[instrument(skip(self, update), fields(version = update.version()))]
    fn update_game(
        &self,
        id: i32,
        update: &GameUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let record = tables.games.get(&id).cloned().ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, format!("Game {} not found", id))
        })?;
        if *record.version() != expected_version {
            warn!(
                game_id = id,
                expected_version,
                stored_version = record.version(),
                "Stale write rejected"
            );
            return Err(StoreError::new(
                StoreErrorKind::Conflict,
                format!(
                    "Game {} is at version {}, expected {}",
                    id,
                    record.version(),
                    expected_version
                ),
            ));
        }
        let updated = GameRecord::new(
            *record.id(),
            *record.host_id(),
            *record.guest_id(),
            *update.black_player_id(),
            update.current_turn().clone(),
            update.board().clone(),
            *update.version(),
            *record.created_at(),
            *update.updated_at(),
        );
        tables.games.insert(id, updated);
        debug!(game_id = id, "Game row updated");
        Ok(())
    }
}
