//! SQLite-backed game store.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use othello_rules::{BoardState, ParticipantId};
use tracing::{debug, info, instrument, warn};

use crate::store::{
    GameRecord, GameStore, GameUpdate, NewGame, NewUser, StoreError, StoreErrorKind, User, schema,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Diesel repository for users and games.
///
/// Opens a fresh connection per call, so it is cheap to clone and share
/// across blocking worker threads.
#[derive(Debug, Clone)]
pub struct SqliteGameStore {
    db_path: String,
}

impl SqliteGameStore {
    /// Opens the database at `db_path`, creating it and applying pending
    /// migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be opened or a migration
    /// fails.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: impl Into<String> + std::fmt::Display) -> Result<Self, StoreError> {
        let store = Self {
            db_path: db_path.into(),
        };
        let mut conn = store.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::backend(format!("Migration failed: {}", e)))?;
        info!(path = %store.db_path, migrations = applied.len(), "SqliteGameStore ready");
        Ok(store)
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path).map_err(|e| {
            StoreError::backend(format!("Failed to connect to '{}': {}", self.db_path, e))
        })
    }
}

impl GameStore for SqliteGameStore {
    #[instrument(skip(self))]
    fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let mut conn = self.connection()?;
        let user = diesel::insert_into(schema::users::table)
            .values(&NewUser::new(name.to_string()))
            .returning(User::as_returning())
            .get_result(&mut conn)?;
        info!(user_id = user.id(), name = %user.name(), "User created");
        Ok(user)
    }

    #[instrument(skip(self))]
    fn get_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        let mut conn = self.connection()?;
        let user = schema::users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    #[instrument(skip(self, initial), fields(host = %host))]
    fn create_game(
        &self,
        host: ParticipantId,
        initial: &BoardState,
    ) -> Result<GameRecord, StoreError> {
        let mut conn = self.connection()?;
        let record = diesel::insert_into(schema::games::table)
            .values(&NewGame::new(host, initial))
            .returning(GameRecord::as_returning())
            .get_result(&mut conn)?;
        info!(game_id = record.id(), "Game created");
        Ok(record)
    }

    #[instrument(skip(self))]
    fn get_game(&self, id: i32) -> Result<Option<GameRecord>, StoreError> {
        let mut conn = self.connection()?;
        let record = schema::games::table
            .find(id)
            .select(GameRecord::as_select())
            .first(&mut conn)
            .optional()?;
        if record.is_none() {
            debug!(game_id = id, "Game not found");
        }
        Ok(record)
    }

    #[instrument(skip(self), fields(guest = %guest))]
    fn set_guest(&self, id: i32, guest: ParticipantId) -> Result<(), StoreError> {
        use schema::games::dsl;
        let mut conn = self.connection()?;
        // Only claims an empty slot (or re-confirms the same guest).
        let updated = diesel::update(
            dsl::games
                .filter(dsl::id.eq(id))
                .filter(dsl::guest_id.is_null().or(dsl::guest_id.eq(guest.get()))),
        )
        .set(dsl::guest_id.eq(guest.get()))
        .execute(&mut conn)?;
        if updated == 1 {
            info!(game_id = id, "Guest seated");
            return Ok(());
        }
        match self.get_game(id)? {
            Some(_) => {
                warn!(game_id = id, "Guest slot already taken");
                Err(StoreError::new(
                    StoreErrorKind::Conflict,
                    format!("Game {} already has a different guest", id),
                ))
            }
            None => Err(StoreError::new(
                StoreErrorKind::NotFound,
                format!("Game {} not found", id),
            )),
        }
    }

    #[instrument(skip(self, update), fields(version = update.version()))]
    fn update_game(
        &self,
        id: i32,
        update: &GameUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        use schema::games::dsl;
        let mut conn = self.connection()?;
        let updated = diesel::update(
            dsl::games
                .filter(dsl::id.eq(id))
                .filter(dsl::version.eq(expected_version)),
        )
        .set(update)
        .execute(&mut conn)?;
        if updated == 1 {
            debug!(game_id = id, "Game row updated");
            return Ok(());
        }
        match self.get_game(id)? {
            Some(current) => {
                warn!(
                    game_id = id,
                    expected_version,
                    stored_version = current.version(),
                    "Stale write rejected"
                );
                Err(StoreError::new(
                    StoreErrorKind::Conflict,
                    format!(
                        "Game {} is at version {}, expected {}",
                        id,
                        current.version(),
                        expected_version
                    ),
                ))
            }
            None => Err(StoreError::new(
                StoreErrorKind::NotFound,
                format!("Game {} not found", id),
            )),
        }
    }
}
