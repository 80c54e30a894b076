//! Persistence for users and games.

mod error;
mod memory;
mod models;
mod schema; // Diesel generated schema - internal use only
mod sqlite;

pub use error::{StoreError, StoreErrorKind};
pub use memory::MemoryGameStore;
pub use models::{GameRecord, GameUpdate, NewGame, NewUser, User};
pub use sqlite::SqliteGameStore;

use othello_rules::{BoardState, ParticipantId};

/// Storage collaborator consumed by the session registry.
///
/// Calls are blocking; async callers run them on a blocking worker.
pub trait GameStore: Send + Sync + std::fmt::Debug {
    /// Creates a user and returns the stored row.
    fn create_user(&self, name: &str) -> Result<User, StoreError>;

    /// Looks up a user by id.
    fn get_user(&self, id: i32) -> Result<Option<User>, StoreError>;

    /// Inserts a new game at version 0 with `initial` as its board.
    fn create_game(
        &self,
        host: ParticipantId,
        initial: &BoardState,
    ) -> Result<GameRecord, StoreError>;

    /// Loads a game row.
    fn get_game(&self, id: i32) -> Result<Option<GameRecord>, StoreError>;

    /// Fills the guest slot. Succeeds if the slot is empty or already held
    /// by `guest`; fails with `Conflict` otherwise.
    fn set_guest(&self, id: i32, guest: ParticipantId) -> Result<(), StoreError>;

    /// Overwrites board, turn and Black assignment, but only if the stored
    /// version still equals `expected_version`.
    fn update_game(
        &self,
        id: i32,
        update: &GameUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError>;
}
