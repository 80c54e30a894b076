//! Othello game server.
//!
//! Sessions hold the authoritative state of each game and validate moves
//! with [`othello_rules`]. The [`SessionRegistry`] serializes writes per
//! game, persists them through a [`GameStore`] and propagates every
//! committed state through a [`SyncChannel`]. The [`http`] module exposes
//! all of it over REST and WebSockets.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod client;
pub mod config;
mod error;
pub mod http;
mod registry;
mod session;
pub mod store;
pub mod sync;

pub use client::RestClient;
pub use config::{ConfigError, MEMORY_DATABASE, ServerConfig};
pub use error::GameError;
pub use registry::SessionRegistry;
pub use session::{GameId, GameSession, JoinOutcome, Seat};
pub use store::{GameStore, MemoryGameStore, SqliteGameStore, StoreError, StoreErrorKind};
pub use sync::{
    ApplyOutcome, ClientView, DocUpdate, GateRejection, RelayChannel, Replica, ReplicatedChannel,
    Standing, Subscription, SyncChannel, SyncError, SyncMessage, SyncMode,
};
