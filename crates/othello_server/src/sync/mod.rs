//! State propagation between a game's participants.
//!
//! Two interchangeable strategies sit behind [`SyncChannel`]:
//!
//! - [`RelayChannel`] fans every published full-state message out to all
//!   subscribers of the same game.
//! - [`ReplicatedChannel`] keeps the state in a last-writer-wins document
//!   that every subscriber replicates and merges.
//!
//! Both give eventual convergence and last-write-wins semantics. Neither
//! orders concurrent writes beyond that; the registry's version check is
//! what rejects stale moves.

mod client;
mod message;
mod relay;
mod replicated;

pub use client::{ApplyOutcome, ClientView, GateRejection, Standing};
pub use message::SyncMessage;
pub use relay::RelayChannel;
pub use replicated::{
    DocUpdate, FieldWrite, GameDocument, LwwRegister, Replica, ReplicatedChannel, Stamp,
};

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{instrument, warn};

use crate::session::GameId;

/// Which propagation strategy to run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncMode {
    /// Broadcast relay of full-state messages.
    #[default]
    Relay,
    /// Replicated last-writer-wins document.
    Replicated,
}

/// Propagation error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Sync error: {} at {}:{}", message, file, line)]
pub struct SyncError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SyncError {
    /// Creates a new sync error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Carries full-state changes between a game's participants.
#[async_trait]
pub trait SyncChannel: Send + Sync + std::fmt::Debug {
    /// Strategy implemented by this channel.
    fn mode(&self) -> SyncMode;

    /// Propagates a new state to every subscriber of `message.session_id`.
    async fn publish(&self, message: SyncMessage) -> Result<(), SyncError>;

    /// Starts receiving state changes for `session`.
    async fn subscribe(&self, session: GameId) -> Result<Subscription, SyncError>;

    /// Stops a subscription and releases per-game resources no one uses.
    async fn unsubscribe(&self, subscription: Subscription);
}

enum Feed {
    Relay(broadcast::Receiver<SyncMessage>),
    Replicated {
        updates: broadcast::Receiver<DocUpdate>,
        replica: Replica,
        last: Option<SyncMessage>,
    },
}

/// Live stream of state changes for one game.
///
/// Dropping it stops delivery. The channel releases the idle per-game
/// topic on its next publish or subscribe, or right away through
/// [`SyncChannel::unsubscribe`].
pub struct Subscription {
    session: GameId,
    feed: Feed,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.feed {
            Feed::Relay(_) => SyncMode::Relay,
            Feed::Replicated { .. } => SyncMode::Replicated,
        };
        f.debug_struct("Subscription")
            .field("session", &self.session)
            .field("mode", &mode)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn relay(session: GameId, rx: broadcast::Receiver<SyncMessage>) -> Self {
        Self {
            session,
            feed: Feed::Relay(rx),
        }
    }

    pub(crate) fn replicated(
        session: GameId,
        updates: broadcast::Receiver<DocUpdate>,
        replica: Replica,
    ) -> Self {
        let last = replica.snapshot(session);
        Self {
            session,
            feed: Feed::Replicated {
                updates,
                replica,
                last,
            },
        }
    }

    /// Game this subscription follows.
    pub fn session(&self) -> GameId {
        self.session
    }

    /// Waits for the next state change. Returns `None` once the channel
    /// is closed.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        let session = self.session;
        match &mut self.feed {
            Feed::Relay(rx) => loop {
                match rx.recv().await {
                    Ok(msg) => return Some(msg),
                    Err(RecvError::Lagged(skipped)) => {
                        // Full-state messages: the next one supersedes what was missed.
                        warn!(game_id = %session, skipped, "Relay subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
            Feed::Replicated {
                updates,
                replica,
                last,
            } => loop {
                match updates.recv().await {
                    Ok(update) => {
                        if let Some(msg) = merge_update(session, replica, last, &update) {
                            return Some(msg);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(game_id = %session, skipped, "Replica lagged behind document");
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Returns a pending state change without waiting.
    pub fn try_recv(&mut self) -> Option<SyncMessage> {
        let session = self.session;
        match &mut self.feed {
            Feed::Relay(rx) => loop {
                match rx.try_recv() {
                    Ok(msg) => return Some(msg),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
                }
            },
            Feed::Replicated {
                updates,
                replica,
                last,
            } => loop {
                match updates.try_recv() {
                    Ok(update) => {
                        if let Some(msg) = merge_update(session, replica, last, &update) {
                            return Some(msg);
                        }
                    }
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
                }
            },
        }
    }
}

/// Merges `update` and yields the materialized state if it changed.
fn merge_update(
    session: GameId,
    replica: &mut Replica,
    last: &mut Option<SyncMessage>,
    update: &DocUpdate,
) -> Option<SyncMessage> {
    if !replica.merge(update) {
        return None;
    }
    let current = replica.snapshot(session)?;
    if last.as_ref() == Some(&current) {
        return None;
    }
    *last = Some(current.clone());
    Some(current)
}
