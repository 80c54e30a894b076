//! Broadcast relay: every subscriber gets every full-state message.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::{Subscription, SyncChannel, SyncError, SyncMessage, SyncMode};
use crate::session::GameId;

type Topics = HashMap<GameId, broadcast::Sender<SyncMessage>>;

/// Drops topics whose subscriptions are all gone.
fn prune(topics: &mut Topics) {
    let before = topics.len();
    topics.retain(|_, tx| tx.receiver_count() > 0);
    let pruned = before - topics.len();
    if pruned > 0 {
        debug!(pruned, "Idle relay topics pruned");
    }
}

/// Relay holding one broadcast channel per game with live subscribers.
///
/// Topics whose subscriptions were dropped are removed on the next
/// publish, subscribe or unsubscribe.
#[derive(Debug)]
pub struct RelayChannel {
    capacity: usize,
    topics: Mutex<Topics>,
}

impl RelayChannel {
    /// Creates a relay whose per-game buffers hold `capacity` messages.
    #[instrument]
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Creating relay channel");
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topics(&self) -> Result<MutexGuard<'_, Topics>, SyncError> {
        self.topics
            .lock()
            .map_err(|_| SyncError::new("Relay topic table poisoned"))
    }

    /// Number of games with a live topic.
    pub fn topic_count(&self) -> usize {
        self.topics().map(|topics| topics.len()).unwrap_or(0)
    }

    /// Number of live subscribers for `session`.
    pub fn subscriber_count(&self, session: GameId) -> usize {
        self.topics()
            .ok()
            .and_then(|topics| topics.get(&session).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }
}

impl Default for RelayChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl SyncChannel for RelayChannel {
    fn mode(&self) -> SyncMode {
        SyncMode::Relay
    }

    #[instrument(
        skip(self, message),
        fields(game_id = %message.session_id, version = message.version)
    )]
    async fn publish(&self, message: SyncMessage) -> Result<(), SyncError> {
        let mut topics = self.topics()?;
        match topics.get(&message.session_id) {
            Some(tx) => match tx.send(message) {
                Ok(receivers) => debug!(receivers, "State relayed"),
                Err(_) => debug!("No live subscribers"),
            },
            None => debug!("No subscribers for game"),
        }
        prune(&mut topics);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, session: GameId) -> Result<Subscription, SyncError> {
        let mut topics = self.topics()?;
        prune(&mut topics);
        let capacity = self.capacity;
        let rx = topics
            .entry(session)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        debug!(game_id = %session, "Relay subscriber added");
        Ok(Subscription::relay(session, rx))
    }

    #[instrument(skip(self, subscription), fields(game_id = %subscription.session()))]
    async fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
        if let Ok(mut topics) = self.topics() {
            prune(&mut topics);
        }
    }
}
